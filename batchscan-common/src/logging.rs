//! Logging setup for batchscan.
//!
//! Structured output through `tracing-subscriber`: JSON for unattended runs,
//! human-readable otherwise. Each scan opens a `scan` span carrying a
//! `run_id` field, so every event of one run can be correlated.
//!
//! # Noise Filtering
//!
//! Transport crates (hyper, reqwest, h2, rustls, tokio_util) are pinned to
//! `warn` so chunk-level pipeline events stay readable. `RUST_LOG`, when set,
//! replaces the whole filter.

use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// Modules pinned to `warn` regardless of the base level.
pub const NOISY_MODULES: &[&str] = &[
    "hyper",
    "hyper_util",
    "reqwest",
    "h2",
    "rustls",
    "tokio_util",
];

/// Output format of the fmt layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Multi-field human-readable lines
    Pretty,
    /// Single-line human-readable
    Compact,
    /// One JSON object per event, current span included
    Json,
}

impl LogFormat {
    /// Accepted config values.
    pub const NAMES: &'static [&'static str] = &["pretty", "compact", "json"];

    /// Strict lookup of a config value (case-insensitive).
    pub fn from_name(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" => Some(Self::Pretty),
            "compact" => Some(Self::Compact),
            "json" => Some(Self::Json),
            _ => None,
        }
    }

    /// Parse a config value; anything unrecognised falls back to `Pretty`.
    pub fn parse(s: &str) -> Self {
        Self::from_name(s).unwrap_or(Self::Pretty)
    }
}

/// Filter directives: base level, then `target=warn` for every noisy target.
fn build_directives(log_level: &str, extra_targets: &[String]) -> String {
    NOISY_MODULES
        .iter()
        .map(|m| m.to_string())
        .chain(extra_targets.iter().cloned())
        .fold(String::from(log_level), |mut acc, target| {
            acc.push_str(&format!(",{}=warn", target));
            acc
        })
}

/// Initialize logging.
///
/// * `log_level` - base level (trace, debug, info, warn, error)
/// * `log_format` - "json", "compact" or "pretty"
///
/// Installing twice is harmless; the second call is ignored.
pub fn init_logging(log_level: &str, log_format: &str) {
    init_logging_with_exclusions(log_level, log_format, &[]);
}

/// Like `init_logging`, with extra targets pinned to `warn`.
pub fn init_logging_with_exclusions(
    log_level: &str,
    log_format: &str,
    excluded_targets: &[String],
) {
    let directives = build_directives(log_level, excluded_targets);
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&directives));
    let registry = tracing_subscriber::registry().with(filter);

    let format = LogFormat::parse(log_format);
    let installed = match format {
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_span_events(FmtSpan::CLOSE)
                    .with_current_span(true)
                    .with_span_list(false)
                    .with_target(true),
            )
            .try_init(),
        LogFormat::Compact => registry
            .with(tracing_subscriber::fmt::layer().compact().with_target(false))
            .try_init(),
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().with_ansi(true).with_target(true))
            .try_init(),
    };

    if installed.is_ok() {
        tracing::debug!(
            log_level = %log_level,
            ?format,
            noise_filtered = NOISY_MODULES.len() + excluded_targets.len(),
            "Logging initialized"
        );
    }
}

/// New run ID (UUID v4) for the `run_id` span field.
pub fn generate_run_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
