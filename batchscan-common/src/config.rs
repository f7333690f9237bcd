//! Configuration management for batchscan.
//!
//! The pipeline reads a single configuration file at `~/.batchscan/config.json`.
//!
//! # Configuration Priority
//!
//! 1. Environment variables (BATCHSCAN_* prefix)
//! 2. Explicit config file values
//! 3. Default values
//!
//! # Environment Variable Mapping
//!
//! - `BATCHSCAN_LOG_LEVEL` → observability.log_level
//! - `BATCHSCAN_LOG_FORMAT` → observability.log_format
//! - `BATCHSCAN_DATA_URL` → market_data.base_url
//! - `BATCHSCAN_API_KEY` → market_data.api_key
//! - `BATCHSCAN_API_SECRET` → market_data.api_secret
//! - `BATCHSCAN_OUTPUT_PATH` → scanner.output_path

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Get the configuration directory path.
pub fn config_dir() -> PathBuf {
    directories::UserDirs::new().map_or_else(
        || PathBuf::from(".batchscan"),
        |dirs| dirs.home_dir().join(".batchscan"),
    )
}

/// Get the configuration file path.
pub fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Upstream market data provider
    #[serde(default)]
    pub market_data: MarketDataConfig,

    /// Scan pipeline tuning. Every field is optional; engine defaults apply.
    #[serde(default)]
    pub scanner: Option<ScannerConfig>,
}

impl Config {
    /// Load configuration from the default path.
    pub fn load() -> Result<Self> {
        let path = config_path();
        if !path.exists() {
            tracing::info!("Config file not found, using defaults");
            return Ok(Self::default());
        }

        Self::load_from(&path)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Load configuration (default path or `path`) with environment variable overrides.
    pub fn load_with_env(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::load_from(p)?,
            None => Self::load()?,
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(level) = std::env::var("BATCHSCAN_LOG_LEVEL") {
            self.observability.log_level = level;
        }
        if let Ok(format) = std::env::var("BATCHSCAN_LOG_FORMAT") {
            self.observability.log_format = format;
        }

        if let Ok(url) = std::env::var("BATCHSCAN_DATA_URL") {
            self.market_data.base_url = url;
        }
        if let Ok(key) = std::env::var("BATCHSCAN_API_KEY") {
            self.market_data.api_key = Some(key);
        }
        if let Ok(secret) = std::env::var("BATCHSCAN_API_SECRET") {
            self.market_data.api_secret = Some(secret);
        }

        if let Ok(path) = std::env::var("BATCHSCAN_OUTPUT_PATH") {
            self.scanner
                .get_or_insert_with(ScannerConfig::default)
                .output_path = Some(PathBuf::from(path));
        }
    }

    /// Path the scan artifact is written to.
    pub fn output_path(&self) -> PathBuf {
        self.scanner
            .as_ref()
            .and_then(|s| s.output_path.clone())
            .unwrap_or_else(|| config_dir().join("output").join("scan_results.json"))
    }

    /// Path the gap-filtered artifact is written to.
    pub fn filtered_output_path(&self) -> PathBuf {
        self.scanner
            .as_ref()
            .and_then(|s| s.filtered_output_path.clone())
            .unwrap_or_else(|| config_dir().join("output").join("filtered_candidates.json"))
    }

    /// Path of the symbol universe file.
    pub fn universe_path(&self) -> PathBuf {
        self.scanner
            .as_ref()
            .and_then(|s| s.universe_path.clone())
            .unwrap_or_else(|| config_dir().join("universe.txt"))
    }

    /// Path of the symbol → sector map, if one is configured.
    pub fn sectors_path(&self) -> Option<PathBuf> {
        self.scanner.as_ref().and_then(|s| s.sectors_path.clone())
    }
}

// ============================================================================
// Observability
// ============================================================================

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level", alias = "level")]
    pub log_level: String,

    /// Log format (json, pretty)
    #[serde(default = "default_log_format", alias = "format")]
    pub log_format: String,

    /// Additional module targets to set to `warn`.
    #[serde(default)]
    pub excluded_targets: Vec<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
            excluded_targets: Vec::new(),
        }
    }
}

// ============================================================================
// Market Data
// ============================================================================

/// Upstream market data provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketDataConfig {
    /// REST base URL (no trailing slash)
    #[serde(default = "default_data_url")]
    pub base_url: String,

    /// API key ID header value
    #[serde(default)]
    pub api_key: Option<String>,

    /// API secret header value
    #[serde(default)]
    pub api_secret: Option<String>,

    /// Hard cap on symbols per request imposed by the provider
    #[serde(default = "default_max_symbols_per_request")]
    pub max_symbols_per_request: usize,

    /// Proactive request budget (requests per minute)
    #[serde(default = "default_rate_limit_rpm")]
    pub rate_limit_rpm: u32,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Optional data feed selector passed through to the provider
    #[serde(default)]
    pub feed: Option<String>,
}

impl Default for MarketDataConfig {
    fn default() -> Self {
        Self {
            base_url: default_data_url(),
            api_key: None,
            api_secret: None,
            max_symbols_per_request: default_max_symbols_per_request(),
            rate_limit_rpm: default_rate_limit_rpm(),
            timeout_secs: default_timeout_secs(),
            feed: None,
        }
    }
}

// ============================================================================
// Scanner
// ============================================================================

/// Scan pipeline configuration.
///
/// Every tuning value is optional so a partial file only overrides what it names.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScannerConfig {
    /// Symbols per upstream request
    #[serde(default)]
    pub batch_size: Option<usize>,

    /// Concurrent in-flight batch requests
    #[serde(default)]
    pub max_concurrent: Option<usize>,

    /// Attempts per batch before giving up
    #[serde(default)]
    pub max_retries: Option<u32>,

    /// First retry delay in milliseconds (doubles per attempt)
    #[serde(default)]
    pub backoff_base_ms: Option<u64>,

    /// Ceiling on any single retry delay in milliseconds
    #[serde(default)]
    pub max_backoff_ms: Option<u64>,

    /// Calendar days of daily history to request
    #[serde(default)]
    pub history_days: Option<i64>,

    /// Minimum usable symbols before the scan aborts
    #[serde(default)]
    pub min_symbols: Option<usize>,

    /// Minimum bars for a symbol to count as usable
    #[serde(default)]
    pub min_history_bars: Option<usize>,

    /// Candidates kept after ranking
    #[serde(default)]
    pub top_n: Option<usize>,

    /// Absolute gap fraction above which a candidate is rejected
    #[serde(default)]
    pub gap_threshold: Option<f64>,

    /// Benchmark symbol used for regime classification
    #[serde(default)]
    pub benchmark_symbol: Option<String>,

    /// Scan artifact location
    #[serde(default)]
    pub output_path: Option<PathBuf>,

    /// Gap-filter artifact location
    #[serde(default)]
    pub filtered_output_path: Option<PathBuf>,

    /// Symbol universe file
    #[serde(default)]
    pub universe_path: Option<PathBuf>,

    /// Symbol → sector JSON map
    #[serde(default)]
    pub sectors_path: Option<PathBuf>,
}

// Default value functions
fn default_log_level() -> String {
    "info".into()
}
fn default_log_format() -> String {
    "pretty".into()
}
fn default_data_url() -> String {
    "https://data.alpaca.markets".into()
}
fn default_max_symbols_per_request() -> usize {
    50
}
fn default_rate_limit_rpm() -> u32 {
    200
}
fn default_timeout_secs() -> u64 {
    30
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.observability.log_level, "info");
        assert_eq!(config.observability.log_format, "pretty");
        assert_eq!(config.market_data.max_symbols_per_request, 50);
        assert!(config.scanner.is_none());
    }

    #[test]
    fn test_partial_scanner_section() {
        let json = r#"{
            "observability": { "level": "debug" },
            "scanner": { "top_n": 8, "gap_threshold": 0.05 }
        }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.observability.log_level, "debug");
        let scanner = config.scanner.unwrap();
        assert_eq!(scanner.top_n, Some(8));
        assert_eq!(scanner.gap_threshold, Some(0.05));
        assert!(scanner.batch_size.is_none());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{ "market_data": { "base_url": "http://localhost:9999", "rate_limit_rpm": 60 } }"#,
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.market_data.base_url, "http://localhost:9999");
        assert_eq!(config.market_data.rate_limit_rpm, 60);
        assert_eq!(config.market_data.timeout_secs, 30);
    }

    #[test]
    fn test_load_from_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ broken").unwrap();

        let err = Config::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config"));
    }

    #[test]
    fn test_output_path_override() {
        let config = Config {
            scanner: Some(ScannerConfig {
                output_path: Some(PathBuf::from("/tmp/out/scan.json")),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert_eq!(config.output_path(), PathBuf::from("/tmp/out/scan.json"));
        assert!(config.filtered_output_path().ends_with("filtered_candidates.json"));
    }
}
