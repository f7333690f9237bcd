//! Configuration validation for batchscan.
//!
//! Provides validation logic for configuration fields to ensure
//! all required values are present and within valid ranges. Misconfiguration
//! is the only fatal error class in the pipeline, so it is caught here,
//! before any network I/O starts.

use thiserror::Error;

use crate::config::{Config, MarketDataConfig, ObservabilityConfig, ScannerConfig};
use crate::logging::LogFormat;

/// Configuration validation error.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Configuration conflict: {reason}")]
    Conflict { reason: String },

    #[error("Multiple validation errors: {0:?}")]
    Multiple(Vec<ValidationError>),
}

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Trait for validatable configuration sections.
pub trait Validate {
    /// Validate this configuration section.
    fn validate(&self) -> ValidationResult<()>;
}

/// Reject zero for a positive-count field.
pub fn require_positive(field: &str, value: usize) -> ValidationResult<()> {
    if value == 0 {
        return Err(ValidationError::InvalidValue {
            field: field.into(),
            reason: "must be greater than 0".into(),
        });
    }
    Ok(())
}

impl Config {
    /// Validate the entire configuration.
    pub fn validate(&self) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if let Err(e) = self.observability.validate() {
            errors.push(e);
        }

        if let Err(e) = self.market_data.validate() {
            errors.push(e);
        }

        if let Some(ref scanner) = self.scanner {
            if let Err(e) = scanner.validate() {
                errors.push(e);
            }
        }

        if let Err(e) = self.check_batch_cap() {
            errors.push(e);
        }

        if errors.is_empty() {
            Ok(())
        } else if errors.len() == 1 {
            Err(errors.remove(0))
        } else {
            Err(ValidationError::Multiple(errors))
        }
    }

    /// The configured batch size must fit under the provider's per-request symbol cap.
    fn check_batch_cap(&self) -> ValidationResult<()> {
        let batch_size = self.scanner.as_ref().and_then(|s| s.batch_size);
        if let Some(size) = batch_size {
            if size > self.market_data.max_symbols_per_request {
                return Err(ValidationError::Conflict {
                    reason: format!(
                        "scanner.batch_size {} exceeds market_data.max_symbols_per_request {}",
                        size, self.market_data.max_symbols_per_request
                    ),
                });
            }
        }
        Ok(())
    }
}

impl Validate for ObservabilityConfig {
    fn validate(&self) -> ValidationResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(ValidationError::InvalidValue {
                field: "observability.log_level".into(),
                reason: format!("must be one of: {}", valid_levels.join(", ")),
            });
        }

        if LogFormat::from_name(&self.log_format).is_none() {
            return Err(ValidationError::InvalidValue {
                field: "observability.log_format".into(),
                reason: format!("must be one of: {}", LogFormat::NAMES.join(", ")),
            });
        }

        Ok(())
    }
}

impl Validate for MarketDataConfig {
    fn validate(&self) -> ValidationResult<()> {
        if self.base_url.is_empty() {
            return Err(ValidationError::MissingField {
                field: "market_data.base_url".into(),
            });
        }
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(ValidationError::InvalidValue {
                field: "market_data.base_url".into(),
                reason: "must start with http:// or https://".into(),
            });
        }

        require_positive(
            "market_data.max_symbols_per_request",
            self.max_symbols_per_request,
        )?;
        require_positive("market_data.rate_limit_rpm", self.rate_limit_rpm as usize)?;

        if self.timeout_secs == 0 {
            return Err(ValidationError::InvalidValue {
                field: "market_data.timeout_secs".into(),
                reason: "must be greater than 0".into(),
            });
        }

        Ok(())
    }
}

impl Validate for ScannerConfig {
    fn validate(&self) -> ValidationResult<()> {
        if let Some(size) = self.batch_size {
            require_positive("scanner.batch_size", size)?;
        }
        if let Some(n) = self.max_concurrent {
            require_positive("scanner.max_concurrent", n)?;
        }
        if let Some(n) = self.max_retries {
            require_positive("scanner.max_retries", n as usize)?;
        }
        if let (Some(base), Some(ceiling)) = (self.backoff_base_ms, self.max_backoff_ms) {
            if ceiling < base {
                return Err(ValidationError::Conflict {
                    reason: format!(
                        "scanner.max_backoff_ms {} is below scanner.backoff_base_ms {}",
                        ceiling, base
                    ),
                });
            }
        }
        if let Some(days) = self.history_days {
            if days <= 0 {
                return Err(ValidationError::InvalidValue {
                    field: "scanner.history_days".into(),
                    reason: "must be greater than 0".into(),
                });
            }
        }
        if let Some(n) = self.top_n {
            require_positive("scanner.top_n", n)?;
        }
        if let Some(threshold) = self.gap_threshold {
            if !(threshold > 0.0 && threshold < 1.0) {
                return Err(ValidationError::InvalidValue {
                    field: "scanner.gap_threshold".into(),
                    reason: format!("must be within (0, 1), got {}", threshold),
                });
            }
        }
        if let Some(ref symbol) = self.benchmark_symbol {
            if symbol.trim().is_empty() {
                return Err(ValidationError::MissingField {
                    field: "scanner.benchmark_symbol".into(),
                });
            }
        }

        Ok(())
    }
}
