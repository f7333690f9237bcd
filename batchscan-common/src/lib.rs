//! Batchscan Common - Shared types, utilities, and configuration for the batchscan pipeline.
//!
//! This crate provides:
//! - Configuration types and loading
//! - Configuration validation
//! - Error types and handling utilities
//! - Logging setup and structured logging helpers

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod logging;
pub mod validation;

pub use config::{Config, MarketDataConfig, ObservabilityConfig, ScannerConfig};
pub use error::{Error, Result};
pub use validation::{Validate, ValidationError, ValidationResult};
