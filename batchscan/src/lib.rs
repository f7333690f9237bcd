//! Batchscan Library
//!
//! Nightly scan pipeline over a universe of several hundred symbols:
//! bounded-concurrency batched market data retrieval, deterministic
//! composite ranking with diversification, and a pre-open gap filter.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐    ┌──────────────────────┐    ┌──────────────┐    ┌─────────┐
//! │ BatchFetcher │ ─► │ IndicatorEngine /    │ ─► │ SignalRanker │ ─► │ persist │
//! │ (daily bars) │    │ Strategy (external)  │    │              │    │ (atomic)│
//! └──────────────┘    └──────────────────────┘    └──────────────┘    └─────────┘
//!                                                                          │
//!                 ┌──────────────┐    ┌───────────┐                        │
//!                 │ BatchFetcher │ ─► │ GapFilter │ ◄──────────────────────┘
//!                 │ (quotes)     │    │           │   (near market open)
//!                 └──────────────┘    └───────────┘
//! ```
//!
//! The scan itself (`scanner::Scanner::run`) is a library entry point: the
//! embedding application supplies the indicator engine and strategies.

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod data;
pub mod gap_filter;
pub mod ranker;
pub mod scanner;
pub mod signal;
pub mod universe;

use std::sync::Arc;

use batchscan_common::config::Config;
use batchscan_common::validation::ValidationResult;

pub use data::{BatchConfig, BatchFetcher, BatchSource, HttpMarketDataProvider, MarketDataProvider};
pub use gap_filter::{FilterReport, FilteredCandidate, GapFilter, GapFilterConfig};
pub use ranker::{RankerConfig, SignalRanker};
pub use scanner::{BatchResult, IndicatorEngine, ScanConfig, Scanner, Strategy, StrategyContext};
pub use signal::{Candidate, Direction, OpenPosition, ScanResult, Signal, SignalDirection};
pub use universe::{load_sector_map, Universe};

/// Build a `BatchFetcher` over the configured HTTP provider.
pub fn fetcher_from_config(config: &Config) -> ValidationResult<BatchFetcher> {
    let provider: Arc<dyn MarketDataProvider> = Arc::new(HttpMarketDataProvider::from_config(config));
    BatchFetcher::new(provider, BatchConfig::from_config(config))
}

/// Build a `SignalRanker` from config, loading the sector map when one is configured.
pub fn ranker_from_config(config: &Config) -> batchscan_common::Result<SignalRanker> {
    let mut ranker_config = RankerConfig::from_config(config);
    if let Some(path) = config.sectors_path() {
        ranker_config = ranker_config.with_sectors(load_sector_map(&path)?);
    }
    Ok(SignalRanker::new(ranker_config))
}
