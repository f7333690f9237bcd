//! Market data module.
//!
//! Provides batched retrieval of historical bars and latest quotes from an
//! upstream provider that caps the number of symbols per request.
//!
//! # Layers
//! - **provider**: the `MarketDataProvider` trait and its error taxonomy
//! - **http**: REST implementation of the provider
//! - **rate_limiter**: proactive token bucket shared by all in-flight requests
//! - **batch**: `BatchFetcher`, the chunking / bounded-concurrency / retry layer

mod batch;
mod http;
mod provider;
mod rate_limiter;

pub use batch::{chunk_symbols, dedup_symbols, BatchConfig, BatchFetcher, BatchSource};
pub use http::HttpMarketDataProvider;
pub use provider::{MarketDataProvider, ProviderError};
pub use rate_limiter::{shared_limiter, RateLimiter, SharedRateLimiter};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Core Data Types
// ============================================================================

/// Bar granularity. The pipeline only consumes daily history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Timeframe {
    /// Daily bars
    Daily,
}

impl Timeframe {
    /// Convert to the provider's timeframe query value
    pub fn to_api_freq(&self) -> &'static str {
        match self {
            Self::Daily => "1Day",
        }
    }
}

impl std::fmt::Display for Timeframe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.to_api_freq())
    }
}

/// A single immutable OHLCV bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    /// Symbol/ticker
    pub symbol: String,
    /// Timeframe
    pub timeframe: Timeframe,
    /// Bar open time
    pub timestamp: DateTime<Utc>,
    /// Open price
    pub open: f64,
    /// High price
    pub high: f64,
    /// Low price
    pub low: f64,
    /// Close price
    pub close: f64,
    /// Volume
    pub volume: f64,
}

/// Latest bid/ask for a symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub symbol: String,
    /// Best bid (0 when missing)
    pub bid: f64,
    /// Best ask (0 when missing)
    pub ask: f64,
    pub timestamp: Option<DateTime<Utc>>,
}

impl Quote {
    /// Tradable reference price.
    ///
    /// Midpoint when both sides are positive, otherwise whichever side is
    /// positive, otherwise `None`.
    pub fn midpoint(&self) -> Option<f64> {
        let bid_ok = self.bid.is_finite() && self.bid > 0.0;
        let ask_ok = self.ask.is_finite() && self.ask > 0.0;
        match (bid_ok, ask_ok) {
            (true, true) => Some((self.ask + self.bid) / 2.0),
            (false, true) => Some(self.ask),
            (true, false) => Some(self.bid),
            (false, false) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quote(bid: f64, ask: f64) -> Quote {
        Quote {
            symbol: "AAPL".into(),
            bid,
            ask,
            timestamp: None,
        }
    }

    #[test]
    fn test_midpoint_both_sides() {
        assert_eq!(quote(99.0, 101.0).midpoint(), Some(100.0));
    }

    #[test]
    fn test_midpoint_one_side_fallback() {
        assert_eq!(quote(0.0, 101.0).midpoint(), Some(101.0));
        assert_eq!(quote(99.0, 0.0).midpoint(), Some(99.0));
        assert_eq!(quote(99.0, -1.0).midpoint(), Some(99.0));
    }

    #[test]
    fn test_midpoint_missing() {
        assert_eq!(quote(0.0, 0.0).midpoint(), None);
        assert_eq!(quote(f64::NAN, 0.0).midpoint(), None);
    }

    #[test]
    fn test_timeframe_api_value() {
        assert_eq!(Timeframe::Daily.to_string(), "1Day");
        assert_eq!(serde_json::to_string(&Timeframe::Daily).unwrap(), "\"daily\"");
    }
}
