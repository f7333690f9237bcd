//! Pre-open gap filter.
//!
//! Re-prices the ranked shortlist against the latest tradable quote and
//! rejects candidates whose price moved more than the threshold away from
//! the close they were ranked on. The filter fails open: missing data keeps
//! the candidate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

use batchscan_common::config::Config;
use batchscan_common::validation::{Validate, ValidationError, ValidationResult};

use crate::data::BatchSource;
use crate::signal::Candidate;

/// Reason recorded when no usable quote came back for a symbol.
pub const REASON_NO_QUOTE: &str = "no_quote_data";
/// Reason recorded when the candidate's reference close is unusable.
pub const REASON_NO_PREV_CLOSE: &str = "no_prev_close";
/// Reason recorded on every candidate when the whole quote fetch failed.
pub const REASON_FETCH_FAILED: &str = "quote_fetch_failed";

// ============================================================================
// Configuration
// ============================================================================

/// Gap filter configuration.
#[derive(Debug, Clone)]
pub struct GapFilterConfig {
    /// Absolute gap fraction; strictly greater is rejected
    pub threshold: f64,
}

impl Default for GapFilterConfig {
    fn default() -> Self {
        Self { threshold: 0.03 }
    }
}

impl GapFilterConfig {
    /// Create from config
    pub fn from_config(config: &Config) -> Self {
        config
            .scanner
            .as_ref()
            .and_then(|s| s.gap_threshold)
            .map(|threshold| Self { threshold })
            .unwrap_or_default()
    }
}

impl Validate for GapFilterConfig {
    fn validate(&self) -> ValidationResult<()> {
        if !(self.threshold > 0.0 && self.threshold < 1.0) {
            return Err(ValidationError::InvalidValue {
                field: "gap_filter.threshold".into(),
                reason: format!("must be in (0, 1), got {}", self.threshold),
            });
        }
        Ok(())
    }
}

// ============================================================================
// Filter Output
// ============================================================================

/// A candidate after the gap check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilteredCandidate {
    #[serde(flatten)]
    pub candidate: Candidate,
    pub pre_market_price: Option<f64>,
    /// Signed fractional move from `prev_close`; unset without usable data
    pub gap_pct: Option<f64>,
    pub passed_filter: bool,
    /// Empty when passed on a real price check
    pub filter_reason: String,
}

/// Persisted output of one filter pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterReport {
    pub filtered_at: DateTime<Utc>,
    pub threshold: f64,
    pub admitted: usize,
    pub rejected: usize,
    pub candidates: Vec<FilteredCandidate>,
}

impl FilterReport {
    pub fn new(threshold: f64, candidates: Vec<FilteredCandidate>) -> Self {
        let admitted = candidates.iter().filter(|c| c.passed_filter).count();
        Self {
            filtered_at: Utc::now(),
            threshold,
            admitted,
            rejected: candidates.len() - admitted,
            candidates,
        }
    }

    /// Candidates eligible for execution, in rank order.
    pub fn admitted(&self) -> impl Iterator<Item = &FilteredCandidate> {
        self.candidates.iter().filter(|c| c.passed_filter)
    }

    pub fn summary(&self) -> String {
        format!(
            "Gap filter ({:.1}%): {} admitted, {} rejected",
            self.threshold * 100.0,
            self.admitted,
            self.rejected
        )
    }
}

// ============================================================================
// Gap Filter
// ============================================================================

/// Admission gate between the ranked shortlist and execution.
pub struct GapFilter {
    config: GapFilterConfig,
    source: Arc<dyn BatchSource>,
}

impl GapFilter {
    pub fn new(config: GapFilterConfig, source: Arc<dyn BatchSource>) -> ValidationResult<Self> {
        config.validate()?;
        Ok(Self { config, source })
    }

    pub fn threshold(&self) -> f64 {
        self.config.threshold
    }

    /// Check one candidate against a latest price.
    pub fn evaluate(&self, candidate: Candidate, latest: Option<f64>) -> FilteredCandidate {
        let latest = latest.filter(|p| p.is_finite() && *p > 0.0);

        let Some(price) = latest else {
            return FilteredCandidate {
                candidate,
                pre_market_price: None,
                gap_pct: None,
                passed_filter: true,
                filter_reason: REASON_NO_QUOTE.into(),
            };
        };

        let prev_close = candidate.prev_close;
        if !(prev_close.is_finite() && prev_close > 0.0) {
            return FilteredCandidate {
                candidate,
                pre_market_price: Some(price),
                gap_pct: None,
                passed_filter: true,
                filter_reason: REASON_NO_PREV_CLOSE.into(),
            };
        }

        let gap = (price - prev_close) / prev_close;
        let rejected = gap.abs() > self.config.threshold;
        let reason = if rejected {
            let side = if gap > 0.0 { "up" } else { "down" };
            format!("gap_{}_{:.1}pct", side, gap.abs() * 100.0)
        } else {
            String::new()
        };

        if rejected {
            info!(
                symbol = %candidate.symbol,
                prev_close,
                price,
                gap_pct = gap,
                "Gap filter rejected candidate"
            );
        }

        FilteredCandidate {
            candidate,
            pre_market_price: Some(price),
            gap_pct: Some(gap),
            passed_filter: !rejected,
            filter_reason: reason,
        }
    }

    /// Re-price and gate the shortlist with one batched quote fetch.
    pub async fn filter(&self, candidates: Vec<Candidate>) -> Vec<FilteredCandidate> {
        if candidates.is_empty() {
            return Vec::new();
        }

        let symbols: Vec<String> = candidates.iter().map(|c| c.symbol.clone()).collect();

        let quotes: HashMap<String, f64> = match self.source.fetch_latest_quotes(&symbols).await {
            Ok(quotes) => quotes,
            Err(e) => {
                warn!(
                    error = %format!("{:#}", e),
                    candidates = candidates.len(),
                    "Quote fetch failed, admitting all candidates unfiltered"
                );
                return candidates
                    .into_iter()
                    .map(|candidate| FilteredCandidate {
                        candidate,
                        pre_market_price: None,
                        gap_pct: None,
                        passed_filter: true,
                        filter_reason: REASON_FETCH_FAILED.into(),
                    })
                    .collect();
            }
        };

        candidates
            .into_iter()
            .map(|candidate| {
                let price = quotes.get(&candidate.symbol).copied();
                self.evaluate(candidate, price)
            })
            .collect()
    }

    /// Filter and wrap the outcome in a report.
    pub async fn run(&self, candidates: Vec<Candidate>) -> FilterReport {
        let filtered = self.filter(candidates).await;
        let report = FilterReport::new(self.config.threshold, filtered);
        info!(
            admitted = report.admitted,
            rejected = report.rejected,
            threshold = report.threshold,
            "Gap filter complete"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Bar;
    use crate::signal::{Direction, IndicatorSnapshot, Metadata};
    use async_trait::async_trait;
    use test_case::test_case;

    struct FixedQuotes(HashMap<String, f64>);

    #[async_trait]
    impl BatchSource for FixedQuotes {
        async fn fetch_daily_bars(
            &self,
            _symbols: &[String],
            _days: i64,
        ) -> anyhow::Result<HashMap<String, Vec<Bar>>> {
            Ok(HashMap::new())
        }

        async fn fetch_latest_quotes(&self, _symbols: &[String]) -> anyhow::Result<HashMap<String, f64>> {
            Ok(self.0.clone())
        }
    }

    fn candidate(symbol: &str, prev_close: f64) -> Candidate {
        Candidate {
            rank: 1,
            symbol: symbol.into(),
            strategy: "momentum".into(),
            direction: Direction::Long,
            signal_strength: 0.8,
            composite_score: 0.9,
            regime_compatibility: 0.75,
            sector: "Unknown".into(),
            prev_close,
            indicators: IndicatorSnapshot::new(),
            metadata: Metadata::new(),
            scanned_at: Utc::now(),
        }
    }

    fn filter() -> GapFilter {
        GapFilter::new(GapFilterConfig::default(), Arc::new(FixedQuotes(HashMap::new()))).unwrap()
    }

    #[test_case(103.0, true, "" ; "exactly three percent up passes")]
    #[test_case(97.0, true, "" ; "exactly three percent down passes")]
    #[test_case(103.01, false, "gap_up_3.0pct" ; "just above threshold rejected")]
    #[test_case(104.2, false, "gap_up_4.2pct" ; "gap up")]
    #[test_case(95.0, false, "gap_down_5.0pct" ; "gap down")]
    #[test_case(100.5, true, "" ; "small move passes")]
    fn test_gap_boundaries(price: f64, passed: bool, reason: &str) {
        let result = filter().evaluate(candidate("AAPL", 100.0), Some(price));
        assert_eq!(result.passed_filter, passed);
        assert_eq!(result.filter_reason, reason);
        assert!(result.gap_pct.is_some());
        assert_eq!(result.pre_market_price, Some(price));
    }

    #[test_case(None ; "missing quote")]
    #[test_case(Some(0.0) ; "zero quote")]
    #[test_case(Some(-3.0) ; "negative quote")]
    fn test_no_quote_passes(price: Option<f64>) {
        let result = filter().evaluate(candidate("AAPL", 100.0), price);
        assert!(result.passed_filter);
        assert_eq!(result.filter_reason, REASON_NO_QUOTE);
        assert!(result.gap_pct.is_none());
    }

    #[test]
    fn test_no_prev_close_passes() {
        let result = filter().evaluate(candidate("AAPL", 0.0), Some(120.0));
        assert!(result.passed_filter);
        assert_eq!(result.filter_reason, REASON_NO_PREV_CLOSE);
        assert!(result.gap_pct.is_none());
    }

    #[tokio::test]
    async fn test_empty_input() {
        assert!(filter().filter(Vec::new()).await.is_empty());
    }

    #[tokio::test]
    async fn test_filter_uses_batched_quotes() {
        let quotes = HashMap::from([("AAPL".to_string(), 110.0), ("MSFT".to_string(), 101.0)]);
        let gf = GapFilter::new(GapFilterConfig::default(), Arc::new(FixedQuotes(quotes))).unwrap();

        let report = gf
            .run(vec![candidate("AAPL", 100.0), candidate("MSFT", 100.0), candidate("XOM", 100.0)])
            .await;

        assert_eq!(report.admitted, 2);
        assert_eq!(report.rejected, 1);
        let admitted: Vec<&str> = report.admitted().map(|c| c.candidate.symbol.as_str()).collect();
        assert_eq!(admitted, vec!["MSFT", "XOM"]);
        assert_eq!(report.candidates[2].filter_reason, REASON_NO_QUOTE);
    }

    #[test]
    fn test_threshold_validation() {
        assert!(GapFilterConfig { threshold: 0.0 }.validate().is_err());
        assert!(GapFilterConfig { threshold: f64::NAN }.validate().is_err());
        assert!(GapFilterConfig { threshold: 0.05 }.validate().is_ok());
    }

    #[test]
    fn test_report_serializes_flat() {
        let result = filter().evaluate(candidate("AAPL", 100.0), Some(104.2));
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["symbol"], "AAPL");
        assert_eq!(json["passed_filter"], false);
        assert_eq!(json["filter_reason"], "gap_up_4.2pct");
    }
}
