//! Market regime classification.

use std::collections::HashMap;

use crate::data::Bar;

/// Regime tag when the benchmark cannot be classified.
pub const REGIME_UNKNOWN: &str = "unknown";

/// Labels the market regime for one scan run from the fetched history.
pub trait RegimeClassifier: Send + Sync {
    fn classify(&self, bars: &HashMap<String, Vec<Bar>>) -> String;
}

/// Bull/bear from the benchmark's last close against its simple moving average.
#[derive(Debug, Clone)]
pub struct BenchmarkTrendRegime {
    benchmark: String,
    lookback: usize,
}

impl BenchmarkTrendRegime {
    pub fn new(benchmark: impl Into<String>) -> Self {
        Self {
            benchmark: benchmark.into(),
            lookback: 50,
        }
    }

    /// Averaging window in bars; clamped to at least one.
    pub fn with_lookback(mut self, lookback: usize) -> Self {
        self.lookback = lookback.max(1);
        self
    }

    pub fn benchmark(&self) -> &str {
        &self.benchmark
    }

    pub fn lookback(&self) -> usize {
        self.lookback
    }
}

impl Default for BenchmarkTrendRegime {
    fn default() -> Self {
        Self::new("SPY")
    }
}

impl RegimeClassifier for BenchmarkTrendRegime {
    fn classify(&self, bars: &HashMap<String, Vec<Bar>>) -> String {
        let Some(series) = bars.get(&self.benchmark) else {
            return REGIME_UNKNOWN.into();
        };
        let lookback = self.lookback.max(1);
        if series.len() < lookback {
            return REGIME_UNKNOWN.into();
        }

        let window = &series[series.len() - lookback..];
        let sma = window.iter().map(|b| b.close).sum::<f64>() / lookback as f64;
        let Some(last) = window.last().map(|b| b.close) else {
            return REGIME_UNKNOWN.into();
        };

        if last >= sma {
            "bull".into()
        } else {
            "bear".into()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Timeframe;
    use chrono::{Duration, TimeZone, Utc};

    fn series(closes: &[f64]) -> Vec<Bar> {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, c)| Bar {
                symbol: "SPY".into(),
                timeframe: Timeframe::Daily,
                timestamp: start + Duration::days(i as i64),
                open: *c,
                high: *c,
                low: *c,
                close: *c,
                volume: 1.0,
            })
            .collect()
    }

    #[test]
    fn test_bull_and_bear() {
        let regime = BenchmarkTrendRegime::new("SPY").with_lookback(5);

        let rising: Vec<f64> = (1..=10).map(|i| i as f64).collect();
        let bars = HashMap::from([("SPY".to_string(), series(&rising))]);
        assert_eq!(regime.classify(&bars), "bull");

        let falling: Vec<f64> = (1..=10).rev().map(|i| i as f64).collect();
        let bars = HashMap::from([("SPY".to_string(), series(&falling))]);
        assert_eq!(regime.classify(&bars), "bear");
    }

    #[test]
    fn test_unknown_without_enough_history() {
        let regime = BenchmarkTrendRegime::default();
        assert_eq!(regime.classify(&HashMap::new()), REGIME_UNKNOWN);

        let bars = HashMap::from([("SPY".to_string(), series(&[1.0, 2.0, 3.0]))]);
        assert_eq!(regime.classify(&bars), REGIME_UNKNOWN);
    }

    #[test]
    fn test_zero_lookback_clamped() {
        let regime = BenchmarkTrendRegime::new("SPY").with_lookback(0);
        assert_eq!(regime.lookback(), 1);
        assert_eq!(regime.benchmark(), "SPY");

        let bars = HashMap::from([("SPY".to_string(), series(&[42.0]))]);
        assert_eq!(regime.classify(&bars), "bull");
    }
}
