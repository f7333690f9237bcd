//! Signal data model shared by the scanner, ranker and gap filter.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ============================================================================
// Indicators
// ============================================================================

/// One indicator reading: a scalar, a named group (e.g. MACD line/signal/hist)
/// or missing (not enough history).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IndicatorValue {
    Number(f64),
    Nested(BTreeMap<String, f64>),
    Missing,
}

impl IndicatorValue {
    /// Scalar value, if this reading is a finite number.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(v) if v.is_finite() => Some(*v),
            _ => None,
        }
    }
}

/// Indicator snapshot keyed by indicator name.
pub type IndicatorSnapshot = BTreeMap<String, IndicatorValue>;

/// Free-form metadata attached to signals and candidates.
pub type Metadata = BTreeMap<String, serde_json::Value>;

// ============================================================================
// Direction
// ============================================================================

/// Direction of a new-entry candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Long => "long",
            Self::Short => "short",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Direction a strategy may emit; `Close` is an exit and never becomes a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalDirection {
    Long,
    Short,
    Close,
}

impl SignalDirection {
    /// Entry direction, or `None` for exit signals.
    pub fn entry(self) -> Option<Direction> {
        match self {
            Self::Long => Some(Direction::Long),
            Self::Short => Some(Direction::Short),
            Self::Close => None,
        }
    }
}

// ============================================================================
// Signal / ScanResult
// ============================================================================

/// A strategy's verdict for one symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub direction: SignalDirection,
    /// Confidence in [0, 1]
    pub strength: f64,
    #[serde(default)]
    pub metadata: Metadata,
}

impl Signal {
    pub fn new(direction: SignalDirection, strength: f64) -> Self {
        Self {
            direction,
            strength,
            metadata: Metadata::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// One (symbol, strategy) entry detection from a scan run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanResult {
    pub symbol: String,
    pub strategy: String,
    pub direction: Direction,
    /// Confidence in [0, 1]
    pub signal_strength: f64,
    pub indicators: IndicatorSnapshot,
    /// Close of the last bar the signal was computed on
    pub prev_close: f64,
    pub scanned_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: Metadata,
}

impl ScanResult {
    /// Build from a strategy signal. Returns `None` for exit signals.
    ///
    /// Strength is clamped into [0, 1]; a NaN strength becomes 0.
    pub fn from_signal(
        symbol: impl Into<String>,
        strategy: impl Into<String>,
        signal: Signal,
        indicators: IndicatorSnapshot,
        prev_close: f64,
        scanned_at: DateTime<Utc>,
    ) -> Option<Self> {
        let direction = signal.direction.entry()?;
        let strength = if signal.strength.is_nan() {
            0.0
        } else {
            signal.strength.clamp(0.0, 1.0)
        };

        Some(Self {
            symbol: symbol.into(),
            strategy: strategy.into(),
            direction,
            signal_strength: strength,
            indicators,
            prev_close,
            scanned_at,
            metadata: signal.metadata,
        })
    }
}

// ============================================================================
// Candidate
// ============================================================================

/// A ranked scan result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    /// 1 = best
    pub rank: usize,
    pub symbol: String,
    pub strategy: String,
    pub direction: Direction,
    pub signal_strength: f64,
    /// Weighted score; may exceed 1.0 after the diversity bonus
    pub composite_score: f64,
    pub regime_compatibility: f64,
    pub sector: String,
    pub prev_close: f64,
    pub indicators: IndicatorSnapshot,
    #[serde(default)]
    pub metadata: Metadata,
    pub scanned_at: DateTime<Utc>,
}

impl Candidate {
    /// Unranked candidate carrying everything from the scan result.
    pub(crate) fn from_result(
        result: ScanResult,
        regime_compatibility: f64,
        sector: String,
    ) -> Self {
        Self {
            rank: 0,
            symbol: result.symbol,
            strategy: result.strategy,
            direction: result.direction,
            signal_strength: result.signal_strength,
            composite_score: 0.0,
            regime_compatibility,
            sector,
            prev_close: result.prev_close,
            indicators: result.indicators,
            metadata: result.metadata,
            scanned_at: result.scanned_at,
        }
    }
}

/// A currently open position, used for strategy diversification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenPosition {
    pub symbol: String,
    pub strategy: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_close_signal_is_not_a_result() {
        let signal = Signal::new(SignalDirection::Close, 0.9);
        let result = ScanResult::from_signal("AAPL", "momentum", signal, IndicatorSnapshot::new(), 100.0, Utc::now());
        assert!(result.is_none());
    }

    #[test]
    fn test_strength_clamped() {
        let now = Utc::now();
        let hi = ScanResult::from_signal("A", "s", Signal::new(SignalDirection::Long, 1.7), IndicatorSnapshot::new(), 1.0, now).unwrap();
        let nan = ScanResult::from_signal("A", "s", Signal::new(SignalDirection::Short, f64::NAN), IndicatorSnapshot::new(), 1.0, now).unwrap();
        assert_eq!(hi.signal_strength, 1.0);
        assert_eq!(nan.signal_strength, 0.0);
        assert_eq!(nan.direction, Direction::Short);
    }

    #[test]
    fn test_indicator_value_json_shapes() {
        let mut snapshot = IndicatorSnapshot::new();
        snapshot.insert("adx".into(), IndicatorValue::Number(31.5));
        snapshot.insert(
            "macd".into(),
            IndicatorValue::Nested(BTreeMap::from([("hist".to_string(), 0.4)])),
        );
        snapshot.insert("sma_200".into(), IndicatorValue::Missing);

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["adx"], 31.5);
        assert_eq!(json["macd"]["hist"], 0.4);
        assert!(json["sma_200"].is_null());

        let back: IndicatorSnapshot = serde_json::from_value(json).unwrap();
        assert_eq!(back, snapshot);
    }
}
