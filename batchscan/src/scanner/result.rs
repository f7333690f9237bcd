//! Persisted scan artifact.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::signal::Candidate;

/// Symbol used for pipeline-level errors.
pub const ALL_SYMBOLS: &str = "__all__";

/// Error recorded when too few symbols had usable history.
pub const INSUFFICIENT_DATA: &str = "insufficient_data";

/// One entry of `BatchResult::errors`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanError {
    pub symbol: String,
    pub error: String,
}

impl ScanError {
    pub fn new(symbol: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            error: error.into(),
        }
    }

    /// Whole-run abort marker.
    pub fn insufficient_data() -> Self {
        Self::new(ALL_SYMBOLS, INSUFFICIENT_DATA)
    }
}

/// Output of one scan run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchResult {
    pub run_at: DateTime<Utc>,
    pub scan_duration_secs: f64,
    pub symbols_scanned: usize,
    pub symbols_with_signals: usize,
    pub regime: String,
    pub candidates: Vec<Candidate>,
    pub errors: Vec<ScanError>,
}

impl BatchResult {
    /// Whether the run stopped before ranking.
    pub fn is_aborted(&self) -> bool {
        self.errors.iter().any(|e| e.symbol == ALL_SYMBOLS)
    }

    pub fn summary(&self) -> String {
        if self.is_aborted() {
            return format!(
                "Scan aborted after {:.1}s: {} usable symbols",
                self.scan_duration_secs, self.symbols_scanned
            );
        }

        let mut out = format!(
            "Scanned {} symbols in {:.1}s ({} regime): {} with signals, {} candidates",
            self.symbols_scanned,
            self.scan_duration_secs,
            self.regime,
            self.symbols_with_signals,
            self.candidates.len()
        );
        if !self.errors.is_empty() {
            out.push_str(&format!(", {} errors", self.errors.len()));
        }
        if let Some(top) = self.candidates.first() {
            out.push_str(&format!(
                "; top: {} {} {} ({:.3})",
                top.symbol, top.strategy, top.direction, top.composite_score
            ));
        }
        out
    }
}
