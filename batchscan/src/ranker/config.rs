//! Ranker configuration.
//!
//! Weights, the regime compatibility table and the diversification bonuses
//! are all injected here; the ranker itself holds no other state.

use std::collections::HashMap;

use batchscan_common::config::Config;
use batchscan_common::validation::{require_positive, Validate, ValidationError, ValidationResult};

use crate::signal::Direction;

// ============================================================================
// Trend Boost
// ============================================================================

/// Extra regime compatibility for one (strategy, direction) pair when a
/// trend-strength indicator is above a threshold.
#[derive(Debug, Clone)]
pub struct TrendBoost {
    pub strategy: String,
    pub direction: Direction,
    /// Indicator read from the scan result snapshot
    pub indicator: String,
    /// Boost starts above this reading
    pub threshold: f64,
    /// Boost per indicator point above the threshold
    pub per_point: f64,
    /// Boost ceiling
    pub cap: f64,
}

impl Default for TrendBoost {
    fn default() -> Self {
        Self {
            strategy: "trend_following".into(),
            direction: Direction::Long,
            indicator: "adx".into(),
            threshold: 25.0,
            per_point: 0.01,
            cap: 0.15,
        }
    }
}

impl TrendBoost {
    /// Boost for a given indicator reading; zero at or below the threshold.
    pub fn boost_for(&self, reading: f64) -> f64 {
        if reading > self.threshold {
            ((reading - self.threshold) * self.per_point).min(self.cap)
        } else {
            0.0
        }
    }
}

// ============================================================================
// Ranker Configuration
// ============================================================================

/// Configuration for `SignalRanker`.
#[derive(Debug, Clone)]
pub struct RankerConfig {
    /// Candidates kept after ranking
    pub top_n: usize,
    pub strength_weight: f64,
    pub regime_weight: f64,
    pub sector_weight: f64,
    /// Sector bonus lost per candidate already occupying the sector
    pub sector_decay: f64,
    /// (strategy, direction) → compatibility in [0, 1]
    pub compatibility: HashMap<(String, Direction), f64>,
    /// Compatibility for pairs missing from the table
    pub default_compatibility: f64,
    pub trend_boost: Option<TrendBoost>,
    /// Added when the strategy has no open positions
    pub diversity_bonus_none: f64,
    /// Added when the strategy has exactly one open position
    pub diversity_bonus_one: f64,
    /// symbol → sector
    pub sectors: HashMap<String, String>,
    pub default_sector: String,
}

impl Default for RankerConfig {
    fn default() -> Self {
        Self {
            top_n: 12,
            strength_weight: 0.6,
            regime_weight: 0.3,
            sector_weight: 0.1,
            sector_decay: 0.25,
            compatibility: default_compatibility_table(),
            default_compatibility: 0.60,
            trend_boost: Some(TrendBoost::default()),
            diversity_bonus_none: 0.25,
            diversity_bonus_one: 0.10,
            sectors: HashMap::new(),
            default_sector: "Unknown".into(),
        }
    }
}

fn default_compatibility_table() -> HashMap<(String, Direction), f64> {
    [
        ("trend_following", Direction::Long, 0.80),
        ("trend_following", Direction::Short, 0.55),
        ("momentum", Direction::Long, 0.75),
        ("momentum", Direction::Short, 0.50),
        ("mean_reversion", Direction::Long, 0.70),
        ("mean_reversion", Direction::Short, 0.65),
        ("breakout", Direction::Long, 0.75),
        ("breakout", Direction::Short, 0.45),
    ]
    .into_iter()
    .map(|(strategy, direction, value)| ((strategy.to_string(), direction), value))
    .collect()
}

impl RankerConfig {
    /// Create from config
    pub fn from_config(config: &Config) -> Self {
        let defaults = Self::default();
        Self {
            top_n: config
                .scanner
                .as_ref()
                .and_then(|s| s.top_n)
                .unwrap_or(defaults.top_n),
            ..defaults
        }
    }

    /// Replace the symbol → sector map.
    pub fn with_sectors(mut self, sectors: HashMap<String, String>) -> Self {
        self.sectors = sectors;
        self
    }

    /// Set one compatibility table entry.
    pub fn with_compatibility(
        mut self,
        strategy: impl Into<String>,
        direction: Direction,
        value: f64,
    ) -> Self {
        self.compatibility.insert((strategy.into(), direction), value);
        self
    }

    /// Sector for a symbol, falling back to the default sector.
    pub fn sector_of(&self, symbol: &str) -> &str {
        self.sectors
            .get(symbol)
            .map(String::as_str)
            .unwrap_or(&self.default_sector)
    }
}

impl Validate for RankerConfig {
    fn validate(&self) -> ValidationResult<()> {
        require_positive("ranker.top_n", self.top_n)?;

        let weights = [
            ("ranker.strength_weight", self.strength_weight),
            ("ranker.regime_weight", self.regime_weight),
            ("ranker.sector_weight", self.sector_weight),
            ("ranker.sector_decay", self.sector_decay),
            ("ranker.diversity_bonus_none", self.diversity_bonus_none),
            ("ranker.diversity_bonus_one", self.diversity_bonus_one),
        ];
        for (field, value) in weights {
            if !value.is_finite() || value < 0.0 {
                return Err(ValidationError::InvalidValue {
                    field: field.into(),
                    reason: format!("must be a non-negative number, got {}", value),
                });
            }
        }

        let out_of_range = self
            .compatibility
            .values()
            .chain(std::iter::once(&self.default_compatibility))
            .any(|v| !(0.0..=1.0).contains(v));
        if out_of_range {
            return Err(ValidationError::InvalidValue {
                field: "ranker.compatibility".into(),
                reason: "compatibility values must lie in [0, 1]".into(),
            });
        }

        Ok(())
    }
}
