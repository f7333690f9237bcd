//! Deterministic composite ranking with sector and strategy diversification.
//!
//! # Pipeline
//! 1. Regime compatibility from the (strategy, direction) table, plus the
//!    optional trend boost
//! 2. Sector lookup
//! 3. Pre-sort by (strength desc, symbol asc)
//! 4. Sector bonus from a per-sector occupancy counter, in pre-sort order
//! 5. `composite = w_s·strength + w_r·regime + w_b·sector_bonus`
//! 6. Strategy diversity bonus from open positions (unclamped)
//! 7. Final sort by (composite desc, strength desc, symbol asc)
//! 8. Truncate to `top_n`, assign ranks 1..n
//!
//! The output depends only on the set of inputs, never on their order.

mod config;

pub use config::{RankerConfig, TrendBoost};

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

use crate::signal::{Candidate, OpenPosition, ScanResult};

/// Sector bonus for the next candidate entering a sector that already holds
/// `occupancy` candidates. Never negative.
pub fn sector_bonus(occupancy: usize, decay: f64) -> f64 {
    (1.0 - occupancy as f64 * decay).max(0.0)
}

/// Ranks scan results into a bounded, diversified shortlist.
#[derive(Debug, Clone, Default)]
pub struct SignalRanker {
    config: RankerConfig,
}

impl SignalRanker {
    pub fn new(config: RankerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RankerConfig {
        &self.config
    }

    /// Regime compatibility of a scan result, clamped to at most 1.0.
    pub fn regime_compatibility(&self, result: &ScanResult) -> f64 {
        let base = self
            .config
            .compatibility
            .get(&(result.strategy.clone(), result.direction))
            .copied()
            .unwrap_or(self.config.default_compatibility);

        let boost = match self.config.trend_boost {
            Some(ref tb) if tb.strategy == result.strategy && tb.direction == result.direction => result
                .indicators
                .get(&tb.indicator)
                .and_then(|v| v.as_f64())
                .map(|reading| tb.boost_for(reading))
                .unwrap_or(0.0),
            _ => 0.0,
        };

        (base + boost).min(1.0)
    }

    /// Rank scan results.
    ///
    /// `open_positions = None` skips the strategy diversity bonus entirely;
    /// `Some(&[])` grants every strategy the zero-positions bonus.
    pub fn rank(
        &self,
        results: Vec<ScanResult>,
        open_positions: Option<&[OpenPosition]>,
    ) -> Vec<Candidate> {
        if results.is_empty() {
            return Vec::new();
        }
        let input_count = results.len();

        let mut candidates: Vec<Candidate> = results
            .into_iter()
            .map(|result| {
                let compatibility = self.regime_compatibility(&result);
                let sector = self.config.sector_of(&result.symbol).to_string();
                Candidate::from_result(result, compatibility, sector)
            })
            .collect();

        // Pre-sort order decides which candidate claims a sector slot first.
        candidates.sort_by(|a, b| {
            b.signal_strength
                .total_cmp(&a.signal_strength)
                .then_with(|| identity_order(a, b))
        });

        let mut occupancy: BTreeMap<String, usize> = BTreeMap::new();
        for candidate in &mut candidates {
            let count = occupancy.entry(candidate.sector.clone()).or_insert(0);
            let bonus = sector_bonus(*count, self.config.sector_decay);
            *count += 1;

            candidate.composite_score = self.config.strength_weight * candidate.signal_strength
                + self.config.regime_weight * candidate.regime_compatibility
                + self.config.sector_weight * bonus;
        }

        if let Some(positions) = open_positions {
            let mut per_strategy: HashMap<&str, usize> = HashMap::new();
            for position in positions {
                *per_strategy.entry(position.strategy.as_str()).or_insert(0) += 1;
            }
            for candidate in &mut candidates {
                let open = per_strategy
                    .get(candidate.strategy.as_str())
                    .copied()
                    .unwrap_or(0);
                candidate.composite_score += match open {
                    0 => self.config.diversity_bonus_none,
                    1 => self.config.diversity_bonus_one,
                    _ => 0.0,
                };
            }
        }

        candidates.sort_by(final_order);
        candidates.truncate(self.config.top_n);
        for (index, candidate) in candidates.iter_mut().enumerate() {
            candidate.rank = index + 1;
        }

        debug!(
            input = input_count,
            output = candidates.len(),
            sectors = occupancy.len(),
            diversified = open_positions.is_some(),
            "Ranked scan results"
        );

        candidates
    }
}

/// (composite desc, strength desc, symbol asc, …)
fn final_order(a: &Candidate, b: &Candidate) -> Ordering {
    b.composite_score
        .total_cmp(&a.composite_score)
        .then_with(|| b.signal_strength.total_cmp(&a.signal_strength))
        .then_with(|| identity_order(a, b))
}

/// Last-resort tiebreak so equal scores still order the same on every run.
fn identity_order(a: &Candidate, b: &Candidate) -> Ordering {
    a.symbol
        .cmp(&b.symbol)
        .then_with(|| a.strategy.cmp(&b.strategy))
        .then_with(|| a.direction.cmp(&b.direction))
}
