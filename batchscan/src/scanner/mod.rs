//! Scan orchestrator.
//!
//! Sequences one run: fetch daily history for the universe, abort when too
//! few symbols are usable, compute indicators and strategy signals per
//! symbol, rank the detections and persist the artifact atomically.
//!
//! Indicator math and strategy logic are supplied by the embedding
//! application through `IndicatorEngine` and `Strategy`. A panic inside
//! either is caught and recorded as that symbol's error.

mod persist;
mod regime;
mod result;

pub use persist::{load_batch_result, read_json, save_batch_result, write_json_atomic};
pub use regime::{BenchmarkTrendRegime, RegimeClassifier, REGIME_UNKNOWN};
pub use result::{BatchResult, ScanError, ALL_SYMBOLS, INSUFFICIENT_DATA};

use anyhow::Context;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, info_span, warn, Instrument};

use batchscan_common::config::Config;
use batchscan_common::logging::generate_run_id;
use batchscan_common::validation::{require_positive, Validate, ValidationError, ValidationResult};

use crate::data::{dedup_symbols, Bar, BatchSource};
use crate::ranker::SignalRanker;
use crate::signal::{IndicatorSnapshot, OpenPosition, ScanResult, Signal};

// ============================================================================
// Collaborators
// ============================================================================

/// Computes the indicator snapshot for one symbol's history.
pub trait IndicatorEngine: Send + Sync {
    fn compute(&self, bars: &[Bar]) -> anyhow::Result<IndicatorSnapshot>;
}

/// Everything a strategy sees for one symbol.
#[derive(Debug, Clone, Copy)]
pub struct StrategyContext<'a> {
    pub symbol: &'a str,
    /// Oldest first
    pub bars: &'a [Bar],
    pub indicators: &'a IndicatorSnapshot,
    pub regime: &'a str,
}

/// A signal generator evaluated once per symbol per run.
pub trait Strategy: Send + Sync {
    fn id(&self) -> &str;

    /// `Ok(None)` when the strategy has nothing to say about this symbol.
    fn on_context(&self, ctx: &StrategyContext<'_>) -> anyhow::Result<Option<Signal>>;
}

// ============================================================================
// Configuration
// ============================================================================

/// Scan run configuration.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Calendar days of daily history requested
    pub history_days: i64,
    /// Abort below this many usable symbols
    pub min_symbols: usize,
    /// Bars a symbol needs to count as usable
    pub min_history_bars: usize,
    pub benchmark_symbol: String,
    pub output_path: PathBuf,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            history_days: 200,
            min_symbols: 10,
            min_history_bars: 20,
            benchmark_symbol: "SPY".into(),
            output_path: PathBuf::from("scan_results.json"),
        }
    }
}

impl ScanConfig {
    /// Create from config
    pub fn from_config(config: &Config) -> Self {
        let defaults = Self::default();
        let scanner = config.scanner.as_ref();

        Self {
            history_days: scanner
                .and_then(|s| s.history_days)
                .unwrap_or(defaults.history_days),
            min_symbols: scanner
                .and_then(|s| s.min_symbols)
                .unwrap_or(defaults.min_symbols),
            min_history_bars: scanner
                .and_then(|s| s.min_history_bars)
                .unwrap_or(defaults.min_history_bars),
            benchmark_symbol: scanner
                .and_then(|s| s.benchmark_symbol.clone())
                .unwrap_or(defaults.benchmark_symbol),
            output_path: config.output_path(),
        }
    }
}

impl Validate for ScanConfig {
    fn validate(&self) -> ValidationResult<()> {
        if self.history_days <= 0 {
            return Err(ValidationError::InvalidValue {
                field: "scan.history_days".into(),
                reason: "must be greater than 0".into(),
            });
        }
        require_positive("scan.min_symbols", self.min_symbols)?;
        require_positive("scan.min_history_bars", self.min_history_bars)?;
        Ok(())
    }
}

// ============================================================================
// Scanner
// ============================================================================

/// Runs the fetch → signal → rank → persist pipeline.
pub struct Scanner {
    source: Arc<dyn BatchSource>,
    indicators: Arc<dyn IndicatorEngine>,
    strategies: Vec<Arc<dyn Strategy>>,
    ranker: SignalRanker,
    regime: Box<dyn RegimeClassifier>,
    config: ScanConfig,
}

impl Scanner {
    pub fn new(
        source: Arc<dyn BatchSource>,
        indicators: Arc<dyn IndicatorEngine>,
        ranker: SignalRanker,
        config: ScanConfig,
    ) -> ValidationResult<Self> {
        config.validate()?;
        ranker.config().validate()?;

        let regime = Box::new(BenchmarkTrendRegime::new(config.benchmark_symbol.clone()));
        Ok(Self {
            source,
            indicators,
            strategies: Vec::new(),
            ranker,
            regime,
            config,
        })
    }

    pub fn with_strategy(mut self, strategy: Arc<dyn Strategy>) -> Self {
        self.strategies.push(strategy);
        self
    }

    pub fn with_regime_classifier(mut self, classifier: Box<dyn RegimeClassifier>) -> Self {
        self.regime = classifier;
        self
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Run one scan over `universe` and persist the result.
    ///
    /// Always returns a `BatchResult`; failures surface in `errors` and logs.
    pub async fn run(
        &self,
        universe: &[String],
        open_positions: Option<&[OpenPosition]>,
    ) -> BatchResult {
        let run_id = generate_run_id();
        let span = info_span!("scan", run_id = %run_id);
        self.run_inner(universe, open_positions).instrument(span).await
    }

    async fn run_inner(
        &self,
        universe: &[String],
        open_positions: Option<&[OpenPosition]>,
    ) -> BatchResult {
        let started = Instant::now();
        let run_at = Utc::now();
        let universe = dedup_symbols(universe);

        info!(
            symbols = universe.len(),
            strategies = self.strategies.len(),
            history_days = self.config.history_days,
            "Starting scan"
        );

        let mut request = universe.clone();
        if !universe.contains(&self.config.benchmark_symbol) {
            request.push(self.config.benchmark_symbol.clone());
        }

        let bars = match self
            .source
            .fetch_daily_bars(&request, self.config.history_days)
            .await
        {
            Ok(bars) => bars,
            Err(e) => {
                warn!(error = %format!("{:#}", e), "Bar fetch failed, treating as no data");
                HashMap::new()
            }
        };

        // Ordered so per-symbol processing and the errors list are stable.
        let usable: BTreeMap<&str, &[Bar]> = universe
            .iter()
            .filter_map(|symbol| {
                bars.get(symbol)
                    .filter(|series| series.len() >= self.config.min_history_bars)
                    .map(|series| (symbol.as_str(), series.as_slice()))
            })
            .collect();

        if usable.len() < self.config.min_symbols {
            warn!(
                usable = usable.len(),
                required = self.config.min_symbols,
                "Insufficient data, aborting scan"
            );
            let result = BatchResult {
                run_at,
                scan_duration_secs: started.elapsed().as_secs_f64(),
                symbols_scanned: usable.len(),
                symbols_with_signals: 0,
                regime: REGIME_UNKNOWN.into(),
                candidates: Vec::new(),
                errors: vec![ScanError::insufficient_data()],
            };
            self.persist(&result).await;
            return result;
        }

        let regime = self.regime.classify(&bars);
        debug!(regime = %regime, usable = usable.len(), "Data ready");

        let mut results: Vec<ScanResult> = Vec::new();
        let mut errors: Vec<ScanError> = Vec::new();
        let mut symbols_with_signals = 0usize;

        for (symbol, series) in &usable {
            let found = self.scan_symbol(symbol, series, &regime, &mut errors);
            if !found.is_empty() {
                symbols_with_signals += 1;
            }
            results.extend(found);
        }

        let detections = results.len();
        let candidates = self.ranker.rank(results, open_positions);

        let result = BatchResult {
            run_at,
            scan_duration_secs: started.elapsed().as_secs_f64(),
            symbols_scanned: usable.len(),
            symbols_with_signals,
            regime,
            candidates,
            errors,
        };

        info!(
            symbols_scanned = result.symbols_scanned,
            symbols_with_signals = result.symbols_with_signals,
            detections,
            candidates = result.candidates.len(),
            errors = result.errors.len(),
            duration_secs = result.scan_duration_secs,
            "Scan complete"
        );

        self.persist(&result).await;
        result
    }

    /// Indicators and strategies for one symbol. Failures are recorded in
    /// `errors`; a failing strategy does not stop the others.
    fn scan_symbol(
        &self,
        symbol: &str,
        series: &[Bar],
        regime: &str,
        errors: &mut Vec<ScanError>,
    ) -> Vec<ScanResult> {
        let indicators = match guarded(|| self.indicators.compute(series))
            .with_context(|| format!("indicator computation for {}", symbol))
        {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(symbol, error = %format!("{:#}", e), "Skipping symbol");
                errors.push(ScanError::new(symbol, format!("{:#}", e)));
                return Vec::new();
            }
        };

        let ctx = StrategyContext {
            symbol,
            bars: series,
            indicators: &indicators,
            regime,
        };
        let prev_close = series.last().map(|b| b.close).unwrap_or(0.0);
        let scanned_at = Utc::now();

        let mut found = Vec::new();
        for strategy in &self.strategies {
            match guarded(|| strategy.on_context(&ctx)) {
                Ok(Some(signal)) => {
                    if let Some(result) = ScanResult::from_signal(
                        symbol,
                        strategy.id(),
                        signal,
                        indicators.clone(),
                        prev_close,
                        scanned_at,
                    ) {
                        found.push(result);
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    let message = format!("{}: {:#}", strategy.id(), e);
                    warn!(symbol, strategy = strategy.id(), error = %format!("{:#}", e), "Strategy failed");
                    errors.push(ScanError::new(symbol, message));
                }
            }
        }
        found
    }

    async fn persist(&self, result: &BatchResult) {
        let path = &self.config.output_path;
        match save_batch_result(path, result).await {
            Ok(()) => info!(path = %path.display(), "Scan results saved"),
            Err(e) => error!(path = %path.display(), error = %e, "Failed to persist scan results"),
        }
    }
}

/// Run an external collaborator, turning a panic into an error.
fn guarded<T>(f: impl FnOnce() -> anyhow::Result<T>) -> anyhow::Result<T> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".into());
            Err(anyhow::anyhow!("panicked: {}", message))
        }
    }
}
