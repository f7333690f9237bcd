//! Batched, bounded-concurrency, retrying fetch layer.
//!
//! Splits a symbol universe into provider-sized chunks, runs at most
//! `max_concurrent` chunk requests at a time, retries each chunk with
//! exponential backoff and merges the partial results once every task has
//! finished. A chunk that exhausts its retries contributes nothing; it never
//! fails the whole fetch.

use async_trait::async_trait;
use chrono::{DateTime, Duration as TimeDelta, NaiveTime, Utc};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use batchscan_common::config::Config;
use batchscan_common::validation::{require_positive, Validate, ValidationError, ValidationResult};

use super::provider::{MarketDataProvider, ProviderError};
use super::rate_limiter::{shared_limiter, SharedRateLimiter};
use super::{Bar, Quote, Timeframe};

// ============================================================================
// Configuration
// ============================================================================

/// Batching, concurrency and retry policy for one `BatchFetcher`.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Symbols per upstream request
    pub batch_size: usize,
    /// Chunk requests allowed in flight at once
    pub max_concurrent: usize,
    /// Attempts per chunk (first try included)
    pub max_retries: u32,
    /// Delay after the first failed attempt; doubles on every further failure
    pub backoff_base: Duration,
    /// Ceiling on any single retry delay, provider `Retry-After` hints included
    pub max_backoff: Duration,
    /// Proactive request budget; `None` disables the limiter
    pub rate_limit_rpm: Option<u32>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            max_concurrent: 5,
            max_retries: 3,
            backoff_base: Duration::from_secs(1),
            max_backoff: Duration::from_secs(10),
            rate_limit_rpm: None,
        }
    }
}

impl BatchConfig {
    /// Create from config
    pub fn from_config(config: &Config) -> Self {
        let defaults = Self::default();
        let scanner = config.scanner.as_ref();

        Self {
            batch_size: scanner
                .and_then(|s| s.batch_size)
                .unwrap_or(defaults.batch_size),
            max_concurrent: scanner
                .and_then(|s| s.max_concurrent)
                .unwrap_or(defaults.max_concurrent),
            max_retries: scanner
                .and_then(|s| s.max_retries)
                .unwrap_or(defaults.max_retries),
            backoff_base: scanner
                .and_then(|s| s.backoff_base_ms)
                .map(Duration::from_millis)
                .unwrap_or(defaults.backoff_base),
            max_backoff: scanner
                .and_then(|s| s.max_backoff_ms)
                .map(Duration::from_millis)
                .unwrap_or(defaults.max_backoff),
            rate_limit_rpm: Some(config.market_data.rate_limit_rpm),
        }
    }

    /// Sleep before the next attempt after `attempt` (1-based) failed.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.backoff_base
            .saturating_mul(1u32 << exponent)
            .min(self.max_backoff)
    }

    /// Delay before retrying after `error`: the exponential backoff, raised
    /// to the provider's `Retry-After` hint but never past `max_backoff`.
    pub fn retry_delay(&self, attempt: u32, error: &ProviderError) -> Duration {
        let backoff = self.backoff_for(attempt);
        match error.retry_after() {
            Some(hint) => backoff.max(hint.min(self.max_backoff)),
            None => backoff,
        }
    }
}

impl Validate for BatchConfig {
    fn validate(&self) -> ValidationResult<()> {
        require_positive("batch.batch_size", self.batch_size)?;
        require_positive("batch.max_concurrent", self.max_concurrent)?;
        require_positive("batch.max_retries", self.max_retries as usize)?;
        if self.max_backoff < self.backoff_base {
            return Err(ValidationError::Conflict {
                reason: format!(
                    "batch.max_backoff {:?} is below batch.backoff_base {:?}",
                    self.max_backoff, self.backoff_base
                ),
            });
        }
        Ok(())
    }
}

// ============================================================================
// Symbol helpers
// ============================================================================

/// Remove duplicate symbols, keeping the first occurrence and input order.
pub fn dedup_symbols(symbols: &[String]) -> Vec<String> {
    let mut seen = HashSet::with_capacity(symbols.len());
    symbols
        .iter()
        .filter(|s| seen.insert(s.as_str()))
        .cloned()
        .collect()
}

/// Split symbols into consecutive chunks of at most `size` symbols.
///
/// Produces `ceil(len / size)` chunks; every symbol lands in exactly one.
pub fn chunk_symbols(symbols: &[String], size: usize) -> Vec<Vec<String>> {
    symbols.chunks(size.max(1)).map(<[String]>::to_vec).collect()
}

/// Daily request window: `end` is today at 00:00 UTC, `start` is `days` earlier.
pub fn daily_window(now: DateTime<Utc>, days: i64) -> (DateTime<Utc>, DateTime<Utc>) {
    let end = now.date_naive().and_time(NaiveTime::MIN).and_utc();
    (end - TimeDelta::days(days), end)
}

// ============================================================================
// Batch Source
// ============================================================================

/// The two batched reads the pipeline needs.
///
/// `BatchFetcher` never returns `Err` (failures degrade to omission); the
/// `Result` lets callers treat a whole-call failure from any other source
/// as "no data" without crashing.
#[async_trait]
pub trait BatchSource: Send + Sync {
    /// Daily bars per symbol, oldest first.
    async fn fetch_daily_bars(
        &self,
        symbols: &[String],
        days: i64,
    ) -> anyhow::Result<HashMap<String, Vec<Bar>>>;

    /// Latest tradable price per symbol.
    async fn fetch_latest_quotes(&self, symbols: &[String]) -> anyhow::Result<HashMap<String, f64>>;
}

// ============================================================================
// Batch Fetcher
// ============================================================================

/// Bounded-concurrency batched fetcher over a `MarketDataProvider`.
pub struct BatchFetcher {
    provider: Arc<dyn MarketDataProvider>,
    config: BatchConfig,
    limiter: Option<SharedRateLimiter>,
}

impl BatchFetcher {
    /// Create a fetcher, rejecting a policy the provider cannot honour.
    pub fn new(
        provider: Arc<dyn MarketDataProvider>,
        config: BatchConfig,
    ) -> ValidationResult<Self> {
        config.validate()?;

        let cap = provider.max_symbols_per_request();
        if config.batch_size > cap {
            return Err(ValidationError::Conflict {
                reason: format!(
                    "batch size {} exceeds {} limit of {} symbols per request",
                    config.batch_size,
                    provider.name(),
                    cap
                ),
            });
        }

        let limiter = config
            .rate_limit_rpm
            .map(|rpm| shared_limiter(provider.name(), rpm));

        Ok(Self {
            provider,
            config,
            limiter,
        })
    }

    /// Batching policy in effect.
    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Fetch daily bars for `symbols` over the last `days` calendar days.
    ///
    /// Symbols the upstream has no bars for, and symbols of chunks that
    /// exhausted their retries, are absent from the result.
    pub async fn fetch_daily_bars(
        &self,
        symbols: &[String],
        days: i64,
    ) -> HashMap<String, Vec<Bar>> {
        let (start, end) = daily_window(Utc::now(), days);
        debug!(%start, %end, days, "Daily bar window");

        let request = move |provider: Arc<dyn MarketDataProvider>, chunk: Vec<String>| async move {
            provider
                .get_bars(&chunk, Timeframe::Daily, start, end)
                .await
        };

        let mut bars = self.run_batched("bars", symbols, request).await;

        bars.retain(|_, series| !series.is_empty());
        for series in bars.values_mut() {
            series.sort_by_key(|b| b.timestamp);
        }

        bars
    }

    /// Fetch the latest tradable price (quote midpoint) for `symbols`.
    pub async fn fetch_latest_quotes(&self, symbols: &[String]) -> HashMap<String, f64> {
        let request = |provider: Arc<dyn MarketDataProvider>, chunk: Vec<String>| async move {
            provider.get_latest_quotes(&chunk).await
        };

        let quotes: HashMap<String, Quote> = self.run_batched("quotes", symbols, request).await;

        quotes
            .into_iter()
            .filter_map(|(symbol, quote)| quote.midpoint().map(|price| (symbol, price)))
            .collect()
    }

    /// Fan out one request per chunk, bounded by the semaphore, then merge.
    async fn run_batched<T, F, Fut>(
        &self,
        kind: &'static str,
        symbols: &[String],
        request: F,
    ) -> HashMap<String, T>
    where
        T: Send + 'static,
        F: Fn(Arc<dyn MarketDataProvider>, Vec<String>) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = Result<HashMap<String, T>, ProviderError>> + Send + 'static,
    {
        let symbols = dedup_symbols(symbols);
        if symbols.is_empty() {
            return HashMap::new();
        }

        let chunks = chunk_symbols(&symbols, self.config.batch_size);
        let chunk_count = chunks.len();
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent));

        info!(
            kind,
            provider = self.provider.name(),
            symbols = symbols.len(),
            chunks = chunk_count,
            max_concurrent = self.config.max_concurrent,
            "Starting batched fetch"
        );

        let mut join_set = JoinSet::new();
        for (index, chunk) in chunks.into_iter().enumerate() {
            let provider = Arc::clone(&self.provider);
            let semaphore = Arc::clone(&semaphore);
            let limiter = self.limiter.clone();
            let config = self.config.clone();
            let request = request.clone();

            join_set.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return (index, None);
                };
                let result =
                    fetch_chunk_with_retry(kind, index, chunk, provider, request, &config, limiter)
                        .await;
                (index, result)
            });
        }

        // Join barrier: every chunk finishes before the single-threaded merge.
        let mut partials = Vec::with_capacity(chunk_count);
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(partial) => partials.push(partial),
                Err(e) => error!(kind, error = %e, "Batch task aborted"),
            }
        }

        let mut merged = HashMap::with_capacity(symbols.len());
        let mut failed_chunks = 0usize;
        for (_, partial) in partials {
            match partial {
                Some((requested, map)) => {
                    for (symbol, value) in map {
                        if requested.contains(&symbol) {
                            merged.insert(symbol, value);
                        }
                    }
                }
                None => failed_chunks += 1,
            }
        }

        info!(
            kind,
            requested = symbols.len(),
            returned = merged.len(),
            failed_chunks,
            "Batched fetch complete"
        );

        merged
    }
}

/// Run one chunk request with retry and exponential backoff.
///
/// Returns the requested symbol set alongside the data, or `None` once
/// every attempt has failed.
async fn fetch_chunk_with_retry<T, F, Fut>(
    kind: &'static str,
    index: usize,
    chunk: Vec<String>,
    provider: Arc<dyn MarketDataProvider>,
    request: F,
    config: &BatchConfig,
    limiter: Option<SharedRateLimiter>,
) -> Option<(HashSet<String>, HashMap<String, T>)>
where
    F: Fn(Arc<dyn MarketDataProvider>, Vec<String>) -> Fut,
    Fut: Future<Output = Result<HashMap<String, T>, ProviderError>>,
{
    for attempt in 1..=config.max_retries {
        if let Some(ref limiter) = limiter {
            limiter.acquire().await;
        }

        match request(Arc::clone(&provider), chunk.clone()).await {
            Ok(map) => {
                debug!(kind, chunk = index, attempt, returned = map.len(), "Chunk fetched");
                let requested = chunk.into_iter().collect();
                return Some((requested, map));
            }
            Err(e) if attempt == config.max_retries => {
                warn!(
                    kind,
                    chunk = index,
                    size = chunk.len(),
                    attempts = attempt,
                    error = %e,
                    "Chunk exhausted retries, omitting its symbols"
                );
            }
            Err(e) => {
                let delay = config.retry_delay(attempt, &e);
                warn!(
                    kind,
                    chunk = index,
                    attempt,
                    max_attempts = config.max_retries,
                    recoverable = e.is_recoverable(),
                    backoff_ms = delay.as_millis() as u64,
                    error = %e,
                    "Chunk request failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }

    None
}

#[async_trait]
impl BatchSource for BatchFetcher {
    async fn fetch_daily_bars(
        &self,
        symbols: &[String],
        days: i64,
    ) -> anyhow::Result<HashMap<String, Vec<Bar>>> {
        Ok(BatchFetcher::fetch_daily_bars(self, symbols, days).await)
    }

    async fn fetch_latest_quotes(&self, symbols: &[String]) -> anyhow::Result<HashMap<String, f64>> {
        Ok(BatchFetcher::fetch_latest_quotes(self, symbols).await)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn symbols(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("SYM{:03}", i)).collect()
    }

    #[test]
    fn test_chunk_sizes_for_110_symbols() {
        let chunks = chunk_symbols(&symbols(110), 50);
        let sizes: Vec<usize> = chunks.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![50, 50, 10]);
    }

    #[test]
    fn test_chunk_empty_input() {
        assert!(chunk_symbols(&[], 50).is_empty());
    }

    #[test]
    fn test_dedup_keeps_first_occurrence() {
        let input: Vec<String> = ["B", "A", "B", "C", "A"].iter().map(|s| s.to_string()).collect();
        assert_eq!(dedup_symbols(&input), vec!["B", "A", "C"]);
    }

    #[test]
    fn test_backoff_doubles() {
        let config = BatchConfig::default();
        assert_eq!(config.backoff_for(1), Duration::from_secs(1));
        assert_eq!(config.backoff_for(2), Duration::from_secs(2));
        assert_eq!(config.backoff_for(3), Duration::from_secs(4));
    }

    #[test]
    fn test_backoff_capped() {
        let config = BatchConfig {
            max_backoff: Duration::from_secs(3),
            ..Default::default()
        };
        assert_eq!(config.backoff_for(3), Duration::from_secs(3));
        assert_eq!(config.backoff_for(40), Duration::from_secs(3));
    }

    #[test]
    fn test_retry_after_hint_bounded_by_ceiling() {
        let config = BatchConfig::default();
        let short = ProviderError::RateLimited {
            retry_after_secs: Some(5),
        };
        let huge = ProviderError::RateLimited {
            retry_after_secs: Some(3600),
        };
        let plain = ProviderError::Network("reset".into());

        assert_eq!(config.retry_delay(1, &short), Duration::from_secs(5));
        assert_eq!(config.retry_delay(1, &huge), Duration::from_secs(10));
        assert_eq!(config.retry_delay(2, &plain), Duration::from_secs(2));
    }

    #[test]
    fn test_ceiling_below_base_rejected() {
        let config = BatchConfig {
            backoff_base: Duration::from_secs(2),
            max_backoff: Duration::from_secs(1),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ValidationError::Conflict { .. })
        ));
    }

    #[test]
    fn test_daily_window_is_midnight_aligned() {
        let now = Utc.with_ymd_and_hms(2024, 3, 15, 22, 41, 7).unwrap();
        let (start, end) = daily_window(now, 200);
        assert_eq!(end, Utc.with_ymd_and_hms(2024, 3, 15, 0, 0, 0).unwrap());
        assert_eq!((end - start).num_days(), 200);
    }

    #[test]
    fn test_config_validation() {
        assert!(BatchConfig::default().validate().is_ok());
        let bad = BatchConfig {
            max_concurrent: 0,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_from_config_overrides() {
        let mut config = Config::default();
        config.scanner = Some(batchscan_common::ScannerConfig {
            batch_size: Some(25),
            backoff_base_ms: Some(10),
            max_backoff_ms: Some(500),
            ..Default::default()
        });
        let batch = BatchConfig::from_config(&config);
        assert_eq!(batch.batch_size, 25);
        assert_eq!(batch.max_concurrent, 5);
        assert_eq!(batch.backoff_base, Duration::from_millis(10));
        assert_eq!(batch.max_backoff, Duration::from_millis(500));
        assert_eq!(batch.rate_limit_rpm, Some(200));
    }
}
