//! REST market data provider.
//!
//! # Endpoints
//! - `GET {base}/v2/stocks/bars` multi-symbol historical bars, paginated
//!   through `next_page_token`
//! - `GET {base}/v2/stocks/quotes/latest` multi-symbol latest quotes
//!
//! # Authentication
//! Key and secret travel as `APCA-API-KEY-ID` / `APCA-API-SECRET-KEY` headers.
//!
//! # Status mapping
//! - 401 / 403 → `ProviderError::Auth`
//! - 429 → `ProviderError::RateLimited` (honours `Retry-After`)
//! - 5xx → `ProviderError::Unavailable`
//! - any other non-success → `ProviderError::Internal`

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

use batchscan_common::config::{Config, MarketDataConfig};

use super::provider::{MarketDataProvider, ProviderError};
use super::{Bar, Quote, Timeframe};

// ============================================================================
// Constants
// ============================================================================

const BARS_ENDPOINT: &str = "/v2/stocks/bars";

const LATEST_QUOTES_ENDPOINT: &str = "/v2/stocks/quotes/latest";

/// Upstream page size for bar requests
const BARS_PAGE_LIMIT: u32 = 10_000;

/// Stop following `next_page_token` after this many pages
const MAX_PAGES: usize = 100;

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct BarsResponse {
    #[serde(default)]
    bars: Option<HashMap<String, Vec<RawBar>>>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawBar {
    t: DateTime<Utc>,
    o: f64,
    h: f64,
    l: f64,
    c: f64,
    #[serde(default)]
    v: f64,
}

#[derive(Debug, Deserialize)]
struct QuotesResponse {
    #[serde(default)]
    quotes: HashMap<String, RawQuote>,
}

#[derive(Debug, Deserialize)]
struct RawQuote {
    #[serde(default)]
    t: Option<DateTime<Utc>>,
    #[serde(default)]
    ap: f64,
    #[serde(default)]
    bp: f64,
}

// ============================================================================
// HTTP Provider
// ============================================================================

/// Market data provider backed by a multi-symbol REST API.
pub struct HttpMarketDataProvider {
    client: reqwest::Client,
    config: MarketDataConfig,
}

impl HttpMarketDataProvider {
    /// Create a provider for the given market data settings.
    pub fn new(config: MarketDataConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self { client, config }
    }

    /// Create from config
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.market_data.clone())
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), endpoint)
    }

    fn check_symbol_cap(&self, symbols: &[String]) -> Result<(), ProviderError> {
        let cap = self.config.max_symbols_per_request;
        if symbols.len() > cap {
            return Err(ProviderError::InvalidRequest(format!(
                "{} symbols exceeds limit of {}",
                symbols.len(),
                cap
            )));
        }
        Ok(())
    }

    fn request(&self, endpoint: &str) -> reqwest::RequestBuilder {
        let mut builder = self
            .client
            .get(self.url(endpoint))
            .header("accept", "application/json");

        if let Some(ref key) = self.config.api_key {
            builder = builder.header("APCA-API-KEY-ID", key);
        }
        if let Some(ref secret) = self.config.api_secret {
            builder = builder.header("APCA-API-SECRET-KEY", secret);
        }
        builder
    }

    /// Send a request and map transport and status failures.
    async fn send(&self, builder: reqwest::RequestBuilder) -> Result<reqwest::Response, ProviderError> {
        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                ProviderError::Network("Request timeout".into())
            } else if e.is_connect() {
                ProviderError::Network("Connection failed".into())
            } else {
                ProviderError::Network(e.to_string())
            }
        })?;

        let status = response.status();

        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(ProviderError::Auth(format!("HTTP {}", status)));
        }

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok());
            return Err(ProviderError::RateLimited { retry_after_secs });
        }

        if status.is_server_error() {
            return Err(ProviderError::Unavailable(format!("HTTP {}", status)));
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Internal(format!("HTTP {}: {}", status, body)));
        }

        Ok(response)
    }
}

#[async_trait]
impl MarketDataProvider for HttpMarketDataProvider {
    fn name(&self) -> &'static str {
        "http"
    }

    fn max_symbols_per_request(&self) -> usize {
        self.config.max_symbols_per_request
    }

    async fn get_bars(
        &self,
        symbols: &[String],
        timeframe: Timeframe,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<HashMap<String, Vec<Bar>>, ProviderError> {
        if symbols.is_empty() {
            return Ok(HashMap::new());
        }
        self.check_symbol_cap(symbols)?;

        let joined = symbols.join(",");
        let start = start.to_rfc3339_opts(SecondsFormat::Secs, true);
        let end = end.to_rfc3339_opts(SecondsFormat::Secs, true);
        let limit = BARS_PAGE_LIMIT.to_string();

        let mut out: HashMap<String, Vec<Bar>> = HashMap::new();
        let mut page_token: Option<String> = None;

        for page in 0..MAX_PAGES {
            let mut query: Vec<(&str, &str)> = vec![
                ("symbols", joined.as_str()),
                ("timeframe", timeframe.to_api_freq()),
                ("start", start.as_str()),
                ("end", end.as_str()),
                ("limit", limit.as_str()),
            ];
            if let Some(ref feed) = self.config.feed {
                query.push(("feed", feed.as_str()));
            }
            if let Some(ref token) = page_token {
                query.push(("page_token", token.as_str()));
            }

            debug!(symbols = symbols.len(), page, "Fetching bars page");

            let response = self.send(self.request(BARS_ENDPOINT).query(&query)).await?;
            let body: BarsResponse = response
                .json()
                .await
                .map_err(|e| ProviderError::Internal(format!("Failed to parse response: {}", e)))?;

            for (symbol, raw) in body.bars.unwrap_or_default() {
                let series = out.entry(symbol.clone()).or_default();
                series.extend(raw.into_iter().map(|b| Bar {
                    symbol: symbol.clone(),
                    timeframe,
                    timestamp: b.t,
                    open: b.o,
                    high: b.h,
                    low: b.l,
                    close: b.c,
                    volume: b.v,
                }));
            }

            match body.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => return Ok(out),
            }
        }

        Err(ProviderError::Internal(format!(
            "bars pagination exceeded {} pages",
            MAX_PAGES
        )))
    }

    async fn get_latest_quotes(
        &self,
        symbols: &[String],
    ) -> Result<HashMap<String, Quote>, ProviderError> {
        if symbols.is_empty() {
            return Ok(HashMap::new());
        }
        self.check_symbol_cap(symbols)?;

        let joined = symbols.join(",");
        let mut query: Vec<(&str, &str)> = vec![("symbols", joined.as_str())];
        if let Some(ref feed) = self.config.feed {
            query.push(("feed", feed.as_str()));
        }

        debug!(symbols = symbols.len(), "Fetching latest quotes");

        let response = self
            .send(self.request(LATEST_QUOTES_ENDPOINT).query(&query))
            .await?;
        let body: QuotesResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Internal(format!("Failed to parse response: {}", e)))?;

        Ok(body
            .quotes
            .into_iter()
            .map(|(symbol, q)| {
                let quote = Quote {
                    symbol: symbol.clone(),
                    bid: q.bp,
                    ask: q.ap,
                    timestamp: q.t,
                };
                (symbol, quote)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(server: &MockServer) -> HttpMarketDataProvider {
        HttpMarketDataProvider::new(MarketDataConfig {
            base_url: server.uri(),
            api_key: Some("key".into()),
            api_secret: Some("secret".into()),
            ..Default::default()
        })
    }

    fn window() -> (DateTime<Utc>, DateTime<Utc>) {
        (
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap(),
        )
    }

    fn syms(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_get_bars_follows_pagination() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(BARS_ENDPOINT))
            .and(query_param("page_token", "p2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "bars": {
                    "AAPL": [{"t": "2024-01-03T05:00:00Z", "o": 2.0, "h": 2.5, "l": 1.5, "c": 2.2, "v": 20.0}]
                },
                "next_page_token": null
            })))
            .with_priority(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path(BARS_ENDPOINT))
            .and(query_param("symbols", "AAPL,MSFT"))
            .and(query_param("timeframe", "1Day"))
            .and(header("APCA-API-KEY-ID", "key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "bars": {
                    "AAPL": [{"t": "2024-01-02T05:00:00Z", "o": 1.0, "h": 1.5, "l": 0.5, "c": 1.2, "v": 10.0}],
                    "MSFT": [{"t": "2024-01-02T05:00:00Z", "o": 3.0, "h": 3.5, "l": 2.5, "c": 3.2, "v": 30.0}]
                },
                "next_page_token": "p2"
            })))
            .mount(&server)
            .await;

        let (start, end) = window();
        let bars = provider(&server)
            .get_bars(&syms(&["AAPL", "MSFT"]), Timeframe::Daily, start, end)
            .await
            .unwrap();

        assert_eq!(bars["AAPL"].len(), 2);
        assert_eq!(bars["MSFT"].len(), 1);
        assert_eq!(bars["AAPL"][1].close, 2.2);
        assert_eq!(bars["MSFT"][0].symbol, "MSFT");
    }

    #[tokio::test]
    async fn test_latest_quotes_parsed() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(LATEST_QUOTES_ENDPOINT))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "quotes": {
                    "AAPL": {"t": "2024-03-01T15:00:00Z", "ap": 101.0, "bp": 99.0},
                    "MSFT": {"ap": 0.0, "bp": 400.0}
                }
            })))
            .mount(&server)
            .await;

        let quotes = provider(&server)
            .get_latest_quotes(&syms(&["AAPL", "MSFT"]))
            .await
            .unwrap();

        assert_eq!(quotes["AAPL"].midpoint(), Some(100.0));
        assert_eq!(quotes["MSFT"].midpoint(), Some(400.0));
    }

    #[tokio::test]
    async fn test_status_mapping() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(LATEST_QUOTES_ENDPOINT))
            .and(query_param("symbols", "LIMIT"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "7"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(LATEST_QUOTES_ENDPOINT))
            .and(query_param("symbols", "AUTH"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(LATEST_QUOTES_ENDPOINT))
            .and(query_param("symbols", "DOWN"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(LATEST_QUOTES_ENDPOINT))
            .and(query_param("symbols", "BAD"))
            .respond_with(ResponseTemplate::new(422).set_body_string("invalid symbol"))
            .mount(&server)
            .await;

        let p = provider(&server);

        let err = p.get_latest_quotes(&syms(&["LIMIT"])).await.unwrap_err();
        assert!(matches!(
            err,
            ProviderError::RateLimited {
                retry_after_secs: Some(7)
            }
        ));

        let err = p.get_latest_quotes(&syms(&["AUTH"])).await.unwrap_err();
        assert!(matches!(err, ProviderError::Auth(_)));

        let err = p.get_latest_quotes(&syms(&["DOWN"])).await.unwrap_err();
        assert!(matches!(err, ProviderError::Unavailable(_)));

        let err = p.get_latest_quotes(&syms(&["BAD"])).await.unwrap_err();
        assert!(matches!(err, ProviderError::Internal(ref msg) if msg.contains("invalid symbol")));
    }

    #[tokio::test]
    async fn test_oversized_batch_rejected() {
        let server = MockServer::start().await;
        let (start, end) = window();
        let symbols: Vec<String> = (0..51).map(|i| format!("S{}", i)).collect();

        let err = provider(&server)
            .get_bars(&symbols, Timeframe::Daily, start, end)
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::InvalidRequest(_)));
        let err = provider(&server)
            .get_latest_quotes(&symbols)
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::InvalidRequest(_)));
        assert!(server.received_requests().await.unwrap_or_default().is_empty());
    }

    #[tokio::test]
    async fn test_connection_failure_is_network_error() {
        let p = HttpMarketDataProvider::new(MarketDataConfig {
            base_url: "http://127.0.0.1:9".into(),
            timeout_secs: 2,
            ..Default::default()
        });
        let err = p.get_latest_quotes(&syms(&["AAPL"])).await.unwrap_err();
        assert!(matches!(err, ProviderError::Network(_)));
    }
}
