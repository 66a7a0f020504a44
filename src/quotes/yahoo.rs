//! Yahoo Finance quote source. Spot quotes try the v7 quote endpoint on an
//! ordered host list, then fall back to the v8 chart endpoint. Historical
//! prices come from daily v8 chart bars, converted to EUR per sample day.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::{debug, instrument};

use crate::cache::TtlCache;
use crate::fx::CurrencyConverter;
use crate::quotes::{PricePoint, Quote, QuoteProvider};
use crate::registry::AssetDefinition;

pub struct YahooProvider {
    hosts: Vec<String>,
    client: reqwest::Client,
    converter: CurrencyConverter,
    quote_cache: TtlCache<String, Quote>,
    history_cache: TtlCache<String, Vec<PricePoint>>,
}

#[derive(Debug, Deserialize)]
struct V7Response {
    #[serde(alias = "quoteResponse")]
    quote_response: Option<V7QuoteResponse>,
}

#[derive(Debug, Deserialize)]
struct V7QuoteResponse {
    result: Option<Vec<V7Quote>>,
}

#[derive(Debug, Deserialize)]
struct V7Quote {
    currency: Option<String>,
    #[serde(alias = "regularMarketPrice")]
    regular_market_price: Option<f64>,
    #[serde(alias = "preMarketPrice")]
    pre_market_price: Option<f64>,
    #[serde(alias = "postMarketPrice")]
    post_market_price: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: Option<ChartResult>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    result: Option<Vec<ChartItem>>,
}

#[derive(Debug, Deserialize)]
struct ChartItem {
    meta: Option<ChartMeta>,
    timestamp: Option<Vec<i64>>,
    indicators: Option<Indicators>,
}

#[derive(Debug, Deserialize)]
struct ChartMeta {
    currency: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    quote: Vec<ChartQuote>,
}

#[derive(Debug, Deserialize)]
struct ChartQuote {
    close: Option<Vec<Option<f64>>>,
}

/// Timestamps (seconds) and closes of the first chart result.
struct ChartSeries {
    currency: String,
    timestamps: Vec<i64>,
    closes: Vec<Option<f64>>,
}

impl YahooProvider {
    pub fn new(
        hosts: &[String],
        converter: CurrencyConverter,
        quote_cache: TtlCache<String, Quote>,
        history_cache: TtlCache<String, Vec<PricePoint>>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder().user_agent("folio/1.0").build()?;
        Ok(Self {
            hosts: hosts.to_vec(),
            client,
            converter,
            quote_cache,
            history_cache,
        })
    }

    fn symbol<'a>(&self, asset: &'a AssetDefinition) -> Result<&'a str> {
        asset
            .yahoo_symbol
            .as_deref()
            .ok_or_else(|| anyhow!("Missing yahoo_symbol for {}", asset.id))
    }

    /// The v8 chart endpoint lives on the primary host only.
    fn chart_host(&self) -> Result<&str> {
        self.hosts
            .first()
            .map(String::as_str)
            .ok_or_else(|| anyhow!("No Yahoo hosts configured"))
    }

    /// One v7 quote attempt against one host. `Ok(None)` means the response
    /// was well-formed but carried no usable price.
    async fn fetch_v7_quote(&self, host: &str, symbol: &str) -> Result<Option<Quote>> {
        let url = format!(
            "{}/v7/finance/quote?symbols={}&fields=currency,regularMarketPrice,preMarketPrice,postMarketPrice&formatted=false&region=US&lang=en-US",
            host, symbol
        );
        debug!("Requesting v7 quote from {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| anyhow!("Request error: {} for symbol: {} URL: {}", e, symbol, url))?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "HTTP error: {} for symbol: {}",
                response.status(),
                symbol
            ));
        }

        let data = response.json::<V7Response>().await?;
        let Some(quote) = data
            .quote_response
            .and_then(|qr| qr.result)
            .and_then(|mut result| {
                if result.is_empty() {
                    None
                } else {
                    Some(result.remove(0))
                }
            })
        else {
            return Ok(None);
        };

        // Regular market price first, then pre- and post-market.
        let price = quote
            .regular_market_price
            .or(quote.pre_market_price)
            .or(quote.post_market_price)
            .filter(|p| p.is_finite());

        match (price, quote.currency) {
            (Some(price), Some(currency)) => Ok(Some(Quote { price, currency })),
            _ => Ok(None),
        }
    }

    /// v8 chart fallback for a spot quote: most recent intraday bars, last
    /// non-null close scanning backward.
    async fn fetch_chart_quote(&self, symbol: &str) -> Result<Quote> {
        let url = format!(
            "{}/v8/finance/chart/{}?range=1d&interval=1m&includePrePost=true&lang=en-US&region=US",
            self.chart_host()?,
            symbol
        );
        let series = self.fetch_chart_series(&url, symbol).await?;

        let price = series
            .closes
            .iter()
            .rev()
            .find_map(|close| close.filter(|p| p.is_finite()))
            .ok_or_else(|| anyhow!("No price data available for symbol: {}", symbol))?;

        Ok(Quote {
            price,
            currency: series.currency,
        })
    }

    async fn fetch_chart_series(&self, url: &str, symbol: &str) -> Result<ChartSeries> {
        debug!("Requesting chart data from {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| anyhow!("Request error: {} for symbol: {} URL: {}", e, symbol, url))?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "HTTP error: {} for symbol: {}",
                response.status(),
                symbol
            ));
        }

        let data = response.json::<ChartResponse>().await?;
        let item = data
            .chart
            .and_then(|c| c.result)
            .and_then(|mut result| {
                if result.is_empty() {
                    None
                } else {
                    Some(result.remove(0))
                }
            })
            .ok_or_else(|| anyhow!("No chart data available for symbol: {}", symbol))?;

        let currency = item
            .meta
            .and_then(|m| m.currency)
            .unwrap_or_else(|| "USD".to_string());
        let timestamps = item.timestamp.unwrap_or_default();
        let closes = item
            .indicators
            .and_then(|inds| inds.quote.into_iter().next())
            .and_then(|q| q.close)
            .unwrap_or_default();

        Ok(ChartSeries {
            currency,
            timestamps,
            closes,
        })
    }

    async fn fetch_daily_series(
        &self,
        symbol: &str,
        period1_sec: i64,
        period2_sec: i64,
    ) -> Result<ChartSeries> {
        let url = format!(
            "{}/v8/finance/chart/{}?period1={}&period2={}&interval=1d&events=div%2Csplit&includePrePost=false",
            self.chart_host()?,
            symbol,
            period1_sec,
            period2_sec
        );
        let series = self.fetch_chart_series(&url, symbol).await?;
        if series.timestamps.is_empty() || series.closes.is_empty() {
            return Err(anyhow!("No price data available for symbol: {}", symbol));
        }
        Ok(series)
    }
}

/// Index of the timestamp closest to the target. Strict improvement only,
/// so the earlier index wins ties.
fn nearest_index(timestamps: &[i64], target_ms: i64) -> usize {
    let mut best = 0;
    let mut best_delta = i64::MAX;
    for (i, ts) in timestamps.iter().enumerate() {
        let delta = (ts * 1000 - target_ms).abs();
        if delta < best_delta {
            best_delta = delta;
            best = i;
        }
    }
    best
}

#[async_trait]
impl QuoteProvider for YahooProvider {
    #[instrument(name = "YahooSpot", skip(self, asset), fields(asset = %asset.id))]
    async fn current_price(&self, asset: &AssetDefinition) -> Result<Quote> {
        let symbol = self.symbol(asset)?;
        if let Some(cached) = self.quote_cache.get(&symbol.to_string()).await {
            return Ok(cached);
        }

        for host in &self.hosts {
            match self.fetch_v7_quote(host, symbol).await {
                Ok(Some(quote)) => {
                    self.quote_cache.put(symbol.to_string(), quote.clone()).await;
                    return Ok(quote);
                }
                Ok(None) => debug!("No usable v7 quote for {} from {}", symbol, host),
                Err(e) => debug!("v7 quote failed for {} on {}: {}", symbol, host, e),
            }
        }

        // All v7 hosts exhausted.
        let quote = self.fetch_chart_quote(symbol).await?;
        self.quote_cache.put(symbol.to_string(), quote.clone()).await;
        Ok(quote)
    }

    #[instrument(name = "YahooPriceAt", skip(self, asset), fields(asset = %asset.id))]
    async fn price_at(&self, asset: &AssetDefinition, at: DateTime<Utc>) -> Result<f64> {
        let symbol = self.symbol(asset)?;
        let at_ms = at.timestamp_millis();
        // Symmetric 24h window, daily bars.
        let period1 = (at_ms - 24 * 60 * 60 * 1000).div_euclid(1000);
        let period2 = (at_ms + 24 * 60 * 60 * 1000 + 999).div_euclid(1000);

        let series = self.fetch_daily_series(symbol, period1, period2).await?;

        let idx = nearest_index(&series.timestamps, at_ms);
        let close = series
            .closes
            .get(idx)
            .copied()
            .flatten()
            .ok_or_else(|| anyhow!("No close price at nearest sample for symbol: {}", symbol))?;

        // FX is keyed to the requested instant, not the matched sample.
        self.converter.to_eur(close, &series.currency, at).await
    }

    #[instrument(name = "YahooHistory", skip(self, asset), fields(asset = %asset.id))]
    async fn historical_series(
        &self,
        asset: &AssetDefinition,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<PricePoint>> {
        let symbol = self.symbol(asset)?;
        let period1 = start.timestamp();
        let period2 = end.timestamp();
        let cache_key = format!("{symbol}:{period1}:{period2}");
        if let Some(cached) = self.history_cache.get(&cache_key).await {
            return Ok(cached);
        }

        let series = self.fetch_daily_series(symbol, period1, period2).await?;

        // Source bars are already daily; null closes just drop points. Each
        // surviving close converts at its own sample day's FX rate.
        let mut by_day: BTreeMap<chrono::NaiveDate, f64> = BTreeMap::new();
        for (i, ts) in series.timestamps.iter().enumerate() {
            let Some(close) = series.closes.get(i).copied().flatten() else {
                continue;
            };
            let Some(sampled_at) = Utc.timestamp_opt(*ts, 0).single() else {
                continue;
            };
            let price = self
                .converter
                .to_eur(close, &series.currency, sampled_at)
                .await?;
            by_day.insert(sampled_at.date_naive(), price);
        }

        let points: Vec<PricePoint> = by_day
            .into_iter()
            .map(|(day, price)| PricePoint { day, price })
            .collect();
        self.history_cache.put(cache_key, points.clone()).await;
        Ok(points)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::testing::FixedClock;
    use crate::cache::Clock;
    use crate::fx::{FrankfurterProvider, FX_CACHE_TTL_MS};
    use crate::quotes::{HISTORY_CACHE_TTL_MS, QUOTE_CACHE_TTL_MS};
    use crate::registry::{AssetKind, QuoteSource};
    use chrono::NaiveDate;
    use std::sync::Arc;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(hosts: &[String], fx_url: &str) -> YahooProvider {
        let clock = Arc::new(FixedClock::new(0)) as Arc<dyn Clock>;
        let fx_cache = TtlCache::new(FX_CACHE_TTL_MS, Arc::clone(&clock));
        let converter =
            CurrencyConverter::new(Arc::new(FrankfurterProvider::new(fx_url, fx_cache).unwrap()));
        YahooProvider::new(
            hosts,
            converter,
            TtlCache::new(QUOTE_CACHE_TTL_MS, Arc::clone(&clock)),
            TtlCache::new(HISTORY_CACHE_TTL_MS, clock),
        )
        .unwrap()
    }

    fn etf() -> AssetDefinition {
        AssetDefinition {
            id: "etf:invesco-ftse-all-world".to_string(),
            name: "Invesco FTSE All-World".to_string(),
            kind: AssetKind::Etf,
            quote_source: QuoteSource::Yahoo,
            coingecko_id: None,
            yahoo_symbol: Some("FWRG.L".to_string()),
            currency: "GBp".to_string(),
            decimals: 2,
        }
    }

    async fn mount_v7(server: &MockServer, body: &str, status: u16) {
        Mock::given(method("GET"))
            .and(path("/v7/finance/quote"))
            .and(query_param("symbols", "FWRG.L"))
            .respond_with(ResponseTemplate::new(status).set_body_string(body))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_v7_quote_from_first_host() {
        let server = MockServer::start().await;
        mount_v7(
            &server,
            r#"{"quoteResponse": {"result": [{"currency": "GBp", "regularMarketPrice": 525.4}]}}"#,
            200,
        )
        .await;

        let provider = provider(&[server.uri()], "http://127.0.0.1:1");
        let quote = provider.current_price(&etf()).await.unwrap();
        assert_eq!(quote.price, 525.4);
        assert_eq!(quote.currency, "GBp");
    }

    #[tokio::test]
    async fn test_v7_prefers_regular_then_pre_then_post() {
        let server = MockServer::start().await;
        mount_v7(
            &server,
            r#"{"quoteResponse": {"result": [{"currency": "USD", "preMarketPrice": 99.0, "postMarketPrice": 101.0}]}}"#,
            200,
        )
        .await;

        let provider = provider(&[server.uri()], "http://127.0.0.1:1");
        let mut asset = etf();
        asset.currency = "USD".to_string();
        let quote = provider.current_price(&asset).await.unwrap();
        assert_eq!(quote.price, 99.0);
    }

    #[tokio::test]
    async fn test_second_host_tried_when_first_fails() {
        let failing = MockServer::start().await;
        mount_v7(&failing, "", 500).await;

        let working = MockServer::start().await;
        mount_v7(
            &working,
            r#"{"quoteResponse": {"result": [{"currency": "GBp", "regularMarketPrice": 530.0}]}}"#,
            200,
        )
        .await;

        let provider = provider(&[failing.uri(), working.uri()], "http://127.0.0.1:1");
        let quote = provider.current_price(&etf()).await.unwrap();
        assert_eq!(quote.price, 530.0);
    }

    #[tokio::test]
    async fn test_chart_fallback_takes_last_non_null_close() {
        let server = MockServer::start().await;
        // v7 yields an empty result set on every host.
        mount_v7(&server, r#"{"quoteResponse": {"result": []}}"#, 200).await;

        let chart_body = r#"{
            "chart": {
                "result": [{
                    "meta": {"currency": "GBp"},
                    "timestamp": [1, 2, 3],
                    "indicators": {"quote": [{"close": [500.0, 510.0, null]}]}
                }]
            }
        }"#;
        Mock::given(method("GET"))
            .and(path("/v8/finance/chart/FWRG.L"))
            .and(query_param("range", "1d"))
            .respond_with(ResponseTemplate::new(200).set_body_string(chart_body))
            .mount(&server)
            .await;

        let provider = provider(&[server.uri()], "http://127.0.0.1:1");
        let quote = provider.current_price(&etf()).await.unwrap();
        assert_eq!(quote.price, 510.0);
        assert_eq!(quote.currency, "GBp");
    }

    #[tokio::test]
    async fn test_spot_fails_when_chart_has_no_closes() {
        let server = MockServer::start().await;
        mount_v7(&server, r#"{"quoteResponse": {"result": []}}"#, 200).await;
        Mock::given(method("GET"))
            .and(path("/v8/finance/chart/FWRG.L"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"chart": {"result": [{"meta": {"currency": "GBp"}, "timestamp": [], "indicators": {"quote": [{"close": []}]}}]}}"#,
            ))
            .mount(&server)
            .await;

        let provider = provider(&[server.uri()], "http://127.0.0.1:1");
        let result = provider.current_price(&etf()).await;
        assert!(result.is_err());
        assert_eq!(
            result.unwrap_err().to_string(),
            "No price data available for symbol: FWRG.L"
        );
    }

    #[tokio::test]
    async fn test_price_at_converts_at_requested_instant() {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 14, 0, 0).unwrap();
        let bar_ts = Utc.with_ymd_and_hms(2024, 2, 29, 8, 0, 0).unwrap().timestamp();

        let server = MockServer::start().await;
        let chart_body = format!(
            r#"{{"chart": {{"result": [{{"meta": {{"currency": "GBp"}}, "timestamp": [{bar_ts}], "indicators": {{"quote": [{{"close": [250.0]}}]}}}}]}}}}"#
        );
        Mock::given(method("GET"))
            .and(path("/v8/finance/chart/FWRG.L"))
            .respond_with(ResponseTemplate::new(200).set_body_string(chart_body))
            .mount(&server)
            .await;
        // FX is requested for 2024-03-01, the instant's date, not the bar's.
        Mock::given(method("GET"))
            .and(path("/2024-03-01"))
            .and(query_param("from", "GBP"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"rates": {"EUR": 1.2}}"#))
            .expect(1)
            .mount(&server)
            .await;

        let provider = provider(&[server.uri()], &server.uri());
        let price = provider.price_at(&etf(), at).await.unwrap();
        assert!((price - 2.5 * 1.2).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_price_at_null_close_at_nearest_index_fails() {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 14, 0, 0).unwrap();
        let near = at.timestamp() - 3600;
        let far = at.timestamp() - 80_000;

        let server = MockServer::start().await;
        let chart_body = format!(
            r#"{{"chart": {{"result": [{{"meta": {{"currency": "GBp"}}, "timestamp": [{far}, {near}], "indicators": {{"quote": [{{"close": [240.0, null]}}]}}}}]}}}}"#
        );
        Mock::given(method("GET"))
            .and(path("/v8/finance/chart/FWRG.L"))
            .respond_with(ResponseTemplate::new(200).set_body_string(chart_body))
            .mount(&server)
            .await;

        let provider = provider(&[server.uri()], "http://127.0.0.1:1");
        let result = provider.price_at(&etf(), at).await;
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("No close price at nearest sample"));
    }

    #[tokio::test]
    async fn test_history_converts_each_day_and_skips_null_closes() {
        let day1 = Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap();
        let day2 = Utc.with_ymd_and_hms(2024, 3, 2, 8, 0, 0).unwrap();
        let day3 = Utc.with_ymd_and_hms(2024, 3, 3, 8, 0, 0).unwrap();

        let server = MockServer::start().await;
        let chart_body = format!(
            r#"{{"chart": {{"result": [{{"meta": {{"currency": "GBp"}}, "timestamp": [{}, {}, {}], "indicators": {{"quote": [{{"close": [200.0, null, 300.0]}}]}}}}]}}}}"#,
            day1.timestamp(),
            day2.timestamp(),
            day3.timestamp()
        );
        Mock::given(method("GET"))
            .and(path("/v8/finance/chart/FWRG.L"))
            .respond_with(ResponseTemplate::new(200).set_body_string(chart_body))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/2024-03-01"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"rates": {"EUR": 1.1}}"#))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/2024-03-03"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"rates": {"EUR": 1.3}}"#))
            .mount(&server)
            .await;

        let provider = provider(&[server.uri()], &server.uri());
        let series = provider
            .historical_series(&etf(), day1 - chrono::Duration::days(1), day3)
            .await
            .unwrap();

        assert_eq!(series.len(), 2);
        assert_eq!(series[0].day, NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
        assert!((series[0].price - 2.0 * 1.1).abs() < 1e-9);
        assert_eq!(series[1].day, NaiveDate::from_ymd_opt(2024, 3, 3).unwrap());
        assert!((series[1].price - 3.0 * 1.3).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_history_empty_timestamps_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v8/finance/chart/FWRG.L"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"chart": {"result": [{"meta": {"currency": "GBp"}}]}}"#,
            ))
            .mount(&server)
            .await;

        let provider = provider(&[server.uri()], "http://127.0.0.1:1");
        let result = provider
            .historical_series(&etf(), Utc::now() - chrono::Duration::days(7), Utc::now())
            .await;
        assert!(result.is_err());
    }
}
