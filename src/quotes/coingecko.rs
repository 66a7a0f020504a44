//! CoinGecko quote source. All prices are requested in EUR directly, so no
//! FX normalization is needed downstream.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, instrument};

use crate::cache::TtlCache;
use crate::quotes::{PricePoint, Quote, QuoteProvider};
use crate::registry::AssetDefinition;

pub struct CoinGeckoProvider {
    base_url: String,
    client: reqwest::Client,
    quote_cache: TtlCache<String, Quote>,
    history_cache: TtlCache<String, Vec<PricePoint>>,
}

impl CoinGeckoProvider {
    pub fn new(
        base_url: &str,
        quote_cache: TtlCache<String, Quote>,
        history_cache: TtlCache<String, Vec<PricePoint>>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder().user_agent("folio/1.0").build()?;
        Ok(Self {
            base_url: base_url.to_string(),
            client,
            quote_cache,
            history_cache,
        })
    }

    fn coin_id<'a>(&self, asset: &'a AssetDefinition) -> Result<&'a str> {
        asset
            .coingecko_id
            .as_deref()
            .ok_or_else(|| anyhow!("Missing coingecko_id for {}", asset.id))
    }

    async fn market_chart_range(
        &self,
        coin_id: &str,
        from_sec: i64,
        to_sec: i64,
    ) -> Result<Vec<(f64, f64)>> {
        let url = format!(
            "{}/api/v3/coins/{}/market_chart/range?vs_currency=eur&from={}&to={}",
            self.base_url, coin_id, from_sec, to_sec
        );
        debug!("Requesting price range from {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| anyhow!("Request error: {} for coin: {} URL: {}", e, coin_id, url))?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "HTTP error: {} for coin: {}",
                response.status(),
                coin_id
            ));
        }

        let data = response.json::<MarketChartResponse>().await?;
        Ok(data.prices.unwrap_or_default())
    }
}

#[derive(Debug, Deserialize)]
struct SimplePriceEntry {
    eur: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct MarketChartResponse {
    /// Pairs of (epoch milliseconds, price).
    prices: Option<Vec<(f64, f64)>>,
}

/// Picks the sample whose timestamp is closest to the target. Strict
/// improvement only, so the first sample wins ties.
fn nearest_sample(prices: &[(f64, f64)], target_ms: i64) -> (f64, f64) {
    let mut best = prices[0];
    let mut best_delta = (best.0 - target_ms as f64).abs();
    for p in prices {
        let delta = (p.0 - target_ms as f64).abs();
        if delta < best_delta {
            best = *p;
            best_delta = delta;
        }
    }
    best
}

/// Collapses raw samples to one per UTC calendar day, keeping the
/// chronologically last sample within each day, ascending by day.
fn aggregate_by_day(prices: &[(f64, f64)]) -> Vec<PricePoint> {
    let mut by_day: BTreeMap<chrono::NaiveDate, (f64, f64)> = BTreeMap::new();
    for &(ts_ms, price) in prices {
        let Some(day) = Utc
            .timestamp_millis_opt(ts_ms as i64)
            .single()
            .map(|dt| dt.date_naive())
        else {
            continue;
        };
        match by_day.get(&day) {
            Some(&(kept_ts, _)) if ts_ms < kept_ts => {}
            _ => {
                by_day.insert(day, (ts_ms, price));
            }
        }
    }
    by_day
        .into_iter()
        .map(|(day, (_, price))| PricePoint { day, price })
        .collect()
}

#[async_trait]
impl QuoteProvider for CoinGeckoProvider {
    #[instrument(name = "CoinGeckoSpot", skip(self, asset), fields(asset = %asset.id))]
    async fn current_price(&self, asset: &AssetDefinition) -> Result<Quote> {
        let coin_id = self.coin_id(asset)?;
        if let Some(cached) = self.quote_cache.get(&coin_id.to_string()).await {
            return Ok(cached);
        }

        let url = format!(
            "{}/api/v3/simple/price?ids={}&vs_currencies=eur",
            self.base_url, coin_id
        );
        debug!("Requesting spot price from {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| anyhow!("Request error: {} for coin: {} URL: {}", e, coin_id, url))?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "HTTP error: {} for coin: {}",
                response.status(),
                coin_id
            ));
        }

        let data = response
            .json::<HashMap<String, SimplePriceEntry>>()
            .await?;
        let price = data
            .get(coin_id)
            .and_then(|entry| entry.eur)
            .ok_or_else(|| anyhow!("No price data available for coin: {}", coin_id))?;

        let quote = Quote {
            price,
            currency: "EUR".to_string(),
        };
        self.quote_cache.put(coin_id.to_string(), quote.clone()).await;
        Ok(quote)
    }

    #[instrument(name = "CoinGeckoPriceAt", skip(self, asset), fields(asset = %asset.id))]
    async fn price_at(&self, asset: &AssetDefinition, at: DateTime<Utc>) -> Result<f64> {
        let coin_id = self.coin_id(asset)?;
        let at_ms = at.timestamp_millis();
        // Symmetric 1h window around the instant.
        let from_sec = (at_ms - 60 * 60 * 1000).div_euclid(1000);
        let to_sec = (at_ms + 60 * 60 * 1000 + 999).div_euclid(1000);

        let prices = self.market_chart_range(coin_id, from_sec, to_sec).await?;
        if prices.is_empty() {
            return Err(anyhow!("No price data available for coin: {}", coin_id));
        }

        Ok(nearest_sample(&prices, at_ms).1)
    }

    #[instrument(name = "CoinGeckoHistory", skip(self, asset), fields(asset = %asset.id))]
    async fn historical_series(
        &self,
        asset: &AssetDefinition,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<PricePoint>> {
        let coin_id = self.coin_id(asset)?;
        let from_sec = start.timestamp();
        let to_sec = end.timestamp();
        let cache_key = format!("{coin_id}:{from_sec}:{to_sec}");
        if let Some(cached) = self.history_cache.get(&cache_key).await {
            return Ok(cached);
        }

        let prices = self.market_chart_range(coin_id, from_sec, to_sec).await?;
        if prices.is_empty() {
            return Err(anyhow!("No price data available for coin: {}", coin_id));
        }

        let series = aggregate_by_day(&prices);
        self.history_cache.put(cache_key, series.clone()).await;
        Ok(series)
    }
}
