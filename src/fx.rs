//! Date-aware currency normalization into EUR, the accounting currency.

use crate::cache::TtlCache;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Cached FX rates stay valid for 24 wall-clock hours, even for past dates
/// whose true rate never changes.
pub const FX_CACHE_TTL_MS: i64 = 24 * 60 * 60 * 1000;

#[async_trait]
pub trait FxRateProvider: Send + Sync {
    /// Rate from one currency to another on a given calendar day.
    async fn rate(&self, from: &str, to: &str, on: NaiveDate) -> Result<f64>;
}

// Frankfurter daily reference rates, e.g. GET /2024-03-01?from=GBP&to=EUR
pub struct FrankfurterProvider {
    base_url: String,
    client: reqwest::Client,
    cache: TtlCache<String, f64>,
}

#[derive(Debug, Deserialize)]
struct FrankfurterResponse {
    rates: Option<HashMap<String, f64>>,
}

impl FrankfurterProvider {
    pub fn new(base_url: &str, cache: TtlCache<String, f64>) -> Result<Self> {
        let client = reqwest::Client::builder().user_agent("folio/1.0").build()?;
        Ok(Self {
            base_url: base_url.to_string(),
            client,
            cache,
        })
    }
}

#[async_trait]
impl FxRateProvider for FrankfurterProvider {
    async fn rate(&self, from: &str, to: &str, on: NaiveDate) -> Result<f64> {
        let key = format!("{from}:{to}:{on}");
        if let Some(cached) = self.cache.get(&key).await {
            return Ok(cached);
        }

        let url = format!("{}/{}?from={}&to={}", self.base_url, on, from, to);
        debug!("Requesting FX rate from {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| anyhow!("Request error: {} for rate {}->{} on {}", e, from, to, on))?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "HTTP error: {} for rate {}->{} on {}",
                response.status(),
                from,
                to,
                on
            ));
        }

        let data = response.json::<FrankfurterResponse>().await?;
        let rate = data
            .rates
            .and_then(|rates| rates.get(to).copied())
            .ok_or_else(|| anyhow!("No FX rate available for {}->{} on {}", from, to, on))?;

        self.cache.put(key, rate).await;
        Ok(rate)
    }
}

/// Converts native-currency amounts to EUR at the rate of a given instant's
/// calendar day.
#[derive(Clone)]
pub struct CurrencyConverter {
    rates: Arc<dyn FxRateProvider>,
}

impl CurrencyConverter {
    pub fn new(rates: Arc<dyn FxRateProvider>) -> Self {
        Self { rates }
    }

    /// EUR passes through untouched (no network call). Penny-denominated
    /// sterling ("GBp"/"GBX") is divided by 100 before the GBP rate is
    /// applied. Unrecognized currencies are passed through as best-effort
    /// EUR with a warning.
    pub async fn to_eur(&self, amount: f64, currency: &str, when: DateTime<Utc>) -> Result<f64> {
        let day = when.date_naive();
        match currency {
            "EUR" => Ok(amount),
            "GBp" | "GBX" => {
                let rate = self.rates.rate("GBP", "EUR", day).await?;
                Ok(amount / 100.0 * rate)
            }
            "GBP" => {
                let rate = self.rates.rate("GBP", "EUR", day).await?;
                Ok(amount * rate)
            }
            "USD" => {
                let rate = self.rates.rate("USD", "EUR", day).await?;
                Ok(amount * rate)
            }
            other => {
                warn!("Unknown currency {}, treating as EUR", other);
                Ok(amount)
            }
        }
    }
}
