//! Quote resolution: per-asset provider dispatch, fallback chains, and the
//! batch fan-out used for whole-portfolio pricing.

pub mod coingecko;
pub mod yahoo;

use crate::fx::CurrencyConverter;
use crate::registry::{AssetDefinition, QuoteSource};
use anyhow::{ensure, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use futures::future::join_all;
use indicatif::ProgressBar;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

pub use coingecko::CoinGeckoProvider;
pub use yahoo::YahooProvider;

/// Current quotes go stale after a minute; historical series after an hour.
pub const QUOTE_CACHE_TTL_MS: i64 = 60 * 1000;
pub const HISTORY_CACHE_TTL_MS: i64 = 60 * 60 * 1000;

/// A spot price in the provider's native currency.
#[derive(Debug, Clone)]
pub struct Quote {
    pub price: f64,
    pub currency: String,
}

/// One settled EUR price for one calendar day.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub day: NaiveDate,
    pub price: f64,
}

/// The three operations every quote source implements. Adding a provider
/// means adding a variant to [`QuoteSource`] and an implementation here,
/// never branching in shared code.
#[async_trait]
pub trait QuoteProvider: Send + Sync {
    /// Latest available price in the asset's native currency.
    async fn current_price(&self, asset: &AssetDefinition) -> Result<Quote>;

    /// EUR price nearest to an arbitrary instant.
    async fn price_at(&self, asset: &AssetDefinition, at: DateTime<Utc>) -> Result<f64>;

    /// Ascending day-granularity EUR prices covering `[start, end]`.
    async fn historical_series(
        &self,
        asset: &AssetDefinition,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<PricePoint>>;
}

pub struct QuoteResolver {
    coingecko: CoinGeckoProvider,
    yahoo: YahooProvider,
}

impl QuoteResolver {
    pub fn new(coingecko: CoinGeckoProvider, yahoo: YahooProvider) -> Self {
        Self { coingecko, yahoo }
    }

    fn provider_for(&self, source: QuoteSource) -> &dyn QuoteProvider {
        match source {
            QuoteSource::Coingecko => &self.coingecko,
            QuoteSource::Yahoo => &self.yahoo,
        }
    }

    pub async fn current_price(&self, asset: &AssetDefinition) -> Result<Quote> {
        ensure!(
            asset.is_valid(),
            "Invalid asset configuration for {}",
            asset.name
        );
        self.provider_for(asset.quote_source)
            .current_price(asset)
            .await
    }

    pub async fn price_at(&self, asset: &AssetDefinition, at: DateTime<Utc>) -> Result<f64> {
        ensure!(
            asset.is_valid(),
            "Invalid asset configuration for {}",
            asset.name
        );
        self.provider_for(asset.quote_source)
            .price_at(asset, at)
            .await
    }

    pub async fn historical_series(
        &self,
        asset: &AssetDefinition,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<PricePoint>> {
        ensure!(
            asset.is_valid(),
            "Invalid asset configuration for {}",
            asset.name
        );
        self.provider_for(asset.quote_source)
            .historical_series(asset, start, end)
            .await
    }
}

/// Per-asset result of a batch price resolution. A failed asset carries a
/// notice instead of a price; the batch itself never fails.
#[derive(Debug, Clone)]
pub struct QuoteOutcome {
    pub asset_id: String,
    pub price_eur: Option<f64>,
    pub notice: Option<String>,
}

/// Resolves current EUR prices for all assets concurrently. Each asset's
/// failure is isolated and converted into a notice.
pub async fn resolve_current_prices(
    resolver: &QuoteResolver,
    converter: &CurrencyConverter,
    assets: &[&AssetDefinition],
    pb: Option<&ProgressBar>,
) -> Vec<QuoteOutcome> {
    let now = Utc::now();
    let futures = assets.iter().map(|asset| async move {
        let outcome = match resolver.current_price(asset).await {
            Ok(quote) => match converter.to_eur(quote.price, &quote.currency, now).await {
                Ok(price_eur) => QuoteOutcome {
                    asset_id: asset.id.clone(),
                    price_eur: Some(price_eur),
                    notice: None,
                },
                Err(e) => QuoteOutcome {
                    asset_id: asset.id.clone(),
                    price_eur: None,
                    notice: Some(e.to_string()),
                },
            },
            Err(e) => {
                debug!(
                    "Quote resolution via {} failed for {}: {}",
                    asset.quote_source, asset.id, e
                );
                QuoteOutcome {
                    asset_id: asset.id.clone(),
                    price_eur: None,
                    notice: Some(e.to_string()),
                }
            }
        };
        if let Some(pb) = pb {
            pb.inc(1);
        }
        outcome
    });

    join_all(futures).await
}

/// Flattens batch outcomes into the price map the valuation engine expects.
pub fn price_map(outcomes: &[QuoteOutcome]) -> HashMap<String, f64> {
    outcomes
        .iter()
        .filter_map(|o| o.price_eur.map(|p| (o.asset_id.clone(), p)))
        .collect()
}
