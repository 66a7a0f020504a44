pub mod cache;
pub mod chart;
pub mod config;
pub mod fx;
pub mod log;
pub mod quotes;
pub mod registry;
pub mod series;
pub mod store;
pub mod summary;
pub mod ui;
pub mod valuation;

use crate::cache::{Clock, SystemClock, TtlCache};
use crate::config::AppConfig;
use crate::fx::{CurrencyConverter, FrankfurterProvider, FX_CACHE_TTL_MS};
use crate::quotes::{
    price_map, resolve_current_prices, CoinGeckoProvider, QuoteResolver, YahooProvider,
    HISTORY_CACHE_TTL_MS, QUOTE_CACHE_TTL_MS,
};
use crate::registry::AssetRegistry;
use crate::series::{daily_series, merge_history, PriceHistory};
use crate::store::{Transaction, TransactionStore};
use crate::valuation::compute_snapshot;
use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use futures::future::join_all;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub enum AppCommand {
    Summary,
    Chart,
    List,
    Add {
        asset_id: String,
        quantity: f64,
        date: String,
        price: Option<f64>,
    },
    Remove {
        id: String,
    },
}

pub async fn run_command(command: AppCommand, config_path: Option<&str>) -> Result<()> {
    info!("folio starting...");

    let config = match config_path {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load()?,
    };
    debug!("Loaded config: {config:#?}");

    let registry = config.registry();
    let store = TransactionStore::new(config.data_path()?);

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let fx_base = config
        .providers
        .fx
        .as_ref()
        .map_or("https://api.frankfurter.app", |p| &p.base_url);
    let converter = CurrencyConverter::new(Arc::new(FrankfurterProvider::new(
        fx_base,
        TtlCache::new(FX_CACHE_TTL_MS, Arc::clone(&clock)),
    )?));

    let quote_cache = TtlCache::new(QUOTE_CACHE_TTL_MS, Arc::clone(&clock));
    let history_cache = TtlCache::new(HISTORY_CACHE_TTL_MS, Arc::clone(&clock));

    let coingecko_base = config
        .providers
        .coingecko
        .as_ref()
        .map_or("https://api.coingecko.com", |p| &p.base_url);
    let coingecko = CoinGeckoProvider::new(
        coingecko_base,
        quote_cache.clone(),
        history_cache.clone(),
    )?;

    let yahoo_hosts = config.providers.yahoo.as_ref().map_or_else(
        || {
            vec![
                "https://query1.finance.yahoo.com".to_string(),
                "https://query2.finance.yahoo.com".to_string(),
            ]
        },
        |p| p.hosts.clone(),
    );
    let yahoo = YahooProvider::new(&yahoo_hosts, converter.clone(), quote_cache, history_cache)?;

    let resolver = QuoteResolver::new(coingecko, yahoo);

    match command {
        AppCommand::Summary => show_summary(&registry, &store, &resolver, &converter).await,
        AppCommand::Chart => show_chart(&registry, &store, &resolver, &converter).await,
        AppCommand::List => list_transactions(&registry, &store),
        AppCommand::Add {
            asset_id,
            quantity,
            date,
            price,
        } => add_transaction(&registry, &store, &resolver, &asset_id, quantity, &date, price).await,
        AppCommand::Remove { id } => remove_transaction(&registry, &store, &id),
    }
}

async fn show_summary(
    registry: &AssetRegistry,
    store: &TransactionStore,
    resolver: &QuoteResolver,
    converter: &CurrencyConverter,
) -> Result<()> {
    let transactions = store.load(registry)?;
    let assets = registry.all();

    let pb = ui::new_progress_bar(assets.len() as u64, true);
    pb.set_message("Fetching quotes...");
    let outcomes = resolve_current_prices(resolver, converter, &assets, Some(&pb)).await;
    pb.finish_and_clear();

    let prices = price_map(&outcomes);
    let snapshot = compute_snapshot(&transactions, &prices);
    println!("{}", summary::display_snapshot(&snapshot, &outcomes, registry));
    ui::print_separator();
    Ok(())
}

async fn show_chart(
    registry: &AssetRegistry,
    store: &TransactionStore,
    resolver: &QuoteResolver,
    converter: &CurrencyConverter,
) -> Result<()> {
    let transactions = store.load(registry)?;
    if transactions.is_empty() {
        println!("{}", chart::display_series(&[]));
        return Ok(());
    }

    let assets = registry.all();
    let pb = ui::new_progress_bar(assets.len() as u64, true);
    pb.set_message("Fetching quotes...");
    let outcomes = resolve_current_prices(resolver, converter, &assets, Some(&pb)).await;
    pb.finish_and_clear();
    let prices = price_map(&outcomes);

    let first_ts = transactions
        .iter()
        .map(|t| t.timestamp)
        .min()
        .unwrap_or_default();
    let start = DateTime::from_timestamp_millis(first_ts)
        .ok_or_else(|| anyhow!("Invalid transaction timestamp: {}", first_ts))?;
    let end = Utc::now();

    // Only assets actually held need history; a failed series just falls
    // back to the live quote for that asset.
    let held: Vec<_> = assets
        .iter()
        .copied()
        .filter(|a| transactions.iter().any(|t| t.asset_id == a.id))
        .collect();
    let history_futures = held.iter().map(|asset| async move {
        (
            asset.id.clone(),
            resolver.historical_series(asset, start, end).await,
        )
    });

    let mut history = PriceHistory::new();
    for (asset_id, result) in join_all(history_futures).await {
        match result {
            Ok(points) => merge_history(&mut history, &asset_id, &points),
            Err(e) => warn!("No historical prices for {}: {}", asset_id, e),
        }
    }

    let points = daily_series(&transactions, &prices, &history, Utc::now().date_naive());
    println!("{}", chart::display_series(&points));
    ui::print_separator();
    Ok(())
}

fn list_transactions(registry: &AssetRegistry, store: &TransactionStore) -> Result<()> {
    let transactions = store.load(registry)?;
    println!("{}", summary::display_transactions(&transactions, registry));
    Ok(())
}

async fn add_transaction(
    registry: &AssetRegistry,
    store: &TransactionStore,
    resolver: &QuoteResolver,
    asset_id: &str,
    quantity: f64,
    date: &str,
    price: Option<f64>,
) -> Result<()> {
    let asset = registry
        .get(asset_id)
        .ok_or_else(|| anyhow!("Unknown asset: {}", asset_id))?;
    if quantity < 0.0 {
        bail!("Quantity must be non-negative");
    }

    let when = parse_when(date)?;
    let price_per_unit_eur = match price {
        Some(p) if p >= 0.0 => p,
        Some(_) => bail!("Price must be non-negative"),
        None => {
            info!("Resolving {} price at {}", asset.id, when);
            resolver.price_at(asset, when).await?
        }
    };

    let tx = Transaction::new(&asset.id, when.timestamp_millis(), quantity, price_per_unit_eur);
    let id = tx.id.clone();
    store.add(registry, tx)?;
    println!(
        "Added {} {} at {:.2} EUR ({})",
        quantity, asset.id, price_per_unit_eur, id
    );
    Ok(())
}

fn remove_transaction(registry: &AssetRegistry, store: &TransactionStore, id: &str) -> Result<()> {
    if !store.remove(registry, id)? {
        bail!("No transaction with id: {}", id);
    }
    println!("Removed transaction {id}");
    Ok(())
}

/// Accepts either an RFC 3339 instant or a plain date (interpreted as UTC
/// midnight).
fn parse_when(date: &str) -> Result<DateTime<Utc>> {
    if date.contains('T') {
        let parsed = DateTime::parse_from_rfc3339(date)
            .with_context(|| format!("Invalid timestamp: {date}"))?;
        return Ok(parsed.with_timezone(&Utc));
    }
    let day = NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .with_context(|| format!("Invalid date: {date}"))?;
    day.and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc())
        .ok_or_else(|| anyhow!("Invalid date: {date}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_when_accepts_date_and_instant() {
        let day = parse_when("2024-03-01").unwrap();
        assert_eq!(day.to_rfc3339(), "2024-03-01T00:00:00+00:00");

        let instant = parse_when("2024-03-01T15:30:00Z").unwrap();
        assert_eq!(instant.timestamp(), 1_709_307_000);

        assert!(parse_when("yesterday").is_err());
    }
}
