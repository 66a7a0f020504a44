//! Daily time series of deployed capital vs. mark-to-market value.

use crate::quotes::PricePoint;
use crate::store::Transaction;
use chrono::{DateTime, NaiveDate};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};

/// Day-granularity EUR prices for one asset, ascending by day.
pub type DayPrices = BTreeMap<NaiveDate, f64>;

/// Per-asset historical prices.
pub type PriceHistory = HashMap<String, DayPrices>;

/// Folds a provider series into the history map. Overwrites by day key, so
/// merge order is observable when source series overlap.
pub fn merge_history(history: &mut PriceHistory, asset_id: &str, points: &[PricePoint]) {
    let prices = history.entry(asset_id.to_string()).or_default();
    for point in points {
        prices.insert(point.day, point.price);
    }
}

/// Price sample nearest to the given day. Clamps to the first sample before
/// the range and the last sample after it; in between, the smallest absolute
/// day difference wins and ties go to the earlier sample.
pub fn nearest_price(prices: &DayPrices, day: NaiveDate) -> Option<f64> {
    let (&first_day, &first_price) = prices.first_key_value()?;
    let (&last_day, &last_price) = prices.last_key_value()?;

    if day <= first_day {
        return Some(first_price);
    }
    if day >= last_day {
        return Some(last_price);
    }

    let mut best_price = first_price;
    let mut best_delta = (day - first_day).num_days().abs();
    for (&sample_day, &price) in prices {
        let delta = (day - sample_day).num_days().abs();
        if delta < best_delta {
            best_delta = delta;
            best_price = price;
        }
    }
    Some(best_price)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartPoint {
    pub day: NaiveDate,
    pub deployed_eur: f64,
    pub current_eur: f64,
    /// At least one transaction occurred on this calendar day.
    pub deposit: bool,
}

/// One point per UTC calendar day from the first transaction through
/// `today`. Deterministic given its inputs; empty input yields an empty
/// series.
pub fn daily_series(
    transactions: &[Transaction],
    current_prices_eur: &HashMap<String, f64>,
    history: &PriceHistory,
    today: NaiveDate,
) -> Vec<ChartPoint> {
    let mut sorted: Vec<&Transaction> = transactions
        .iter()
        .filter(|t| DateTime::from_timestamp_millis(t.timestamp).is_some())
        .collect();
    sorted.sort_by_key(|t| t.timestamp);

    let Some(first_day) = sorted
        .first()
        .and_then(|t| DateTime::from_timestamp_millis(t.timestamp))
        .map(|dt| dt.date_naive())
    else {
        return Vec::new();
    };

    let deposit_days: HashSet<NaiveDate> = sorted
        .iter()
        .filter_map(|t| DateTime::from_timestamp_millis(t.timestamp))
        .map(|dt| dt.date_naive())
        .collect();

    // Running per-asset (quantity, deployed) accumulator.
    let mut positions: HashMap<&str, (f64, f64)> = HashMap::new();
    let mut next_tx = 0;
    let mut points = Vec::new();

    let mut day = first_day;
    while day <= today {
        let Some(next_day) = day.succ_opt() else {
            break;
        };
        let day_end_ms = next_day
            .and_hms_opt(0, 0, 0)
            .map(|dt| dt.and_utc().timestamp_millis())
            .unwrap_or(i64::MAX);

        // Transactions apply on the day they occur: half-open window up to
        // the next midnight.
        while next_tx < sorted.len() && sorted[next_tx].timestamp < day_end_ms {
            let tx = sorted[next_tx];
            let entry = positions.entry(tx.asset_id.as_str()).or_insert((0.0, 0.0));
            entry.0 += tx.quantity;
            entry.1 += tx.quantity * tx.price_per_unit_eur;
            next_tx += 1;
        }

        let deployed_total: f64 = positions.values().map(|(_, deployed)| deployed).sum();

        // The series only begins once capital has been deployed.
        if deployed_total == 0.0 {
            day = next_day;
            continue;
        }

        let current_total =
            value_positions_at(&positions, day, current_prices_eur, history, deployed_total);

        points.push(ChartPoint {
            day,
            deployed_eur: deployed_total,
            current_eur: current_total,
            deposit: deposit_days.contains(&day),
        });

        day = next_day;
    }

    points
}

fn value_positions_at(
    positions: &HashMap<&str, (f64, f64)>,
    day: NaiveDate,
    current_prices_eur: &HashMap<String, f64>,
    history: &PriceHistory,
    deployed_total: f64,
) -> f64 {
    let mut total = 0.0;

    for (asset_id, (quantity, _)) in positions {
        if *quantity == 0.0 {
            continue;
        }

        let mut price = history
            .get(*asset_id)
            .and_then(|prices| nearest_price(prices, day));

        // A missing or non-positive historical price falls back to the live
        // quote.
        if !price.is_some_and(|p| p > 0.0) {
            price = current_prices_eur.get(*asset_id).copied();
        }

        if let Some(price) = price.filter(|p| *p > 0.0) {
            total += quantity * price;
        }
    }

    // No price for any asset: assume no gain or loss rather than a hole.
    if total == 0.0 && deployed_total > 0.0 {
        total = deployed_total;
    }

    total
}
