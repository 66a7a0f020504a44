//! Portfolio valuation: a pure, synchronous fold of the transaction log
//! against a map of current EUR prices.

use crate::store::Transaction;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssetPosition {
    pub asset_id: String,
    pub quantity_held: f64,
    /// Sum of quantity * unit price across all buys.
    pub deployed_capital_eur: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssetValuation {
    pub asset_id: String,
    pub current_price_eur: f64,
    pub current_value_eur: f64,
    pub position: AssetPosition,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortfolioTotals {
    pub deployed_capital_eur: f64,
    pub current_value_eur: f64,
    pub profit_eur: f64,
    /// profit / deployed capital; exactly 0 when nothing is deployed.
    pub return_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortfolioSnapshot {
    pub assets: Vec<AssetValuation>,
    pub totals: PortfolioTotals,
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub(crate) fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

/// Sums quantity and deployed capital per asset. Order-independent; keyed
/// map iteration keeps snapshot output deterministic.
pub fn accumulate_positions(transactions: &[Transaction]) -> BTreeMap<String, AssetPosition> {
    let mut positions: BTreeMap<String, AssetPosition> = BTreeMap::new();
    for tx in transactions {
        let position = positions
            .entry(tx.asset_id.clone())
            .or_insert_with(|| AssetPosition {
                asset_id: tx.asset_id.clone(),
                quantity_held: 0.0,
                deployed_capital_eur: 0.0,
            });
        position.quantity_held += tx.quantity;
        position.deployed_capital_eur += tx.quantity * tx.price_per_unit_eur;
    }
    positions
}

/// Never fails: an asset without a known price is valued at 0. Accumulation
/// stays unrounded; rounding happens only on the output fields.
pub fn compute_snapshot(
    transactions: &[Transaction],
    current_prices_eur: &HashMap<String, f64>,
) -> PortfolioSnapshot {
    let positions = accumulate_positions(transactions);

    let mut assets = Vec::with_capacity(positions.len());
    let mut total_current = 0.0;
    let mut total_deployed = 0.0;

    for (asset_id, position) in positions {
        let current_price = current_prices_eur.get(&asset_id).copied().unwrap_or(0.0);
        let current_value = position.quantity_held * current_price;

        total_current += current_value;
        total_deployed += position.deployed_capital_eur;

        assets.push(AssetValuation {
            asset_id: asset_id.clone(),
            current_price_eur: round2(current_price),
            current_value_eur: round2(current_value),
            position: AssetPosition {
                asset_id,
                quantity_held: round4(position.quantity_held),
                deployed_capital_eur: round2(position.deployed_capital_eur),
            },
        });
    }

    let profit = total_current - total_deployed;
    let totals = PortfolioTotals {
        deployed_capital_eur: round2(total_deployed),
        current_value_eur: round2(total_current),
        profit_eur: round2(profit),
        return_pct: if total_deployed > 0.0 {
            profit / total_deployed
        } else {
            0.0
        },
    };

    PortfolioSnapshot { assets, totals }
}
