//! Transaction records and their JSON-file store.
//!
//! The store is deliberately dumb: one pretty-printed JSON array on disk,
//! read and written whole. Transactions are created and deleted by user
//! action and never mutated otherwise.

use crate::registry::AssetRegistry;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use tracing::debug;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    /// Opaque unique id.
    pub id: String,
    /// Must resolve in the asset registry.
    pub asset_id: String,
    /// Acquisition time, epoch milliseconds.
    pub timestamp: i64,
    /// Units bought, non-negative.
    pub quantity: f64,
    /// Unit price in EUR at acquisition time, non-negative.
    pub price_per_unit_eur: f64,
}

impl Transaction {
    pub fn new(asset_id: &str, timestamp: i64, quantity: f64, price_per_unit_eur: f64) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            asset_id: asset_id.to_string(),
            timestamp,
            quantity,
            price_per_unit_eur,
        }
    }
}

fn round_to(value: f64, digits: u32) -> f64 {
    let factor = 10f64.powi(digits as i32);
    (value * factor).round() / factor
}

pub struct TransactionStore {
    path: PathBuf,
}

impl TransactionStore {
    pub fn new(data_dir: PathBuf) -> Self {
        Self {
            path: data_dir.join("transactions.json"),
        }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    /// Reads all transactions. A missing file is an empty portfolio, not an
    /// error. Applies one-time decimal normalization: quantities are rounded
    /// to the owning asset's configured precision, prices to cents.
    pub fn load(&self, registry: &AssetRegistry) -> Result<Vec<Transaction>> {
        if !self.path.exists() {
            debug!("No transaction file at {}", self.path.display());
            return Ok(Vec::new());
        }

        let raw = fs::read_to_string(&self.path).with_context(|| {
            format!("Failed to read transaction file: {}", self.path.display())
        })?;
        let mut transactions: Vec<Transaction> = serde_json::from_str(&raw).with_context(|| {
            format!("Failed to parse transaction file: {}", self.path.display())
        })?;

        for tx in &mut transactions {
            let decimals = registry.get(&tx.asset_id).map_or(4, |a| a.decimals);
            tx.quantity = round_to(tx.quantity, decimals);
            tx.price_per_unit_eur = round_to(tx.price_per_unit_eur, 2);
        }

        debug!("Loaded {} transactions", transactions.len());
        Ok(transactions)
    }

    pub fn save(&self, transactions: &[Transaction]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(transactions)
            .context("Failed to serialize transactions")?;
        fs::write(&self.path, json).with_context(|| {
            format!("Failed to write transaction file: {}", self.path.display())
        })?;
        debug!("Saved {} transactions", transactions.len());
        Ok(())
    }

    pub fn add(&self, registry: &AssetRegistry, transaction: Transaction) -> Result<()> {
        let mut transactions = self.load(registry)?;
        transactions.push(transaction);
        self.save(&transactions)
    }

    /// Removes the transaction with the given id. Returns false when no
    /// transaction matched.
    pub fn remove(&self, registry: &AssetRegistry, id: &str) -> Result<bool> {
        let mut transactions = self.load(registry)?;
        let before = transactions.len();
        transactions.retain(|t| t.id != id);
        if transactions.len() == before {
            return Ok(false);
        }
        self.save(&transactions)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{AssetDefinition, AssetKind, QuoteSource};

    fn test_registry() -> AssetRegistry {
        AssetRegistry::new(vec![AssetDefinition {
            id: "btc".to_string(),
            name: "Bitcoin".to_string(),
            kind: AssetKind::Crypto,
            quote_source: QuoteSource::Coingecko,
            coingecko_id: Some("bitcoin".to_string()),
            yahoo_symbol: None,
            currency: "EUR".to_string(),
            decimals: 8,
        }])
    }

    #[test]
    fn test_missing_file_is_empty_portfolio() {
        let dir = tempfile::tempdir().unwrap();
        let store = TransactionStore::new(dir.path().to_path_buf());
        let transactions = store.load(&test_registry()).unwrap();
        assert!(transactions.is_empty());
    }

    #[test]
    fn test_add_save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = TransactionStore::new(dir.path().to_path_buf());
        let registry = test_registry();

        let tx = Transaction::new("btc", 1_700_000_000_000, 0.5, 30_000.0);
        let id = tx.id.clone();
        store.add(&registry, tx).unwrap();

        let loaded = store.load(&registry).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, id);
        assert_eq!(loaded[0].asset_id, "btc");
        assert_eq!(loaded[0].quantity, 0.5);

        assert!(store.remove(&registry, &id).unwrap());
        assert!(!store.remove(&registry, &id).unwrap());
        assert!(store.load(&registry).unwrap().is_empty());
    }

    #[test]
    fn test_load_normalizes_precision() {
        let dir = tempfile::tempdir().unwrap();
        let store = TransactionStore::new(dir.path().to_path_buf());
        let registry = test_registry();

        store
            .save(&[Transaction {
                id: "t1".to_string(),
                asset_id: "btc".to_string(),
                timestamp: 0,
                quantity: 0.123456789123,
                price_per_unit_eur: 30_000.119,
            }])
            .unwrap();

        let loaded = store.load(&registry).unwrap();
        assert_eq!(loaded[0].quantity, 0.12345679);
        assert_eq!(loaded[0].price_per_unit_eur, 30_000.12);
    }

    #[test]
    fn test_unknown_asset_falls_back_to_four_decimals() {
        let dir = tempfile::tempdir().unwrap();
        let store = TransactionStore::new(dir.path().to_path_buf());

        store
            .save(&[Transaction {
                id: "t1".to_string(),
                asset_id: "unknown".to_string(),
                timestamp: 0,
                quantity: 1.23456789,
                price_per_unit_eur: 10.0,
            }])
            .unwrap();

        let loaded = store.load(&test_registry()).unwrap();
        assert_eq!(loaded[0].quantity, 1.2346);
    }
}
