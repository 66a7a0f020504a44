//! Static asset registry: which provider quotes each asset, in which
//! currency, and at what display precision.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    Crypto,
    Etf,
    Stock,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuoteSource {
    Coingecko,
    Yahoo,
}

impl Display for QuoteSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QuoteSource::Coingecko => write!(f, "coingecko"),
            QuoteSource::Yahoo => write!(f, "yahoo"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetDefinition {
    pub id: String,
    pub name: String,
    pub kind: AssetKind,
    pub quote_source: QuoteSource,
    /// CoinGecko coin id, required when `quote_source` is `coingecko`.
    #[serde(default)]
    pub coingecko_id: Option<String>,
    /// Yahoo Finance ticker, required when `quote_source` is `yahoo`.
    #[serde(default)]
    pub yahoo_symbol: Option<String>,
    /// Currency the source quotes are denominated in, e.g. "EUR" or "GBp".
    pub currency: String,
    /// Fractional digits used when normalizing stored quantities.
    pub decimals: u32,
}

impl AssetDefinition {
    /// True when the provider symbol matching the quote source is present.
    /// Checked before every quote fetch; an invalid definition never reaches
    /// the network.
    pub fn is_valid(&self) -> bool {
        match self.quote_source {
            QuoteSource::Coingecko => self.coingecko_id.is_some(),
            QuoteSource::Yahoo => self.yahoo_symbol.is_some(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AssetRegistry {
    by_id: HashMap<String, AssetDefinition>,
    order: Vec<String>,
}

impl AssetRegistry {
    pub fn new(assets: Vec<AssetDefinition>) -> Self {
        let order = assets.iter().map(|a| a.id.clone()).collect();
        let by_id = assets.into_iter().map(|a| (a.id.clone(), a)).collect();
        Self { by_id, order }
    }

    pub fn get(&self, id: &str) -> Option<&AssetDefinition> {
        self.by_id.get(id)
    }

    /// All assets in configuration order.
    pub fn all(&self) -> Vec<&AssetDefinition> {
        self.order.iter().filter_map(|id| self.by_id.get(id)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coingecko_asset(id: Option<&str>) -> AssetDefinition {
        AssetDefinition {
            id: "btc".to_string(),
            name: "Bitcoin".to_string(),
            kind: AssetKind::Crypto,
            quote_source: QuoteSource::Coingecko,
            coingecko_id: id.map(str::to_string),
            yahoo_symbol: None,
            currency: "EUR".to_string(),
            decimals: 8,
        }
    }

    #[test]
    fn test_validation_requires_matching_provider_symbol() {
        assert!(coingecko_asset(Some("bitcoin")).is_valid());
        assert!(!coingecko_asset(None).is_valid());

        let yahoo = AssetDefinition {
            id: "etf:all-world".to_string(),
            name: "All World".to_string(),
            kind: AssetKind::Etf,
            quote_source: QuoteSource::Yahoo,
            coingecko_id: None,
            yahoo_symbol: Some("FWRG.L".to_string()),
            currency: "GBp".to_string(),
            decimals: 2,
        };
        assert!(yahoo.is_valid());

        let mut missing = yahoo.clone();
        missing.yahoo_symbol = None;
        // A symbol for the wrong provider does not satisfy validation.
        missing.coingecko_id = Some("bitcoin".to_string());
        assert!(!missing.is_valid());
    }

    #[test]
    fn test_registry_lookup_and_order() {
        let registry = AssetRegistry::new(vec![coingecko_asset(Some("bitcoin"))]);
        assert!(registry.get("btc").is_some());
        assert!(registry.get("eth").is_none());
        assert_eq!(registry.all().len(), 1);
        assert_eq!(registry.all()[0].id, "btc");
    }

    #[test]
    fn test_asset_yaml_deserialization() {
        let yaml = r#"
id: "btc"
name: "Bitcoin"
kind: crypto
quote_source: coingecko
coingecko_id: "bitcoin"
currency: "EUR"
decimals: 8
"#;
        let asset: AssetDefinition = serde_yaml::from_str(yaml).expect("Failed to deserialize");
        assert_eq!(asset.quote_source, QuoteSource::Coingecko);
        assert_eq!(asset.kind, AssetKind::Crypto);
        assert!(asset.yahoo_symbol.is_none());
    }
}
