use crate::registry::{AssetDefinition, AssetKind, AssetRegistry, QuoteSource};
use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf};
use tracing::debug;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CoinGeckoProviderConfig {
    pub base_url: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct YahooProviderConfig {
    /// Ordered v7 quote hosts tried in sequence. The first host also serves
    /// the v8 chart requests.
    pub hosts: Vec<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct FxProviderConfig {
    pub base_url: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ProvidersConfig {
    pub coingecko: Option<CoinGeckoProviderConfig>,
    pub yahoo: Option<YahooProviderConfig>,
    pub fx: Option<FxProviderConfig>,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        ProvidersConfig {
            coingecko: Some(CoinGeckoProviderConfig {
                base_url: "https://api.coingecko.com".to_string(),
            }),
            yahoo: Some(YahooProviderConfig {
                hosts: vec![
                    "https://query1.finance.yahoo.com".to_string(),
                    "https://query2.finance.yahoo.com".to_string(),
                ],
            }),
            fx: Some(FxProviderConfig {
                base_url: "https://api.frankfurter.app".to_string(),
            }),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    pub assets: Vec<AssetDefinition>,
    #[serde(default)]
    pub providers: ProvidersConfig,
    /// Overrides the default location of the transaction store.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        debug!("Loading default config");
        let config_path = Self::default_config_path()?;
        Self::load_from_path(&config_path)
    }

    pub fn default_config_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("dev", "folio", "folio")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.config_dir().join("config.yaml"))
    }

    pub fn default_data_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("dev", "folio", "folio")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.data_dir().to_path_buf())
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let config_str = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Self = serde_yaml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;
        debug!("Successfully loaded config");
        Ok(config)
    }

    pub fn registry(&self) -> AssetRegistry {
        AssetRegistry::new(self.assets.clone())
    }

    pub fn data_path(&self) -> Result<PathBuf> {
        match &self.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => Self::default_data_path(),
        }
    }

    /// The assets a fresh installation starts with: Bitcoin via CoinGecko
    /// and a GBp-quoted all-world ETF via Yahoo.
    pub fn default_assets() -> Vec<AssetDefinition> {
        vec![
            AssetDefinition {
                id: "btc".to_string(),
                name: "Bitcoin".to_string(),
                kind: AssetKind::Crypto,
                quote_source: QuoteSource::Coingecko,
                coingecko_id: Some("bitcoin".to_string()),
                yahoo_symbol: None,
                currency: "EUR".to_string(),
                decimals: 8,
            },
            AssetDefinition {
                id: "etf:invesco-ftse-all-world".to_string(),
                name: "Invesco FTSE All-World".to_string(),
                kind: AssetKind::Etf,
                quote_source: QuoteSource::Yahoo,
                coingecko_id: None,
                yahoo_symbol: Some("FWRG.L".to_string()),
                currency: "GBp".to_string(),
                decimals: 2,
            },
        ]
    }
}
