use crate::core::refresh::{DEFAULT_COOLDOWN, DEFAULT_TICK_INTERVAL};
use crate::core::series::DEFAULT_LABEL_TIMEZONE;
use anyhow::{Context, Result, anyhow};
use chrono_tz::Tz;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use std::{fs, path::PathBuf};
use tracing::debug;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CoinGeckoConfig {
    pub base_url: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct FinnhubConfig {
    pub base_url: String,
    pub api_key: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct YahooProviderConfig {
    pub base_url: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct BankConfig {
    pub base_url: String,
    #[serde(default)]
    pub token: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ProvidersConfig {
    #[serde(default = "default_coingecko")]
    pub coingecko: CoinGeckoConfig,
    /// Fund history comes from Finnhub when configured, Yahoo otherwise.
    #[serde(default)]
    pub finnhub: Option<FinnhubConfig>,
    #[serde(default = "default_yahoo")]
    pub yahoo: YahooProviderConfig,
    #[serde(default = "default_bank")]
    pub bank: BankConfig,
}

fn default_coingecko() -> CoinGeckoConfig {
    CoinGeckoConfig {
        base_url: "https://api.coingecko.com/api/v3".to_string(),
    }
}

fn default_yahoo() -> YahooProviderConfig {
    YahooProviderConfig {
        base_url: "https://query1.finance.yahoo.com".to_string(),
    }
}

fn default_bank() -> BankConfig {
    BankConfig {
        base_url: "http://localhost:8080".to_string(),
        token: None,
    }
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        ProvidersConfig {
            coingecko: default_coingecko(),
            finnhub: None,
            yahoo: default_yahoo(),
            bank: default_bank(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RefreshConfig {
    #[serde(default = "default_tick_interval_secs")]
    pub tick_interval_secs: u64,
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_tick_interval_secs() -> u64 {
    DEFAULT_TICK_INTERVAL.as_secs()
}

fn default_cooldown_secs() -> u64 {
    DEFAULT_COOLDOWN.as_secs()
}

fn default_request_timeout_secs() -> u64 {
    15
}

impl Default for RefreshConfig {
    fn default() -> Self {
        RefreshConfig {
            tick_interval_secs: default_tick_interval_secs(),
            cooldown_secs: default_cooldown_secs(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl RefreshConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs.max(1))
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

fn default_quote_currency() -> String {
    "EUR".to_string()
}

fn default_label_timezone() -> String {
    DEFAULT_LABEL_TIMEZONE.name().to_string()
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default = "default_quote_currency")]
    pub quote_currency: String,
    #[serde(default)]
    pub refresh: RefreshConfig,
    #[serde(default = "default_label_timezone")]
    pub label_timezone: String,
    pub data_path: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            providers: ProvidersConfig::default(),
            quote_currency: default_quote_currency(),
            refresh: RefreshConfig::default(),
            label_timezone: default_label_timezone(),
            data_path: None,
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        debug!("Loading default config");
        let config_path = Self::default_config_path()?;
        Self::load_from_path(&config_path)
    }

    pub fn default_config_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("dev", "tickwatch", "tickwatch")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.config_dir().join("config.yaml"))
    }

    pub fn data_path(&self) -> Result<PathBuf> {
        if let Some(custom_path) = &self.data_path {
            return Ok(PathBuf::from(custom_path));
        }
        let proj_dirs = ProjectDirs::from("dev", "tickwatch", "tickwatch")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.data_dir().to_path_buf())
    }

    pub fn store_path(&self) -> Result<PathBuf> {
        Ok(self.data_path()?.join("store"))
    }

    pub fn label_timezone(&self) -> Result<Tz> {
        self.label_timezone
            .parse::<Tz>()
            .map_err(|e| anyhow!("Invalid label_timezone '{}': {}", self.label_timezone, e))
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let config_str = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Self = serde_yaml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;
        config.label_timezone()?;
        debug!("Successfully loaded config");
        Ok(config)
    }
}
