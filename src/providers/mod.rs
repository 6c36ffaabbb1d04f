pub mod bank;
pub mod coingecko;
pub mod finnhub;
pub mod util;
pub mod yahoo_finance;

use crate::core::account::UserDirectory;
use crate::core::config::AppConfig;
use crate::core::history::HistorySource;
use anyhow::Result;
use std::sync::Arc;
use tracing::debug;

pub fn crypto_source(config: &AppConfig) -> Result<Arc<dyn HistorySource>> {
    let provider = coingecko::CoinGeckoProvider::new(
        &config.providers.coingecko.base_url,
        config.refresh.request_timeout(),
    )?;
    Ok(Arc::new(provider))
}

/// Finnhub when an API key is configured, the keyless Yahoo chart API
/// otherwise.
pub fn fund_source(config: &AppConfig) -> Result<Arc<dyn HistorySource>> {
    let timeout = config.refresh.request_timeout();
    match &config.providers.finnhub {
        Some(finnhub) => {
            debug!("Using Finnhub for fund history");
            Ok(Arc::new(finnhub::FinnhubProvider::new(
                &finnhub.base_url,
                &finnhub.api_key,
                timeout,
            )?))
        }
        None => {
            debug!("Using Yahoo Finance for fund history");
            Ok(Arc::new(yahoo_finance::YahooFinanceProvider::new(
                &config.providers.yahoo.base_url,
                timeout,
            )?))
        }
    }
}

pub fn user_directory(config: &AppConfig) -> Result<Arc<dyn UserDirectory>> {
    let bank = &config.providers.bank;
    Ok(Arc::new(bank::BankApiClient::new(
        &bank.base_url,
        bank.token.as_deref(),
        config.refresh.request_timeout(),
    )?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fund_source_prefers_finnhub_when_configured() {
        let mut config = AppConfig::default();
        assert_eq!(fund_source(&config).unwrap().name(), yahoo_finance::SOURCE_NAME);

        config.providers.finnhub = Some(crate::core::config::FinnhubConfig {
            base_url: "http://localhost:1".to_string(),
            api_key: "key".to_string(),
        });
        assert_eq!(fund_source(&config).unwrap().name(), finnhub::SOURCE_NAME);
        assert_eq!(crypto_source(&config).unwrap().name(), coingecko::SOURCE_NAME);
    }
}
