use super::util::{get_json, http_client};
use crate::core::error::MarketError;
use crate::core::history::HistorySource;
use crate::core::window::{FetchWindow, Granularity};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, instrument};

pub const SOURCE_NAME: &str = "yahoo";

fn interval(granularity: Granularity) -> &'static str {
    match granularity {
        Granularity::Minute => "5m",
        Granularity::Hour => "60m",
        Granularity::Day => "1d",
    }
}

/// Fund history from the Yahoo chart API. Needs no key, so it is the fund
/// source when Finnhub is not configured.
pub struct YahooFinanceProvider {
    base_url: String,
    client: reqwest::Client,
}

impl YahooFinanceProvider {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        Ok(YahooFinanceProvider {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: http_client(timeout).context("Failed to build HTTP client")?,
        })
    }
}

#[async_trait]
impl HistorySource for YahooFinanceProvider {
    fn name(&self) -> &str {
        SOURCE_NAME
    }

    #[instrument(
        name = "YahooHistoryFetch",
        skip(self, window, _quote_currency),
        fields(days = window.actual_request_days)
    )]
    async fn fetch_history(
        &self,
        symbol: &str,
        window: &FetchWindow,
        _quote_currency: &str,
    ) -> Result<Value, MarketError> {
        let to = Utc::now();
        let from = to - window.request_duration();
        let url = format!(
            "{}/v8/finance/chart/{}?period1={}&period2={}&interval={}",
            self.base_url,
            symbol.to_uppercase(),
            from.timestamp(),
            to.timestamp(),
            interval(window.granularity_hint)
        );
        debug!("Requesting chart data from {}", url);
        get_json(&self.client, SOURCE_NAME, &url).await
    }
}
