use super::util::{get_json, http_client_with_headers};
use crate::core::error::MarketError;
use crate::core::history::HistorySource;
use crate::core::window::{FetchWindow, Granularity};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::{HeaderMap, HeaderValue};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, instrument};

pub const SOURCE_NAME: &str = "finnhub";
const TOKEN_HEADER: &str = "x-finnhub-token";

fn resolution(granularity: Granularity) -> &'static str {
    match granularity {
        Granularity::Minute => "5",
        Granularity::Hour => "60",
        Granularity::Day => "D",
    }
}

/// Fund and ETF candles from Finnhub, returned as parallel `c`/`h`/`l`/`o`/
/// `t`/`v` arrays, or `{"s": "no_data"}`.
pub struct FinnhubProvider {
    base_url: String,
    client: reqwest::Client,
}

impl FinnhubProvider {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self> {
        let mut token = HeaderValue::from_str(api_key).context("Invalid Finnhub API key")?;
        token.set_sensitive(true);
        let mut headers = HeaderMap::new();
        headers.insert(TOKEN_HEADER, token);

        Ok(FinnhubProvider {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: http_client_with_headers(timeout, headers)
                .context("Failed to build HTTP client")?,
        })
    }
}

#[async_trait]
impl HistorySource for FinnhubProvider {
    fn name(&self) -> &str {
        SOURCE_NAME
    }

    #[instrument(
        name = "FinnhubCandleFetch",
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
            "{}/stock/candle?symbol={}&resolution={}&from={}&to={}",
            self.base_url,
            symbol.to_uppercase(),
            resolution(window.granularity_hint),
            from.timestamp(),
            to.timestamp(),
        );
        debug!("Requesting candles from {}", url);
        get_json(&self.client, SOURCE_NAME, &url).await
    }
}
