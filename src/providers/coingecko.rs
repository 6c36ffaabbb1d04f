use super::util::{get_json, http_client};
use crate::core::error::MarketError;
use crate::core::history::HistorySource;
use crate::core::window::FetchWindow;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, instrument};

pub const SOURCE_NAME: &str = "coingecko";

/// Maps a ticker to the CoinGecko coin id. Unknown tickers are assumed to
/// already be ids.
pub fn coin_id(symbol: &str) -> String {
    let id = match symbol.to_uppercase().as_str() {
        "BTC" => "bitcoin",
        "ETH" => "ethereum",
        "ADA" => "cardano",
        "SOL" => "solana",
        "XRP" => "ripple",
        "DOT" => "polkadot",
        "DOGE" => "dogecoin",
        "LINK" => "chainlink",
        "MATIC" => "matic-network",
        "UNI" => "uniswap",
        "AVAX" => "avalanche-2",
        "LTC" => "litecoin",
        "BCH" => "bitcoin-cash",
        "ETC" => "ethereum-classic",
        "XLM" => "stellar",
        "ATOM" => "cosmos",
        "NEAR" => "near",
        "FLOW" => "flow",
        "THETA" => "theta-token",
        "VET" => "vechain",
        "USDT" => "tether",
        "USDC" => "usd-coin",
        "BNB" => "binancecoin",
        "SHIB" => "shiba-inu",
        "PEPE" => "pepe",
        "FLOKI" => "floki",
        "XMR" => "monero",
        "ZEC" => "zcash",
        "DASH" => "dash",
        "ARB" => "arbitrum",
        "OP" => "optimism",
        "LINEA" => "linea",
        "AAVE" => "aave",
        "CRV" => "curve-dao-token",
        "SUSHI" => "sushi",
        "FIL" => "filecoin",
        "ICP" => "internet-computer",
        "RUNE" => "thorchain",
        "GRT" => "the-graph",
        "AXS" => "axie-infinity",
        "SAND" => "the-sandbox",
        "MANA" => "decentraland",
        "ALGO" => "algorand",
        _ => return symbol.to_lowercase(),
    };
    id.to_string()
}

/// Crypto price history from the CoinGecko `market_chart` endpoint, which
/// answers with `{"prices": [[ms, price], ...]}`.
pub struct CoinGeckoProvider {
    base_url: String,
    client: reqwest::Client,
}

impl CoinGeckoProvider {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        Ok(CoinGeckoProvider {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: http_client(timeout).context("Failed to build HTTP client")?,
        })
    }
}

#[async_trait]
impl HistorySource for CoinGeckoProvider {
    fn name(&self) -> &str {
        SOURCE_NAME
    }

    #[instrument(
        name = "CoinGeckoHistoryFetch",
        skip(self, window),
        fields(days = window.actual_request_days)
    )]
    async fn fetch_history(
        &self,
        symbol: &str,
        window: &FetchWindow,
        quote_currency: &str,
    ) -> Result<Value, MarketError> {
        let url = format!(
            "{}/coins/{}/market_chart?vs_currency={}&days={}",
            self.base_url,
            coin_id(symbol),
            quote_currency.to_lowercase(),
            window.actual_request_days
        );
        debug!("Requesting price history from {}", url);
        get_json(&self.client, SOURCE_NAME, &url).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::window::resolve;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(server: &MockServer) -> CoinGeckoProvider {
        CoinGeckoProvider::new(&server.uri(), Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_coin_id_mapping() {
        assert_eq!(coin_id("btc"), "bitcoin");
        assert_eq!(coin_id("AVAX"), "avalanche-2");
        assert_eq!(coin_id("Kaspa"), "kaspa");
    }

    #[tokio::test]
    async fn test_intraday_requests_week_window() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/coins/bitcoin/market_chart"))
            .and(query_param("vs_currency", "eur"))
            .and(query_param("days", "7"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(r#"{"prices": [[1704067200000, 38000.5]]}"#),
            )
            .expect(1)
            .mount(&server)
            .await;

        let body = provider(&server)
            .fetch_history("BTC", &resolve(1).unwrap(), "EUR")
            .await
            .unwrap();
        assert_eq!(body["prices"][0][1], 38000.5);
    }

    #[tokio::test]
    async fn test_rate_limit_response() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/coins/ethereum/market_chart"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let err = provider(&server)
            .fetch_history("ETH", &resolve(30).unwrap(), "eur")
            .await
            .unwrap_err();
        assert_eq!(
            err,
            MarketError::RateLimited {
                source_name: SOURCE_NAME.to_string()
            }
        );
    }
}
