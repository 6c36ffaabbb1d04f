use super::util::{http_client, with_retry};
use crate::core::account::{UserDirectory, UserRecord};
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, instrument};

/// Client for the bank's user-record endpoint, `GET /user/get/{id}`.
pub struct BankApiClient {
    base_url: String,
    token: Option<String>,
    client: reqwest::Client,
}

impl BankApiClient {
    pub fn new(base_url: &str, token: Option<&str>, timeout: Duration) -> Result<Self> {
        Ok(BankApiClient {
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.map(str::to_string),
            client: http_client(timeout).context("Failed to build HTTP client")?,
        })
    }
}

#[async_trait]
impl UserDirectory for BankApiClient {
    #[instrument(name = "BankUserFetch", skip(self))]
    async fn get_user(&self, identifier: &str) -> Result<UserRecord> {
        let url = format!("{}/user/get/{}", self.base_url, identifier);
        debug!("Requesting user record from {}", url);

        let response = with_retry(
            || {
                let mut request = self.client.get(&url);
                if let Some(token) = &self.token {
                    request = request.bearer_auth(token);
                }
                request.send()
            },
            1,
            500,
        )
        .await
        .with_context(|| format!("Failed to send request for user: {identifier}"))?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "HTTP error: {} for user: {}",
                response.status(),
                identifier
            ));
        }

        let text = response
            .text()
            .await
            .with_context(|| format!("Failed to get response text for user: {identifier}"))?;
        let record: UserRecord = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse user record for: {identifier}"))?;
        debug!(
            transactions = record.transactions.len(),
            "Received user record"
        );
        Ok(record)
    }
}
