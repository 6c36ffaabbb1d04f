use crate::core::error::MarketError;
use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use serde_json::Value;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

pub const USER_AGENT: &str = "tickwatch/0.1";

/// Builds the HTTP client shared by a provider's requests.
pub fn http_client(timeout: Duration) -> reqwest::Result<reqwest::Client> {
    http_client_with_headers(timeout, HeaderMap::new())
}

/// Like [`http_client`], sending `headers` with every request. Credentials
/// go here rather than in the query string, which ends up in error text.
pub fn http_client_with_headers(
    timeout: Duration,
    headers: HeaderMap,
) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .default_headers(headers)
        .build()
}

/// Retries an async request when it failed before reaching the server
///
/// # Parameters
/// - `operation`: Closure returning a future
/// - `retries`: Number of retry attempts (total runs = 1 initial + retries)
/// - `delay_ms`: Milliseconds between retry attempts
///
/// Responses, including error statuses, and timeouts are returned as they
/// are: retrying those would only add load to an API that is already
/// struggling.
pub async fn with_retry<F, Fut, T>(
    mut operation: F,
    retries: usize,
    delay_ms: u64,
) -> Result<T, reqwest::Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, reqwest::Error>>,
{
    let mut attempt = 1;
    loop {
        match operation().await {
            Ok(val) => return Ok(val),
            Err(err) => {
                if attempt > retries || !err.is_connect() {
                    return Err(err);
                }
                debug!(
                    "Attempt {}/{} failed: {}. Retrying...",
                    attempt, retries, err
                );
                attempt += 1;
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }
        }
    }
}

/// Sends a GET and decodes the JSON body, mapping failures onto the market
/// error taxonomy.
pub async fn get_json(
    client: &reqwest::Client,
    source_name: &str,
    url: &str,
) -> Result<Value, MarketError> {
    let transport = |message: String| MarketError::Transport {
        source_name: source_name.to_string(),
        message,
    };

    let response = with_retry(|| client.get(url).send(), 1, 500)
        .await
        .map_err(|e| transport(format!("Request error: {}", e.without_url())))?;

    let status = response.status();
    debug!(%status, source_name, "Received upstream response");
    match status {
        StatusCode::TOO_MANY_REQUESTS => {
            return Err(MarketError::RateLimited {
                source_name: source_name.to_string(),
            });
        }
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            return Err(MarketError::Forbidden {
                source_name: source_name.to_string(),
            });
        }
        s if !s.is_success() => return Err(transport(format!("HTTP error: {s}"))),
        _ => {}
    }

    let text = response
        .text()
        .await
        .map_err(|e| {
            transport(format!(
                "Failed to read response body: {}",
                e.without_url()
            ))
        })?;
    serde_json::from_str(&text).map_err(|e| transport(format!("Failed to parse JSON response: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn server_with_status(status: u16, body: &str) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/history"))
            .respond_with(ResponseTemplate::new(status).set_body_string(body))
            .mount(&server)
            .await;
        server
    }

    async fn fetch(server: &MockServer) -> Result<Value, MarketError> {
        let client = http_client(Duration::from_secs(5)).unwrap();
        get_json(&client, "test", &format!("{}/history", server.uri())).await
    }

    #[tokio::test]
    async fn test_status_mapping() {
        let server = server_with_status(429, "").await;
        assert_eq!(
            fetch(&server).await.unwrap_err(),
            MarketError::RateLimited {
                source_name: "test".to_string()
            }
        );

        for status in [401, 403] {
            let server = server_with_status(status, "").await;
            assert_eq!(
                fetch(&server).await.unwrap_err(),
                MarketError::Forbidden {
                    source_name: "test".to_string()
                }
            );
        }

        let server = server_with_status(500, "").await;
        let err = fetch(&server).await.unwrap_err();
        assert!(err.is_retryable());
        assert!(err.to_string().contains("HTTP error: 500"));
    }

    #[tokio::test]
    async fn test_malformed_body_is_transport_error() {
        let server = server_with_status(200, "<html>").await;
        let err = fetch(&server).await.unwrap_err();
        assert!(err.to_string().contains("Failed to parse JSON response"));
    }

    #[tokio::test]
    async fn test_json_body_is_returned() {
        let server = server_with_status(200, r#"{"prices": []}"#).await;
        let body = fetch(&server).await.unwrap();
        assert!(body.get("prices").is_some());
    }

    #[tokio::test]
    async fn test_unreachable_host_is_transport_error() {
        let client = http_client(Duration::from_secs(2)).unwrap();
        let err = get_json(&client, "test", "http://127.0.0.1:1/history?token=secret")
            .await
            .unwrap_err();
        assert!(matches!(err, MarketError::Transport { .. }));
        assert!(!err.to_string().contains("secret"), "URL leaked: {err}");
    }
}
