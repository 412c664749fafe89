//! Reqwest transport for the export API.

use async_trait::async_trait;
use bridge_traits::error::{BridgeError, Result};
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
use reqwest::{Client, Method};
use std::time::Duration;
use tracing::{debug, warn};

const USER_AGENT: &str = concat!("snip-sync/", env!("CARGO_PKG_VERSION"));
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// [`HttpClient`] over a pooled reqwest client with rustls.
///
/// Transport errors, 5xx and 429 are retried with backoff. When the final
/// attempt still yields a retryable status the response is returned as-is so
/// the export client can surface the server's own message.
pub struct ReqwestHttpClient {
    client: Client,
    retry: RetryPolicy,
}

impl ReqwestHttpClient {
    pub fn new() -> Result<Self> {
        Self::with_timeout(Duration::from_secs(30))
    }

    /// Client whose requests default to `timeout` when they carry none.
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(CONNECT_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| BridgeError::NotAvailable(format!("Cannot build HTTP client: {}", e)))?;
        Ok(Self::with_client(client))
    }

    pub fn with_client(client: Client) -> Self {
        Self {
            client,
            retry: RetryPolicy::default(),
        }
    }

    /// Policy used by [`HttpClient::execute`].
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn should_retry(status: u16) -> bool {
        status == 429 || status >= 500
    }

    fn prepare(&self, request: &HttpRequest) -> reqwest::RequestBuilder {
        let method = match request.method {
            HttpMethod::Get => Method::GET,
            HttpMethod::Post => Method::POST,
        };
        let mut builder = self.client.request(method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }
        builder
    }

    async fn collect(response: reqwest::Response) -> Result<HttpResponse> {
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.as_str().to_string(), value.to_string()))
            })
            .collect();
        let body = response
            .bytes()
            .await
            .map_err(|e| BridgeError::OperationFailed(format!("Cannot read response body: {}", e)))?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }

    fn transport_error(e: &reqwest::Error) -> BridgeError {
        if e.is_timeout() {
            BridgeError::OperationFailed("Request timed out".to_string())
        } else if e.is_connect() {
            BridgeError::OperationFailed(format!("Connection failed: {}", e))
        } else {
            BridgeError::OperationFailed(e.to_string())
        }
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
        self.execute_with_retry(request, self.retry.clone()).await
    }

    async fn execute_with_retry(&self, request: HttpRequest, policy: RetryPolicy) -> Result<HttpResponse> {
        let attempts = policy.max_attempts.max(1);
        let mut last_error = None;

        for attempt in 1..=attempts {
            if attempt > 1 {
                let delay = policy.delay_for(attempt - 1);
                debug!(attempt, delay_ms = delay.as_millis() as u64, "Retrying request");
                tokio::time::sleep(delay).await;
            }

            match self.prepare(&request).send().await {
                Ok(response) => {
                    let status = response.status().as_u16();
                    if attempt == attempts || !Self::should_retry(status) {
                        return Self::collect(response).await;
                    }
                    warn!(status, attempt, url = %request.url, "Retryable HTTP status");
                }
                Err(e) => {
                    warn!(error = %e, attempt, url = %request.url, "HTTP transport failure");
                    last_error = Some(Self::transport_error(&e));
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| BridgeError::OperationFailed("HTTP retries exhausted".to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_classification() {
        for status in [429, 500, 502, 503] {
            assert!(ReqwestHttpClient::should_retry(status), "{}", status);
        }
        for status in [200, 400, 401, 403, 404] {
            assert!(!ReqwestHttpClient::should_retry(status), "{}", status);
        }
    }

    #[test]
    fn test_prepare_carries_headers_and_body() {
        let client = ReqwestHttpClient::new().unwrap();
        let request = HttpRequest::new(HttpMethod::Post, "https://api.test/export")
            .bearer_token("key")
            .json(&serde_json::json!({ "episode_ids": ["e1"] }))
            .unwrap()
            .timeout(Duration::from_secs(5));

        let built = client.prepare(&request).build().unwrap();
        assert_eq!(built.method(), Method::POST);
        assert_eq!(built.headers()["authorization"], "Bearer key");
        assert_eq!(built.headers()["content-type"], "application/json");
        assert_eq!(built.timeout(), Some(&Duration::from_secs(5)));
    }

    #[tokio::test]
    async fn test_unreachable_host_is_transport_error() {
        let client = ReqwestHttpClient::with_timeout(Duration::from_millis(500)).unwrap();
        // Nothing is expected to speak HTTP on the loopback discard port.
        let request = HttpRequest::new(HttpMethod::Get, "http://127.0.0.1:9/metadata");

        let result = client.execute_with_retry(request, RetryPolicy::none()).await;
        assert!(matches!(result, Err(BridgeError::OperationFailed(_))));
    }
}
