//! HTTP transport contract.
//!
//! The export client only ever issues a GET for the plan and POSTs for
//! archives, so the surface here is kept to exactly that. Adapters own TLS,
//! pooling and transport retries.

use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;

use crate::error::{BridgeError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: HashMap<String, String>,
    pub body: Option<Bytes>,
    /// Per-request deadline; the adapter default applies when `None`.
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HashMap::new(),
            body: None,
            timeout: None,
        }
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn bearer_token(self, token: impl Into<String>) -> Self {
        self.header("Authorization", format!("Bearer {}", token.into()))
    }

    /// Serializes `body` as the JSON payload.
    pub fn json<T: Serialize>(mut self, body: &T) -> Result<Self> {
        let json = serde_json::to_vec(body)
            .map_err(|e| BridgeError::OperationFailed(format!("Cannot encode request body: {}", e)))?;
        self.body = Some(Bytes::from(json));
        Ok(self.header("Content-Type", "application/json"))
    }

    pub fn timeout(mut self, duration: Duration) -> Self {
        self.timeout = Some(duration);
        self
    }
}

#[derive(Debug)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    /// Raw body; export archives are kept as bytes end to end.
    pub body: Bytes,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn text(&self) -> Result<String> {
        String::from_utf8(self.body.to_vec())
            .map_err(|e| BridgeError::OperationFailed(format!("Response is not UTF-8: {}", e)))
    }
}

/// Exponential backoff for transient transport failures.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Values below 1 behave as 1.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Single attempt, no backoff.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay before retry number `retry` (1-based), doubling up to `max_delay`.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(10),
        }
    }
}

/// Async HTTP transport.
///
/// A non-2xx status is not an error here: the response is returned and the
/// caller maps the status onto its own taxonomy (auth failure vs server
/// failure). Only transport problems (DNS, connect, timeout, TLS) are `Err`.
///
/// ```ignore
/// let request = HttpRequest::new(HttpMethod::Get, metadata_url).bearer_token(api_key);
/// let response = http.execute(request).await?;
/// if !response.is_success() { /* map status */ }
/// ```
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse>;

    /// Like [`execute`](Self::execute) with an explicit retry policy.
    /// Adapters without retry support ignore `policy`.
    async fn execute_with_retry(&self, request: HttpRequest, policy: RetryPolicy) -> Result<HttpResponse> {
        let _ = policy;
        self.execute(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bearer_token_and_timeout() {
        let request = HttpRequest::new(HttpMethod::Get, "https://api.test/metadata")
            .bearer_token("sk-123")
            .timeout(Duration::from_secs(30));

        assert_eq!(
            request.headers.get("Authorization").map(String::as_str),
            Some("Bearer sk-123")
        );
        assert_eq!(request.timeout, Some(Duration::from_secs(30)));
        assert!(request.body.is_none());
    }

    #[test]
    fn test_json_body_sets_content_type() {
        #[derive(Serialize)]
        struct Body {
            episode_ids: Vec<String>,
        }

        let request = HttpRequest::new(HttpMethod::Post, "https://api.test/export")
            .json(&Body {
                episode_ids: vec!["ep1".to_string()],
            })
            .unwrap();

        assert_eq!(
            request.headers.get("Content-Type").map(String::as_str),
            Some("application/json")
        );
        assert_eq!(
            request.body.unwrap(),
            Bytes::from_static(br#"{"episode_ids":["ep1"]}"#)
        );
    }

    #[test]
    fn test_success_range() {
        let response = |status| HttpResponse {
            status,
            headers: HashMap::new(),
            body: Bytes::new(),
        };
        assert!(response(200).is_success());
        assert!(response(204).is_success());
        assert!(!response(302).is_success());
        assert!(!response(401).is_success());
    }

    #[test]
    fn test_non_utf8_body_is_error() {
        let response = HttpResponse {
            status: 500,
            headers: HashMap::new(),
            body: Bytes::from_static(&[0xff, 0xfe]),
        };
        assert!(matches!(response.text(), Err(BridgeError::OperationFailed(_))));
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(300),
        };
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(5), Duration::from_millis(300));
        assert_eq!(policy.delay_for(40), Duration::from_millis(300));
        assert_eq!(RetryPolicy::none().max_attempts, 1);
    }
}
