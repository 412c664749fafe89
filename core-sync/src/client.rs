//! Remote Export Client
//!
//! Stateless wrapper over the three export endpoints. Every call carries the
//! credential and cursor it needs; resumability lives in the orchestrator.

use async_trait::async_trait;
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use crate::error::{Result, SyncError};
use crate::types::{BinaryBundle, ExportMetadata, ExportTemplates};

const METADATA_PATH: &str = "/obsidian/fetch-export-metadata";
const BATCH_PATH: &str = "/obsidian/export-episode-snips";
const BASE_ASSETS_PATH: &str = "/obsidian/export-base-file";

/// Body of a batch export request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchRequest {
    pub episode_ids: Vec<String>,
    pub episode_template: Option<String>,
    pub snip_template: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_after: Option<String>,
    #[serde(
        rename = "only_edited_snips",
        skip_serializing_if = "std::ops::Not::not"
    )]
    pub only_edited: bool,
}

impl BatchRequest {
    pub fn new(
        episode_ids: Vec<String>,
        templates: &ExportTemplates,
        updated_after: Option<String>,
        only_edited: bool,
    ) -> Self {
        Self {
            episode_ids,
            episode_template: templates.episode_template.clone(),
            snip_template: templates.snip_template.clone(),
            updated_after,
            only_edited,
        }
    }
}

#[async_trait]
pub trait RemoteExportClient: Send + Sync {
    /// Fetches the export plan for everything updated after `updated_after`.
    async fn fetch_metadata(
        &self,
        api_key: &str,
        updated_after: Option<&str>,
        only_edited: bool,
    ) -> Result<ExportMetadata>;

    /// Fetches one batch archive.
    async fn fetch_batch(&self, api_key: &str, request: &BatchRequest) -> Result<BinaryBundle>;

    /// Fetches the static base-asset archive.
    async fn fetch_base_assets(&self, api_key: &str) -> Result<BinaryBundle>;
}

/// [`RemoteExportClient`] over a host [`HttpClient`].
pub struct HttpExportClient {
    http_client: Arc<dyn HttpClient>,
    base_url: String,
    timeout: Duration,
}

impl HttpExportClient {
    pub fn new(http_client: Arc<dyn HttpClient>, base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
        }
    }

    pub fn metadata_url(&self, updated_after: Option<&str>, only_edited: bool) -> String {
        let mut params = Vec::new();
        if let Some(ts) = updated_after {
            params.push(format!("updated_after={}", urlencoding::encode(ts)));
        }
        if only_edited {
            params.push("only_edited_snips=true".to_string());
        }

        let mut url = format!("{}{}", self.base_url, METADATA_PATH);
        if !params.is_empty() {
            url.push('?');
            url.push_str(&params.join("&"));
        }
        url
    }

    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        let request = request.timeout(self.timeout);
        let response = self
            .http_client
            .execute(request)
            .await
            .map_err(|e| SyncError::Network(e.to_string()))?;
        check_status(response)
    }
}

/// Maps a non-2xx response onto the error taxonomy.
fn check_status(response: HttpResponse) -> Result<HttpResponse> {
    match response.status {
        _ if response.is_success() => Ok(response),
        401 | 403 => Err(SyncError::Auth {
            status: response.status,
        }),
        status => {
            let message = response
                .text()
                .map(|t| t.chars().take(200).collect())
                .unwrap_or_default();
            warn!(status, "Export endpoint returned an error");
            Err(SyncError::Server { status, message })
        }
    }
}

#[async_trait]
impl RemoteExportClient for HttpExportClient {
    #[instrument(skip(self, api_key))]
    async fn fetch_metadata(
        &self,
        api_key: &str,
        updated_after: Option<&str>,
        only_edited: bool,
    ) -> Result<ExportMetadata> {
        let url = self.metadata_url(updated_after, only_edited);
        debug!(url = %url, "Fetching export metadata");

        let request = HttpRequest::new(HttpMethod::Get, url).bearer_token(api_key);
        let response = self.send(request).await?;
        let metadata: ExportMetadata = serde_json::from_slice(&response.body)?;
        metadata.normalized()
    }

    #[instrument(skip(self, api_key, request), fields(episodes = request.episode_ids.len()))]
    async fn fetch_batch(&self, api_key: &str, request: &BatchRequest) -> Result<BinaryBundle> {
        let http_request = HttpRequest::new(HttpMethod::Post, format!("{}{}", self.base_url, BATCH_PATH))
            .bearer_token(api_key)
            .json(request)?;
        let response = self.send(http_request).await?;
        debug!(bytes = response.body.len(), "Received batch archive");
        Ok(BinaryBundle(response.body))
    }

    #[instrument(skip(self, api_key))]
    async fn fetch_base_assets(&self, api_key: &str) -> Result<BinaryBundle> {
        let request = HttpRequest::new(HttpMethod::Post, format!("{}{}", self.base_url, BASE_ASSETS_PATH))
            .bearer_token(api_key);
        let response = self.send(request).await?;
        Ok(BinaryBundle(response.body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::error::BridgeError;
    use bytes::Bytes;
    use mockall::mock;
    use std::collections::HashMap;

    mock! {
        HttpClient {}

        #[async_trait]
        impl HttpClient for HttpClient {
            async fn execute(&self, request: HttpRequest) -> bridge_traits::error::Result<HttpResponse>;
        }
    }

    fn response(status: u16, body: &'static [u8]) -> HttpResponse {
        HttpResponse {
            status,
            headers: HashMap::new(),
            body: Bytes::from_static(body),
        }
    }

    fn client(mock: MockHttpClient) -> HttpExportClient {
        HttpExportClient::new(Arc::new(mock), "https://api.test/v1/", Duration::from_secs(5))
    }

    #[test]
    fn test_metadata_url_encodes_cursor() {
        let client = client(MockHttpClient::new());
        assert_eq!(
            client.metadata_url(None, false),
            "https://api.test/v1/obsidian/fetch-export-metadata"
        );
        assert_eq!(
            client.metadata_url(Some("2024-05-01T10:00:00+02:00"), true),
            "https://api.test/v1/obsidian/fetch-export-metadata?updated_after=2024-05-01T10%3A00%3A00%2B02%3A00&only_edited_snips=true"
        );
    }

    #[test]
    fn test_batch_request_body_shape() {
        let templates = ExportTemplates {
            episode_template: Some("# {{episode_title}}".into()),
            snip_template: None,
        };
        let body = BatchRequest::new(vec!["e1".into()], &templates, None, false);
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["episode_ids"][0], "e1");
        assert_eq!(json["episode_template"], "# {{episode_title}}");
        assert!(json["snip_template"].is_null());
        assert!(json.get("updated_after").is_none());
        assert!(json.get("only_edited_snips").is_none());

        let body = BatchRequest::new(vec![], &templates, Some("ts".into()), true);
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["updated_after"], "ts");
        assert_eq!(json["only_edited_snips"], true);
    }

    #[tokio::test]
    async fn test_fetch_metadata_success() {
        let mut mock = MockHttpClient::new();
        mock.expect_execute()
            .times(1)
            .withf(|req| {
                req.method == HttpMethod::Get
                    && req.headers.get("Authorization").map(String::as_str) == Some("Bearer key")
                    && req.timeout == Some(Duration::from_secs(5))
            })
            .returning(|_| {
                Ok(response(
                    200,
                    br#"{"episode_batch_count":1,"episode_batches":[{"episodes":[{"episode_id":"e1","total_snip_count":1,"updated_snip_count":1,"latest_snip_update_ts":"t"}]}]}"#,
                ))
            });

        let metadata = client(mock).fetch_metadata("key", None, false).await.unwrap();
        assert_eq!(metadata.batch_count, 1);
        assert_eq!(metadata.batches[0].episodes[0].episode_id, "e1");
    }

    #[tokio::test]
    async fn test_status_mapping() {
        let mut mock = MockHttpClient::new();
        let mut statuses = vec![401u16, 403, 500].into_iter();
        mock.expect_execute()
            .times(3)
            .returning(move |_| Ok(response(statuses.next().unwrap(), b"boom")));

        let client = client(mock);
        assert!(matches!(
            client.fetch_base_assets("k").await,
            Err(SyncError::Auth { status: 401 })
        ));
        assert!(matches!(
            client.fetch_base_assets("k").await,
            Err(SyncError::Auth { status: 403 })
        ));
        match client.fetch_base_assets("k").await {
            Err(SyncError::Server { status, message }) => {
                assert_eq!(status, 500);
                assert_eq!(message, "boom");
            }
            other => panic!("unexpected result: {:?}", other.map(|b| b.len())),
        }
    }

    #[tokio::test]
    async fn test_transport_failure_is_network_error() {
        let mut mock = MockHttpClient::new();
        mock.expect_execute()
            .returning(|_| Err(BridgeError::OperationFailed("connection reset".into())));

        let request = BatchRequest::new(vec!["e1".into()], &ExportTemplates::default(), None, false);
        let result = client(mock).fetch_batch("k", &request).await;
        assert!(matches!(result, Err(SyncError::Network(_))));
    }

    #[tokio::test]
    async fn test_fetch_batch_posts_json() {
        let mut mock = MockHttpClient::new();
        mock.expect_execute()
            .withf(|req| {
                req.method == HttpMethod::Post
                    && req.url == "https://api.test/v1/obsidian/export-episode-snips"
                    && req.headers.get("Content-Type").map(String::as_str) == Some("application/json")
            })
            .returning(|_| Ok(response(200, b"PK")));

        let request = BatchRequest::new(vec!["e1".into()], &ExportTemplates::default(), None, false);
        let bundle = client(mock).fetch_batch("k", &request).await.unwrap();
        assert_eq!(bundle.as_bytes(), b"PK");
    }

    #[tokio::test]
    async fn test_malformed_metadata_is_serialization_error() {
        let mut mock = MockHttpClient::new();
        mock.expect_execute().returning(|_| Ok(response(200, b"[]")));

        let result = client(mock).fetch_metadata("k", None, false).await;
        assert!(matches!(result, Err(SyncError::Serialization(_))));
    }
}
