//! Typed endpoint calls for the Hyperstack cluster API.

use std::sync::Arc;

use reqwest::header::{HeaderValue, CONTENT_TYPE};
use reqwest::{Method, Request, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::models::{
    ClusterDetailResponse, ClusterNodesListResponse, CreateClusterNodeFields,
    DeleteClusterNodesFields, NodeGroupsListResponse, ResponseModel,
};
use crate::retry::{
    HttpClientError, HttpTransport, RetryConfig, RetryingHttpClient, TimeoutConfig,
};

#[derive(Debug, Error)]
pub enum SdkError {
    #[error(transparent)]
    Http(#[from] HttpClientError),
    #[error("invalid request url: {0}")]
    InvalidUrl(String),
    #[error("api key is not a valid header value")]
    InvalidApiKey,
    #[error("failed to encode request body: {0}")]
    EncodeBody(#[source] serde_json::Error),
    #[error("failed to read response body: {0}")]
    ReadBody(#[source] reqwest::Error),
    #[error("failed to decode response payload: {0}")]
    Decode(#[source] serde_json::Error),
}

/// Outcome of one endpoint call.
///
/// A 2xx decodes into `success`; anything else decodes the error envelope on
/// a best-effort basis (`error` stays `None` when the body is not one).
#[derive(Debug)]
pub struct ApiResponse<T> {
    pub status: StatusCode,
    pub success: Option<T>,
    pub error: Option<ResponseModel>,
}

/// Authenticated client for one Hyperstack API server.
#[derive(Clone)]
pub struct HyperstackClient {
    base_url: String,
    api_key: String,
    http: RetryingHttpClient,
}

impl HyperstackClient {
    /// Client backed by a fresh `reqwest::Client` and default retry and
    /// timeout settings.
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self::with_transport(base_url, api_key, Arc::new(reqwest::Client::new()))
    }

    pub fn with_transport(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        transport: Arc<dyn HttpTransport>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            http: RetryingHttpClient::new(
                transport,
                RetryConfig::default(),
                TimeoutConfig::default(),
            ),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    #[instrument(skip(self))]
    pub async fn get_cluster(
        &self,
        cluster_id: i64,
    ) -> Result<ApiResponse<ClusterDetailResponse>, SdkError> {
        self.send(Method::GET, &format!("/core/clusters/{cluster_id}"), None)
            .await
    }

    #[instrument(skip(self))]
    pub async fn list_node_groups(
        &self,
        cluster_id: i64,
    ) -> Result<ApiResponse<NodeGroupsListResponse>, SdkError> {
        self.send(
            Method::GET,
            &format!("/core/clusters/{cluster_id}/node-groups"),
            None,
        )
        .await
    }

    #[instrument(skip(self))]
    pub async fn list_cluster_nodes(
        &self,
        cluster_id: i64,
    ) -> Result<ApiResponse<ClusterNodesListResponse>, SdkError> {
        self.send(
            Method::GET,
            &format!("/core/clusters/{cluster_id}/nodes"),
            None,
        )
        .await
    }

    #[instrument(skip(self, body))]
    pub async fn create_node(
        &self,
        cluster_id: i64,
        body: &CreateClusterNodeFields,
    ) -> Result<ApiResponse<ClusterNodesListResponse>, SdkError> {
        self.send(
            Method::POST,
            &format!("/core/clusters/{cluster_id}/nodes"),
            Some(encode(body)?),
        )
        .await
    }

    #[instrument(skip(self))]
    pub async fn delete_cluster_node(
        &self,
        cluster_id: i64,
        node_id: i64,
    ) -> Result<ApiResponse<ResponseModel>, SdkError> {
        self.send(
            Method::DELETE,
            &format!("/core/clusters/{cluster_id}/nodes/{node_id}"),
            None,
        )
        .await
    }

    #[instrument(skip(self, body))]
    pub async fn delete_cluster_nodes(
        &self,
        cluster_id: i64,
        body: &DeleteClusterNodesFields,
    ) -> Result<ApiResponse<ResponseModel>, SdkError> {
        self.send(
            Method::DELETE,
            &format!("/core/clusters/{cluster_id}/nodes"),
            Some(encode(body)?),
        )
        .await
    }

    async fn send<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<Vec<u8>>,
    ) -> Result<ApiResponse<T>, SdkError> {
        let request = self.build_request(method, path, body)?;
        let response = self.http.execute(request).await?;

        let status = response.status();
        let bytes = response.bytes().await.map_err(SdkError::ReadBody)?;
        debug!(%status, bytes = bytes.len(), "hyperstack api response");

        if status.is_success() {
            let payload = serde_json::from_slice(&bytes).map_err(SdkError::Decode)?;
            Ok(ApiResponse {
                status,
                success: Some(payload),
                error: None,
            })
        } else {
            Ok(ApiResponse {
                status,
                success: None,
                error: serde_json::from_slice(&bytes).ok(),
            })
        }
    }

    fn build_request(
        &self,
        method: Method,
        path: &str,
        body: Option<Vec<u8>>,
    ) -> Result<Request, SdkError> {
        let url = format!("{}{}", self.base_url.trim_end_matches('/'), path);
        let url = Url::parse(&url).map_err(|err| SdkError::InvalidUrl(err.to_string()))?;

        let mut request = Request::new(method, url);
        let key = HeaderValue::from_str(&self.api_key).map_err(|_| SdkError::InvalidApiKey)?;
        request.headers_mut().insert("api_key", key);
        if let Some(bytes) = body {
            request
                .headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            *request.body_mut() = Some(bytes.into());
        }
        Ok(request)
    }
}

fn encode<T: Serialize>(body: &T) -> Result<Vec<u8>, SdkError> {
    serde_json::to_vec(body).map_err(SdkError::EncodeBody)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::MockHttpTransport;

    fn json_response(status: u16, body: &'static str) -> reqwest::Response {
        reqwest::Response::from(
            http::Response::builder()
                .status(status)
                .header(CONTENT_TYPE, "application/json")
                .body(body)
                .expect("static test response"),
        )
    }

    fn client(transport: MockHttpTransport) -> HyperstackClient {
        HyperstackClient::with_transport(
            "https://infrahub-api.nexgencloud.com/v1",
            "key-123",
            Arc::new(transport),
        )
    }

    #[tokio::test]
    async fn get_cluster_hits_expected_url_with_api_key_header() {
        let mut transport = MockHttpTransport::new();
        transport
            .expect_execute()
            .withf(|request| {
                request.method() == Method::GET
                    && request.url().as_str()
                        == "https://infrahub-api.nexgencloud.com/v1/core/clusters/7"
                    && request.headers().get("api_key").map(|v| v.as_bytes())
                        == Some(b"key-123".as_slice())
            })
            .times(1)
            .return_once(|_| {
                Ok(json_response(
                    200,
                    r#"{"status": true, "cluster": {"id": 7, "status": "ACTIVE", "is_reconciling": false}}"#,
                ))
            });

        let response = client(transport).get_cluster(7).await.expect("response");
        assert_eq!(response.status, StatusCode::OK);
        let cluster = response.success.unwrap().cluster.unwrap();
        assert_eq!(cluster.id, Some(7));
        assert_eq!(cluster.is_reconciling, Some(false));
    }

    #[tokio::test]
    async fn create_node_posts_json_body() {
        let mut transport = MockHttpTransport::new();
        transport
            .expect_execute()
            .withf(|request| {
                let body = request
                    .body()
                    .and_then(|b| b.as_bytes())
                    .unwrap_or_default();
                request.method() == Method::POST
                    && request.url().path() == "/core/clusters/7/nodes"
                    && body == br#"{"count":2,"node_group":"gpu-workers","role":"worker"}"#
            })
            .times(1)
            .return_once(|_| Ok(json_response(201, r#"{"status": true, "nodes": [{"id": 900}]}"#)));

        let fields = CreateClusterNodeFields {
            count: Some(2),
            node_group: Some("gpu-workers".to_string()),
            role: Some("worker".to_string()),
        };
        let response = client(transport)
            .create_node(7, &fields)
            .await
            .expect("response");
        assert_eq!(response.status, StatusCode::CREATED);
        assert_eq!(response.success.unwrap().nodes.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn non_success_status_decodes_error_envelope() {
        let mut transport = MockHttpTransport::new();
        transport.expect_execute().times(1).return_once(|_| {
            Ok(json_response(
                404,
                r#"{"status": false, "error_reason": "cluster 7 does not exist"}"#,
            ))
        });

        let response = client(transport).get_cluster(7).await.expect("response");
        assert_eq!(response.status, StatusCode::NOT_FOUND);
        assert!(response.success.is_none());
        assert_eq!(
            response.error.unwrap().error_reason.as_deref(),
            Some("cluster 7 does not exist")
        );
    }

    #[tokio::test]
    async fn malformed_error_body_leaves_error_unset() {
        let mut transport = MockHttpTransport::new();
        transport
            .expect_execute()
            .times(1)
            .return_once(|_| Ok(json_response(502, "upstream exploded")));

        let response = client(transport).get_cluster(7).await.expect("response");
        assert_eq!(response.status, StatusCode::BAD_GATEWAY);
        assert!(response.success.is_none());
        assert!(response.error.is_none());
    }

    #[tokio::test]
    async fn malformed_success_body_is_a_decode_error() {
        let mut transport = MockHttpTransport::new();
        transport
            .expect_execute()
            .times(1)
            .return_once(|_| Ok(json_response(200, "not json")));

        let err = client(transport)
            .get_cluster(7)
            .await
            .expect_err("malformed 2xx body must fail");
        assert!(matches!(err, SdkError::Decode(_)));
    }

    #[tokio::test]
    async fn delete_cluster_nodes_sends_ids() {
        let mut transport = MockHttpTransport::new();
        transport
            .expect_execute()
            .withf(|request| {
                let body = request
                    .body()
                    .and_then(|b| b.as_bytes())
                    .unwrap_or_default();
                request.method() == Method::DELETE
                    && request.url().path() == "/core/clusters/7/nodes"
                    && body == br#"{"ids":[100,200]}"#
            })
            .times(1)
            .return_once(|_| Ok(json_response(200, r#"{"status": true, "message": "deleted"}"#)));

        let fields = DeleteClusterNodesFields {
            ids: Some(vec![100, 200]),
        };
        let response = client(transport)
            .delete_cluster_nodes(7, &fields)
            .await
            .expect("response");
        assert_eq!(response.status, StatusCode::OK);
        assert!(response.success.is_some());
    }

    #[test]
    fn base_url_trailing_slash_is_normalized() {
        let client = HyperstackClient::new("https://example.test/v1/", "key");
        let request = client
            .build_request(Method::GET, "/core/clusters/1", None)
            .expect("request");
        assert_eq!(request.url().as_str(), "https://example.test/v1/core/clusters/1");
    }
}
