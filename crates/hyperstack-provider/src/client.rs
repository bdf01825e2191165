//! Hyperstack API gateway.
//!
//! Narrow, typed surface over the SDK endpoints the provider core uses.
//! Normalizes the response envelopes into domain values and a uniform error
//! discipline: decoded 4xx reasons surface verbatim with their numeric
//! status, and a 2xx without its success payload is an error of its own.

use async_trait::async_trait;
use hyperstack_sdk::models::{
    ClusterNodeFields, ClusterNodeGroupFields, CreateClusterNodeFields, DeleteClusterNodesFields,
    ResponseModel,
};
use hyperstack_sdk::{HyperstackClient, SdkError};
use reqwest::StatusCode;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::config::labels;

#[derive(Debug, Error)]
pub enum ClientError {
    /// The gateway was constructed without an underlying client; calls fail
    /// fast instead of dereferencing a missing configuration.
    #[error("hyperstack client is not initialized")]
    NotInitialized,
    #[error("error reason: {reason} | error code: {status}")]
    Api { status: u16, reason: String },
    #[error("empty result (status code: {status})")]
    EmptyResult { status: u16 },
    #[error(transparent)]
    Sdk(#[from] SdkError),
}

/// Cluster-level state consumed by the refresh loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterState {
    pub status: String,
    pub is_reconciling: bool,
}

/// Semantic operations the provider core issues against the cluster API.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ClusterApiTrait: Send + Sync {
    async fn get_cluster(&self, cluster_id: i64) -> Result<ClusterState, ClientError>;

    async fn list_node_groups(
        &self,
        cluster_id: i64,
    ) -> Result<Vec<ClusterNodeGroupFields>, ClientError>;

    async fn list_cluster_nodes(
        &self,
        cluster_id: i64,
    ) -> Result<Vec<ClusterNodeFields>, ClientError>;

    /// Requests `count` new worker nodes in the named group.
    async fn create_nodes(
        &self,
        cluster_id: i64,
        count: i64,
        node_group: &str,
    ) -> Result<(), ClientError>;

    async fn delete_cluster_node(&self, cluster_id: i64, node_id: i64)
        -> Result<(), ClientError>;

    async fn delete_cluster_nodes(
        &self,
        cluster_id: i64,
        node_ids: Vec<i64>,
    ) -> Result<(), ClientError>;
}

/// Gateway over one [`HyperstackClient`].
pub struct ClusterApi {
    client: Option<HyperstackClient>,
}

impl ClusterApi {
    pub fn new(client: HyperstackClient) -> Self {
        Self {
            client: Some(client),
        }
    }

    /// A gateway with no underlying client; every call returns
    /// [`ClientError::NotInitialized`].
    pub fn uninitialized() -> Self {
        Self { client: None }
    }

    fn client(&self) -> Result<&HyperstackClient, ClientError> {
        self.client.as_ref().ok_or(ClientError::NotInitialized)
    }
}

/// Error for a flagged status whose error envelope was decoded.
///
/// 409 is only meaningful for node creation (name conflicts), so callers opt
/// into it.
fn envelope_error(
    status: StatusCode,
    error: Option<&ResponseModel>,
    conflict_is_error: bool,
) -> Option<ClientError> {
    let code = status.as_u16();
    let flagged = matches!(code, 400 | 401 | 404) || (conflict_is_error && code == 409);
    if !flagged {
        return None;
    }
    error.map(|model| ClientError::Api {
        status: code,
        reason: model
            .error_reason
            .clone()
            .unwrap_or_else(|| "unknown error".to_string()),
    })
}

#[async_trait]
impl ClusterApiTrait for ClusterApi {
    #[instrument(skip(self))]
    async fn get_cluster(&self, cluster_id: i64) -> Result<ClusterState, ClientError> {
        let response = self.client()?.get_cluster(cluster_id).await?;
        if let Some(err) = envelope_error(response.status, response.error.as_ref(), false) {
            return Err(err);
        }
        let cluster = response
            .success
            .and_then(|payload| payload.cluster)
            .ok_or(ClientError::EmptyResult {
                status: response.status.as_u16(),
            })?;
        Ok(ClusterState {
            status: cluster.status.unwrap_or_default(),
            is_reconciling: cluster.is_reconciling.unwrap_or(false),
        })
    }

    #[instrument(skip(self))]
    async fn list_node_groups(
        &self,
        cluster_id: i64,
    ) -> Result<Vec<ClusterNodeGroupFields>, ClientError> {
        let client = self.client()?;
        debug!(base_url = client.base_url(), cluster_id, "listing node groups");
        let response = client.list_node_groups(cluster_id).await?;
        if let Some(err) = envelope_error(response.status, response.error.as_ref(), false) {
            return Err(err);
        }
        response
            .success
            .and_then(|payload| payload.node_groups)
            .ok_or(ClientError::EmptyResult {
                status: response.status.as_u16(),
            })
    }

    #[instrument(skip(self))]
    async fn list_cluster_nodes(
        &self,
        cluster_id: i64,
    ) -> Result<Vec<ClusterNodeFields>, ClientError> {
        let response = self.client()?.list_cluster_nodes(cluster_id).await?;
        if let Some(err) = envelope_error(response.status, response.error.as_ref(), false) {
            return Err(err);
        }
        response
            .success
            .and_then(|payload| payload.nodes)
            .ok_or(ClientError::EmptyResult {
                status: response.status.as_u16(),
            })
    }

    #[instrument(skip(self))]
    async fn create_nodes(
        &self,
        cluster_id: i64,
        count: i64,
        node_group: &str,
    ) -> Result<(), ClientError> {
        let fields = CreateClusterNodeFields {
            count: Some(count),
            node_group: Some(node_group.to_string()),
            role: Some(labels::WORKER_ROLE_VALUE.to_string()),
        };
        let response = self.client()?.create_node(cluster_id, &fields).await?;
        if let Some(err) = envelope_error(response.status, response.error.as_ref(), true) {
            return Err(err);
        }
        response.success.ok_or(ClientError::EmptyResult {
            status: response.status.as_u16(),
        })?;
        debug!(cluster_id, count, node_group, "requested new worker nodes");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_cluster_node(
        &self,
        cluster_id: i64,
        node_id: i64,
    ) -> Result<(), ClientError> {
        let response = self.client()?.delete_cluster_node(cluster_id, node_id).await?;
        if let Some(err) = envelope_error(response.status, response.error.as_ref(), false) {
            return Err(err);
        }
        response.success.ok_or(ClientError::EmptyResult {
            status: response.status.as_u16(),
        })?;
        debug!(cluster_id, node_id, "deleted cluster node");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_cluster_nodes(
        &self,
        cluster_id: i64,
        node_ids: Vec<i64>,
    ) -> Result<(), ClientError> {
        let fields = DeleteClusterNodesFields {
            ids: Some(node_ids.clone()),
        };
        let response = self.client()?.delete_cluster_nodes(cluster_id, &fields).await?;
        if let Some(err) = envelope_error(response.status, response.error.as_ref(), false) {
            return Err(err);
        }
        response.success.ok_or(ClientError::EmptyResult {
            status: response.status.as_u16(),
        })?;
        debug!(cluster_id, ?node_ids, "deleted cluster nodes");
        Ok(())
    }
}
