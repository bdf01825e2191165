//! Kubernetes collaborator: self-identification and `Node` object access.
//!
//! The provider runs on a Hyperstack instance inside the cluster it scales.
//! Identity is established by reading the instance metadata document for the
//! local hostname, then looking up the matching Kubernetes `Node` for its
//! labels. Scale-in additionally removes the deleted machines' `Node`
//! objects.
//!
//! Every failure here is returned to the caller; the autoscaler must degrade,
//! not crash, when the metadata endpoint or the API server is unavailable.

use std::collections::HashMap;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Node;
use kube::api::DeleteParams;
use kube::{Api, Client};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};

/// OpenStack-compatible metadata document served to every instance.
const METADATA_URL: &str = "http://169.254.169.254/openstack/latest/meta_data.json";

#[derive(Debug, Error)]
pub enum KubernetesError {
    #[error("failed to infer in-cluster kubernetes configuration: {0}")]
    ClusterConfig(#[source] kube::config::InferConfigError),
    #[error("failed to build kubernetes client: {0}")]
    ClientBuild(#[source] kube::Error),
    #[error("failed to fetch instance metadata: {0}")]
    MetadataFetch(#[source] reqwest::Error),
    #[error("failed to decode instance metadata: {0}")]
    MetadataDecode(#[source] reqwest::Error),
    #[error("failed to get node {node}: {source}")]
    NodeLookup {
        node: String,
        #[source]
        source: kube::Error,
    },
    #[error("label {label} not found on node {node}")]
    LabelMissing { label: String, node: String },
    #[error("failed to delete node {node}: {source}")]
    NodeDelete {
        node: String,
        #[source]
        source: kube::Error,
    },
}

/// Instance metadata payload. Only `name` is load-bearing (it matches the
/// Kubernetes node name); the rest is decoded for completeness.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MetadataPayload {
    pub uuid: String,
    pub meta: MetadataMeta,
    pub public_keys: HashMap<String, String>,
    pub keys: Vec<MetadataKey>,
    pub hostname: String,
    pub name: String,
    pub launch_index: i64,
    pub availability_zone: String,
    pub random_seed: String,
    pub project_id: String,
    pub devices: Vec<serde_json::Value>,
    pub dedicated_cpus: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MetadataMeta {
    pub cluster: String,
    pub role: String,
    pub infrahub_key: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MetadataKey {
    pub name: String,
    #[serde(rename = "type")]
    pub key_type: String,
    pub data: String,
}

/// Node-object operations the provider core consumes.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait KubeNodesTrait: Send + Sync {
    /// Value of `key` on the local node, identified via instance metadata.
    async fn local_node_label(&self, key: &str) -> Result<String, KubernetesError>;

    /// Deletes the named `Node` objects in order; the first failure aborts
    /// the batch.
    async fn delete_node_objects(&self, names: &[String]) -> Result<(), KubernetesError>;
}

/// In-cluster implementation of [`KubeNodesTrait`].
pub struct KubeNodes {
    http: reqwest::Client,
    metadata_url: String,
}

impl KubeNodes {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
            metadata_url: METADATA_URL.to_string(),
        }
    }

    async fn fetch_metadata(&self) -> Result<MetadataPayload, KubernetesError> {
        let response = self
            .http
            .get(&self.metadata_url)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(KubernetesError::MetadataFetch)?;
        response.json().await.map_err(KubernetesError::MetadataDecode)
    }

    /// Hostname of the instance this process runs on, from the metadata
    /// document's `name` field. It matches the Kubernetes node name.
    pub async fn local_hostname(&self) -> Result<String, KubernetesError> {
        Ok(self.fetch_metadata().await?.name)
    }

    async fn nodes_api() -> Result<Api<Node>, KubernetesError> {
        let config = kube::Config::infer()
            .await
            .map_err(KubernetesError::ClusterConfig)?;
        let client = Client::try_from(config).map_err(KubernetesError::ClientBuild)?;
        Ok(Api::all(client))
    }
}

impl Default for KubeNodes {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KubeNodesTrait for KubeNodes {
    async fn local_node_label(&self, key: &str) -> Result<String, KubernetesError> {
        let hostname = self.local_hostname().await?;
        debug!(node = %hostname, label = key, "reading local node label");

        let nodes = Self::nodes_api().await?;
        let node = nodes
            .get(&hostname)
            .await
            .map_err(|source| KubernetesError::NodeLookup {
                node: hostname.clone(),
                source,
            })?;

        node.metadata
            .labels
            .as_ref()
            .and_then(|labels| labels.get(key))
            .cloned()
            .ok_or_else(|| KubernetesError::LabelMissing {
                label: key.to_string(),
                node: hostname,
            })
    }

    async fn delete_node_objects(&self, names: &[String]) -> Result<(), KubernetesError> {
        info!(nodes = ?names, "deleting kubernetes node objects");
        let nodes = Self::nodes_api().await?;
        for name in names {
            nodes
                .delete(name, &DeleteParams::default())
                .await
                .map_err(|source| KubernetesError::NodeDelete {
                    node: name.clone(),
                    source,
                })?;
        }
        Ok(())
    }
}
