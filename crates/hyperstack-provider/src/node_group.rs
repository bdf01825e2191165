//! Node-group handle and scale operations.
//!
//! A handle captures one node-group record at refresh time together with the
//! cluster id and status. Scale operations go back out through the manager's
//! API gateway; the local count is an optimistic projection that the next
//! refresh overwrites.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Node;
use tracing::{debug, info};

use crate::cloud_provider::{
    Instance, InstanceState, InstanceStatus, NodeGroup, NodeGroupAutoscalingOptions, NodeInfo,
    ProviderError,
};
use crate::config::labels;
use crate::manager::ManagerState;
use hyperstack_sdk::models::{ClusterNodeFields, ClusterNodeGroupFields};

pub struct HyperstackNodeGroup {
    id: i64,
    min_size: i64,
    max_size: i64,
    record: Option<ClusterNodeGroupFields>,
    nodes: Vec<ClusterNodeFields>,
    cluster_id: i64,
    cluster_status: String,
    /// Local projection of the group size, overwritten by the next refresh.
    count: AtomicI64,
    manager: Weak<ManagerState>,
}

impl HyperstackNodeGroup {
    pub(crate) fn new(
        record: ClusterNodeGroupFields,
        nodes: Vec<ClusterNodeFields>,
        cluster_id: i64,
        cluster_status: String,
        manager: Weak<ManagerState>,
    ) -> Self {
        Self {
            id: record.id.unwrap_or_default(),
            min_size: record.min_count.unwrap_or_default(),
            max_size: record.max_count.unwrap_or_default(),
            count: AtomicI64::new(record.count.unwrap_or_default()),
            record: Some(record),
            nodes,
            cluster_id,
            cluster_status,
            manager,
        }
    }

    pub(crate) fn group_id(&self) -> i64 {
        self.id
    }

    fn group_name(&self) -> &str {
        self.record
            .as_ref()
            .and_then(|record| record.name.as_deref())
            .unwrap_or_default()
    }

    fn manager(&self) -> Result<Arc<ManagerState>, ProviderError> {
        self.manager.upgrade().ok_or(ProviderError::ManagerReleased)
    }
}

/// Maps the cluster-level status onto an instance state. Per-instance status
/// is not modelled by the API payloads the snapshot consumes, so every
/// instance of a group reports its cluster's state.
fn instance_state(cluster_status: &str) -> InstanceState {
    match cluster_status {
        "ACTIVE" => InstanceState::Running,
        "CREATING" | "RECONCILING" | "WAITING" => InstanceState::Creating,
        "DELETED" => InstanceState::Deleting,
        _ => InstanceState::Unknown,
    }
}

#[async_trait]
impl NodeGroup for HyperstackNodeGroup {
    fn max_size(&self) -> i64 {
        self.max_size
    }

    fn min_size(&self) -> i64 {
        self.min_size
    }

    fn target_size(&self) -> Result<i64, ProviderError> {
        Ok(self.count.load(Ordering::SeqCst))
    }

    fn id(&self) -> String {
        self.id.to_string()
    }

    fn debug_info(&self) -> String {
        format!(
            "node group ID: {} (min:{} max:{})",
            self.id(),
            self.min_size(),
            self.max_size()
        )
    }

    fn exist(&self) -> bool {
        self.record.is_some()
    }

    fn autoprovisioned(&self) -> bool {
        false
    }

    fn nodes(&self) -> Result<Vec<Instance>, ProviderError> {
        let state = instance_state(&self.cluster_status);
        Ok(self
            .nodes
            .iter()
            .filter_map(|node| node.id)
            .map(|id| Instance {
                id: id.to_string(),
                status: Some(InstanceStatus { state }),
            })
            .collect())
    }

    async fn increase_size(&self, delta: i64) -> Result<(), ProviderError> {
        if delta <= 0 {
            return Err(ProviderError::SizeIncreaseNotPositive { delta });
        }
        let current = self.count.load(Ordering::SeqCst);
        let desired = current + delta;
        if desired > self.max_size {
            return Err(ProviderError::SizeIncreaseTooLarge {
                current,
                desired,
                max: self.max_size,
            });
        }

        info!(
            group = self.group_name(),
            delta, desired, "increasing node group size"
        );
        let manager = self.manager()?;
        manager
            .client
            .create_nodes(self.cluster_id, delta, self.group_name())
            .await?;
        self.count.store(desired, Ordering::SeqCst);
        Ok(())
    }

    async fn atomic_increase_size(&self, _delta: i64) -> Result<(), ProviderError> {
        Err(ProviderError::NotImplemented)
    }

    async fn delete_nodes(&self, nodes: &[Node]) -> Result<(), ProviderError> {
        let manager = self.manager()?;
        if !manager.has_published_groups() {
            // No published groups means the cluster may be reconciling and
            // the refresh was shed; deleting now would race the cloud side.
            debug!("skipping node deletion, no published node groups");
            return Ok(());
        }

        let mut node_ids = Vec::new();
        let mut node_names = Vec::new();
        for node in nodes {
            let name = node.metadata.name.clone().unwrap_or_default();
            let node_labels = node.metadata.labels.clone().unwrap_or_default();

            let Some(raw_id) = node_labels.get(labels::NODE_ID) else {
                return Err(ProviderError::MissingNodeIdLabel { node: name });
            };
            if node_labels.get(labels::WORKER_ROLE).map(String::as_str)
                != Some(labels::WORKER_ROLE_VALUE)
            {
                debug!(node = %name, "skipping non-worker node");
                continue;
            }
            let id: i64 = raw_id
                .parse()
                .map_err(|_| ProviderError::InvalidNodeIdLabel {
                    node: name.clone(),
                    value: raw_id.clone(),
                })?;
            node_ids.push(id);
            node_names.push(name);
        }

        info!(group = self.group_name(), ids = ?node_ids, "deleting nodes");
        manager
            .client
            .delete_cluster_nodes(self.cluster_id, node_ids.clone())
            .await?;
        self.count.fetch_sub(node_ids.len() as i64, Ordering::SeqCst);

        manager.kube.delete_node_objects(&node_names).await?;
        Ok(())
    }

    async fn force_delete_nodes(&self, _nodes: &[Node]) -> Result<(), ProviderError> {
        Err(ProviderError::NotImplemented)
    }

    async fn decrease_target_size(&self, _delta: i64) -> Result<(), ProviderError> {
        Ok(())
    }

    async fn create(&self) -> Result<Arc<dyn NodeGroup>, ProviderError> {
        Err(ProviderError::NotImplemented)
    }

    async fn delete(&self) -> Result<(), ProviderError> {
        Err(ProviderError::NotImplemented)
    }

    fn template_node_info(&self) -> Result<NodeInfo, ProviderError> {
        Err(ProviderError::NotImplemented)
    }

    fn get_options(
        &self,
        _defaults: NodeGroupAutoscalingOptions,
    ) -> Result<Option<NodeGroupAutoscalingOptions>, ProviderError> {
        Err(ProviderError::NotImplemented)
    }
}
