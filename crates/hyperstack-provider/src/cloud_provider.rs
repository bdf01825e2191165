//! The autoscaler host contract.
//!
//! These are the traits and types the cluster-autoscaler host consumes;
//! everything else in this crate exists to implement them against the
//! Hyperstack API. Optional operations the provider does not support fail
//! with [`ProviderError::NotImplemented`], which the host treats as a
//! sentinel.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Node;
use thiserror::Error;

use crate::client::ClientError;
use crate::kubernetes::KubernetesError;

/// Provider name registered with the autoscaler host.
pub const PROVIDER_NAME: &str = "hyperstack";

/// Lifecycle state attributed to a cloud instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceState {
    Running,
    Creating,
    Deleting,
    /// The cloud reported a status this provider does not model.
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceStatus {
    pub state: InstanceState,
}

/// One cloud instance of a node group; `id` must always be set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instance {
    pub id: String,
    pub status: Option<InstanceStatus>,
}

/// Per-group overrides of the host's autoscaling options.
///
/// Only referenced by [`NodeGroup::get_options`], which this provider does
/// not implement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeGroupAutoscalingOptions {
    pub scale_down_utilization_threshold: f64,
    pub scale_down_unneeded_time: Duration,
    pub scale_down_unready_time: Duration,
    pub max_node_provision_time: Duration,
}

/// Template of a node the host would simulate scale-ups with.
#[derive(Debug, Clone)]
pub struct NodeInfo {
    pub node: Node,
}

#[derive(Debug, Error)]
pub enum ProviderError {
    /// Sentinel for optional contract operations this provider declines.
    #[error("not implemented")]
    NotImplemented,
    #[error("cluster is reconciling, skipping refresh")]
    ClusterReconciling,
    #[error("cluster id label value {value:?} is not an integer")]
    InvalidClusterIdLabel { value: String },
    #[error("size increase must be positive, got {delta}")]
    SizeIncreaseNotPositive { delta: i64 },
    #[error("size increase is too large. current: {current} desired: {desired} max: {max}")]
    SizeIncreaseTooLarge {
        current: i64,
        desired: i64,
        max: i64,
    },
    #[error("node {node} does not have a node ID label")]
    MissingNodeIdLabel { node: String },
    #[error("node {node} has a non-integer node ID label value {value:?}")]
    InvalidNodeIdLabel { node: String, value: String },
    #[error("node group label value {value:?} is not an integer")]
    InvalidNodeGroupLabel { value: String },
    #[error("node group manager is no longer available")]
    ManagerReleased,
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error(transparent)]
    Kubernetes(#[from] KubernetesError),
}

/// A set of homogeneous worker nodes managed as one scaling unit.
#[async_trait]
pub trait NodeGroup: Send + Sync {
    /// Maximum size of the node group.
    fn max_size(&self) -> i64;

    /// Minimum size of the node group.
    fn min_size(&self) -> i64;

    /// Current target size. The number of registered Kubernetes nodes may
    /// differ until startup or deletion settles.
    fn target_size(&self) -> Result<i64, ProviderError>;

    /// Unique identifier of the node group.
    fn id(&self) -> String;

    /// Human-readable description for diagnostics.
    fn debug_info(&self) -> String;

    /// Whether the group really exists on the cloud provider side.
    fn exist(&self) -> bool;

    /// Whether the group was created by the autoscaler itself.
    fn autoprovisioned(&self) -> bool;

    /// Cloud instances belonging to the group, including ones that have not
    /// become Kubernetes nodes yet.
    fn nodes(&self) -> Result<Vec<Instance>, ProviderError>;

    /// Requests `delta` additional nodes.
    async fn increase_size(&self, delta: i64) -> Result<(), ProviderError>;

    /// Requests `delta` additional nodes all-or-nothing. Unsupported.
    async fn atomic_increase_size(&self, delta: i64) -> Result<(), ProviderError>;

    /// Deletes the given nodes from the group, on the cloud side and in
    /// Kubernetes.
    async fn delete_nodes(&self, nodes: &[Node]) -> Result<(), ProviderError>;

    /// Deletes nodes without constraint checks. Unsupported.
    async fn force_delete_nodes(&self, nodes: &[Node]) -> Result<(), ProviderError>;

    /// Reduces the target for not-yet-fulfilled requests. Hyperstack does
    /// not model pending requests separately, so this always succeeds.
    async fn decrease_target_size(&self, delta: i64) -> Result<(), ProviderError>;

    /// Creates the group on the cloud provider side. Unsupported.
    async fn create(&self) -> Result<Arc<dyn NodeGroup>, ProviderError>;

    /// Deletes the group on the cloud provider side. Unsupported.
    async fn delete(&self) -> Result<(), ProviderError>;

    /// Template node for scale-from-zero simulations. Unsupported.
    fn template_node_info(&self) -> Result<NodeInfo, ProviderError>;

    /// Per-group autoscaling option overrides. Unsupported.
    fn get_options(
        &self,
        defaults: NodeGroupAutoscalingOptions,
    ) -> Result<Option<NodeGroupAutoscalingOptions>, ProviderError>;
}

impl std::fmt::Debug for dyn NodeGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.debug_info())
    }
}

/// The provider surface the autoscaler host drives.
#[async_trait]
pub trait CloudProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Node groups from the last published snapshot.
    fn node_groups(&self) -> Vec<Arc<dyn NodeGroup>>;

    /// Classifies a Kubernetes node to its owning group. `Ok(None)` means
    /// the node is not managed by this provider.
    fn node_group_for_node(&self, node: &Node)
        -> Result<Option<Arc<dyn NodeGroup>>, ProviderError>;

    /// Rebuilds the snapshot from the cloud API; invoked periodically by the
    /// host.
    async fn refresh(&self) -> Result<(), ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_implemented_message_matches_sentinel() {
        assert_eq!(ProviderError::NotImplemented.to_string(), "not implemented");
    }

    #[test]
    fn size_increase_error_names_all_three_sizes() {
        let err = ProviderError::SizeIncreaseTooLarge {
            current: 2,
            desired: 7,
            max: 5,
        };
        assert_eq!(
            err.to_string(),
            "size increase is too large. current: 2 desired: 7 max: 5"
        );
    }

    #[test]
    fn missing_node_id_label_error_names_the_node() {
        let err = ProviderError::MissingNodeIdLabel {
            node: "worker-3".to_string(),
        };
        assert!(err.to_string().contains("worker-3"));
        assert!(err.to_string().contains("node ID label"));
    }
}
