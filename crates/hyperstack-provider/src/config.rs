//! Environment contract and recognized node labels.

/// API server used when `HYPERSTACK_API_SERVER` is unset.
pub const DEFAULT_API_SERVER: &str = "https://infrahub-api.nexgencloud.com/v1";

/// Environment variables read by [`crate::provider::HyperstackCloudProvider::build`].
pub mod env {
    /// Required; the provider is disabled without it.
    pub const API_KEY: &str = "HYPERSTACK_API_KEY";
    /// Optional override of the API server base URL.
    pub const API_SERVER: &str = "HYPERSTACK_API_SERVER";
}

/// Kubernetes node labels joining cloud and cluster identity.
pub mod labels {
    /// Cluster id, set on the local node; integer as string.
    pub const CLUSTER_ID: &str = "hyperstack.cloud/cluster-id";
    /// Hyperstack node id; integer as string.
    pub const NODE_ID: &str = "hyperstack.cloud/node-id";
    /// Owning node group id; integer as string.
    pub const NODE_GROUP_ID: &str = "hyperstack.cloud/node-group-id";
    /// Role label carried by worker nodes.
    pub const WORKER_ROLE: &str = "node-role.kubernetes.io/worker";
    /// Expected value of [`WORKER_ROLE`].
    pub const WORKER_ROLE_VALUE: &str = "worker";
}
