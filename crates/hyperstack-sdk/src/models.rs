//! Payload models for the Hyperstack cluster API.
//!
//! Upstream omits fields freely, so everything the server sends is optional;
//! callers decide which absences are errors.

use serde::{Deserialize, Serialize};

use crate::time::ApiTimestamp;

/// Cluster attributes returned by the cluster-detail endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClusterFields {
    pub id: Option<i64>,
    pub name: Option<String>,
    /// ACTIVE, CREATING, RECONCILING, WAITING, DELETED, or another
    /// provider-defined string.
    pub status: Option<String>,
    pub is_reconciling: Option<bool>,
    pub node_count: Option<i64>,
    #[serde(default)]
    pub created_at: Option<ApiTimestamp>,
}

/// One node group of a cluster.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClusterNodeGroupFields {
    pub id: Option<i64>,
    pub name: Option<String>,
    /// "worker" for scalable groups; control-plane groups carry other roles.
    pub role: Option<String>,
    pub min_count: Option<i64>,
    pub max_count: Option<i64>,
    pub count: Option<i64>,
    #[serde(default)]
    pub created_at: Option<ApiTimestamp>,
}

/// One node of a cluster.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClusterNodeFields {
    pub id: Option<i64>,
    pub name: Option<String>,
    pub status: Option<String>,
    #[serde(default)]
    pub created_at: Option<ApiTimestamp>,
}

/// Success envelope of the cluster-detail endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClusterDetailResponse {
    pub status: Option<bool>,
    pub message: Option<String>,
    pub cluster: Option<ClusterFields>,
}

/// Success envelope of the node-group list endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeGroupsListResponse {
    pub status: Option<bool>,
    pub message: Option<String>,
    pub node_groups: Option<Vec<ClusterNodeGroupFields>>,
}

/// Success envelope of the node list and node create endpoints.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClusterNodesListResponse {
    pub status: Option<bool>,
    pub message: Option<String>,
    pub nodes: Option<Vec<ClusterNodeFields>>,
}

/// Generic envelope: the success payload of the delete endpoints and the
/// error payload of every endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResponseModel {
    pub status: Option<bool>,
    pub message: Option<String>,
    pub error_reason: Option<String>,
}

/// Request body for creating nodes in a group.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateClusterNodeFields {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_group: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

/// Request body for the bulk node delete endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeleteClusterNodesFields {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ids: Option<Vec<i64>>,
}
