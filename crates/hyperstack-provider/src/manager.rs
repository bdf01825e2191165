//! Snapshot owner and refresh loop.
//!
//! The manager is the single writer of the provider's view of the cluster:
//! a list of eligible worker node groups rebuilt on every successful
//! refresh. Published snapshots are replaced wholesale, so node-group
//! handles returned earlier keep the records they captured.

use std::sync::{Arc, RwLock};

use tracing::{debug, info, warn};

use crate::client::ClusterApiTrait;
use crate::cloud_provider::ProviderError;
use crate::config::labels;
use crate::kubernetes::KubeNodesTrait;
use crate::node_group::HyperstackNodeGroup;

/// The manager's view of the cluster.
///
/// `Empty` means no refresh has succeeded yet, `Reconciling` that the first
/// refresh found the cluster mid-mutation. Both publish zero groups and make
/// scale-in a no-op.
pub(crate) enum Snapshot {
    Empty,
    Reconciling,
    Ready(Vec<Arc<HyperstackNodeGroup>>),
}

impl Snapshot {
    fn groups(&self) -> Vec<Arc<HyperstackNodeGroup>> {
        match self {
            Snapshot::Ready(groups) => groups.clone(),
            Snapshot::Empty | Snapshot::Reconciling => Vec::new(),
        }
    }
}

/// State shared between the manager and the node-group handles it publishes.
///
/// Handles hold a `Weak` reference: the manager outlives every snapshot it
/// published, and a handle that outlives its manager fails its operations
/// instead of keeping the state alive.
pub(crate) struct ManagerState {
    pub(crate) client: Arc<dyn ClusterApiTrait>,
    pub(crate) kube: Arc<dyn KubeNodesTrait>,
    pub(crate) snapshot: RwLock<Snapshot>,
}

impl ManagerState {
    /// Whether the last published snapshot contains any groups. Scale-in
    /// treats "no published groups" as "the cluster may be reconciling" and
    /// declines to act.
    pub(crate) fn has_published_groups(&self) -> bool {
        matches!(
            &*self.snapshot.read().expect("snapshot lock poisoned"),
            Snapshot::Ready(groups) if !groups.is_empty()
        )
    }
}

pub struct Manager {
    state: Arc<ManagerState>,
}

impl Manager {
    pub fn new(client: Arc<dyn ClusterApiTrait>, kube: Arc<dyn KubeNodesTrait>) -> Self {
        Self {
            state: Arc::new(ManagerState {
                client,
                kube,
                snapshot: RwLock::new(Snapshot::Empty),
            }),
        }
    }

    /// Node groups from the last published snapshot.
    pub fn node_groups(&self) -> Vec<Arc<HyperstackNodeGroup>> {
        self.state
            .snapshot
            .read()
            .expect("snapshot lock poisoned")
            .groups()
    }

    /// Rebuilds the snapshot from the cloud API.
    ///
    /// Any failure leaves the previously published snapshot in place; the
    /// host retries on its next control cycle. A reconciling cluster is a
    /// distinguished failure: scale decisions against an in-flux cluster are
    /// unsafe, so the refresh is shed entirely.
    pub async fn refresh(&self) -> Result<(), ProviderError> {
        let label = self.state.kube.local_node_label(labels::CLUSTER_ID).await?;
        let cluster_id: i64 = label
            .parse()
            .map_err(|_| ProviderError::InvalidClusterIdLabel { value: label })?;

        let records = self.state.client.list_node_groups(cluster_id).await?;
        let cluster = self.state.client.get_cluster(cluster_id).await?;

        if cluster.is_reconciling {
            warn!(cluster_id, "cluster is reconciling, skipping refresh");
            let mut snapshot = self.state.snapshot.write().expect("snapshot lock poisoned");
            // A Ready snapshot is retained; only the initial state is marked.
            if !matches!(&*snapshot, Snapshot::Ready(_)) {
                *snapshot = Snapshot::Reconciling;
            }
            return Err(ProviderError::ClusterReconciling);
        }

        let mut groups = Vec::new();
        for record in records {
            if record.role.as_deref() != Some(labels::WORKER_ROLE_VALUE) {
                continue;
            }
            let (Some(id), Some(min_count), Some(max_count)) =
                (record.id, record.min_count, record.max_count)
            else {
                debug!(name = record.name.as_deref(), "skipping node group with incomplete record");
                continue;
            };
            if max_count <= min_count {
                debug!(
                    group_id = id,
                    max_count, min_count, "skipping node group, nothing to scale"
                );
                continue;
            }

            let nodes = self.state.client.list_cluster_nodes(cluster_id).await?;
            debug!(
                group_id = id,
                count = record.count,
                nodes = nodes.len(),
                "adding node group to snapshot"
            );
            groups.push(Arc::new(HyperstackNodeGroup::new(
                record,
                nodes,
                cluster_id,
                cluster.status.clone(),
                Arc::downgrade(&self.state),
            )));
        }

        info!(cluster_id, groups = groups.len(), "published node group snapshot");
        *self.state.snapshot.write().expect("snapshot lock poisoned") = Snapshot::Ready(groups);
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn state(&self) -> &Arc<ManagerState> {
        &self.state
    }

    #[cfg(test)]
    pub(crate) fn publish(&self, groups: Vec<Arc<HyperstackNodeGroup>>) {
        *self.state.snapshot.write().expect("snapshot lock poisoned") = Snapshot::Ready(groups);
    }
}
