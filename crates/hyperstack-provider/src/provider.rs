//! Provider facade wired from the environment.

use std::env;
use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Node;
use tracing::{info, warn};

use crate::client::ClusterApi;
use crate::cloud_provider::{CloudProvider, NodeGroup, ProviderError, PROVIDER_NAME};
use crate::config;
use crate::config::labels;
use crate::kubernetes::KubeNodes;
use crate::manager::Manager;
use hyperstack_sdk::HyperstackClient;

pub struct HyperstackCloudProvider {
    manager: Arc<Manager>,
}

impl HyperstackCloudProvider {
    pub fn new(manager: Manager) -> Self {
        Self {
            manager: Arc::new(manager),
        }
    }

    /// Builds the provider from `HYPERSTACK_API_KEY` and
    /// `HYPERSTACK_API_SERVER`. Without an API key the provider is disabled
    /// and `None` is returned; the host logs and continues without it.
    pub fn build() -> Option<Self> {
        let api_key = match env::var(config::env::API_KEY) {
            Ok(key) if !key.is_empty() => key,
            _ => {
                warn!("{} is not set, hyperstack provider disabled", config::env::API_KEY);
                return None;
            }
        };
        let api_server = resolved_api_server();

        info!(api_server = %api_server, "building hyperstack cloud provider");
        let gateway = ClusterApi::new(HyperstackClient::new(api_server, api_key));
        let manager = Manager::new(Arc::new(gateway), Arc::new(KubeNodes::new()));
        Some(Self::new(manager))
    }

    pub fn manager(&self) -> &Manager {
        &self.manager
    }
}

/// `HYPERSTACK_API_SERVER`, or the default API server when unset or empty.
fn resolved_api_server() -> String {
    env::var(config::env::API_SERVER)
        .ok()
        .filter(|server| !server.is_empty())
        .unwrap_or_else(|| config::DEFAULT_API_SERVER.to_string())
}

#[async_trait]
impl CloudProvider for HyperstackCloudProvider {
    fn name(&self) -> &'static str {
        PROVIDER_NAME
    }

    fn node_groups(&self) -> Vec<Arc<dyn NodeGroup>> {
        self.manager
            .node_groups()
            .into_iter()
            .map(|group| group as Arc<dyn NodeGroup>)
            .collect()
    }

    fn node_group_for_node(
        &self,
        node: &Node,
    ) -> Result<Option<Arc<dyn NodeGroup>>, ProviderError> {
        let Some(value) = node
            .metadata
            .labels
            .as_ref()
            .and_then(|node_labels| node_labels.get(labels::NODE_GROUP_ID))
        else {
            // Not labelled: the node is not managed by this provider.
            return Ok(None);
        };
        let group_id: i64 = value
            .parse()
            .map_err(|_| ProviderError::InvalidNodeGroupLabel {
                value: value.clone(),
            })?;
        Ok(self
            .manager
            .node_groups()
            .into_iter()
            .find(|group| group.group_id() == group_id)
            .map(|group| group as Arc<dyn NodeGroup>))
    }

    async fn refresh(&self) -> Result<(), ProviderError> {
        self.manager.refresh().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    use crate::client::MockClusterApiTrait;
    use crate::kubernetes::MockKubeNodesTrait;
    use crate::node_group::HyperstackNodeGroup;
    use hyperstack_sdk::models::ClusterNodeGroupFields;

    /// Env-var tests share process state; serialize them.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn provider_with_group_ids(ids: &[i64]) -> HyperstackCloudProvider {
        let manager = Manager::new(
            Arc::new(MockClusterApiTrait::new()),
            Arc::new(MockKubeNodesTrait::new()),
        );
        let groups = ids
            .iter()
            .map(|id| {
                Arc::new(HyperstackNodeGroup::new(
                    ClusterNodeGroupFields {
                        id: Some(*id),
                        name: Some(format!("group-{id}")),
                        role: Some("worker".to_string()),
                        min_count: Some(1),
                        max_count: Some(5),
                        count: Some(2),
                        created_at: None,
                    },
                    Vec::new(),
                    123,
                    "ACTIVE".to_string(),
                    Arc::downgrade(manager.state()),
                ))
            })
            .collect();
        manager.publish(groups);
        HyperstackCloudProvider::new(manager)
    }

    fn labelled_node(group_label: Option<&str>) -> Node {
        let mut node_labels = BTreeMap::new();
        if let Some(value) = group_label {
            node_labels.insert(labels::NODE_GROUP_ID.to_string(), value.to_string());
        }
        Node {
            metadata: ObjectMeta {
                name: Some("n1".to_string()),
                labels: Some(node_labels),
                ..ObjectMeta::default()
            },
            ..Node::default()
        }
    }

    #[test]
    fn name_is_the_registered_constant() {
        let provider = provider_with_group_ids(&[]);
        assert_eq!(provider.name(), PROVIDER_NAME);
        assert_eq!(provider.name(), "hyperstack");
    }

    #[test]
    fn node_groups_returns_the_published_snapshot() {
        let provider = provider_with_group_ids(&[1, 2]);
        assert_eq!(provider.node_groups().len(), 2);
    }

    #[test]
    fn node_group_for_node_finds_the_matching_group() {
        let provider = provider_with_group_ids(&[10, 20]);
        let group = provider
            .node_group_for_node(&labelled_node(Some("20")))
            .expect("lookup")
            .expect("group must match");
        assert_eq!(group.id(), "20");
    }

    #[test]
    fn node_group_for_node_without_label_is_unmanaged() {
        let provider = provider_with_group_ids(&[10, 20]);
        let group = provider
            .node_group_for_node(&labelled_node(None))
            .expect("lookup");
        assert!(group.is_none());
    }

    #[test]
    fn node_group_for_node_with_non_integer_label_fails() {
        let provider = provider_with_group_ids(&[10, 20]);
        let err = provider
            .node_group_for_node(&labelled_node(Some("abc")))
            .expect_err("non-integer label must fail");
        match err {
            ProviderError::InvalidNodeGroupLabel { value } => assert_eq!(value, "abc"),
            other => panic!("expected InvalidNodeGroupLabel, got {other:?}"),
        }
    }

    #[test]
    fn node_group_for_node_with_unknown_id_is_unmanaged() {
        let provider = provider_with_group_ids(&[10]);
        let group = provider
            .node_group_for_node(&labelled_node(Some("99")))
            .expect("lookup");
        assert!(group.is_none());
    }

    #[test]
    fn build_without_api_key_returns_none() {
        let _guard = ENV_LOCK.lock().expect("env lock poisoned");
        env::remove_var(config::env::API_KEY);
        env::remove_var(config::env::API_SERVER);
        assert!(HyperstackCloudProvider::build().is_none());
    }

    #[test]
    fn build_with_api_key_uses_default_server() {
        let _guard = ENV_LOCK.lock().expect("env lock poisoned");
        env::set_var(config::env::API_KEY, "abc-123-xyz");
        env::remove_var(config::env::API_SERVER);

        assert_eq!(resolved_api_server(), config::DEFAULT_API_SERVER);
        let provider = HyperstackCloudProvider::build().expect("provider");
        assert_eq!(provider.name(), "hyperstack");
        assert!(provider.node_groups().is_empty());

        env::remove_var(config::env::API_KEY);
    }

    #[test]
    fn build_honors_configured_server() {
        let _guard = ENV_LOCK.lock().expect("env lock poisoned");
        env::set_var(config::env::API_KEY, "abc-123-xyz");
        env::set_var(config::env::API_SERVER, "https://example.test/v1");

        assert_eq!(resolved_api_server(), "https://example.test/v1");
        assert!(HyperstackCloudProvider::build().is_some());

        env::remove_var(config::env::API_KEY);
        env::remove_var(config::env::API_SERVER);
    }
}
