//! Hyperstack cloud provider for the Kubernetes cluster autoscaler.
//!
//! The autoscaler host drives this crate through the [`CloudProvider`] and
//! [`NodeGroup`] contracts: a periodic [`Manager`] refresh publishes a
//! snapshot of eligible worker node groups, and scale operations on the
//! published handles are translated into Hyperstack API calls plus the
//! matching Kubernetes `Node` object updates.

pub mod client;
pub mod cloud_provider;
pub mod config;
pub mod kubernetes;
pub mod manager;
pub mod node_group;
pub mod provider;

pub use client::{ClientError, ClusterApi, ClusterApiTrait, ClusterState};
pub use cloud_provider::{CloudProvider, NodeGroup, ProviderError, PROVIDER_NAME};
pub use kubernetes::{KubeNodes, KubeNodesTrait, KubernetesError};
pub use manager::Manager;
pub use node_group::HyperstackNodeGroup;
pub use provider::HyperstackCloudProvider;
