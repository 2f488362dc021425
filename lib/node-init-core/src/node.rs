//! Kubernetes node lookup

use crate::{NodeInitError, Result};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Node;
use kube::{Api, Client};
use tracing::debug;

/// The parts of a node object a reconciliation cycle cares about
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeDescriptor {
    pub name: String,
    /// Empty when the cluster has not assigned a range yet
    pub pod_cidr: String,
}

impl From<&Node> for NodeDescriptor {
    fn from(node: &Node) -> Self {
        Self {
            name: node.metadata.name.clone().unwrap_or_default(),
            pod_cidr: node
                .spec
                .as_ref()
                .and_then(|spec| spec.pod_cidr.clone())
                .unwrap_or_default(),
        }
    }
}

/// Source of node descriptors, fetched fresh on every cycle
#[async_trait]
pub trait NodeSource: Send + Sync {
    async fn fetch(&self, name: &str) -> Result<NodeDescriptor>;
}

/// NodeSource backed by the Kubernetes API
pub struct KubeNodeSource {
    client: Client,
}

impl KubeNodeSource {
    /// Wrap an already authenticated client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl NodeSource for KubeNodeSource {
    async fn fetch(&self, name: &str) -> Result<NodeDescriptor> {
        let nodes: Api<Node> = Api::all(self.client.clone());
        let node = nodes
            .get(name)
            .await
            .map_err(|source| NodeInitError::ClusterLookup {
                node: name.to_string(),
                source,
            })?;

        let descriptor = NodeDescriptor::from(&node);
        debug!("Fetched node {} with pod CIDR {:?}", descriptor.name, descriptor.pod_cidr);
        Ok(descriptor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::NodeSpec;
    use kube::api::ObjectMeta;

    #[test]
    fn test_descriptor_from_node() {
        let node = Node {
            metadata: ObjectMeta {
                name: Some("worker-1".to_string()),
                ..Default::default()
            },
            spec: Some(NodeSpec {
                pod_cidr: Some("10.244.1.0/24".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };

        let descriptor = NodeDescriptor::from(&node);
        assert_eq!(descriptor.name, "worker-1");
        assert_eq!(descriptor.pod_cidr, "10.244.1.0/24");
    }

    #[test]
    fn test_descriptor_without_pod_cidr() {
        let node = Node {
            metadata: ObjectMeta {
                name: Some("worker-2".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };

        let descriptor = NodeDescriptor::from(&node);
        assert_eq!(descriptor.pod_cidr, "");
    }
}
