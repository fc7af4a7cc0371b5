//! Alibaba ACK

use super::managed::ManagedProperties;
use crate::model::{AckProperties, ClusterKind, NodePool, ProviderRecord};

impl ManagedProperties for AckProperties {
    const KIND: ClusterKind = ClusterKind::Ack;

    fn into_record(self) -> ProviderRecord {
        ProviderRecord::Ack(self)
    }

    fn kubernetes_version(&self) -> &str {
        &self.kubernetes_version
    }

    fn kubernetes_version_mut(&mut self) -> &mut String {
        &mut self.kubernetes_version
    }

    fn node_pools(&self) -> &[NodePool] {
        &self.node_pools
    }

    fn node_pools_mut(&mut self) -> &mut Vec<NodePool> {
        &mut self.node_pools
    }

    fn parameters(&self) -> serde_json::Value {
        serde_json::json!({})
    }
}
