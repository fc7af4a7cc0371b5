//! Oracle OKE

use super::managed::ManagedProperties;
use crate::model::{ClusterKind, NodePool, OkeProperties, ProviderRecord};

impl ManagedProperties for OkeProperties {
    const KIND: ClusterKind = ClusterKind::Oke;

    fn into_record(self) -> ProviderRecord {
        ProviderRecord::Oke(self)
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

    // Pool subnets and labels travel with the node pools
    fn parameters(&self) -> serde_json::Value {
        serde_json::json!({ "vcnId": self.vcn_id })
    }
}
