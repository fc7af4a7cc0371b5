//! Self-managed distribution on Amazon
//!
//! The control plane runs on provider instances bootstrapped over SSH, so
//! provisioning needs the cluster's SSH public key and the cluster network
//! is known up front.

use super::managed::ManagedProperties;
use crate::model::{ClusterKind, Ipv4Cidrs, NodePool, PkeProperties, ProviderRecord};
use crate::Result;

impl ManagedProperties for PkeProperties {
    const KIND: ClusterKind = ClusterKind::Pke;
    const REQUIRES_SSH_PUBLIC_KEY: bool = true;

    fn into_record(self) -> ProviderRecord {
        ProviderRecord::Pke(self)
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
        serde_json::json!({ "network": self.network })
    }

    fn ipv4_cidrs(&self, _cluster_name: &str) -> Result<Ipv4Cidrs> {
        Ok(Ipv4Cidrs {
            service_cluster_ip_ranges: vec![self.network.service_cidr.clone()],
            pod_ip_ranges: vec![self.network.pod_cidr.clone()],
        })
    }
}
