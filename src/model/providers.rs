//! Provider-specific sub-records
//!
//! Each variant owns exactly one of these, persisted next to the cluster row
//! and loaded together with it (including nested node pools, subnets and
//! labels).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{ClusterKind, NodePool};

/// Alibaba ACK properties
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AckProperties {
    /// Kubernetes version
    pub kubernetes_version: String,
    /// Node pools
    pub node_pools: Vec<NodePool>,
}

/// A subnet an EKS cluster is attached to
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EksSubnet {
    /// Existing subnet id; empty to create one from `cidr`
    pub subnet_id: String,
    /// Subnet CIDR
    pub cidr: String,
    /// Availability zone
    pub availability_zone: String,
}

/// Amazon EKS properties
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EksProperties {
    /// Kubernetes version
    pub kubernetes_version: String,
    /// Existing VPC id; empty to create one
    pub vpc_id: String,
    /// Subnets
    pub subnets: Vec<EksSubnet>,
    /// Node pools
    pub node_pools: Vec<NodePool>,
}

/// Azure AKS properties
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AksProperties {
    /// Resource group the cluster lives in
    pub resource_group: String,
    /// Kubernetes version
    pub kubernetes_version: String,
    /// Node pools
    pub node_pools: Vec<NodePool>,
}

/// Google GKE properties
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GkeProperties {
    /// GCP project id
    pub project_id: String,
    /// Kubernetes version
    pub kubernetes_version: String,
    /// Node pools
    pub node_pools: Vec<NodePool>,
}

/// Oracle OKE properties
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OkeProperties {
    /// Virtual cloud network id
    pub vcn_id: String,
    /// Kubernetes version
    pub kubernetes_version: String,
    /// Node pools, each with its own subnets and labels
    pub node_pools: Vec<NodePool>,
}

/// Imported cluster properties
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct KubernetesProperties {
    /// Free-form metadata supplied on import
    pub metadata: BTreeMap<String, String>,
}

/// Dummy cluster properties
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DummyProperties {
    /// Reported Kubernetes version
    pub kubernetes_version: String,
    /// Reported node count
    pub node_count: u32,
}

/// Cluster network of a self-managed distribution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PkeNetwork {
    /// Service CIDR
    pub service_cidr: String,
    /// Pod CIDR
    pub pod_cidr: String,
    /// CNI plugin
    pub provider: String,
}

impl Default for PkeNetwork {
    fn default() -> Self {
        Self {
            service_cidr: "10.10.0.0/16".to_string(),
            pod_cidr: "10.20.0.0/16".to_string(),
            provider: "cilium".to_string(),
        }
    }
}

/// Self-managed distribution properties
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PkeProperties {
    /// Kubernetes version
    pub kubernetes_version: String,
    /// Cluster network
    pub network: PkeNetwork,
    /// Node pools
    pub node_pools: Vec<NodePool>,
}

/// The provider sub-record of one cluster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "properties", rename_all = "lowercase")]
pub enum ProviderRecord {
    /// Alibaba ACK
    Ack(AckProperties),
    /// Amazon EKS
    Eks(EksProperties),
    /// Azure AKS
    Aks(AksProperties),
    /// Google GKE
    Gke(GkeProperties),
    /// Oracle OKE
    Oke(OkeProperties),
    /// Imported cluster
    Kubernetes(KubernetesProperties),
    /// Dummy cluster
    Dummy(DummyProperties),
    /// Self-managed distribution
    Pke(PkeProperties),
}

impl ProviderRecord {
    /// The variant this record belongs to
    pub fn kind(&self) -> ClusterKind {
        match self {
            Self::Ack(_) => ClusterKind::Ack,
            Self::Eks(_) => ClusterKind::Eks,
            Self::Aks(_) => ClusterKind::Aks,
            Self::Gke(_) => ClusterKind::Gke,
            Self::Oke(_) => ClusterKind::Oke,
            Self::Kubernetes(_) => ClusterKind::Kubernetes,
            Self::Dummy(_) => ClusterKind::Dummy,
            Self::Pke(_) => ClusterKind::Pke,
        }
    }

    /// An empty record of the given kind
    pub fn empty(kind: ClusterKind) -> Self {
        match kind {
            ClusterKind::Ack => Self::Ack(Default::default()),
            ClusterKind::Eks => Self::Eks(Default::default()),
            ClusterKind::Aks => Self::Aks(Default::default()),
            ClusterKind::Gke => Self::Gke(Default::default()),
            ClusterKind::Oke => Self::Oke(Default::default()),
            ClusterKind::Kubernetes => Self::Kubernetes(Default::default()),
            ClusterKind::Dummy => Self::Dummy(Default::default()),
            ClusterKind::Pke => Self::Pke(Default::default()),
        }
    }

    /// Node pools of the record (empty for kinds without pools)
    pub fn node_pools(&self) -> &[NodePool] {
        match self {
            Self::Ack(p) => &p.node_pools,
            Self::Eks(p) => &p.node_pools,
            Self::Aks(p) => &p.node_pools,
            Self::Gke(p) => &p.node_pools,
            Self::Oke(p) => &p.node_pools,
            Self::Pke(p) => &p.node_pools,
            Self::Kubernetes(_) | Self::Dummy(_) => &[],
        }
    }

    /// Node pools of the record, for kinds that have them
    pub fn node_pools_mut(&mut self) -> Option<&mut Vec<NodePool>> {
        match self {
            Self::Ack(p) => Some(&mut p.node_pools),
            Self::Eks(p) => Some(&mut p.node_pools),
            Self::Aks(p) => Some(&mut p.node_pools),
            Self::Gke(p) => Some(&mut p.node_pools),
            Self::Oke(p) => Some(&mut p.node_pools),
            Self::Pke(p) => Some(&mut p.node_pools),
            Self::Kubernetes(_) | Self::Dummy(_) => None,
        }
    }

    /// Kubernetes version, for kinds that track one
    pub fn kubernetes_version(&self) -> Option<&str> {
        match self {
            Self::Ack(p) => Some(&p.kubernetes_version),
            Self::Eks(p) => Some(&p.kubernetes_version),
            Self::Aks(p) => Some(&p.kubernetes_version),
            Self::Gke(p) => Some(&p.kubernetes_version),
            Self::Oke(p) => Some(&p.kubernetes_version),
            Self::Dummy(p) => Some(&p.kubernetes_version),
            Self::Pke(p) => Some(&p.kubernetes_version),
            Self::Kubernetes(_) => None,
        }
    }

    /// Kubernetes version slot, for kinds that track one
    pub fn kubernetes_version_mut(&mut self) -> Option<&mut String> {
        match self {
            Self::Ack(p) => Some(&mut p.kubernetes_version),
            Self::Eks(p) => Some(&mut p.kubernetes_version),
            Self::Aks(p) => Some(&mut p.kubernetes_version),
            Self::Gke(p) => Some(&mut p.kubernetes_version),
            Self::Oke(p) => Some(&mut p.kubernetes_version),
            Self::Dummy(p) => Some(&mut p.kubernetes_version),
            Self::Pke(p) => Some(&mut p.kubernetes_version),
            Self::Kubernetes(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_record_matches_kind() {
        for kind in ClusterKind::ALL {
            let mut record = ProviderRecord::empty(kind);
            assert_eq!(record.kind(), kind);
            assert_eq!(record.node_pools_mut().is_some(), kind.has_node_pools());
        }
    }

    #[test]
    fn test_record_serializes_with_kind_tag() {
        let record = ProviderRecord::Aks(AksProperties {
            resource_group: "rg".to_string(),
            ..Default::default()
        });
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["kind"], "aks");
        assert_eq!(json["properties"]["resourceGroup"], "rg");

        let back: ProviderRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_imported_cluster_has_no_version() {
        let record = ProviderRecord::empty(ClusterKind::Kubernetes);
        assert!(record.kubernetes_version().is_none());
        assert!(record.node_pools().is_empty());
    }
}
