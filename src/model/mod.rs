//! Persisted cluster records and the provider/distribution dispatch
//!
//! A [`ClusterModel`] row is owned 1:1 with exactly one provider sub-record
//! ([`ProviderRecord`]). Which sub-record a row must have is decided by
//! [`ClusterKind::resolve`], the only place where the provider and
//! distribution tags are interpreted.

pub mod providers;
pub mod request;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use providers::{
    AckProperties, AksProperties, DummyProperties, EksProperties, EksSubnet, GkeProperties,
    KubernetesProperties, OkeProperties, PkeNetwork, PkeProperties, ProviderRecord,
};
pub use request::{
    CreateClusterProperties, CreateClusterRequest, UpdateClusterRequest, UpdateNodePoolsRequest,
};

use crate::secret::SecretType;
use crate::{Error, Result};

/// Node names grouped by node pool
pub type NodeNames = BTreeMap<String, Vec<String>>;

/// Supported provider tags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CloudType {
    /// Alibaba Cloud
    Alibaba,
    /// Amazon Web Services
    Amazon,
    /// Microsoft Azure
    Azure,
    /// Google Cloud
    Google,
    /// Oracle Cloud
    Oracle,
    /// Any existing cluster imported by kubeconfig
    Kubernetes,
    /// Fake provider for demos and tests
    Dummy,
}

impl CloudType {
    /// Wire name of the provider tag
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Alibaba => "alibaba",
            Self::Amazon => "amazon",
            Self::Azure => "azure",
            Self::Google => "google",
            Self::Oracle => "oracle",
            Self::Kubernetes => "kubernetes",
            Self::Dummy => "dummy",
        }
    }

    /// Secret type a cluster's primary secret must have
    pub fn secret_type(&self) -> SecretType {
        match self {
            Self::Alibaba => SecretType::Alibaba,
            Self::Amazon => SecretType::Amazon,
            Self::Azure => SecretType::Azure,
            Self::Google => SecretType::Google,
            Self::Oracle => SecretType::Oracle,
            Self::Kubernetes => SecretType::Kubernetes,
            Self::Dummy => SecretType::Dummy,
        }
    }

    /// True for real clouds, which need a location
    pub fn is_managed(&self) -> bool {
        !matches!(self, Self::Kubernetes | Self::Dummy)
    }
}

impl FromStr for CloudType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "alibaba" => Ok(Self::Alibaba),
            "amazon" => Ok(Self::Amazon),
            "azure" => Ok(Self::Azure),
            "google" => Ok(Self::Google),
            "oracle" => Ok(Self::Oracle),
            "kubernetes" => Ok(Self::Kubernetes),
            "dummy" => Ok(Self::Dummy),
            other => Err(Error::unsupported_cloud(other)),
        }
    }
}

impl fmt::Display for CloudType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Self-managed Kubernetes distributions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Distribution {
    /// Platform-built kubeadm distribution on raw instances
    Pke,
}

impl Distribution {
    /// Wire name of the distribution tag
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pke => "pke",
        }
    }

    /// Clouds the distribution can be installed on
    pub fn supported_clouds(&self) -> &'static [CloudType] {
        match self {
            Self::Pke => &[CloudType::Amazon],
        }
    }
}

impl fmt::Display for Distribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Concrete cluster variant, one per provider offering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClusterKind {
    /// Alibaba Container Service for Kubernetes
    Ack,
    /// Amazon Elastic Kubernetes Service
    Eks,
    /// Azure Kubernetes Service
    Aks,
    /// Google Kubernetes Engine
    Gke,
    /// Oracle Container Engine for Kubernetes
    Oke,
    /// Imported cluster
    Kubernetes,
    /// Dummy cluster
    Dummy,
    /// Self-managed distribution on Amazon instances
    Pke,
}

impl ClusterKind {
    /// Every kind, in dispatch order
    pub const ALL: [ClusterKind; 8] = [
        Self::Ack,
        Self::Eks,
        Self::Aks,
        Self::Gke,
        Self::Oke,
        Self::Kubernetes,
        Self::Dummy,
        Self::Pke,
    ];

    /// Resolve the variant for a provider tag and distribution tag
    ///
    /// The distribution is checked first: it selects a different code path
    /// even on the same cloud. An empty distribution means the provider's
    /// own managed offering.
    pub fn resolve(cloud: &str, distribution: &str) -> Result<Self> {
        if !distribution.is_empty() {
            let distribution_type = match distribution {
                "pke" => Distribution::Pke,
                other => return Err(Error::unsupported_distribution(other, cloud)),
            };
            let cloud_type: CloudType = cloud.parse()?;
            if !distribution_type.supported_clouds().contains(&cloud_type) {
                return Err(Error::unsupported_distribution(distribution, cloud));
            }
            return Ok(match distribution_type {
                Distribution::Pke => Self::Pke,
            });
        }

        Ok(match cloud.parse::<CloudType>()? {
            CloudType::Alibaba => Self::Ack,
            CloudType::Amazon => Self::Eks,
            CloudType::Azure => Self::Aks,
            CloudType::Google => Self::Gke,
            CloudType::Oracle => Self::Oke,
            CloudType::Kubernetes => Self::Kubernetes,
            CloudType::Dummy => Self::Dummy,
        })
    }

    /// Provider tag of the kind
    pub fn cloud(&self) -> CloudType {
        match self {
            Self::Ack => CloudType::Alibaba,
            Self::Eks | Self::Pke => CloudType::Amazon,
            Self::Aks => CloudType::Azure,
            Self::Gke => CloudType::Google,
            Self::Oke => CloudType::Oracle,
            Self::Kubernetes => CloudType::Kubernetes,
            Self::Dummy => CloudType::Dummy,
        }
    }

    /// Distribution of the kind, if self-managed
    pub fn distribution(&self) -> Option<Distribution> {
        match self {
            Self::Pke => Some(Distribution::Pke),
            _ => None,
        }
    }

    /// Short name used in logs and field paths
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ack => "ack",
            Self::Eks => "eks",
            Self::Aks => "aks",
            Self::Gke => "gke",
            Self::Oke => "oke",
            Self::Kubernetes => "kubernetes",
            Self::Dummy => "dummy",
            Self::Pke => "pke",
        }
    }

    /// True for kinds whose sub-record carries node pools
    pub fn has_node_pools(&self) -> bool {
        !matches!(self, Self::Kubernetes | Self::Dummy)
    }
}

impl fmt::Display for ClusterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of a cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClusterStatus {
    /// Provisioning in progress
    #[default]
    Creating,
    /// Provisioned and serving
    Running,
    /// Update in progress
    Updating,
    /// Deletion in progress
    Deleting,
    /// Last operation failed
    Error,
    /// Running, with a problem worth surfacing
    Warning,
}

impl ClusterStatus {
    /// Wire name of the status
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Creating => "CREATING",
            Self::Running => "RUNNING",
            Self::Updating => "UPDATING",
            Self::Deleting => "DELETING",
            Self::Error => "ERROR",
            Self::Warning => "WARNING",
        }
    }
}

impl fmt::Display for ClusterStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Optional platform features enabled on a cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FeatureFlags {
    /// Log collection
    pub logging: bool,
    /// Metrics collection
    pub monitoring: bool,
    /// Image and workload security scanning
    pub security_scan: bool,
    /// Service mesh
    pub service_mesh: bool,
}

/// A node pool of a provider sub-record
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NodePool {
    /// Pool name, unique within the cluster
    pub name: String,
    /// Instance/machine type
    pub instance_type: String,
    /// Desired node count
    pub count: u32,
    /// Lower bound when autoscaling
    pub min_count: u32,
    /// Upper bound when autoscaling
    pub max_count: u32,
    /// Whether the provider autoscales the pool
    pub autoscaling: bool,
    /// Node labels applied to the pool
    pub labels: BTreeMap<String, String>,
    /// Subnets the pool's nodes are placed in (providers that place per pool)
    pub subnet_ids: Vec<String>,
}

/// CIDR ranges of a cluster network
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ipv4Cidrs {
    /// Service IP ranges
    pub service_cluster_ip_ranges: Vec<String>,
    /// Pod IP ranges
    pub pod_ip_ranges: Vec<String>,
}

/// Persisted cluster row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterModel {
    /// Numeric id; 0 until first persisted
    pub id: u64,
    /// Stable unique id
    pub uid: String,
    /// Owning organization
    pub organization_id: u64,
    /// Cluster name
    pub name: String,
    /// Target location (region/zone)
    pub location: String,
    /// Provider tag
    pub cloud: String,
    /// Distribution tag; empty for the provider's managed offering
    pub distribution: String,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Creating user; 0 when unknown
    pub created_by: u64,
    /// Primary (cloud credential) secret id
    pub secret_id: String,
    /// SSH key secret id; empty when none
    pub ssh_secret_id: String,
    /// Generated kubeconfig secret id; empty until provisioned
    pub config_secret_id: String,
    /// Lifecycle status
    pub status: ClusterStatus,
    /// Human-readable status detail
    pub status_message: String,
    /// Optional features
    pub flags: FeatureFlags,
}

impl ClusterModel {
    /// Variant this row must be rehydrated as
    pub fn kind(&self) -> Result<ClusterKind> {
        ClusterKind::resolve(&self.cloud, &self.distribution)
    }

    /// True once the row has been inserted
    pub fn is_persisted(&self) -> bool {
        self.id != 0
    }
}

/// Who created a cluster, and when
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatorBaseFields {
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Creator nickname; empty when unknown
    pub creator_name: String,
    /// Creator user id; 0 when unknown
    pub creator_id: u64,
}

/// Summary of a cluster for status queries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterStatusResponse {
    /// Cluster id
    pub id: u64,
    /// Cluster UID
    pub uid: String,
    /// Cluster name
    pub name: String,
    /// Lifecycle status
    pub status: ClusterStatus,
    /// Status detail
    pub status_message: String,
    /// Provider tag
    pub cloud: String,
    /// Distribution tag
    pub distribution: String,
    /// Location
    pub location: String,
    /// Kubernetes version, when the variant tracks one
    pub version: Option<String>,
    /// Node pools by name
    pub node_pools: BTreeMap<String, NodePool>,
    /// Optional features
    pub flags: FeatureFlags,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Creating user
    pub creator_id: u64,
}
