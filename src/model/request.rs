//! Cluster creation and update requests
//!
//! Requests are defaulted first, then validated. Validation resolves the
//! [`ClusterKind`] so the factory never re-interprets the tags itself.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use super::{
    AckProperties, AksProperties, ClusterKind, DummyProperties, EksProperties, FeatureFlags,
    GkeProperties, KubernetesProperties, NodePool, OkeProperties, PkeProperties, ProviderRecord,
};
use crate::{Error, Result, DEFAULT_KUBERNETES_VERSION};

/// Location given to clusters that don't run in a cloud region
pub const DEFAULT_LOCAL_LOCATION: &str = "local";

/// Node count of a pool that doesn't specify one
pub const DEFAULT_NODE_POOL_COUNT: u32 = 1;

/// Maximum length of a cluster or node pool name
pub const MAX_NAME_LENGTH: usize = 63;

/// Provider-specific part of a creation request; exactly one must be set
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CreateClusterProperties {
    /// Alibaba ACK
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ack: Option<AckProperties>,
    /// Amazon EKS
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eks: Option<EksProperties>,
    /// Azure AKS
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aks: Option<AksProperties>,
    /// Google GKE
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gke: Option<GkeProperties>,
    /// Oracle OKE
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oke: Option<OkeProperties>,
    /// Imported cluster
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kubernetes: Option<KubernetesProperties>,
    /// Dummy cluster
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dummy: Option<DummyProperties>,
    /// Self-managed distribution
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pke: Option<PkeProperties>,
}

impl CreateClusterProperties {
    /// Kinds that have a properties block set
    pub fn kinds(&self) -> Vec<ClusterKind> {
        ClusterKind::ALL
            .into_iter()
            .filter(|kind| self.record(*kind).is_some())
            .collect()
    }

    /// Copy of the block for a kind, as a sub-record
    pub fn record(&self, kind: ClusterKind) -> Option<ProviderRecord> {
        match kind {
            ClusterKind::Ack => self.ack.clone().map(ProviderRecord::Ack),
            ClusterKind::Eks => self.eks.clone().map(ProviderRecord::Eks),
            ClusterKind::Aks => self.aks.clone().map(ProviderRecord::Aks),
            ClusterKind::Gke => self.gke.clone().map(ProviderRecord::Gke),
            ClusterKind::Oke => self.oke.clone().map(ProviderRecord::Oke),
            ClusterKind::Kubernetes => self.kubernetes.clone().map(ProviderRecord::Kubernetes),
            ClusterKind::Dummy => self.dummy.clone().map(ProviderRecord::Dummy),
            ClusterKind::Pke => self.pke.clone().map(ProviderRecord::Pke),
        }
    }

    /// Remove the block for a kind
    pub fn take(&mut self, kind: ClusterKind) -> Option<ProviderRecord> {
        match kind {
            ClusterKind::Ack => self.ack.take().map(ProviderRecord::Ack),
            ClusterKind::Eks => self.eks.take().map(ProviderRecord::Eks),
            ClusterKind::Aks => self.aks.take().map(ProviderRecord::Aks),
            ClusterKind::Gke => self.gke.take().map(ProviderRecord::Gke),
            ClusterKind::Oke => self.oke.take().map(ProviderRecord::Oke),
            ClusterKind::Kubernetes => self.kubernetes.take().map(ProviderRecord::Kubernetes),
            ClusterKind::Dummy => self.dummy.take().map(ProviderRecord::Dummy),
            ClusterKind::Pke => self.pke.take().map(ProviderRecord::Pke),
        }
    }

    /// Set the block matching the record's kind
    pub fn put(&mut self, record: ProviderRecord) {
        match record {
            ProviderRecord::Ack(p) => self.ack = Some(p),
            ProviderRecord::Eks(p) => self.eks = Some(p),
            ProviderRecord::Aks(p) => self.aks = Some(p),
            ProviderRecord::Gke(p) => self.gke = Some(p),
            ProviderRecord::Oke(p) => self.oke = Some(p),
            ProviderRecord::Kubernetes(p) => self.kubernetes = Some(p),
            ProviderRecord::Dummy(p) => self.dummy = Some(p),
            ProviderRecord::Pke(p) => self.pke = Some(p),
        }
    }
}

/// Request to create a cluster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateClusterRequest {
    /// Cluster name (DNS-1123 label)
    pub name: String,
    /// Target location; defaulted for non-cloud providers
    #[serde(default)]
    pub location: String,
    /// Provider tag
    pub cloud: String,
    /// Distribution tag; empty for the provider's managed offering
    #[serde(default)]
    pub distribution: String,
    /// Primary secret id
    pub secret_id: String,
    /// SSH secret id; required by self-managed distributions
    #[serde(default)]
    pub ssh_secret_id: String,
    /// Optional features
    #[serde(default)]
    pub flags: FeatureFlags,
    /// Provider-specific properties
    pub properties: CreateClusterProperties,
}

impl CreateClusterRequest {
    /// Fill in defaults for unset fields
    ///
    /// Unknown tags are left alone; [`validate`](Self::validate) reports them.
    pub fn add_defaults(&mut self) {
        if let Ok(kind) = ClusterKind::resolve(&self.cloud, &self.distribution) {
            if !kind.cloud().is_managed() && self.location.is_empty() {
                self.location = DEFAULT_LOCAL_LOCATION.to_string();
            }
        }

        for kind in self.properties.kinds() {
            if let Some(mut record) = self.properties.take(kind) {
                add_record_defaults(&mut record);
                self.properties.put(record);
            }
        }
    }

    /// Validate the request and resolve the variant it creates
    pub fn validate(&self) -> Result<ClusterKind> {
        validate_name(&self.name, &self.name, "name")?;

        if self.secret_id.is_empty() {
            return Err(Error::validation_for_field(
                &self.name,
                "secretId",
                "secret id is required",
            ));
        }

        let kind = ClusterKind::resolve(&self.cloud, &self.distribution)?;

        if kind.cloud().is_managed() && self.location.is_empty() {
            return Err(Error::validation_for_field(
                &self.name,
                "location",
                format!("location is required for {} clusters", kind.cloud()),
            ));
        }

        match self.properties.kinds().as_slice() {
            [] => {
                return Err(Error::validation_for_field(
                    &self.name,
                    format!("properties.{kind}"),
                    "missing provider properties",
                ))
            }
            [given] if *given == kind => {}
            [given] => {
                return Err(Error::validation_for_field(
                    &self.name,
                    format!("properties.{given}"),
                    format!("properties for {given} given, but the cluster is {kind}"),
                ))
            }
            _ => {
                return Err(Error::validation_for_field(
                    &self.name,
                    "properties",
                    "exactly one provider properties block must be set",
                ))
            }
        }

        if kind.distribution().is_some() && self.ssh_secret_id.is_empty() {
            return Err(Error::validation_for_field(
                &self.name,
                "sshSecretId",
                format!("{kind} clusters require an ssh secret"),
            ));
        }

        if let Some(record) = self.properties.record(kind) {
            if kind.has_node_pools() {
                validate_node_pools(&self.name, record.node_pools())?;
            }
        }

        Ok(kind)
    }

    /// Remove the properties block of a validated request
    pub fn take_properties(&mut self, kind: ClusterKind) -> Result<ProviderRecord> {
        self.properties.take(kind).ok_or_else(|| {
            Error::validation_for_field(
                &self.name,
                format!("properties.{kind}"),
                "missing provider properties",
            )
        })
    }
}

/// Request to change a cluster's version and/or node pools
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UpdateClusterRequest {
    /// New Kubernetes version
    pub kubernetes_version: Option<String>,
    /// Full desired set of node pools
    pub node_pools: Option<Vec<NodePool>>,
}

impl UpdateClusterRequest {
    /// Copy unset pool fields from the current sub-record
    pub fn add_defaults_to_update(&mut self, current: &ProviderRecord) {
        let Some(pools) = self.node_pools.as_mut() else {
            return;
        };

        for pool in pools.iter_mut() {
            match current.node_pools().iter().find(|p| p.name == pool.name) {
                Some(existing) => {
                    if pool.instance_type.is_empty() {
                        pool.instance_type = existing.instance_type.clone();
                    }
                    if pool.labels.is_empty() {
                        pool.labels = existing.labels.clone();
                    }
                    if pool.subnet_ids.is_empty() {
                        pool.subnet_ids = existing.subnet_ids.clone();
                    }
                    if pool.count == 0 {
                        pool.count = existing.count;
                    }
                    add_node_pool_defaults(pool);
                }
                None => add_node_pool_defaults(pool),
            }
        }
    }

    /// Fail when the request would not change anything
    pub fn check_equality_to_update(
        &self,
        cluster_name: &str,
        current: &ProviderRecord,
    ) -> Result<()> {
        let version_changed = self
            .kubernetes_version
            .as_deref()
            .is_some_and(|v| Some(v) != current.kubernetes_version());

        let pools_changed = self
            .node_pools
            .as_deref()
            .is_some_and(|pools| by_name(pools) != by_name(current.node_pools()));

        if !version_changed && !pools_changed {
            return Err(Error::validation_for(
                cluster_name,
                "there is no change in the cluster properties",
            ));
        }
        Ok(())
    }

    /// Validate the request against the variant being updated
    pub fn validate(&self, cluster_name: &str, kind: ClusterKind) -> Result<()> {
        if let Some(version) = &self.kubernetes_version {
            if version.trim().is_empty() {
                return Err(Error::validation_for_field(
                    cluster_name,
                    "kubernetesVersion",
                    "kubernetes version must not be empty",
                ));
            }
        }
        if let Some(pools) = &self.node_pools {
            if !kind.has_node_pools() {
                return Err(Error::validation_for_field(
                    cluster_name,
                    "nodePools",
                    format!("{kind} clusters have no node pools"),
                ));
            }
            validate_node_pools(cluster_name, pools)?;
        }
        Ok(())
    }

    /// Apply the request to a sub-record
    pub fn apply_to(&self, record: &mut ProviderRecord) {
        if let (Some(version), Some(slot)) = (
            self.kubernetes_version.as_ref(),
            record.kubernetes_version_mut(),
        ) {
            *slot = version.clone();
        }
        if let (Some(pools), Some(slot)) = (self.node_pools.as_ref(), record.node_pools_mut()) {
            *slot = pools.clone();
        }
    }
}

/// Request to resize existing node pools
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UpdateNodePoolsRequest {
    /// Desired node count per pool name
    pub node_pools: BTreeMap<String, u32>,
}

impl UpdateNodePoolsRequest {
    /// Fail on unknown pools or counts outside autoscaling bounds
    pub fn validate(&self, cluster_name: &str, pools: &[NodePool]) -> Result<()> {
        if self.node_pools.is_empty() {
            return Err(Error::validation_for(cluster_name, "no node pools to update"));
        }
        for (name, count) in &self.node_pools {
            let pool = pools.iter().find(|p| &p.name == name).ok_or_else(|| {
                Error::validation_for_field(
                    cluster_name,
                    format!("nodePools.{name}"),
                    format!("node pool {name} does not exist"),
                )
            })?;
            if pool.autoscaling && (*count < pool.min_count || *count > pool.max_count) {
                return Err(Error::validation_for_field(
                    cluster_name,
                    format!("nodePools.{name}"),
                    format!(
                        "count {count} is outside the autoscaling range {}..={}",
                        pool.min_count, pool.max_count
                    ),
                ));
            }
        }
        Ok(())
    }

    /// Set the requested counts on the matching pools
    pub fn apply_to(&self, pools: &mut [NodePool]) {
        for pool in pools.iter_mut() {
            if let Some(count) = self.node_pools.get(&pool.name) {
                pool.count = *count;
            }
        }
    }
}

fn by_name(pools: &[NodePool]) -> BTreeMap<&str, &NodePool> {
    pools.iter().map(|p| (p.name.as_str(), p)).collect()
}

fn add_record_defaults(record: &mut ProviderRecord) {
    if let Some(version) = record.kubernetes_version_mut() {
        if version.is_empty() {
            *version = DEFAULT_KUBERNETES_VERSION.to_string();
        }
    }
    if let Some(pools) = record.node_pools_mut() {
        pools.iter_mut().for_each(add_node_pool_defaults);
    }
    if let ProviderRecord::Dummy(dummy) = record {
        if dummy.node_count == 0 {
            dummy.node_count = DEFAULT_NODE_POOL_COUNT;
        }
    }
}

fn add_node_pool_defaults(pool: &mut NodePool) {
    if pool.count == 0 {
        pool.count = DEFAULT_NODE_POOL_COUNT.max(pool.min_count);
    }
    if !pool.autoscaling {
        pool.min_count = pool.count;
        pool.max_count = pool.count;
    } else if pool.max_count == 0 {
        pool.max_count = pool.count;
    }
}

fn validate_node_pools(cluster_name: &str, pools: &[NodePool]) -> Result<()> {
    if pools.is_empty() {
        return Err(Error::validation_for_field(
            cluster_name,
            "nodePools",
            "at least one node pool is required",
        ));
    }

    let mut seen = HashSet::new();
    for pool in pools {
        let field = format!("nodePools.{}", pool.name);
        validate_name(cluster_name, &pool.name, &field)?;
        if !seen.insert(pool.name.as_str()) {
            return Err(Error::validation_for_field(
                cluster_name,
                field,
                format!("duplicate node pool name {}", pool.name),
            ));
        }
        if pool.autoscaling
            && !(pool.min_count <= pool.count && pool.count <= pool.max_count)
        {
            return Err(Error::validation_for_field(
                cluster_name,
                field,
                format!(
                    "autoscaling requires min ({}) <= count ({}) <= max ({})",
                    pool.min_count, pool.count, pool.max_count
                ),
            ));
        }
    }
    Ok(())
}

/// DNS-1123 label: lowercase alphanumerics and '-', alphanumeric at both ends
fn validate_name(cluster_name: &str, name: &str, field: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name.len() <= MAX_NAME_LENGTH
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        && !name.starts_with('-')
        && !name.ends_with('-');

    if !valid {
        return Err(Error::validation_for_field(
            cluster_name,
            field,
            format!(
                "'{name}' must be a DNS-1123 label of at most {MAX_NAME_LENGTH} characters"
            ),
        ));
    }
    Ok(())
}
