//! Imported clusters
//!
//! The cluster already exists; its kubeconfig is supplied in the primary
//! secret. Provisioning and teardown happen outside the platform, so create
//! and delete only track the record.

use async_trait::async_trait;
use tracing::debug;

use super::base::decode_config;
use super::{ClusterOps, ProviderContext};
use crate::model::{
    ClusterKind, Ipv4Cidrs, KubernetesProperties, ProviderRecord, UpdateClusterRequest,
    UpdateNodePoolsRequest,
};
use crate::secret::K8S_CONFIG_KEY;
use crate::{Error, Result};

/// An imported cluster
#[derive(Debug, Clone, Default)]
pub struct KubernetesCluster {
    properties: KubernetesProperties,
}

impl KubernetesCluster {
    /// Wrap a sub-record
    pub fn new(properties: KubernetesProperties) -> Self {
        Self { properties }
    }

    /// Import metadata
    pub fn metadata(&self) -> &std::collections::BTreeMap<String, String> {
        &self.properties.metadata
    }
}

#[async_trait]
impl ClusterOps for KubernetesCluster {
    fn kind(&self) -> ClusterKind {
        ClusterKind::Kubernetes
    }

    fn record(&self) -> ProviderRecord {
        ProviderRecord::Kubernetes(self.properties.clone())
    }

    fn k8s_ipv4_cidrs(&self, cluster_name: &str) -> Result<Ipv4Cidrs> {
        Err(Error::validation_for(
            cluster_name,
            "ipv4 cidrs are unknown for imported clusters",
        ))
    }

    async fn create(&mut self, ctx: &ProviderContext<'_>) -> Result<()> {
        debug!(cluster = %ctx.name(), "imported cluster, nothing to provision");
        Ok(())
    }

    async fn update(
        &mut self,
        ctx: &ProviderContext<'_>,
        _request: &UpdateClusterRequest,
    ) -> Result<()> {
        Err(Error::validation_for(
            ctx.name(),
            "imported clusters cannot be updated",
        ))
    }

    async fn update_node_pools(
        &mut self,
        ctx: &ProviderContext<'_>,
        _request: &UpdateNodePoolsRequest,
    ) -> Result<()> {
        Err(Error::validation_for(
            ctx.name(),
            "imported clusters have no node pools",
        ))
    }

    async fn delete(&self, ctx: &ProviderContext<'_>) -> Result<()> {
        debug!(cluster = %ctx.name(), "imported cluster, nothing to deprovision");
        Ok(())
    }

    async fn download_k8s_config(&self, ctx: &ProviderContext<'_>) -> Result<Vec<u8>> {
        let secret = ctx.secret().await?;
        secret
            .required_value(K8S_CONFIG_KEY)
            .and_then(decode_config)
            .map_err(|e| Error::in_cluster(ctx.name(), e))
    }

    async fn is_ready(&self, ctx: &ProviderContext<'_>) -> Result<bool> {
        match ctx.config().await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_ready() => Ok(false),
            Err(e) => Err(e),
        }
    }
}
