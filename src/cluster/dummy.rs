//! Dummy clusters
//!
//! No provider behind them. They report a canned kubeconfig and node list
//! and are always ready; useful for exercising flows end to end.

use async_trait::async_trait;

use super::{ClusterOps, ProviderContext};
use crate::model::{
    ClusterKind, DummyProperties, Ipv4Cidrs, NodeNames, ProviderRecord, UpdateClusterRequest,
    UpdateNodePoolsRequest,
};
use crate::{Error, Result};

const DUMMY_SERVER: &str = "https://127.0.0.1:6443";
const DUMMY_POOL: &str = "default";

/// A dummy cluster
#[derive(Debug, Clone, Default)]
pub struct DummyCluster {
    properties: DummyProperties,
}

impl DummyCluster {
    /// Wrap a sub-record
    pub fn new(properties: DummyProperties) -> Self {
        Self { properties }
    }

    /// The sub-record
    pub fn properties(&self) -> &DummyProperties {
        &self.properties
    }
}

fn kubeconfig(cluster_name: &str) -> String {
    format!(
        "apiVersion: v1
kind: Config
current-context: {cluster_name}
clusters:
  - name: {cluster_name}
    cluster:
      server: {DUMMY_SERVER}
contexts:
  - name: {cluster_name}
    context:
      cluster: {cluster_name}
      user: {cluster_name}-admin
users:
  - name: {cluster_name}-admin
    user:
      token: dummy
"
    )
}

#[async_trait]
impl ClusterOps for DummyCluster {
    fn kind(&self) -> ClusterKind {
        ClusterKind::Dummy
    }

    fn record(&self) -> ProviderRecord {
        ProviderRecord::Dummy(self.properties.clone())
    }

    fn rbac_enabled(&self) -> bool {
        false
    }

    fn k8s_ipv4_cidrs(&self, _cluster_name: &str) -> Result<Ipv4Cidrs> {
        Ok(Ipv4Cidrs {
            service_cluster_ip_ranges: vec!["10.96.0.0/12".to_string()],
            pod_ip_ranges: vec!["10.244.0.0/16".to_string()],
        })
    }

    async fn create(&mut self, _ctx: &ProviderContext<'_>) -> Result<()> {
        Ok(())
    }

    async fn update(
        &mut self,
        ctx: &ProviderContext<'_>,
        request: &UpdateClusterRequest,
    ) -> Result<()> {
        request.validate(ctx.name(), ClusterKind::Dummy)?;
        if let Some(version) = &request.kubernetes_version {
            self.properties.kubernetes_version = version.clone();
        }
        Ok(())
    }

    async fn update_node_pools(
        &mut self,
        ctx: &ProviderContext<'_>,
        _request: &UpdateNodePoolsRequest,
    ) -> Result<()> {
        Err(Error::validation_for(
            ctx.name(),
            "dummy clusters have no node pools",
        ))
    }

    async fn delete(&self, _ctx: &ProviderContext<'_>) -> Result<()> {
        Ok(())
    }

    async fn download_k8s_config(&self, ctx: &ProviderContext<'_>) -> Result<Vec<u8>> {
        Ok(kubeconfig(ctx.name()).into_bytes())
    }

    async fn is_ready(&self, _ctx: &ProviderContext<'_>) -> Result<bool> {
        Ok(true)
    }

    async fn list_node_names(&self, ctx: &ProviderContext<'_>) -> Result<NodeNames> {
        let nodes = (1..=self.properties.node_count)
            .map(|i| format!("{}-node-{i}", ctx.name()))
            .collect();
        Ok(NodeNames::from([(DUMMY_POOL.to_string(), nodes)]))
    }
}
