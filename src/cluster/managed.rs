//! Provider-managed cluster variants
//!
//! ACK, EKS, AKS, GKE, OKE and the self-managed distribution all follow the
//! same lifecycle: build a [`ProvisionSpec`] from the sub-record, hand it to
//! the provider client, and commit the sub-record only once the provider
//! accepted the change. What differs per provider lives in
//! [`ManagedProperties`].

use async_trait::async_trait;
use tracing::{info, warn};

use super::{ClusterOps, ProviderContext};
use crate::model::{ClusterKind, Ipv4Cidrs, NodePool, ProviderRecord};
use crate::model::{UpdateClusterRequest, UpdateNodePoolsRequest};
use crate::provider::{ProvisionSpec, RemoteClusterState};
use crate::{Error, Result};

/// Provider-specific part of a managed cluster
pub trait ManagedProperties: Clone + Send + Sync + 'static {
    /// The variant these properties belong to
    const KIND: ClusterKind;

    /// Whether node bootstrapping needs the cluster's SSH public key
    const REQUIRES_SSH_PUBLIC_KEY: bool = false;

    /// Wrap into the persisted sub-record
    fn into_record(self) -> ProviderRecord;

    /// Kubernetes version
    fn kubernetes_version(&self) -> &str;

    /// Kubernetes version slot
    fn kubernetes_version_mut(&mut self) -> &mut String;

    /// Node pools
    fn node_pools(&self) -> &[NodePool];

    /// Node pools slot
    fn node_pools_mut(&mut self) -> &mut Vec<NodePool>;

    /// Provider parameters passed through to the client
    fn parameters(&self) -> serde_json::Value;

    /// Service and pod CIDR ranges
    fn ipv4_cidrs(&self, cluster_name: &str) -> Result<Ipv4Cidrs> {
        Err(Error::validation_for(
            cluster_name,
            format!("ipv4 cidrs are not tracked for {} clusters", Self::KIND),
        ))
    }
}

/// A cluster whose control plane is run by a provider
#[derive(Debug, Clone)]
pub struct ManagedCluster<P> {
    properties: P,
}

impl<P> ManagedCluster<P> {
    /// Wrap a sub-record
    pub fn new(properties: P) -> Self {
        Self { properties }
    }

    /// The sub-record
    pub fn properties(&self) -> &P {
        &self.properties
    }
}

impl<P: ManagedProperties> ManagedCluster<P> {
    async fn provision_spec(
        &self,
        ctx: &ProviderContext<'_>,
        properties: &P,
    ) -> Result<ProvisionSpec> {
        let ssh_public_key = if P::REQUIRES_SSH_PUBLIC_KEY {
            Some(ctx.ssh_public_key().await?)
        } else {
            None
        };

        Ok(ProvisionSpec {
            name: ctx.name().to_string(),
            location: ctx.location().to_string(),
            kubernetes_version: properties.kubernetes_version().to_string(),
            node_pools: properties.node_pools().to_vec(),
            parameters: properties.parameters(),
            ssh_public_key,
        })
    }

    /// Push `next` to the provider and adopt it once accepted
    async fn apply(&mut self, ctx: &ProviderContext<'_>, next: P) -> Result<()> {
        let client = ctx.client(P::KIND).await?;
        let spec = self.provision_spec(ctx, &next).await?;
        client
            .update_cluster(&spec)
            .await
            .map_err(|e| Error::in_cluster(ctx.name(), e))?;
        self.properties = next;
        Ok(())
    }
}

#[async_trait]
impl<P: ManagedProperties> ClusterOps for ManagedCluster<P> {
    fn kind(&self) -> ClusterKind {
        P::KIND
    }

    fn record(&self) -> ProviderRecord {
        self.properties.clone().into_record()
    }

    fn requires_ssh_public_key(&self) -> bool {
        P::REQUIRES_SSH_PUBLIC_KEY
    }

    fn k8s_ipv4_cidrs(&self, cluster_name: &str) -> Result<Ipv4Cidrs> {
        self.properties.ipv4_cidrs(cluster_name)
    }

    async fn create(&mut self, ctx: &ProviderContext<'_>) -> Result<()> {
        let client = ctx.client(P::KIND).await?;
        let spec = self.provision_spec(ctx, &self.properties).await?;

        match client.create_cluster(&spec).await {
            Ok(()) => {
                info!(cluster = %ctx.name(), kind = %P::KIND, "provider cluster created");
                Ok(())
            }
            Err(e) if e.is_already_exists() => {
                info!(cluster = %ctx.name(), kind = %P::KIND, "provider cluster already exists");
                Ok(())
            }
            Err(e) => Err(Error::in_cluster(ctx.name(), e)),
        }
    }

    async fn update(
        &mut self,
        ctx: &ProviderContext<'_>,
        request: &UpdateClusterRequest,
    ) -> Result<()> {
        request.validate(ctx.name(), P::KIND)?;

        let mut next = self.properties.clone();
        if let Some(version) = &request.kubernetes_version {
            *next.kubernetes_version_mut() = version.clone();
        }
        if let Some(pools) = &request.node_pools {
            *next.node_pools_mut() = pools.clone();
        }
        self.apply(ctx, next).await
    }

    async fn update_node_pools(
        &mut self,
        ctx: &ProviderContext<'_>,
        request: &UpdateNodePoolsRequest,
    ) -> Result<()> {
        request.validate(ctx.name(), self.properties.node_pools())?;

        let mut next = self.properties.clone();
        request.apply_to(next.node_pools_mut());
        self.apply(ctx, next).await
    }

    async fn delete(&self, ctx: &ProviderContext<'_>) -> Result<()> {
        let client = ctx.client(P::KIND).await?;
        match client.delete_cluster(ctx.name(), ctx.location()).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => {
                warn!(cluster = %ctx.name(), kind = %P::KIND, "provider cluster already gone");
                Ok(())
            }
            Err(e) => Err(Error::in_cluster(ctx.name(), e)),
        }
    }

    async fn download_k8s_config(&self, ctx: &ProviderContext<'_>) -> Result<Vec<u8>> {
        let client = ctx.client(P::KIND).await?;
        client
            .kubeconfig(ctx.name(), ctx.location())
            .await
            .map_err(|e| Error::in_cluster(ctx.name(), e))
    }

    async fn is_ready(&self, ctx: &ProviderContext<'_>) -> Result<bool> {
        let client = ctx.client(P::KIND).await?;
        let state = client
            .cluster_state(ctx.name(), ctx.location())
            .await
            .map_err(|e| Error::in_cluster(ctx.name(), e))?;
        Ok(state == RemoteClusterState::Running)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::test_support::*;
    use crate::cluster::{ClusterBase, ClusterVariant, ProviderContext};
    use crate::model::GkeProperties;
    use crate::provider::{MockManagedKubernetes, MockProviderClientFactory};
    use crate::secret::SecretType;
    use std::sync::Arc;

    fn gke() -> GkeProperties {
        GkeProperties {
            project_id: "acme".to_string(),
            kubernetes_version: "1.29".to_string(),
            node_pools: vec![NodePool {
                name: "pool1".to_string(),
                instance_type: "n2-standard-2".to_string(),
                count: 2,
                min_count: 1,
                max_count: 5,
                autoscaling: true,
                ..Default::default()
            }],
        }
    }

    fn with_client(client: MockManagedKubernetes) -> Fixture {
        let client: Arc<dyn crate::provider::ManagedKubernetes> = Arc::new(client);
        let mut providers = MockProviderClientFactory::new();
        providers
            .expect_client()
            .returning(move |_, _| Ok(client.clone()));
        let f = fixture_with(providers);
        f.secrets.insert(secret("primary", SecretType::Google, &[]));
        f
    }

    fn managed() -> (ClusterBase, ManagedCluster<GkeProperties>) {
        (
            ClusterBase::new(model("google", "")),
            ManagedCluster::new(gke()),
        )
    }

    /// Story: re-running create after a partial attempt succeeds
    #[tokio::test]
    async fn story_create_tolerates_existing_cluster() {
        let mut client = MockManagedKubernetes::new();
        client
            .expect_create_cluster()
            .times(1)
            .returning(|spec| Err(Error::already_exists("cluster", spec.name.clone())));
        let f = with_client(client);
        let (base, mut cluster) = managed();

        let ctx = ProviderContext::new(&base, &f.clients);
        cluster.create(&ctx).await.unwrap();
    }

    #[tokio::test]
    async fn test_create_passes_properties_to_provider() {
        let mut client = MockManagedKubernetes::new();
        client
            .expect_create_cluster()
            .withf(|spec| {
                spec.kubernetes_version == "1.29"
                    && spec.node_pools.len() == 1
                    && spec.parameters["projectId"] == "acme"
                    && spec.ssh_public_key.is_none()
            })
            .times(1)
            .returning(|_| Ok(()));
        let f = with_client(client);
        let (base, mut cluster) = managed();

        let ctx = ProviderContext::new(&base, &f.clients);
        cluster.create(&ctx).await.unwrap();
    }

    /// Story: a rejected update leaves the sub-record untouched
    #[tokio::test]
    async fn story_failed_update_does_not_commit() {
        let mut client = MockManagedKubernetes::new();
        client
            .expect_update_cluster()
            .times(1)
            .returning(|_| Err(Error::provider_for("demo", "gke", "quota exceeded")));
        let f = with_client(client);
        let (base, mut cluster) = managed();

        let request = UpdateClusterRequest {
            kubernetes_version: Some("1.30".to_string()),
            node_pools: None,
        };
        let ctx = ProviderContext::new(&base, &f.clients);
        let err = cluster.update(&ctx, &request).await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(cluster.properties().kubernetes_version, "1.29");
    }

    #[tokio::test]
    async fn test_update_node_pools_commits_on_success() {
        let mut client = MockManagedKubernetes::new();
        client
            .expect_update_cluster()
            .withf(|spec| spec.node_pools[0].count == 4)
            .times(1)
            .returning(|_| Ok(()));
        let f = with_client(client);
        let (base, mut cluster) = managed();

        let request = UpdateNodePoolsRequest {
            node_pools: [("pool1".to_string(), 4)].into_iter().collect(),
        };
        let ctx = ProviderContext::new(&base, &f.clients);
        cluster.update_node_pools(&ctx, &request).await.unwrap();
        assert_eq!(cluster.properties().node_pools[0].count, 4);
    }

    #[tokio::test]
    async fn test_update_node_pools_rejects_out_of_range_without_provider_call() {
        let f = with_client(MockManagedKubernetes::new());
        let (base, mut cluster) = managed();

        let request = UpdateNodePoolsRequest {
            node_pools: [("pool1".to_string(), 9)].into_iter().collect(),
        };
        let ctx = ProviderContext::new(&base, &f.clients);
        assert!(matches!(
            cluster.update_node_pools(&ctx, &request).await,
            Err(Error::Validation { .. })
        ));
    }

    #[tokio::test]
    async fn test_delete_tolerates_missing_cluster() {
        let mut client = MockManagedKubernetes::new();
        client
            .expect_delete_cluster()
            .times(1)
            .returning(|name, _| Err(Error::record_not_found("cluster", name)));
        let f = with_client(client);
        let (base, cluster) = managed();

        let ctx = ProviderContext::new(&base, &f.clients);
        cluster.delete(&ctx).await.unwrap();
    }

    #[tokio::test]
    async fn test_is_ready_follows_remote_state() {
        let mut client = MockManagedKubernetes::new();
        let mut seq = mockall::Sequence::new();
        client
            .expect_cluster_state()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(RemoteClusterState::Provisioning));
        client
            .expect_cluster_state()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(RemoteClusterState::Running));
        let f = with_client(client);
        let (base, cluster) = managed();

        let ctx = ProviderContext::new(&base, &f.clients);
        assert!(!cluster.is_ready(&ctx).await.unwrap());
        assert!(cluster.is_ready(&ctx).await.unwrap());
    }

    #[tokio::test]
    async fn test_wrong_secret_type_never_reaches_provider() {
        let f = fixture();
        f.secrets.insert(secret("primary", SecretType::Amazon, &[]));
        let base = ClusterBase::new(model("google", ""));
        let cluster = ClusterVariant::from_record(gke().into_record());

        let ctx = ProviderContext::new(&base, &f.clients);
        let err = cluster.ops().download_k8s_config(&ctx).await.unwrap_err();
        assert!(matches!(err.root(), Error::SecretTypeMismatch { .. }));
    }
}
