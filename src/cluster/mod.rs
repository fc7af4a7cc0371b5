//! Cluster entity
//!
//! A [`Cluster`] is a [`ClusterBase`] (row + lazily resolved secrets and
//! kubeconfig) plus one [`ClusterVariant`], the closed set of provider
//! implementations. All variants implement the full [`ClusterOps`]
//! capability set; they differ only in how lifecycle operations map onto
//! their provider.
//!
//! Entities are built by [`ClusterFactory`], either from a creation request
//! or from a persisted row.
//!
//! # Example
//!
//! ```ignore
//! let factory = ClusterFactory::new(clients);
//! let mut cluster = factory.from_request(request, org_id, user_id)?;
//! cluster.persist(ClusterStatus::Creating, "Cluster creation is in progress").await?;
//! cluster.create().await?;
//! cluster.update_status(ClusterStatus::Running, "Cluster is running").await?;
//! ```

mod ack;
mod aks;
pub mod base;
pub mod cleanup;
mod config_store;
pub mod creator;
mod dummy;
mod eks;
pub mod factory;
mod gke;
mod kubernetes;
pub mod kubeconfig;
pub mod managed;
mod oke;
mod pke;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, info};

pub use base::ClusterBase;
pub use config_store::config_secret_name;
pub use dummy::DummyCluster;
pub use factory::ClusterFactory;
pub use kubeconfig::{KubeNodeLister, NodeLister};
pub use kubernetes::KubernetesCluster;
pub use managed::{ManagedCluster, ManagedProperties};

use crate::model::{
    AckProperties, AksProperties, ClusterKind, ClusterModel, ClusterStatus,
    ClusterStatusResponse, EksProperties, GkeProperties, Ipv4Cidrs, NodeNames, OkeProperties,
    PkeProperties, ProviderRecord, UpdateClusterRequest, UpdateNodePoolsRequest,
};
use crate::provider::{ManagedKubernetes, ProviderClientFactory};
use crate::repository::ClusterRepository;
use crate::secret::{SecretItem, SecretStore, SSH_PUBLIC_KEY_KEY};
use crate::{Error, Result};

/// Collaborators injected into every cluster entity
#[derive(Clone)]
pub struct ClusterClients {
    /// Secret store
    pub secrets: Arc<dyn SecretStore>,
    /// Persistence layer
    pub repository: Arc<dyn ClusterRepository>,
    /// Provider client construction
    pub providers: Arc<dyn ProviderClientFactory>,
    /// Node listing through the Kubernetes API
    pub nodes: Arc<dyn NodeLister>,
}

impl ClusterClients {
    /// Create the collaborator set, listing nodes through the Kubernetes API
    pub fn new(
        secrets: Arc<dyn SecretStore>,
        repository: Arc<dyn ClusterRepository>,
        providers: Arc<dyn ProviderClientFactory>,
    ) -> Self {
        Self {
            secrets,
            repository,
            providers,
            nodes: Arc::new(KubeNodeLister),
        }
    }

    /// Replace the node lister
    pub fn with_node_lister(mut self, nodes: Arc<dyn NodeLister>) -> Self {
        self.nodes = nodes;
        self
    }
}

/// What a variant sees of its cluster while running a lifecycle operation
pub struct ProviderContext<'a> {
    base: &'a ClusterBase,
    clients: &'a ClusterClients,
}

impl<'a> ProviderContext<'a> {
    /// Borrow a cluster's base and collaborators
    pub fn new(base: &'a ClusterBase, clients: &'a ClusterClients) -> Self {
        Self { base, clients }
    }

    /// Cluster name
    pub fn name(&self) -> &'a str {
        &self.base.model().name
    }

    /// Cluster location
    pub fn location(&self) -> &'a str {
        &self.base.model().location
    }

    /// Validated primary secret
    pub async fn secret(&self) -> Result<&'a SecretItem> {
        self.base.secret(self.clients.secrets.as_ref()).await
    }

    /// SSH public key from the validated SSH secret
    pub async fn ssh_public_key(&self) -> Result<String> {
        let ssh = self.base.ssh_secret(self.clients.secrets.as_ref()).await?;
        ssh.required_value(SSH_PUBLIC_KEY_KEY)
            .map(str::to_string)
            .map_err(|e| Error::in_cluster(self.name(), e))
    }

    /// Decoded kubeconfig
    pub async fn config(&self) -> Result<&'a [u8]> {
        self.base.config(self.clients.secrets.as_ref()).await
    }

    /// Provider client built from the primary secret
    pub async fn client(&self, kind: ClusterKind) -> Result<Arc<dyn ManagedKubernetes>> {
        let secret = self.secret().await?;
        self.clients
            .providers
            .client(kind, secret)
            .map_err(|e| Error::in_cluster(self.name(), e))
    }

    /// Node lister
    pub fn nodes(&self) -> &'a dyn NodeLister {
        self.clients.nodes.as_ref()
    }
}

/// Capability set every cluster variant implements
#[async_trait]
pub trait ClusterOps: Send + Sync {
    /// The variant
    fn kind(&self) -> ClusterKind;

    /// Snapshot of the provider sub-record
    fn record(&self) -> ProviderRecord;

    /// Whether bootstrapping needs an SSH public key
    fn requires_ssh_public_key(&self) -> bool {
        false
    }

    /// Whether the cluster enforces RBAC
    fn rbac_enabled(&self) -> bool {
        true
    }

    /// Whether deploying platform components needs cluster-admin rights
    fn need_admin_rights(&self) -> bool {
        false
    }

    /// Service and pod CIDR ranges
    fn k8s_ipv4_cidrs(&self, cluster_name: &str) -> Result<Ipv4Cidrs>;

    /// Provision the cluster; repeating it after a partial attempt must succeed
    async fn create(&mut self, ctx: &ProviderContext<'_>) -> Result<()>;

    /// Apply a version / node pool change
    async fn update(&mut self, ctx: &ProviderContext<'_>, request: &UpdateClusterRequest)
        -> Result<()>;

    /// Resize node pools
    async fn update_node_pools(
        &mut self,
        ctx: &ProviderContext<'_>,
        request: &UpdateNodePoolsRequest,
    ) -> Result<()>;

    /// Deprovision the cluster; an already-gone cluster is success
    async fn delete(&self, ctx: &ProviderContext<'_>) -> Result<()>;

    /// Fetch a fresh admin kubeconfig
    async fn download_k8s_config(&self, ctx: &ProviderContext<'_>) -> Result<Vec<u8>>;

    /// Whether the cluster serves requests
    async fn is_ready(&self, ctx: &ProviderContext<'_>) -> Result<bool>;

    /// Node names grouped by pool
    async fn list_node_names(&self, ctx: &ProviderContext<'_>) -> Result<NodeNames> {
        let config = ctx.config().await?;
        let nodes = ctx.nodes().list_nodes(config).await?;
        Ok(kubeconfig::group_node_names(&nodes))
    }
}

/// The closed set of cluster variants
pub enum ClusterVariant {
    /// Alibaba ACK
    Ack(ManagedCluster<AckProperties>),
    /// Amazon EKS
    Eks(ManagedCluster<EksProperties>),
    /// Azure AKS
    Aks(ManagedCluster<AksProperties>),
    /// Google GKE
    Gke(ManagedCluster<GkeProperties>),
    /// Oracle OKE
    Oke(ManagedCluster<OkeProperties>),
    /// Imported cluster
    Kubernetes(KubernetesCluster),
    /// Dummy cluster
    Dummy(DummyCluster),
    /// Self-managed distribution on Amazon
    Pke(ManagedCluster<PkeProperties>),
}

impl ClusterVariant {
    /// Build the variant owning a sub-record
    pub fn from_record(record: ProviderRecord) -> Self {
        match record {
            ProviderRecord::Ack(p) => Self::Ack(ManagedCluster::new(p)),
            ProviderRecord::Eks(p) => Self::Eks(ManagedCluster::new(p)),
            ProviderRecord::Aks(p) => Self::Aks(ManagedCluster::new(p)),
            ProviderRecord::Gke(p) => Self::Gke(ManagedCluster::new(p)),
            ProviderRecord::Oke(p) => Self::Oke(ManagedCluster::new(p)),
            ProviderRecord::Kubernetes(p) => Self::Kubernetes(KubernetesCluster::new(p)),
            ProviderRecord::Dummy(p) => Self::Dummy(DummyCluster::new(p)),
            ProviderRecord::Pke(p) => Self::Pke(ManagedCluster::new(p)),
        }
    }

    /// The variant's capability set
    pub fn ops(&self) -> &dyn ClusterOps {
        match self {
            Self::Ack(c) => c,
            Self::Eks(c) => c,
            Self::Aks(c) => c,
            Self::Gke(c) => c,
            Self::Oke(c) => c,
            Self::Kubernetes(c) => c,
            Self::Dummy(c) => c,
            Self::Pke(c) => c,
        }
    }

    fn ops_mut(&mut self) -> &mut dyn ClusterOps {
        match self {
            Self::Ack(c) => c,
            Self::Eks(c) => c,
            Self::Aks(c) => c,
            Self::Gke(c) => c,
            Self::Oke(c) => c,
            Self::Kubernetes(c) => c,
            Self::Dummy(c) => c,
            Self::Pke(c) => c,
        }
    }

    /// The variant's kind
    pub fn kind(&self) -> ClusterKind {
        self.ops().kind()
    }
}

/// A cluster entity
pub struct Cluster {
    base: ClusterBase,
    variant: ClusterVariant,
    clients: ClusterClients,
}

impl Cluster {
    /// Pair a row with its variant; the variant must match the row's tags
    pub(crate) fn new(
        model: ClusterModel,
        variant: ClusterVariant,
        clients: ClusterClients,
    ) -> Result<Self> {
        let expected = model.kind()?;
        if variant.kind() != expected {
            return Err(Error::internal_with_context(
                "cluster",
                format!(
                    "{} cluster {} cannot hold a {} sub-record",
                    expected,
                    model.name,
                    variant.kind()
                ),
            ));
        }
        Ok(Self {
            base: ClusterBase::new(model),
            variant,
            clients,
        })
    }

    // =========================================================================
    // Identity
    // =========================================================================

    /// Numeric id; 0 until persisted
    pub fn id(&self) -> u64 {
        self.base.model().id
    }

    /// Stable unique id
    pub fn uid(&self) -> &str {
        &self.base.model().uid
    }

    /// Owning organization
    pub fn organization_id(&self) -> u64 {
        self.base.model().organization_id
    }

    /// Cluster name
    pub fn name(&self) -> &str {
        &self.base.model().name
    }

    /// Provider tag
    pub fn cloud(&self) -> &str {
        &self.base.model().cloud
    }

    /// Distribution tag
    pub fn distribution(&self) -> &str {
        &self.base.model().distribution
    }

    /// Location
    pub fn location(&self) -> &str {
        &self.base.model().location
    }

    /// Creating user
    pub fn created_by(&self) -> u64 {
        self.base.model().created_by
    }

    /// Creation time
    pub fn created_at(&self) -> DateTime<Utc> {
        self.base.model().created_at
    }

    /// The variant
    pub fn kind(&self) -> ClusterKind {
        self.variant.kind()
    }

    /// The variant, for provider-specific access
    pub fn variant(&self) -> &ClusterVariant {
        &self.variant
    }

    /// Lifecycle status
    pub fn status(&self) -> ClusterStatus {
        self.base.model().status
    }

    /// The cluster row
    pub fn model(&self) -> &ClusterModel {
        self.base.model()
    }

    /// Snapshot of the provider sub-record
    pub fn provider_record(&self) -> ProviderRecord {
        self.variant.ops().record()
    }

    // =========================================================================
    // Secrets
    // =========================================================================

    /// Primary secret id
    pub fn secret_id(&self) -> &str {
        &self.base.model().secret_id
    }

    /// SSH secret id
    pub fn ssh_secret_id(&self) -> &str {
        &self.base.model().ssh_secret_id
    }

    /// Kubeconfig secret id; empty until provisioned
    pub fn config_secret_id(&self) -> &str {
        &self.base.model().config_secret_id
    }

    /// Primary secret, type-checked against the provider tag
    pub async fn secret_with_validation(&self) -> Result<&SecretItem> {
        self.base.secret(self.clients.secrets.as_ref()).await
    }

    /// SSH secret, type-checked as an SSH key
    pub async fn ssh_secret(&self) -> Result<&SecretItem> {
        self.base.ssh_secret(self.clients.secrets.as_ref()).await
    }

    /// Record a new SSH secret id
    ///
    /// A changed id drops the cached ssh secret.
    pub async fn save_ssh_secret_id(&mut self, secret_id: &str) -> Result<()> {
        if self.base.model().ssh_secret_id != secret_id {
            self.base.model_mut().ssh_secret_id = secret_id.to_string();
            self.base.reset_ssh_secret();
        }
        self.save_row().await
    }

    /// Record a new kubeconfig secret id
    ///
    /// A changed id drops the cached kubeconfig.
    pub async fn save_config_secret_id(&mut self, secret_id: &str) -> Result<()> {
        if self.base.model().config_secret_id != secret_id {
            self.base.model_mut().config_secret_id = secret_id.to_string();
            self.base.reset_config();
        }
        self.save_row().await
    }

    /// Drop cached secrets and kubeconfig
    pub fn invalidate_caches(&mut self) {
        self.base.invalidate_caches();
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    /// Persist row and sub-record: insert on first call, overwrite afterwards
    pub async fn persist(&mut self, status: ClusterStatus, message: &str) -> Result<()> {
        {
            let model = self.base.model_mut();
            model.status = status;
            model.status_message = message.to_string();
        }

        let record = self.variant.ops().record();
        let repository = &self.clients.repository;

        if self.base.model().is_persisted() {
            repository.save(self.base.model()).await?;
            repository
                .save_provider_record(self.id(), &record)
                .await?;
        } else {
            let id = repository.insert(self.base.model(), &record).await?;
            self.base.model_mut().id = id;
            info!(cluster = %self.name(), cluster_id = id, kind = %self.kind(), "cluster persisted");
        }
        Ok(())
    }

    /// Change the status, persisting the row
    pub async fn update_status(&mut self, status: ClusterStatus, message: &str) -> Result<()> {
        if !self.base.model().is_persisted() {
            return self.persist(status, message).await;
        }
        {
            let model = self.base.model_mut();
            model.status = status;
            model.status_message = message.to_string();
        }
        debug!(cluster = %self.name(), status = %status, "cluster status updated");
        self.save_row().await
    }

    /// Delete the row and its sub-record
    pub async fn delete_from_database(&mut self) -> Result<()> {
        if !self.base.model().is_persisted() {
            return Ok(());
        }
        self.clients.repository.delete(self.id()).await?;
        info!(cluster = %self.name(), cluster_id = self.id(), "cluster removed from database");
        self.base.model_mut().id = 0;
        Ok(())
    }

    async fn save_row(&self) -> Result<()> {
        if self.base.model().is_persisted() {
            self.clients.repository.save(self.base.model()).await?;
        }
        Ok(())
    }

    async fn save_provider_record(&self) -> Result<()> {
        if self.base.model().is_persisted() {
            self.clients
                .repository
                .save_provider_record(self.id(), &self.variant.ops().record())
                .await?;
        }
        Ok(())
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Provision the cluster, then store its kubeconfig
    ///
    /// The cluster must be persisted first: the kubeconfig secret is keyed by
    /// the cluster id.
    pub async fn create(&mut self) -> Result<()> {
        if !self.base.model().is_persisted() {
            return Err(Error::validation_for(
                self.name(),
                "cluster must be persisted before it is created",
            ));
        }

        info!(cluster = %self.name(), kind = %self.kind(), "creating cluster");
        let config = {
            let ctx = ProviderContext::new(&self.base, &self.clients);
            self.variant.ops_mut().create(&ctx).await?;
            self.variant.ops().download_k8s_config(&ctx).await?
        };
        self.store_kubernetes_config(&config).await?;
        self.save_provider_record().await
    }

    /// Fill unset fields of an update from the current sub-record
    pub fn add_defaults_to_update(&self, request: &mut UpdateClusterRequest) {
        request.add_defaults_to_update(&self.provider_record());
    }

    /// Fail when an update would not change anything
    pub fn check_equality_to_update(&self, request: &UpdateClusterRequest) -> Result<()> {
        request.check_equality_to_update(self.name(), &self.provider_record())
    }

    /// Apply a version / node pool change and persist the sub-record
    pub async fn update(&mut self, request: &UpdateClusterRequest) -> Result<()> {
        info!(cluster = %self.name(), "updating cluster");
        {
            let ctx = ProviderContext::new(&self.base, &self.clients);
            self.variant.ops_mut().update(&ctx, request).await?;
        }
        self.save_provider_record().await
    }

    /// Resize node pools and persist the sub-record
    pub async fn update_node_pools(&mut self, request: &UpdateNodePoolsRequest) -> Result<()> {
        info!(cluster = %self.name(), pools = request.node_pools.len(), "resizing node pools");
        {
            let ctx = ProviderContext::new(&self.base, &self.clients);
            self.variant.ops_mut().update_node_pools(&ctx, request).await?;
        }
        self.save_provider_record().await
    }

    /// Deprovision the cluster
    pub async fn delete(&self) -> Result<()> {
        info!(cluster = %self.name(), kind = %self.kind(), "deleting cluster");
        let ctx = ProviderContext::new(&self.base, &self.clients);
        self.variant.ops().delete(&ctx).await
    }

    // =========================================================================
    // Kubernetes
    // =========================================================================

    /// Fetch a fresh kubeconfig from the provider
    pub async fn download_k8s_config(&self) -> Result<Vec<u8>> {
        let ctx = ProviderContext::new(&self.base, &self.clients);
        self.variant.ops().download_k8s_config(&ctx).await
    }

    /// Stored kubeconfig (cached)
    pub async fn k8s_config(&self) -> Result<&[u8]> {
        self.base.config(self.clients.secrets.as_ref()).await
    }

    /// API server URL from the stored kubeconfig
    pub async fn api_endpoint(&self) -> Result<String> {
        let config = self.k8s_config().await?;
        kubeconfig::api_endpoint(config).map_err(|e| Error::in_cluster(self.name(), e))
    }

    /// Service and pod CIDR ranges
    pub fn k8s_ipv4_cidrs(&self) -> Result<Ipv4Cidrs> {
        self.variant.ops().k8s_ipv4_cidrs(self.name())
    }

    /// Whether bootstrapping needs an SSH public key
    pub fn requires_ssh_public_key(&self) -> bool {
        self.variant.ops().requires_ssh_public_key()
    }

    /// Whether the cluster enforces RBAC
    pub fn rbac_enabled(&self) -> bool {
        self.variant.ops().rbac_enabled()
    }

    /// Whether deploying platform components needs cluster-admin rights
    pub fn need_admin_rights(&self) -> bool {
        self.variant.ops().need_admin_rights()
    }

    // =========================================================================
    // Cluster info
    // =========================================================================

    /// Status summary
    pub fn status_response(&self) -> ClusterStatusResponse {
        let model = self.base.model();
        let record = self.provider_record();
        let node_pools: BTreeMap<String, _> = record
            .node_pools()
            .iter()
            .map(|pool| (pool.name.clone(), pool.clone()))
            .collect();

        ClusterStatusResponse {
            id: model.id,
            uid: model.uid.clone(),
            name: model.name.clone(),
            status: model.status,
            status_message: model.status_message.clone(),
            cloud: model.cloud.clone(),
            distribution: model.distribution.clone(),
            location: model.location.clone(),
            version: record.kubernetes_version().map(str::to_string),
            node_pools,
            flags: model.flags,
            created_at: model.created_at,
            creator_id: model.created_by,
        }
    }

    /// Whether the cluster serves requests
    pub async fn is_ready(&self) -> Result<bool> {
        let ctx = ProviderContext::new(&self.base, &self.clients);
        self.variant.ops().is_ready(&ctx).await
    }

    /// Node names grouped by pool
    pub async fn list_node_names(&self) -> Result<NodeNames> {
        let ctx = ProviderContext::new(&self.base, &self.clients);
        self.variant.ops().list_node_names(&ctx).await
    }

    /// Whether a node pool of that name exists
    pub fn node_pool_exists(&self, name: &str) -> bool {
        self.provider_record()
            .node_pools()
            .iter()
            .any(|pool| pool.name == name)
    }

    // =========================================================================
    // Feature flags (persisted with the next persist/update_status)
    // =========================================================================

    /// Security scan enabled
    pub fn security_scan(&self) -> bool {
        self.base.model().flags.security_scan
    }

    /// Enable or disable security scan
    pub fn set_security_scan(&mut self, enabled: bool) {
        self.base.model_mut().flags.security_scan = enabled;
    }

    /// Logging enabled
    pub fn logging(&self) -> bool {
        self.base.model().flags.logging
    }

    /// Enable or disable logging
    pub fn set_logging(&mut self, enabled: bool) {
        self.base.model_mut().flags.logging = enabled;
    }

    /// Monitoring enabled
    pub fn monitoring(&self) -> bool {
        self.base.model().flags.monitoring
    }

    /// Enable or disable monitoring
    pub fn set_monitoring(&mut self, enabled: bool) {
        self.base.model_mut().flags.monitoring = enabled;
    }

    /// Service mesh enabled
    pub fn service_mesh(&self) -> bool {
        self.base.model().flags.service_mesh
    }

    /// Enable or disable service mesh
    pub fn set_service_mesh(&mut self, enabled: bool) {
        self.base.model_mut().flags.service_mesh = enabled;
    }
}

impl std::fmt::Debug for Cluster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cluster")
            .field("id", &self.id())
            .field("name", &self.name())
            .field("kind", &self.kind())
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    //! Shared fixtures for cluster tests

    use super::*;
    use crate::model::{CreateClusterRequest, FeatureFlags};
    use crate::provider::MockProviderClientFactory;
    use crate::repository::InMemoryClusterRepository;
    use crate::secret::memory::InMemorySecretStore;
    use crate::secret::SecretType;
    use std::collections::HashMap;

    pub(crate) struct Fixture {
        pub secrets: Arc<InMemorySecretStore>,
        pub repository: Arc<InMemoryClusterRepository>,
        pub clients: ClusterClients,
    }

    pub(crate) fn fixture_with(providers: MockProviderClientFactory) -> Fixture {
        let secrets = Arc::new(InMemorySecretStore::new());
        let repository = Arc::new(InMemoryClusterRepository::new());
        let clients = ClusterClients::new(secrets.clone(), repository.clone(), Arc::new(providers));
        Fixture {
            secrets,
            repository,
            clients,
        }
    }

    pub(crate) fn fixture() -> Fixture {
        fixture_with(MockProviderClientFactory::new())
    }

    pub(crate) fn secret(id: &str, secret_type: SecretType, values: &[(&str, &str)]) -> SecretItem {
        SecretItem {
            id: id.to_string(),
            name: id.to_string(),
            organization_id: 1,
            secret_type,
            values: values
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<HashMap<_, _>>(),
            tags: vec![],
            version: 1,
        }
    }

    pub(crate) fn model(cloud: &str, distribution: &str) -> ClusterModel {
        ClusterModel {
            id: 0,
            uid: "7f8a3c2e".to_string(),
            organization_id: 1,
            name: "demo".to_string(),
            location: "eu-west-1".to_string(),
            cloud: cloud.to_string(),
            distribution: distribution.to_string(),
            created_at: Utc::now(),
            created_by: 0,
            secret_id: "primary".to_string(),
            ssh_secret_id: "ssh".to_string(),
            config_secret_id: String::new(),
            status: ClusterStatus::Creating,
            status_message: String::new(),
            flags: FeatureFlags::default(),
        }
    }

    pub(crate) fn cluster(fixture: &Fixture, model: ClusterModel, record: ProviderRecord) -> Cluster {
        Cluster::new(model, ClusterVariant::from_record(record), fixture.clients.clone())
            .expect("kinds match")
    }

    pub(crate) fn dummy_request() -> CreateClusterRequest {
        CreateClusterRequest {
            name: "demo".to_string(),
            location: String::new(),
            cloud: "dummy".to_string(),
            distribution: String::new(),
            secret_id: "primary".to_string(),
            ssh_secret_id: String::new(),
            flags: FeatureFlags::default(),
            properties: crate::model::CreateClusterProperties {
                dummy: Some(Default::default()),
                ..Default::default()
            },
        }
    }
}
