//! Integration tests for the cluster lifecycle
//!
//! These tests walk clusters through their whole life against in-memory
//! stores and a fake provider: build from a request, persist, provision,
//! store the kubeconfig, rehydrate from the database, resize and tear down.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use k8s_openapi::api::core::v1::Node;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use stratus::cluster::cleanup::clean_state_store;
use stratus::cluster::{ClusterClients, ClusterFactory, NodeLister};
use stratus::config::PlatformConfig;
use stratus::model::{
    ClusterKind, ClusterStatus, CreateClusterProperties, CreateClusterRequest, DummyProperties,
    EksProperties, FeatureFlags, KubernetesProperties, NodePool, UpdateClusterRequest,
    UpdateNodePoolsRequest,
};
use stratus::provider::{
    ManagedKubernetes, ProviderClientFactory, ProvisionSpec, RemoteClusterState,
};
use stratus::repository::{ClusterRepository, InMemoryClusterRepository};
use stratus::secret::memory::InMemorySecretStore;
use stratus::secret::{SecretItem, SecretStore, SecretType, K8S_CONFIG_KEY};
use stratus::{Error, Result, NODE_POOL_LABEL};

// =============================================================================
// Test Fixtures
// =============================================================================

/// Provider account holding clusters by name
#[derive(Default)]
struct FakeProvider {
    clusters: Mutex<HashMap<String, ProvisionSpec>>,
    updates: Mutex<Vec<ProvisionSpec>>,
}

fn fake_kubeconfig(name: &str) -> String {
    format!(
        "apiVersion: v1
kind: Config
current-context: {name}
clusters:
  - name: {name}
    cluster:
      server: https://{name}.eks.example.com
contexts:
  - name: {name}
    context:
      cluster: {name}
      user: admin
users:
  - name: admin
    user:
      token: t
"
    )
}

#[async_trait]
impl ManagedKubernetes for FakeProvider {
    async fn create_cluster(&self, spec: &ProvisionSpec) -> Result<()> {
        let mut clusters = self.clusters.lock().unwrap();
        if clusters.contains_key(&spec.name) {
            return Err(Error::already_exists("cluster", spec.name.clone()));
        }
        clusters.insert(spec.name.clone(), spec.clone());
        Ok(())
    }

    async fn update_cluster(&self, spec: &ProvisionSpec) -> Result<()> {
        self.updates.lock().unwrap().push(spec.clone());
        self.clusters
            .lock()
            .unwrap()
            .insert(spec.name.clone(), spec.clone());
        Ok(())
    }

    async fn delete_cluster(&self, name: &str, _location: &str) -> Result<()> {
        self.clusters
            .lock()
            .unwrap()
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| Error::record_not_found("cluster", name))
    }

    async fn cluster_state(&self, name: &str, _location: &str) -> Result<RemoteClusterState> {
        Ok(if self.clusters.lock().unwrap().contains_key(name) {
            RemoteClusterState::Running
        } else {
            RemoteClusterState::NotFound
        })
    }

    async fn kubeconfig(&self, name: &str, _location: &str) -> Result<Vec<u8>> {
        if !self.clusters.lock().unwrap().contains_key(name) {
            return Err(Error::record_not_found("cluster", name));
        }
        Ok(fake_kubeconfig(name).into_bytes())
    }
}

struct FakeProviders(Arc<FakeProvider>);

impl ProviderClientFactory for FakeProviders {
    fn client(
        &self,
        _kind: ClusterKind,
        _secret: &SecretItem,
    ) -> Result<Arc<dyn ManagedKubernetes>> {
        Ok(self.0.clone())
    }
}

/// Reports two labeled workers and a control plane node without a pool
struct FakeNodes;

#[async_trait]
impl NodeLister for FakeNodes {
    async fn list_nodes(&self, kubeconfig: &[u8]) -> Result<Vec<Node>> {
        assert!(!kubeconfig.is_empty());
        let node = |name: &str, pool: Option<&str>| Node {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                labels: pool.map(|p| BTreeMap::from([(NODE_POOL_LABEL.to_string(), p.to_string())])),
                ..Default::default()
            },
            ..Default::default()
        };
        Ok(vec![
            node("ip-10-0-0-2", Some("workers")),
            node("ip-10-0-0-1", Some("workers")),
            node("ip-10-0-0-9", None),
        ])
    }
}

struct Platform {
    secrets: Arc<InMemorySecretStore>,
    repository: Arc<InMemoryClusterRepository>,
    provider: Arc<FakeProvider>,
    factory: ClusterFactory,
}

fn platform() -> Platform {
    let secrets = Arc::new(InMemorySecretStore::new());
    let repository = Arc::new(InMemoryClusterRepository::new());
    let provider = Arc::new(FakeProvider::default());
    let clients = ClusterClients::new(
        secrets.clone(),
        repository.clone(),
        Arc::new(FakeProviders(provider.clone())),
    )
    .with_node_lister(Arc::new(FakeNodes));

    Platform {
        secrets,
        repository,
        provider,
        factory: ClusterFactory::new(clients),
    }
}

fn secret(id: &str, secret_type: SecretType, values: &[(&str, &str)]) -> SecretItem {
    SecretItem {
        id: id.to_string(),
        name: id.to_string(),
        organization_id: 1,
        secret_type,
        values: values
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
        tags: vec![],
        version: 1,
    }
}

fn request(cloud: &str, secret_id: &str, properties: CreateClusterProperties) -> CreateClusterRequest {
    CreateClusterRequest {
        name: "edge".to_string(),
        location: "eu-west-1".to_string(),
        cloud: cloud.to_string(),
        distribution: String::new(),
        secret_id: secret_id.to_string(),
        ssh_secret_id: String::new(),
        flags: FeatureFlags::default(),
        properties,
    }
}

fn eks_request() -> CreateClusterRequest {
    request(
        "amazon",
        "aws",
        CreateClusterProperties {
            eks: Some(EksProperties {
                kubernetes_version: "1.29".to_string(),
                node_pools: vec![NodePool {
                    name: "workers".to_string(),
                    instance_type: "m5.large".to_string(),
                    count: 2,
                    min_count: 1,
                    max_count: 4,
                    autoscaling: true,
                    ..Default::default()
                }],
                ..Default::default()
            }),
            ..Default::default()
        },
    )
}

// =============================================================================
// Lifecycle Stories
// =============================================================================

/// Story: an EKS cluster from request to teardown
#[tokio::test]
async fn story_managed_cluster_lifecycle() {
    let p = platform();
    p.secrets.insert(secret("aws", SecretType::Amazon, &[]));

    // Build and persist before provisioning
    let mut cluster = p.factory.from_request(eks_request(), 1, 7).unwrap();
    cluster
        .persist(ClusterStatus::Creating, "Cluster creation is in progress")
        .await
        .unwrap();
    let id = cluster.id();

    // Provisioning stores the kubeconfig and records its secret id
    cluster.create().await.unwrap();
    assert!(!cluster.config_secret_id().is_empty());
    cluster
        .update_status(ClusterStatus::Running, "Cluster is running")
        .await
        .unwrap();
    assert!(cluster.is_ready().await.unwrap());
    assert_eq!(
        cluster.api_endpoint().await.unwrap(),
        "https://edge.eks.example.com"
    );

    let nodes = cluster.list_node_names().await.unwrap();
    assert_eq!(nodes.len(), 1);
    assert_eq!(nodes["workers"], vec!["ip-10-0-0-1", "ip-10-0-0-2"]);

    // A fresh entity sees the same cluster through the database
    let mut loaded = p.factory.load(1, id).await.unwrap();
    assert_eq!(loaded.kind(), ClusterKind::Eks);
    assert_eq!(loaded.status(), ClusterStatus::Running);
    assert_eq!(
        loaded.k8s_config().await.unwrap(),
        fake_kubeconfig("edge").as_bytes()
    );

    // Resizing goes through the provider and is persisted
    let resize = UpdateNodePoolsRequest {
        node_pools: [("workers".to_string(), 3)].into_iter().collect(),
    };
    loaded.update_node_pools(&resize).await.unwrap();
    let reloaded = p.factory.load(1, id).await.unwrap();
    assert_eq!(reloaded.status_response().node_pools["workers"].count, 3);
    assert_eq!(p.provider.updates.lock().unwrap().len(), 1);

    // Teardown is repeatable
    reloaded.delete().await.unwrap();
    reloaded.delete().await.unwrap();
    assert!(!reloaded.is_ready().await.unwrap());

    let mut reloaded = reloaded;
    reloaded.delete_from_database().await.unwrap();
    assert!(p.repository.find(1, id).await.unwrap_err().is_not_found());
}

/// Story: re-running create after the provider already has the cluster
#[tokio::test]
async fn story_create_is_repeatable() {
    let p = platform();
    p.secrets.insert(secret("aws", SecretType::Amazon, &[]));

    let mut cluster = p.factory.from_request(eks_request(), 1, 0).unwrap();
    cluster.persist(ClusterStatus::Creating, "").await.unwrap();

    cluster.create().await.unwrap();
    let first = cluster.config_secret_id().to_string();
    cluster.create().await.unwrap();

    assert_eq!(cluster.config_secret_id(), first);
    assert_eq!(p.secrets.get(1, &first).await.unwrap().version, 2);
    assert_eq!(p.secrets.len(), 2);
}

#[tokio::test]
async fn test_update_requires_a_change() {
    let p = platform();
    p.secrets.insert(secret("aws", SecretType::Amazon, &[]));
    let cluster = p.factory.from_request(eks_request(), 1, 0).unwrap();

    let mut same = UpdateClusterRequest {
        kubernetes_version: Some("1.29".to_string()),
        node_pools: None,
    };
    cluster.add_defaults_to_update(&mut same);
    assert!(cluster.check_equality_to_update(&same).is_err());

    let mut upgrade = UpdateClusterRequest {
        kubernetes_version: Some("1.30".to_string()),
        node_pools: None,
    };
    cluster.add_defaults_to_update(&mut upgrade);
    assert!(cluster.check_equality_to_update(&upgrade).is_ok());
}

/// Story: an imported cluster's kubeconfig moves into its own secret
#[tokio::test]
async fn story_imported_cluster() {
    let p = platform();
    let encoded = STANDARD.encode(fake_kubeconfig("imported"));
    p.secrets.insert(secret(
        "kube",
        SecretType::Kubernetes,
        &[(K8S_CONFIG_KEY, encoded.as_str())],
    ));

    let mut request = request(
        "kubernetes",
        "kube",
        CreateClusterProperties {
            kubernetes: Some(KubernetesProperties::default()),
            ..Default::default()
        },
    );
    request.location = String::new();

    let mut cluster = p.factory.from_request(request, 1, 0).unwrap();
    assert_eq!(cluster.location(), "local");
    assert!(!cluster.is_ready().await.unwrap());

    cluster.persist(ClusterStatus::Creating, "").await.unwrap();
    cluster.create().await.unwrap();
    assert!(cluster.is_ready().await.unwrap());
    assert_eq!(
        cluster.api_endpoint().await.unwrap(),
        "https://imported.eks.example.com"
    );
    assert!(p.provider.clusters.lock().unwrap().is_empty());
}

/// Story: a dummy cluster needs no provider at all
#[tokio::test]
async fn story_dummy_cluster_and_local_cleanup() {
    let p = platform();
    p.secrets.insert(secret("dummy", SecretType::Dummy, &[]));

    let mut cluster = p
        .factory
        .from_request(
            request(
                "dummy",
                "dummy",
                CreateClusterProperties {
                    dummy: Some(DummyProperties::default()),
                    ..Default::default()
                },
            ),
            1,
            0,
        )
        .unwrap();
    cluster.persist(ClusterStatus::Creating, "").await.unwrap();
    cluster.create().await.unwrap();
    assert!(cluster.is_ready().await.unwrap());
    assert_eq!(
        cluster.api_endpoint().await.unwrap(),
        "https://127.0.0.1:6443"
    );
    assert_eq!(cluster.list_node_names().await.unwrap()["default"].len(), 1);

    let root = tempfile::TempDir::new().unwrap();
    let config = PlatformConfig {
        state_store_root: root.path().to_path_buf(),
        ..Default::default()
    };
    std::fs::create_dir_all(config.state_store_path(cluster.name()).unwrap()).unwrap();

    cluster.delete().await.unwrap();
    clean_state_store(&config, cluster.name()).await.unwrap();
    cluster.delete_from_database().await.unwrap();
    assert!(!config.state_store_path("edge").unwrap().exists());
    assert!(p.repository.is_empty());
}

#[tokio::test]
async fn test_wrong_credential_type_fails_with_cluster_context() {
    let p = platform();
    p.secrets.insert(secret("aws", SecretType::Google, &[]));

    let mut cluster = p.factory.from_request(eks_request(), 1, 0).unwrap();
    cluster.persist(ClusterStatus::Creating, "").await.unwrap();

    let err = cluster.create().await.unwrap_err();
    assert!(matches!(err.root(), Error::SecretTypeMismatch { .. }));
    assert_eq!(err.cluster(), Some("edge"));
    assert!(p.provider.clusters.lock().unwrap().is_empty());
}
