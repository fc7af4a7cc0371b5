//! Kubeconfig helpers and node listing
//!
//! Reads the API endpoint out of a kubeconfig and lists nodes through the
//! Kubernetes API, grouping them by their node pool label.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Node;
use kube::api::ListParams;
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Api, Client, Config};
#[cfg(test)]
use mockall::automock;
use tracing::debug;

use crate::model::NodeNames;
use crate::{Error, Result, NODE_POOL_LABEL};

/// Server URL of the kubeconfig's current context
pub fn api_endpoint(kubeconfig: &[u8]) -> Result<String> {
    let kubeconfig = parse_kubeconfig(kubeconfig)?;
    let missing = |what: &str| Error::validation(format!("kubeconfig has no {what}"));

    let current = kubeconfig
        .current_context
        .as_deref()
        .filter(|name| !name.is_empty())
        .ok_or_else(|| missing("current-context"))?;

    let cluster_name = kubeconfig
        .contexts
        .iter()
        .find(|ctx| ctx.name == current)
        .and_then(|ctx| ctx.context.as_ref())
        .map(|ctx| ctx.cluster.as_str())
        .ok_or_else(|| missing(&format!("context named {current}")))?;

    kubeconfig
        .clusters
        .iter()
        .find(|cluster| cluster.name == cluster_name)
        .and_then(|cluster| cluster.cluster.as_ref())
        .and_then(|cluster| cluster.server.clone())
        .ok_or_else(|| missing(&format!("server for cluster {cluster_name}")))
}

fn parse_kubeconfig(kubeconfig: &[u8]) -> Result<Kubeconfig> {
    let kubeconfig_str = std::str::from_utf8(kubeconfig).map_err(|e| {
        Error::serialization_for_kind("kubeconfig", format!("invalid kubeconfig UTF-8: {e}"))
    })?;

    serde_yaml::from_str(kubeconfig_str)
        .map_err(|e| Error::serialization_for_kind("kubeconfig", e.to_string()))
}

/// Create a kube Client from kubeconfig bytes
pub async fn client_from_kubeconfig(kubeconfig: &[u8]) -> Result<Client> {
    let kubeconfig = parse_kubeconfig(kubeconfig)?;

    let config = Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
        .await
        .map_err(|e| {
            Error::internal_with_context(
                "client_from_kubeconfig",
                format!("failed to load kubeconfig: {e}"),
            )
        })?;

    Ok(Client::try_from(config)?)
}

/// Group node names by node pool label; unlabeled nodes are skipped
pub fn group_node_names(nodes: &[Node]) -> NodeNames {
    let mut names = NodeNames::new();
    for node in nodes {
        let Some(name) = node.metadata.name.as_ref() else {
            continue;
        };
        let pool = node
            .metadata
            .labels
            .as_ref()
            .and_then(|labels| labels.get(NODE_POOL_LABEL));
        match pool {
            Some(pool) => names.entry(pool.clone()).or_default().push(name.clone()),
            None => debug!(node = %name, "node has no pool label, skipping"),
        }
    }
    for pool in names.values_mut() {
        pool.sort();
    }
    names
}

/// Lists the nodes of a cluster given its kubeconfig
#[cfg_attr(test, automock)]
#[async_trait]
pub trait NodeLister: Send + Sync {
    /// All nodes of the cluster
    async fn list_nodes(&self, kubeconfig: &[u8]) -> Result<Vec<Node>>;
}

/// [`NodeLister`] talking to the cluster's API server
#[derive(Debug, Clone, Copy, Default)]
pub struct KubeNodeLister;

#[async_trait]
impl NodeLister for KubeNodeLister {
    async fn list_nodes(&self, kubeconfig: &[u8]) -> Result<Vec<Node>> {
        let client = client_from_kubeconfig(kubeconfig).await?;
        let nodes = Api::<Node>::all(client)
            .list(&ListParams::default())
            .await?;
        Ok(nodes.items)
    }
}
