//! Cluster construction
//!
//! The one place that maps provider/distribution tags onto a variant: new
//! clusters are built from a creation request, existing ones are
//! rehydrated from their row plus provider sub-record.

use chrono::Utc;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{Cluster, ClusterClients, ClusterVariant};
use crate::model::{ClusterKind, ClusterModel, ClusterStatus, CreateClusterRequest, ProviderRecord};
use crate::repository::ClusterRepository;
use crate::Result;

/// Builds [`Cluster`] entities
#[derive(Clone)]
pub struct ClusterFactory {
    clients: ClusterClients,
}

impl ClusterFactory {
    /// Create a factory handing `clients` to every entity it builds
    pub fn new(clients: ClusterClients) -> Self {
        Self { clients }
    }

    /// Build a new, not yet persisted cluster from a creation request
    ///
    /// Defaults are filled in and the request is validated first; nothing
    /// is fetched or stored.
    pub fn from_request(
        &self,
        mut request: CreateClusterRequest,
        organization_id: u64,
        user_id: u64,
    ) -> Result<Cluster> {
        request.add_defaults();
        let kind = request.validate()?;
        let record = request.take_properties(kind)?;

        let model = ClusterModel {
            id: 0,
            uid: Uuid::new_v4().to_string(),
            organization_id,
            name: request.name,
            location: request.location,
            cloud: request.cloud,
            distribution: request.distribution,
            created_at: Utc::now(),
            created_by: user_id,
            secret_id: request.secret_id,
            ssh_secret_id: request.ssh_secret_id,
            config_secret_id: String::new(),
            status: ClusterStatus::Creating,
            status_message: String::new(),
            flags: request.flags,
        };

        debug!(cluster = %model.name, kind = %kind, "cluster built from request");
        Cluster::new(model, ClusterVariant::from_record(record), self.clients.clone())
    }

    /// Rehydrate a cluster from its row, loading the provider sub-record
    ///
    /// An imported cluster without a sub-record gets an empty one; for every
    /// other variant a missing sub-record is an error.
    pub async fn from_model(&self, model: ClusterModel) -> Result<Cluster> {
        let kind = model.kind()?;

        let record = match self
            .clients
            .repository
            .load_provider_record(model.id, kind)
            .await
        {
            Ok(record) => record,
            Err(e) if kind == ClusterKind::Kubernetes && e.is_not_found() => {
                warn!(
                    cluster = %model.name,
                    cluster_id = model.id,
                    "imported cluster has no properties record, using empty metadata"
                );
                ProviderRecord::empty(kind)
            }
            Err(e) => return Err(e),
        };

        Cluster::new(model, ClusterVariant::from_record(record), self.clients.clone())
    }

    /// Load and rehydrate a cluster by organization and id
    pub async fn load(&self, organization_id: u64, cluster_id: u64) -> Result<Cluster> {
        let model = self
            .clients
            .repository
            .find(organization_id, cluster_id)
            .await?;
        self.from_model(model).await
    }
}
