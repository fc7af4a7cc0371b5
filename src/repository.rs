//! Persistence layer boundary
//!
//! Cluster rows and their provider sub-records. A missing row or sub-record
//! is reported as [`Error::RecordNotFound`], distinguishable from
//! infrastructure failures ([`Error::Persistence`]).

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
#[cfg(test)]
use mockall::automock;
use tracing::debug;

use crate::model::{ClusterKind, ClusterModel, ProviderRecord};
use crate::{Error, Result};

/// Relational store of clusters and their provider sub-records
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClusterRepository: Send + Sync {
    /// Insert a new row together with its sub-record, returning the new id
    async fn insert(&self, cluster: &ClusterModel, record: &ProviderRecord) -> Result<u64>;

    /// Look up a row by organization and id
    async fn find(&self, organization_id: u64, cluster_id: u64) -> Result<ClusterModel>;

    /// Overwrite an existing row
    async fn save(&self, cluster: &ClusterModel) -> Result<()>;

    /// Load the sub-record of a row, with its nested collections
    async fn load_provider_record(
        &self,
        cluster_id: u64,
        kind: ClusterKind,
    ) -> Result<ProviderRecord>;

    /// Overwrite the sub-record of a row
    async fn save_provider_record(&self, cluster_id: u64, record: &ProviderRecord) -> Result<()>;

    /// Delete a row and its sub-record
    async fn delete(&self, cluster_id: u64) -> Result<()>;
}

/// Repository backed by concurrent maps
#[derive(Default)]
pub struct InMemoryClusterRepository {
    clusters: DashMap<u64, ClusterModel>,
    records: DashMap<u64, ProviderRecord>,
    next_id: AtomicU64,
}

impl InMemoryClusterRepository {
    /// Create an empty repository
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a row without a sub-record (e.g., a freshly registered import)
    pub fn insert_row_only(&self, mut cluster: ClusterModel) -> u64 {
        let id = self.allocate_id();
        cluster.id = id;
        self.clusters.insert(id, cluster);
        id
    }

    /// Number of stored rows
    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    /// True when no rows are stored
    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }

    fn allocate_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst) + 1
    }
}

#[async_trait]
impl ClusterRepository for InMemoryClusterRepository {
    async fn insert(&self, cluster: &ClusterModel, record: &ProviderRecord) -> Result<u64> {
        let expected = cluster.kind()?;
        if record.kind() != expected {
            return Err(Error::validation_for(
                &cluster.name,
                format!(
                    "{} sub-record does not belong to a {expected} cluster",
                    record.kind()
                ),
            ));
        }

        let id = self.allocate_id();
        let mut row = cluster.clone();
        row.id = id;
        self.clusters.insert(id, row);
        self.records.insert(id, record.clone());
        debug!(cluster = %cluster.name, cluster_id = id, "cluster row inserted");
        Ok(id)
    }

    async fn find(&self, organization_id: u64, cluster_id: u64) -> Result<ClusterModel> {
        self.clusters
            .get(&cluster_id)
            .filter(|row| row.organization_id == organization_id)
            .map(|row| row.value().clone())
            .ok_or_else(|| Error::record_not_found("cluster", cluster_id))
    }

    async fn save(&self, cluster: &ClusterModel) -> Result<()> {
        match self.clusters.get_mut(&cluster.id) {
            Some(mut row) => {
                *row = cluster.clone();
                Ok(())
            }
            None => Err(Error::record_not_found("cluster", cluster.id)),
        }
    }

    async fn load_provider_record(
        &self,
        cluster_id: u64,
        kind: ClusterKind,
    ) -> Result<ProviderRecord> {
        let record = self
            .records
            .get(&cluster_id)
            .map(|r| r.value().clone())
            .ok_or_else(|| Error::record_not_found(format!("{kind} properties"), cluster_id))?;

        if record.kind() != kind {
            return Err(Error::internal_with_context(
                "load_provider_record",
                format!(
                    "cluster {cluster_id} has a {} sub-record, expected {kind}",
                    record.kind()
                ),
            ));
        }
        Ok(record)
    }

    async fn save_provider_record(&self, cluster_id: u64, record: &ProviderRecord) -> Result<()> {
        if !self.clusters.contains_key(&cluster_id) {
            return Err(Error::record_not_found("cluster", cluster_id));
        }
        self.records.insert(cluster_id, record.clone());
        Ok(())
    }

    async fn delete(&self, cluster_id: u64) -> Result<()> {
        self.records.remove(&cluster_id);
        self.clusters
            .remove(&cluster_id)
            .map(|_| ())
            .ok_or_else(|| Error::record_not_found("cluster", cluster_id))
    }
}
