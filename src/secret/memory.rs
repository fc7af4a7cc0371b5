//! In-memory secret store
//!
//! Honors the same version rules as a real store and counts reads so that
//! cache behavior of the cluster entity is observable in tests.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::debug;

use super::{CreateSecretRequest, SecretItem, SecretStore};
use crate::{Error, Result};

/// Secret store backed by a concurrent map
#[derive(Default)]
pub struct InMemorySecretStore {
    entries: DashMap<(u64, String), SecretItem>,
    gets: AtomicUsize,
    updates: AtomicUsize,
}

impl InMemorySecretStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a secret directly, replacing any existing entry
    pub fn insert(&self, item: SecretItem) {
        self.entries
            .insert((item.organization_id, item.id.clone()), item);
    }

    /// Number of `get` calls served (hits and misses)
    pub fn get_calls(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    /// Number of successful `update` calls
    pub fn update_calls(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }

    /// Number of stored secrets across all organizations
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no secrets are stored
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl SecretStore for InMemorySecretStore {
    async fn get(&self, organization_id: u64, secret_id: &str) -> Result<SecretItem> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.entries
            .get(&(organization_id, secret_id.to_string()))
            .map(|item| item.value().clone())
            .ok_or_else(|| Error::secret_not_found(organization_id, secret_id))
    }

    async fn update(
        &self,
        organization_id: u64,
        secret_id: &str,
        request: &CreateSecretRequest,
    ) -> Result<()> {
        let conflict = |actual: Option<u64>| Error::SecretVersionConflict {
            secret_id: secret_id.to_string(),
            expected: request.version,
            actual,
        };

        // The entry guard holds the shard lock, so check-and-write is atomic.
        match self.entries.entry((organization_id, secret_id.to_string())) {
            Entry::Occupied(mut occupied) => {
                let current = occupied.get().version;
                if request.version != Some(current) {
                    return Err(conflict(Some(current)));
                }
                let item = occupied.get_mut();
                item.name = request.name.clone();
                item.secret_type = request.secret_type;
                item.values = request.values.clone();
                item.tags = request.tags.clone();
                item.version = current + 1;
            }
            Entry::Vacant(vacant) => {
                if request.version.is_some() {
                    return Err(conflict(None));
                }
                vacant.insert(SecretItem {
                    id: secret_id.to_string(),
                    name: request.name.clone(),
                    organization_id,
                    secret_type: request.secret_type,
                    values: request.values.clone(),
                    tags: request.tags.clone(),
                    version: 1,
                });
            }
        }

        self.updates.fetch_add(1, Ordering::SeqCst);
        debug!(organization_id, secret_id, "secret written");
        Ok(())
    }

    async fn delete(&self, organization_id: u64, secret_id: &str) -> Result<()> {
        self.entries.remove(&(organization_id, secret_id.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secret::SecretType;
    use std::collections::HashMap;

    fn request(version: Option<u64>, value: &str) -> CreateSecretRequest {
        let mut values = HashMap::new();
        values.insert("k".to_string(), value.to_string());
        CreateSecretRequest {
            name: "cfg".to_string(),
            secret_type: SecretType::Kubeconfig,
            values,
            tags: vec!["t".to_string()],
            version,
        }
    }

    #[tokio::test]
    async fn test_missing_secret_is_not_found() {
        let store = InMemorySecretStore::new();
        let err = store.get(1, "nope").await.unwrap_err();
        assert!(err.is_secret_not_found());
        assert_eq!(store.get_calls(), 1);
    }

    #[tokio::test]
    async fn test_create_then_overwrite_bumps_version() {
        let store = InMemorySecretStore::new();
        store.update(1, "s", &request(None, "a")).await.unwrap();
        assert_eq!(store.get(1, "s").await.unwrap().version, 1);

        store.update(1, "s", &request(Some(1), "b")).await.unwrap();
        let item = store.get(1, "s").await.unwrap();
        assert_eq!(item.version, 2);
        assert_eq!(item.value("k"), Some("b"));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_stale_or_missing_version_conflicts() {
        let store = InMemorySecretStore::new();
        store.update(1, "s", &request(None, "a")).await.unwrap();

        let err = store.update(1, "s", &request(None, "b")).await.unwrap_err();
        assert!(matches!(
            err,
            Error::SecretVersionConflict {
                actual: Some(1),
                ..
            }
        ));

        let err = store.update(1, "s", &request(Some(7), "b")).await.unwrap_err();
        assert!(matches!(err, Error::SecretVersionConflict { .. }));

        let err = store
            .update(1, "other", &request(Some(1), "b"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::SecretVersionConflict { actual: None, .. }
        ));
        assert_eq!(store.update_calls(), 1);
    }

    #[tokio::test]
    async fn test_organizations_are_isolated() {
        let store = InMemorySecretStore::new();
        store.update(1, "s", &request(None, "a")).await.unwrap();
        assert!(store.get(2, "s").await.unwrap_err().is_not_found());

        store.delete(1, "s").await.unwrap();
        store.delete(1, "s").await.unwrap();
        assert!(store.is_empty());
    }
}
