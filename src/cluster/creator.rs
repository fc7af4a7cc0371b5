//! Creator lookup

use async_trait::async_trait;
use chrono::{DateTime, Utc};
#[cfg(test)]
use mockall::automock;
use tracing::warn;

use super::Cluster;
use crate::model::CreatorBaseFields;
use crate::Result;

/// User lookup used to resolve creator names
#[cfg_attr(test, automock)]
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Nickname of a user, `None` when the user is unknown
    async fn nickname(&self, user_id: u64) -> Result<Option<String>>;
}

/// Creator fields of a cluster
///
/// A failed lookup degrades to an empty name rather than failing the query.
pub async fn creator_base_fields(
    created_at: DateTime<Utc>,
    created_by: u64,
    users: &dyn UserDirectory,
) -> CreatorBaseFields {
    let creator_name = if created_by == 0 {
        String::new()
    } else {
        match users.nickname(created_by).await {
            Ok(name) => name.unwrap_or_default(),
            Err(e) => {
                warn!(user_id = created_by, error = %e, "failed to look up cluster creator");
                String::new()
            }
        }
    };

    CreatorBaseFields {
        created_at,
        creator_name,
        creator_id: created_by,
    }
}

impl Cluster {
    /// Creator id and nickname
    pub async fn user_id_and_name(&self, users: &dyn UserDirectory) -> (u64, String) {
        let fields = self.creator_fields(users).await;
        (fields.creator_id, fields.creator_name)
    }

    /// Creation time, creator id and nickname
    pub async fn creator_fields(&self, users: &dyn UserDirectory) -> CreatorBaseFields {
        creator_base_fields(self.created_at(), self.created_by(), users).await
    }
}
