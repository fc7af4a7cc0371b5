//! Local directory cleanup after a cluster is deleted

use std::io::ErrorKind;
use std::path::Path;

use tracing::{debug, info};

use crate::config::PlatformConfig;
use crate::Result;

/// Remove a cluster's state store directory
///
/// An empty or `.` name would resolve to the state store root itself and
/// is refused, as is any name that is not a single path segment. A missing
/// directory is not an error.
pub async fn clean_state_store(config: &PlatformConfig, cluster_name: &str) -> Result<()> {
    remove_dir(&config.state_store_path(cluster_name)?).await
}

/// Remove an organization's helm directory
///
/// Names are checked like [`clean_state_store`]. A missing directory is not
/// an error.
pub async fn clean_helm_folder(config: &PlatformConfig, organization_name: &str) -> Result<()> {
    remove_dir(&config.helm_path(organization_name)?).await
}

async fn remove_dir(path: &Path) -> Result<()> {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => {
            info!(path = %path.display(), "directory removed");
            Ok(())
        }
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!(path = %path.display(), "directory already absent");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}
