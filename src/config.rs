//! Platform configuration
//!
//! Values come from the environment (`STRATUS_*` variables) or a JSON file.
//! [`PlatformConfig::from_lookup`] takes any key lookup so tests don't touch
//! process-global state.

use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{
    Error, Result, DEFAULT_HELM_ROOT, DEFAULT_STATE_STORE_ROOT,
    DEFAULT_STORAGE_ACCOUNT_SETTLE_DELAY_SECS,
};

/// Environment variable for the state store root
pub const ENV_STATE_STORE_PATH: &str = "STRATUS_STATE_STORE_PATH";
/// Environment variable for the helm root
pub const ENV_HELM_PATH: &str = "STRATUS_HELM_PATH";
/// Environment variable for the storage account settle delay
pub const ENV_STORAGE_ACCOUNT_SETTLE_DELAY_SECS: &str = "STRATUS_STORAGE_ACCOUNT_SETTLE_DELAY_SECS";

/// Platform-wide settings consumed by the cluster core
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PlatformConfig {
    /// Root directory holding one state store directory per cluster
    pub state_store_root: PathBuf,
    /// Root directory holding one helm directory per organization
    pub helm_root: PathBuf,
    /// Delay before creating a storage account in a new resource group
    pub storage_account_settle_delay_secs: u64,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            state_store_root: PathBuf::from(DEFAULT_STATE_STORE_ROOT),
            helm_root: PathBuf::from(DEFAULT_HELM_ROOT),
            storage_account_settle_delay_secs: DEFAULT_STORAGE_ACCOUNT_SETTLE_DELAY_SECS,
        }
    }
}

impl PlatformConfig {
    /// Load from process environment variables, falling back to defaults
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using an arbitrary key lookup, falling back to defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(path) = lookup(ENV_STATE_STORE_PATH).filter(|v| !v.is_empty()) {
            config.state_store_root = PathBuf::from(path);
        }
        if let Some(path) = lookup(ENV_HELM_PATH).filter(|v| !v.is_empty()) {
            config.helm_root = PathBuf::from(path);
        }
        if let Some(raw) = lookup(ENV_STORAGE_ACCOUNT_SETTLE_DELAY_SECS) {
            config.storage_account_settle_delay_secs = raw.trim().parse().map_err(|_| {
                Error::validation(format!(
                    "{ENV_STORAGE_ACCOUNT_SETTLE_DELAY_SECS} must be a number of seconds, got '{raw}'"
                ))
            })?;
        }

        Ok(config)
    }

    /// Load from a JSON file; missing fields take their defaults
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        serde_json::from_str(&raw)
            .map_err(|e| Error::serialization_for_kind("platform config", e.to_string()))
    }

    /// State store directory of a cluster
    ///
    /// The name must be a single path segment, so the result always lies
    /// directly under the state store root.
    pub fn state_store_path(&self, cluster_name: &str) -> Result<PathBuf> {
        child_dir(&self.state_store_root, cluster_name, "state store")
    }

    /// Helm directory of an organization
    ///
    /// The name must be a single path segment, so the result always lies
    /// directly under the helm root.
    pub fn helm_path(&self, organization_name: &str) -> Result<PathBuf> {
        child_dir(&self.helm_root, organization_name, "helm")
    }

    /// Storage account settle delay as a [`Duration`]
    pub fn storage_account_settle_delay(&self) -> Duration {
        Duration::from_secs(self.storage_account_settle_delay_secs)
    }
}

/// `root/name`, where `name` must be exactly one normal path component
fn child_dir(root: &Path, name: &str, kind: &str) -> Result<PathBuf> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (None, _) | (Some(Component::CurDir), None) => Err(Error::EmptyPath {
            kind: kind.to_string(),
        }),
        (Some(Component::Normal(segment)), None) if segment == name => Ok(root.join(segment)),
        _ => Err(Error::validation(format!(
            "{kind} directory name {name:?} must be a single path segment"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_nothing_is_set() {
        let config = PlatformConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config, PlatformConfig::default());
        assert_eq!(config.storage_account_settle_delay(), Duration::from_secs(60));
    }

    #[test]
    fn test_lookup_overrides() {
        let config = PlatformConfig::from_lookup(lookup_from(&[
            (ENV_STATE_STORE_PATH, "/tmp/state"),
            (ENV_HELM_PATH, "/tmp/helm"),
            (ENV_STORAGE_ACCOUNT_SETTLE_DELAY_SECS, "5"),
        ]))
        .unwrap();

        assert_eq!(
            config.state_store_path("prod").unwrap(),
            PathBuf::from("/tmp/state/prod")
        );
        assert_eq!(config.helm_path("acme").unwrap(), PathBuf::from("/tmp/helm/acme"));
        assert_eq!(config.storage_account_settle_delay_secs, 5);
    }

    #[test]
    fn test_paths_stay_directly_under_their_root() {
        let config = PlatformConfig::default();

        for name in ["", "."] {
            assert!(matches!(
                config.state_store_path(name),
                Err(Error::EmptyPath { .. })
            ));
            assert!(matches!(config.helm_path(name), Err(Error::EmptyPath { .. })));
        }
        for name in ["..", "/etc", "a/b", "../other", "edge/", "edge/."] {
            assert!(
                matches!(config.state_store_path(name), Err(Error::Validation { .. })),
                "{name:?} accepted"
            );
            assert!(
                matches!(config.helm_path(name), Err(Error::Validation { .. })),
                "{name:?} accepted"
            );
        }
        assert_eq!(
            config.state_store_path("edge.v2").unwrap(),
            config.state_store_root.join("edge.v2")
        );
    }

    #[test]
    fn test_invalid_delay_is_a_validation_error() {
        let err = PlatformConfig::from_lookup(lookup_from(&[(
            ENV_STORAGE_ACCOUNT_SETTLE_DELAY_SECS,
            "soon",
        )]))
        .unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
    }

    #[test]
    fn test_from_file_fills_missing_fields() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"helmRoot": "/srv/helm"}}"#).unwrap();

        let config = PlatformConfig::from_file(file.path()).unwrap();
        assert_eq!(config.helm_root, PathBuf::from("/srv/helm"));
        assert_eq!(
            config.state_store_root,
            PathBuf::from(DEFAULT_STATE_STORE_ROOT)
        );
    }

    #[test]
    fn test_from_file_rejects_malformed_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();

        let err = PlatformConfig::from_file(file.path()).unwrap_err();
        assert!(matches!(err, Error::Serialization { .. }));
    }
}
