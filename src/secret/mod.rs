//! Secret store boundary
//!
//! Secrets are organization-scoped, typed, versioned key/value bags. The
//! store itself is an external collaborator behind [`SecretStore`];
//! [`memory::InMemorySecretStore`] backs tests and local runs.

pub mod credentials;
pub mod memory;

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Value key holding the base64-encoded kubeconfig
pub const K8S_CONFIG_KEY: &str = "K8Sconfig";

/// Value key holding an SSH public key
pub const SSH_PUBLIC_KEY_KEY: &str = "public_key_data";

/// Value key holding an SSH private key
pub const SSH_PRIVATE_KEY_KEY: &str = "private_key_data";

/// Tag marking a secret as a generated kubeconfig
pub const TAG_KUBECONFIG: &str = "stratus:kubeconfig";

/// Tag marking a secret as managed by the platform (not user editable)
pub const TAG_READONLY: &str = "stratus:readonly";

/// Tag binding a secret to a cluster UID
pub fn cluster_uid_tag(uid: &str) -> String {
    format!("clusterUID:{uid}")
}

/// Declared type of a secret
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecretType {
    /// Alibaba Cloud credentials
    Alibaba,
    /// AWS credentials
    Amazon,
    /// Azure service principal
    Azure,
    /// Google service account
    Google,
    /// Oracle Cloud credentials
    Oracle,
    /// Kubeconfig of an imported cluster
    Kubernetes,
    /// Credentials for the dummy provider
    Dummy,
    /// SSH key pair
    Ssh,
    /// Generated kubeconfig
    Kubeconfig,
    /// Free-form values
    Generic,
}

impl SecretType {
    /// Wire name of the type
    pub fn as_str(&self) -> &'static str {
        match self {
            SecretType::Alibaba => "alibaba",
            SecretType::Amazon => "amazon",
            SecretType::Azure => "azure",
            SecretType::Google => "google",
            SecretType::Oracle => "oracle",
            SecretType::Kubernetes => "kubernetes",
            SecretType::Dummy => "dummy",
            SecretType::Ssh => "ssh",
            SecretType::Kubeconfig => "kubeconfig",
            SecretType::Generic => "generic",
        }
    }
}

impl fmt::Display for SecretType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SecretType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "alibaba" => Ok(SecretType::Alibaba),
            "amazon" => Ok(SecretType::Amazon),
            "azure" => Ok(SecretType::Azure),
            "google" => Ok(SecretType::Google),
            "oracle" => Ok(SecretType::Oracle),
            "kubernetes" => Ok(SecretType::Kubernetes),
            "dummy" => Ok(SecretType::Dummy),
            "ssh" => Ok(SecretType::Ssh),
            "kubeconfig" => Ok(SecretType::Kubeconfig),
            "generic" => Ok(SecretType::Generic),
            other => Err(Error::validation(format!("unknown secret type: {other}"))),
        }
    }
}

/// A resolved secret
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretItem {
    /// Secret id, unique within the organization
    pub id: String,
    /// Human-readable name
    pub name: String,
    /// Owning organization
    pub organization_id: u64,
    /// Declared type
    #[serde(rename = "type")]
    pub secret_type: SecretType,
    /// Secret values
    pub values: HashMap<String, String>,
    /// Classification tags
    pub tags: Vec<String>,
    /// Version, bumped on every overwrite
    pub version: u64,
}

impl SecretItem {
    /// Fail unless the secret declares the expected type
    pub fn validate_type(&self, expected: SecretType) -> Result<()> {
        if self.secret_type != expected {
            return Err(Error::SecretTypeMismatch {
                secret_id: self.id.clone(),
                expected: expected.to_string(),
                actual: self.secret_type.to_string(),
            });
        }
        Ok(())
    }

    /// Look up a value by key
    pub fn value(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Look up a value that must be present
    pub fn required_value(&self, key: &str) -> Result<&str> {
        self.value(key).ok_or_else(|| {
            Error::validation(format!("secret {} has no value for key {key}", self.id))
        })
    }
}

// Values are credentials; never print them.
impl fmt::Debug for SecretItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<&String> = self.values.keys().collect();
        keys.sort();
        f.debug_struct("SecretItem")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("organization_id", &self.organization_id)
            .field("secret_type", &self.secret_type)
            .field("keys", &keys)
            .field("tags", &self.tags)
            .field("version", &self.version)
            .finish()
    }
}

/// Create-or-overwrite request for a secret
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSecretRequest {
    /// Secret name; the secret id is derived from it
    pub name: String,
    /// Declared type
    #[serde(rename = "type")]
    pub secret_type: SecretType,
    /// Secret values
    pub values: HashMap<String, String>,
    /// Classification tags
    pub tags: Vec<String>,
    /// Version the write is based on; `None` creates a new entry
    pub version: Option<u64>,
}

/// Deterministic secret id for a request: hex SHA-256 of its name
pub fn generate_secret_id(request: &CreateSecretRequest) -> String {
    use aws_lc_rs::digest::{digest, SHA256};
    hex::encode(digest(&SHA256, request.name.as_bytes()).as_ref())
}

/// Organization-scoped, versioned secret store
#[cfg_attr(test, automock)]
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Fetch a secret
    ///
    /// Returns [`Error::SecretNotFound`] when no entry exists under the id.
    async fn get(&self, organization_id: u64, secret_id: &str) -> Result<SecretItem>;

    /// Create or overwrite a secret
    ///
    /// With `request.version == None` the entry must not exist yet. With
    /// `Some(v)` the stored version must equal `v`; the write bumps it.
    /// Violations return [`Error::SecretVersionConflict`].
    async fn update(
        &self,
        organization_id: u64,
        secret_id: &str,
        request: &CreateSecretRequest,
    ) -> Result<()>;

    /// Delete a secret; deleting a missing secret is not an error
    async fn delete(&self, organization_id: u64, secret_id: &str) -> Result<()>;
}
