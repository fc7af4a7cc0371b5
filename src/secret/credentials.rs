//! Cloud provider credentials
//!
//! Typed views over secret values used to build provider clients.

use std::collections::HashMap;

use super::{SecretItem, SecretType};
use crate::{Error, Result};

/// Azure service principal credentials
#[derive(Clone)]
pub struct AzureCredentials {
    /// Service principal client id
    pub client_id: String,
    /// Service principal client secret
    pub client_secret: String,
    /// Azure AD tenant id
    pub tenant_id: String,
    /// Subscription the resources live in
    pub subscription_id: String,
}

impl AzureCredentials {
    /// Load credentials from a secret's values
    pub fn from_secret(secret: &HashMap<String, String>) -> Option<Self> {
        Some(Self {
            client_id: secret.get("AZURE_CLIENT_ID")?.clone(),
            client_secret: secret.get("AZURE_CLIENT_SECRET")?.clone(),
            tenant_id: secret.get("AZURE_TENANT_ID")?.clone(),
            subscription_id: secret.get("AZURE_SUBSCRIPTION_ID")?.clone(),
        })
    }

    /// Load credentials from a resolved secret, requiring the Azure type
    pub fn from_secret_item(item: &SecretItem) -> Result<Self> {
        item.validate_type(SecretType::Azure)?;
        Self::from_secret(&item.values).ok_or_else(|| {
            Error::validation(format!(
                "secret {} is missing Azure service principal values",
                item.id
            ))
        })
    }
}

impl std::fmt::Debug for AzureCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AzureCredentials")
            .field("client_id", &self.client_id)
            .field("tenant_id", &self.tenant_id)
            .field("subscription_id", &self.subscription_id)
            .finish_non_exhaustive()
    }
}
