//! Stratus - control-plane core for multi-cloud Kubernetes cluster management
//!
//! Stratus models managed Kubernetes offerings from several clouds (plus a
//! self-managed distribution) behind one cluster entity, keeps their
//! credentials and generated kubeconfigs in an organization-scoped secret
//! store, and runs remote provisioning steps as idempotent, retryable
//! activities.
//!
//! # Modules
//!
//! - [`cluster`] - Cluster entity, per-provider variants, and the factory
//! - [`secret`] - Secret store boundary and typed credentials
//! - [`model`] - Persisted cluster records and creation/update requests
//! - [`repository`] - Persistence layer boundary
//! - [`provider`] - Managed Kubernetes provider boundary
//! - [`activity`] - Durable activity contract and the storage account activity
//! - [`config`] - Platform configuration
//! - [`telemetry`] - Structured logging setup
//! - [`retry`] - Exponential backoff helpers
//! - [`error`] - Error types

#![deny(missing_docs)]

pub mod activity;
pub mod cluster;
pub mod config;
pub mod error;
pub mod model;
pub mod provider;
pub mod repository;
pub mod retry;
pub mod secret;
pub mod telemetry;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

// =============================================================================
// Default Configuration Constants
// =============================================================================

/// Default Kubernetes version for providers that don't pick one themselves
pub const DEFAULT_KUBERNETES_VERSION: &str = "1.30";

/// Default root of the per-cluster state store directories
pub const DEFAULT_STATE_STORE_ROOT: &str = "/var/lib/stratus/statestore";

/// Default root of the per-organization helm directories
pub const DEFAULT_HELM_ROOT: &str = "/var/lib/stratus/helm";

/// Default settle delay before creating a storage account (seconds)
///
/// A freshly created resource group is not immediately usable for new
/// storage accounts.
pub const DEFAULT_STORAGE_ACCOUNT_SETTLE_DELAY_SECS: u64 = 60;

/// Node label carrying the node pool name
pub const NODE_POOL_LABEL: &str = "nodepool.stratus.io/name";
