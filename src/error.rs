//! Error types for the cluster control plane
//!
//! Errors are structured with fields to aid debugging in production.
//! Variants fall into four families that callers handle differently:
//!
//! - validation / unsupported input: permanent, surfaced verbatim
//! - not found / not yet available: "not ready", not "broken"
//! - secret type mismatch: always fatal to the calling operation
//! - infrastructure: logged in detail, surfaced coarsely, may be retried

use thiserror::Error;

/// Default context value when no specific context is available
pub const UNKNOWN_CONTEXT: &str = "unknown";

/// Main error type for control plane operations
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// Filesystem error
    #[error("io error: {source}")]
    Io {
        /// The underlying io error
        #[from]
        source: std::io::Error,
    },

    /// Malformed or inconsistent request
    #[error("validation error for {cluster}: {message}")]
    Validation {
        /// Name of the cluster with invalid configuration
        cluster: String,
        /// Description of what's invalid
        message: String,
        /// The invalid field path (e.g., "properties.eks.nodePools")
        field: Option<String>,
    },

    /// The provider tag is not one of the supported clouds
    #[error("not supported cloud type: {cloud}")]
    UnsupportedCloudType {
        /// The rejected provider tag
        cloud: String,
    },

    /// The distribution is unknown or not offered on the given cloud
    #[error("not supported distribution type: {distribution} (cloud: {cloud})")]
    UnsupportedDistributionType {
        /// The rejected distribution tag
        distribution: String,
        /// The provider tag it was requested on
        cloud: String,
    },

    /// The cluster has no stored kubeconfig yet (it probably didn't finish provisioning)
    #[error("Kubernetes config is not available for the cluster {cluster}")]
    ConfigNotAvailable {
        /// Name of the cluster
        cluster: String,
    },

    /// Secret store has no entry under the requested id
    #[error("secret {secret_id} not found in organization {organization_id}")]
    SecretNotFound {
        /// Owning organization
        organization_id: u64,
        /// The requested secret id
        secret_id: String,
    },

    /// Resolved secret is not of the type the caller expects
    #[error("secret {secret_id} has type {actual}, expected {expected}")]
    SecretTypeMismatch {
        /// The offending secret id
        secret_id: String,
        /// Type the caller required
        expected: String,
        /// Type the secret declares
        actual: String,
    },

    /// Optimistic overwrite rejected because the stored version moved
    #[error("secret {secret_id} version conflict: expected {expected:?}, found {actual:?}")]
    SecretVersionConflict {
        /// The secret being written
        secret_id: String,
        /// Version the writer based its update on
        expected: Option<u64>,
        /// Version currently stored (None when the entry does not exist)
        actual: Option<u64>,
    },

    /// Persisted record does not exist
    #[error("{kind} record not found: {id}")]
    RecordNotFound {
        /// Record kind (e.g., "cluster", "eks properties")
        kind: String,
        /// Record identifier
        id: String,
    },

    /// A remote resource already exists
    #[error("{kind} already exists: {name}")]
    AlreadyExists {
        /// Resource kind (e.g., "storage account")
        kind: String,
        /// Resource name
        name: String,
    },

    /// A cleanup operation was handed an empty path
    #[error("{kind} path is empty")]
    EmptyPath {
        /// Which path was empty (e.g., "state store")
        kind: String,
    },

    /// Infrastructure provider error
    #[error("provider error [{provider}] for {cluster}: {message}")]
    Provider {
        /// Name of the cluster being provisioned
        cluster: String,
        /// Provider kind (eks, aks, ...)
        provider: String,
        /// Description of what failed
        message: String,
        /// Whether this error is retryable
        retryable: bool,
    },

    /// Coarse error reported across the activity boundary
    #[error("activity {activity} failed: {message}")]
    Activity {
        /// Registered activity name
        activity: String,
        /// Generic description (provider detail stays in the logs)
        message: String,
        /// Whether the orchestration engine may retry
        retryable: bool,
    },

    /// Operation observed cancellation of its context
    #[error("cancelled: {context}")]
    Cancelled {
        /// What was cancelled
        context: String,
    },

    /// Secret store unreachable or failed
    #[error("secret store error: {message}")]
    SecretStore {
        /// Description of what failed
        message: String,
    },

    /// Persistence layer unreachable or failed
    #[error("persistence error: {message}")]
    Persistence {
        /// Description of what failed
        message: String,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
        /// The payload kind being processed (if known)
        kind: Option<String>,
    },

    /// Internal/operational error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Description of what failed
        message: String,
        /// Context where the error occurred
        context: String,
    },

    /// Another error annotated with the cluster it happened on
    #[error("cluster {cluster}: {source}")]
    InCluster {
        /// Cluster name
        cluster: String,
        /// The wrapped error
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Create a validation error with the given message
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            cluster: UNKNOWN_CONTEXT.to_string(),
            message: msg.into(),
            field: None,
        }
    }

    /// Create a validation error with cluster context
    pub fn validation_for(cluster: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Validation {
            cluster: cluster.into(),
            message: msg.into(),
            field: None,
        }
    }

    /// Create a validation error with cluster context and field path
    pub fn validation_for_field(
        cluster: impl Into<String>,
        field: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::Validation {
            cluster: cluster.into(),
            message: msg.into(),
            field: Some(field.into()),
        }
    }

    /// Create an unsupported cloud type error
    pub fn unsupported_cloud(cloud: impl Into<String>) -> Self {
        Self::UnsupportedCloudType {
            cloud: cloud.into(),
        }
    }

    /// Create an unsupported distribution error
    pub fn unsupported_distribution(
        distribution: impl Into<String>,
        cloud: impl Into<String>,
    ) -> Self {
        Self::UnsupportedDistributionType {
            distribution: distribution.into(),
            cloud: cloud.into(),
        }
    }

    /// Create a secret-not-found error
    pub fn secret_not_found(organization_id: u64, secret_id: impl Into<String>) -> Self {
        Self::SecretNotFound {
            organization_id,
            secret_id: secret_id.into(),
        }
    }

    /// Create a record-not-found error
    pub fn record_not_found(kind: impl Into<String>, id: impl ToString) -> Self {
        Self::RecordNotFound {
            kind: kind.into(),
            id: id.to_string(),
        }
    }

    /// Create an already-exists error
    pub fn already_exists(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::AlreadyExists {
            kind: kind.into(),
            name: name.into(),
        }
    }

    /// Create a provider error with full context
    pub fn provider_for(
        cluster: impl Into<String>,
        provider: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::Provider {
            cluster: cluster.into(),
            provider: provider.into(),
            message: msg.into(),
            retryable: true,
        }
    }

    /// Create a non-retryable provider error (e.g., client misconfiguration)
    pub fn provider_permanent(
        cluster: impl Into<String>,
        provider: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::Provider {
            cluster: cluster.into(),
            provider: provider.into(),
            message: msg.into(),
            retryable: false,
        }
    }

    /// Create a retryable activity error
    pub fn activity(activity: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Activity {
            activity: activity.into(),
            message: msg.into(),
            retryable: true,
        }
    }

    /// Create an activity error the engine must not retry
    pub fn activity_permanent(activity: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Activity {
            activity: activity.into(),
            message: msg.into(),
            retryable: false,
        }
    }

    /// Create a cancellation error
    pub fn cancelled(context: impl Into<String>) -> Self {
        Self::Cancelled {
            context: context.into(),
        }
    }

    /// Create a secret store error
    pub fn secret_store(msg: impl Into<String>) -> Self {
        Self::SecretStore {
            message: msg.into(),
        }
    }

    /// Create a persistence error
    pub fn persistence(msg: impl Into<String>) -> Self {
        Self::Persistence {
            message: msg.into(),
        }
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: None,
        }
    }

    /// Create a serialization error with payload kind context
    pub fn serialization_for_kind(kind: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: Some(kind.into()),
        }
    }

    /// Create an internal error with context
    pub fn internal_with_context(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: context.into(),
        }
    }

    /// Annotate an error with the cluster it happened on
    ///
    /// Errors that already carry a cluster name are returned unchanged.
    pub fn in_cluster(cluster: impl Into<String>, source: Error) -> Self {
        if source.cluster().is_some_and(|c| c != UNKNOWN_CONTEXT) {
            return source;
        }
        Self::InCluster {
            cluster: cluster.into(),
            source: Box::new(source),
        }
    }

    /// The innermost error, looking through cluster annotations
    pub fn root(&self) -> &Error {
        match self {
            Error::InCluster { source, .. } => source.root(),
            other => other,
        }
    }

    /// Check if this error is retryable
    ///
    /// Bad input, type mismatches and missing records need a human (or a
    /// later state change), so retrying them immediately is pointless.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Kube { source } => !matches!(
                source,
                kube::Error::Api(ae) if (400..500).contains(&ae.code)
            ),
            Error::Io { .. } => true,
            Error::Validation { .. }
            | Error::UnsupportedCloudType { .. }
            | Error::UnsupportedDistributionType { .. }
            | Error::SecretNotFound { .. }
            | Error::SecretTypeMismatch { .. }
            | Error::RecordNotFound { .. }
            | Error::AlreadyExists { .. }
            | Error::EmptyPath { .. }
            | Error::Cancelled { .. }
            | Error::Serialization { .. } => false,
            Error::ConfigNotAvailable { .. } => true,
            Error::SecretVersionConflict { .. } => true,
            Error::Provider { retryable, .. } => *retryable,
            Error::Activity { retryable, .. } => *retryable,
            Error::SecretStore { .. } | Error::Persistence { .. } => true,
            Error::Internal { .. } => true,
            Error::InCluster { source, .. } => source.is_retryable(),
        }
    }

    /// True for "no such secret" / "no such record"
    pub fn is_not_found(&self) -> bool {
        matches!(
            self.root(),
            Error::SecretNotFound { .. } | Error::RecordNotFound { .. }
        )
    }

    /// True when the secret store has no entry under the requested id
    pub fn is_secret_not_found(&self) -> bool {
        matches!(self.root(), Error::SecretNotFound { .. })
    }

    /// True when the cluster simply hasn't finished provisioning
    pub fn is_not_ready(&self) -> bool {
        matches!(self.root(), Error::ConfigNotAvailable { .. })
    }

    /// True when a remote resource already exists
    pub fn is_already_exists(&self) -> bool {
        matches!(self.root(), Error::AlreadyExists { .. })
    }

    /// Get the cluster name if this error is associated with a specific cluster
    pub fn cluster(&self) -> Option<&str> {
        match self {
            Error::Validation { cluster, .. } => Some(cluster),
            Error::ConfigNotAvailable { cluster } => Some(cluster),
            Error::Provider { cluster, .. } => Some(cluster),
            Error::InCluster { cluster, .. } => Some(cluster),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Story: unsupported provider and distribution are distinct, permanent errors
    #[test]
    fn story_unsupported_kinds_are_permanent_and_distinct() {
        let cloud = Error::unsupported_cloud("digitalocean");
        let distribution = Error::unsupported_distribution("rke", "amazon");

        assert!(cloud.to_string().contains("not supported cloud type"));
        assert!(distribution
            .to_string()
            .contains("not supported distribution type"));
        assert!(!cloud.is_retryable());
        assert!(!distribution.is_retryable());
        assert!(matches!(cloud, Error::UnsupportedCloudType { .. }));
        assert!(matches!(
            distribution,
            Error::UnsupportedDistributionType { .. }
        ));
    }

    /// Story: a cluster without kubeconfig is "not ready", not "not found"
    #[test]
    fn story_missing_config_is_not_ready() {
        let err = Error::ConfigNotAvailable {
            cluster: "prod".to_string(),
        };
        assert!(err.is_not_ready());
        assert!(!err.is_not_found());
        assert_eq!(err.cluster(), Some("prod"));

        let err = Error::secret_not_found(1, "abc");
        assert!(err.is_not_found());
        assert!(!err.is_not_ready());
    }

    /// Story: cluster annotations keep the underlying classification visible
    #[test]
    fn story_cluster_annotation_preserves_kind() {
        let err = Error::in_cluster(
            "edge-1",
            Error::SecretTypeMismatch {
                secret_id: "s".to_string(),
                expected: "ssh".to_string(),
                actual: "amazon".to_string(),
            },
        );

        assert_eq!(err.cluster(), Some("edge-1"));
        assert!(err.to_string().contains("edge-1"));
        assert!(matches!(err.root(), Error::SecretTypeMismatch { .. }));
        assert!(!err.is_retryable());

        let wrapped = Error::in_cluster("edge-1", Error::secret_not_found(7, "x"));
        assert!(wrapped.is_secret_not_found());
    }

    #[test]
    fn test_in_cluster_does_not_double_wrap() {
        let err = Error::validation_for("alpha", "bad");
        let wrapped = Error::in_cluster("beta", err);
        assert_eq!(wrapped.cluster(), Some("alpha"));
        assert!(matches!(wrapped, Error::Validation { .. }));
    }

    #[test]
    fn test_retryability() {
        assert!(!Error::validation("bad").is_retryable());
        assert!(Error::secret_store("connection refused").is_retryable());
        assert!(Error::persistence("deadlock").is_retryable());
        assert!(Error::provider_for("c", "eks", "throttled").is_retryable());
        assert!(!Error::provider_permanent("c", "eks", "bad creds").is_retryable());
        assert!(Error::activity("a", "failed").is_retryable());
        assert!(!Error::activity_permanent("a", "client init").is_retryable());
        assert!(!Error::cancelled("a").is_retryable());
        assert!(!Error::EmptyPath {
            kind: "state store".to_string()
        }
        .is_retryable());
    }

    #[test]
    fn test_validation_uses_unknown_context() {
        match Error::validation("test") {
            Error::Validation { cluster, field, .. } => {
                assert_eq!(cluster, UNKNOWN_CONTEXT);
                assert!(field.is_none());
            }
            _ => panic!("Expected Validation variant"),
        }

        let err = Error::validation_for_field("c", "properties.eks", "missing");
        match &err {
            Error::Validation { field, .. } => assert_eq!(field.as_deref(), Some("properties.eks")),
            _ => panic!("Expected Validation variant"),
        }
    }
}
