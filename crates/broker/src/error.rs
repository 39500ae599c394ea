//! Broker error taxonomy
//!
//! Validation errors are returned to the caller as-is. Remote failures keep
//! the underlying [`SplunkError`] so callers can apply their own retry
//! policy through [`BrokerError::is_retryable`]. A rotation that changed the
//! remote password but could not persist it is reported as
//! [`BrokerError::RotationInconsistency`] and never compensated.

use ephemera_splunk::SplunkError;
use secrecy::SecretString;
use thiserror::Error;

/// Result type for broker operations
pub type Result<T> = std::result::Result<T, BrokerError>;

/// Result type for storage backends
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Failures of the durable key-value store
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    /// The backend rejected or failed the operation
    #[error("storage {operation} failed for '{key}': {reason}")]
    Backend {
        /// `get`, `put`, `delete` or `list`
        operation: &'static str,
        /// Key or prefix the operation targeted
        key: String,
        /// Backend-specific reason
        reason: String,
    },

    /// The backend is not reachable at all
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Errors returned by [`Broker`](crate::Broker) operations
#[derive(Debug, Error)]
pub enum BrokerError {
    /// No connection configuration under this name
    #[error("connection '{name}' not found")]
    ConfigNotFound {
        /// Connection name
        name: String,
    },

    /// No role under this name
    #[error("role '{name}' not found")]
    RoleNotFound {
        /// Role name
        name: String,
    },

    /// A required field was missing or empty
    #[error("{field} cannot be empty")]
    EmptyRequiredField {
        /// Field name as written by the caller
        field: &'static str,
    },

    /// The connection does not allow this role
    #[error("role '{role}' is not allowed by connection '{connection}'")]
    PermissionDenied {
        /// Role that asked for credentials
        role: String,
        /// Connection whose allow-list rejected it
        connection: String,
    },

    /// Unknown user identifier scheme
    #[error("invalid user_id_scheme: {scheme:?}")]
    InvalidUserIdScheme {
        /// Scheme as written
        scheme: String,
    },

    /// Unknown minimum TLS version
    #[error("invalid tls_min_version: {value:?}")]
    InvalidTlsVersion {
        /// Version as written
        value: String,
    },

    /// A configuration value is malformed or inconsistent
    #[error("invalid configuration: {reason}")]
    InvalidConfig {
        /// What is wrong
        reason: String,
    },

    /// No search peer matches the requested host
    #[error("host {host:?} not found")]
    NodeNotFound {
        /// Requested node host
        host: String,
    },

    /// The peer exists but none of its server roles is allowed
    #[error("host {host:?} has none of the allowed server roles (has: {})", .server_roles.join(", "))]
    NodeRoleNotAllowed {
        /// Requested node host
        host: String,
        /// Server roles advertised by the peer
        server_roles: Vec<String>,
    },

    /// The remote service refused our credentials or session
    #[error("remote authentication failed: {source}")]
    RemoteAuthFailure {
        /// Underlying client error
        #[source]
        source: SplunkError,
    },

    /// Any other remote failure
    #[error("remote call failed: {source}")]
    RemoteApi {
        /// Underlying client error
        #[source]
        source: SplunkError,
    },

    /// The remote password was changed but the new configuration could not
    /// be saved.
    ///
    /// The stored configuration still holds the previous password, which the
    /// remote service no longer accepts. The new password is carried so an
    /// operator can repair the configuration by hand; it never appears in
    /// `Display` or `Debug` output.
    #[error(
        "connection '{connection}' was rotated remotely but the new configuration could not be saved: {source}"
    )]
    RotationInconsistency {
        /// Connection that was rotated
        connection: String,
        /// Password now active on the remote service
        new_password: SecretString,
        /// Why persisting failed
        #[source]
        source: Box<BrokerError>,
    },

    /// Durable store failure
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// A stored or supplied document could not be (de)serialized
    #[error("failed to (de)serialize '{key}': {source}")]
    Serialization {
        /// Storage key or document name
        key: String,
        /// Underlying JSON error
        #[source]
        source: serde_json::Error,
    },
}

impl From<SplunkError> for BrokerError {
    fn from(source: SplunkError) -> Self {
        if source.is_auth() {
            Self::RemoteAuthFailure { source }
        } else {
            Self::RemoteApi { source }
        }
    }
}

impl BrokerError {
    /// Build a [`BrokerError::InvalidConfig`]
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Whether repeating the same operation may succeed without any change
    /// by the caller
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RemoteApi { source } => source.is_retryable(),
            Self::Storage(_) => true,
            _ => false,
        }
    }

    /// Whether the error rejects caller input rather than reporting a failure
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::EmptyRequiredField { .. }
                | Self::InvalidUserIdScheme { .. }
                | Self::InvalidTlsVersion { .. }
                | Self::InvalidConfig { .. }
        )
    }

    /// Password now active remotely, for a [`BrokerError::RotationInconsistency`]
    pub fn new_password(&self) -> Option<&SecretString> {
        match self {
            Self::RotationInconsistency { new_password, .. } => Some(new_password),
            _ => None,
        }
    }
}
