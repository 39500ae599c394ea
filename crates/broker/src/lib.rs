//! Ephemera Broker - dynamic credentials for Splunk deployments
//!
//! Given one administrative connection per deployment, the broker creates
//! short-lived accounts on demand, renews and revokes their leases, and
//! rotates the administrative password itself.
//!
//! # Features
//!
//! - **Connection cache** - one live connection per stored configuration,
//!   created by a single caller however many ask at once
//! - **Safe rotation** - configurations are re-stored under a new ID and the
//!   old cached connection is evicted through a durable rollback log
//! - **Cluster routing** - accounts can be created on individual search peers
//! - **Account naming** - `uuid4`, `base58-64` or `base58-128` suffixes
#![forbid(unsafe_code)]

/// The broker engine and administrative operations
pub mod broker;
/// Connection cache keyed by configuration ID
pub mod cache;
/// Broker settings
pub mod config;
/// Error taxonomy
pub mod error;
/// Account name suffixes and passwords
pub mod generator;
/// `*` wildcard matching for allow-lists
pub mod glob;
/// Account issuance
pub mod issuer;
/// Lease renewal and revocation
pub mod lease;
/// Persisted documents and write patches
pub mod model;
/// Deferred cache invalidation
pub mod rollback;
/// Administrative password rotation
pub mod rotation;
/// Node routing for clustered deployments
pub mod router;
/// Key-value storage
pub mod store;

// ── Root re-exports ─────────────────────────────────────────────────────────

pub use crate::broker::{Broker, BrokerBuilder};
pub use crate::cache::{CacheStats, ConnectionCache};
pub use crate::config::BrokerConfig;
pub use crate::error::{BrokerError, Result, StorageError, StorageResult};
pub use crate::generator::{PasswordError, PasswordSpec, UserIdScheme};
pub use crate::issuer::IssueRequest;
pub use crate::lease::{CredentialData, LeaseBookkeeping, LeaseSecret, RenewResponse};
pub use crate::model::{
    ConnectionConfig, ConnectionPatch, ConnectionView, RoleConfig, RolePatch,
};
pub use crate::rollback::{RollbackEntry, RollbackLog, SweepReport};
pub use crate::rotation::RotatedConnection;
pub use crate::store::{ConfigStore, MemoryStorage, Storage, StorageOp};
