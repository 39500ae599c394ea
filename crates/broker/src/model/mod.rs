//! Persisted configuration documents and their write patches

pub mod connection;
pub mod role;

pub use connection::{ConnectionConfig, ConnectionDefaults, ConnectionPatch, ConnectionView};
pub use role::{DEFAULT_USER_PREFIX, RoleConfig, RolePatch};

/// Placeholder reported instead of secret values
pub const REDACTED: &str = "n/a";
