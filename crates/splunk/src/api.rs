//! Remote operations the broker depends on

use std::sync::Arc;

use async_trait::async_trait;
use url::Url;

use crate::error::Result;
use crate::model::{CreateUserOptions, PeerFilter, ServerInfoEntry, UpdateUserOptions, UserEntry};
use crate::params::ClientParams;

/// An authenticated handle on one remote endpoint
///
/// Implementations authenticate lazily: constructing a handle is free of
/// side effects and the first call performs the login.
#[async_trait]
pub trait SplunkApi: Send + Sync {
    /// Endpoint this handle talks to
    fn base_url(&self) -> &Url;

    /// Account this handle authenticates as
    fn username(&self) -> &str;

    /// Exchange credentials for a session key
    async fn login(&self, username: &str, password: &str) -> Result<String>;

    /// Create an account
    async fn create_user(&self, opts: &CreateUserOptions) -> Result<UserEntry>;

    /// Update an account
    async fn update_user(&self, name: &str, opts: &UpdateUserOptions) -> Result<()>;

    /// Delete an account
    async fn delete_user(&self, name: &str) -> Result<()>;

    /// List the search peers known to this node
    async fn list_peers(&self, filter: &PeerFilter) -> Result<Vec<ServerInfoEntry>>;

    /// Read-only identity call, used as a liveness probe
    async fn server_info(&self) -> Result<ServerInfoEntry>;
}

/// Builds [`SplunkApi`] handles from connection parameters
///
/// `connect` must not perform network I/O; it is called while a cache slot
/// is being populated and must stay cheap.
pub trait Connector: Send + Sync {
    /// Build a handle for the given parameters
    fn connect(&self, params: ClientParams) -> Result<Arc<dyn SplunkApi>>;
}
