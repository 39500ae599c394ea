//! Durable key-value storage and the typed documents kept in it
//!
//! Layout:
//!
//! | Key | Document |
//! |---|---|
//! | `config/<name>` | [`ConnectionConfig`](crate::model::ConnectionConfig) |
//! | `roles/<name>` | [`RoleConfig`](crate::model::RoleConfig) |
//! | `wal/<entry-id>` | [`RollbackEntry`](crate::rollback::RollbackEntry) |

mod config_store;
mod memory;

pub use config_store::{CONFIG_PREFIX, ConfigStore, ROLES_PREFIX};
pub use memory::{MemoryStorage, StorageOp};

use async_trait::async_trait;

use crate::error::StorageResult;

/// Key-value store the broker persists its state in
///
/// `list` returns the direct children of `prefix` with the prefix
/// stripped; deeper keys appear once as `<child>/`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Storage: Send + Sync {
    /// Value under `key`, if any
    async fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>>;

    /// Create or replace `key`
    async fn put(&self, key: &str, value: Vec<u8>) -> StorageResult<()>;

    /// Remove `key`; removing a missing key succeeds
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// Direct children of `prefix`, sorted
    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>>;
}
