//! Typed access to connection and role documents

use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use uuid::Uuid;

use super::Storage;
use crate::error::{BrokerError, Result};
use crate::model::{ConnectionConfig, RoleConfig};
use crate::rollback::RollbackLog;

/// Key prefix of connection configurations
pub const CONFIG_PREFIX: &str = "config/";

/// Key prefix of roles
pub const ROLES_PREFIX: &str = "roles/";

/// Connection and role documents over a [`Storage`]
#[derive(Clone)]
pub struct ConfigStore {
    storage: Arc<dyn Storage>,
    rollback: RollbackLog,
}

impl std::fmt::Debug for ConfigStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigStore").finish_non_exhaustive()
    }
}

fn require_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(BrokerError::EmptyRequiredField { field: "name" });
    }
    Ok(())
}

impl ConfigStore {
    /// Store over `storage`, logging deferred invalidations to `rollback`
    pub fn new(storage: Arc<dyn Storage>, rollback: RollbackLog) -> Self {
        Self { storage, rollback }
    }

    /// Rollback log used by [`store_connection`](Self::store_connection)
    pub fn rollback_log(&self) -> &RollbackLog {
        &self.rollback
    }

    async fn load<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let Some(bytes) = self.storage.get(key).await? else {
            return Ok(None);
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|source| BrokerError::Serialization {
                key: key.to_string(),
                source,
            })
    }

    async fn save<T: Serialize + Sync>(&self, key: &str, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec(value).map_err(|source| BrokerError::Serialization {
            key: key.to_string(),
            source,
        })?;
        self.storage.put(key, bytes).await?;
        Ok(())
    }

    /// Connection configuration, if any
    pub async fn get_connection(&self, name: &str) -> Result<Option<ConnectionConfig>> {
        require_name(name)?;
        self.load(&format!("{CONFIG_PREFIX}{name}")).await
    }

    /// Connection configuration, or [`BrokerError::ConfigNotFound`]
    pub async fn connection(&self, name: &str) -> Result<ConnectionConfig> {
        self.get_connection(name)
            .await?
            .ok_or_else(|| BrokerError::ConfigNotFound {
                name: name.to_string(),
            })
    }

    /// Persist `config` under a fresh ID and return the stored document
    ///
    /// When the configuration was stored before, a rollback entry for its
    /// previous ID is appended first and removed again if the write fails,
    /// so the old cache slot is evicted only once the new ID is durable.
    pub async fn store_connection(
        &self,
        name: &str,
        mut config: ConnectionConfig,
    ) -> Result<ConnectionConfig> {
        require_name(name)?;
        let old_id = std::mem::take(&mut config.id);

        let wal_entry = if old_id.is_empty() {
            None
        } else {
            Some(self.rollback.append(&old_id).await?)
        };

        config.id = Uuid::new_v4().to_string();
        if let Err(error) = self.save(&format!("{CONFIG_PREFIX}{name}"), &config).await {
            if let Some(entry_id) = wal_entry {
                // the new ID never became visible; nothing to roll back
                if let Err(cleanup) = self.rollback.delete(&entry_id).await {
                    warn!(connection = %name, entry_id = %entry_id, error = %cleanup, "failed to cancel rollback entry");
                }
            }
            return Err(error);
        }

        debug!(connection = %name, config_id = %config.id, previous_id = %old_id, "stored connection");
        Ok(config)
    }

    /// Remove a connection configuration
    pub async fn delete_connection(&self, name: &str) -> Result<()> {
        require_name(name)?;
        self.storage
            .delete(&format!("{CONFIG_PREFIX}{name}"))
            .await?;
        Ok(())
    }

    /// Names of all connections
    pub async fn list_connections(&self) -> Result<Vec<String>> {
        Ok(self.storage.list(CONFIG_PREFIX).await?)
    }

    /// Role, if any
    pub async fn get_role(&self, name: &str) -> Result<Option<RoleConfig>> {
        require_name(name)?;
        self.load(&format!("{ROLES_PREFIX}{name}")).await
    }

    /// Role, or [`BrokerError::RoleNotFound`]
    pub async fn role(&self, name: &str) -> Result<RoleConfig> {
        self.get_role(name)
            .await?
            .ok_or_else(|| BrokerError::RoleNotFound {
                name: name.to_string(),
            })
    }

    /// Persist a role
    pub async fn store_role(&self, name: &str, role: &RoleConfig) -> Result<()> {
        require_name(name)?;
        self.save(&format!("{ROLES_PREFIX}{name}"), role).await
    }

    /// Remove a role
    pub async fn delete_role(&self, name: &str) -> Result<()> {
        require_name(name)?;
        self.storage.delete(&format!("{ROLES_PREFIX}{name}")).await?;
        Ok(())
    }

    /// Names of all roles
    pub async fn list_roles(&self) -> Result<Vec<String>> {
        Ok(self.storage.list(ROLES_PREFIX).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StorageError;
    use crate::store::{MemoryStorage, MockStorage, StorageOp};
    use mockall::predicate::{eq, function};
    use pretty_assertions::assert_eq;

    fn store() -> (Arc<MemoryStorage>, ConfigStore) {
        let storage = Arc::new(MemoryStorage::new());
        let rollback = RollbackLog::new(storage.clone());
        (Arc::clone(&storage), ConfigStore::new(storage, rollback))
    }

    fn config() -> ConnectionConfig {
        ConnectionConfig {
            username: "admin".to_string(),
            password: "changeme".to_string(),
            url: "https://localhost:8089".to_string(),
            allowed_roles: vec!["*".to_string()],
            ..ConnectionConfig::default()
        }
    }

    #[tokio::test]
    async fn first_store_assigns_id_without_rollback_entry() {
        let (storage, store) = store();
        let stored = store.store_connection("primary", config()).await.unwrap();
        assert!(Uuid::parse_str(&stored.id).is_ok());
        assert_eq!(storage.keys(), vec!["config/primary"]);
        assert_eq!(store.connection("primary").await.unwrap(), stored);
    }

    #[tokio::test]
    async fn restore_changes_id_and_logs_old_one() {
        let (_, store) = store();
        let first = store.store_connection("primary", config()).await.unwrap();
        let second = store
            .store_connection("primary", first.clone())
            .await
            .unwrap();
        assert_ne!(first.id, second.id);

        let entries = store.rollback_log().list().await.unwrap();
        assert_eq!(entries.len(), 1);
        let entry = store.rollback_log().get(&entries[0]).await.unwrap().unwrap();
        assert_eq!(entry.id, first.id);
    }

    #[tokio::test]
    async fn failed_write_cancels_rollback_entry() {
        let (storage, store) = store();
        let first = store.store_connection("primary", config()).await.unwrap();
        storage.fail_next(StorageOp::Put, CONFIG_PREFIX);

        let err = store
            .store_connection("primary", first.clone())
            .await
            .unwrap_err();
        assert!(matches!(err, BrokerError::Storage(_)));
        assert!(store.rollback_log().list().await.unwrap().is_empty());
        assert_eq!(store.connection("primary").await.unwrap().id, first.id);
    }

    #[tokio::test]
    async fn missing_documents() {
        let (_, store) = store();
        assert!(matches!(
            store.connection("nope").await,
            Err(BrokerError::ConfigNotFound { .. })
        ));
        assert!(matches!(
            store.role("nope").await,
            Err(BrokerError::RoleNotFound { .. })
        ));
        assert!(matches!(
            store.get_role("").await,
            Err(BrokerError::EmptyRequiredField { field: "name" })
        ));
    }

    #[tokio::test]
    async fn role_round_trip_and_listing() {
        let (_, store) = store();
        let role = RoleConfig {
            connection: "primary".to_string(),
            roles: vec!["user".to_string()],
            ..RoleConfig::default()
        };
        store.store_role("b", &role).await.unwrap();
        store.store_role("a", &role).await.unwrap();
        assert_eq!(store.role("a").await.unwrap(), role);
        assert_eq!(store.list_roles().await.unwrap(), vec!["a", "b"]);
        store.delete_role("a").await.unwrap();
        assert_eq!(store.list_roles().await.unwrap(), vec!["b"]);
    }

    #[tokio::test]
    async fn corrupt_document_is_a_serialization_error() {
        let mut storage = MockStorage::new();
        storage
            .expect_get()
            .with(eq("config/primary"))
            .returning(|_| Ok(Some(b"{".to_vec())));
        let storage: Arc<dyn Storage> = Arc::new(storage);
        let store = ConfigStore::new(storage.clone(), RollbackLog::new(storage));
        assert!(matches!(
            store.connection("primary").await,
            Err(BrokerError::Serialization { .. })
        ));
    }

    #[tokio::test]
    async fn rollback_append_failure_aborts_store() {
        let mut storage = MockStorage::new();
        storage
            .expect_put()
            .with(function(|key: &str| key.starts_with("wal/")), mockall::predicate::always())
            .times(1)
            .returning(|_, _| Err(StorageError::Unavailable("down".to_string())));
        storage
            .expect_put()
            .with(eq("config/primary"), mockall::predicate::always())
            .never();
        let storage: Arc<dyn Storage> = Arc::new(storage);
        let store = ConfigStore::new(storage.clone(), RollbackLog::new(storage));

        let mut stored = config();
        stored.id = "old".to_string();
        let err = store.store_connection("primary", stored).await.unwrap_err();
        assert!(err.is_retryable());
    }
}
