//! The broker engine and its administrative operations
//!
//! A [`Broker`] owns the configuration store, the connection cache, the node
//! router and the per-connection locks. Issuance, rotation and lease handling live
//! in their own modules as further `impl Broker` blocks.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use ephemera_splunk::{Connector, HttpConnector, SplunkApi};
use tracing::{debug, info};

use crate::cache::{CacheStats, ConnectionCache};
use crate::config::BrokerConfig;
use crate::error::Result;
use crate::model::{
    ConnectionConfig, ConnectionDefaults, ConnectionPatch, ConnectionView, RoleConfig, RolePatch,
};
use crate::rollback::{RollbackLog, SweepReport};
use crate::rotation::ConnectionLocks;
use crate::router::NodeRouter;
use crate::store::{ConfigStore, Storage};

/// Dynamic credential broker
pub struct Broker {
    store: ConfigStore,
    cache: ConnectionCache,
    router: NodeRouter,
    connector: Arc<dyn Connector>,
    locks: ConnectionLocks,
    defaults: ConnectionDefaults,
    config: BrokerConfig,
}

impl std::fmt::Debug for Broker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Broker")
            .field("cache", &self.cache)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Broker {
    /// Start building a broker
    pub fn builder() -> BrokerBuilder<NoStorage> {
        BrokerBuilder::new()
    }

    /// Settings the broker was built with
    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    pub(crate) fn store(&self) -> &ConfigStore {
        &self.store
    }

    pub(crate) fn router(&self) -> &NodeRouter {
        &self.router
    }

    pub(crate) fn connection_locks(&self) -> &ConnectionLocks {
        &self.locks
    }

    /// Cached connection for `config`, created on first use
    pub(crate) async fn cached(&self, config: &ConnectionConfig) -> Result<Arc<dyn SplunkApi>> {
        self.cache
            .get_or_create(&config.id, || {
                let params = config.client_params(&self.defaults)?;
                Ok(self.connector.connect(params)?)
            })
            .await
    }

    /// Stored configuration of `name` with its cached connection
    pub(crate) async fn cached_connection(
        &self,
        name: &str,
    ) -> Result<(ConnectionConfig, Arc<dyn SplunkApi>)> {
        let config = self.store.connection(name).await?;
        let conn = self.cached(&config).await?;
        Ok((config, conn))
    }

    /// Live connection of `name`
    pub async fn connection(&self, name: &str) -> Result<Arc<dyn SplunkApi>> {
        Ok(self.cached_connection(name).await?.1)
    }

    /// Create or update connection `name`
    ///
    /// Every successful write stores the configuration under a new ID, so
    /// the next access builds a fresh connection.
    pub async fn write_connection(
        &self,
        name: &str,
        patch: ConnectionPatch,
    ) -> Result<ConnectionView> {
        let lock = self.locks.lock_for(name);
        let _guard = lock.lock().await;

        let existing = self.store.get_connection(name).await?;
        let config = patch.merge(existing, &self.defaults)?;
        let stored = self.store.store_connection(name, config).await?;
        info!(connection = %name, config_id = %stored.id, "wrote connection");
        Ok(stored.view())
    }

    /// Connection `name` with secrets redacted
    pub async fn read_connection(&self, name: &str) -> Result<Option<ConnectionView>> {
        Ok(self
            .store
            .get_connection(name)
            .await?
            .map(|config| config.view()))
    }

    /// Remove connection `name` and drop its cached connection
    pub async fn delete_connection(&self, name: &str) -> Result<()> {
        {
            let lock = self.locks.lock_for(name);
            let _guard = lock.lock().await;

            let existing = self.store.get_connection(name).await?;
            self.store.delete_connection(name).await?;
            if let Some(config) = existing {
                self.cache.invalidate(&config.id);
            }
        }
        self.locks.forget_idle(name);
        info!(connection = %name, "deleted connection");
        Ok(())
    }

    /// Names of all connections
    pub async fn list_connections(&self) -> Result<Vec<String>> {
        self.store.list_connections().await
    }

    /// Drop the cached connection of `name`; returns whether one was cached
    pub async fn reset_connection(&self, name: &str) -> Result<bool> {
        let config = self.store.connection(name).await?;
        let evicted = self.cache.invalidate(&config.id);
        debug!(connection = %name, evicted, "reset connection");
        Ok(evicted)
    }

    /// Create or update role `name`
    pub async fn write_role(&self, name: &str, patch: RolePatch) -> Result<RoleConfig> {
        let existing = self.store.get_role(name).await?;
        let role = patch.merge(existing)?;
        self.store.store_role(name, &role).await?;
        info!(role = %name, connection = %role.connection, "wrote role");
        Ok(role)
    }

    /// Role `name`, if any
    pub async fn read_role(&self, name: &str) -> Result<Option<RoleConfig>> {
        self.store.get_role(name).await
    }

    /// Remove role `name`
    pub async fn delete_role(&self, name: &str) -> Result<()> {
        self.store.delete_role(name).await?;
        info!(role = %name, "deleted role");
        Ok(())
    }

    /// Names of all roles
    pub async fn list_roles(&self) -> Result<Vec<String>> {
        self.store.list_roles().await
    }

    /// Evict cached connections whose rollback entries are due
    pub async fn sweep_rollback(&self) -> SweepReport {
        self.sweep_rollback_at(Utc::now()).await
    }

    /// [`sweep_rollback`](Self::sweep_rollback) as of `now`
    pub async fn sweep_rollback_at(&self, now: DateTime<Utc>) -> SweepReport {
        let report = self
            .store
            .rollback_log()
            .sweep_at(now, self.config.rollback_min_age, |config_id| {
                self.cache.invalidate(config_id);
            })
            .await;
        if report != SweepReport::default() {
            debug!(?report, "rollback sweep finished");
        }
        report
    }

    /// Connection cache counters
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }
}

#[doc(hidden)]
pub struct NoStorage;

/// Builder for [`Broker`]
///
/// Storage is required; the connector defaults to [`HttpConnector`] and the
/// settings to [`BrokerConfig::default`].
///
/// ```
/// use std::sync::Arc;
/// use ephemera_broker::{Broker, MemoryStorage};
///
/// let broker = Broker::builder()
///     .storage(Arc::new(MemoryStorage::new()))
///     .build()
///     .unwrap();
/// assert!(broker.cache_stats().size == 0);
/// ```
pub struct BrokerBuilder<S> {
    storage: S,
    connector: Option<Arc<dyn Connector>>,
    config: BrokerConfig,
}

impl BrokerBuilder<NoStorage> {
    /// Builder without storage
    pub fn new() -> Self {
        Self {
            storage: NoStorage,
            connector: None,
            config: BrokerConfig::default(),
        }
    }

    /// Storage to keep configuration and rollback entries in (required)
    pub fn storage(self, storage: Arc<dyn Storage>) -> BrokerBuilder<Arc<dyn Storage>> {
        BrokerBuilder {
            storage,
            connector: self.connector,
            config: self.config,
        }
    }
}

impl Default for BrokerBuilder<NoStorage> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> BrokerBuilder<S> {
    /// Connector used to open remote connections
    #[must_use]
    pub fn connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Broker settings
    #[must_use]
    pub fn config(mut self, config: BrokerConfig) -> Self {
        self.config = config;
        self
    }
}

impl BrokerBuilder<Arc<dyn Storage>> {
    /// Validate the settings and build the broker
    pub fn build(self) -> Result<Broker> {
        self.config.validate()?;
        let connector = self
            .connector
            .unwrap_or_else(|| Arc::new(HttpConnector));
        let defaults = self.config.connection_defaults();
        let rollback = RollbackLog::new(Arc::clone(&self.storage));

        Ok(Broker {
            store: ConfigStore::new(self.storage, rollback),
            cache: ConnectionCache::new(),
            router: NodeRouter::new(Arc::clone(&connector), defaults.clone()),
            connector,
            locks: ConnectionLocks::new(),
            defaults,
            config: self.config,
        })
    }
}
