//! Rotation of a connection's administrative password
//!
//! The remote password is changed first and the configuration saved
//! afterwards under a fresh ID. Saving appends a rollback entry for the old
//! ID, so the connection cached for the old password is evicted by a later
//! sweep instead of right away. If the save fails after the remote change,
//! the remote and stored passwords disagree; that is reported as
//! [`BrokerError::RotationInconsistency`] and left to an operator.

use std::sync::Arc;

use dashmap::DashMap;
use ephemera_splunk::UpdateUserOptions;
use secrecy::SecretString;
use tokio::sync::Mutex;
use tracing::{error, info};

use crate::broker::Broker;
use crate::error::{BrokerError, Result};
use crate::generator::PasswordSpec;
use crate::issuer::password_or_token;

/// One async lock per connection name
///
/// Held by every read-modify-store of `config/<name>`: rotations, writes
/// and deletes.
#[derive(Debug, Default)]
pub struct ConnectionLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl ConnectionLocks {
    /// No locks yet
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock serializing changes to connection `name`
    pub fn lock_for(&self, name: &str) -> Arc<Mutex<()>> {
        Arc::clone(self.locks.entry(name.to_string()).or_default().value())
    }

    /// Forget the lock of `name` unless someone still holds or waits on it
    ///
    /// Returns whether the entry was removed.
    pub fn forget_idle(&self, name: &str) -> bool {
        self.locks
            .remove_if(name, |_, lock| Arc::strong_count(lock) == 1)
            .is_some()
    }
}

/// Identifiers before and after a successful rotation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotatedConnection {
    /// Connection name
    pub connection: String,
    /// Configuration ID the rotation started from
    pub previous_id: String,
    /// Configuration ID now stored
    pub config_id: String,
}

impl Broker {
    /// Replace the administrative password of connection `name`
    pub async fn rotate_root(&self, name: &str) -> Result<RotatedConnection> {
        let lock = self.connection_locks().lock_for(name);
        let _guard = lock.lock().await;

        let config = self.store().connection(name).await?;
        let conn = self.cached(&config).await?;

        let new_password = password_or_token(&PasswordSpec::default());
        conn.update_user(
            &config.username,
            &UpdateUserOptions::change_password(config.password.as_str(), new_password.as_str()),
        )
        .await?;

        let previous_id = config.id.clone();
        let mut rotated = config;
        rotated.password.clone_from(&new_password);

        match self.store().store_connection(name, rotated).await {
            Ok(stored) => {
                info!(connection = %name, previous_id = %previous_id, config_id = %stored.id, "rotated root credential");
                Ok(RotatedConnection {
                    connection: name.to_string(),
                    previous_id,
                    config_id: stored.id,
                })
            }
            Err(source) => {
                error!(connection = %name, error = %source, "root credential changed remotely but not saved");
                Err(BrokerError::RotationInconsistency {
                    connection: name.to_string(),
                    new_password: SecretString::from(new_password),
                    source: Box::new(source),
                })
            }
        }
    }
}
