//! Deferred cache invalidation log (`wal/<entry-id>`)
//!
//! Storing a connection under a new ID leaves the cache slot of the old ID
//! behind. It cannot be dropped right away: a request that loaded the old
//! configuration just before the store may still be about to repopulate it.
//! Instead an entry naming the old ID is appended before the store, and a
//! periodic sweep evicts the slot once the entry is older than the longest
//! expected request.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{BrokerError, Result};
use crate::store::Storage;

/// Key prefix of rollback entries
pub const WAL_PREFIX: &str = "wal/";

/// Kind of entry that evicts a cached connection
pub const KIND_CONNECTION: &str = "connection";

/// Default age an entry must reach before it is acted on
pub const DEFAULT_ROLLBACK_MIN_AGE: Duration = Duration::from_secs(5 * 60);

/// One deferred invalidation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackEntry {
    /// What to roll back; only [`KIND_CONNECTION`] is known
    pub kind: String,
    /// Connection configuration ID whose cache slot must go
    pub id: String,
    /// When the entry was appended
    pub created_at: DateTime<Utc>,
}

/// Outcome of one sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Entries acted on and removed
    pub evicted: usize,
    /// Entries still younger than the minimum age
    pub pending: usize,
    /// Unreadable or unknown entries that were removed
    pub discarded: usize,
    /// Entries left in place because storage failed; retried next sweep
    pub failed: usize,
}

/// Durable queue of deferred cache invalidations
#[derive(Clone)]
pub struct RollbackLog {
    storage: Arc<dyn Storage>,
}

impl std::fmt::Debug for RollbackLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RollbackLog").finish_non_exhaustive()
    }
}

fn entry_key(entry_id: &str) -> String {
    format!("{WAL_PREFIX}{entry_id}")
}

impl RollbackLog {
    /// Log kept in `storage`
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Record that the cache slot of `config_id` must eventually go
    pub async fn append(&self, config_id: &str) -> Result<String> {
        self.append_at(config_id, Utc::now()).await
    }

    /// [`append`](Self::append) with an explicit timestamp
    pub async fn append_at(&self, config_id: &str, created_at: DateTime<Utc>) -> Result<String> {
        let entry_id = Uuid::new_v4().to_string();
        let key = entry_key(&entry_id);
        let entry = RollbackEntry {
            kind: KIND_CONNECTION.to_string(),
            id: config_id.to_string(),
            created_at,
        };
        let bytes = serde_json::to_vec(&entry).map_err(|source| BrokerError::Serialization {
            key: key.clone(),
            source,
        })?;
        self.storage.put(&key, bytes).await?;
        debug!(entry_id = %entry_id, config_id, "appended rollback entry");
        Ok(entry_id)
    }

    /// Remove an entry
    pub async fn delete(&self, entry_id: &str) -> Result<()> {
        self.storage.delete(&entry_key(entry_id)).await?;
        Ok(())
    }

    /// IDs of all entries
    pub async fn list(&self) -> Result<Vec<String>> {
        Ok(self.storage.list(WAL_PREFIX).await?)
    }

    /// Read one entry
    pub async fn get(&self, entry_id: &str) -> Result<Option<RollbackEntry>> {
        let key = entry_key(entry_id);
        let Some(bytes) = self.storage.get(&key).await? else {
            return Ok(None);
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|source| BrokerError::Serialization { key, source })
    }

    /// Act on every entry at least `min_age` old as of `now`
    ///
    /// `evict` receives the configuration ID of each due entry. Failures
    /// are logged and the affected entries kept for the next sweep.
    pub async fn sweep_at<F>(
        &self,
        now: DateTime<Utc>,
        min_age: Duration,
        mut evict: F,
    ) -> SweepReport
    where
        F: FnMut(&str),
    {
        let mut report = SweepReport::default();
        let min_age = TimeDelta::from_std(min_age).unwrap_or(TimeDelta::MAX);

        let entry_ids = match self.list().await {
            Ok(ids) => ids,
            Err(error) => {
                warn!(%error, "failed to list rollback entries");
                return report;
            }
        };

        for entry_id in entry_ids {
            let entry = match self.get(&entry_id).await {
                Ok(Some(entry)) => entry,
                Ok(None) => continue,
                Err(BrokerError::Serialization { source, .. }) => {
                    warn!(entry_id = %entry_id, error = %source, "discarding unreadable rollback entry");
                    if self.remove(&entry_id, &mut report).await {
                        report.discarded += 1;
                    }
                    continue;
                }
                Err(error) => {
                    warn!(entry_id = %entry_id, %error, "failed to read rollback entry");
                    report.failed += 1;
                    continue;
                }
            };

            if entry.kind != KIND_CONNECTION {
                warn!(entry_id = %entry_id, kind = %entry.kind, "discarding rollback entry of unknown kind");
                if self.remove(&entry_id, &mut report).await {
                    report.discarded += 1;
                }
                continue;
            }

            if now.signed_duration_since(entry.created_at) < min_age {
                report.pending += 1;
                continue;
            }

            evict(&entry.id);
            if self.remove(&entry_id, &mut report).await {
                debug!(entry_id = %entry_id, config_id = %entry.id, "rolled back cached connection");
                report.evicted += 1;
            }
        }
        report
    }

    async fn remove(&self, entry_id: &str, report: &mut SweepReport) -> bool {
        match self.delete(entry_id).await {
            Ok(()) => true,
            Err(error) => {
                warn!(entry_id, %error, "failed to delete rollback entry");
                report.failed += 1;
                false
            }
        }
    }
}
