//! In-memory [`Storage`] with failure injection

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;

use super::Storage;
use crate::error::{StorageError, StorageResult};

/// Storage operation, for failure injection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageOp {
    /// `get`
    Get,
    /// `put`
    Put,
    /// `delete`
    Delete,
    /// `list`
    List,
}

impl StorageOp {
    fn as_str(self) -> &'static str {
        match self {
            Self::Get => "get",
            Self::Put => "put",
            Self::Delete => "delete",
            Self::List => "list",
        }
    }
}

/// Storage backed by a concurrent map
///
/// Nothing survives the process; meant for tests and single-process use.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: DashMap<String, Vec<u8>>,
    failures: Mutex<Vec<(StorageOp, String)>>,
    puts: AtomicU32,
    deletes: AtomicU32,
}

impl MemoryStorage {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `op` on a key starting with `key_prefix`
    ///
    /// Each call arms one failure; the failed operation leaves the store
    /// untouched.
    pub fn fail_next(&self, op: StorageOp, key_prefix: &str) {
        self.failures.lock().push((op, key_prefix.to_string()));
    }

    /// Number of stored keys
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is stored
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All keys, sorted
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }

    /// Successful `put` calls
    pub fn put_count(&self) -> u32 {
        self.puts.load(Ordering::SeqCst)
    }

    /// Successful `delete` calls
    pub fn delete_count(&self) -> u32 {
        self.deletes.load(Ordering::SeqCst)
    }

    fn check(&self, op: StorageOp, key: &str) -> StorageResult<()> {
        let mut failures = self.failures.lock();
        let armed = failures
            .iter()
            .position(|(o, prefix)| *o == op && key.starts_with(prefix.as_str()));
        match armed {
            Some(index) => {
                failures.remove(index);
                Err(StorageError::Backend {
                    operation: op.as_str(),
                    key: key.to_string(),
                    reason: "injected failure".to_string(),
                })
            }
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        self.check(StorageOp::Get, key)?;
        Ok(self.entries.get(key).map(|entry| entry.value().clone()))
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> StorageResult<()> {
        self.check(StorageOp::Put, key)?;
        self.entries.insert(key.to_string(), value);
        self.puts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.check(StorageOp::Delete, key)?;
        self.entries.remove(key);
        self.deletes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>> {
        self.check(StorageOp::List, prefix)?;
        let children: BTreeSet<String> = self
            .entries
            .iter()
            .filter_map(|entry| {
                let rest = entry.key().strip_prefix(prefix)?;
                Some(match rest.find('/') {
                    Some(slash) => rest[..=slash].to_string(),
                    None => rest.to_string(),
                })
            })
            .collect();
        Ok(children.into_iter().collect())
    }
}
