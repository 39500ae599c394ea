//! Lazily refreshed session key with single-flight login

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use arc_swap::ArcSwapOption;
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::Mutex;

use crate::error::Result;

/// A session key and the instant it stops being trusted
pub(crate) struct Session {
    key: SecretString,
    expires_at: Instant,
}

impl Session {
    fn new(key: String, ttl: Duration) -> Self {
        Self {
            key: SecretString::from(key),
            expires_at: Instant::now() + ttl,
        }
    }

    fn is_fresh(&self) -> bool {
        Instant::now() < self.expires_at
    }

    /// Value for the `Authorization` header
    pub(crate) fn authorization(&self) -> String {
        format!("Splunk {}", self.key.expose_secret())
    }
}

/// Holds the current session of one connection.
///
/// Readers take the fast path through the swap cell. When the key is missing
/// or stale, callers queue on `refresh`; the first one logs in and publishes
/// the new key, the others find it on their re-check and never call login.
pub(crate) struct SessionSlot {
    current: ArcSwapOption<Session>,
    refresh: Mutex<()>,
    ttl: Duration,
    logins: AtomicU64,
}

impl SessionSlot {
    pub(crate) fn new(ttl: Duration) -> Self {
        Self {
            current: ArcSwapOption::empty(),
            refresh: Mutex::new(()),
            ttl,
            logins: AtomicU64::new(0),
        }
    }

    fn fresh(&self) -> Option<Arc<Session>> {
        self.current.load_full().filter(|s| s.is_fresh())
    }

    /// Current session, logging in first if there is no fresh one
    pub(crate) async fn get_or_login<F, Fut>(&self, login: F) -> Result<Arc<Session>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<String>>,
    {
        if let Some(session) = self.fresh() {
            return Ok(session);
        }

        let _guard = self.refresh.lock().await;
        if let Some(session) = self.fresh() {
            return Ok(session);
        }

        self.logins.fetch_add(1, Ordering::Relaxed);
        let session = Arc::new(Session::new(login().await?, self.ttl));
        self.current.store(Some(Arc::clone(&session)));
        Ok(session)
    }

    /// Drop `stale` if it is still the published session.
    ///
    /// A session published by a concurrent refresh is left alone.
    pub(crate) fn invalidate(&self, stale: &Arc<Session>) {
        let current = self.current.load_full();
        if current.as_ref().is_some_and(|c| Arc::ptr_eq(c, stale)) {
            self.current.compare_and_swap(&current, None::<Arc<Session>>);
        }
    }

    /// Number of logins performed through this slot
    pub(crate) fn logins(&self) -> u64 {
        self.logins.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test]
    async fn concurrent_callers_share_one_login() {
        let slot = Arc::new(SessionSlot::new(Duration::from_secs(60)));
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let slot = Arc::clone(&slot);
            let calls = Arc::clone(&calls);
            handles.push(tokio::spawn(async move {
                slot.get_or_login(|| async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    Ok("key".to_string())
                })
                .await
                .map(|s| s.authorization())
            }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), "Splunk key");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(slot.logins(), 1);
    }

    #[tokio::test]
    async fn expired_session_triggers_new_login() {
        let slot = SessionSlot::new(Duration::ZERO);
        slot.get_or_login(|| async { Ok("first".to_string()) })
            .await
            .unwrap();
        let second = slot
            .get_or_login(|| async { Ok("second".to_string()) })
            .await
            .unwrap();
        assert_eq!(second.authorization(), "Splunk second");
        assert_eq!(slot.logins(), 2);
    }

    #[tokio::test]
    async fn failed_login_publishes_nothing() {
        let slot = SessionSlot::new(Duration::from_secs(60));
        let err = slot
            .get_or_login(|| async {
                Err(crate::SplunkError::Auth {
                    username: "admin".to_string(),
                    messages: vec![],
                })
            })
            .await;
        assert!(err.is_err());
        let ok = slot
            .get_or_login(|| async { Ok("key".to_string()) })
            .await
            .unwrap();
        assert_eq!(ok.authorization(), "Splunk key");
        assert_eq!(slot.logins(), 2);
    }

    #[tokio::test]
    async fn invalidate_only_drops_the_stale_session() {
        let slot = SessionSlot::new(Duration::from_secs(60));
        let first = slot
            .get_or_login(|| async { Ok("first".to_string()) })
            .await
            .unwrap();
        slot.invalidate(&first);
        let second = slot
            .get_or_login(|| async { Ok("second".to_string()) })
            .await
            .unwrap();

        // a late invalidation of the old key must not drop the new one
        slot.invalidate(&first);
        let again = slot
            .get_or_login(|| async { Ok("third".to_string()) })
            .await
            .unwrap();
        assert!(Arc::ptr_eq(&second, &again));
    }
}
