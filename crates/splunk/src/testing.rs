//! In-memory stand-in for a remote deployment
//!
//! [`FakeSplunk`] keeps accounts, peers and server identity in memory and
//! counts every connect, login and delete so tests can assert on side
//! effects. Handles it produces authenticate lazily, like the HTTP client.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use secrecy::ExposeSecret;
use url::Url;

use crate::api::{Connector, SplunkApi};
use crate::error::{ApiMessage, Result, SplunkError};
use crate::model::{
    CreateUserOptions, PeerFilter, ServerInfo, ServerInfoEntry, UpdateUserOptions, UserContent,
    UserEntry,
};
use crate::params::ClientParams;
use crate::session::SessionSlot;

#[derive(Debug, Clone)]
struct FakeUser {
    password: String,
    roles: Vec<String>,
}

#[derive(Debug, Default)]
struct FakeState {
    users: BTreeMap<String, FakeUser>,
    peers: Vec<ServerInfoEntry>,
    info: ServerInfoEntry,
    failures: HashMap<&'static str, Vec<u16>>,
    connected: Vec<Url>,
    latency: Duration,
}

#[derive(Debug, Default)]
struct Counters {
    connects: AtomicU64,
    logins: AtomicU64,
    creates: AtomicU64,
    deletes: AtomicU64,
    probes: AtomicU64,
}

/// Shared fake deployment; clones observe the same state
#[derive(Debug, Clone, Default)]
pub struct FakeSplunk {
    state: Arc<Mutex<FakeState>>,
    counters: Arc<Counters>,
}

impl FakeSplunk {
    /// Empty deployment without any account
    pub fn new() -> Self {
        Self::default()
    }

    /// Deployment with one administrative account
    pub fn with_admin(username: &str, password: &str) -> Self {
        let fake = Self::new();
        fake.add_user(username, password, &["admin"]);
        fake
    }

    /// Add or replace an account
    pub fn add_user(&self, name: &str, password: &str, roles: &[&str]) {
        self.state.lock().users.insert(
            name.to_string(),
            FakeUser {
                password: password.to_string(),
                roles: roles.iter().map(ToString::to_string).collect(),
            },
        );
    }

    /// Add a search peer
    pub fn add_peer(&self, host: &str, host_fqdn: &str, server_roles: &[&str]) {
        self.state.lock().peers.push(ServerInfoEntry {
            name: format!("{host_fqdn}:8089"),
            content: ServerInfo {
                host: host.to_string(),
                host_fqdn: host_fqdn.to_string(),
                server_roles: server_roles.iter().map(ToString::to_string).collect(),
                ..ServerInfo::default()
            },
        });
    }

    /// Set the identity reported by `server_info`
    pub fn set_server_info(&self, host: &str, server_roles: &[&str]) {
        self.state.lock().info = ServerInfoEntry {
            name: "server-info".to_string(),
            content: ServerInfo {
                host: host.to_string(),
                host_fqdn: host.to_string(),
                server_roles: server_roles.iter().map(ToString::to_string).collect(),
                server_name: host.to_string(),
                ..ServerInfo::default()
            },
        };
    }

    /// Fail the next call of `operation` with the given HTTP status
    ///
    /// Queued failures for the same operation are consumed in order.
    pub fn fail_next(&self, operation: &'static str, status: u16) {
        self.state
            .lock()
            .failures
            .entry(operation)
            .or_default()
            .push(status);
    }

    /// Delay every remote call by `latency`
    pub fn set_latency(&self, latency: Duration) {
        self.state.lock().latency = latency;
    }

    /// Current password of an account
    pub fn password_of(&self, name: &str) -> Option<String> {
        self.state.lock().users.get(name).map(|u| u.password.clone())
    }

    /// Remote roles of an account
    pub fn roles_of(&self, name: &str) -> Option<Vec<String>> {
        self.state.lock().users.get(name).map(|u| u.roles.clone())
    }

    /// Whether an account exists
    pub fn user_exists(&self, name: &str) -> bool {
        self.state.lock().users.contains_key(name)
    }

    /// All account names, sorted
    pub fn user_names(&self) -> Vec<String> {
        self.state.lock().users.keys().cloned().collect()
    }

    /// Base URLs of every handle built so far, in order
    pub fn connected_urls(&self) -> Vec<Url> {
        self.state.lock().connected.clone()
    }

    /// Handles built through [`Connector::connect`]
    pub fn connects(&self) -> u64 {
        self.counters.connects.load(Ordering::SeqCst)
    }

    /// Successful and failed login attempts
    pub fn logins(&self) -> u64 {
        self.counters.logins.load(Ordering::SeqCst)
    }

    /// Accounts created
    pub fn creates(&self) -> u64 {
        self.counters.creates.load(Ordering::SeqCst)
    }

    /// Accounts deleted
    pub fn deletes(&self) -> u64 {
        self.counters.deletes.load(Ordering::SeqCst)
    }

    /// `server_info` calls
    pub fn probes(&self) -> u64 {
        self.counters.probes.load(Ordering::SeqCst)
    }

    async fn enter(&self, operation: &'static str) -> Result<()> {
        let (latency, injected) = {
            let mut state = self.state.lock();
            let injected = state
                .failures
                .get_mut(operation)
                .filter(|queue| !queue.is_empty())
                .map(|queue| queue.remove(0));
            (state.latency, injected)
        };
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        match injected {
            Some(status) => Err(api_error(operation, status, "injected failure")),
            None => Ok(()),
        }
    }
}

fn api_error(operation: &'static str, status: u16, text: &str) -> SplunkError {
    SplunkError::Api {
        operation,
        status,
        messages: vec![ApiMessage {
            kind: "ERROR".to_string(),
            text: text.to_string(),
            code: None,
        }],
    }
}

impl Connector for FakeSplunk {
    fn connect(&self, params: ClientParams) -> Result<Arc<dyn SplunkApi>> {
        self.counters.connects.fetch_add(1, Ordering::SeqCst);
        self.state.lock().connected.push(params.base_url.clone());
        Ok(Arc::new(FakeConnection {
            fake: self.clone(),
            session: SessionSlot::new(params.session_ttl),
            params,
        }))
    }
}

/// Handle on a [`FakeSplunk`] bound to one account
pub struct FakeConnection {
    fake: FakeSplunk,
    params: ClientParams,
    session: SessionSlot,
}

impl FakeConnection {
    async fn authorized(&self) -> Result<()> {
        self.session
            .get_or_login(|| {
                self.login(&self.params.username, self.params.password.expose_secret())
            })
            .await
            .map(drop)
    }
}

#[async_trait]
impl SplunkApi for FakeConnection {
    fn base_url(&self) -> &Url {
        &self.params.base_url
    }

    fn username(&self) -> &str {
        &self.params.username
    }

    async fn login(&self, username: &str, password: &str) -> Result<String> {
        self.fake.counters.logins.fetch_add(1, Ordering::SeqCst);
        self.fake.enter("login").await?;
        let state = self.fake.state.lock();
        match state.users.get(username) {
            Some(user) if user.password == password => {
                Ok(format!("session-{}", uuid::Uuid::new_v4().simple()))
            }
            _ => Err(SplunkError::Auth {
                username: username.to_string(),
                messages: vec![ApiMessage {
                    kind: "WARN".to_string(),
                    text: "Login failed".to_string(),
                    code: None,
                }],
            }),
        }
    }

    async fn create_user(&self, opts: &CreateUserOptions) -> Result<UserEntry> {
        self.authorized().await?;
        self.fake.enter("create_user").await?;
        let mut state = self.fake.state.lock();
        if state.users.contains_key(&opts.name) {
            return Err(api_error(
                "create_user",
                400,
                &format!("User=\"{}\" already exists", opts.name),
            ));
        }
        state.users.insert(
            opts.name.clone(),
            FakeUser {
                password: opts.password.clone(),
                roles: opts.roles.clone(),
            },
        );
        self.fake.counters.creates.fetch_add(1, Ordering::SeqCst);
        Ok(UserEntry {
            name: opts.name.clone(),
            content: UserContent {
                roles: opts.roles.clone(),
                default_app: opts.default_app.clone().unwrap_or_default(),
                email: opts.email.clone().unwrap_or_default(),
                tz: opts.tz.clone().unwrap_or_default(),
                kind: "Splunk".to_string(),
            },
        })
    }

    async fn update_user(&self, name: &str, opts: &UpdateUserOptions) -> Result<()> {
        self.authorized().await?;
        self.fake.enter("update_user").await?;
        let mut state = self.fake.state.lock();
        let Some(user) = state.users.get_mut(name) else {
            return Err(api_error(
                "update_user",
                404,
                &format!("User=\"{name}\" does not exist"),
            ));
        };
        if let Some(password) = &opts.password {
            // changing one's own password requires the current one
            if name == self.params.username
                && opts.old_password.as_deref() != Some(user.password.as_str())
            {
                return Err(api_error(
                    "update_user",
                    400,
                    "Old password is incorrect",
                ));
            }
            user.password.clone_from(password);
        }
        if !opts.roles.is_empty() {
            user.roles.clone_from(&opts.roles);
        }
        Ok(())
    }

    async fn delete_user(&self, name: &str) -> Result<()> {
        self.authorized().await?;
        self.fake.enter("delete_user").await?;
        if self.fake.state.lock().users.remove(name).is_none() {
            return Err(api_error(
                "delete_user",
                404,
                &format!("User=\"{name}\" does not exist"),
            ));
        }
        self.fake.counters.deletes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn list_peers(&self, _filter: &PeerFilter) -> Result<Vec<ServerInfoEntry>> {
        self.authorized().await?;
        self.fake.enter("list_peers").await?;
        Ok(self.fake.state.lock().peers.clone())
    }

    async fn server_info(&self) -> Result<ServerInfoEntry> {
        self.fake.counters.probes.fetch_add(1, Ordering::SeqCst);
        self.authorized().await?;
        self.fake.enter("server_info").await?;
        Ok(self.fake.state.lock().info.clone())
    }
}
