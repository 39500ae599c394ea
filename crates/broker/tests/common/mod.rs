//! Shared fixtures for broker scenario tests

#![allow(dead_code)]

use std::sync::Arc;

use ephemera_broker::{Broker, BrokerConfig, ConnectionPatch, MemoryStorage, RolePatch};
use ephemera_splunk::testing::FakeSplunk;

pub const ADMIN: &str = "admin";
pub const ADMIN_PASSWORD: &str = "changeme";
pub const URL: &str = "https://master.example.com:8089";

pub struct Harness {
    pub fake: FakeSplunk,
    pub storage: Arc<MemoryStorage>,
    pub broker: Broker,
}

pub fn harness() -> Harness {
    harness_with(BrokerConfig::default())
}

pub fn harness_with(config: BrokerConfig) -> Harness {
    let fake = FakeSplunk::with_admin(ADMIN, ADMIN_PASSWORD);
    let storage = Arc::new(MemoryStorage::new());
    let broker = Broker::builder()
        .storage(storage.clone())
        .connector(Arc::new(fake.clone()))
        .config(config)
        .build()
        .unwrap();
    Harness {
        fake,
        storage,
        broker,
    }
}

pub fn connection(allowed_roles: &[&str]) -> ConnectionPatch {
    ConnectionPatch {
        username: Some(ADMIN.to_string()),
        password: Some(ADMIN_PASSWORD.to_string()),
        url: Some(URL.to_string()),
        allowed_roles: Some(allowed_roles.iter().map(ToString::to_string).collect()),
        ..ConnectionPatch::default()
    }
}

pub fn role(connection: &str) -> RolePatch {
    RolePatch {
        connection: Some(connection.to_string()),
        roles: Some(vec!["user".to_string()]),
        ..RolePatch::default()
    }
}

impl Harness {
    /// Connection `primary` allowing every role, plus role `reader` on it
    pub async fn with_defaults(self) -> Self {
        self.broker
            .write_connection("primary", connection(&["*"]))
            .await
            .unwrap();
        self.broker
            .write_role("reader", role("primary"))
            .await
            .unwrap();
        self
    }
}
