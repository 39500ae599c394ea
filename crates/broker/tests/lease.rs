//! Renewal and revocation of issued accounts

mod common;

use std::time::Duration;

use chrono::TimeDelta;
use common::{harness, harness_with, role};
use ephemera_broker::{BrokerConfig, BrokerError, IssueRequest, LeaseBookkeeping, RolePatch};
use pretty_assertions::assert_eq;

const HOUR: Duration = Duration::from_secs(3600);

#[tokio::test]
async fn revoke_deletes_exactly_the_named_account() {
    let h = harness().with_defaults().await;
    let keep = h
        .broker
        .issue(&IssueRequest::new("reader", "a"))
        .await
        .unwrap();
    let gone = h
        .broker
        .issue(&IssueRequest::new("reader", "b"))
        .await
        .unwrap();

    h.broker.revoke(&gone.internal).await.unwrap();

    assert!(!h.fake.user_exists(&gone.data.username));
    assert!(h.fake.user_exists(&keep.data.username));
    assert_eq!(h.fake.deletes(), 1);
}

#[tokio::test]
async fn revoke_does_not_depend_on_cache_state() {
    let h = harness().with_defaults().await;
    let first = h
        .broker
        .issue(&IssueRequest::new("reader", "a"))
        .await
        .unwrap();
    let second = h
        .broker
        .issue(&IssueRequest::new("reader", "b"))
        .await
        .unwrap();

    // evicted cache slot
    h.broker.reset_connection("primary").await.unwrap();
    h.broker.revoke(&first.internal).await.unwrap();

    // configuration re-stored under a new ID
    h.broker.rotate_root("primary").await.unwrap();
    h.broker.revoke(&second.internal).await.unwrap();

    assert!(!h.fake.user_exists(&first.data.username));
    assert!(!h.fake.user_exists(&second.data.username));
}

#[tokio::test]
async fn revoke_on_node_skips_server_role_check() {
    let h = harness().with_defaults().await;
    h.fake.add_peer("idx1", "idx1.example.com", &["indexer"]);
    let secret = h
        .broker
        .issue(&IssueRequest::new("reader", "ops").on_node("idx1"))
        .await
        .unwrap();

    // the role no longer allows indexers, revocation still goes through
    h.broker
        .write_role(
            "reader",
            RolePatch {
                allowed_server_roles: Some(vec!["search_head".to_string()]),
                ..RolePatch::default()
            },
        )
        .await
        .unwrap();
    h.broker.revoke(&secret.internal).await.unwrap();
    assert!(!h.fake.user_exists(&secret.data.username));
}

#[tokio::test]
async fn revoke_propagates_remote_errors() {
    let h = harness().with_defaults().await;
    let missing = LeaseBookkeeping {
        username: "ephemera_never_created".to_string(),
        connection: "primary".to_string(),
        node: None,
        role: "reader".to_string(),
    };
    let err = h.broker.revoke(&missing).await.unwrap_err();
    let BrokerError::RemoteApi { ref source } = err else {
        panic!("expected a remote error, got {err}");
    };
    assert_eq!(source.status(), Some(404));
}

#[tokio::test]
async fn renew_extends_up_to_max_ttl() {
    let h = harness().with_defaults().await;
    h.broker
        .write_role(
            "bounded",
            RolePatch {
                default_ttl: Some(HOUR),
                max_ttl: Some(3 * HOUR),
                ..role("primary")
            },
        )
        .await
        .unwrap();
    let secret = h
        .broker
        .issue(&IssueRequest::new("bounded", "ops"))
        .await
        .unwrap();
    assert_eq!(secret.ttl, HOUR);
    assert_eq!(secret.max_ttl, 3 * HOUR);

    let issued = secret.issued_at;
    let early = h
        .broker
        .renew_at(&secret, 2 * HOUR, issued + TimeDelta::minutes(30))
        .await
        .unwrap();
    assert_eq!(early.ttl, 2 * HOUR);
    assert!(early.warnings.is_empty());

    let late = h
        .broker
        .renew_at(&secret, 2 * HOUR, issued + TimeDelta::hours(2))
        .await
        .unwrap();
    assert_eq!(late.ttl, HOUR);

    let expired = h
        .broker
        .renew_at(&secret, HOUR, issued + TimeDelta::hours(4))
        .await
        .unwrap();
    assert_eq!(expired.ttl, Duration::ZERO);
    assert_eq!(expired.warnings.len(), 1);
}

#[tokio::test]
async fn renew_probe_failure_is_only_a_warning() {
    let h = harness().with_defaults().await;
    let secret = h
        .broker
        .issue(&IssueRequest::new("reader", "ops"))
        .await
        .unwrap();
    h.fake.fail_next("server_info", 503);

    let response = h.broker.renew(&secret, Duration::ZERO).await.unwrap();
    assert_eq!(response.ttl, HOUR);
    assert_eq!(response.warnings.len(), 1);
    assert!(response.warnings[0].contains("probe failed"));
    assert!(h.fake.user_exists(&secret.data.username));
}

#[tokio::test]
async fn renew_without_probe() {
    let h = harness_with(BrokerConfig {
        probe_on_renew: false,
        ..BrokerConfig::default()
    })
    .with_defaults()
    .await;
    let secret = h
        .broker
        .issue(&IssueRequest::new("reader", "ops"))
        .await
        .unwrap();

    h.broker.renew(&secret, HOUR).await.unwrap();
    assert_eq!(h.fake.probes(), 0);
}

#[tokio::test]
async fn renew_requires_the_role() {
    let h = harness().with_defaults().await;
    let secret = h
        .broker
        .issue(&IssueRequest::new("reader", "ops"))
        .await
        .unwrap();
    h.broker.delete_role("reader").await.unwrap();

    let err = h.broker.renew(&secret, HOUR).await.unwrap_err();
    assert!(matches!(err, BrokerError::RoleNotFound { name } if name == "reader"));
}
