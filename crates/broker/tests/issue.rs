//! Issuing accounts: authorization, naming schemes and node routing

mod common;

use std::time::Duration;

use common::{connection, harness, role};
use ephemera_broker::{BrokerError, IssueRequest, RolePatch};
use pretty_assertions::assert_eq;
use rstest::rstest;

#[tokio::test]
async fn issued_account_exists_remotely() {
    let h = harness().with_defaults().await;

    let secret = h
        .broker
        .issue(&IssueRequest::new("reader", "token-accessor"))
        .await
        .unwrap();

    assert!(h.fake.user_exists(&secret.data.username));
    assert_eq!(
        h.fake.password_of(&secret.data.username).as_deref(),
        Some(secret.data.password.as_str())
    );
    assert_eq!(h.fake.roles_of(&secret.data.username).unwrap(), vec!["user"]);
    assert_eq!(secret.data.roles, vec!["user"]);
    assert_eq!(secret.data.connection, "primary");
    assert_eq!(secret.data.url, "https://master.example.com:8089/");
    assert_eq!(secret.internal.role, "reader");
    assert_eq!(secret.internal.node, None);
    assert!(secret.data.username.starts_with("ephemera_"));
    // no default_ttl on the role: broker default
    assert_eq!(secret.ttl, Duration::from_secs(3600));
}

#[tokio::test]
async fn allowed_roles_globs_authorize_issuance() {
    let h = harness();
    h.broker
        .write_connection("primary", connection(&["adm*"]))
        .await
        .unwrap();
    h.broker.write_role("admin", role("primary")).await.unwrap();
    h.broker.write_role("user1", role("primary")).await.unwrap();

    h.broker
        .issue(&IssueRequest::new("admin", "ops"))
        .await
        .unwrap();
    let err = h
        .broker
        .issue(&IssueRequest::new("user1", "ops"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        BrokerError::PermissionDenied { ref role, ref connection }
            if role == "user1" && connection == "primary"
    ));
    assert_eq!(h.fake.creates(), 1);
}

#[tokio::test]
async fn missing_role_or_connection() {
    let h = harness();
    let err = h
        .broker
        .issue(&IssueRequest::new("ghost", "ops"))
        .await
        .unwrap_err();
    assert!(matches!(err, BrokerError::RoleNotFound { .. }));

    h.broker.write_role("orphan", role("nowhere")).await.unwrap();
    let err = h
        .broker
        .issue(&IssueRequest::new("orphan", "ops"))
        .await
        .unwrap_err();
    assert!(matches!(err, BrokerError::ConfigNotFound { name } if name == "nowhere"));
}

#[rstest]
#[case("base58-64", 8)]
#[case("base58-128", 16)]
#[tokio::test]
async fn base58_schemes_encode_random_bytes(#[case] scheme: &str, #[case] bytes: usize) {
    let h = harness().with_defaults().await;
    h.broker
        .write_role(
            "short",
            RolePatch {
                user_prefix: Some("svc".to_string()),
                user_id_scheme: Some(scheme.to_string()),
                ..role("primary")
            },
        )
        .await
        .unwrap();

    let secret = h
        .broker
        .issue(&IssueRequest::new("short", "ops"))
        .await
        .unwrap();
    let suffix = secret.data.username.strip_prefix("svc_").unwrap();
    assert_eq!(bs58::decode(suffix).into_vec().unwrap().len(), bytes);
}

#[tokio::test]
async fn legacy_role_without_scheme_uses_uuid() {
    let h = harness().with_defaults().await;
    h.broker
        .write_role(
            "legacy",
            RolePatch {
                user_prefix: Some("old".to_string()),
                user_id_scheme: Some(String::new()),
                ..role("primary")
            },
        )
        .await
        .unwrap();

    let secret = h
        .broker
        .issue(&IssueRequest::new("legacy", "ops"))
        .await
        .unwrap();
    let suffix = secret.data.username.strip_prefix("old_").unwrap();
    assert!(uuid::Uuid::parse_str(suffix).is_ok());
}

#[rstest]
#[case(RolePatch { user_id_scheme: Some("base64".to_string()), ..role("primary") }, "invalid user_id_scheme: \"base64\"")]
#[case(RolePatch { user_prefix: Some(String::new()), ..role("primary") }, "user_prefix cannot be empty")]
#[case(RolePatch { roles: Some(Vec::new()), ..role("primary") }, "roles cannot be empty")]
#[tokio::test]
async fn invalid_role_writes_are_rejected(#[case] patch: RolePatch, #[case] message: &str) {
    let h = harness();
    let err = h.broker.write_role("bad", patch).await.unwrap_err();
    assert!(err.is_validation());
    assert_eq!(err.to_string(), message);
    assert_eq!(h.broker.read_role("bad").await.unwrap(), None);
}

#[tokio::test]
async fn unsatisfiable_password_spec_still_issues() {
    let h = harness().with_defaults().await;
    h.broker
        .write_role(
            "odd",
            RolePatch {
                password_spec: Some(ephemera_broker::PasswordSpec {
                    length: 4,
                    num_digits: 4,
                    num_symbols: 4,
                    ..Default::default()
                }),
                ..role("primary")
            },
        )
        .await
        .unwrap();

    let secret = h
        .broker
        .issue(&IssueRequest::new("odd", "ops"))
        .await
        .unwrap();
    assert!(uuid::Uuid::parse_str(&secret.data.password).is_ok());
}

#[tokio::test]
async fn remote_failure_is_reported_for_retry() {
    let h = harness().with_defaults().await;
    h.fake.fail_next("create_user", 503);

    let err = h
        .broker
        .issue(&IssueRequest::new("reader", "ops"))
        .await
        .unwrap_err();
    assert!(matches!(err, BrokerError::RemoteApi { .. }));
    assert!(err.is_retryable());
}

mod nodes {
    use super::*;
    use pretty_assertions::assert_eq;

    fn cluster() -> common::Harness {
        let h = harness();
        h.fake.add_peer("idx1", "idx1.example.com", &["indexer"]);
        h.fake
            .add_peer("sh1", "sh1.example.com", &["search_head", "kv_store"]);
        h
    }

    #[rstest]
    #[case("idx1")]
    #[case("IDX1")]
    #[case("idx1.example.com")]
    #[case("IDX1.Example.COM")]
    #[tokio::test]
    async fn node_is_matched_on_short_or_full_name(#[case] node: &str) {
        let h = cluster().with_defaults().await;

        let secret = h
            .broker
            .issue(&IssueRequest::new("reader", "ops").on_node(node))
            .await
            .unwrap();

        assert_eq!(secret.data.url, "https://idx1.example.com:8089/");
        assert_eq!(secret.internal.node.as_deref(), Some(node));
        assert!(
            h.fake
                .connected_urls()
                .iter()
                .any(|url| url.host_str() == Some("idx1.example.com"))
        );
    }

    #[tokio::test]
    async fn node_connections_are_not_cached() {
        let h = cluster().with_defaults().await;
        let request = IssueRequest::new("reader", "ops").on_node("sh1");

        h.broker.issue(&request).await.unwrap();
        h.broker.issue(&request).await.unwrap();

        // one cached master connection plus one per node request
        assert_eq!(h.fake.connects(), 3);
        assert_eq!(h.broker.cache_stats().size, 1);
    }

    #[tokio::test]
    async fn unknown_node() {
        let h = cluster().with_defaults().await;
        let err = h
            .broker
            .issue(&IssueRequest::new("reader", "ops").on_node("idx9"))
            .await
            .unwrap_err();
        assert!(matches!(err, BrokerError::NodeNotFound { host } if host == "idx9"));
        assert_eq!(h.fake.creates(), 0);
    }

    #[tokio::test]
    async fn node_without_allowed_server_role() {
        let h = cluster().with_defaults().await;
        h.broker
            .write_role(
                "heads",
                RolePatch {
                    allowed_server_roles: Some(vec!["search_*".to_string()]),
                    ..role("primary")
                },
            )
            .await
            .unwrap();

        let err = h
            .broker
            .issue(&IssueRequest::new("heads", "ops").on_node("idx1"))
            .await
            .unwrap_err();
        assert!(matches!(err, BrokerError::NodeRoleNotAllowed { .. }));

        h.broker
            .issue(&IssueRequest::new("heads", "ops").on_node("sh1"))
            .await
            .unwrap();
    }
}
