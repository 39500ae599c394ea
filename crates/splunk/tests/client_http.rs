//! HTTP client behaviour against a mock management endpoint.

use ephemera_splunk::{
    Client, ClientParams, CreateUserOptions, PeerFilter, SplunkApi, SplunkError,
    UpdateUserOptions,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::matchers::{body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn mount_login(server: &MockServer, key: &str, times: u64) {
    Mock::given(method("POST"))
        .and(path("/services/auth/login"))
        .and(query_param("output_mode", "json"))
        .and(body_string_contains("username=admin"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "sessionKey": key })))
        .expect(times)
        .mount(server)
        .await;
}

fn client(server: &MockServer) -> Client {
    Client::new(ClientParams::new(&server.uri(), "admin", "changeme").unwrap()).unwrap()
}

#[tokio::test]
async fn session_key_is_reused_across_calls() {
    let server = MockServer::start().await;
    mount_login(&server, "abc123", 1).await;
    Mock::given(method("GET"))
        .and(path("/services/server/info"))
        .and(header("authorization", "Splunk abc123"))
        .and(query_param("count", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "entry": [{
                "name": "server-info",
                "content": {
                    "host": "sh1",
                    "host_fqdn": "sh1.example.com",
                    "server_roles": ["search_head", "cluster_search_head"]
                }
            }]
        })))
        .expect(2)
        .mount(&server)
        .await;

    let client = client(&server);
    let info = client.server_info().await.unwrap();
    assert_eq!(info.content.host_fqdn, "sh1.example.com");
    client.server_info().await.unwrap();
    assert_eq!(client.session_logins(), 1);
}

#[tokio::test]
async fn create_user_posts_form_and_returns_entry() {
    let server = MockServer::start().await;
    mount_login(&server, "abc123", 1).await;
    Mock::given(method("POST"))
        .and(path("/services/authentication/users"))
        .and(body_string_contains("name=ephemera_1"))
        .and(body_string_contains("roles=user"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "entry": [{ "name": "ephemera_1", "content": { "roles": ["user"], "type": "Splunk" } }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let created = client(&server)
        .create_user(&CreateUserOptions {
            name: "ephemera_1".to_string(),
            password: "pw".to_string(),
            roles: vec!["user".to_string()],
            ..CreateUserOptions::default()
        })
        .await
        .unwrap();
    assert_eq!(created.name, "ephemera_1");
    assert_eq!(created.content.roles, vec!["user"]);
    assert_eq!(created.content.kind, "Splunk");
}

#[tokio::test]
async fn message_envelope_becomes_api_error() {
    let server = MockServer::start().await;
    mount_login(&server, "abc123", 1).await;
    Mock::given(method("POST"))
        .and(path("/services/authentication/users/admin"))
        .and(body_string_contains("oldpassword=changeme"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "messages": [{ "type": "ERROR", "text": "Password does not meet requirements" }]
        })))
        .mount(&server)
        .await;

    let err = client(&server)
        .update_user(
            "admin",
            &UpdateUserOptions::change_password("changeme", "short"),
        )
        .await
        .unwrap_err();
    match err {
        SplunkError::Api {
            operation,
            status,
            messages,
        } => {
            assert_eq!(operation, "update_user");
            assert_eq!(status, 400);
            assert_eq!(messages[0].text, "Password does not meet requirements");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn rejected_session_is_dropped_and_next_call_logs_in_again() {
    let server = MockServer::start().await;
    mount_login(&server, "abc123", 2).await;
    Mock::given(method("DELETE"))
        .and(path("/services/authentication/users/ephemera_1"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "messages": [{ "type": "WARN", "text": "call not properly authenticated" }]
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/services/authentication/users/ephemera_1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "entry": [] })))
        .mount(&server)
        .await;

    let client = client(&server);
    let err = client.delete_user("ephemera_1").await.unwrap_err();
    assert!(err.is_auth());
    client.delete_user("ephemera_1").await.unwrap();
    assert_eq!(client.session_logins(), 2);
}

#[tokio::test]
async fn failed_login_is_an_auth_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/services/auth/login"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "messages": [{ "type": "WARN", "code": "incorrect_username_or_password", "text": "Login failed" }]
        })))
        .mount(&server)
        .await;

    let err = client(&server).server_info().await.unwrap_err();
    assert!(err.is_auth());
    assert_eq!(
        err.messages()[0].code.as_deref(),
        Some("incorrect_username_or_password")
    );
}

#[tokio::test]
async fn peer_listing_requests_only_routing_fields() {
    let server = MockServer::start().await;
    mount_login(&server, "abc123", 1).await;
    Mock::given(method("GET"))
        .and(path("/services/search/distributed/peers"))
        .and(query_param("f", "host_fqdn"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "entry": [
                { "name": "idx1:8089", "content": { "host": "idx1", "host_fqdn": "idx1.example.com", "server_roles": ["indexer"] } },
                { "name": "kv1:8089", "content": { "host": "kv1", "host_fqdn": "kv1.example.com", "server_roles": ["kv_store"] } }
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let peers = client(&server)
        .list_peers(&PeerFilter::routing())
        .await
        .unwrap();
    let hosts: Vec<_> = peers.iter().map(|p| p.content.host.as_str()).collect();
    assert_eq!(hosts, vec!["idx1", "kv1"]);
}
