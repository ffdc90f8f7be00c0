#![allow(clippy::unwrap_used)]
// Integration tests for `TelemetryClient` using wiremock.

use std::sync::Arc;
use std::time::Duration;

use secrecy::SecretString;
use serde_json::json;
use url::Url;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use wifipool_api::{Credentials, Error, SessionManager, TelemetryClient};

// ── Helpers ─────────────────────────────────────────────────────────

fn credentials() -> Credentials {
    Credentials::new("pool@example.com", SecretString::from("hunter2".to_string()))
}

async fn setup() -> (MockServer, TelemetryClient) {
    let server = MockServer::start().await;
    let base_url = Url::parse(&server.uri()).unwrap();
    let client = TelemetryClient::with_client(reqwest::Client::new(), base_url, credentials());
    (server, client)
}

async fn mount_login(server: &MockServer, expected_calls: u64) {
    Mock::given(method("POST"))
        .and(path("/users/login"))
        .and(body_json(json!({
            "email": "pool@example.com",
            "namespace": "default",
            "password": "hunter2"
        })))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("set-cookie", "connect.sid=s%3Atoken; Path=/; HttpOnly")
                .set_body_json(json!({
                    "user": {
                        "mobile_user_id": "11111111-1111-4111-8111-111111111111",
                        "mobile_user_mail": "pool@example.com"
                    }
                })),
        )
        .expect(expected_calls)
        .mount(server)
        .await;
}

// ── Session tests ───────────────────────────────────────────────────

#[tokio::test]
async fn test_login_records_identity() {
    let (server, client) = setup().await;
    mount_login(&server, 1).await;

    let session = client.login().await.unwrap();
    assert_eq!(session.cookie_header(), "connect.sid=s%3Atoken");
    assert_eq!(session.identity(), Some("pool@example.com"));
    assert_eq!(
        session.user_id(),
        Some("11111111-1111-4111-8111-111111111111")
    );
}

#[tokio::test]
async fn test_session_is_cached_across_calls() {
    let (server, client) = setup().await;
    mount_login(&server, 1).await;

    Mock::given(method("GET"))
        .and(path("/groups/accessible"))
        .and(header("cookie", "connect.sid=s%3Atoken"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(2)
        .mount(&server)
        .await;

    client.list_accessible_groups().await.unwrap();
    client.list_accessible_groups().await.unwrap();
}

#[tokio::test]
async fn test_login_failure_carries_status() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/users/login"))
        .respond_with(ResponseTemplate::new(403).set_body_string("bad credentials"))
        .mount(&server)
        .await;

    let result = client.login().await;
    assert!(
        matches!(result, Err(Error::Authentication { status: 403, .. })),
        "expected Authentication error, got: {result:?}"
    );
}

#[tokio::test]
async fn test_login_without_cookie_is_protocol_error() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/users/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;

    let result = client.login().await;
    assert!(
        matches!(result, Err(Error::Protocol { .. })),
        "expected Protocol error, got: {result:?}"
    );
}

#[tokio::test]
async fn test_missing_password_is_configuration_error() {
    let server = MockServer::start().await;
    let client = TelemetryClient::with_client(
        reqwest::Client::new(),
        Url::parse(&server.uri()).unwrap(),
        Credentials {
            email: Some("pool@example.com".into()),
            password: None,
        },
    );

    let result = client.list_accessible_groups().await;
    assert!(matches!(result, Err(Error::Configuration { .. })));
}

#[tokio::test]
async fn test_unauthorized_invalidates_session() {
    let (server, client) = setup().await;
    mount_login(&server, 2).await;

    Mock::given(method("GET"))
        .and(path("/groups/accessible"))
        .respond_with(ResponseTemplate::new(401))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/groups/accessible"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "a": 1 }])))
        .mount(&server)
        .await;

    let first = client.list_accessible_groups().await;
    assert!(first.as_ref().is_err_and(Error::is_auth_expired));
    assert!(!client.session().has_session().await);

    let second = client.list_accessible_groups().await.unwrap();
    assert_eq!(second, json!([{ "a": 1 }]));
}

#[tokio::test]
async fn test_expired_session_logs_in_again() {
    let server = MockServer::start().await;
    let base_url = Url::parse(&server.uri()).unwrap();
    let http = reqwest::Client::new();
    let session = SessionManager::new(http.clone(), base_url.clone(), credentials())
        .with_ttl(Duration::from_millis(50));
    let client = TelemetryClient::with_session(http, base_url, Arc::new(session));
    mount_login(&server, 2).await;

    Mock::given(method("GET"))
        .and(path("/groups/accessible"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(2)
        .mount(&server)
        .await;

    client.list_accessible_groups().await.unwrap();
    tokio::time::sleep(Duration::from_millis(120)).await;
    client.list_accessible_groups().await.unwrap();
}

// ── Group tests ─────────────────────────────────────────────────────

#[tokio::test]
async fn test_accessible_groups_304_is_empty() {
    let (server, client) = setup().await;
    mount_login(&server, 1).await;

    Mock::given(method("GET"))
        .and(path("/groups/accessible"))
        .respond_with(ResponseTemplate::new(304))
        .mount(&server)
        .await;

    assert_eq!(client.list_accessible_groups().await.unwrap(), json!([]));
}

#[tokio::test]
async fn test_group_info_sends_domain_id() {
    let (server, client) = setup().await;
    mount_login(&server, 1).await;

    Mock::given(method("POST"))
        .and(path("/groups/getInfo"))
        .and(body_json(json!({ "domainId": "dom" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "mobile_group_data": {
                "io": [{ "id": "dev.o0", "device": "dev" }],
                "devices": [{ "id": "dev" }]
            }
        })))
        .mount(&server)
        .await;

    let info = client.get_group_info("dom").await.unwrap();
    assert_eq!(info.io_len(), 1);
    assert_eq!(info.first_device_id().as_deref(), Some("dev"));
}

#[tokio::test]
async fn test_group_info_server_error() {
    let (server, client) = setup().await;
    mount_login(&server, 1).await;

    Mock::given(method("POST"))
        .and(path("/groups/getInfo"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let result = client.get_group_info("dom").await;
    assert!(matches!(
        result,
        Err(Error::Telemetry { status: 500, ref body }) if body == "boom"
    ));
}

// ── Sample tests ────────────────────────────────────────────────────

#[tokio::test]
async fn test_get_samples_parses_array() {
    let (server, client) = setup().await;
    mount_login(&server, 1).await;

    Mock::given(method("POST"))
        .and(path("/harmopool/getStats"))
        .and(body_json(json!({ "domain": "dom", "io": "dev.i0", "after": 1000 })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                "device_sensor_time": "2024-06-15T10:30:00Z",
                "device_sensor_data": { "analog": { "0": 7.2 } }
            },
            {
                "device_sensor_time": "2024-06-15T10:31:00Z",
                "device_sensor_data": { "analog": { "0": 7.3 } }
            }
        ])))
        .mount(&server)
        .await;

    let samples = client.get_samples("dom", "dev.i0", 1000).await.unwrap();
    assert_eq!(samples.len(), 2);
    assert_eq!(samples[1].sensor_object("analog").unwrap()["0"], json!(7.3));
}

#[tokio::test]
async fn test_get_samples_404_is_empty() {
    let (server, client) = setup().await;
    mount_login(&server, 1).await;

    Mock::given(method("POST"))
        .and(path("/harmopool/getStats"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    assert!(client.get_samples("dom", "dev.o9", 0).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_get_samples_rejects_non_array() {
    let (server, client) = setup().await;
    mount_login(&server, 1).await;

    Mock::given(method("POST"))
        .and(path("/harmopool/getStats"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "oops": true })))
        .mount(&server)
        .await;

    let result = client.get_samples("dom", "dev.i0", 0).await;
    assert!(matches!(result, Err(Error::Protocol { .. })));
}

// ── Manual IO tests ─────────────────────────────────────────────────

#[tokio::test]
async fn test_set_manual_value_success() {
    let (server, client) = setup().await;
    mount_login(&server, 1).await;

    Mock::given(method("POST"))
        .and(path("/harmopool/setManualIO"))
        .and(body_json(json!({ "domain": "dom", "io": "dev.o3", "value": true })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    client.set_manual_value("dom", "dev.o3", true).await.unwrap();
}

#[tokio::test]
async fn test_set_manual_value_sensor_rejection() {
    let (server, client) = setup().await;
    mount_login(&server, 1).await;

    Mock::given(method("POST"))
        .and(path("/harmopool/setManualIO"))
        .respond_with(
            ResponseTemplate::new(403).set_body_string("Manual IO on sensors is not allowed"),
        )
        .mount(&server)
        .await;

    let result = client.set_manual_value("dom", "dev.i1", false).await;
    assert!(result.as_ref().is_err_and(Error::is_sensor_rejection));
}

#[tokio::test]
async fn test_set_manual_value_other_forbidden() {
    let (server, client) = setup().await;
    mount_login(&server, 1).await;

    Mock::given(method("POST"))
        .and(path("/harmopool/setManualIO"))
        .respond_with(ResponseTemplate::new(403).set_body_string("quota exceeded"))
        .mount(&server)
        .await;

    let result = client.set_manual_value("dom", "dev.o1", true).await;
    assert!(matches!(result, Err(Error::Telemetry { status: 403, .. })));
}

#[tokio::test]
async fn test_set_manual_value_server_error_mentioning_sensor() {
    let (server, client) = setup().await;
    mount_login(&server, 1).await;

    Mock::given(method("POST"))
        .and(path("/harmopool/setManualIO"))
        .respond_with(
            ResponseTemplate::new(503).set_body_string("Sensor gateway temporarily unavailable"),
        )
        .mount(&server)
        .await;

    let result = client.set_manual_value("dom", "dev.o3", true).await;
    assert!(
        matches!(result, Err(Error::Telemetry { status: 503, .. })),
        "expected Telemetry error, got: {result:?}"
    );
}
