#![allow(clippy::unwrap_used)]
// End-to-end tests for `PoolController` against a wiremock vendor API.

use std::sync::Arc;

use chrono::{Duration, Utc};
use pretty_assertions::assert_eq;
use secrecy::SecretString;
use serde_json::{Value, json};
use url::Url;
use wiremock::matchers::{body_json, body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use wifipool_api::TransportConfig;
use wifipool_core::samples::fetch_with_fallback;
use wifipool_core::{
    CapabilityHost, CapabilityValue, ChannelId, ChannelKind, CoreError, IoMap, MemoryHost,
    MemorySetupStore, PoolConfig, PoolController, SensorSlot, SetupStore, TelemetryClient,
};

const DOMAIN: &str = "d0d0d0d0-0000-4000-8000-000000000001";
const DEVICE: &str = "dededede-0000-4000-8000-000000000002";
const USER: &str = "eeeeeeee-0000-4000-8000-000000000003";
const CREATOR: &str = "cccccccc-0000-4000-8000-000000000004";

// ── Helpers ─────────────────────────────────────────────────────────

fn io(local: &str) -> String {
    format!("{DEVICE}.{local}")
}

fn sample(age_secs: i64, sensor: Value, state: Value) -> Value {
    json!({
        "device_sensor_time": (Utc::now() - Duration::seconds(age_secs)).to_rfc3339(),
        "device_sensor_data": sensor,
        "device_state_data": state
    })
}

fn config(server: &MockServer) -> PoolConfig {
    let mut config = PoolConfig::new(
        Some("pool@example.com".into()),
        Some(SecretString::from("hunter2".to_string())),
    )
    .unwrap();
    config.base_url = Url::parse(&server.uri()).unwrap();
    config
}

fn controller(
    server: &MockServer,
    host: &Arc<MemoryHost>,
    store: &Arc<MemorySetupStore>,
) -> PoolController {
    PoolController::new(config(server), host.clone(), store.clone()).unwrap()
}

fn full_map() -> IoMap {
    let mut map = IoMap::new(DOMAIN, DEVICE);
    map.switches = vec![ChannelId::output(DEVICE, 3)];
    map.ph = Some(SensorSlot::new(ChannelId::input(DEVICE, 0), Some("0".into())));
    map.redox = Some(SensorSlot::new(ChannelId::input(DEVICE, 1), Some("0".into())));
    map.temperature = Some(SensorSlot::new(ChannelId::input(DEVICE, 2), None));
    map
}

async fn mount_login(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/users/login"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("set-cookie", "connect.sid=s%3Atoken; Path=/; HttpOnly")
                .set_body_json(json!({
                    "user": { "mobile_user_id": USER, "mobile_user_mail": "pool@example.com" }
                })),
        )
        .mount(server)
        .await;
}

async fn mount_stats(server: &MockServer, local: &str, body: Value) {
    Mock::given(method("POST"))
        .and(path("/harmopool/getStats"))
        .and(body_partial_json(json!({ "io": io(local) })))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

async fn mount_empty_stats(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/harmopool/getStats"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .with_priority(10)
        .mount(server)
        .await;
}

async fn mount_group(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/groups/accessible"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "mobile_group_uuid": DOMAIN,
            "mobile_group_creator": CREATOR,
            "mobile_group_data": { "devices": [{ "id": DEVICE }] }
        }])))
        .mount(server)
        .await;
    mount_group_info(server).await;
}

async fn mount_group_info(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/groups/getInfo"))
        .and(body_json(json!({ "domainId": DOMAIN })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "mobile_group_data": {
                "devices": [{ "id": DEVICE }],
                "io": [
                    { "id": io("i0"), "device": DEVICE },
                    { "id": io("i1"), "device": DEVICE },
                    { "id": io("i2"), "device": DEVICE },
                    { "id": io("o3"), "device": DEVICE }
                ]
            }
        })))
        .mount(server)
        .await;
}

async fn mount_pool_readings(server: &MockServer, age_secs: i64) {
    mount_stats(
        server,
        "i0",
        json!([sample(age_secs, json!({ "analog": { "0": 7.2 } }), Value::Null)]),
    )
    .await;
    mount_stats(
        server,
        "i1",
        json!([sample(age_secs, json!({ "analog": { "0": 650 } }), Value::Null)]),
    )
    .await;
    mount_stats(
        server,
        "i2",
        json!([sample(age_secs, json!({ "ds18b20": { "temperature": 22.5 } }), Value::Null)]),
    )
    .await;
    mount_stats(
        server,
        "o3",
        json!([sample(age_secs, json!({}), json!({ "power": true }))]),
    )
    .await;
    mount_empty_stats(server).await;
}

// ── Auto setup ──────────────────────────────────────────────────────

#[tokio::test]
async fn test_auto_setup_maps_every_role() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    mount_group(&server).await;
    mount_pool_readings(&server, 60).await;

    let host = Arc::new(MemoryHost::new());
    let store = Arc::new(MemorySetupStore::new());
    let ctl = controller(&server, &host, &store);

    let report = ctl.run_auto_setup().await.unwrap();
    let map = &report.io_map;

    assert_eq!(map.domain, DOMAIN);
    assert_eq!(map.device_uuid, DEVICE);
    assert_eq!(map.switches, vec![ChannelId::output(DEVICE, 3)]);
    assert_eq!(map.ph.as_ref().unwrap().io, ChannelId::input(DEVICE, 0));
    assert_eq!(map.redox.as_ref().unwrap().io, ChannelId::input(DEVICE, 1));
    assert_eq!(map.temperature.as_ref().unwrap().io, ChannelId::input(DEVICE, 2));
    assert!(map.flow.is_none());
    assert_eq!(report.name, "WiFiPool Temp pH ORP 1xSwitch");

    let kinds: Vec<_> = report.classifications.iter().map(|c| c.kind).collect();
    assert!(kinds.contains(&ChannelKind::Ds18b20Temperature));
    assert!(kinds.contains(&ChannelKind::Switch));

    assert_eq!(store.load().unwrap().as_ref(), Some(map));
    for cap in [
        "measure_ph",
        "measure_redox",
        "measure_temperature",
        "alarm_flow",
        "alarm_health",
        "onoff.o3",
    ] {
        assert!(host.has_capability(cap), "{cap} missing");
    }
    assert!(host.listeners().contains("onoff.o3"));

    let descriptor = ctl.pairing_descriptor().unwrap().unwrap();
    assert_eq!(descriptor.id, DEVICE);
}

#[tokio::test]
async fn test_auto_setup_without_groups_fails() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    Mock::given(method("GET"))
        .and(path("/groups/accessible"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let host = Arc::new(MemoryHost::new());
    let store = Arc::new(MemorySetupStore::new());
    let result = controller(&server, &host, &store).run_auto_setup().await;

    assert!(matches!(result, Err(CoreError::NoGroups)));
    assert!(store.load().unwrap().is_none());
}

#[tokio::test]
async fn test_auto_setup_recovers_from_expired_session_mid_probe() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    mount_group(&server).await;
    Mock::given(method("POST"))
        .and(path("/harmopool/getStats"))
        .and(body_partial_json(json!({ "io": io("i0") })))
        .respond_with(ResponseTemplate::new(401))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    mount_pool_readings(&server, 60).await;

    let host = Arc::new(MemoryHost::new());
    let store = Arc::new(MemorySetupStore::new());
    let report = controller(&server, &host, &store)
        .run_auto_setup()
        .await
        .unwrap();

    assert_eq!(
        report.io_map.ph.as_ref().unwrap().io,
        ChannelId::input(DEVICE, 0)
    );
    let logins = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.url.path() == "/users/login")
        .count();
    assert_eq!(logins, 2);
}

// ── Discovery ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_discover_prefers_stored_domain() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    mount_group_info(&server).await;
    Mock::given(method("GET"))
        .and(path("/groups/accessible"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .named("groups/accessible must not be called")
        .mount(&server)
        .await;

    let host = Arc::new(MemoryHost::new());
    let store = Arc::new(MemorySetupStore::with_map(IoMap::new(DOMAIN, DEVICE)));
    let discovery = controller(&server, &host, &store)
        .discover_channels()
        .await
        .unwrap();

    assert_eq!(discovery.domain, DOMAIN);
    assert_eq!(discovery.device_uuid.as_deref(), Some(DEVICE));
    assert_eq!(discovery.channels.len(), 4);
    assert_eq!(discovery.channels[3], io("o3"));
}

// ── Polling ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_poll_publishes_each_change_once() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    mount_pool_readings(&server, 30).await;

    let host = Arc::new(MemoryHost::new());
    let store = Arc::new(MemorySetupStore::with_map(full_map()));
    let ctl = controller(&server, &host, &store);
    ctl.initialize().await.unwrap();

    let first = ctl.poll_once().await;
    assert!(first.healthy, "errors: {:?}", first.errors);
    assert_eq!(
        host.capability_value("measure_ph"),
        Some(CapabilityValue::Number(7.2))
    );
    assert_eq!(
        host.capability_value("measure_redox"),
        Some(CapabilityValue::Number(650.0))
    );
    assert_eq!(
        host.capability_value("measure_temperature"),
        Some(CapabilityValue::Number(22.5))
    );
    assert_eq!(host.capability_value("onoff.o3"), Some(CapabilityValue::Bool(true)));
    assert_eq!(host.capability_value("alarm_flow"), Some(CapabilityValue::Bool(true)));
    assert_eq!(host.capability_value("alarm_health"), Some(CapabilityValue::Bool(false)));
    assert_eq!(first.flow.as_ref().unwrap().source, ChannelId::output(DEVICE, 3));

    let second = ctl.poll_once().await;
    assert!(second.healthy);
    assert!(second.published.is_empty());

    for cap in ["measure_ph", "measure_redox", "measure_temperature", "alarm_flow"] {
        assert_eq!(host.set_count(cap), 1, "{cap}");
    }
    let triggers = host.triggers();
    assert_eq!(triggers.iter().filter(|t| *t == "ph_updated").count(), 1);
    assert_eq!(triggers.iter().filter(|t| *t == "health_changed").count(), 1);
}

#[tokio::test]
async fn test_stale_readings_are_not_published() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    mount_pool_readings(&server, 3600).await;

    let host = Arc::new(MemoryHost::new());
    let store = Arc::new(MemorySetupStore::with_map(full_map()));
    let ctl = controller(&server, &host, &store);
    ctl.initialize().await.unwrap();

    let report = ctl.poll_once().await;
    assert!(report.healthy);
    assert_eq!(host.capability_value("measure_ph"), None);
    assert_eq!(host.capability_value("measure_temperature"), None);
    // Switch state and flow are not subject to staleness.
    assert_eq!(host.capability_value("alarm_flow"), Some(CapabilityValue::Bool(true)));
}

#[tokio::test]
async fn test_sensor_failure_marks_cycle_unhealthy() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    Mock::given(method("POST"))
        .and(path("/harmopool/getStats"))
        .and(body_partial_json(json!({ "io": io("i0") })))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;
    mount_pool_readings(&server, 30).await;

    let host = Arc::new(MemoryHost::new());
    let store = Arc::new(MemorySetupStore::with_map(full_map()));
    let ctl = controller(&server, &host, &store);
    ctl.initialize().await.unwrap();

    let report = ctl.poll_once().await;
    assert!(!report.healthy);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(host.capability_value("alarm_health"), Some(CapabilityValue::Bool(true)));
    assert_eq!(
        host.capability_value("measure_redox"),
        Some(CapabilityValue::Number(650.0))
    );
}

#[tokio::test]
async fn test_missing_setup_raises_health_alarm() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/harmopool/getStats"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&server)
        .await;

    let host = Arc::new(MemoryHost::with_capabilities(["alarm_health"]));
    let store = Arc::new(MemorySetupStore::new());
    let report = controller(&server, &host, &store).poll_once().await;

    assert!(report.skipped);
    assert_eq!(host.capability_value("alarm_health"), Some(CapabilityValue::Bool(true)));
}

#[tokio::test]
async fn test_empty_millisecond_query_retries_in_seconds() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    Mock::given(method("POST"))
        .and(path("/harmopool/getStats"))
        .and(body_partial_json(json!({ "io": io("i0"), "after": 1_718_447_400 })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            sample(10, json!({ "analog": { "0": 7.0 } }), Value::Null)
        ])))
        .expect(1)
        .mount(&server)
        .await;
    mount_empty_stats(&server).await;

    let client = TelemetryClient::with_client(
        TransportConfig::default().build_client().unwrap(),
        Url::parse(&server.uri()).unwrap(),
        config(&server).credentials(),
    );
    let samples = fetch_with_fallback(
        &client,
        DOMAIN,
        &ChannelId::input(DEVICE, 0),
        1_718_447_400_123,
    )
    .await
    .unwrap();

    assert_eq!(samples.len(), 1);
    let stats_calls = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.url.path() == "/harmopool/getStats")
        .count();
    assert_eq!(stats_calls, 2);
}

// ── Switch writability ──────────────────────────────────────────────

#[tokio::test]
async fn test_switch_writability_is_learned_and_persisted() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    Mock::given(method("POST"))
        .and(path("/harmopool/setManualIO"))
        .and(body_partial_json(json!({ "io": io("o4") })))
        .respond_with(ResponseTemplate::new(403).set_body_string("cannot set value of a sensor"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/harmopool/setManualIO"))
        .and(body_partial_json(json!({ "io": io("i1"), "value": true })))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let mut map = IoMap::new(DOMAIN, DEVICE);
    map.switches = vec![
        ChannelId::output(DEVICE, 3),
        ChannelId::input(DEVICE, 1),
        ChannelId::output(DEVICE, 4),
    ];
    let host = Arc::new(MemoryHost::new());
    let store = Arc::new(MemorySetupStore::with_map(map));
    let ctl = controller(&server, &host, &store);
    ctl.initialize().await.unwrap();
    assert_eq!(
        host.listeners().into_iter().collect::<Vec<_>>(),
        vec!["onoff.o3", "onoff.o4"]
    );

    let err = ctl.set_switch("o4", true).await.unwrap_err();
    assert!(matches!(err, CoreError::SensorChannel { .. }));
    ctl.set_switch("i1", true).await.unwrap();

    assert_eq!(
        host.listeners().into_iter().collect::<Vec<_>>(),
        vec!["onoff.i1", "onoff.o3"]
    );
    assert_eq!(host.capability_value("onoff.i1"), Some(CapabilityValue::Bool(true)));

    let persisted = store.load().unwrap().unwrap().writability;
    assert_eq!(persisted.get(&ChannelId::output(DEVICE, 4)), Some(&false));
    assert_eq!(persisted.get(&ChannelId::input(DEVICE, 1)), Some(&true));
}

#[tokio::test]
async fn test_server_error_leaves_switch_writable() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    Mock::given(method("POST"))
        .and(path("/harmopool/setManualIO"))
        .respond_with(
            ResponseTemplate::new(503).set_body_string("Sensor gateway temporarily unavailable"),
        )
        .mount(&server)
        .await;

    let mut map = IoMap::new(DOMAIN, DEVICE);
    map.switches = vec![ChannelId::output(DEVICE, 3)];
    let host = Arc::new(MemoryHost::new());
    let store = Arc::new(MemorySetupStore::with_map(map));
    let ctl = controller(&server, &host, &store);
    ctl.initialize().await.unwrap();

    let err = ctl.set_switch("o3", true).await.unwrap_err();
    assert!(
        matches!(err, CoreError::Telemetry { status: 503, .. }),
        "expected Telemetry error, got: {err:?}"
    );
    assert!(ctl.is_writable("o3").await.unwrap());
    assert_eq!(
        host.listeners().into_iter().collect::<Vec<_>>(),
        vec!["onoff.o3"]
    );
    let persisted = store.load().unwrap().unwrap().writability;
    assert_eq!(persisted.get(&ChannelId::output(DEVICE, 3)), None);
}
