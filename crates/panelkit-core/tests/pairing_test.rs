// Integration tests for the simultaneous pairing batch, driven by
// wiremock panels with scaled-down timing.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::time::Instant;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use panelkit_api::PanelClient;
use panelkit_core::{
    BatchState, CoreError, DeviceRegistry, PairingConfig, PairingFailure, PairingOutcome,
    PairingOrchestrator, PairingState, PanelEndpoint, PanelId,
};

// ── Helpers ─────────────────────────────────────────────────────────

fn fast_config() -> PairingConfig {
    PairingConfig {
        call_timeout: Duration::from_millis(150),
        attempts: 5,
        backoff: Duration::from_millis(100),
        default_window: Duration::from_millis(700),
    }
}

fn register(registry: &DeviceRegistry, id: &str, server: &MockServer) -> PanelId {
    let uri: url::Url = server.uri().parse().unwrap();
    let endpoint = PanelEndpoint::new(
        uri.host_str().unwrap().parse().unwrap(),
        uri.port().unwrap(),
    );
    let pid = PanelId::new(id);
    registry.upsert_candidate(pid.clone(), endpoint, id, None);
    pid
}

/// A panel whose pairing window is open: hands out a token and serves
/// its self-description.
async fn pairable_panel(token: &str, model: &str) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/new"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "auth_token": token })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/api/v1/{token}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": "Panel",
            "model": model,
            "effects": { "effectsList": ["Snowfall"] },
            "panelLayout": { "layout": { "numPanels": 4, "positionData": [{}] } }
        })))
        .mount(&server)
        .await;
    server
}

/// A panel that never answers in time.
async fn dead_panel(delay: Duration) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/new"))
        .respond_with(ResponseTemplate::new(200).set_delay(delay))
        .mount(&server)
        .await;
    server
}

// ── Batches ─────────────────────────────────────────────────────────

#[tokio::test]
async fn batch_pairs_reachable_devices_and_expires_the_rest() {
    let registry = Arc::new(DeviceRegistry::new());
    let a = pairable_panel("tok-a", "NL52").await;
    let b = pairable_panel("tok-b", "NL52").await;
    let c = dead_panel(Duration::from_secs(5)).await;
    let d = pairable_panel("tok-d", "NL22").await;

    let id_a = register(&registry, "a", &a);
    let id_b = register(&registry, "b", &b);
    let id_c = register(&registry, "c", &c);
    let id_d = register(&registry, "d", &d);

    let config = fast_config();
    let window = config.default_window;
    let orchestrator = PairingOrchestrator::new(
        Arc::clone(&registry),
        PanelClient::from_reqwest(reqwest::Client::new()),
        config,
    );

    let (batch, proceed) = orchestrator
        .begin(&[id_a.clone(), id_b.clone(), id_c.clone(), id_d.clone()])
        .unwrap();
    let mut state = batch.watch_state();
    assert_eq!(*state.borrow_and_update(), BatchState::AwaitingUserAction);

    proceed.proceed();
    let started = Instant::now();
    let report = batch.run(Some(window)).await.unwrap();
    let elapsed = started.elapsed();

    assert_eq!(report[&id_a], PairingOutcome::Paired);
    assert_eq!(report[&id_b], PairingOutcome::Paired);
    assert_eq!(report[&id_d], PairingOutcome::Paired);
    assert_eq!(
        report[&id_c],
        PairingOutcome::Failed(PairingFailure::WindowExpired)
    );

    // The unreachable device cost exactly the window, nothing more.
    assert!(elapsed >= window - Duration::from_millis(50));
    assert!(elapsed < window + Duration::from_secs(1));
    assert_eq!(*state.borrow_and_update(), BatchState::Completed);

    // Paired records carry their token and were hydrated.
    let record = registry.get(&id_a).unwrap();
    assert_eq!(record.auth_token().unwrap().expose(), "tok-a");
    assert_eq!(record.model.sku(), "NL52");
    assert!(record.capabilities.is_some());

    let record = registry.get(&id_c).unwrap();
    assert!(matches!(record.pairing, PairingState::Failed { .. }));
}

#[tokio::test]
async fn batch_completes_early_when_every_device_pairs() {
    let registry = Arc::new(DeviceRegistry::new());
    let a = pairable_panel("tok-a", "NL29").await;
    let id_a = register(&registry, "a", &a);

    let orchestrator = PairingOrchestrator::new(
        Arc::clone(&registry),
        PanelClient::from_reqwest(reqwest::Client::new()),
        fast_config(),
    );
    let (batch, proceed) = orchestrator.begin(&[id_a.clone()]).unwrap();
    proceed.proceed();

    let started = Instant::now();
    let report = batch.run(Some(Duration::from_secs(10))).await.unwrap();
    assert_eq!(report[&id_a], PairingOutcome::Paired);
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn closed_pairing_window_is_reported_after_retries() {
    let registry = Arc::new(DeviceRegistry::new());
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/new"))
        .respond_with(ResponseTemplate::new(403))
        .expect(2)
        .mount(&server)
        .await;
    let id = register(&registry, "a", &server);

    let config = PairingConfig {
        call_timeout: Duration::from_millis(300),
        attempts: 2,
        backoff: Duration::from_millis(50),
        default_window: Duration::from_secs(5),
    };
    let orchestrator = PairingOrchestrator::new(
        Arc::clone(&registry),
        PanelClient::from_reqwest(reqwest::Client::new()),
        config,
    );
    let (batch, proceed) = orchestrator.begin(&[id.clone()]).unwrap();
    proceed.proceed();

    let report = batch.run(None).await.unwrap();
    assert_eq!(
        report[&id],
        PairingOutcome::Failed(PairingFailure::NotInPairingMode)
    );
    let record = registry.get(&id).unwrap();
    assert!(matches!(record.pairing, PairingState::Failed { .. }));
}

#[tokio::test]
async fn failed_device_can_join_the_next_batch() {
    let registry = Arc::new(DeviceRegistry::new());

    // First batch: pairing window closed.
    let server = MockServer::start().await;
    let closed = Mock::given(method("POST"))
        .and(path("/api/v1/new"))
        .respond_with(ResponseTemplate::new(403))
        .mount_as_scoped(&server)
        .await;
    let id = register(&registry, "a", &server);

    let config = PairingConfig {
        call_timeout: Duration::from_millis(300),
        attempts: 1,
        backoff: Duration::from_millis(10),
        default_window: Duration::from_secs(5),
    };
    let orchestrator = PairingOrchestrator::new(
        Arc::clone(&registry),
        PanelClient::from_reqwest(reqwest::Client::new()),
        config,
    );
    let (batch, proceed) = orchestrator.begin(&[id.clone()]).unwrap();
    proceed.proceed();
    let report = batch.run(None).await.unwrap();
    assert!(matches!(report[&id], PairingOutcome::Failed(_)));

    // Second batch: the user opened the window this time.
    drop(closed);
    Mock::given(method("POST"))
        .and(path("/api/v1/new"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "auth_token": "tok-a" })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/tok-a"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "model": "NL52" })))
        .mount(&server)
        .await;

    let (batch, proceed) = orchestrator.begin(&[id.clone()]).unwrap();
    proceed.proceed();
    let report = batch.run(None).await.unwrap();
    assert_eq!(report[&id], PairingOutcome::Paired);
    assert!(registry.get(&id).unwrap().is_paired());
}

#[tokio::test]
async fn aborted_batch_leaves_records_untouched() {
    let registry = Arc::new(DeviceRegistry::new());
    let server = MockServer::start().await;
    let id = register(&registry, "a", &server);

    let orchestrator = PairingOrchestrator::new(
        Arc::clone(&registry),
        PanelClient::from_reqwest(reqwest::Client::new()),
        fast_config(),
    );
    let (batch, proceed) = orchestrator.begin(&[id.clone()]).unwrap();
    drop(proceed);

    let err = batch.run(None).await.unwrap_err();
    assert!(matches!(err, CoreError::PairingAborted));
    assert_eq!(registry.get(&id).unwrap().pairing, PairingState::Discovered);
}
