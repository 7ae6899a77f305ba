//! End-to-end tests for the polling pipeline and management API.

use async_trait::async_trait;
use futures_util::StreamExt;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use service_poller::config::PollerConfig;
use service_poller::fanout::{ProbeOutcome, StatusFanout, StatusPersister};
use service_poller::health::{HealthProbe, HttpProbe, ProbeError};
use service_poller::lifecycle::Shutdown;
use service_poller::poller::PollScheduler;
use service_poller::registry::{ServiceStatus, ServiceStore};
use service_poller::resilience::{BreakerBank, BreakerSettings, CircuitState};

mod common;

/// Probe that always fails and counts how often it was asked.
#[derive(Default)]
struct CountingProbe {
    calls: AtomicU32,
}

#[async_trait]
impl HealthProbe for CountingProbe {
    async fn probe(&self, _endpoint: &Url) -> Result<ServiceStatus, ProbeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(ProbeError::Transport("connection refused".into()))
    }
}

fn test_client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_healthy_service_stays_closed() {
    let backend = common::start_mock_backend("OK").await;

    let store = ServiceStore::new(None);
    let service = store
        .insert("healthy".into(), Url::parse(&format!("http://{}/", backend)).unwrap())
        .await
        .unwrap();

    let shutdown = Shutdown::new();
    let fanout = StatusFanout::new(16);
    let mut observer = fanout.subscribe("observer");
    let persister = StatusPersister::new(Arc::new(store.clone()));
    let persister_task = tokio::spawn(persister.run(fanout.subscribe("persister"), shutdown.subscribe()));

    let breakers = Arc::new(BreakerBank::new(BreakerSettings::default()));
    let scheduler = PollScheduler::new(
        Arc::new(store.clone()),
        Arc::new(HttpProbe::new("test-agent")),
        breakers.clone(),
        fanout,
        &PollerConfig::default(),
    );

    for _ in 0..3 {
        let summary = scheduler.run_tick().await.unwrap();
        assert_eq!(summary.ok, 1);
    }

    for _ in 0..3 {
        let event = observer.recv().await.unwrap();
        assert_eq!(event.status(), ServiceStatus::Ok);
        assert_eq!(event.outcome, ProbeOutcome::Verdict);
    }
    assert_eq!(breakers.breaker(service.id).state(), CircuitState::Closed);

    // Persister runs on its own task.
    for _ in 0..50 {
        if store.get(service.id).unwrap().current_status == ServiceStatus::Ok {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(store.get(service.id).unwrap().current_status, ServiceStatus::Ok);

    shutdown.trigger();
    persister_task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_unreachable_service_opens_then_trials_once() {
    let store = ServiceStore::new(None);
    let service = store
        .insert("down".into(), Url::parse("http://down.internal:8080/health").unwrap())
        .await
        .unwrap();

    let probe = Arc::new(CountingProbe::default());
    let fanout = StatusFanout::new(64);
    let mut events = fanout.subscribe("observer");
    let breakers = Arc::new(BreakerBank::new(BreakerSettings::default()));
    let scheduler = PollScheduler::new(
        Arc::new(store),
        probe.clone(),
        breakers.clone(),
        fanout,
        &PollerConfig::default(),
    );

    for _ in 0..5 {
        scheduler.run_tick().await.unwrap();
    }
    assert_eq!(probe.calls.load(Ordering::SeqCst), 5);
    assert_eq!(breakers.breaker(service.id).state(), CircuitState::Open);

    // Sixth tick is short-circuited without touching the network.
    let summary = scheduler.run_tick().await.unwrap();
    assert_eq!(summary.short_circuited, 1);
    assert_eq!(probe.calls.load(Ordering::SeqCst), 5);

    tokio::time::advance(Duration::from_millis(2000)).await;

    // Cooldown elapsed: exactly one trial, which fails and reopens.
    scheduler.run_tick().await.unwrap();
    assert_eq!(probe.calls.load(Ordering::SeqCst), 6);
    assert_eq!(breakers.breaker(service.id).state(), CircuitState::Open);

    let mut seen = 0;
    while let Ok(event) = events.try_recv() {
        assert_eq!(event.status(), ServiceStatus::Fail);
        seen += 1;
    }
    assert_eq!(seen, 7);
}

#[tokio::test]
async fn test_management_api_and_realtime_feed() {
    let backend = common::start_mock_backend("OK").await;

    let mut config = PollerConfig::default();
    config.api.bind_address = "127.0.0.1:0".into();
    config.poller.interval_ms = 100;
    let running = service_poller::start(config).await.unwrap();
    let api = running.api_addr.unwrap();
    let client = test_client();

    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{}/events", api))
        .await
        .expect("websocket handshake");

    let res = client
        .post(format!("http://{}/services", api))
        .json(&json!({ "name": "Service A", "url": format!("http://{}/", backend) }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 201);
    let created: Value = res.json().await.unwrap();
    let id = created["id"].as_i64().unwrap();
    assert_eq!(created["currentStatus"], "UNKNOWN");

    let update = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let msg = ws.next().await.unwrap().unwrap();
            if msg.is_text() {
                let payload: Value = serde_json::from_str(msg.to_text().unwrap()).unwrap();
                if payload["id"].as_i64() == Some(id) {
                    return payload;
                }
            }
        }
    })
    .await
    .expect("status update over websocket");
    assert_eq!(update["currentStatus"], "OK");

    let listed: Value = client
        .get(format!("http://{}/services", api))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(listed["services"].as_array().unwrap().len(), 1);

    let breakers: Value = client
        .get(format!("http://{}/breakers", api))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(breakers[0]["state"], "CLOSED");

    let res = client
        .post(format!("http://{}/services", api))
        .json(&json!({ "name": "", "url": "foobar" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 400);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "invalid service payload received");

    let res = client
        .put(format!("http://{}/services", api))
        .json(&json!({ "id": 1000, "name": "ghost", "url": "http://localhost:1/" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 404);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "service not found to update: 1000");

    let res = client
        .delete(format!("http://{}/services/{}", api, id))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 204);

    let res = client
        .delete(format!("http://{}/services/{}", api, id))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 404);

    running.stop().await.unwrap();
}

#[tokio::test]
async fn test_refused_endpoint_reports_fail() {
    let addr = common::refused_addr().await;
    let store = ServiceStore::new(None);
    let service = store
        .insert("refused".into(), Url::parse(&format!("http://{}/", addr)).unwrap())
        .await
        .unwrap();

    let fanout = StatusFanout::new(8);
    let mut events = fanout.subscribe("observer");
    let scheduler = PollScheduler::new(
        Arc::new(store),
        Arc::new(HttpProbe::new("test-agent")),
        Arc::new(BreakerBank::new(BreakerSettings::default())),
        fanout,
        &PollerConfig::default(),
    );

    let summary = scheduler.run_tick().await.unwrap();
    assert_eq!(summary.failed, 1);

    let event = events.recv().await.unwrap();
    assert_eq!(event.service_id(), service.id);
    assert_eq!(event.status(), ServiceStatus::Fail);
    assert_eq!(event.outcome, ProbeOutcome::Failed("transport"));
}

/// Five real responses of the given shape must open the breaker, and the
/// sixth tick must not reach the backend.
async fn assert_breaker_opens_on(status: u16, body: &'static str, kind: &'static str) {
    let hits = Arc::new(AtomicU32::new(0));
    let counter = hits.clone();
    let backend = common::start_programmable_backend(move || {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            (status, body.to_string())
        }
    })
    .await;

    let store = ServiceStore::new(None);
    let service = store
        .insert("flaky".into(), Url::parse(&format!("http://{}/", backend)).unwrap())
        .await
        .unwrap();

    let fanout = StatusFanout::new(16);
    let mut events = fanout.subscribe("observer");
    let breakers = Arc::new(BreakerBank::new(BreakerSettings::default()));
    let scheduler = PollScheduler::new(
        Arc::new(store),
        Arc::new(HttpProbe::new("test-agent")),
        breakers.clone(),
        fanout,
        &PollerConfig::default(),
    );

    for _ in 0..5 {
        let summary = scheduler.run_tick().await.unwrap();
        assert_eq!(summary.failed, 1);
        let event = events.recv().await.unwrap();
        assert_eq!(event.status(), ServiceStatus::Fail);
        assert_eq!(event.outcome, ProbeOutcome::Failed(kind));
    }
    assert_eq!(breakers.breaker(service.id).state(), CircuitState::Open);
    assert_eq!(hits.load(Ordering::SeqCst), 5);

    let summary = scheduler.run_tick().await.unwrap();
    assert_eq!(summary.short_circuited, 1);
    assert_eq!(events.recv().await.unwrap().outcome, ProbeOutcome::ShortCircuited);
    assert_eq!(hits.load(Ordering::SeqCst), 5);
}

#[tokio::test]
async fn test_unavailable_status_opens_breaker() {
    assert_breaker_opens_on(503, "Service Unavailable", "unhealthy_status").await;
}

#[tokio::test]
async fn test_malformed_body_opens_breaker() {
    assert_breaker_opens_on(200, "healthy", "protocol").await;
}

#[tokio::test]
async fn test_stop_waits_for_in_flight_ticks() {
    let backend = common::start_programmable_backend(|| async {
        tokio::time::sleep(Duration::from_millis(300)).await;
        (200, "OK".to_string())
    })
    .await;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("services.json");

    let mut config = PollerConfig::default();
    config.api.enabled = false;
    config.poller.interval_ms = 50;
    config.storage.path = Some(path.to_string_lossy().into_owned());
    let running = service_poller::start(config).await.unwrap();

    let service = running
        .store
        .insert("slow".into(), Url::parse(&format!("http://{}/", backend)).unwrap())
        .await
        .unwrap();

    // Stop while the slow probe is still in flight.
    tokio::time::sleep(Duration::from_millis(120)).await;
    let store = running.store.clone();
    running.stop().await.unwrap();

    assert_eq!(store.get(service.id).unwrap().current_status, ServiceStatus::Ok);
    let reloaded = ServiceStore::open(&path).unwrap();
    assert_eq!(reloaded.get(service.id).unwrap().current_status, ServiceStatus::Ok);
}
