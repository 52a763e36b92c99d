//! HTTP API tests, driven through the router without a listening socket

use std::{sync::Arc, time::Duration};

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use chrono::{TimeZone, Utc};
use serde_json::{json, Value};
use tower::ServiceExt;
use washwise::{
    state::{AppSettings, MachineKind, Resource},
    tasks::countdown_task,
    AppState, InMemoryStore, ManualClock, ReservationTimerEngine,
};

struct TestApp {
    router: Router,
    store: Arc<InMemoryStore>,
    clock: ManualClock,
    state: Arc<AppState>,
}

async fn app() -> TestApp {
    let store = Arc::new(InMemoryStore::new(vec![
        Resource::new("W1", MachineKind::Washer, 1, "Block A"),
        Resource::new("W2", MachineKind::Washer, 2, "Block A"),
        Resource::new("D1", MachineKind::Dryer, 1, "Block A"),
    ]));
    let clock = ManualClock::new(Utc.with_ymd_and_hms(2025, 3, 10, 18, 30, 0).unwrap());
    let engine = Arc::new(ReservationTimerEngine::new(store.clone(), Arc::new(clock.clone())));
    engine.refresh().await.unwrap();
    let state = Arc::new(AppState::new(engine, AppSettings::default()));

    TestApp {
        router: washwise::create_router(Arc::clone(&state)),
        store,
        clock,
        state,
    }
}

async fn send(router: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => request
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

fn machine<'a>(body: &'a Value, id: &str) -> &'a Value {
    body["machines"]
        .as_array()
        .unwrap()
        .iter()
        .find(|m| m["resource_id"] == id)
        .unwrap()
}

#[tokio::test]
async fn test_health() {
    let app = app().await;
    let (status, body) = send(&app.router, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_reserve_and_list_machines() {
    let app = app().await;

    let (status, body) = send(
        &app.router,
        "POST",
        "/machines/W1/reserve",
        Some(json!({ "duration_seconds": 2700 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["reservation"]["resource_id"], "W1");

    app.clock.advance_secs(60);
    let (status, body) = send(&app.router, "GET", "/machines", None).await;
    assert_eq!(status, StatusCode::OK);

    let order: Vec<_> = body["machines"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["resource_id"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(order, vec!["W2", "D1", "W1"]);

    let w1 = machine(&body, "W1");
    assert_eq!(w1["remaining_seconds"], 2640);
    assert_eq!(w1["countdown"], "44:00");
    assert_eq!(w1["phase"], "running");
    assert_eq!(w1["kind"], "washer");
}

#[tokio::test]
async fn test_reserve_errors_map_to_status_codes() {
    let app = app().await;

    let (status, body) = send(
        &app.router,
        "POST",
        "/machines/W1/reserve",
        Some(json!({ "duration_seconds": 0 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "invalid_duration");

    let (status, body) = send(
        &app.router,
        "POST",
        "/machines/Z9/reserve",
        Some(json!({ "duration_seconds": 60 })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "not_found");

    send(&app.router, "POST", "/machines/D1/reserve", Some(json!({ "duration_seconds": 60 }))).await;
    let (status, body) = send(
        &app.router,
        "POST",
        "/machines/D1/reserve",
        Some(json!({ "duration_seconds": 60 })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "already_reserved");
    assert_eq!(body["message"], "Someone else just took machine D1");
}

#[tokio::test]
async fn test_store_outage_is_reported() {
    let app = app().await;
    app.store.set_available(false);

    let (status, body) = send(
        &app.router,
        "POST",
        "/machines/W2/reserve",
        Some(json!({ "duration_seconds": 60 })),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["code"], "store_write_failed");

    let (_, status_body) = send(&app.router, "GET", "/status", None).await;
    assert_eq!(status_body["errors"].as_array().unwrap().len(), 1);

    app.store.set_available(true);
    let (status, _) = send(
        &app.router,
        "POST",
        "/machines/W2/reserve",
        Some(json!({ "duration_seconds": 60 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let (_, status_body) = send(&app.router, "GET", "/status", None).await;
    assert!(status_body["errors"].as_array().unwrap().is_empty());
    assert_eq!(status_body["last_action"], "reserve W2");
}

#[tokio::test]
async fn test_release_and_collect() {
    let app = app().await;
    send(&app.router, "POST", "/machines/W1/reserve", Some(json!({ "duration_seconds": 300 }))).await;

    let (status, _) = send(&app.router, "POST", "/machines/W1/release", None).await;
    assert_eq!(status, StatusCode::OK);
    let (_, body) = send(&app.router, "GET", "/machines", None).await;
    assert_eq!(machine(&body, "W1")["remaining_seconds"], 0);

    // Nothing to collect after a manual stop
    let (status, body) = send(&app.router, "POST", "/machines/W1/collect", None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "not_finished");

    send(&app.router, "POST", "/machines/W2/reserve", Some(json!({ "duration_seconds": 120 }))).await;
    app.clock.advance_secs(120);
    app.state.engine.tick().await;

    let (_, body) = send(&app.router, "GET", "/machines", None).await;
    assert_eq!(machine(&body, "W2")["phase"], "finished");

    let (status, _) = send(&app.router, "POST", "/machines/W2/collect", None).await;
    assert_eq!(status, StatusCode::OK);
    let (_, body) = send(&app.router, "GET", "/machines", None).await;
    assert_eq!(machine(&body, "W2")["phase"], "idle");
}

#[tokio::test]
async fn test_session_flow() {
    let app = app().await;

    let (status, body) = send(&app.router, "POST", "/session/start", None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "invalid_transition");

    let (status, body) = send(&app.router, "POST", "/session/open", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["session"]["phase"], "selecting");

    let (status, body) = send(
        &app.router,
        "POST",
        "/session/select",
        Some(json!({ "resource_id": "D1", "duration_seconds": 1800 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(machine(&body["session"], "D1")["phase"], "selecting");

    let (status, body) = send(&app.router, "POST", "/session/start", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["session"]["phase"], "running");
    assert_eq!(body["session"]["countdown"], "30:00");

    let (_, body) = send(&app.router, "GET", "/session", None).await;
    assert_eq!(body["remaining_seconds"], 1800);

    let (status, body) = send(&app.router, "POST", "/session/collect", None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "invalid_transition");

    let (status, body) = send(&app.router, "POST", "/session/cancel", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["session"]["phase"], "idle");
    assert!(!app.state.session.is_ticking());
}

#[tokio::test]
async fn test_session_start_conflict() {
    let app = app().await;
    send(&app.router, "POST", "/machines/W2/reserve", Some(json!({ "duration_seconds": 600 }))).await;

    send(&app.router, "POST", "/session/open", None).await;
    send(
        &app.router,
        "POST",
        "/session/select",
        Some(json!({ "resource_id": "W2", "duration_seconds": 600 })),
    )
    .await;

    let (status, body) = send(&app.router, "POST", "/session/start", None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "already_reserved");

    let (_, body) = send(&app.router, "GET", "/session", None).await;
    assert_eq!(body["phase"], "selecting");
}

#[tokio::test]
async fn test_status_reports_presets() {
    let app = app().await;
    let (status, body) = send(&app.router, "GET", "/status", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["presets_minutes"], json!([30, 45, 60]));
    assert_eq!(body["session"]["phase"], "idle");
    assert_eq!(body["machines"].as_array().unwrap().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_failed_auto_release_listed_on_status() {
    let app = app().await;
    send(&app.router, "POST", "/machines/D1/reserve", Some(json!({ "duration_seconds": 90 }))).await;

    app.clock.advance_secs(90);
    app.store.set_available(false);
    tokio::spawn(countdown_task(Arc::clone(&app.state)));
    tokio::time::sleep(Duration::from_millis(1500)).await;

    let (_, body) = send(&app.router, "GET", "/status", None).await;
    let errors: Vec<_> = body["errors"].as_array().unwrap().iter().cloned().collect();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].as_str().unwrap().starts_with("auto-release of D1 failed"));
    assert!(app.store.get(&"D1".into()).unwrap().reservation_end.is_some());

    app.store.set_available(true);
    tokio::time::sleep(Duration::from_secs(1)).await;

    let (_, body) = send(&app.router, "GET", "/status", None).await;
    assert!(body["errors"].as_array().unwrap().is_empty());
    assert!(app.store.get(&"D1".into()).unwrap().reservation_end.is_none());
}
