//! Shared test helpers for API integration tests.
#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::{TimeZone, Utc};
use http_body_util::BodyExt;
use tower::ServiceExt;

use caravan_api::notifier::LogNotifier;
use caravan_api::routes;
use caravan_api::state::AppState;
use caravan_engine::manager::GameManagerDeps;
use caravan_engine::registry::ManagerRegistry;
use caravan_test_support::{FixedClock, MemoryStore, MockRng};

/// Team seeded by `seeded_store`.
pub const TEAM_ID: i64 = 1;
/// Scenario seeded by `seeded_store`.
pub const SCENARIO_ID: i64 = 7;

/// In-memory store with one three-player team and one scenario backed
/// by the given script.
pub fn seeded_store(script: &str) -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    store.add_team(TEAM_ID, "The Dustwalkers", vec![1, 2, 3]);
    store.add_scenario(SCENARIO_ID, "The Crossing", "main");
    store.add_script("main", script);
    store
}

/// Build the full app router over the given store with a deterministic
/// clock and RNG. Uses the same route structure as `main.rs`.
pub fn build_test_app(store: &Arc<MemoryStore>) -> Router {
    let deps = GameManagerDeps {
        store: store.clone(),
        scripts: store.clone(),
        notifier: Arc::new(LogNotifier),
        clock: Arc::new(FixedClock(
            Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap(),
        )),
        rng: Arc::new(Mutex::new(MockRng)),
    };
    let state = AppState::new(Arc::new(ManagerRegistry::new(deps)));

    Router::new()
        .merge(routes::health::router())
        .nest("/api/v1/games", routes::game::router())
        .with_state(state)
}

/// Send a POST request with a JSON body and return the response.
pub async fn post_json(
    app: Router,
    uri: &str,
    body: &serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body_bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body_bytes).unwrap();

    (status, json)
}

/// Send a POST request with no body and return just the status.
pub async fn post_empty(app: Router, uri: &str) -> StatusCode {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    response.status()
}

/// Send a GET request and return the response.
pub async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body_bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body_bytes).unwrap();

    (status, json)
}
