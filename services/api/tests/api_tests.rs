//! Integration tests for the study CRUD service.
//!
//! The router is driven in-process through `oneshot` against an in-memory
//! SQLite pool. The last tests serve it on a loopback port and talk to it
//! through the remote `StudyStore`.

use api_lib::adapters::{DbAdapter, RemoteStudyStore};
use api_lib::web::{build_router, AppState};
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use research_interview_core::clock::ManualClock;
use research_interview_core::domain::{Study, Theme};
use research_interview_core::ports::{Clock, PortError, PortResult, StudyStore};
use serde_json::{json, Value};
use sqlx::sqlite::SqlitePoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tower::util::ServiceExt; // for `oneshot` method

const START_MS: i64 = 1_700_000_000_000;

/// Test helper: a router over a fresh in-memory database.
async fn setup_app(clock: Arc<ManualClock>) -> Router {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Should open in-memory database");
    let db = Arc::new(DbAdapter::new(pool, clock.clone()));
    db.run_migrations().await.expect("Should run migrations");
    build_router(Arc::new(AppState::new(db, clock)))
}

fn request(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

fn put_json(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("PUT")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn extract_json(body: Body) -> Value {
    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .expect("Should read body");
    serde_json::from_slice(&bytes).expect("Should parse JSON")
}

fn study_json(clock: &ManualClock, title: &str) -> Value {
    let study = Study::new(Theme::new(title, "How people book", clock.now()), clock.now());
    serde_json::to_value(study).unwrap()
}

// =============================================================================
// Health
// =============================================================================

#[tokio::test]
async fn health_reports_ok() {
    let app = setup_app(Arc::new(ManualClock::at_millis(START_MS))).await;
    let response = app.oneshot(request("GET", "/api/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(extract_json(response.into_body()).await, json!({ "status": "ok" }));
}

// =============================================================================
// Reads
// =============================================================================

#[tokio::test]
async fn unknown_study_is_404_with_error_body() {
    let app = setup_app(Arc::new(ManualClock::at_millis(START_MS))).await;
    let response = app
        .oneshot(request("GET", "/api/studies/nonexistent"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["error"], "Study not found");
}

#[tokio::test]
async fn list_is_ordered_by_most_recent_update() {
    let clock = Arc::new(ManualClock::at_millis(START_MS));
    let app = setup_app(clock.clone()).await;

    let older = study_json(&clock, "Older");
    let newer = study_json(&clock, "Newer");
    let older_uri = format!("/api/studies/{}", older["id"].as_str().unwrap());
    let newer_uri = format!("/api/studies/{}", newer["id"].as_str().unwrap());

    app.clone().oneshot(put_json(&older_uri, &older)).await.unwrap();
    clock.advance(chrono::Duration::seconds(1));
    app.clone().oneshot(put_json(&newer_uri, &newer)).await.unwrap();
    clock.advance(chrono::Duration::seconds(1));
    // Touching the older study moves it back to the front.
    app.clone().oneshot(put_json(&older_uri, &older)).await.unwrap();

    let response = app.oneshot(request("GET", "/api/studies")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = extract_json(response.into_body()).await;
    let titles: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["theme"]["title"].as_str().unwrap())
        .collect();
    assert_eq!(titles, vec!["Older", "Newer"]);
}

// =============================================================================
// Writes
// =============================================================================

#[tokio::test]
async fn put_stores_study_and_stamps_updated_at() {
    let clock = Arc::new(ManualClock::at_millis(START_MS));
    let app = setup_app(clock.clone()).await;
    let mut study = study_json(&clock, "Booking a visit");
    study["updatedAt"] = json!(1);
    let uri = format!("/api/studies/{}", study["id"].as_str().unwrap());

    clock.advance(chrono::Duration::seconds(30));
    let response = app.clone().oneshot(put_json(&uri, &study)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(extract_json(response.into_body()).await, json!({ "ok": true }));

    let response = app.oneshot(request("GET", &uri)).await.unwrap();
    let stored = extract_json(response.into_body()).await;
    assert_eq!(stored["theme"]["title"], "Booking a visit");
    assert_eq!(stored["createdAt"], json!(START_MS));
    assert_eq!(stored["updatedAt"], json!(START_MS + 30_000));
    assert_eq!(stored["consolidatedInsight"], Value::Null);
}

#[tokio::test]
async fn put_with_mismatched_id_is_400() {
    let clock = Arc::new(ManualClock::at_millis(START_MS));
    let app = setup_app(clock.clone()).await;
    let study = study_json(&clock, "t");

    let response = app
        .clone()
        .oneshot(put_json("/api/studies/some-other-id", &study))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["error"], "Invalid study payload or id mismatch");

    // Nothing was written under either id.
    let response = app.oneshot(request("GET", "/api/studies")).await.unwrap();
    assert_eq!(extract_json(response.into_body()).await, json!([]));
}

#[tokio::test]
async fn put_with_non_object_or_malformed_body_is_400() {
    let app = setup_app(Arc::new(ManualClock::at_millis(START_MS))).await;

    let response = app
        .clone()
        .oneshot(put_json("/api/studies/x", &json!(["x"])))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let malformed = Request::builder()
        .method("PUT")
        .uri("/api/studies/x")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = app.clone().oneshot(malformed).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Right id, wrong shape.
    let response = app
        .oneshot(put_json("/api/studies/x", &json!({ "id": "x", "theme": 3 })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(extract_json(response.into_body()).await["error"].is_string());
}

#[tokio::test]
async fn missing_created_at_is_filled_for_new_and_kept_for_existing() {
    let clock = Arc::new(ManualClock::at_millis(START_MS));
    let app = setup_app(clock.clone()).await;
    let mut study = study_json(&clock, "t");
    let uri = format!("/api/studies/{}", study["id"].as_str().unwrap());

    // New study without a numeric createdAt: the server uses now.
    clock.advance(chrono::Duration::seconds(5));
    study["createdAt"] = json!("yesterday");
    let response = app.clone().oneshot(put_json(&uri, &study)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let stored = extract_json(app.clone().oneshot(request("GET", &uri)).await.unwrap().into_body()).await;
    assert_eq!(stored["createdAt"], json!(START_MS + 5_000));

    // Later update without createdAt: the stored value survives.
    clock.advance(chrono::Duration::seconds(5));
    study.as_object_mut().unwrap().remove("createdAt");
    app.clone().oneshot(put_json(&uri, &study)).await.unwrap();
    let stored = extract_json(app.oneshot(request("GET", &uri)).await.unwrap().into_body()).await;
    assert_eq!(stored["createdAt"], json!(START_MS + 5_000));
    assert_eq!(stored["updatedAt"], json!(START_MS + 10_000));
}

#[tokio::test]
async fn delete_is_204_and_idempotent() {
    let clock = Arc::new(ManualClock::at_millis(START_MS));
    let app = setup_app(clock.clone()).await;
    let study = study_json(&clock, "t");
    let uri = format!("/api/studies/{}", study["id"].as_str().unwrap());
    app.clone().oneshot(put_json(&uri, &study)).await.unwrap();

    for _ in 0..2 {
        let response = app.clone().oneshot(request("DELETE", &uri)).await.unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(bytes.is_empty());
    }

    let response = app.oneshot(request("GET", &uri)).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn openapi_document_lists_study_routes() {
    let app = setup_app(Arc::new(ManualClock::at_millis(START_MS))).await;
    let response = app
        .oneshot(request("GET", "/api-docs/openapi.json"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let doc = extract_json(response.into_body()).await;
    assert!(doc["paths"]["/api/studies/{id}"]["put"].is_object());
    assert!(doc["components"]["schemas"]["Study"].is_object());
}

// =============================================================================
// Remote store against a live server
// =============================================================================

async fn serve(clock: Arc<ManualClock>) -> String {
    let app = setup_app(clock).await;
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}/api", addr)
}

#[tokio::test]
async fn remote_store_round_trips_through_the_service() {
    let clock = Arc::new(ManualClock::at_millis(START_MS));
    let base = serve(clock.clone()).await;
    let remote = RemoteStudyStore::new(&base, Duration::from_secs(5)).unwrap();

    assert!(remote.load("nonexistent").await.unwrap().is_none());
    assert!(remote.load_all().await.unwrap().is_empty());

    let study = Study::new(Theme::new("Booking a visit", "d", clock.now()), clock.now());
    clock.advance(chrono::Duration::seconds(1));
    remote.save(&study).await.unwrap();

    let loaded = remote.load(&study.id).await.unwrap().expect("stored study");
    assert_eq!(loaded.theme, study.theme);
    assert_eq!(loaded.participants, study.participants);
    assert_eq!(loaded.created_at, study.created_at);
    assert_eq!(loaded.updated_at, clock.now());
    assert_eq!(remote.load_all().await.unwrap().len(), 1);

    remote.delete(&study.id).await.unwrap();
    remote.delete(&study.id).await.unwrap();
    assert!(remote.load(&study.id).await.unwrap().is_none());
}

#[tokio::test]
async fn remote_store_reports_an_unreachable_service() {
    // Bind and drop to get a port nothing listens on.
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let remote = RemoteStudyStore::new(&format!("http://{}/api", addr), Duration::from_secs(2)).unwrap();
    let err = remote.load_all().await.unwrap_err();
    assert!(matches!(err, PortError::BackendUnavailable(_)));
}

/// A store whose backend is always down, so the service answers 500.
struct BrokenStore;

#[async_trait::async_trait]
impl StudyStore for BrokenStore {
    async fn load_all(&self) -> PortResult<Vec<Study>> {
        Err(PortError::Unexpected("disk on fire".to_string()))
    }

    async fn load(&self, _id: &str) -> PortResult<Option<Study>> {
        Err(PortError::Unexpected("disk on fire".to_string()))
    }

    async fn save(&self, _study: &Study) -> PortResult<()> {
        Err(PortError::Unexpected("disk on fire".to_string()))
    }

    async fn delete(&self, _id: &str) -> PortResult<()> {
        Err(PortError::Unexpected("disk on fire".to_string()))
    }
}

#[tokio::test]
async fn remote_store_reports_server_errors_as_unavailable() {
    let clock = Arc::new(ManualClock::at_millis(START_MS));
    let app = build_router(Arc::new(AppState::new(Arc::new(BrokenStore), clock.clone())));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    let remote = RemoteStudyStore::new(&format!("http://{}/api", addr), Duration::from_secs(5)).unwrap();

    let unavailable = |result: PortError| match result {
        PortError::BackendUnavailable(message) => message.contains("500"),
        _ => false,
    };
    assert!(unavailable(remote.load_all().await.unwrap_err()));
    // Only a 404 reads as a missing study.
    assert!(unavailable(remote.load("study-1").await.unwrap_err()));
    let study = Study::new(Theme::new("T", "d", clock.now()), clock.now());
    assert!(unavailable(remote.save(&study).await.unwrap_err()));
    assert!(unavailable(remote.delete("study-1").await.unwrap_err()));
}
