#![allow(dead_code)]

use axum::body::{to_bytes, Body, Bytes};
use axum::http::{HeaderMap, Request, StatusCode};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use telemon_server::app;
use telemon_server::state::AppState;
use telemon_storage::{MemStorage, PersistenceService, RestorePolicy, SqliteStorage, Storage};
use tempfile::TempDir;
use tower::util::ServiceExt;

pub struct TestContext {
    pub temp_dir: TempDir,
    pub state: AppState,
    pub app: axum::Router,
}

impl TestContext {
    pub fn log_path(&self) -> PathBuf {
        self.state.persistence.path().to_path_buf()
    }
}

pub fn build_test_context(policy: RestorePolicy) -> TestContext {
    let storage: Arc<dyn Storage> = Arc::new(MemStorage::new());
    build_with_storage(storage, None, policy)
}

pub fn build_sqlite_context() -> TestContext {
    let db = Arc::new(SqliteStorage::open_in_memory().expect("in-memory sqlite should open"));
    build_with_storage(db.clone(), Some(db), RestorePolicy::Replay)
}

fn build_with_storage(
    storage: Arc<dyn Storage>,
    sqlite: Option<Arc<SqliteStorage>>,
    restore_policy: RestorePolicy,
) -> TestContext {
    let temp_dir = tempfile::tempdir().expect("temp dir should be created");
    let persistence =
        PersistenceService::open(temp_dir.path().join("metrics.jsonl"), Duration::ZERO)
            .expect("metric log should open");

    let state = AppState::new(storage, sqlite, Arc::new(persistence), restore_policy);
    let app = app::build_http_app(state.clone());

    TestContext {
        temp_dir,
        state,
        app,
    }
}

pub async fn send(
    app: &axum::Router,
    method: &str,
    uri: &str,
    headers: &[(&str, &str)],
    body: impl Into<Body>,
) -> (StatusCode, HeaderMap, Bytes) {
    let mut builder = Request::builder().method(method).uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    let req = builder.body(body.into()).expect("request should build");

    let resp = app
        .clone()
        .oneshot(req)
        .await
        .expect("router should respond");
    let status = resp.status();
    let headers = resp.headers().clone();
    let body = to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("body should be readable");
    (status, headers, body)
}

pub async fn post_path(app: &axum::Router, uri: &str) -> (StatusCode, HeaderMap, Bytes) {
    send(app, "POST", uri, &[], Body::empty()).await
}

pub async fn post_json(
    app: &axum::Router,
    uri: &str,
    json: serde_json::Value,
) -> (StatusCode, Bytes) {
    let (status, _, body) = send(
        app,
        "POST",
        uri,
        &[("content-type", "application/json")],
        json.to_string(),
    )
    .await;
    (status, body)
}

pub async fn get_text(app: &axum::Router, uri: &str) -> (StatusCode, String) {
    let (status, _, body) = send(app, "GET", uri, &[], Body::empty()).await;
    (status, String::from_utf8_lossy(&body).into_owned())
}

pub fn as_json(body: &Bytes) -> serde_json::Value {
    serde_json::from_slice(body).expect("body should be JSON")
}
