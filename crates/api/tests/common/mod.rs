//! Shared fixtures for the HTTP integration tests.
//!
//! [`TestApp`] wires the full application state over the in-memory store
//! and a stubbed recording backend, mirroring the production wiring in
//! `main.rs` so tests exercise the same router and middleware stack.

#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Method, Request};
use axum::response::Response;
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use plenum_breakout::{BreakoutManager, EventListener};
use plenum_core::types::ParticipantId;
use plenum_recorder::{
    ClaimConfig, ClaimStrategy, QueueConfig, RecorderError, RecordingBackend,
    RecordingClaimManager, RecordingControl, RecordingQueue,
};
use plenum_sched::Scheduler;
use plenum_store::MemoryStore;

use plenum_api::auth::{generate_access_token, JwtConfig, ROLE_ADMIN, ROLE_PARTICIPANT};
use plenum_api::config::ServerConfig;
use plenum_api::router::build_app_router;
use plenum_api::state::AppState;

// ---------------------------------------------------------------------------
// Recording-service stub
// ---------------------------------------------------------------------------

/// Recording-service double: hands out canned ids and counts calls.
pub struct StubRecorder {
    pub acquires: AtomicU32,
    pub starts: AtomicU32,
    pub stops: AtomicU32,
    pub queries: AtomicU32,
}

impl StubRecorder {
    pub fn new() -> Self {
        Self {
            acquires: AtomicU32::new(0),
            starts: AtomicU32::new(0),
            stops: AtomicU32::new(0),
            queries: AtomicU32::new(0),
        }
    }

    pub fn start_count(&self) -> u32 {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stop_count(&self) -> u32 {
        self.stops.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RecordingBackend for StubRecorder {
    async fn acquire(&self, _channel: &str, _uid: &str) -> Result<String, RecorderError> {
        self.acquires.fetch_add(1, Ordering::SeqCst);
        Ok("res-test".to_string())
    }

    async fn start(
        &self,
        _resource_id: &str,
        _channel: &str,
        _uid: &str,
        _file_prefix: &str,
    ) -> Result<String, RecorderError> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        Ok("sid-test".to_string())
    }

    async fn query(&self, _resource_id: &str, _session_id: &str) -> Result<Value, RecorderError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        Ok(json!({ "status": "uploading" }))
    }

    async fn stop(
        &self,
        _resource_id: &str,
        _session_id: &str,
        _channel: &str,
        _uid: &str,
    ) -> Result<(), RecorderError> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Application fixture
// ---------------------------------------------------------------------------

/// Build a test `ServerConfig` with safe defaults.
///
/// Uses `http://localhost:5173` as CORS origin (matching the dev default),
/// a 30-second request timeout, and a fixed JWT secret.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 30,
        jwt: JwtConfig {
            secret: "integration-test-secret-0123456789".to_string(),
            access_token_expiry_mins: 60,
        },
    }
}

/// The application under test plus direct handles on its collaborators,
/// so tests can seed documents and observe recording-service traffic.
pub struct TestApp {
    pub state: AppState,
    pub store: Arc<MemoryStore>,
    pub recorder: Arc<StubRecorder>,
}

impl TestApp {
    /// Wire up state the way `main.rs` does, over the in-memory store,
    /// and spawn the recording-queue worker.
    pub fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let recorder = Arc::new(StubRecorder::new());

        let claims = RecordingClaimManager::new(
            store.clone(),
            ClaimConfig {
                strategy: ClaimStrategy::Transactional,
                ..ClaimConfig::default()
            },
            "test-instance".to_string(),
        );
        let control = Arc::new(RecordingControl::new(
            recorder.clone(),
            claims,
            "7777".to_string(),
        ));
        let queue = Arc::new(RecordingQueue::new(control.clone(), QueueConfig::default()));
        // The worker outlives the fixture; the test runtime reaps it.
        tokio::spawn(Arc::clone(&queue).run(tokio_util::sync::CancellationToken::new()));

        let scheduler = Scheduler::new(store.clone());
        let breakouts = BreakoutManager::new(store.clone(), scheduler.clone());
        let listener = EventListener::new(scheduler.clone());

        let state = AppState {
            store: store.clone(),
            config: Arc::new(test_config()),
            queue,
            control,
            breakouts,
            listener,
            scheduler,
        };

        Self {
            state,
            store,
            recorder,
        }
    }

    /// A fresh router over the shared state. Each request consumes one.
    pub fn router(&self) -> Router {
        build_app_router(self.state.clone())
    }

    /// Sign an access token for the given participant and role.
    pub fn token_for(&self, participant_id: ParticipantId, role: &str) -> String {
        generate_access_token(participant_id, role, &self.state.config.jwt)
            .expect("token generation should succeed")
    }

    /// A fresh ordinary participant: `(id, bearer token)`.
    pub fn participant(&self) -> (ParticipantId, String) {
        let id = ParticipantId::new();
        (id, self.token_for(id, ROLE_PARTICIPANT))
    }

    /// A fresh platform admin: `(id, bearer token)`.
    pub fn admin(&self) -> (ParticipantId, String) {
        let id = ParticipantId::new();
        (id, self.token_for(id, ROLE_ADMIN))
    }
}

/// Await a condition driven by a background task, failing loudly if it
/// never holds.
pub async fn wait_until(what: &str, cond: impl Fn() -> bool) {
    for _ in 0..200 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

async fn request(
    app: Router,
    method: Method,
    uri: &str,
    body: Option<Value>,
    token: Option<&str>,
) -> Response {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let request = match body {
        Some(value) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_vec(&value).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    app.oneshot(request).await.unwrap()
}

pub async fn get(app: Router, uri: &str, token: &str) -> Response {
    request(app, Method::GET, uri, None, Some(token)).await
}

/// GET without an Authorization header (health checks, 401 tests).
pub async fn get_noauth(app: Router, uri: &str) -> Response {
    request(app, Method::GET, uri, None, None).await
}

pub async fn post_json(app: Router, uri: &str, body: Value, token: &str) -> Response {
    request(app, Method::POST, uri, Some(body), Some(token)).await
}

pub async fn post_json_noauth(app: Router, uri: &str, body: Value) -> Response {
    request(app, Method::POST, uri, Some(body), None).await
}

/// POST with an empty body (cancel, leave, end, stop).
pub async fn post_empty(app: Router, uri: &str, token: &str) -> Response {
    request(app, Method::POST, uri, None, Some(token)).await
}

pub async fn put_json(app: Router, uri: &str, body: Value, token: &str) -> Response {
    request(app, Method::PUT, uri, Some(body), Some(token)).await
}

pub async fn patch_json(app: Router, uri: &str, body: Value, token: &str) -> Response {
    request(app, Method::PATCH, uri, Some(body), Some(token)).await
}

/// Collect a response body as JSON.
pub async fn body_json(response: Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
