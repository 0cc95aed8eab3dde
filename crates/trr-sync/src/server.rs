//! The sync boundary's HTTP surface (spec.md §4.6, §6.3): device auth,
//! vocabulary/status reads, and the upload/commit pair that drives the
//! ingest pipeline. Every request runs on its own tokio task and holds no
//! cross-request state beyond the shared, thread-safe `Store`/`Pipeline`
//! (spec.md §5 "Concurrency").

use axum::extract::{Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use trr_core::types::{RegisteredDevice, SyncLogEntry};
use trr_ingest::Pipeline;
use trr_storage::Store;

use crate::auth::{issue_token, verify_token, TOKEN_LIFETIME_SECS};
use crate::config::SyncConfig;
use crate::discovery::Discovery;
use crate::vocab;

pub const API_VERSION: &str = "1.0";

struct AppState {
    store: Arc<Store>,
    pipeline: Arc<Pipeline>,
    config: SyncConfig,
}

pub struct SyncServer {
    state: Arc<AppState>,
    _discovery: Discovery,
}

impl SyncServer {
    pub fn new(config: SyncConfig, store: Arc<Store>, pipeline: Arc<Pipeline>) -> Self {
        let discovery = Discovery::register(config.port, API_VERSION);
        Self {
            state: Arc::new(AppState { store, pipeline, config }),
            _discovery: discovery,
        }
    }

    fn router(state: Arc<AppState>) -> Router {
        let authed = Router::new()
            .route("/vocabularies", get(vocabularies))
            .route("/sync/status", get(sync_status))
            .route("/sync/upload", post(sync_upload))
            .route("/sync/complete", post(sync_complete))
            .layer(middleware::from_fn_with_state(state.clone(), require_auth))
            .layer(RequestBodyLimitLayer::new(state.config.max_upload_bytes));

        Router::new()
            .route("/", get(root))
            .route("/discover", get(discover))
            .route("/auth", post(auth))
            .merge(authed)
            .layer(CorsLayer::permissive())
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }

    /// Binds and serves until the process is terminated. Long-running;
    /// callers typically `tokio::spawn` this from `trr-cli`'s `serve`
    /// subcommand.
    pub async fn run(self) -> std::io::Result<()> {
        let addr = SocketAddr::new(self.state.config.bind_addr, self.state.config.port);
        let router = Self::router(self.state.clone());
        info!("sync boundary listening on {addr}");
        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, router).await
    }
}

/// Extracted by [`require_auth`] and made available to handlers behind it.
#[derive(Clone)]
struct AuthedDevice(String);

async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Response {
    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    let Some(token) = token else {
        return unauthorized();
    };
    let Some(device_id) = verify_token(&state.config.auth_secret, token) else {
        return unauthorized();
    };

    if let Ok(Some(mut device)) = state.store.get_device(&device_id) {
        device.last_seen = Some(Utc::now());
        let _ = state.store.put_device(&device);
    }

    request.extensions_mut().insert(AuthedDevice(device_id));
    next.run(request).await
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "status": "unauthorized", "message": "invalid or missing authentication" })),
    )
        .into_response()
}

async fn root() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "server": "TRRCMS Sync Server",
        "api_version": API_VERSION,
        "endpoints": ["/discover", "/auth", "/vocabularies", "/sync/status", "/sync/upload", "/sync/complete"],
    }))
}

async fn discover(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(json!({
        "server": "TRRCMS Sync Server",
        "hostname": hostname(),
        "api_version": API_VERSION,
        "port": state.config.port,
        "requires_auth": true,
    }))
}

fn hostname() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "trrcms-host".to_string())
}

#[derive(Deserialize)]
struct AuthRequest {
    device_id: String,
    #[serde(default)]
    #[allow(dead_code)]
    device_secret: Option<String>,
}

#[derive(Serialize)]
struct AuthResponse {
    status: &'static str,
    token: String,
    expires_in: i64,
}

/// `POST /auth` (spec.md §4.6): auto-registers unknown devices under the
/// default policy. `device_secret` is accepted on the wire but the baseline
/// policy here does not yet verify it against a stored credential — see
/// spec.md §4.6, which defers credential strength to deployment policy.
async fn auth(State(state): State<Arc<AppState>>, Json(req): Json<AuthRequest>) -> Response {
    if req.device_id.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "status": "failed", "message": "device_id required" })),
        )
            .into_response();
    }

    let known = state.store.device_exists(&req.device_id).unwrap_or(false);
    if !known {
        if !state.config.auto_register_devices {
            return (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "status": "unauthorized", "message": "device not registered" })),
            )
                .into_response();
        }
        let device = RegisteredDevice {
            device_id: req.device_id.clone(),
            device_name: None,
            registered_at: Utc::now(),
            last_seen: None,
        };
        if let Err(e) = state.store.put_device(&device) {
            warn!("failed to auto-register device {}: {e}", req.device_id);
        }
    }

    let (token, _expiry) = issue_token(&state.config.auth_secret, &req.device_id);
    Json(AuthResponse { status: "success", token, expires_in: TOKEN_LIFETIME_SECS }).into_response()
}

async fn vocabularies() -> Json<serde_json::Value> {
    Json(json!({ "status": "success", "vocabularies": vocab::all_vocabularies() }))
}

async fn sync_status(
    axum::Extension(AuthedDevice(device_id)): axum::Extension<AuthedDevice>,
    State(state): State<Arc<AppState>>,
) -> Json<serde_json::Value> {
    let last_sync = state
        .store
        .last_sync_for_device(&device_id)
        .ok()
        .flatten()
        .map(|e| json!({ "date": e.timestamp, "action": e.action }));

    Json(json!({
        "status": "success",
        "device_id": device_id,
        "last_sync": last_sync,
        "vocabulary_versions": vocab::versions_only(),
    }))
}

/// `POST /sync/upload` (spec.md §4.6): body is the raw UHC file. Written to
/// a temp file, fed through the ingest pipeline, then removed regardless of
/// outcome.
async fn sync_upload(
    axum::Extension(AuthedDevice(device_id)): axum::Extension<AuthedDevice>,
    State(state): State<Arc<AppState>>,
    body: axum::body::Bytes,
) -> Response {
    if body.len() > state.config.max_upload_bytes {
        return (StatusCode::PAYLOAD_TOO_LARGE, Json(json!({ "status": "failed", "message": "package too large" })))
            .into_response();
    }

    let temp_path = state.config.staging_dir.join(format!(".upload-{}.uhc", uuid::Uuid::new_v4()));
    if let Err(e) = std::fs::create_dir_all(&state.config.staging_dir) {
        return storage_error(e.into());
    }
    if let Err(e) = std::fs::write(&temp_path, &body) {
        return storage_error(e.into());
    }

    let result = state.pipeline.import(&temp_path, &format!("sync:{device_id}"));
    let _ = std::fs::remove_file(&temp_path);

    let result = match result {
        Ok(r) => r,
        Err(e) => return ingest_error(e),
    };

    let _ = state.store.append_sync_log(&SyncLogEntry {
        device_id: device_id.clone(),
        action: "upload".to_string(),
        details: serde_json::to_value(&result).unwrap_or_default(),
        timestamp: Utc::now(),
    });

    if result.success {
        Json(json!({
            "status": "success",
            "package_id": result.package_id,
            "record_counts": result.record_counts,
            "validation_summary": result.validation_summary,
        }))
        .into_response()
    } else {
        Json(json!({
            "status": "partial",
            "package_id": result.package_id,
            "validation_summary": result.validation_summary,
            "issues": result.issues.iter().take(10).collect::<Vec<_>>(),
        }))
        .into_response()
    }
}

#[derive(Deserialize)]
struct CompleteRequest {
    package_id: Option<String>,
}

/// `POST /sync/complete` (spec.md §4.6): triggers commit of staged records
/// for a previously uploaded package.
async fn sync_complete(
    axum::Extension(AuthedDevice(device_id)): axum::Extension<AuthedDevice>,
    State(state): State<Arc<AppState>>,
    body: axum::body::Bytes,
) -> Response {
    let req: CompleteRequest = if body.is_empty() {
        CompleteRequest { package_id: None }
    } else {
        match serde_json::from_slice(&body) {
            Ok(r) => r,
            Err(e) => {
                return (StatusCode::BAD_REQUEST, Json(json!({ "status": "failed", "message": e.to_string() })))
                    .into_response()
            }
        }
    };

    let Some(package_id) = req.package_id else {
        return (StatusCode::BAD_REQUEST, Json(json!({ "status": "failed", "message": "package_id required" })))
            .into_response();
    };

    let result = state.pipeline.commit(&package_id, &format!("sync:{device_id}"));
    let result = match result {
        Ok(r) => r,
        Err(e) => return ingest_error(e),
    };

    let _ = state.store.append_sync_log(&SyncLogEntry {
        device_id,
        action: "commit".to_string(),
        details: json!({ "package_id": package_id, "committed": result.record_counts }),
        timestamp: Utc::now(),
    });

    Json(json!({ "status": "success", "package_id": package_id, "committed": result.record_counts })).into_response()
}

fn storage_error(e: crate::error::SyncError) -> Response {
    (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "status": "failed", "message": e.to_string() }))).into_response()
}

fn ingest_error(e: trr_ingest::IngestError) -> Response {
    (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "status": "failed", "message": e.to_string() }))).into_response()
}
