// Copyright 2026 Reelgrab Contributors
// SPDX-License-Identifier: Apache-2.0

//! HTTP API for background download tasks.
//!
//! A client posts a URL, polls the task status and finally fetches the zip
//! archive. Fetching the archive consumes the task: its files and registry
//! entry are removed once the body has been read.

use crate::discovery::{DiscoveryRequest, Orchestrator, UrlKind};
use crate::service::{run_task, TaskRegistry, TaskStatus};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

/// Attachment name of every served archive.
pub const ARCHIVE_NAME: &str = "downloaded_media.zip";

/// State shared by all handlers.
pub struct AppState {
    pub registry: TaskRegistry,
    pub orchestrator: Arc<Orchestrator>,
    /// Parent directory of the per-task working directories.
    pub work_root: PathBuf,
}

impl AppState {
    pub fn new(orchestrator: Arc<Orchestrator>, work_root: PathBuf) -> Self {
        Self {
            registry: TaskRegistry::new(),
            orchestrator,
            work_root,
        }
    }
}

/// Build the axum Router with all endpoints.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(root))
        .route("/api/download", post(start_download))
        .route("/api/download/:task_id/status", get(task_status))
        .route("/api/download/:task_id", get(fetch_archive))
        .layer(cors)
        .with_state(state)
}

/// Serve the API on `host:port` until Ctrl-C.
pub async fn start(host: &str, port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind((host, port)).await?;
    info!("REST API listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutting down REST API");
        })
        .await?;
    Ok(())
}

// ── Helpers ──────────────────────────────────────────────────────

fn error_response(status: StatusCode, code: &str, message: impl std::fmt::Display) -> Response {
    (
        status,
        Json(json!({
            "error": {
                "code": code,
                "message": message.to_string(),
            }
        })),
    )
        .into_response()
}

fn task_not_found() -> Response {
    error_response(StatusCode::NOT_FOUND, "E_NOT_FOUND", "Task not found")
}

fn default_count() -> usize {
    10
}

#[derive(Debug, Deserialize)]
struct DownloadBody {
    url: String,
    #[serde(default = "default_count")]
    count: usize,
    #[serde(default)]
    kind: UrlKind,
}

// ── Handlers ─────────────────────────────────────────────────────

async fn root() -> Json<Value> {
    Json(json!({
        "status": "online",
        "message": "Media download API is running",
    }))
}

async fn start_download(
    State(state): State<Arc<AppState>>,
    body: Result<Json<DownloadBody>, JsonRejection>,
) -> Response {
    let body = match body {
        Ok(Json(body)) => body,
        Err(rejection) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                "E_INVALID_PARAMS",
                rejection.body_text(),
            )
        }
    };

    let task_id = uuid::Uuid::new_v4().to_string();
    let dir = state.work_root.join(format!("reelgrab-task-{task_id}"));
    let request = DiscoveryRequest::new(body.url, &dir)
        .with_max_items(body.count)
        .with_kind(body.kind);
    if let Err(e) = request.validate() {
        return error_response(StatusCode::BAD_REQUEST, e.code(), e);
    }

    state.registry.insert(&task_id, dir);
    info!("task {task_id} queued for {}", request.url);
    tokio::spawn(run_task(
        state.registry.clone(),
        task_id.clone(),
        request,
        Arc::clone(&state.orchestrator),
    ));

    Json(json!({
        "task_id": task_id,
        "message": "Download started",
    }))
    .into_response()
}

async fn task_status(State(state): State<Arc<AppState>>, Path(task_id): Path<String>) -> Response {
    let Some(record) = state.registry.get(&task_id) else {
        return task_not_found();
    };

    let mut body = json!({ "status": record.status });
    if let Some(error) = record.error {
        body["error"] = json!(error);
    }
    if record.status == TaskStatus::Completed {
        body["files"] = json!(record.files);
    }
    Json(body).into_response()
}

async fn fetch_archive(State(state): State<Arc<AppState>>, Path(task_id): Path<String>) -> Response {
    let Some(record) = state.registry.get(&task_id) else {
        return task_not_found();
    };
    if record.status != TaskStatus::Completed {
        return error_response(
            StatusCode::BAD_REQUEST,
            "E_NOT_READY",
            format!("Download not ready. Current status: {}", record.status),
        );
    }
    let Some(zip_path) = record.zip_path else {
        return error_response(StatusCode::INTERNAL_SERVER_ERROR, "E_IO", "archive missing");
    };

    let bytes = match tokio::fs::read(&zip_path).await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!("cannot read archive {}: {e}", zip_path.display());
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "E_IO", e);
        }
    };
    state.registry.cleanup(&task_id).await;

    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/zip".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{ARCHIVE_NAME}\""),
            ),
        ],
        bytes,
    )
        .into_response()
}
