//! API routes for the version server.
//!
//! Wire shapes match what the updater's metadata client expects; both
//! branches of /update answer 200, mirroring how clients distinguish
//! them by payload rather than status code.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tracing::{error, info};

use snapup_common::{
    UpdateResponse, VersionIncrementRequest, VersionIncrementResponse, VersionResetRequest,
    VersionResetResponse,
};

use crate::store::{VersionRecord, VersionStore};

/// Shared state across handlers
pub struct AppState {
    pub store: RwLock<VersionStore>,
}

type AppStateArc = Arc<AppState>;
type ApiError = (StatusCode, Json<Value>);

fn internal_error(e: anyhow::Error) -> ApiError {
    error!("  Request failed: {e}");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": e.to_string() })),
    )
}

pub fn router(state: AppStateArc) -> Router {
    Router::new()
        .route("/update", get(check_update))
        .route("/health", get(health))
        .route("/versions", get(all_versions))
        .route("/stats", get(stats))
        .route("/version/current", get(current_version))
        .route("/version/increment", post(increment_version))
        .route("/version/reset", post(reset_version))
        .with_state(state)
}

/// Decides the /update answer: a full payload when the newest published
/// version differs from what the client runs, a no-update echo otherwise.
pub fn update_response_for(latest: Option<&VersionRecord>, current: &str) -> UpdateResponse {
    match latest {
        Some(latest) if latest.version_name != current => UpdateResponse {
            version_code: Some(latest.version_code),
            version_name: Some(latest.version_name.clone()),
            download_url: Some(latest.download_url.clone()),
            release_notes: Some(latest.release_notes.clone()),
            is_force_update: latest.is_force_update,
            sha256: latest.sha256.clone(),
            ..Default::default()
        },
        latest => UpdateResponse {
            message: Some("No update available".to_string()),
            current_version: Some(current.to_string()),
            latest_version: Some(
                latest
                    .map(|l| l.version_name.clone())
                    .unwrap_or_else(|| current.to_string()),
            ),
            ..Default::default()
        },
    }
}

async fn check_update(
    State(state): State<AppStateArc>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<UpdateResponse>, ApiError> {
    let current = params
        .get("version")
        .cloned()
        .unwrap_or_else(|| "1.0".to_string());

    let store = state.store.read().await;
    let latest = store.latest().map_err(internal_error)?;
    info!(
        "  Update check from {current}, latest {}",
        latest.as_ref().map(|l| l.version_name.as_str()).unwrap_or("none")
    );

    Ok(Json(update_response_for(latest.as_ref(), &current)))
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "server_version": env!("CARGO_PKG_VERSION"),
        "uptime": "running",
    }))
}

async fn all_versions(State(state): State<AppStateArc>) -> Result<Json<Value>, ApiError> {
    let store = state.store.read().await;
    let versions = store.all().map_err(internal_error)?;
    Ok(Json(json!({
        "total": versions.len(),
        "versions": versions,
    })))
}

async fn stats(State(state): State<AppStateArc>) -> Result<Json<Value>, ApiError> {
    let store = state.store.read().await;
    store.stats().map(Json).map_err(internal_error)
}

async fn current_version(State(state): State<AppStateArc>) -> Result<Json<Value>, ApiError> {
    let store = state.store.read().await;
    let latest = store.latest().map_err(internal_error)?;

    Ok(Json(match latest {
        Some(latest) => json!({
            "currentVersion": latest.version_name,
            "versionCode": latest.version_code,
            "releaseNotes": latest.release_notes,
            "isForceUpdate": latest.is_force_update,
        }),
        None => json!({
            "currentVersion": "1.0",
            "versionCode": 1,
            "releaseNotes": "",
            "isForceUpdate": false,
        }),
    }))
}

async fn increment_version(
    State(state): State<AppStateArc>,
    Json(req): Json<VersionIncrementRequest>,
) -> Result<Json<VersionIncrementResponse>, ApiError> {
    if req.version.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "version is required" })),
        ));
    }

    let store = state.store.write().await;
    let record = store
        .add_version(&req.version, &req.release_notes, req.is_force_update)
        .map_err(internal_error)?;

    Ok(Json(VersionIncrementResponse {
        success: true,
        message: format!("Version {} created successfully", record.version_name),
        new_version: record.version_name,
    }))
}

async fn reset_version(
    State(state): State<AppStateArc>,
    Json(req): Json<VersionResetRequest>,
) -> Result<Json<VersionResetResponse>, ApiError> {
    let store = state.store.write().await;

    let previous = store
        .latest()
        .map_err(internal_error)?
        .map(|l| l.version_name)
        .unwrap_or_else(|| "1.0".to_string());

    let notes = format!("{} - Reset to {}", req.reason, req.target_version);
    let record = store
        .reset_to(&req.target_version, &notes)
        .map_err(internal_error)?;

    Ok(Json(VersionResetResponse {
        success: true,
        message: format!("Version reset to {} successfully", record.version_name),
        reset_version: record.version_name,
        previous_version: previous,
    }))
}
