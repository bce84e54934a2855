//! Route handlers

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use logbridge_buffer::SnapshotQuery;
use logbridge_core::{Batch, Capabilities, ClearMode, JsonlRow, Level, Scope};
use logbridge_logs::{read, ReadOptions};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{ApiResponse, AppState};

fn bad_request(message: impl Into<String>) -> axum::response::Response {
    (StatusCode::BAD_REQUEST, Json(ApiResponse::<()>::err(message))).into_response()
}

/// Resolve `scope` / `session` / `project` parameters, in that priority
fn parse_scope(
    scope: Option<&str>,
    session: Option<&str>,
    project: Option<&str>,
) -> Result<Option<Scope>, String> {
    if let Some(scope) = scope {
        return scope.parse().map(Some).map_err(|e: logbridge_core::Error| e.to_string());
    }
    if let Some(id) = session.filter(|s| !s.is_empty()) {
        return Ok(Some(Scope::Session(id.to_string())));
    }
    if let Some(name) = project.filter(|s| !s.is_empty()) {
        return Ok(Some(Scope::Project(name.to_string())));
    }
    Ok(None)
}

pub async fn health() -> StatusCode {
    StatusCode::NO_CONTENT
}

pub async fn capabilities() -> Json<Capabilities> {
    Json(Capabilities::current())
}

pub async fn ingest(State(state): State<AppState>, body: String) -> axum::response::Response {
    let batch = match Batch::from_json(&body) {
        Ok(batch) => batch,
        Err(e) => {
            debug!("Rejected batch: {}", e);
            return bad_request(e.to_string());
        }
    };

    debug!("Ingested {} entries", batch.len());

    if let Some(durable) = &state.durable {
        let rows: Vec<JsonlRow> = batch.entries.iter().map(JsonlRow::from_entry).collect();
        if let Err(e) = durable.append_all(&rows) {
            warn!("Failed to append to durable store: {}", e);
        }
    }

    state.store.write().extend(batch.entries);

    StatusCode::NO_CONTENT.into_response()
}

#[derive(Debug, Default, Deserialize)]
pub struct TextQuery {
    pub session: Option<String>,
    pub project: Option<String>,
    pub tag: Option<String>,
}

pub async fn text(
    State(state): State<AppState>,
    Query(params): Query<TextQuery>,
) -> axum::response::Response {
    let scope = match parse_scope(None, params.session.as_deref(), params.project.as_deref()) {
        Ok(scope) => scope,
        Err(e) => return bad_request(e),
    };

    let query = SnapshotQuery {
        scope,
        tag: params.tag.filter(|t| !t.is_empty()),
        ..Default::default()
    };

    state.store.read().to_text(&query).into_response()
}

#[derive(Debug, Default, Deserialize)]
pub struct EntriesQuery {
    pub scope: Option<String>,
    pub session: Option<String>,
    pub project: Option<String>,
    /// Comma-separated levels
    pub level: Option<String>,
    pub contains: Option<String>,
    pub since: Option<i64>,
    pub tag: Option<String>,
    pub limit: Option<usize>,
}

pub async fn entries(
    State(state): State<AppState>,
    Query(params): Query<EntriesQuery>,
) -> axum::response::Response {
    let scope = match parse_scope(
        params.scope.as_deref(),
        params.session.as_deref(),
        params.project.as_deref(),
    ) {
        Ok(scope) => scope,
        Err(e) => return bad_request(e),
    };

    let query = SnapshotQuery {
        scope,
        levels: params.level.as_deref().map(Level::parse_list),
        contains: params.contains,
        since: params.since,
        tag: params.tag,
        limit: params.limit,
    };

    let report = state.store.read().snapshot_report(&query);
    Json(ApiResponse::ok(report)).into_response()
}

#[derive(Debug, Default, Deserialize)]
pub struct ClearRequest {
    pub scope: Option<Scope>,
    #[serde(default)]
    pub mode: ClearMode,
}

pub async fn clear(
    State(state): State<AppState>,
    Json(req): Json<ClearRequest>,
) -> impl IntoResponse {
    let removed = state.store.write().clear(req.scope.as_ref(), req.mode);
    debug!(
        "Cleared {} ({:?}), {} entries removed",
        req.scope.as_ref().map(Scope::key).unwrap_or_else(|| "all".into()),
        req.mode,
        removed
    );
    Json(ApiResponse::ok(serde_json::json!({ "removed": removed })))
}

#[derive(Debug, Deserialize)]
pub struct CapacityRequest {
    pub max: usize,
}

pub async fn capacity(
    State(state): State<AppState>,
    Json(req): Json<CapacityRequest>,
) -> impl IntoResponse {
    let capacity = state.store.write().set_capacity(req.max);
    Json(ApiResponse::ok(serde_json::json!({ "capacity": capacity })))
}

pub async fn stats(State(state): State<AppState>) -> impl IntoResponse {
    let stats = state.store.read().stats();
    Json(ApiResponse::ok(stats))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionQuery {
    pub since_id: Option<u64>,
    pub file_id: Option<u64>,
    pub since_ms: Option<i64>,
    pub level: Option<String>,
    pub project: Option<String>,
    pub contains: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionPage {
    pub rows: Vec<JsonlRow>,
    pub next_since_id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_id: Option<u64>,
}

pub async fn session(
    State(state): State<AppState>,
    Query(params): Query<SessionQuery>,
) -> axum::response::Response {
    let Some(durable) = &state.durable else {
        return (
            StatusCode::NOT_FOUND,
            Json(ApiResponse::<()>::err("Durable store is disabled")),
        )
            .into_response();
    };

    let options = ReadOptions {
        since_id: params.since_id.unwrap_or(0),
        file_id: params.file_id,
        since_ms: params.since_ms,
        levels: params.level.as_deref().map(Level::parse_list),
        project: params.project,
        contains: params.contains,
        limit: params.limit,
    };

    match read(durable.path(), &options) {
        Ok(result) => Json(ApiResponse::ok(SessionPage {
            rows: result.rows,
            next_since_id: result.next_since_id,
            file_id: result.file_id,
        }))
        .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiResponse::<()>::err(e.to_string())),
        )
            .into_response(),
    }
}
