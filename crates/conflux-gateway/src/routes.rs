use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use tracing::{debug, info};

use conflux_core::error::ConfluxError;
use conflux_core::types::RunId;
use conflux_engine::WorkflowGraph;

use crate::middleware::Authenticated;
use crate::state::AppState;
use crate::stream;

type ApiError = (StatusCode, Json<serde_json::Value>);
type ApiResult = Result<Json<serde_json::Value>, ApiError>;

fn error_response(error: ConfluxError) -> ApiError {
    let status = match &error {
        ConfluxError::RunNotFound(_) | ConfluxError::GraphNotFound(_) => StatusCode::NOT_FOUND,
        ConfluxError::InvalidRunState { .. } => StatusCode::CONFLICT,
        ConfluxError::GraphInvalid { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        ConfluxError::SchemaInvalid { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let body = match &error {
        ConfluxError::GraphInvalid { violations, .. } => serde_json::json!({
            "error": error.to_string(),
            "kind": error.kind(),
            "violations": violations,
        }),
        _ => serde_json::json!({
            "error": error.to_string(),
            "kind": error.kind(),
        }),
    };
    (status, Json(body))
}

// GET /api/health — no auth required
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

// POST /api/graphs — validate and publish a graph definition
pub async fn publish_graph(
    _auth: Authenticated,
    State(state): State<Arc<AppState>>,
    Json(graph): Json<WorkflowGraph>,
) -> ApiResult {
    let reference = graph.reference();
    state
        .engine
        .publish(graph)
        .await
        .map_err(error_response)?;
    Ok(Json(serde_json::json!({ "published": reference })))
}

// GET /api/graphs — list published graphs
pub async fn list_graphs(
    _auth: Authenticated,
    State(state): State<Arc<AppState>>,
) -> ApiResult {
    let graphs: Vec<serde_json::Value> = state
        .engine
        .list_graphs()
        .into_iter()
        .map(|(name, version, nodes)| {
            serde_json::json!({
                "name": name,
                "version": version,
                "nodes": nodes,
            })
        })
        .collect();
    Ok(Json(serde_json::json!({ "graphs": graphs })))
}

#[derive(Deserialize)]
pub struct SubmitBody {
    pub graph: String,
    #[serde(default)]
    pub version: Option<u32>,
    #[serde(default)]
    pub input: serde_json::Map<String, serde_json::Value>,
}

// POST /api/runs — submit a run and start it
pub async fn submit_run(
    _auth: Authenticated,
    State(state): State<Arc<AppState>>,
    Json(body): Json<SubmitBody>,
) -> ApiResult {
    let run_id = state
        .engine
        .run(&body.graph, body.version, body.input)
        .await
        .map_err(error_response)?;

    let status = state
        .engine
        .snapshot(&run_id)
        .await
        .map(|s| s.status.to_string())
        .unwrap_or_else(|_| "PENDING".to_string());

    info!(run_id = %run_id, graph = %body.graph, "Run accepted");
    Ok(Json(serde_json::json!({
        "run_id": run_id.to_string(),
        "status": status,
    })))
}

// GET /api/runs — list run snapshots
pub async fn list_runs(
    _auth: Authenticated,
    State(state): State<Arc<AppState>>,
) -> ApiResult {
    let runs: Vec<serde_json::Value> = state
        .engine
        .list_runs()
        .into_iter()
        .map(|run| {
            serde_json::json!({
                "run_id": run.run_id.to_string(),
                "graph": run.graph,
                "graph_version": run.graph_version,
                "status": run.status,
                "current_node": run.current_node,
                "steps": run.history.len(),
            })
        })
        .collect();
    Ok(Json(serde_json::json!({ "runs": runs })))
}

// GET /api/runs/:id — full instance snapshot
pub async fn get_run(
    _auth: Authenticated,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult {
    let snapshot = state
        .engine
        .snapshot(&RunId::from_string(&id))
        .await
        .map_err(error_response)?;
    let body = serde_json::to_value(&snapshot).map_err(|e| error_response(e.into()))?;
    Ok(Json(body))
}

#[derive(Deserialize)]
pub struct ResumeBody {
    #[serde(default)]
    pub input: serde_json::Map<String, serde_json::Value>,
}

// POST /api/runs/:id/resume — resume a SUSPENDED run
pub async fn resume_run(
    _auth: Authenticated,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<ResumeBody>,
) -> ApiResult {
    let run_id = RunId::from_string(&id);
    state
        .engine
        .resume(&run_id, body.input)
        .await
        .map_err(error_response)?;
    Ok(Json(serde_json::json!({
        "run_id": run_id.to_string(),
        "status": "RUNNING",
    })))
}

// POST /api/runs/:id/cancel — request cooperative cancellation
pub async fn cancel_run(
    _auth: Authenticated,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult {
    let run_id = RunId::from_string(&id);
    state
        .engine
        .cancel(&run_id)
        .await
        .map_err(error_response)?;
    Ok(Json(serde_json::json!({ "cancellation_requested": true })))
}

// DELETE /api/runs/:id — purge a terminal run
pub async fn purge_run(
    _auth: Authenticated,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult {
    let run_id = RunId::from_string(&id);
    state
        .engine
        .purge(&run_id)
        .await
        .map_err(error_response)?;
    Ok(Json(serde_json::json!({ "purged": run_id.to_string() })))
}

#[derive(Deserialize)]
pub struct EventsQuery {
    #[serde(default)]
    pub replay: bool,
}

// GET /api/runs/:id/events — WebSocket event stream until terminal
pub async fn run_events(
    ws: WebSocketUpgrade,
    _auth: Authenticated,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<EventsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let run_id = RunId::from_string(&id);
    // Reject before upgrading if the run does not exist at all.
    state
        .engine
        .snapshot(&run_id)
        .await
        .map_err(error_response)?;

    let engine = state.engine.clone();
    let replay = query.replay;
    debug!(run_id = %run_id, replay, "Event stream subscriber connected");
    Ok(ws.on_upgrade(move |socket| stream::handle_events_socket(socket, engine, run_id, replay)))
}
