//! Route handlers — translate HTTP requests into `DaemonCommand`s and
//! the daemon's replies into JSON (SPEC_FULL §6 IPC surface).

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};

/// One file's progress, matching the IPC surface's `Transfers()` shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferView {
    pub file_name: String,
    pub destination: String,
    pub size: i64,
    pub transferred: i64,
    pub complete: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: String,
    pub peer_addr: String,
    pub peer_name: Option<String>,
    pub is_sender: bool,
    pub state: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionDetail {
    pub id: String,
    pub peer_addr: String,
    pub peer_name: Option<String>,
    pub pin: String,
    pub is_sender: bool,
    pub state: String,
    pub failed_reason: Option<String>,
    pub transfers: Vec<TransferView>,
}

#[derive(Debug, Deserialize)]
pub struct ConnectRequest {
    /// `tcp:<host>:<port>` per SPEC_FULL §6 "Transport".
    pub connection_string: String,
    /// Local file paths to offer once the peer accepts (sender role).
    #[serde(default)]
    pub files: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConnectResponse {
    pub session_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub active_sessions: usize,
    pub device_name: String,
}

#[derive(Debug, Serialize)]
pub struct AcceptRejectResponse {
    pub ok: bool,
}

/// Everything the API needs to ask of the daemon, answered over a
/// one-shot reply channel per request (the same request/reply-channel
/// shape the reference codebase uses for its chunk/replay channels).
pub enum DaemonCommand {
    ListSessions(oneshot::Sender<Vec<SessionSummary>>),
    GetSession(String, oneshot::Sender<Option<SessionDetail>>),
    Accept(String, oneshot::Sender<Result<(), String>>),
    Reject(String, oneshot::Sender<Result<(), String>>),
    Connect(ConnectRequest, oneshot::Sender<Result<String, String>>),
    Status(oneshot::Sender<StatusResponse>),
}

#[derive(Clone)]
pub struct ApiState {
    pub commands: mpsc::Sender<DaemonCommand>,
}

async fn ask<T>(
    state: &ApiState,
    build: impl FnOnce(oneshot::Sender<T>) -> DaemonCommand,
) -> Result<T, (StatusCode, String)> {
    let (tx, rx) = oneshot::channel();
    state
        .commands
        .send(build(tx))
        .await
        .map_err(|_| (StatusCode::SERVICE_UNAVAILABLE, "daemon command loop is gone".to_string()))?;
    rx.await
        .map_err(|_| (StatusCode::SERVICE_UNAVAILABLE, "daemon dropped the reply channel".to_string()))
}

pub async fn handle_status(State(state): State<ApiState>) -> Result<Json<StatusResponse>, (StatusCode, String)> {
    let resp = ask(&state, DaemonCommand::Status).await?;
    Ok(Json(resp))
}

pub async fn handle_list_sessions(
    State(state): State<ApiState>,
) -> Result<Json<Vec<SessionSummary>>, (StatusCode, String)> {
    let resp = ask(&state, DaemonCommand::ListSessions).await?;
    Ok(Json(resp))
}

pub async fn handle_get_session(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<SessionDetail>, (StatusCode, String)> {
    let resp = ask(&state, |tx| DaemonCommand::GetSession(id, tx)).await?;
    resp.map(Json).ok_or((StatusCode::NOT_FOUND, "session not found".to_string()))
}

pub async fn handle_accept(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<AcceptRejectResponse>, (StatusCode, String)> {
    ask(&state, |tx| DaemonCommand::Accept(id, tx))
        .await?
        .map(|()| Json(AcceptRejectResponse { ok: true }))
        .map_err(|e| (StatusCode::CONFLICT, e))
}

pub async fn handle_reject(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<AcceptRejectResponse>, (StatusCode, String)> {
    ask(&state, |tx| DaemonCommand::Reject(id, tx))
        .await?
        .map(|()| Json(AcceptRejectResponse { ok: true }))
        .map_err(|e| (StatusCode::CONFLICT, e))
}

pub async fn handle_connect(
    State(state): State<ApiState>,
    Json(body): Json<ConnectRequest>,
) -> Result<Json<ConnectResponse>, (StatusCode, String)> {
    ask(&state, |tx| DaemonCommand::Connect(body, tx))
        .await?
        .map(|session_id| Json(ConnectResponse { session_id }))
        .map_err(|e| (StatusCode::BAD_REQUEST, e))
}
