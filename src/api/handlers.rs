//! Request handlers for the script API.
//!
//! Handlers only translate between JSON and [`RunCoordinator`] calls; every
//! rule about runs lives in the coordinator.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::Json;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::engine::{RunCoordinator, UploadRequest};
use crate::store::ScriptRun;
use crate::types::ScriptId;

use super::error::{ApiError, ApiResult};
use super::AppState;

const DEFAULT_FILE_NAME: &str = "script.py";

#[derive(Debug, Deserialize)]
pub struct UploadBody {
    pub file_name: Option<String>,
    pub file_content: Option<String>,
    pub hours: Option<f64>,
    /// `"base64"` when `file_content` is base64 encoded; plain text otherwise.
    pub encoding: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ScriptIdBody {
    pub script_id: Option<IdField>,
}

/// A script id sent either as a JSON number or as a numeric string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum IdField {
    Number(ScriptId),
    Text(String),
}

#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    pub script_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub success: bool,
    pub script_id: ScriptId,
    pub filename: String,
    pub run_time: f64,
    pub message: &'static str,
}

#[derive(Debug, Serialize)]
pub struct StartResponse {
    pub success: bool,
    pub message: &'static str,
    pub script_id: ScriptId,
    pub run_time: f64,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub success: bool,
    pub message: &'static str,
}

#[derive(Debug, Serialize)]
pub struct LogsResponse {
    pub success: bool,
    pub logs: String,
    pub script_id: ScriptId,
}

#[derive(Debug, Serialize)]
pub struct ScriptsResponse {
    pub success: bool,
    pub scripts: Vec<ScriptRun>,
}

#[derive(Debug, Serialize)]
pub struct ResubmitResponse {
    pub success: bool,
    pub script_id: ScriptId,
    pub message: &'static str,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

fn coordinator(state: &AppState) -> &RunCoordinator {
    &state.coordinator
}

fn parse_body<T>(payload: Result<Json<T>, JsonRejection>) -> ApiResult<T> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| ApiError::BadRequest(rejection.body_text()))
}

fn require_id(id: Option<IdField>) -> ApiResult<ScriptId> {
    match id {
        Some(IdField::Number(id)) => Ok(id),
        Some(IdField::Text(raw)) => parse_id(Some(raw)),
        None => parse_id(None),
    }
}

fn parse_id(raw: Option<String>) -> ApiResult<ScriptId> {
    let raw = raw
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("Script ID is required".to_string()))?;
    raw.trim()
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("Invalid script ID '{raw}'")))
}

/// POST /api/upload
pub async fn upload(
    State(state): State<AppState>,
    payload: Result<Json<UploadBody>, JsonRejection>,
) -> ApiResult<Json<UploadResponse>> {
    let body = parse_body(payload)?;

    let content = body.file_content.unwrap_or_default();
    let content = match body.encoding.as_deref() {
        Some("base64") => BASE64
            .decode(content.trim())
            .map_err(|e| ApiError::BadRequest(format!("Invalid base64 file content: {e}")))?,
        Some("text") | None => content.into_bytes(),
        Some(other) => {
            return Err(ApiError::BadRequest(format!(
                "Unsupported encoding '{other}' (expected \"base64\" or \"text\")"
            )));
        }
    };

    let run = coordinator(&state).upload(UploadRequest {
        file_name: body
            .file_name
            .unwrap_or_else(|| DEFAULT_FILE_NAME.to_string()),
        content,
        run_time_hours: body.hours,
    })?;

    Ok(Json(UploadResponse {
        success: true,
        script_id: run.id,
        filename: run.script_name,
        run_time: run.run_time_hours,
        message: "File uploaded successfully",
    }))
}

/// POST /api/start
pub async fn start(
    State(state): State<AppState>,
    payload: Result<Json<ScriptIdBody>, JsonRejection>,
) -> ApiResult<Json<StartResponse>> {
    let id = require_id(parse_body(payload)?.script_id)?;
    let accepted = coordinator(&state).start(id)?;

    Ok(Json(StartResponse {
        success: true,
        message: "Script started",
        script_id: accepted.script_id,
        run_time: accepted.run_time_hours,
    }))
}

/// POST /api/stop
pub async fn stop(
    State(state): State<AppState>,
    payload: Result<Json<ScriptIdBody>, JsonRejection>,
) -> ApiResult<Json<MessageResponse>> {
    let id = require_id(parse_body(payload)?.script_id)?;
    coordinator(&state).stop(id).await?;

    Ok(Json(MessageResponse {
        success: true,
        message: "Script stopped successfully",
    }))
}

/// GET /api/logs?script_id=
pub async fn logs(
    State(state): State<AppState>,
    Query(query): Query<LogsQuery>,
) -> ApiResult<impl IntoResponse> {
    let id = parse_id(query.script_id)?;

    let logs = coordinator(&state).logs(id).await?;

    Ok((
        [(header::CACHE_CONTROL, "no-cache, no-store, must-revalidate")],
        Json(LogsResponse {
            success: true,
            logs,
            script_id: id,
        }),
    ))
}

/// GET /api/scripts
pub async fn list(State(state): State<AppState>) -> ApiResult<Json<ScriptsResponse>> {
    let scripts = coordinator(&state).list()?;
    Ok(Json(ScriptsResponse {
        success: true,
        scripts,
    }))
}

/// POST /api/resubmit
pub async fn resubmit(
    State(state): State<AppState>,
    payload: Result<Json<ScriptIdBody>, JsonRejection>,
) -> ApiResult<Json<ResubmitResponse>> {
    let id = require_id(parse_body(payload)?.script_id)?;
    let run = coordinator(&state).resubmit(id)?;

    Ok(Json(ResubmitResponse {
        success: true,
        script_id: run.id,
        message: "Script resubmitted",
    }))
}

/// GET /health
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

/// Fallback for known paths hit with the wrong method.
pub async fn method_not_allowed() -> ApiError {
    ApiError::MethodNotAllowed
}
