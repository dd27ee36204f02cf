//! REST handlers: task submission/inspection/cancellation and session
//! listing/inspection/deletion. Each handler resolves `user_id`
//! from the request's bearer credential, then delegates straight to the
//! Coordinator — no business logic lives here.

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use alex_session::domain::{Session, SessionSummary, TaskStatus};

use crate::auth::{extract_user_id, LegacyTokenQuery};
use crate::error::ApiError;
use crate::state::AppState;

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

#[derive(Deserialize)]
pub struct SubmitTaskRequest {
    pub task: String,
    pub session_id: Option<String>,
    #[serde(default)]
    pub attachments: Vec<String>,
}

#[derive(Serialize)]
pub struct SubmitTaskResponse {
    pub task_id: String,
    pub session_id: String,
    pub status: TaskStatus,
}

pub async fn submit_task(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(legacy): Query<LegacyTokenQuery>,
    Json(request): Json<SubmitTaskRequest>,
) -> Result<Json<SubmitTaskResponse>, ApiError> {
    let user_id = extract_user_id(&headers, &Query(legacy))?;
    let session_id = request.session_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let task_id = state
        .coordinator
        .submit_task(&user_id, &session_id, &request.task, request.attachments)
        .await?;
    Ok(Json(SubmitTaskResponse {
        task_id,
        session_id,
        status: TaskStatus::Pending,
    }))
}

#[derive(Serialize)]
pub struct TaskStatusResponse {
    pub task_id: String,
    pub status: TaskStatus,
}

pub async fn get_task(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(legacy): Query<LegacyTokenQuery>,
    Path(task_id): Path<String>,
) -> Result<Json<TaskStatusResponse>, ApiError> {
    let user_id = extract_user_id(&headers, &Query(legacy))?;
    let status = state.coordinator.get_task(&user_id, &task_id)?;
    Ok(Json(TaskStatusResponse { task_id, status }))
}

pub async fn cancel_task(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(legacy): Query<LegacyTokenQuery>,
    Path(task_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let user_id = extract_user_id(&headers, &Query(legacy))?;
    state.coordinator.cancel_task(&user_id, &task_id)?;
    Ok(Json(json!({ "cancelled": true })))
}

pub async fn list_sessions(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(legacy): Query<LegacyTokenQuery>,
) -> Result<Json<Vec<SessionSummary>>, ApiError> {
    let user_id = extract_user_id(&headers, &Query(legacy))?;
    let sessions = state.coordinator.list_sessions(&user_id).await?;
    Ok(Json(sessions))
}

pub async fn get_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(legacy): Query<LegacyTokenQuery>,
    Path(session_id): Path<String>,
) -> Result<Json<Session>, ApiError> {
    let user_id = extract_user_id(&headers, &Query(legacy))?;
    let session = state.coordinator.get_session(&user_id, &session_id).await?;
    Ok(Json(session))
}

pub async fn delete_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(legacy): Query<LegacyTokenQuery>,
    Path(session_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let user_id = extract_user_id(&headers, &Query(legacy))?;
    state.coordinator.delete_session(&user_id, &session_id).await?;
    Ok(Json(json!({ "deleted": true })))
}
