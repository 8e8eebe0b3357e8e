use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use std::sync::Arc;

use super::ApiError;
use crate::{
    extractors::{AppJson, ValidJson},
    models::whatsapp::{
        ClassroomGroupSync, CreateGroupRequest, GroupInfo, SendMessageRequest, SentMessage,
        SessionInfo, StartSessionRequest, SyncParticipantsRequest, SyncParticipantsResult,
    },
    services::{
        whatsapp_client::{WhatsappClient, WhatsappSession},
        AppState,
    },
};

fn client(state: &AppState) -> Result<&WhatsappClient, ApiError> {
    state
        .whatsapp
        .as_ref()
        .ok_or_else(|| ApiError::ServiceUnavailable("WhatsApp provider is not configured".to_string()))
}

/// POST /api/v1/whatsapp/sessions
pub async fn start_session(
    State(state): State<Arc<AppState>>,
    ValidJson(req): ValidJson<StartSessionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (_, info) = client(&state)?.start_session(&req.session_id).await?;
    Ok((StatusCode::CREATED, Json(info)))
}

/// GET /api/v1/whatsapp/sessions/{session_id}
pub async fn session_status(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionInfo>, ApiError> {
    let info = client(&state)?
        .session_status(&WhatsappSession::new(session_id))
        .await?;
    Ok(Json(info))
}

/// POST /api/v1/whatsapp/sessions/{session_id}/restart
pub async fn restart_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionInfo>, ApiError> {
    let info = client(&state)?
        .restart_session(&WhatsappSession::new(session_id))
        .await?;
    Ok(Json(info))
}

/// DELETE /api/v1/whatsapp/sessions/{session_id}
pub async fn close_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    client(&state)?
        .close_session(&WhatsappSession::new(session_id))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/whatsapp/sessions/{session_id}/groups
pub async fn create_group(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    ValidJson(req): ValidJson<CreateGroupRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let group: GroupInfo = client(&state)?
        .create_group(&WhatsappSession::new(session_id), &req)
        .await?;
    Ok((StatusCode::CREATED, Json(group)))
}

/// POST /api/v1/whatsapp/sessions/{session_id}/groups/{group_id}/participants
pub async fn sync_participants(
    State(state): State<Arc<AppState>>,
    Path((session_id, group_id)): Path<(String, String)>,
    AppJson(req): AppJson<SyncParticipantsRequest>,
) -> Result<Json<SyncParticipantsResult>, ApiError> {
    if req.add.is_empty() && req.remove.is_empty() {
        return Err(ApiError::bad_request("Nothing to add or remove"));
    }

    let result = client(&state)?
        .sync_participants(&WhatsappSession::new(session_id), &group_id, &req)
        .await?;
    Ok(Json(result))
}

/// POST /api/v1/whatsapp/sessions/{session_id}/messages
pub async fn send_message(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    AppJson(req): AppJson<SendMessageRequest>,
) -> Result<Json<SentMessage>, ApiError> {
    if req.recipients.is_empty() {
        return Err(ApiError::bad_request("At least one recipient is required"));
    }

    let sent = client(&state)?
        .send_message(&WhatsappSession::new(session_id), &req)
        .await?;
    Ok(Json(sent))
}

/// POST /api/v1/classrooms/{id}/whatsapp/sync
pub async fn sync_classroom_group(
    State(state): State<Arc<AppState>>,
    Path(classroom_id): Path<String>,
) -> Result<Json<ClassroomGroupSync>, ApiError> {
    let client = client(&state)?;
    let result = client
        .sync_classroom_group(&state.store, client.default_session(), &classroom_id)
        .await?;
    Ok(Json(result))
}
