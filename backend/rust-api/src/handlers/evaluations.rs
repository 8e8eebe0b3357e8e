use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use std::sync::Arc;

use super::ApiError;
use crate::{
    extractors::ValidJson,
    middlewares::auth::JwtClaims,
    models::evaluation::{
        AttendanceRecord, ParticipationRecord, RecordAttendanceRequest,
        RecordParticipationRequest, SaveEvaluationRequest, StudentEvaluation, StudentRecordsQuery,
    },
    services::{evaluation_service::EvaluationService, AppState},
};

/// POST /api/v1/classrooms/{id}/attendance
pub async fn record_attendance(
    State(state): State<Arc<AppState>>,
    Path(classroom_id): Path<String>,
    ValidJson(req): ValidJson<RecordAttendanceRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let record = EvaluationService::new(state.store.clone())
        .record_attendance(&classroom_id, req)
        .await?;

    Ok((StatusCode::CREATED, Json(record)))
}

/// GET /api/v1/classrooms/{id}/attendance
pub async fn list_attendance(
    State(state): State<Arc<AppState>>,
    Path(classroom_id): Path<String>,
    Query(query): Query<StudentRecordsQuery>,
) -> Result<Json<Vec<AttendanceRecord>>, ApiError> {
    let records = EvaluationService::new(state.store.clone())
        .list_attendance(&classroom_id, query.student_id.as_deref())
        .await?;

    Ok(Json(records))
}

/// POST /api/v1/classrooms/{id}/participation
pub async fn record_participation(
    State(state): State<Arc<AppState>>,
    Path(classroom_id): Path<String>,
    ValidJson(req): ValidJson<RecordParticipationRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let record = EvaluationService::new(state.store.clone())
        .record_participation(&classroom_id, req)
        .await?;

    Ok((StatusCode::CREATED, Json(record)))
}

/// GET /api/v1/classrooms/{id}/participation
pub async fn list_participation(
    State(state): State<Arc<AppState>>,
    Path(classroom_id): Path<String>,
    Query(query): Query<StudentRecordsQuery>,
) -> Result<Json<Vec<ParticipationRecord>>, ApiError> {
    let records = EvaluationService::new(state.store.clone())
        .list_participation(&classroom_id, query.student_id.as_deref())
        .await?;

    Ok(Json(records))
}

/// GET /api/v1/classrooms/{id}/evaluations
pub async fn list_evaluations(
    State(state): State<Arc<AppState>>,
    Path(classroom_id): Path<String>,
) -> Result<Json<Vec<StudentEvaluation>>, ApiError> {
    let evaluations = EvaluationService::new(state.store.clone())
        .list_evaluations(&classroom_id)
        .await?;

    Ok(Json(evaluations))
}

/// PUT /api/v1/classrooms/{id}/evaluations/{student_id}
pub async fn save_evaluation(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path((classroom_id, student_id)): Path<(String, String)>,
    ValidJson(req): ValidJson<SaveEvaluationRequest>,
) -> Result<Json<StudentEvaluation>, ApiError> {
    let evaluation = EvaluationService::new(state.store.clone())
        .save_evaluation(&classroom_id, &student_id, req, Some(&claims.sub))
        .await?;

    Ok(Json(evaluation))
}

/// GET /api/v1/classrooms/{id}/evaluations/{student_id}
pub async fn get_evaluation(
    State(state): State<Arc<AppState>>,
    Path((classroom_id, student_id)): Path<(String, String)>,
) -> Result<Json<StudentEvaluation>, ApiError> {
    let evaluation = EvaluationService::new(state.store.clone())
        .get_evaluation(&classroom_id, &student_id)
        .await?;

    Ok(Json(evaluation))
}
