use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use std::sync::Arc;

use super::ApiError;
use crate::{
    extractors::{AppJson, ValidJson},
    models::classroom::{
        AssignTeacherRequest, Classroom, CreateClassroomRequest, ListClassroomsQuery,
        ModuleCompletionRequest, UpdateClassroomRequest,
    },
    services::{classroom_service::ClassroomService, user_service::UserService, AppState},
};

/// POST /api/v1/classrooms
pub async fn create_classroom(
    State(state): State<Arc<AppState>>,
    ValidJson(req): ValidJson<CreateClassroomRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let classroom = ClassroomService::new(state.store.clone())
        .create_classroom(req)
        .await?;

    Ok((StatusCode::CREATED, Json(classroom)))
}

/// GET /api/v1/classrooms
pub async fn list_classrooms(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListClassroomsQuery>,
) -> Result<Json<Vec<Classroom>>, ApiError> {
    let classrooms = ClassroomService::new(state.store.clone())
        .list_classrooms(query)
        .await?;

    Ok(Json(classrooms))
}

/// GET /api/v1/classrooms/{id}
pub async fn get_classroom(
    State(state): State<Arc<AppState>>,
    Path(classroom_id): Path<String>,
) -> Result<Json<Classroom>, ApiError> {
    let classroom = ClassroomService::new(state.store.clone())
        .get_classroom(&classroom_id)
        .await?;

    Ok(Json(classroom))
}

/// PATCH /api/v1/classrooms/{id}
pub async fn update_classroom(
    State(state): State<Arc<AppState>>,
    Path(classroom_id): Path<String>,
    ValidJson(req): ValidJson<UpdateClassroomRequest>,
) -> Result<Json<Classroom>, ApiError> {
    let classroom = ClassroomService::new(state.store.clone())
        .update_classroom(&classroom_id, req)
        .await?;

    Ok(Json(classroom))
}

/// DELETE /api/v1/classrooms/{id}
pub async fn delete_classroom(
    State(state): State<Arc<AppState>>,
    Path(classroom_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    ClassroomService::new(state.store.clone())
        .delete_classroom(&classroom_id)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

/// PUT /api/v1/classrooms/{id}/teacher
pub async fn assign_teacher(
    State(state): State<Arc<AppState>>,
    Path(classroom_id): Path<String>,
    AppJson(req): AppJson<AssignTeacherRequest>,
) -> Result<Json<Classroom>, ApiError> {
    let classroom = UserService::new(state.store.clone())
        .assign_teacher(&classroom_id, &req.teacher_id)
        .await?;

    Ok(Json(classroom))
}

/// POST /api/v1/classrooms/{id}/students/{student_id}
pub async fn enroll_student(
    State(state): State<Arc<AppState>>,
    Path((classroom_id, student_id)): Path<(String, String)>,
) -> Result<Json<Classroom>, ApiError> {
    let classroom = UserService::new(state.store.clone())
        .enroll_student(&classroom_id, &student_id)
        .await?;

    Ok(Json(classroom))
}

/// DELETE /api/v1/classrooms/{id}/students/{student_id}
pub async fn unenroll_student(
    State(state): State<Arc<AppState>>,
    Path((classroom_id, student_id)): Path<(String, String)>,
) -> Result<Json<Classroom>, ApiError> {
    let classroom = UserService::new(state.store.clone())
        .unenroll_student(&classroom_id, &student_id)
        .await?;

    Ok(Json(classroom))
}

/// PUT /api/v1/classrooms/{id}/modules/{module_id}/completion
pub async fn set_module_completion(
    State(state): State<Arc<AppState>>,
    Path((classroom_id, module_id)): Path<(String, String)>,
    AppJson(req): AppJson<ModuleCompletionRequest>,
) -> Result<Json<Classroom>, ApiError> {
    let classroom = ClassroomService::new(state.store.clone())
        .set_module_completion(&classroom_id, &module_id, req.is_completed)
        .await?;

    Ok(Json(classroom))
}
