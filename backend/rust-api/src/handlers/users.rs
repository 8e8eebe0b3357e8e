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
    models::user::{
        CreateUserRequest, ListUsersQuery, TeacherFlagRequest, UpdateUserRequest, User,
    },
    services::{user_service::UserService, AppState},
};

/// POST /api/v1/users
pub async fn create_user(
    State(state): State<Arc<AppState>>,
    ValidJson(req): ValidJson<CreateUserRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user = UserService::new(state.store.clone())
        .create_user(req)
        .await?;

    Ok((StatusCode::CREATED, Json(user)))
}

/// GET /api/v1/users
pub async fn list_users(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListUsersQuery>,
) -> Result<Json<Vec<User>>, ApiError> {
    let users = UserService::new(state.store.clone())
        .list_users(query)
        .await?;

    Ok(Json(users))
}

/// GET /api/v1/users/{id}
pub async fn get_user(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<Json<User>, ApiError> {
    let user = UserService::new(state.store.clone())
        .get_user(&user_id)
        .await?;

    Ok(Json(user))
}

/// PATCH /api/v1/users/{id}
pub async fn update_user(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    ValidJson(req): ValidJson<UpdateUserRequest>,
) -> Result<Json<User>, ApiError> {
    let user = UserService::new(state.store.clone())
        .update_user(&user_id, req)
        .await?;

    Ok(Json(user))
}

/// DELETE /api/v1/users/{id}
pub async fn delete_user(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    UserService::new(state.store.clone())
        .delete_user(&user_id)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

/// PUT /api/v1/users/{id}/teacher-flag
pub async fn set_teacher_flag(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    AppJson(req): AppJson<TeacherFlagRequest>,
) -> Result<Json<User>, ApiError> {
    let user = UserService::new(state.store.clone())
        .set_teacher_flag(&user_id, req.is_teacher)
        .await?;

    Ok(Json(user))
}
