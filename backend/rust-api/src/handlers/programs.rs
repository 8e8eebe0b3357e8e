use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use std::sync::Arc;

use super::ApiError;
use crate::{
    extractors::ValidJson,
    models::program::{CreateProgramRequest, Program, UpdateProgramRequest},
    services::{program_service::ProgramService, AppState},
};

/// POST /api/v1/programs
pub async fn create_program(
    State(state): State<Arc<AppState>>,
    ValidJson(req): ValidJson<CreateProgramRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let program = ProgramService::new(state.store.clone())
        .create_program(req)
        .await?;

    Ok((StatusCode::CREATED, Json(program)))
}

/// GET /api/v1/programs
pub async fn list_programs(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Program>>, ApiError> {
    let programs = ProgramService::new(state.store.clone())
        .list_programs()
        .await?;

    Ok(Json(programs))
}

/// GET /api/v1/programs/{id}
pub async fn get_program(
    State(state): State<Arc<AppState>>,
    Path(program_id): Path<String>,
) -> Result<Json<Program>, ApiError> {
    let program = ProgramService::new(state.store.clone())
        .get_program(&program_id)
        .await?;

    Ok(Json(program))
}

/// PATCH /api/v1/programs/{id}
pub async fn update_program(
    State(state): State<Arc<AppState>>,
    Path(program_id): Path<String>,
    ValidJson(req): ValidJson<UpdateProgramRequest>,
) -> Result<Json<Program>, ApiError> {
    let program = ProgramService::new(state.store.clone())
        .update_program(&program_id, req)
        .await?;

    Ok(Json(program))
}

/// DELETE /api/v1/programs/{id}
pub async fn delete_program(
    State(state): State<Arc<AppState>>,
    Path(program_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    ProgramService::new(state.store.clone())
        .delete_program(&program_id)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}
