//! Finalize / revert / restart endpoints.
//!
//! These always answer 200: failures are reported inside the result body.

use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use std::sync::Arc;
use validator::Validate;

use super::ApiError;
use crate::{
    extractors::{OptionalJson, ValidJson},
    middlewares::auth::JwtClaims,
    models::lifecycle::{
        BatchFinalizeRequest, CleanupSnapshotsQuery, CleanupSnapshotsResult, FinalizeOptions,
        FinalizeResult, RestartRequest, RestartResult, RevertRequest, RevertResult,
        ValidationReport,
    },
    models::run::{ClassroomRun, RunHistoryStats},
    services::{
        finalization_service::FinalizationService, restart_service::RestartService,
        run_history_service::RunHistoryService, AppState,
    },
};

fn finalization_service(state: &AppState) -> FinalizationService {
    FinalizationService::new(state.store.clone()).with_notifier(state.whatsapp.clone())
}

/// GET /api/v1/classrooms/{id}/finalization/validate
pub async fn validate_finalization(
    State(state): State<Arc<AppState>>,
    Path(classroom_id): Path<String>,
) -> Json<ValidationReport> {
    Json(
        finalization_service(&state)
            .validate_finalization(&classroom_id)
            .await,
    )
}

/// POST /api/v1/classrooms/{id}/finalize
pub async fn finalize_classroom(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(classroom_id): Path<String>,
    OptionalJson(options): OptionalJson<FinalizeOptions>,
) -> Json<FinalizeResult> {
    tracing::info!(classroom_id = %classroom_id, user = %claims.sub, force = options.force, "Finalize requested");
    Json(
        finalization_service(&state)
            .finalize(&classroom_id, Some(&claims.sub), &options)
            .await,
    )
}

/// POST /api/v1/classrooms/finalize-batch
pub async fn batch_finalize(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    ValidJson(req): ValidJson<BatchFinalizeRequest>,
) -> Json<Vec<FinalizeResult>> {
    Json(
        finalization_service(&state)
            .batch_finalize(&req.classroom_ids, Some(&claims.sub), &req.options)
            .await,
    )
}

/// POST /api/v1/classrooms/{id}/revert
pub async fn revert_finalization(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(classroom_id): Path<String>,
    OptionalJson(req): OptionalJson<RevertRequest>,
) -> Json<RevertResult> {
    tracing::info!(classroom_id = %classroom_id, user = %claims.sub, "Revert requested");
    Json(
        finalization_service(&state)
            .revert(&classroom_id, req.snapshot_id.as_deref())
            .await,
    )
}

/// DELETE /api/v1/classrooms/{id}/snapshots?keepLatest=N
pub async fn cleanup_snapshots(
    State(state): State<Arc<AppState>>,
    Path(classroom_id): Path<String>,
    Query(query): Query<CleanupSnapshotsQuery>,
) -> Result<Json<CleanupSnapshotsResult>, ApiError> {
    let result = finalization_service(&state)
        .cleanup_snapshots(&classroom_id, query.keep_latest)
        .await?;

    Ok(Json(result))
}

/// GET /api/v1/classrooms/{id}/restart/validate
pub async fn validate_restart(
    State(state): State<Arc<AppState>>,
    Path(classroom_id): Path<String>,
) -> Json<ValidationReport> {
    Json(
        RestartService::new(state.store.clone())
            .validate_restart(&classroom_id)
            .await,
    )
}

/// POST /api/v1/classrooms/{id}/restart
pub async fn restart_classroom(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(classroom_id): Path<String>,
    OptionalJson(req): OptionalJson<RestartRequest>,
) -> Result<Json<RestartResult>, ApiError> {
    req.validate()
        .map_err(|e| ApiError::bad_request(format!("Validation error: {}", e)))?;

    tracing::info!(classroom_id = %classroom_id, user = %claims.sub, "Restart requested");
    Ok(Json(
        RestartService::new(state.store.clone())
            .restart(&classroom_id, &claims.sub, req.notes)
            .await,
    ))
}

/// GET /api/v1/classrooms/{id}/runs
pub async fn list_runs(
    State(state): State<Arc<AppState>>,
    Path(classroom_id): Path<String>,
) -> Result<Json<Vec<ClassroomRun>>, ApiError> {
    let runs = RunHistoryService::new(state.store.clone())
        .list_runs(&classroom_id)
        .await?;

    Ok(Json(runs))
}

/// GET /api/v1/classrooms/{id}/runs/stats
pub async fn run_stats(
    State(state): State<Arc<AppState>>,
    Path(classroom_id): Path<String>,
) -> Result<Json<RunHistoryStats>, ApiError> {
    let stats = RunHistoryService::new(state.store.clone())
        .run_stats(&classroom_id)
        .await?;

    Ok(Json(stats))
}

/// GET /api/v1/runs/{run_id}
pub async fn get_run(
    State(state): State<Arc<AppState>>,
    Path(run_id): Path<String>,
) -> Result<Json<ClassroomRun>, ApiError> {
    let run = RunHistoryService::new(state.store.clone())
        .get_run(&run_id)
        .await?;

    Ok(Json(run))
}
