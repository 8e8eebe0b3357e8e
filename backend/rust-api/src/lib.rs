use axum::{
    http::{header, Method},
    middleware,
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};

pub mod config;
pub mod extractors;
pub mod handlers;
pub mod metrics;
pub mod middlewares;
pub mod models;
pub mod services;
pub mod store;
pub mod utils;

pub use config::Config;
pub use services::AppState;

pub fn create_router(app_state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_origin(tower_http::cors::Any);

    let api = admin_routes()
        .merge(teaching_routes())
        .layer(middleware::from_fn_with_state(
            app_state.clone(),
            middlewares::auth::auth_middleware,
        ));

    Router::new()
        // Public endpoints
        .route("/health", get(handlers::health_check))
        .route(
            "/metrics",
            get(handlers::metrics_handler)
                .layer(middleware::from_fn(handlers::metrics_auth_middleware)),
        )
        .nest("/api/v1", api)
        .with_state(app_state)
        .layer(cors)
        .layer(CompressionLayer::new())
        .layer(middleware::from_fn(
            middlewares::metrics::metrics_middleware,
        ))
        .layer(middleware::from_fn(
            middlewares::trace::trace_context_middleware,
        ))
        .layer(TraceLayer::new_for_http())
}

fn admin_routes() -> Router<Arc<AppState>> {
    use handlers::{classrooms, lifecycle, programs, users, whatsapp};

    Router::new()
        // Programs
        .route(
            "/programs",
            get(programs::list_programs).post(programs::create_program),
        )
        .route(
            "/programs/{id}",
            get(programs::get_program)
                .patch(programs::update_program)
                .delete(programs::delete_program),
        )
        // Classrooms
        .route(
            "/classrooms",
            get(classrooms::list_classrooms).post(classrooms::create_classroom),
        )
        .route(
            "/classrooms/{id}",
            get(classrooms::get_classroom)
                .patch(classrooms::update_classroom)
                .delete(classrooms::delete_classroom),
        )
        .route("/classrooms/{id}/teacher", put(classrooms::assign_teacher))
        .route(
            "/classrooms/{id}/students/{student_id}",
            post(classrooms::enroll_student).delete(classrooms::unenroll_student),
        )
        // Lifecycle
        .route(
            "/classrooms/{id}/finalization/validate",
            get(lifecycle::validate_finalization),
        )
        .route("/classrooms/{id}/finalize", post(lifecycle::finalize_classroom))
        .route("/classrooms/{id}/revert", post(lifecycle::revert_finalization))
        .route("/classrooms/finalize-batch", post(lifecycle::batch_finalize))
        .route(
            "/classrooms/{id}/snapshots",
            axum::routing::delete(lifecycle::cleanup_snapshots),
        )
        .route(
            "/classrooms/{id}/restart/validate",
            get(lifecycle::validate_restart),
        )
        .route("/classrooms/{id}/restart", post(lifecycle::restart_classroom))
        // Users
        .route("/users", get(users::list_users).post(users::create_user))
        .route(
            "/users/{id}",
            get(users::get_user)
                .patch(users::update_user)
                .delete(users::delete_user),
        )
        .route("/users/{id}/teacher-flag", put(users::set_teacher_flag))
        // WhatsApp
        .route("/whatsapp/sessions", post(whatsapp::start_session))
        .route(
            "/whatsapp/sessions/{session_id}",
            get(whatsapp::session_status).delete(whatsapp::close_session),
        )
        .route(
            "/whatsapp/sessions/{session_id}/restart",
            post(whatsapp::restart_session),
        )
        .route(
            "/whatsapp/sessions/{session_id}/groups",
            post(whatsapp::create_group),
        )
        .route(
            "/whatsapp/sessions/{session_id}/groups/{group_id}/participants",
            post(whatsapp::sync_participants),
        )
        .route(
            "/whatsapp/sessions/{session_id}/messages",
            post(whatsapp::send_message),
        )
        .route(
            "/classrooms/{id}/whatsapp/sync",
            post(whatsapp::sync_classroom_group),
        )
        .route_layer(middleware::from_fn(
            middlewares::auth::admin_guard_middleware,
        ))
}

fn teaching_routes() -> Router<Arc<AppState>> {
    use handlers::{classrooms, evaluations, lifecycle};

    Router::new()
        .route(
            "/classrooms/{id}/modules/{module_id}/completion",
            put(classrooms::set_module_completion),
        )
        .route(
            "/classrooms/{id}/attendance",
            get(evaluations::list_attendance).post(evaluations::record_attendance),
        )
        .route(
            "/classrooms/{id}/participation",
            get(evaluations::list_participation).post(evaluations::record_participation),
        )
        .route(
            "/classrooms/{id}/evaluations",
            get(evaluations::list_evaluations),
        )
        .route(
            "/classrooms/{id}/evaluations/{student_id}",
            get(evaluations::get_evaluation).put(evaluations::save_evaluation),
        )
        .route("/classrooms/{id}/runs", get(lifecycle::list_runs))
        .route("/classrooms/{id}/runs/stats", get(lifecycle::run_stats))
        .route("/runs/{run_id}", get(lifecycle::get_run))
        .route_layer(middleware::from_fn(
            middlewares::auth::teacher_guard_middleware,
        ))
}
