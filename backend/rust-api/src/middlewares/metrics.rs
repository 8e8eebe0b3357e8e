use axum::{extract::Request, middleware::Next, response::Response};
use std::time::Instant;

use crate::metrics::{HTTP_REQUESTS_TOTAL, HTTP_REQUEST_DURATION_SECONDS};

/// Records request count and latency per normalized route
pub async fn metrics_middleware(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().to_string();
    let path = normalize_path(req.uri().path());

    let response = next.run(req).await;

    let duration = start.elapsed().as_secs_f64();
    let status = response.status().as_u16().to_string();

    HTTP_REQUESTS_TOTAL
        .with_label_values(&[&method, &path, &status])
        .inc();

    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[&method, &path])
        .observe(duration);

    response
}

/// Static route segments of the API; anything else in a path is an id.
const STATIC_SEGMENTS: &[&str] = &[
    "api",
    "v1",
    "health",
    "metrics",
    "users",
    "teacher-flag",
    "programs",
    "classrooms",
    "teacher",
    "students",
    "modules",
    "completion",
    "finalization",
    "validate",
    "finalize",
    "finalize-batch",
    "revert",
    "snapshots",
    "restart",
    "runs",
    "stats",
    "attendance",
    "participation",
    "evaluations",
    "whatsapp",
    "sessions",
    "status",
    "groups",
    "participants",
    "messages",
    "sync",
];

/// Collapses ids into `{id}` to keep label cardinality bounded
fn normalize_path(path: &str) -> String {
    path.split('/')
        .map(|segment| {
            if segment.is_empty() || STATIC_SEGMENTS.contains(&segment) {
                segment
            } else {
                "{id}"
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path() {
        assert_eq!(
            normalize_path("/api/v1/classrooms/550e8400-e29b-41d4-a716-446655440000/finalize"),
            "/api/v1/classrooms/{id}/finalize"
        );
        assert_eq!(
            normalize_path("/api/v1/classrooms/c1/students/s1"),
            "/api/v1/classrooms/{id}/students/{id}"
        );
        assert_eq!(
            normalize_path("/api/v1/classrooms/finalize-batch"),
            "/api/v1/classrooms/finalize-batch"
        );
        assert_eq!(normalize_path("/health"), "/health");
        assert_eq!(normalize_path("/metrics"), "/metrics");
    }
}
