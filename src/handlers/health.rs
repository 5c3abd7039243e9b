use crate::app_state::AppState;
use crate::services::HealthReport;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    components: Option<HealthReport>,
}

#[derive(Deserialize)]
pub struct HealthQuery {
    mode: Option<String>,
}

/// Responds with the health status of the server.
///
/// - By default (no query parameters), performs a light check to confirm the web server
///   is running.
///
/// - If `mode=full` is passed as a query parameter, also loads the registry and lists
///   the packet filter.
///
/// # Responses
/// - `200 OK` with `{ "status": "ok" }` if the server (and, in full mode, the packet
///   filter) is healthy.
/// - `503 SERVICE UNAVAILABLE` with `{ "status": "degraded", ... }` if the packet filter
///   cannot be listed in full mode.
pub async fn health_check(
    State(state): State<AppState>,
    Query(params): Query<HealthQuery>,
) -> (StatusCode, Json<HealthResponse>) {
    match params.mode.as_deref() {
        Some("full") => {
            let report = state.access().health().await;
            let (code, status) = match report.firewall_error {
                None => (StatusCode::OK, "ok"),
                Some(_) => (StatusCode::SERVICE_UNAVAILABLE, "degraded"),
            };
            (
                code,
                Json(HealthResponse {
                    status,
                    components: Some(report),
                }),
            )
        }
        _ => (
            StatusCode::OK,
            Json(HealthResponse {
                status: "ok",
                components: None,
            }),
        ),
    }
}
