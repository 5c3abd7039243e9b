//! Credential management handlers.
//!
//! Thin adapters from HTTP to the [`AccessService`](crate::services::AccessService)
//! operations. Request bodies that fail to parse get the same `{error}` body
//! as domain errors.

use super::shared_types::{ApiError, ApiResponse, ErrorResponse};
use crate::app_state::AppState;
use crate::domain::{Credential, CredentialInput, LockOp, StatusFilter, StatusView};
use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    // ---
    filter: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LockRequest {
    // ---
    op: LockOp,
}

#[derive(Debug, Serialize)]
pub struct DeletedResponse {
    // ---
    pub deleted: String,
}

/// Maps a body extraction failure to the shared error shape.
fn bad_body(rejection: JsonRejection) -> Response {
    // ---
    tracing::debug!("rejected request body: {}", rejection.body_text());
    (
        rejection.status(),
        Json(ErrorResponse {
            error: rejection.body_text(),
        }),
    )
        .into_response()
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /credentials?filter=all|online|expired
///
/// Runs a reconcile pass and returns every credential with its live status.
#[tracing::instrument(skip(state))]
pub async fn list_credentials(
    State(state): State<AppState>,
    Query(query): Query<StatusQuery>,
) -> Result<ApiResponse<StatusView>, ApiError> {
    // ---
    let filter: StatusFilter = query.filter.as_deref().unwrap_or("all").parse()?;
    let mut view = state.access().build_status_view(filter).await?;
    let warnings = std::mem::take(&mut view.warnings);
    Ok(ApiResponse::new(view, warnings))
}

/// POST /credentials
///
/// Creates a credential, or updates the one with the same username.
#[tracing::instrument(skip(state, body))]
pub async fn save_credential(
    State(state): State<AppState>,
    body: Result<Json<CredentialInput>, JsonRejection>,
) -> Response {
    // ---
    let input = match body {
        Ok(Json(input)) => input,
        Err(rejection) => return bad_body(rejection),
    };
    match state.access().add_or_update_credential(input).await {
        Ok(change) => ApiResponse::<Credential>::new(change.value, change.warnings).into_response(),
        Err(err) => ApiError(err).into_response(),
    }
}

/// DELETE /credentials/{username}
#[tracing::instrument(skip(state))]
pub async fn delete_credential(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> Result<ApiResponse<DeletedResponse>, ApiError> {
    // ---
    let change = state.access().delete_credential(&username).await?;
    Ok(ApiResponse::new(
        DeletedResponse { deleted: username },
        change.warnings,
    ))
}

/// POST /credentials/{username}/lock
///
/// Body `{ "op": "lock" }` binds the credential to the address currently
/// using its port; `{ "op": "clear" }` removes the binding.
#[tracing::instrument(skip(state, body))]
pub async fn set_lock(
    State(state): State<AppState>,
    Path(username): Path<String>,
    body: Result<Json<LockRequest>, JsonRejection>,
) -> Response {
    // ---
    let op = match body {
        Ok(Json(LockRequest { op })) => op,
        Err(rejection) => return bad_body(rejection),
    };
    match state.access().set_device_lock(&username, op).await {
        Ok(change) => ApiResponse::new(change.value, change.warnings).into_response(),
        Err(err) => ApiError(err).into_response(),
    }
}

/// POST /reconcile
///
/// Runs the reconcile pass now instead of waiting for the timer.
#[tracing::instrument(skip(state))]
pub async fn run_reconcile(State(state): State<AppState>) -> Response {
    // ---
    match state.access().reconcile().await {
        Ok(mut report) => {
            let warnings = std::mem::take(&mut report.warnings);
            (StatusCode::OK, ApiResponse::new(report, warnings)).into_response()
        }
        Err(err) => ApiError(err).into_response(),
    }
}
