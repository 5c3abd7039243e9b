use crate::domain::AccessError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

/// Wrapper type for successful API responses.
///
/// Encapsulates the data payload and any warnings from degraded host-side
/// steps, and prepares it for JSON serialization.
#[derive(Serialize)]
pub struct ApiResponse<T> {
    pub data: T,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl<T> ApiResponse<T> {
    pub fn new(data: T, warnings: Vec<String>) -> Self {
        Self { data, warnings }
    }
}

impl<T> IntoResponse for ApiResponse<T>
where
    T: Serialize,
{
    fn into_response(self) -> Response {
        axum::Json(self).into_response()
    }
}

/// Error body returned by every failing endpoint.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    // ---
    pub error: String,
}

/// An [`AccessError`] rendered as an HTTP response.
pub struct ApiError(pub AccessError);

impl From<AccessError> for ApiError {
    fn from(err: AccessError) -> Self {
        ApiError(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        // ---
        match &self.0 {
            AccessError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AccessError::NotFound(_) => StatusCode::NOT_FOUND,
            AccessError::NoRecentTraffic(_) => StatusCode::CONFLICT,
            AccessError::NoFreePort => StatusCode::SERVICE_UNAVAILABLE,
            AccessError::ExternalTool(_) => StatusCode::BAD_GATEWAY,
            AccessError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        // ---
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("request failed: {:?}", self.0);
        } else {
            tracing::debug!("request rejected: {}", self.0);
        }
        (
            status,
            Json(ErrorResponse {
                error: self.0.to_string(),
            }),
        )
            .into_response()
    }
}
