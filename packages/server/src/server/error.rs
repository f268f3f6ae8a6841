use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::common::{ErrorKind, MatchmakingError};

/// Error returned by HTTP handlers. Body: `{"error": ..., "kind": ...}`.
#[derive(Debug)]
pub struct ApiError(pub MatchmakingError);

impl From<MatchmakingError> for ApiError {
    fn from(err: MatchmakingError) -> Self {
        Self(err)
    }
}

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::InvalidState | ErrorKind::InvalidTransition => StatusCode::CONFLICT,
        ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
        ErrorKind::Transient => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::Internal | ErrorKind::MissingDependency => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = self.0.kind();
        let status = status_for(kind);
        if status.is_server_error() && kind != ErrorKind::Transient {
            tracing::error!(error = %self.0, "request failed");
        }

        (
            status,
            Json(json!({ "error": self.0.to_string(), "kind": kind })),
        )
            .into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
