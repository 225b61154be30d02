use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

/// Failures the gateway reports to its callers.
///
/// Every variant is answered with a JSON body `{"error": ..., "code": ...}`
/// before any streaming starts.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("{0}")]
    Unauthenticated(String),

    #[error("{0}")]
    InvalidArgument(String),

    /// The gateway is not deployed correctly (no provider secret).
    #[error("{0}")]
    FailedPrecondition(String),

    #[error("{0}")]
    Internal(String),

    /// Upstream rejected a streaming request before any frame was sent.
    #[error("upstream provider: {body}")]
    Upstream { status: u16, body: String },
}

impl GatewayError {
    pub fn code(&self) -> &'static str {
        match self {
            GatewayError::Unauthenticated(_) => "unauthenticated",
            GatewayError::InvalidArgument(_) => "invalid-argument",
            GatewayError::FailedPrecondition(_) => "failed-precondition",
            GatewayError::Internal(_) | GatewayError::Upstream { .. } => "internal",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            GatewayError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            GatewayError::FailedPrecondition(_) => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            GatewayError::Upstream { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(json!({
            "error": self.to_string(),
            "code": self.code(),
        }));
        (status, body).into_response()
    }
}
