use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Enrollments service error variants.
///
/// Per-record data problems never show up here; they are skipped and logged
/// inside the unification pass. A successful result may therefore be partial
/// by design, while any of these variants means the view could not be served.
#[derive(Debug, thiserror::Error)]
pub enum EnrollmentsError {
    #[error("unified enrollments refresh failed")]
    RefreshFailed(#[source] Arc<EnrollmentsError>),
    #[error("timed out waiting for unified enrollments refresh")]
    RefreshTimedOut,
    #[error("unified enrollments cache is shut down")]
    ShutDown,
    #[error("internal error")]
    Internal(#[from] anyhow::Error),
}

impl EnrollmentsError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::RefreshFailed(_) => "REFRESH_FAILED",
            Self::RefreshTimedOut => "REFRESH_TIMED_OUT",
            Self::ShutDown => "SHUT_DOWN",
            Self::Internal(_) => "INTERNAL",
        }
    }

    /// The error that made the refresh fail, looking through `RefreshFailed`.
    pub fn root(&self) -> &EnrollmentsError {
        match self {
            Self::RefreshFailed(inner) => inner.root(),
            other => other,
        }
    }
}

impl IntoResponse for EnrollmentsError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::RefreshFailed(_) | Self::RefreshTimedOut | Self::ShutDown => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        match &self {
            Self::Internal(e) => tracing::error!(error = %e, kind = "INTERNAL", "internal error"),
            Self::RefreshFailed(e) => {
                tracing::error!(error = %e.root(), kind = "REFRESH_FAILED", "refresh failed")
            }
            _ => {}
        }
        let body = serde_json::json!({
            "kind": self.kind(),
            "message": self.to_string(),
        });
        (status, axum::Json(body)).into_response()
    }
}
