//! Error-to-HTTP response conversion.
//!
//! Route handlers return `Result<T, ApiError>`; the JSON body is always
//! `{"error": <message>, "code": <code>}`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chorus_core::provider::{CapabilityError, DispatchError, ProviderError};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    /// Unknown provider id, or the provider lacks the operation.
    #[error(transparent)]
    Capability(#[from] CapabilityError),
    /// The provider failed while executing an operation.
    #[error("{message}")]
    Upstream { message: String },
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Capability(_) | ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Upstream { .. } | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Capability(_) => "capability_error",
            ApiError::Upstream { .. } => "upstream_error",
            ApiError::NotFound(_) => "not_found",
            ApiError::BadRequest(_) => "bad_request",
            ApiError::Internal(_) => "internal_error",
        }
    }
}

impl From<ProviderError> for ApiError {
    fn from(err: ProviderError) -> Self {
        ApiError::Upstream {
            message: err.to_string(),
        }
    }
}

impl From<DispatchError> for ApiError {
    fn from(err: DispatchError) -> Self {
        match err {
            DispatchError::Capability(err) => err.into(),
            DispatchError::Upstream(err) => err.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(status = %status, error = %self, "Server error in API handler");
        }

        let body = json!({
            "error": self.to_string(),
            "code": self.code(),
        });
        (status, axum::Json(body)).into_response()
    }
}
