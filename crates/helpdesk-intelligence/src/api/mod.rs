//! HTTP handlers

pub mod ticket_api;

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use tracing::warn;

use crate::error::PipelineError;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: &'static str,
    pub retryable: bool,
}

/// Handler error: logs the full cause, returns only the public message.
#[derive(Debug)]
pub struct ApiError(pub PipelineError);

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        ApiError(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            PipelineError::NotFound { .. } => StatusCode::NOT_FOUND,
            PipelineError::InvalidInput(_) => StatusCode::UNPROCESSABLE_ENTITY,
            PipelineError::Upstream { .. } | PipelineError::Contract { .. } => StatusCode::BAD_GATEWAY,
            PipelineError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            PipelineError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();
        warn!("Request failed with {}: {:#}", status, self.0);
        let body = ErrorResponse {
            error: self.0.public_message(),
            kind: self.0.kind(),
            retryable: self.0.is_retryable(),
        };
        (status, Json(body)).into_response()
    }
}
