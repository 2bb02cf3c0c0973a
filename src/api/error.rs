//! Pipeline errors → HTTP responses.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::error::PipelineError;

/// Wrapper that renders a [`PipelineError`] as a JSON error response.
#[derive(Debug)]
pub struct ApiError(pub PipelineError);

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        Self(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            PipelineError::Decode(_) => StatusCode::BAD_REQUEST,
            PipelineError::Validation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            PipelineError::Model(_)
            | PipelineError::ModelTimeout(_)
            | PipelineError::EmptyModelResponse => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self.0 {
            PipelineError::Validation { missing, received } => json!({
                "error": self.0.to_string(),
                "missing": missing,
                "received": received,
            }),
            other => json!({ "error": other.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}
