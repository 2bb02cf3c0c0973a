//! HTTP surface: liveness, health, classification and reply drafting.
//!
//! The POST handlers take the raw body as [`Bytes`] rather than a `Json`
//! extractor so malformed payloads still reach the field extractor.

mod error;

pub use error::ApiError;

use std::any::Any;
use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{DefaultBodyLimit, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use tower::ServiceBuilder;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any as AnyOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::config::ServiceConfig;
use crate::error::LlmError;
use crate::llm::{LlmEmailModel, create_provider};
use crate::pipeline::processor::EmailProcessor;
use crate::pipeline::types::{CategoryOutput, LivenessOutput, ResponseOutput};

const SERVICE_NAME: &str = "email-assist";

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub processor: Arc<EmailProcessor>,
}

/// Build the router around an already-configured processor.
pub fn routes(processor: Arc<EmailProcessor>, max_body_bytes: usize) -> Router {
    let state = AppState { processor };

    let cors = CorsLayer::new()
        .allow_origin(AnyOrigin)
        .allow_methods(AnyOrigin)
        .allow_headers(AnyOrigin);

    Router::new()
        .route("/", get(liveness))
        .route("/health", get(health))
        .route("/classify_email/", post(classify_email))
        .route("/generate_response/", post(generate_response))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CatchPanicLayer::custom(handle_panic))
                .layer(cors),
        )
        .layer(DefaultBodyLimit::max(max_body_bytes))
}

/// Wire the production provider, model and processor from configuration.
pub fn app_from_config(config: &ServiceConfig) -> Result<Router, LlmError> {
    let provider = create_provider(&config.llm)?;
    let model = Arc::new(LlmEmailModel::new(provider));
    let processor = EmailProcessor::new(model).with_model_timeout(config.model_timeout);
    Ok(routes(Arc::new(processor), config.max_body_bytes))
}

// ── Liveness / Health ───────────────────────────────────────────────────

async fn liveness() -> Json<LivenessOutput> {
    Json(LivenessOutput {
        message: "Email classification and response service is running.".to_string(),
    })
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": SERVICE_NAME
    }))
}

// ── Pipeline ────────────────────────────────────────────────────────────

async fn classify_email(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<CategoryOutput>, ApiError> {
    Ok(Json(state.processor.classify(&body).await?))
}

async fn generate_response(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<ResponseOutput>, ApiError> {
    Ok(Json(state.processor.generate_response(&body).await?))
}

fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic".to_string()
    };
    error!(panic = %detail, "Handler panicked");

    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({ "error": "Internal server error" })),
    )
        .into_response()
}
