//! HTTP server for DeepResearch
//!
//! A single route, `POST /deepresearch`, takes the question as the request
//! body and answers with the final answer as JSON.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use eyre::Result;
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use crate::research::{FinalAnswer, Orchestrator, ResearchError};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
}

impl AppState {
    pub fn new(orchestrator: Orchestrator) -> Self {
        Self {
            orchestrator: Arc::new(orchestrator),
        }
    }
}

/// JSON request form; `input` is accepted for older clients
#[derive(Debug, Deserialize)]
struct QuestionBody {
    #[serde(alias = "input")]
    question: String,
}

/// Error body returned for every failure
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub kind: String,
}

/// Failure of a `/deepresearch` request
#[derive(Debug)]
pub enum ApiError {
    InvalidRequest(String),
    Research(ResearchError),
}

impl From<ResearchError> for ApiError {
    fn from(err: ResearchError) -> Self {
        ApiError::Research(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error, kind) = match self {
            ApiError::InvalidRequest(message) => (StatusCode::BAD_REQUEST, message, "invalid-request"),
            ApiError::Research(e) => {
                let status = match &e {
                    ResearchError::EmptyQuestion => StatusCode::BAD_REQUEST,
                    ResearchError::TimedOut { .. } => StatusCode::GATEWAY_TIMEOUT,
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, e.to_string(), e.kind())
            }
        };
        let body = ErrorBody {
            error,
            kind: kind.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// Build the router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/deepresearch", post(deepresearch))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Pull the question out of a plain-text or JSON body
fn extract_question(body: &str) -> Result<String, ApiError> {
    let trimmed = body.trim();
    if trimmed.starts_with('{') {
        let parsed: QuestionBody = serde_json::from_str(trimmed)
            .map_err(|e| ApiError::InvalidRequest(format!("Invalid JSON body: {}", e)))?;
        return Ok(parsed.question);
    }
    Ok(trimmed.to_string())
}

async fn deepresearch(State(state): State<AppState>, body: String) -> Result<Json<FinalAnswer>, ApiError> {
    debug!(body_len = body.len(), "deepresearch: called");
    let question = extract_question(&body)?;
    info!("Research request: {}", question);

    match state.orchestrator.run(&question).await {
        Ok(answer) => Ok(Json(answer)),
        Err(ResearchError::EmptyQuestion) => {
            warn!("Rejected request with empty question");
            Err(ResearchError::EmptyQuestion.into())
        }
        Err(e) => {
            error!(kind = e.kind(), "Research run failed: {}", e);
            Err(e.into())
        }
    }
}

/// Run the HTTP server until Ctrl-C
pub async fn serve(bind: &str, state: AppState) -> Result<()> {
    debug!(%bind, "serve: called");
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;
    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
