//! Bilisum HTTP API
//!
//! Axum-based HTTP server exposing the analysis pipeline.
//!
//! Architecture: each endpoint has a thin axum handler that delegates to a pure
//! inner function returning `(StatusCode, serde_json::Value)`. The inner
//! functions are directly testable without axum dispatch machinery.
//!
//! Endpoints:
//! - POST /api/analyze: fetch, summarize and store one video
//! - GET  /api/analyze: stored analyses, newest first
//! - GET  /health: store health check

use std::sync::Arc;

use anyhow::Result;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use bilisum_core::config::{HttpConfig, ScopeConfig};
use bilisum_core::{BilisumError, FetchError};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use url::Url;

use crate::pipeline::AnalysisPipeline;
use crate::session::{self, ReadScope};

/// Shared state for all HTTP handlers
pub struct HttpState {
    pub pipeline: AnalysisPipeline,
    pub scope: ScopeConfig,
}

/// Build the Axum router with all endpoints
pub fn build_router(state: Arc<HttpState>) -> Router {
    Router::new()
        .route("/api/analyze", get(list_handler).post(analyze_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

/// Start the HTTP server on the configured address.
/// Gracefully shuts down when the broadcast shutdown signal fires.
pub async fn start_http_server(
    state: Arc<HttpState>,
    config: &HttpConfig,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let addr = format!("{}:{}", config.host, config.port);

    let app = build_router(state);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Bilisum HTTP API listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
            tracing::info!("HTTP server shutting down...");
        })
        .await?;

    Ok(())
}

// ============================================================================
// Request / Response DTOs
// ============================================================================

/// Input contract for `POST /api/analyze`. Deliberately separate from the
/// stored `Analysis` shape.
#[derive(Debug, Deserialize, Default)]
pub struct AnalyzeRequest {
    pub url: Option<String>,
}

/// Standard HTTP error body
#[derive(Debug, Serialize, PartialEq)]
pub struct ErrorResponse {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl ErrorResponse {
    pub fn new(msg: impl Into<String>) -> Self {
        Self {
            message: msg.into(),
            field: None,
        }
    }

    pub fn for_field(msg: impl Into<String>, field: &str) -> Self {
        Self {
            message: msg.into(),
            field: Some(field.to_string()),
        }
    }

    fn into_value(self) -> serde_json::Value {
        serde_json::json!(self)
    }
}

/// Check the submitted `url` is present and an absolute URL with a host.
pub fn validate_analyze_request(req: &AnalyzeRequest) -> std::result::Result<String, ErrorResponse> {
    let raw = match req.url.as_deref().map(str::trim) {
        Some(u) if !u.is_empty() => u,
        _ => return Err(ErrorResponse::for_field("URL is required", "url")),
    };

    match Url::parse(raw) {
        Ok(parsed) if parsed.has_host() => Ok(raw.to_string()),
        _ => Err(ErrorResponse::for_field(FetchError::InvalidUrl.to_string(), "url")),
    }
}

// ============================================================================
// Inner (directly testable) business logic functions
// ============================================================================

/// Inner analyze: validates input and runs the pipeline.
pub async fn analyze_inner(
    pipeline: &AnalysisPipeline,
    session_id: Option<String>,
    req: AnalyzeRequest,
) -> (StatusCode, serde_json::Value) {
    let url = match validate_analyze_request(&req) {
        Ok(url) => url,
        Err(e) => return (StatusCode::BAD_REQUEST, e.into_value()),
    };

    match pipeline.analyze(&url, session_id).await {
        Ok(analysis) => (StatusCode::OK, serde_json::json!(analysis)),
        Err(BilisumError::Fetch(e @ FetchError::InvalidUrl)) => (
            StatusCode::BAD_REQUEST,
            ErrorResponse::for_field(e.to_string(), "url").into_value(),
        ),
        Err(e) => {
            tracing::error!(url = %url, error = %e, "Analysis failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorResponse::new(e.to_string()).into_value(),
            )
        }
    }
}

/// Inner list: returns the history visible to the given scope.
pub async fn list_inner(
    pipeline: &AnalysisPipeline,
    scope: &ReadScope,
) -> (StatusCode, serde_json::Value) {
    if *scope == ReadScope::Anonymous {
        return (StatusCode::OK, serde_json::json!([]));
    }

    match pipeline.history(scope.key()).await {
        Ok(analyses) => (StatusCode::OK, serde_json::json!(analyses)),
        Err(e) => {
            tracing::error!(error = %e, "Listing analyses failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorResponse::new(e.to_string()).into_value(),
            )
        }
    }
}

/// Inner health check: probes the store and returns (status_code, json_body).
pub async fn health_inner(pipeline: &AnalysisPipeline) -> (StatusCode, serde_json::Value) {
    match pipeline.store().health().await {
        Ok(backend) => (
            StatusCode::OK,
            serde_json::json!({
                "status": "healthy",
                "version": env!("CARGO_PKG_VERSION"),
                "store": backend,
            }),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            serde_json::json!({
                "status": "unhealthy",
                "error": e.to_string(),
            }),
        ),
    }
}

// ============================================================================
// Axum handler wrappers (thin: delegate to inner functions)
// ============================================================================

pub async fn analyze_handler(
    State(state): State<Arc<HttpState>>,
    headers: HeaderMap,
    payload: std::result::Result<Json<AnalyzeRequest>, JsonRejection>,
) -> Response {
    let req = match payload {
        Ok(Json(req)) => req,
        Err(rejection) => {
            let body = ErrorResponse::new(format!("Invalid request body: {}", rejection.body_text()));
            return (StatusCode::BAD_REQUEST, Json(body.into_value())).into_response();
        }
    };

    let scope = session::write_scope(&state.scope, &headers);
    let (status, body) = analyze_inner(&state.pipeline, scope.session_id.clone(), req).await;

    let response_headers = if status == StatusCode::OK {
        session::minted_key_headers(&state.scope, &scope)
    } else {
        HeaderMap::new()
    };

    (status, response_headers, Json(body)).into_response()
}

pub async fn list_handler(
    State(state): State<Arc<HttpState>>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let scope = session::read_scope(&state.scope, &headers);
    let (status, body) = list_inner(&state.pipeline, &scope).await;
    (status, Json(body))
}

pub async fn health_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    let (status, body) = health_inner(&state.pipeline).await;
    (status, Json(body))
}

// ============================================================================
// Unit Tests: pure validation helpers
// ============================================================================
