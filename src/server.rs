//! HTTP server for graph queries
//!
//! Exposes the query service over HTTP.
//!
//! # Routes
//!
//! - `GET /query_node?label=..&node_id=..` - Single-node (or label) lookup
//! - `GET /health` - Liveness probe
//! - `GET /metrics` - Prometheus text exposition
//!
//! Client mistakes (bad label, blank id) answer `400 {"error": ..}`. Backend
//! failures answer `500` with a fixed summary; details only reach the logs.

use crate::graph::{Label, NodeId};
use crate::metrics;
use crate::service::{QueryResponse, QueryService};
use crate::KgraphError;
use axum::{
    body::Body,
    extract::{Query, State},
    http::{header, Request, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;

/// Error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Query string of `GET /query_node`
#[derive(Debug, Deserialize)]
pub struct QueryNodeParams {
    pub label: String,
    #[serde(default)]
    pub node_id: Option<String>,
}

/// A service error on its way out of the process
struct ApiError(KgraphError);

impl From<KgraphError> for ApiError {
    fn from(e: KgraphError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = if self.0.is_server_error() {
            tracing::error!(error = %self.0, kind = self.0.kind(), "Request failed");
            StatusCode::INTERNAL_SERVER_ERROR
        } else {
            tracing::debug!(error = %self.0, "Rejected request");
            StatusCode::BAD_REQUEST
        };

        (
            status,
            Json(ErrorResponse {
                error: self.0.safe_summary(),
            }),
        )
            .into_response()
    }
}

/// HTTP front end for a [`QueryService`]
pub struct QueryServer {
    service: Arc<QueryService>,
}

impl QueryServer {
    pub fn new(service: Arc<QueryService>) -> Self {
        Self { service }
    }

    /// Build the router with request logging middleware
    pub fn router(&self) -> Router {
        Router::new()
            .route("/health", get(health))
            .route("/query_node", get(query_node))
            .route("/metrics", get(metrics_text))
            .layer(middleware::from_fn(log_requests))
            .with_state(Arc::clone(&self.service))
    }

    /// Serve on `addr` until `shutdown` resolves, then drain in-flight requests
    pub async fn run<F>(self, addr: &str, shutdown: F) -> crate::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(addr).await?;
        tracing::info!(addr = addr, "Query server listening");

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await?;

        tracing::info!("Query server stopped");
        Ok(())
    }
}

/// Request logging middleware
async fn log_requests(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let started = Instant::now();

    let response = next.run(request).await;

    tracing::info!(
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        elapsed_ms = started.elapsed().as_secs_f64() * 1000.0,
        "Handled request"
    );
    response
}

// ============================================================================
// Handlers
// ============================================================================

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn query_node(
    State(service): State<Arc<QueryService>>,
    Query(params): Query<QueryNodeParams>,
) -> Result<Json<QueryResponse>, ApiError> {
    let label = Label::new(params.label)?;
    let id = match params.node_id {
        Some(id) if !id.is_empty() => Some(NodeId::new(id)?),
        _ => None,
    };

    let response = service.query_node(&label, id.as_ref()).await?;
    Ok(Json(response))
}

async fn metrics_text() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics::encode_metrics(),
    )
}
