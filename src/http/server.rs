//! HTTP API Server for hub-analytics
//!
//! A thin shell over the tenant-scoped query path: each request runs one
//! prepared statement for the organization and project in the URL and returns
//! the result rows as JSON.

use crate::{
    core::FieldValue,
    execution::{ConversionError, JsonRow, ResultConverter},
    querying::{CallOptions, QueryClient, QueryError},
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::{future::Future, sync::Arc, time::Duration};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

/// Request to run a parameterized query
#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub query: String,
    /// Positional parameters bound to `$1..$n`
    #[serde(default)]
    pub params: Vec<FieldValue>,
    /// Overrides the server's default deadline
    pub timeout_ms: Option<u64>,
}

/// Rows returned by a query
#[derive(Debug, Serialize)]
pub struct QueryResponse {
    pub rows: Vec<JsonRow>,
    pub row_count: usize,
}

/// Generic success response
#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub message: String,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Shared application state
pub struct AppState {
    pub queries: QueryClient,
    pub default_timeout: Duration,
}

/// Custom error type for API errors
pub enum ApiError {
    Query(QueryError),
    BadRequest(String),
    InternalError(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Query(e) => {
                let status = match &e {
                    QueryError::InvalidQuery(_)
                    | QueryError::UnboundParameters { .. }
                    | QueryError::ParameterMismatch { .. } => StatusCode::BAD_REQUEST,
                    QueryError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
                    QueryError::NotFound(_) => StatusCode::NOT_FOUND,
                    QueryError::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
                    QueryError::InvalidCredentials(_) => StatusCode::INTERNAL_SERVER_ERROR,
                    QueryError::Transport(_) | QueryError::Protocol(_) => StatusCode::BAD_GATEWAY,
                };
                (status, e.to_string())
            }
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::InternalError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(ErrorResponse { error: message });
        (status, body).into_response()
    }
}

impl From<QueryError> for ApiError {
    fn from(err: QueryError) -> Self {
        ApiError::Query(err)
    }
}

impl From<ConversionError> for ApiError {
    fn from(err: ConversionError) -> Self {
        ApiError::InternalError(err.to_string())
    }
}

/// Create the HTTP server with all routes
pub fn create_server(queries: QueryClient, default_timeout: Duration) -> Router {
    let state = Arc::new(AppState { queries, default_timeout });

    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    Router::new()
        .route("/api/organizations/:org/projects/:project/query", post(run_query))
        .route("/health", get(health_check))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> impl IntoResponse {
    Json(SuccessResponse { message: "hub-analytics is running".to_string() })
}

/// POST /api/organizations/:org/projects/:project/query - Run a query
async fn run_query(
    State(state): State<Arc<AppState>>,
    Path((org, project)): Path<(String, String)>,
    Json(payload): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, ApiError> {
    if payload.query.trim().is_empty() {
        return Err(ApiError::BadRequest("Query text is empty".to_string()));
    }

    let context = state.queries.project(&org, &project);
    let timeout = payload.timeout_ms.map(Duration::from_millis).unwrap_or(state.default_timeout);
    let options = CallOptions::with_timeout(timeout);

    let parameters = if payload.params.is_empty() {
        None
    } else {
        Some(ResultConverter::parameters_to_record_batch(&payload.params)?)
    };

    let info = context.run(&payload.query, parameters, options.clone()).await?;
    let batches = context.collect(&info, &options).await?;
    let rows = ResultConverter::batches_to_json_rows(&batches)?;

    tracing::debug!(organization_id = %org, project_id = %project, rows = rows.len(), "Query completed");
    Ok(Json(QueryResponse { row_count: rows.len(), rows }))
}

/// Serve `app` on `addr` until `shutdown` resolves.
pub async fn start_server<F>(addr: &str, app: Router, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("HTTP API listening on http://{}", addr);
    tracing::info!("  POST /api/organizations/:org/projects/:project/query - Run a query");
    tracing::info!("  GET  /health                                        - Health check");

    axum::serve(listener, app).with_graceful_shutdown(shutdown).await
}
