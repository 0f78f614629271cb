//! HTTP API module for hub-analytics
//!
//! Provides REST endpoints for:
//! - Tenant-scoped queries
//! - Health checks

pub mod server;

pub use server::{
    create_server, start_server, ApiError, AppState, ErrorResponse, QueryRequest, QueryResponse,
    SuccessResponse,
};
