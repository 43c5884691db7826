//! HTTP host for the hopper upload assembler.
//!
//! This crate provides:
//! - Session open, chunk upload, finalize, status and abort endpoints
//! - Bearer token pre-authorization for upload routes
//! - Prometheus metrics and an audit sink that feeds them

pub mod audit;
pub mod auth;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod routes;
pub mod state;

pub use auth::TraceId;
pub use error::ApiError;
pub use routes::create_router;
pub use state::AppState;
