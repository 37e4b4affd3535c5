//! Axum HTTP API for background effect processing.
//!
//! This crate provides:
//! - Job submission, polling, cancellation and eviction
//! - Streaming and download of processed videos, with Range support
//! - A video proxy and single-frame mask previews
//! - Rate limiting, security headers and Prometheus metrics

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod state;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
