//! atr-submit library interface
//!
//! Exposes the router, services and CLI for the binary and for integration tests.

pub mod api;
pub mod cli;
pub mod error;
pub mod services;

pub use crate::error::{ApiError, ApiResult};

use atr_common::config::RelayConfig;
use axum::Router;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use services::SubmissionService;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Submission pipeline
    pub service: Arc<SubmissionService>,
    /// Resolved configuration (body limits, topic)
    pub config: Arc<RelayConfig>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(service: Arc<SubmissionService>) -> Self {
        let config = Arc::new(service.config().clone());
        Self {
            service,
            config,
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::submit_routes(&state.config))
        .merge(api::health_routes())
        .layer(api::cors_layer())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
