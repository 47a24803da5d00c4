//! HTTP API handlers for atr-submit

pub mod buildinfo;
pub mod health;
pub mod submit;

pub use buildinfo::get_build_info;
pub use health::health_routes;
pub use submit::{submit_raw_json, submit_routes, submit_target};

use axum::http::{header, Method};
use tower_http::cors::{Any, CorsLayer};

/// Browsers post from the capture page's origin; any origin is accepted
pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE])
}
