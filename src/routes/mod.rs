//! HTTP surface
//!
//! - `/` - four-panel page driving the stages
//! - `/api/session` - session state and outcomes so far
//! - `/api/intake`, `/api/data`, `/api/analysis`, `/api/report` - run one stage
//! - `/api/report/download`, `/api/artifacts/{name}` - produced files
//! - `/api/health` - health check

pub mod health;
pub mod stages;
pub mod ui;

use axum::extract::DefaultBodyLimit;
use axum::http::HeaderMap;
use axum::Router;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::models::AppState;

/// Header carrying a per-request Google API key
pub const API_KEY_HEADER: &str = "x-api-key";

const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

pub fn create_router(state: AppState) -> Router {
    info!("Creating application router");

    Router::new()
        .merge(stages::router(state.clone()))
        .merge(health::router(state))
        .merge(ui::router())
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(TraceLayer::new_for_http())
}

pub(crate) fn api_key(headers: &HeaderMap) -> Option<String> {
    headers
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
