//! Plant identification web front end.
//!
//! Takes a plant photo from the browser form or the base64 API, validates it
//! and asks an identification engine for the most likely species, genera and
//! families.

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::{services::ServeDir, trace::TraceLayer};

pub mod config;
pub mod decoded;
pub mod engine;
pub mod envelope;
pub mod error;
pub mod handlers;
pub mod identify;
pub mod ingest;
pub mod render;
pub mod retention;
pub mod state;
pub mod telemetry;
pub mod validate;

pub use config::Config;
pub use state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    let static_dir = state.config.static_dir.clone();
    let body_limit = state.config.body_limit_bytes;

    Router::new()
        .route("/", get(handlers::upload_form).post(handlers::upload))
        .route("/api/plant", post(handlers::identify_api))
        .route("/health", get(handlers::health_check))
        .nest_service("/static", ServeDir::new(static_dir))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
