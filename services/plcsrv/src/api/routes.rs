//! Router assembly

use std::sync::Arc;

use axum::{routing::get, Router};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use super::handlers;
use crate::core::TagRegistry;
use crate::session::PlcSession;

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub session: Arc<PlcSession>,
    pub registry: Arc<TagRegistry>,
}

impl AppState {
    pub fn new(session: Arc<PlcSession>, registry: Arc<TagRegistry>) -> Self {
        Self { session, registry }
    }
}

/// Build the service router
pub fn create_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/tags", get(handlers::get_tags))
        .route("/api/io", get(handlers::get_io))
        .route("/api/registry", get(handlers::get_registry))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
