//! HTTP surface: health, tag values and the configured tag map

pub mod handlers;
pub mod routes;

pub use routes::{create_routes, AppState};
