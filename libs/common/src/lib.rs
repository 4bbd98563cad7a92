//! Shared pieces of the PLC monitor binaries
//!
//! - [`logging`]: tracing subscriber setup (console, JSON, rolling files)
//! - [`shutdown`]: Ctrl+C / SIGTERM handling
//! - [`api_types`]: JSON response envelopes
//! - [`bootstrap_args`]: command-line arguments every binary accepts

pub mod api_types;
pub mod bootstrap_args;
pub mod logging;
pub mod shutdown;

pub use api_types::{ErrorResponse, SuccessResponse};

#[cfg(feature = "axum")]
pub use api_types::AppError;

pub use errors::ErrorInfo;
