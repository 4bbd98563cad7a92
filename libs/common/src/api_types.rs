//! JSON envelopes for the HTTP API
//!
//! Success bodies look like `{"success": true, "data": ..., "metadata": {...}}`,
//! failures like `{"success": false, "error": {"code", "message", "details"}}`.

use std::collections::HashMap;

use errors::ErrorInfo;
use serde::{Deserialize, Serialize};

/// Successful response with optional metadata (timestamps, counts)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuccessResponse<T> {
    pub success: bool,
    pub data: T,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl<T> SuccessResponse<T> {
    pub fn new(data: T) -> Self {
        Self {
            success: true,
            data,
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: ErrorInfo,
}

#[cfg(feature = "axum")]
mod axum_support {
    use axum::http::StatusCode;
    use axum::response::{IntoResponse, Json, Response};
    use errors::{ErrorInfo, ServiceErrorTrait};

    use super::ErrorResponse;

    /// Handler error; renders as an [`ErrorResponse`] with `status`
    #[derive(Debug, Clone)]
    pub struct AppError {
        pub status: StatusCode,
        pub error: ErrorInfo,
    }

    impl AppError {
        /// Status and body as classified by the service error type
        pub fn from_service_error<E: ServiceErrorTrait>(err: &E) -> Self {
            Self {
                status: err.http_status(),
                error: err.to_error_info(),
            }
        }
    }

    impl IntoResponse for AppError {
        fn into_response(self) -> Response {
            let body = ErrorResponse {
                success: false,
                error: self.error,
            };
            (self.status, Json(body)).into_response()
        }
    }
}

#[cfg(feature = "axum")]
pub use axum_support::AppError;
