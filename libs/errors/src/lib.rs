//! Shared error classification for the PLC monitor crates
//!
//! Crates keep their own error enums and map each variant onto an
//! [`ErrorCategory`] through [`ServiceErrorTrait`]. The category alone decides
//! the HTTP status and whether a client should try again.

use serde::{Deserialize, Serialize};

/// Error body carried inside the API error envelope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// HTTP status the error was answered with
    pub code: u16,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorInfo {
    /// New error body; the code defaults to 500
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: 500,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_code(mut self, code: u16) -> Self {
        self.code = code;
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

/// Who is at fault, as far as a client is concerned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Bad configuration or tag map; fatal at startup
    Configuration,
    /// The device could not be reached or the session was lost
    Connection,
    /// A transaction did not complete within its deadline
    Timeout,
    /// The device answered, but rejected or garbled the request
    Device,
    Internal,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Configuration => "configuration",
            Self::Connection => "connection",
            Self::Timeout => "timeout",
            Self::Device => "device",
            Self::Internal => "internal",
        }
    }

    /// Connection and timeout failures make the device unavailable (503); a
    /// device that answered badly is a bad upstream (502).
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Device => 502,
            Self::Connection | Self::Timeout => 503,
            Self::Configuration | Self::Internal => 500,
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outward-facing view of a crate's error type
pub trait ServiceErrorTrait: std::error::Error + Send + Sync + 'static {
    /// Stable identifier for logs and clients, e.g. `PLCSRV_DEVICE_TIMEOUT`
    fn error_code(&self) -> &'static str;

    fn category(&self) -> ErrorCategory;

    /// Whether repeating the same request may succeed
    fn is_retryable(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Connection | ErrorCategory::Timeout | ErrorCategory::Device
        )
    }

    fn status_code(&self) -> u16 {
        self.category().status_code()
    }

    fn to_error_info(&self) -> ErrorInfo {
        ErrorInfo::new(self.to_string())
            .with_code(self.status_code())
            .with_details(format!(
                "error_code: {}, category: {}, retryable: {}",
                self.error_code(),
                self.category(),
                self.is_retryable()
            ))
    }

    #[cfg(feature = "axum-support")]
    fn http_status(&self) -> axum::http::StatusCode {
        axum::http::StatusCode::from_u16(self.status_code())
            .unwrap_or(axum::http::StatusCode::INTERNAL_SERVER_ERROR)
    }
}
