//! Error handling for the PLC monitor service
//!
//! One enum for the whole crate. Acquisition failures are split by who is
//! at fault: an unreachable device is `Connectivity` (HTTP 503), a device
//! that answered with an exception or garbage is `DeviceRead` (HTTP 502).

use errors::{ErrorCategory, ServiceErrorTrait};
use thiserror::Error;

use crate::core::{AddressSpace, ReadSpan};
use crate::transport::TransportError;

/// PLC service error type
#[derive(Error, Debug, Clone)]
pub enum PlcSrvError {
    /// Invalid configuration or tag map
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Device unreachable, connect failed or a transaction timed out
    #[error("Device unavailable: {0}")]
    Connectivity(TransportError),

    /// The device answered a span read with an exception or a malformed reply
    #[error("Read of {span} failed: {cause}")]
    DeviceRead {
        space: AddressSpace,
        span: ReadSpan,
        cause: TransportError,
    },

    #[error("IO error: {0}")]
    Io(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for the PLC service
pub type Result<T> = std::result::Result<T, PlcSrvError>;

impl PlcSrvError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Classify a transport failure seen while reading `span`
    pub fn from_span_read(span: ReadSpan, cause: TransportError) -> Self {
        if cause.is_device_fault() {
            Self::DeviceRead {
                space: span.space,
                span,
                cause,
            }
        } else {
            Self::Connectivity(cause)
        }
    }

    /// Whether the transport session can be reused after this error
    pub fn session_is_reusable(&self) -> bool {
        match self {
            Self::Connectivity(_) => false,
            Self::DeviceRead { cause, .. } => cause.leaves_session_clean(),
            _ => true,
        }
    }
}

impl From<TransportError> for PlcSrvError {
    fn from(err: TransportError) -> Self {
        Self::Connectivity(err)
    }
}

impl From<std::io::Error> for PlcSrvError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<figment::Error> for PlcSrvError {
    fn from(err: figment::Error) -> Self {
        Self::Configuration(err.to_string())
    }
}

impl From<csv::Error> for PlcSrvError {
    fn from(err: csv::Error) -> Self {
        Self::Configuration(format!("Tag table: {err}"))
    }
}

impl ServiceErrorTrait for PlcSrvError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "PLCSRV_CONFIG_ERROR",
            Self::Connectivity(TransportError::Timeout(_)) => "PLCSRV_DEVICE_TIMEOUT",
            Self::Connectivity(_) => "PLCSRV_DEVICE_UNREACHABLE",
            Self::DeviceRead { .. } => "PLCSRV_DEVICE_READ_ERROR",
            Self::Io(_) => "PLCSRV_IO_ERROR",
            Self::Internal(_) => "PLCSRV_INTERNAL_ERROR",
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Configuration(_) => ErrorCategory::Configuration,
            Self::Connectivity(TransportError::Timeout(_)) => ErrorCategory::Timeout,
            Self::Connectivity(_) => ErrorCategory::Connection,
            Self::DeviceRead { .. } => ErrorCategory::Device,
            Self::Io(_) | Self::Internal(_) => ErrorCategory::Internal,
        }
    }
}

impl From<PlcSrvError> for common::AppError {
    fn from(err: PlcSrvError) -> Self {
        common::AppError::from_service_error(&err)
    }
}
