//! PLC monitor service
//!
//! Reads named tags from a Modbus TCP PLC and serves them over HTTP. The
//! crate is layered bottom-up:
//!
//! - [`transport`]: register-oriented device client (Modbus TCP, mock)
//! - [`core`]: tag registry, span planning, decoding, read cycles, discovery
//! - [`session`]: serialized, lazily connected access to one device
//! - [`config`] / [`csv_loader`]: figment configuration and CSV tag tables
//! - [`api`]: axum routes

pub mod api;
pub mod config;
pub mod core;
pub mod csv_loader;
pub mod error;
pub mod session;
pub mod transport;

pub use config::AppConfig;
pub use error::{PlcSrvError, Result};
pub use session::PlcSession;
