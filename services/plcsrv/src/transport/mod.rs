//! Transport boundary
//!
//! The acquisition core only ever asks a [`Transport`] for "N units starting
//! at address A from table T". Framing, sockets and timeouts live behind
//! this trait: [`tcp::ModbusTcpTransport`] talks Modbus TCP to a real PLC,
//! [`mock::MockTransport`] serves a scripted in-memory device.

pub mod constants;
pub mod mock;
pub mod pdu;
pub mod tcp;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use mock::MockTransport;
pub use tcp::{ModbusTcpTransport, TcpConfig};

/// Bit-oriented Modbus tables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BitTable {
    /// FC01 Read Coils
    Coils,
    /// FC02 Read Discrete Inputs
    DiscreteInputs,
}

impl BitTable {
    pub fn function_code(&self) -> u8 {
        match self {
            Self::Coils => 0x01,
            Self::DiscreteInputs => 0x02,
        }
    }

    /// Parse a table name as written in configuration or on the command line
    pub fn from_label(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "coils" | "coil" | "fc01" | "01" | "1" => Some(Self::Coils),
            "discrete_inputs" | "discrete" | "inputs" | "fc02" | "02" | "2" => {
                Some(Self::DiscreteInputs)
            },
            _ => None,
        }
    }
}

impl std::fmt::Display for BitTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Coils => f.write_str("coils"),
            Self::DiscreteInputs => f.write_str("discrete_inputs"),
        }
    }
}

/// Word-oriented Modbus tables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WordTable {
    /// FC03 Read Holding Registers
    HoldingRegisters,
    /// FC04 Read Input Registers
    InputRegisters,
}

impl WordTable {
    pub fn function_code(&self) -> u8 {
        match self {
            Self::HoldingRegisters => 0x03,
            Self::InputRegisters => 0x04,
        }
    }
}

impl std::fmt::Display for WordTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::HoldingRegisters => f.write_str("holding_registers"),
            Self::InputRegisters => f.write_str("input_registers"),
        }
    }
}

/// Transport failure
///
/// `Connection` and `Timeout` mean the device could not be reached or the
/// session is in an unknown state. `Exception` is a well-formed refusal from
/// the device. `Malformed` is a reply that could not be parsed; the session
/// can no longer be trusted after it.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TransportError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("No response within {0:?}")]
    Timeout(Duration),

    #[error("Modbus exception {code:#04x} ({}) for function {function:#04x}", exception_name(*.code))]
    Exception { function: u8, code: u8 },

    #[error("Malformed response: {0}")]
    Malformed(String),
}

impl TransportError {
    pub fn not_connected() -> Self {
        Self::Connection("Not connected".to_string())
    }

    /// The device answered, so the fault is on the device side
    pub fn is_device_fault(&self) -> bool {
        matches!(self, Self::Exception { .. } | Self::Malformed(_))
    }

    /// Only a clean exception reply leaves the transaction stream in sync
    pub fn leaves_session_clean(&self) -> bool {
        matches!(self, Self::Exception { .. })
    }
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        Self::Connection(err.to_string())
    }
}

/// Human-readable Modbus exception code
pub fn exception_name(code: u8) -> &'static str {
    match code {
        0x01 => "illegal function",
        0x02 => "illegal data address",
        0x03 => "illegal data value",
        0x04 => "server device failure",
        0x05 => "acknowledge",
        0x06 => "server device busy",
        0x0A => "gateway path unavailable",
        0x0B => "gateway target failed to respond",
        _ => "unknown exception",
    }
}

/// Register-oriented device client
///
/// One instance is one session: implementations are not expected to
/// pipeline requests, and callers serialize access (see `PlcSession`).
#[async_trait]
pub trait Transport: Send {
    /// Establish the session; a no-op if already connected
    async fn connect(&mut self) -> Result<(), TransportError>;

    /// Drop the session; always succeeds
    async fn close(&mut self);

    fn is_connected(&self) -> bool;

    /// Short description of the peer for logs (e.g. `192.168.1.10:502/1`)
    fn endpoint(&self) -> String;

    /// Read `count` bits starting at `start`
    ///
    /// May return fewer bits than requested when the device does.
    async fn read_bits(
        &mut self,
        table: BitTable,
        start: u16,
        count: u16,
    ) -> Result<Vec<bool>, TransportError>;

    /// Read `count` 16-bit registers starting at `start`
    ///
    /// May return fewer registers than requested when the device does.
    async fn read_words(
        &mut self,
        table: WordTable,
        start: u16,
        count: u16,
    ) -> Result<Vec<u16>, TransportError>;
}
