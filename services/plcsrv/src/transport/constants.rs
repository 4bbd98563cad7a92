//! Modbus TCP framing constants
//!
//! Limits follow the Modbus application protocol: a PDU is at most 253 bytes,
//! which caps a single read at 125 registers or 2000 bits.

// ============================================================================
// Frame sizes
// ============================================================================

/// MBAP header on the wire: transaction id (2) + protocol id (2) + length (2) + unit id (1)
pub const MBAP_HEADER_LEN: usize = 7;

/// Protocol identifier for Modbus in the MBAP header
pub const MODBUS_PROTOCOL_ID: u16 = 0;

/// Maximum PDU size (function code + data)
pub const MAX_PDU_SIZE: usize = 253;

/// Maximum MBAP length field value (unit id + PDU)
pub const MAX_MBAP_LENGTH: usize = 1 + MAX_PDU_SIZE;

/// Bit set on the function code of an exception reply
pub const EXCEPTION_FLAG: u8 = 0x80;

// ============================================================================
// Read limits
// ============================================================================

/// Maximum registers per FC03/FC04 request: (253 - 2) / 2
pub const MODBUS_MAX_READ_REGISTERS: u16 = 125;

/// Maximum bits per FC01/FC02 request
pub const MODBUS_MAX_READ_COILS: u16 = 2000;

// ============================================================================
// Connection defaults
// ============================================================================

pub const DEFAULT_MODBUS_PORT: u16 = 502;

pub const DEFAULT_UNIT_ID: u8 = 1;

/// Applied to connect and to every request/response exchange
pub const DEFAULT_TIMEOUT_MS: u64 = 3000;
