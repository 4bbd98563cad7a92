//! Modbus PDU building and read-response parsing
//!
//! A PDU lives in a fixed stack buffer; only the parsed payload is moved to
//! the heap.

use tracing::debug;

use super::constants::{EXCEPTION_FLAG, MAX_PDU_SIZE};
use super::TransportError;

/// PDU with stack-allocated fixed array
#[derive(Debug, Clone)]
pub struct ModbusPdu {
    data: [u8; MAX_PDU_SIZE],
    len: usize,
}

impl ModbusPdu {
    #[inline]
    pub fn new() -> Self {
        Self {
            data: [0; MAX_PDU_SIZE],
            len: 0,
        }
    }

    /// Create a PDU from received bytes
    pub fn from_slice(data: &[u8]) -> Result<Self, TransportError> {
        if data.len() > MAX_PDU_SIZE {
            return Err(TransportError::Malformed(format!(
                "PDU too large: {} bytes (max {})",
                data.len(),
                MAX_PDU_SIZE
            )));
        }

        let mut pdu = Self::new();
        pdu.data[..data.len()].copy_from_slice(data);
        pdu.len = data.len();

        if let Some(fc) = pdu.function_code() {
            if pdu.is_exception() {
                debug!(
                    "PDU parsed: FC={:02X} (exception: {}), code={:02X}",
                    fc,
                    function_code_description(fc),
                    pdu.exception_code().unwrap_or(0)
                );
            } else {
                debug!(
                    "PDU parsed: FC={:02X} ({}), data_len={}",
                    fc,
                    function_code_description(fc),
                    pdu.len - 1
                );
            }
        }

        Ok(pdu)
    }

    #[inline]
    pub fn push(&mut self, byte: u8) -> Result<(), TransportError> {
        if self.len >= MAX_PDU_SIZE {
            return Err(TransportError::Malformed("PDU buffer full".to_string()));
        }
        self.data[self.len] = byte;
        self.len += 1;
        Ok(())
    }

    /// Push u16 in big-endian
    #[inline]
    pub fn push_u16(&mut self, value: u16) -> Result<(), TransportError> {
        for b in value.to_be_bytes() {
            self.push(b)?;
        }
        Ok(())
    }

    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.data[..self.len]
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn function_code(&self) -> Option<u8> {
        (self.len > 0).then(|| self.data[0])
    }

    #[inline]
    pub fn is_exception(&self) -> bool {
        self.function_code()
            .is_some_and(|fc| fc & EXCEPTION_FLAG != 0)
    }

    #[inline]
    pub fn exception_code(&self) -> Option<u8> {
        (self.is_exception() && self.len > 1).then(|| self.data[1])
    }
}

impl Default for ModbusPdu {
    fn default() -> Self {
        Self::new()
    }
}

fn function_code_description(fc: u8) -> &'static str {
    match fc & !EXCEPTION_FLAG {
        0x01 => "Read Coils",
        0x02 => "Read Discrete Inputs",
        0x03 => "Read Holding Registers",
        0x04 => "Read Input Registers",
        _ => "Unknown Function",
    }
}

/// Build a read request: `fc | start | quantity`
pub fn build_read_request(fc: u8, start: u16, quantity: u16) -> Result<ModbusPdu, TransportError> {
    let mut pdu = ModbusPdu::new();
    pdu.push(fc)?;
    pdu.push_u16(start)?;
    pdu.push_u16(quantity)?;
    debug!(
        "PDU built: FC={:02X} ({}), start={}, qty={}",
        fc,
        function_code_description(fc),
        start,
        quantity
    );
    Ok(pdu)
}

/// Validate function code and byte count, returning the payload
///
/// Exception replies become [`TransportError::Exception`].
fn read_payload(pdu: &ModbusPdu, expected_fc: u8) -> Result<&[u8], TransportError> {
    let bytes = pdu.as_slice();
    let fc = pdu
        .function_code()
        .ok_or_else(|| TransportError::Malformed("empty PDU".to_string()))?;

    if fc == expected_fc | EXCEPTION_FLAG {
        let code = pdu
            .exception_code()
            .ok_or_else(|| TransportError::Malformed("exception without code".to_string()))?;
        return Err(TransportError::Exception {
            function: expected_fc,
            code,
        });
    }
    if fc != expected_fc {
        return Err(TransportError::Malformed(format!(
            "function code mismatch: expected {:02X}, got {:02X}",
            expected_fc, fc
        )));
    }
    if bytes.len() < 2 {
        return Err(TransportError::Malformed("missing byte count".to_string()));
    }

    let byte_count = bytes[1] as usize;
    let payload = &bytes[2..];
    if payload.len() != byte_count {
        return Err(TransportError::Malformed(format!(
            "byte count {} but {} data bytes",
            byte_count,
            payload.len()
        )));
    }
    Ok(payload)
}

/// Parse an FC01/FC02 reply into at most `quantity` bits
///
/// Bits are packed LSB-first within each byte. A reply that carries fewer
/// bytes than needed yields a shorter vector.
pub fn parse_bits_response(
    pdu: &ModbusPdu,
    expected_fc: u8,
    quantity: u16,
) -> Result<Vec<bool>, TransportError> {
    let payload = read_payload(pdu, expected_fc)?;
    let available = payload.len() * 8;
    let take = available.min(quantity as usize);

    Ok((0..take)
        .map(|i| (payload[i / 8] >> (i % 8)) & 0x01 == 1)
        .collect())
}

/// Parse an FC03/FC04 reply into at most `quantity` big-endian registers
pub fn parse_words_response(
    pdu: &ModbusPdu,
    expected_fc: u8,
    quantity: u16,
) -> Result<Vec<u16>, TransportError> {
    let payload = read_payload(pdu, expected_fc)?;
    if payload.len() % 2 != 0 {
        return Err(TransportError::Malformed(format!(
            "odd register byte count {}",
            payload.len()
        )));
    }

    Ok(payload
        .chunks_exact(2)
        .take(quantity as usize)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect())
}
