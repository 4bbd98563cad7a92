//! Raw frame decoding
//!
//! Turns the units returned for one span into typed tag values. Decoding never
//! fails: an offset outside the frame yields `None` and the tag is reported as
//! missing.

use serde::{Deserialize, Serialize};

use super::registry::{Encoding, TagDefinition};
use super::span::ReadSpan;

/// Units returned by one span read
#[derive(Debug, Clone, PartialEq)]
pub enum RawFrame {
    Bits(Vec<bool>),
    Words(Vec<u16>),
}

impl RawFrame {
    pub fn len(&self) -> usize {
        match self {
            Self::Bits(bits) => bits.len(),
            Self::Words(words) => words.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn bit(&self, offset: usize) -> Option<bool> {
        match self {
            Self::Bits(bits) => bits.get(offset).copied(),
            Self::Words(_) => None,
        }
    }

    pub fn word(&self, offset: usize) -> Option<u16> {
        match self {
            Self::Words(words) => words.get(offset).copied(),
            Self::Bits(_) => None,
        }
    }
}

/// Decoded tag value
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TagValue {
    Bool(bool),
    Number(f64),
}

/// A tag name with its decoded value, `None` when the frame was short
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecodedValue {
    pub name: String,
    pub value: Option<TagValue>,
}

/// Word order of a 32-bit value spread over two registers
///
/// Letters name the bytes of the big-endian value; the label is the order in
/// which they appear on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ByteOrder {
    /// ABCD
    #[default]
    #[serde(rename = "ABCD")]
    BigEndian,
    /// CDAB, word swapped
    #[serde(rename = "CDAB")]
    BigEndianSwap,
    /// BADC, bytes swapped inside each word
    #[serde(rename = "BADC")]
    LittleEndianSwap,
    /// DCBA
    #[serde(rename = "DCBA")]
    LittleEndian,
}

impl ByteOrder {
    pub fn from_label(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "ABCD" | "BE" | "BIG_ENDIAN" => Some(Self::BigEndian),
            "CDAB" | "BIG_ENDIAN_SWAP" | "WORD_SWAP" => Some(Self::BigEndianSwap),
            "BADC" | "LITTLE_ENDIAN_SWAP" | "BYTE_SWAP" => Some(Self::LittleEndianSwap),
            "DCBA" | "LE" | "LITTLE_ENDIAN" => Some(Self::LittleEndian),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::BigEndian => "ABCD",
            Self::BigEndianSwap => "CDAB",
            Self::LittleEndianSwap => "BADC",
            Self::LittleEndian => "DCBA",
        }
    }

    /// Reassemble the four big-endian bytes from two wire registers
    pub fn regs_to_bytes(&self, regs: [u16; 2]) -> [u8; 4] {
        let [a0, a1] = regs[0].to_be_bytes();
        let [b0, b1] = regs[1].to_be_bytes();
        match self {
            Self::BigEndian => [a0, a1, b0, b1],
            Self::BigEndianSwap => [b0, b1, a0, a1],
            Self::LittleEndianSwap => [a1, a0, b1, b0],
            Self::LittleEndian => [b1, b0, a1, a0],
        }
    }

    /// Lay out four big-endian bytes as two wire registers
    pub fn bytes_to_regs(&self, bytes: [u8; 4]) -> [u16; 2] {
        let [a, b, c, d] = bytes;
        match self {
            Self::BigEndian => [u16::from_be_bytes([a, b]), u16::from_be_bytes([c, d])],
            Self::BigEndianSwap => [u16::from_be_bytes([c, d]), u16::from_be_bytes([a, b])],
            Self::LittleEndianSwap => [u16::from_be_bytes([b, a]), u16::from_be_bytes([d, c])],
            Self::LittleEndian => [u16::from_be_bytes([d, c]), u16::from_be_bytes([b, a])],
        }
    }
}

impl std::fmt::Display for ByteOrder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Decode the value at `offset` within `frame`
///
/// Int16 and UInt16 are divided by `scale`; Float32 ignores it. Returns
/// `None` when any unit the encoding needs is outside the frame or the frame
/// kind does not match the encoding.
pub fn decode(frame: &RawFrame, offset: usize, encoding: Encoding, scale: f64) -> Option<TagValue> {
    match encoding {
        Encoding::Bit => frame.bit(offset).map(TagValue::Bool),
        Encoding::Int16 => frame
            .word(offset)
            .map(|raw| TagValue::Number(f64::from(raw as i16) / scale)),
        Encoding::UInt16 => frame
            .word(offset)
            .map(|raw| TagValue::Number(f64::from(raw) / scale)),
        Encoding::Float32 { byte_order } => {
            let hi = frame.word(offset)?;
            let lo = frame.word(offset + 1)?;
            let value = f32::from_be_bytes(byte_order.regs_to_bytes([hi, lo]));
            Some(TagValue::Number(f64::from(value)))
        },
    }
}

/// Decode one tag out of the frame read for `span`
pub fn decode_tag(frame: &RawFrame, span: &ReadSpan, tag: &TagDefinition) -> DecodedValue {
    DecodedValue {
        name: tag.name.clone(),
        value: span
            .offset_of(tag)
            .and_then(|offset| decode(frame, offset, tag.encoding, tag.scale)),
    }
}

/// Registers a device would hold for `value` under `encoding`
///
/// Inverse of [`decode`] for word encodings, used to seed simulated devices.
/// Bit encodings yield no registers.
pub fn encode_words(value: f64, encoding: Encoding, scale: f64) -> Vec<u16> {
    match encoding {
        Encoding::Bit => Vec::new(),
        Encoding::Int16 => vec![(value * scale).round() as i16 as u16],
        Encoding::UInt16 => vec![(value * scale).round() as u16],
        Encoding::Float32 { byte_order } => {
            byte_order.bytes_to_regs((value as f32).to_be_bytes()).to_vec()
        },
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use crate::core::registry::AddressSpace;

    #[test]
    fn test_int16_scaled() {
        let frame = RawFrame::Words(vec![0, 250, 0xFF38]);
        assert_eq!(
            decode(&frame, 1, Encoding::Int16, 10.0),
            Some(TagValue::Number(25.0))
        );
        // 0xFF38 = -200
        assert_eq!(
            decode(&frame, 2, Encoding::Int16, 10.0),
            Some(TagValue::Number(-20.0))
        );
        assert_eq!(
            decode(&frame, 2, Encoding::UInt16, 1.0),
            Some(TagValue::Number(65336.0))
        );
    }

    #[test]
    fn test_decode_tag_through_span() {
        let temp = TagDefinition::new("Temp_producto", AddressSpace::HoldingRegisters, 8222)
            .with_scale(10.0);
        let span = ReadSpan {
            space: AddressSpace::HoldingRegisters,
            start: 0,
            count: 8223,
        };
        let mut words = vec![0; 8223];
        words[8222] = 305;
        let decoded = decode_tag(&RawFrame::Words(words), &span, &temp);
        assert_eq!(decoded.name, "Temp_producto");
        assert_eq!(decoded.value, Some(TagValue::Number(30.5)));
    }

    #[test]
    fn test_based_coils_decode_in_any_order() {
        let a = TagDefinition::new("A", AddressSpace::OutputCoils, 6).with_base_offset(114);
        let b = TagDefinition::new("B", AddressSpace::OutputCoils, 26).with_base_offset(114);
        let span = ReadSpan {
            space: AddressSpace::OutputCoils,
            start: 114,
            count: 27,
        };
        let mut bits = vec![false; 27];
        bits[6] = true;
        bits[26] = true;
        let frame = RawFrame::Bits(bits);

        let forward: Vec<_> = [&a, &b].iter().map(|t| decode_tag(&frame, &span, t)).collect();
        let mut backward: Vec<_> = [&b, &a].iter().map(|t| decode_tag(&frame, &span, t)).collect();
        backward.reverse();
        assert_eq!(forward, backward);
        assert!(forward
            .iter()
            .all(|d| d.value == Some(TagValue::Bool(true))));
    }

    #[test]
    fn test_bits() {
        let frame = RawFrame::Bits(vec![false, true]);
        assert_eq!(
            decode(&frame, 1, Encoding::Bit, 1.0),
            Some(TagValue::Bool(true))
        );
        assert_eq!(decode(&frame, 2, Encoding::Bit, 1.0), None);
    }

    #[test]
    fn test_short_frame_is_missing_not_error() {
        let frame = RawFrame::Words(vec![0x4148]);
        let f32_abcd = Encoding::Float32 {
            byte_order: ByteOrder::BigEndian,
        };
        assert_eq!(decode(&frame, 0, f32_abcd, 1.0), None);
        assert_eq!(decode(&frame, 5, Encoding::Int16, 1.0), None);
        assert_eq!(decode(&RawFrame::Words(vec![]), 0, Encoding::UInt16, 1.0), None);
    }

    #[test]
    fn test_kind_mismatch_is_missing() {
        let words = RawFrame::Words(vec![1]);
        assert_eq!(decode(&words, 0, Encoding::Bit, 1.0), None);
        let bits = RawFrame::Bits(vec![true]);
        assert_eq!(decode(&bits, 0, Encoding::Int16, 1.0), None);
    }

    #[test]
    fn test_float32_byte_orders() {
        // 12.5f32 = 0x41480000
        let cases = [
            (ByteOrder::BigEndian, [0x4148, 0x0000]),
            (ByteOrder::BigEndianSwap, [0x0000, 0x4148]),
            (ByteOrder::LittleEndianSwap, [0x4841, 0x0000]),
            (ByteOrder::LittleEndian, [0x0000, 0x4841]),
        ];
        for (order, regs) in cases {
            let frame = RawFrame::Words(regs.to_vec());
            let enc = Encoding::Float32 { byte_order: order };
            assert_eq!(
                decode(&frame, 0, enc, 10.0),
                Some(TagValue::Number(12.5)),
                "{order}"
            );
            assert_eq!(encode_words(12.5, enc, 1.0), regs.to_vec(), "{order}");
        }
    }

    #[test]
    fn test_byte_order_labels() {
        assert_eq!(ByteOrder::from_label("cdab"), Some(ByteOrder::BigEndianSwap));
        assert_eq!(ByteOrder::from_label("DCBA"), Some(ByteOrder::LittleEndian));
        assert_eq!(ByteOrder::from_label("ABDC"), None);
        assert_eq!(ByteOrder::default().label(), "ABCD");
    }

    #[test]
    fn test_encode_int16_negative() {
        assert_eq!(encode_words(-20.0, Encoding::Int16, 10.0), vec![0xFF38]);
    }

    #[test]
    fn test_encode_then_decode_recovers_value() {
        let f32_cdab = Encoding::Float32 {
            byte_order: ByteOrder::BigEndianSwap,
        };
        let cases = [
            (Encoding::Int16, 10.0, 25.3),
            (Encoding::Int16, 10.0, -3276.8),
            (Encoding::Int16, 1.0, 32767.0),
            (Encoding::UInt16, 10.0, 6553.5),
            (Encoding::UInt16, 100.0, 0.07),
            (Encoding::UInt16, 1.0, 0.0),
            (f32_cdab, 10.0, 21.75),
            (f32_cdab, 1.0, -0.15625),
        ];
        for (encoding, scale, value) in cases {
            let frame = RawFrame::Words(encode_words(value, encoding, scale));
            assert_eq!(
                decode(&frame, 0, encoding, scale),
                Some(TagValue::Number(value)),
                "{encoding:?} x{scale}"
            );
        }
    }

    #[test]
    fn test_tag_value_json() {
        assert_eq!(serde_json::to_string(&TagValue::Bool(true)).unwrap(), "true");
        assert_eq!(serde_json::to_string(&TagValue::Number(25.0)).unwrap(), "25.0");
    }
}
