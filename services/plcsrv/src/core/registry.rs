//! Tag registry
//!
//! The static map from symbolic tag names to PLC addresses. Built once at
//! startup, validated up front, immutable afterwards and shared read-only by
//! every acquisition cycle.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use super::decoder::ByteOrder;
use super::span::plan_span;
use crate::error::{PlcSrvError, Result};
use crate::transport::{BitTable, WordTable};

/// PLC address space a tag lives in
///
/// Output coils (Y) and internal relays (M) are both read with FC01; they
/// differ only by base offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressSpace {
    OutputCoils,
    InternalCoils,
    DiscreteInputs,
    HoldingRegisters,
    InputRegisters,
}

/// Which Modbus table serves a space
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpaceTable {
    Bits(BitTable),
    Words(WordTable),
}

impl AddressSpace {
    /// Every space, in acquisition order
    pub const ALL: [AddressSpace; 5] = [
        Self::OutputCoils,
        Self::InternalCoils,
        Self::DiscreteInputs,
        Self::HoldingRegisters,
        Self::InputRegisters,
    ];

    pub fn table(&self) -> SpaceTable {
        match self {
            Self::OutputCoils | Self::InternalCoils => SpaceTable::Bits(BitTable::Coils),
            Self::DiscreteInputs => SpaceTable::Bits(BitTable::DiscreteInputs),
            Self::HoldingRegisters => SpaceTable::Words(WordTable::HoldingRegisters),
            Self::InputRegisters => SpaceTable::Words(WordTable::InputRegisters),
        }
    }

    pub fn is_bit_space(&self) -> bool {
        matches!(self.table(), SpaceTable::Bits(_))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OutputCoils => "output_coils",
            Self::InternalCoils => "internal_coils",
            Self::DiscreteInputs => "discrete_inputs",
            Self::HoldingRegisters => "holding_registers",
            Self::InputRegisters => "input_registers",
        }
    }

    /// Parse a space name; accepts the PLC letter prefixes too (Y, M, X, D)
    pub fn from_label(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "output_coils" | "outputs" | "y" => Some(Self::OutputCoils),
            "internal_coils" | "relays" | "m" => Some(Self::InternalCoils),
            "discrete_inputs" | "inputs" | "x" => Some(Self::DiscreteInputs),
            "holding_registers" | "holding" | "d" => Some(Self::HoldingRegisters),
            "input_registers" | "ir" => Some(Self::InputRegisters),
            _ => None,
        }
    }
}

impl std::fmt::Display for AddressSpace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a tag's raw units are interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Encoding {
    Bit,
    Int16,
    #[serde(rename = "uint16")]
    UInt16,
    Float32 { byte_order: ByteOrder },
}

impl Encoding {
    /// Units the encoding occupies in its space
    pub fn width(&self) -> u16 {
        match self {
            Self::Bit | Self::Int16 | Self::UInt16 => 1,
            Self::Float32 { .. } => 2,
        }
    }

    pub fn is_bit(&self) -> bool {
        matches!(self, Self::Bit)
    }

    /// Default encoding for a space: Bit for bit spaces, Int16 for registers
    pub fn default_for(space: AddressSpace) -> Self {
        if space.is_bit_space() {
            Self::Bit
        } else {
            Self::Int16
        }
    }

    /// Parse a data type name; `byte_order` only applies to 32-bit types
    pub fn parse(name: &str, byte_order: Option<&str>) -> Result<Self> {
        let encoding = match name.trim().to_lowercase().as_str() {
            "bit" | "bool" | "boolean" | "coil" => Self::Bit,
            "int16" | "i16" | "short" => Self::Int16,
            "uint16" | "u16" | "word" => Self::UInt16,
            "float32" | "f32" | "float" | "real" => {
                let byte_order = match byte_order.filter(|s| !s.trim().is_empty()) {
                    Some(label) => ByteOrder::from_label(label).ok_or_else(|| {
                        PlcSrvError::config(format!("Unknown byte order '{label}'"))
                    })?,
                    None => ByteOrder::default(),
                };
                Self::Float32 { byte_order }
            },
            other => {
                return Err(PlcSrvError::config(format!("Unknown encoding '{other}'")));
            },
        };
        Ok(encoding)
    }
}

impl std::fmt::Display for Encoding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bit => f.write_str("bit"),
            Self::Int16 => f.write_str("int16"),
            Self::UInt16 => f.write_str("uint16"),
            Self::Float32 { byte_order } => write!(f, "float32/{byte_order}"),
        }
    }
}

/// One named PLC point
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TagDefinition {
    pub name: String,
    pub space: AddressSpace,
    /// Address relative to the base offset; also the offset inside the read frame
    pub address: u16,
    pub encoding: Encoding,
    /// Divisor for Int16/UInt16; ignored by Bit and Float32
    pub scale: f64,
    /// Added to `address` to form the wire address
    pub base_offset: u16,
}

impl TagDefinition {
    /// Tag with the space's default encoding, scale 1 and base offset 0
    pub fn new(name: impl Into<String>, space: AddressSpace, address: u16) -> Self {
        Self {
            name: name.into(),
            space,
            address,
            encoding: Encoding::default_for(space),
            scale: 1.0,
            base_offset: 0,
        }
    }

    pub fn with_encoding(mut self, encoding: Encoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn with_scale(mut self, scale: f64) -> Self {
        self.scale = scale;
        self
    }

    pub fn with_base_offset(mut self, base_offset: u16) -> Self {
        self.base_offset = base_offset;
        self
    }

    pub fn width(&self) -> u16 {
        self.encoding.width()
    }

    /// Address on the wire: `base_offset + address`
    pub fn wire_address(&self) -> u32 {
        u32::from(self.base_offset) + u32::from(self.address)
    }

    fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(PlcSrvError::config(format!(
                "Tag at {}:{} has an empty name",
                self.space, self.address
            )));
        }
        if self.space.is_bit_space() != self.encoding.is_bit() {
            return Err(PlcSrvError::config(format!(
                "Tag '{}': encoding {} is not valid in {}",
                self.name, self.encoding, self.space
            )));
        }
        if !self.scale.is_finite() || self.scale <= 0.0 {
            return Err(PlcSrvError::config(format!(
                "Tag '{}': scale must be a positive number, got {}",
                self.name, self.scale
            )));
        }
        Ok(())
    }
}

/// Validated, immutable set of tags
#[derive(Debug, Clone, Default)]
pub struct TagRegistry {
    tags: Vec<TagDefinition>,
    by_name: HashMap<String, usize>,
    by_space: BTreeMap<AddressSpace, Vec<usize>>,
}

impl TagRegistry {
    /// Validate and index `tags`
    ///
    /// Rejects duplicate names, encodings that do not fit their space,
    /// non-positive scales and spaces whose tags disagree on the base offset
    /// or overflow the 16-bit address range.
    pub fn new(tags: Vec<TagDefinition>) -> Result<Self> {
        let mut by_name = HashMap::with_capacity(tags.len());
        let mut by_space: BTreeMap<AddressSpace, Vec<usize>> = BTreeMap::new();

        for (idx, tag) in tags.iter().enumerate() {
            tag.validate()?;
            if by_name.insert(tag.name.clone(), idx).is_some() {
                return Err(PlcSrvError::config(format!(
                    "Duplicate tag name '{}'",
                    tag.name
                )));
            }
            by_space.entry(tag.space).or_default().push(idx);
        }

        let registry = Self {
            tags,
            by_name,
            by_space,
        };

        for space in registry.spaces() {
            plan_span(space, registry.tags_in(space))?;
        }

        Ok(registry)
    }

    /// Tags of one space, in definition order
    pub fn tags_in(&self, space: AddressSpace) -> impl Iterator<Item = &TagDefinition> + '_ {
        self.by_space
            .get(&space)
            .into_iter()
            .flatten()
            .map(|&idx| &self.tags[idx])
    }

    /// Spaces that have at least one tag, in acquisition order
    pub fn spaces(&self) -> impl Iterator<Item = AddressSpace> + '_ {
        self.by_space.keys().copied()
    }

    pub fn get(&self, name: &str) -> Option<&TagDefinition> {
        self.by_name.get(name).map(|&idx| &self.tags[idx])
    }

    pub fn iter(&self) -> impl Iterator<Item = &TagDefinition> {
        self.tags.iter()
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    fn sample_tags() -> Vec<TagDefinition> {
        vec![
            TagDefinition::new("Y6_VentiladorBajo", AddressSpace::OutputCoils, 6)
                .with_base_offset(114),
            TagDefinition::new("M130_MotorAstillas", AddressSpace::InternalCoils, 130),
            TagDefinition::new("Temp_producto", AddressSpace::HoldingRegisters, 8222)
                .with_scale(10.0),
        ]
    }

    #[test]
    fn test_registry_indexes_by_space_and_name() {
        let registry = TagRegistry::new(sample_tags()).unwrap();
        assert_eq!(registry.len(), 3);
        assert_eq!(
            registry.spaces().collect::<Vec<_>>(),
            vec![
                AddressSpace::OutputCoils,
                AddressSpace::InternalCoils,
                AddressSpace::HoldingRegisters
            ]
        );
        assert_eq!(registry.tags_in(AddressSpace::DiscreteInputs).count(), 0);
        let temp = registry.get("Temp_producto").unwrap();
        assert_eq!(temp.encoding, Encoding::Int16);
        assert_eq!(temp.wire_address(), 8222);
        assert_eq!(registry.get("Y6_VentiladorBajo").unwrap().wire_address(), 120);
    }

    #[test]
    fn test_duplicate_names_rejected_across_spaces() {
        let mut tags = sample_tags();
        tags.push(TagDefinition::new("Temp_producto", AddressSpace::InputRegisters, 1));
        let err = TagRegistry::new(tags).unwrap_err();
        assert!(err.to_string().contains("Duplicate tag name"));
    }

    #[test]
    fn test_encoding_must_fit_space() {
        let tags = vec![TagDefinition::new("bad", AddressSpace::OutputCoils, 1)
            .with_encoding(Encoding::Int16)];
        assert!(TagRegistry::new(tags).is_err());

        let tags = vec![TagDefinition::new("bad", AddressSpace::HoldingRegisters, 1)
            .with_encoding(Encoding::Bit)];
        assert!(TagRegistry::new(tags).is_err());
    }

    #[test]
    fn test_scale_must_be_positive() {
        for scale in [0.0, -1.0, f64::NAN] {
            let tags = vec![
                TagDefinition::new("t", AddressSpace::HoldingRegisters, 1).with_scale(scale)
            ];
            assert!(TagRegistry::new(tags).is_err(), "scale {scale}");
        }
    }

    #[test]
    fn test_conflicting_base_offsets_rejected() {
        let tags = vec![
            TagDefinition::new("a", AddressSpace::OutputCoils, 1).with_base_offset(114),
            TagDefinition::new("b", AddressSpace::OutputCoils, 2).with_base_offset(0),
        ];
        let err = TagRegistry::new(tags).unwrap_err();
        assert!(err.to_string().contains("base offset"), "{err}");
    }

    #[test]
    fn test_encoding_parse() {
        assert_eq!(Encoding::parse("INT16", None).unwrap(), Encoding::Int16);
        assert_eq!(Encoding::parse("word", None).unwrap(), Encoding::UInt16);
        assert_eq!(
            Encoding::parse("float32", Some("CDAB")).unwrap(),
            Encoding::Float32 {
                byte_order: ByteOrder::BigEndianSwap
            }
        );
        assert!(Encoding::parse("float32", Some("XYZW")).is_err());
        assert!(Encoding::parse("int64", None).is_err());
        assert_eq!(Encoding::Float32 { byte_order: ByteOrder::BigEndian }.width(), 2);
    }

    #[test]
    fn test_space_labels() {
        assert_eq!(AddressSpace::from_label("Y"), Some(AddressSpace::OutputCoils));
        assert_eq!(AddressSpace::from_label("m"), Some(AddressSpace::InternalCoils));
        assert_eq!(
            AddressSpace::from_label("holding_registers"),
            Some(AddressSpace::HoldingRegisters)
        );
        assert_eq!(AddressSpace::from_label("Q"), None);
        assert!(AddressSpace::DiscreteInputs.is_bit_space());
        assert!(!AddressSpace::InputRegisters.is_bit_space());
    }
}
