//! CSV tag table loader
//!
//! Large tag maps are easier to maintain as a spreadsheet export than as
//! YAML. The table has one row per tag:
//!
//! ```text
//! name,space,address,encoding,scale,base_offset,byte_order
//! Temp_producto,holding_registers,8222,int16,10,,
//! Y6_VentiladorBajo,Y,6,,,114,
//! ```
//!
//! Only `name`, `space` and `address` are required. Empty cells fall back to
//! the space default (encoding), 1 (scale), the space's configured base
//! offset, and ABCD (byte order).

use std::collections::BTreeMap;
use std::path::Path;

use csv::ReaderBuilder;
use serde::Deserialize;
use tracing::debug;

use crate::core::{AddressSpace, Encoding, TagDefinition};
use crate::error::{PlcSrvError, Result};

#[derive(Debug, Deserialize)]
struct TagRow {
    name: String,
    space: String,
    address: u16,
    #[serde(default)]
    encoding: Option<String>,
    #[serde(default)]
    scale: Option<f64>,
    #[serde(default)]
    base_offset: Option<u16>,
    #[serde(default)]
    byte_order: Option<String>,
}

impl TagRow {
    fn into_definition(
        self,
        line: usize,
        space_bases: &BTreeMap<AddressSpace, u16>,
    ) -> Result<TagDefinition> {
        let space = AddressSpace::from_label(&self.space).ok_or_else(|| {
            PlcSrvError::config(format!(
                "Tag table line {line}: unknown space '{}'",
                self.space
            ))
        })?;

        let encoding = match self.encoding.as_deref().filter(|s| !s.trim().is_empty()) {
            Some(name) => Encoding::parse(name, self.byte_order.as_deref()).map_err(|e| {
                PlcSrvError::config(format!("Tag table line {line} ('{}'): {e}", self.name))
            })?,
            None => Encoding::default_for(space),
        };

        let base_offset = self
            .base_offset
            .or_else(|| space_bases.get(&space).copied())
            .unwrap_or(0);

        Ok(TagDefinition::new(self.name.trim(), space, self.address)
            .with_encoding(encoding)
            .with_scale(self.scale.unwrap_or(1.0))
            .with_base_offset(base_offset))
    }
}

/// Read tag definitions from a CSV file with a header row
///
/// `space_bases` supplies the base offset for rows that leave it empty.
pub fn load_tag_table(
    path: &Path,
    space_bases: &BTreeMap<AddressSpace, u16>,
) -> Result<Vec<TagDefinition>> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .comment(Some(b'#'))
        .from_path(path)
        .map_err(|e| PlcSrvError::config(format!("Tag table {}: {e}", path.display())))?;

    let mut tags = Vec::new();
    for (idx, row) in reader.deserialize::<TagRow>().enumerate() {
        // header is line 1
        let line = idx + 2;
        let row = row.map_err(|e| {
            PlcSrvError::config(format!("Tag table {} line {line}: {e}", path.display()))
        })?;
        tags.push(row.into_definition(line, space_bases)?);
    }

    debug!("Loaded {} tags from {}", tags.len(), path.display());
    Ok(tags)
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use crate::core::ByteOrder;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_table(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_with_defaults() {
        let file = write_table(
            "name,space,address,encoding,scale,base_offset,byte_order\n\
             Temp_producto,holding_registers,8222,int16,10,,\n\
             Y6_VentiladorBajo,Y,6,,,,\n\
             Flow,input_registers,10,float32,,,CDAB\n",
        );
        let bases = BTreeMap::from([(AddressSpace::OutputCoils, 114)]);
        let tags = load_tag_table(file.path(), &bases).unwrap();
        assert_eq!(tags.len(), 3);

        assert_eq!(tags[0].scale, 10.0);
        assert_eq!(tags[0].encoding, Encoding::Int16);

        assert_eq!(tags[1].encoding, Encoding::Bit);
        assert_eq!(tags[1].base_offset, 114);

        assert_eq!(
            tags[2].encoding,
            Encoding::Float32 {
                byte_order: ByteOrder::BigEndianSwap
            }
        );
        assert_eq!(tags[2].scale, 1.0);
    }

    #[test]
    fn test_minimal_columns() {
        let file = write_table("name,space,address\nM32,m,32\n");
        let tags = load_tag_table(file.path(), &BTreeMap::new()).unwrap();
        assert_eq!(tags[0].space, AddressSpace::InternalCoils);
        assert_eq!(tags[0].base_offset, 0);
    }

    #[test]
    fn test_bad_rows_report_line() {
        let file = write_table("name,space,address\nok,m,1\nbad,Q,2\n");
        let err = load_tag_table(file.path(), &BTreeMap::new()).unwrap_err();
        assert!(err.to_string().contains("line 3"), "{err}");

        let file = write_table("name,space,address\nneg,d,-4\n");
        assert!(load_tag_table(file.path(), &BTreeMap::new()).is_err());
    }

    #[test]
    fn test_missing_file() {
        let err = load_tag_table(Path::new("/nonexistent/tags.csv"), &BTreeMap::new())
            .unwrap_err();
        assert!(matches!(err, PlcSrvError::Configuration(_)));
    }
}
