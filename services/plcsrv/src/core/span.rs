//! Read span planning
//!
//! One contiguous read per address space: it starts at the space's base
//! offset and is long enough to cover the furthest unit any tag occupies.
//! Gaps are read and discarded.

use serde::Serialize;

use super::registry::{AddressSpace, TagDefinition};
use crate::error::{PlcSrvError, Result};

/// A contiguous read in one space
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReadSpan {
    pub space: AddressSpace,
    /// First wire address
    pub start: u16,
    pub count: u16,
}

impl ReadSpan {
    /// One past the last wire address covered
    pub fn end(&self) -> u32 {
        u32::from(self.start) + u32::from(self.count)
    }

    /// Index of `tag`'s first unit within the frame read for this span
    pub fn offset_of(&self, tag: &TagDefinition) -> Option<usize> {
        tag.wire_address()
            .checked_sub(u32::from(self.start))
            .map(|offset| offset as usize)
    }
}

impl std::fmt::Display for ReadSpan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}[{}..+{}]", self.space, self.start, self.count)
    }
}

/// Plan the single read for `space`
///
/// `start` is the shared base offset and `count` is the largest
/// `address + width` among the tags. Returns `Ok(None)` for a space without
/// tags. Fails when the tags disagree on base offset, when a tag from another
/// space is passed in, or when the span leaves the 16-bit address range.
pub fn plan_span<'a, I>(space: AddressSpace, tags: I) -> Result<Option<ReadSpan>>
where
    I: IntoIterator<Item = &'a TagDefinition>,
{
    let mut base: Option<u16> = None;
    let mut count: u32 = 0;

    for tag in tags {
        if tag.space != space {
            return Err(PlcSrvError::config(format!(
                "Tag '{}' belongs to {}, not {}",
                tag.name, tag.space, space
            )));
        }
        match base {
            None => base = Some(tag.base_offset),
            Some(b) if b != tag.base_offset => {
                return Err(PlcSrvError::config(format!(
                    "Conflicting base offset in {}: tag '{}' uses {}, others use {}",
                    space, tag.name, tag.base_offset, b
                )));
            },
            Some(_) => {},
        }
        count = count.max(u32::from(tag.address) + u32::from(tag.width()));
    }

    let Some(start) = base else {
        return Ok(None);
    };

    if count > u32::from(u16::MAX) || u32::from(start) + count > u32::from(u16::MAX) + 1 {
        return Err(PlcSrvError::config(format!(
            "Span for {} exceeds the address range: start {} + count {}",
            space, start, count
        )));
    }

    Ok(Some(ReadSpan {
        space,
        start,
        count: count as u16,
    }))
}
