//! Snapshot acquisition
//!
//! A read cycle plans one span per populated space, reads the spans in
//! acquisition order and decodes every tag. The cycle is all-or-nothing: the
//! first failing span aborts it and no partial snapshot is returned.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use super::decoder::{decode_tag, RawFrame, TagValue};
use super::registry::{AddressSpace, SpaceTable, TagRegistry};
use super::span::{plan_span, ReadSpan};
use crate::error::{PlcSrvError, Result};
use crate::transport::{Transport, TransportError, WordTable};

/// Values of every tag from one read cycle, grouped by space
///
/// A tag is always present; its value is `None` when the device returned a
/// frame too short to contain it.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub read_at: DateTime<Utc>,
    pub spaces: BTreeMap<AddressSpace, BTreeMap<String, Option<TagValue>>>,
}

impl Snapshot {
    /// Value of `name`: outer `None` for an unknown tag, inner for a missing value
    pub fn get(&self, name: &str) -> Option<Option<TagValue>> {
        self.spaces
            .values()
            .find_map(|tags| tags.get(name).copied())
    }

    /// All tags in one name-sorted map
    pub fn flatten(&self) -> BTreeMap<String, Option<TagValue>> {
        self.spaces
            .values()
            .flat_map(|tags| tags.iter().map(|(name, value)| (name.clone(), *value)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.spaces.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of tags whose value could not be decoded
    pub fn missing(&self) -> usize {
        self.spaces
            .values()
            .flat_map(BTreeMap::values)
            .filter(|v| v.is_none())
            .count()
    }
}

async fn read_frame(
    transport: &mut dyn Transport,
    span: &ReadSpan,
) -> std::result::Result<RawFrame, TransportError> {
    match span.space.table() {
        SpaceTable::Bits(table) => transport
            .read_bits(table, span.start, span.count)
            .await
            .map(RawFrame::Bits),
        SpaceTable::Words(table) => transport
            .read_words(table, span.start, span.count)
            .await
            .map(RawFrame::Words),
    }
}

/// Run one read cycle over every populated space of `registry`
///
/// The transport must already be connected. Spaces are read in
/// [`AddressSpace::ALL`] order.
pub async fn read_snapshot(registry: &TagRegistry, transport: &mut dyn Transport) -> Result<Snapshot> {
    let mut spaces = BTreeMap::new();

    for space in registry.spaces() {
        let Some(span) = plan_span(space, registry.tags_in(space))? else {
            continue;
        };

        let frame = match read_frame(transport, &span).await {
            Ok(frame) => frame,
            Err(cause) => {
                warn!("Read {} failed: {}", span, cause);
                return Err(PlcSrvError::from_span_read(span, cause));
            },
        };

        if frame.len() < span.count as usize {
            debug!(
                "Short frame for {}: {} of {} units",
                span,
                frame.len(),
                span.count
            );
        }

        let values: BTreeMap<String, Option<TagValue>> = registry
            .tags_in(space)
            .map(|tag| {
                let decoded = decode_tag(&frame, &span, tag);
                (decoded.name, decoded.value)
            })
            .collect();
        spaces.insert(space, values);
    }

    let snapshot = Snapshot {
        read_at: Utc::now(),
        spaces,
    };
    debug!(
        "Snapshot: {} tags, {} missing",
        snapshot.len(),
        snapshot.missing()
    );
    Ok(snapshot)
}

/// Liveness check: read holding register 0
///
/// `Ok(true)` when the device answers with data, `Ok(false)` when it answers
/// with an exception or garbage, `Err(Connectivity)` when it cannot be
/// reached in time.
pub async fn probe(transport: &mut dyn Transport) -> Result<bool> {
    match transport
        .read_words(WordTable::HoldingRegisters, 0, 1)
        .await
    {
        Ok(_) => Ok(true),
        Err(e) if e.is_device_fault() => {
            debug!("Probe answered with fault: {}", e);
            Ok(false)
        },
        Err(e) => Err(PlcSrvError::Connectivity(e)),
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use crate::core::registry::TagDefinition;
    use crate::transport::{BitTable, MockTransport};

    fn registry() -> TagRegistry {
        TagRegistry::new(vec![
            TagDefinition::new("Y6", AddressSpace::OutputCoils, 6).with_base_offset(114),
            TagDefinition::new("M32", AddressSpace::InternalCoils, 32),
            TagDefinition::new("Temp", AddressSpace::HoldingRegisters, 4).with_scale(10.0),
        ])
        .unwrap()
    }

    #[tokio::test]
    async fn test_reads_spaces_in_order() {
        let mut mock = MockTransport::new();
        mock.set_bit(BitTable::Coils, 120, true);
        mock.set_bit(BitTable::Coils, 32, false);
        mock.set_words(WordTable::HoldingRegisters, 4, &[253]);
        mock.connect().await.unwrap();

        let snapshot = read_snapshot(&registry(), &mut mock).await.unwrap();
        assert_eq!(snapshot.get("Y6"), Some(Some(TagValue::Bool(true))));
        assert_eq!(snapshot.get("M32"), Some(Some(TagValue::Bool(false))));
        assert_eq!(snapshot.get("Temp"), Some(Some(TagValue::Number(25.3))));
        assert_eq!(snapshot.get("nope"), None);

        let starts: Vec<_> = mock.reads().iter().map(|r| (r.function, r.start, r.count)).collect();
        assert_eq!(starts, vec![(0x01, 114, 7), (0x01, 0, 33), (0x03, 0, 5)]);
    }

    #[tokio::test]
    async fn test_probe_outcomes() {
        let mut mock = MockTransport::new();
        mock.connect().await.unwrap();
        mock.set_words(WordTable::HoldingRegisters, 0, &[1]);
        assert!(probe(&mut mock).await.unwrap());

        mock.fail_next(TransportError::Exception {
            function: 0x03,
            code: 0x02,
        });
        assert!(!probe(&mut mock).await.unwrap());

        mock.close().await;
        assert!(matches!(
            probe(&mut mock).await,
            Err(PlcSrvError::Connectivity(_))
        ));
    }
}
