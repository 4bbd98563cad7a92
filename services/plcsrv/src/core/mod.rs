//! Acquisition core: tag map, span planning, decoding, read cycles and
//! coil discovery. Nothing here knows about sockets or HTTP.

pub mod decoder;
pub mod discovery;
pub mod orchestrator;
pub mod registry;
pub mod span;

pub use decoder::{decode, ByteOrder, DecodedValue, RawFrame, TagValue};
pub use discovery::{ChangeEvent, DiscoveryConfig, DiscoveryState, DiscoveryStats};
pub use orchestrator::{probe, read_snapshot, Snapshot};
pub use registry::{AddressSpace, Encoding, SpaceTable, TagDefinition, TagRegistry};
pub use span::{plan_span, ReadSpan};
