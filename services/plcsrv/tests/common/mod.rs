//! Shared fixtures: the kiln controller tag map on a simulated PLC
#![allow(dead_code)]

use std::sync::Arc;

use plcsrv::api::{create_routes, AppState};
use plcsrv::core::decoder::encode_words;
use plcsrv::core::{AddressSpace, Encoding, TagDefinition, TagRegistry};
use plcsrv::transport::{BitTable, MockTransport, WordTable};
use plcsrv::PlcSession;

pub const Y_BASE: u16 = 114;

pub fn kiln_tags() -> Vec<TagDefinition> {
    vec![
        TagDefinition::new("Y6_VentiladorBajo", AddressSpace::OutputCoils, 6).with_base_offset(Y_BASE),
        TagDefinition::new("Y12_Resistencia", AddressSpace::OutputCoils, 12).with_base_offset(Y_BASE),
        TagDefinition::new("Y26_BombaAgua", AddressSpace::OutputCoils, 26).with_base_offset(Y_BASE),
        TagDefinition::new("M130_MotorAstillas", AddressSpace::InternalCoils, 130),
        TagDefinition::new("M132_ValvulaHumo", AddressSpace::InternalCoils, 132),
        TagDefinition::new("M32_PT_Humado", AddressSpace::InternalCoils, 32),
        TagDefinition::new("Temp_producto", AddressSpace::HoldingRegisters, 8222).with_scale(10.0),
        TagDefinition::new("SP_Producto", AddressSpace::HoldingRegisters, 296).with_scale(10.0),
    ]
}

pub fn kiln_registry() -> TagRegistry {
    TagRegistry::new(kiln_tags()).expect("fixture registry is valid")
}

/// Device image: Y6 and M130 on, 25.3 °C product temperature, 60.0 setpoint
pub fn kiln_device() -> MockTransport {
    let mock = MockTransport::new();
    mock.set_bit(BitTable::Coils, Y_BASE + 6, true);
    mock.set_bit(BitTable::Coils, Y_BASE + 12, false);
    mock.set_bit(BitTable::Coils, Y_BASE + 26, false);
    mock.set_bit(BitTable::Coils, 130, true);
    mock.set_bit(BitTable::Coils, 132, false);
    mock.set_bit(BitTable::Coils, 32, false);
    mock.set_words(
        WordTable::HoldingRegisters,
        296,
        &encode_words(60.0, Encoding::Int16, 10.0),
    );
    mock.set_words(
        WordTable::HoldingRegisters,
        8222,
        &encode_words(25.3, Encoding::Int16, 10.0),
    );
    mock
}

pub fn router_for(mock: &MockTransport) -> axum::Router {
    let session = Arc::new(PlcSession::new(Box::new(mock.clone()), true));
    create_routes(AppState::new(session, Arc::new(kiln_registry())))
}
