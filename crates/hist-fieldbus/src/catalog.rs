//! Static catalog of supported modules.
//!
//! The catalog mirrors the device's GSDML: one access-point module with
//! three no-I/O submodules in slot 0, and eleven output module types, one
//! per variable kind, each carrying 256 bytes of process data in a single
//! custom submodule.

use hist_common::value::VariableKind;

/// Number of slots in the rack, including the access point in slot 0.
pub const MAX_SLOTS: u16 = 16;

/// Largest output process image one submodule may carry.
pub const MAX_OUTPUT_LEN: usize = 1440;

/// Slot reserved for the device access point.
pub const DAP_SLOT: u16 = 0;

/// Module ident of the device access point.
pub const DAP_MODULE_IDENT: u32 = 0x0000_0001;
/// Submodule ident of the DAP itself (subslot 1).
pub const DAP_SUBMODULE_IDENT: u32 = 0x0000_0001;
/// Submodule ident of interface 1 (subslot 0x8000).
pub const DAP_INTERFACE_IDENT: u32 = 0x0000_8000;
/// Submodule ident of interface 1 port 0 (subslot 0x8001).
pub const DAP_PORT_IDENT: u32 = 0x0000_8001;

/// Subslot of the DAP submodule.
pub const DAP_SUBSLOT: u16 = 0x0001;
/// Subslot of interface 1.
pub const DAP_INTERFACE_SUBSLOT: u16 = 0x8000;
/// Subslot of interface 1 port 0.
pub const DAP_PORT_SUBSLOT: u16 = 0x8001;

/// Submodule ident shared by all I/O modules; every module carries
/// exactly one submodule in subslot 1.
pub const CUSTOM_SUBMODULE_IDENT: u32 = 0x0000_0001;
/// Subslot of the custom submodule.
pub const CUSTOM_SUBSLOT: u16 = 1;

/// Payload carried by every I/O module type.
const MODULE_OUTPUT_LEN: u16 = 256;

/// Data direction of a submodule as seen from the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataDirection {
    /// Device produces, controller consumes.
    Input,
    /// Controller produces, device consumes.
    Output,
    /// No cyclic data (access point submodules).
    NoIo,
}

/// One declared module/submodule type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModuleType {
    /// 32-bit module ident number.
    pub module_ident: u32,
    /// 32-bit submodule ident number.
    pub submodule_ident: u32,
    /// Cyclic data direction.
    pub direction: DataDirection,
    /// Total output payload length in bytes.
    pub output_len: u16,
    /// Kind of every element in the payload.
    pub kind: VariableKind,
    /// Number of elements in the payload.
    pub element_count: u32,
}

const fn io_module(module_ident: u32, kind: VariableKind, element_count: u32) -> ModuleType {
    ModuleType {
        module_ident,
        submodule_ident: CUSTOM_SUBMODULE_IDENT,
        direction: DataDirection::Output,
        output_len: MODULE_OUTPUT_LEN,
        kind,
        element_count,
    }
}

const fn dap_submodule(submodule_ident: u32) -> ModuleType {
    ModuleType {
        module_ident: DAP_MODULE_IDENT,
        submodule_ident,
        direction: DataDirection::NoIo,
        output_len: 0,
        kind: VariableKind::None,
        element_count: 0,
    }
}

/// All module/submodule types this device accepts.
pub const CATALOG: [ModuleType; 14] = [
    dap_submodule(DAP_SUBMODULE_IDENT),
    dap_submodule(DAP_INTERFACE_IDENT),
    dap_submodule(DAP_PORT_IDENT),
    io_module(0x0000_0100, VariableKind::Bool, 2048),
    io_module(0x0000_0200, VariableKind::U8, 256),
    io_module(0x0000_0210, VariableKind::U16, 128),
    io_module(0x0000_0220, VariableKind::U32, 64),
    io_module(0x0000_0230, VariableKind::U64, 32),
    io_module(0x0000_0300, VariableKind::I8, 256),
    io_module(0x0000_0310, VariableKind::I16, 128),
    io_module(0x0000_0320, VariableKind::I32, 64),
    io_module(0x0000_0330, VariableKind::I64, 32),
    io_module(0x0000_0420, VariableKind::F32, 64),
    io_module(0x0000_0430, VariableKind::F64, 32),
];

/// Find a declared type by its exact (module, submodule) ident pair.
///
/// Linear scan; the catalog has 14 entries.
#[must_use]
pub fn lookup(module_ident: u32, submodule_ident: u32) -> Option<&'static ModuleType> {
    CATALOG
        .iter()
        .find(|m| m.module_ident == module_ident && m.submodule_ident == submodule_ident)
}

/// Find the first declared type with the given module ident.
#[must_use]
pub fn lookup_module(module_ident: u32) -> Option<&'static ModuleType> {
    CATALOG.iter().find(|m| m.module_ident == module_ident)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_known_pairs() {
        let u16_mod = lookup(0x210, CUSTOM_SUBMODULE_IDENT).unwrap();
        assert_eq!(u16_mod.kind, VariableKind::U16);
        assert_eq!(u16_mod.element_count, 128);
        assert_eq!(u16_mod.output_len, 256);

        let dap = lookup(DAP_MODULE_IDENT, DAP_INTERFACE_IDENT).unwrap();
        assert_eq!(dap.direction, DataDirection::NoIo);
        assert_eq!(dap.output_len, 0);
    }

    #[test]
    fn test_lookup_unknown() {
        assert!(lookup(0xdead_beef, CUSTOM_SUBMODULE_IDENT).is_none());
        assert!(lookup(0x210, 0x99).is_none());
        assert!(lookup_module(0x0000_0440).is_none());
    }

    #[test]
    fn test_payload_fits_elements() {
        // Every I/O entry declares enough bytes for its elements.
        for m in &CATALOG {
            if m.direction == DataDirection::Output {
                assert!(
                    u64::from(m.output_len) * 8
                        >= u64::from(m.element_count) * u64::from(m.kind.bit_width()),
                    "module 0x{:x} payload too small",
                    m.module_ident
                );
                assert!(usize::from(m.output_len) <= MAX_OUTPUT_LEN);
            }
        }
    }

    #[test]
    fn test_one_entry_per_kind() {
        let io_count = CATALOG
            .iter()
            .filter(|m| m.direction == DataDirection::Output)
            .count();
        assert_eq!(io_count, 11);
    }
}
