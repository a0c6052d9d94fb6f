//! Runtime record of what is plugged where.

use crate::catalog::{self, ModuleType, MAX_SLOTS};
use hist_common::error::{BridgeError, BridgeResult};

/// Maps each slot to the module ident plugged into it (0 = empty).
///
/// Mutated only from the fieldbus callback thread; the sampler reads it
/// behind a shared mutex once per tick.
#[derive(Debug, Clone)]
pub struct SlotRegistry {
    plugged: [u32; MAX_SLOTS as usize],
}

impl Default for SlotRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SlotRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            plugged: [0; MAX_SLOTS as usize],
        }
    }

    /// Record `module_ident` as plugged in `slot`.
    ///
    /// # Errors
    ///
    /// `SlotOutOfRange` if the slot index is beyond the rack,
    /// `UnknownModule` if the ident is not in the catalog.
    pub fn plug(&mut self, slot: u16, module_ident: u32) -> BridgeResult<()> {
        if slot >= MAX_SLOTS {
            return Err(BridgeError::SlotOutOfRange {
                slot,
                max: MAX_SLOTS - 1,
            });
        }
        if catalog::lookup_module(module_ident).is_none() {
            return Err(BridgeError::UnknownModule {
                module_ident,
                submodule_ident: catalog::CUSTOM_SUBMODULE_IDENT,
            });
        }
        self.plugged[slot as usize] = module_ident;
        Ok(())
    }

    /// Clear the entry for `slot`. Out-of-range slots are ignored.
    pub fn pull(&mut self, slot: u16) {
        if let Some(entry) = self.plugged.get_mut(slot as usize) {
            *entry = 0;
        }
    }

    /// Declared type of the module plugged in `slot`, if any.
    #[must_use]
    pub fn module_at(&self, slot: u16) -> Option<&'static ModuleType> {
        let ident = *self.plugged.get(slot as usize)?;
        if ident == 0 {
            return None;
        }
        catalog::lookup_module(ident)
    }

    /// Occupied slots with their module types, ascending slot order.
    pub fn iter_occupied(&self) -> impl Iterator<Item = (u16, &'static ModuleType)> + '_ {
        self.plugged
            .iter()
            .enumerate()
            .filter(|(_, ident)| **ident != 0)
            .filter_map(|(slot, ident)| {
                catalog::lookup_module(*ident).map(|m| (slot as u16, m))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hist_common::value::VariableKind;

    #[test]
    fn test_plug_and_lookup() {
        let mut reg = SlotRegistry::new();
        reg.plug(1, 0x210).unwrap();

        let m = reg.module_at(1).unwrap();
        assert_eq!(m.kind, VariableKind::U16);
        assert!(reg.module_at(2).is_none());
    }

    #[test]
    fn test_plug_out_of_range() {
        let mut reg = SlotRegistry::new();
        let err = reg.plug(MAX_SLOTS, 0x210).unwrap_err();
        assert_eq!(
            err,
            BridgeError::SlotOutOfRange {
                slot: MAX_SLOTS,
                max: MAX_SLOTS - 1
            }
        );
    }

    #[test]
    fn test_plug_unknown_module() {
        let mut reg = SlotRegistry::new();
        assert!(matches!(
            reg.plug(1, 0xbad),
            Err(BridgeError::UnknownModule { .. })
        ));
        assert!(reg.module_at(1).is_none());
    }

    #[test]
    fn test_pull_clears() {
        let mut reg = SlotRegistry::new();
        reg.plug(3, 0x100).unwrap();
        reg.pull(3);
        assert!(reg.module_at(3).is_none());
        // Pulling an empty or out-of-range slot is a no-op
        reg.pull(3);
        reg.pull(MAX_SLOTS + 5);
    }

    #[test]
    fn test_iter_ascending() {
        let mut reg = SlotRegistry::new();
        reg.plug(4, 0x220).unwrap();
        reg.plug(1, 0x210).unwrap();
        reg.plug(9, 0x100).unwrap();

        let slots: Vec<u16> = reg.iter_occupied().map(|(s, _)| s).collect();
        assert_eq!(slots, [1, 4, 9]);
    }
}
