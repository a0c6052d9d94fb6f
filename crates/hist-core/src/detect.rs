//! Per-element change detection.
//!
//! Given the mirrored bytes and a fresh image for one slot, walk the
//! elements in declaration order and emit one [`Change`] per element whose
//! encoded bytes differ. Decoded text always comes from the new image.

use hist_common::value::VariableKind;
use hist_fieldbus::catalog::ModuleType;
use tracing::warn;

/// One detected value change. Transient; lives only until enqueued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    /// Slot the module is plugged in.
    pub slot: u16,
    /// Element index within the module's payload.
    pub element: u32,
    /// Kind of the element.
    pub kind: VariableKind,
    /// Decoded value text from the new image.
    pub text: String,
    /// Tick timestamp in microseconds.
    pub timestamp_us: i64,
}

/// Walk one slot's elements and emit a [`Change`] per differing element.
///
/// `mirror` and `image` must cover the same byte range; the caller slices
/// both to `min(module.output_len, bytes read)`. Elements whose bytes fall
/// beyond that range are not compared.
pub fn scan_slot(
    slot: u16,
    module: &ModuleType,
    mirror: &[u8],
    image: &[u8],
    timestamp_us: i64,
    emit: &mut dyn FnMut(Change),
) {
    let len = mirror.len().min(image.len());

    match module.kind {
        VariableKind::None => {
            warn!(slot, module_ident = module.module_ident, "unknown variable kind, slot skipped");
        }
        VariableKind::Bool => {
            let in_range = (len as u32).saturating_mul(8);
            let total = module.element_count.min(in_range);
            for element in 0..total {
                let byte = (element / 8) as usize;
                let mask = 1u8 << (element % 8);
                if (mirror[byte] ^ image[byte]) & mask != 0 {
                    let text = if image[byte] & mask != 0 { "1" } else { "0" };
                    emit(Change {
                        slot,
                        element,
                        kind: module.kind,
                        text: text.to_owned(),
                        timestamp_us,
                    });
                }
            }
        }
        _ => {
            let width = module.kind.byte_len();
            let mut offset = 0usize;
            for element in 0..module.element_count {
                let end = offset + width;
                if end > len {
                    break;
                }
                if mirror[offset..end] != image[offset..end] {
                    match module.kind.decode(&image[offset..end]) {
                        Some(text) => emit(Change {
                            slot,
                            element,
                            kind: module.kind,
                            text,
                            timestamp_us,
                        }),
                        None => {
                            warn!(slot, element, kind = %module.kind, "undecodable element skipped");
                        }
                    }
                }
                offset = end;
            }
        }
    }
}
