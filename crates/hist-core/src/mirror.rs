//! Last-seen process images, one stripe per slot.
//!
//! The mirror is the diff reference for change detection. It starts
//! zeroed, so on first connect every non-zero element reports a change.
//! Only the sampler thread touches it; no synchronization needed.

use hist_fieldbus::catalog::{MAX_OUTPUT_LEN, MAX_SLOTS};

/// Flat `MAX_SLOTS x MAX_OUTPUT_LEN` byte store.
#[derive(Debug)]
pub struct StateMirror {
    data: Box<[u8]>,
}

impl Default for StateMirror {
    fn default() -> Self {
        Self::new()
    }
}

impl StateMirror {
    /// Create a zero-initialized mirror.
    #[must_use]
    pub fn new() -> Self {
        Self {
            data: vec![0u8; MAX_SLOTS as usize * MAX_OUTPUT_LEN].into_boxed_slice(),
        }
    }

    /// The full stripe for `slot`.
    ///
    /// # Panics
    ///
    /// Panics if `slot >= MAX_SLOTS`; callers iterate registry slots,
    /// which are range-checked at plug time.
    #[must_use]
    pub fn image(&self, slot: u16) -> &[u8] {
        let start = slot as usize * MAX_OUTPUT_LEN;
        &self.data[start..start + MAX_OUTPUT_LEN]
    }

    /// Overwrite the first `new.len()` bytes of the stripe for `slot`.
    pub fn update(&mut self, slot: u16, new: &[u8]) {
        let start = slot as usize * MAX_OUTPUT_LEN;
        let len = new.len().min(MAX_OUTPUT_LEN);
        self.data[start..start + len].copy_from_slice(&new[..len]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_zeroed() {
        let mirror = StateMirror::new();
        assert!(mirror.image(0).iter().all(|&b| b == 0));
        assert!(mirror.image(MAX_SLOTS - 1).iter().all(|&b| b == 0));
    }

    #[test]
    fn test_update_is_per_slot() {
        let mut mirror = StateMirror::new();
        mirror.update(3, &[0xAA, 0xBB]);

        assert_eq!(&mirror.image(3)[..2], &[0xAA, 0xBB]);
        assert_eq!(&mirror.image(2)[..2], &[0, 0]);
        assert_eq!(&mirror.image(4)[..2], &[0, 0]);
    }

    #[test]
    fn test_update_leaves_tail() {
        let mut mirror = StateMirror::new();
        mirror.update(1, &[1, 2, 3, 4]);
        mirror.update(1, &[9, 9]);

        assert_eq!(&mirror.image(1)[..4], &[9, 9, 3, 4]);
    }
}
