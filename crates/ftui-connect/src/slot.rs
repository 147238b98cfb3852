#![forbid(unsafe_code)]

//! Generational identity for bindings.
//!
//! Every binding is allocated a [`BindingId`] when it is constructed and
//! releases it at teardown. The scheduler keys pending work by this id
//! rather than by binding address, so a slot that is released and reused
//! never aliases the binding that held it before: the generation differs.

use std::fmt;

/// Handle identifying one binding for its lifetime.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct BindingId {
    idx: u32,
    generation: u32,
}

impl BindingId {
    /// Raw slot index (diagnostics only).
    #[inline]
    #[must_use]
    pub const fn index(self) -> u32 {
        self.idx
    }

    /// Generation counter of the slot at allocation time.
    #[inline]
    #[must_use]
    pub const fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Debug for BindingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BindingId({}@gen{})", self.idx, self.generation)
    }
}

impl fmt::Display for BindingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.idx, self.generation)
    }
}

/// Slot allocator with a free list and per-slot generations.
#[derive(Debug, Default)]
pub struct BindingSlots {
    generation: Vec<u32>,
    live: Vec<bool>,
    free_list: Vec<u32>,
}

impl BindingSlots {
    /// Create an empty allocator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh id, reusing a released slot when one is available.
    ///
    /// # Panics
    ///
    /// Panics if more than `u32::MAX` slots are live at once.
    pub fn allocate(&mut self) -> BindingId {
        let idx = if let Some(idx) = self.free_list.pop() {
            idx
        } else {
            let idx = u32::try_from(self.generation.len())
                .expect("binding slot count exceeds u32::MAX");
            self.generation.push(0);
            self.live.push(false);
            idx
        };
        self.live[idx as usize] = true;
        BindingId {
            idx,
            generation: self.generation[idx as usize],
        }
    }

    /// Release `id`. Returns `false` if it was already released or stale.
    pub fn release(&mut self, id: BindingId) -> bool {
        if !self.is_live(id) {
            return false;
        }
        let slot = id.idx as usize;
        self.live[slot] = false;
        // Bump generation so old handles immediately fail validation.
        self.generation[slot] = self.generation[slot].wrapping_add(1);
        self.free_list.push(id.idx);
        true
    }

    /// Whether `id` names a currently allocated slot.
    #[must_use]
    pub fn is_live(&self, id: BindingId) -> bool {
        let slot = id.idx as usize;
        slot < self.live.len() && self.live[slot] && self.generation[slot] == id.generation
    }

    /// Number of live ids.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.live.len() - self.free_list.len()
    }
}
