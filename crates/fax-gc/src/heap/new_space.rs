//! New space: a copying semi-space pair for young objects.
//!
//! Allocation is a bump pointer into the active half. A minor collection
//! copies live objects into the inactive half and then swaps which half is
//! active, the standard Cheney-style semi-space scheme.

use crate::error::{GcError, Result};
use crate::object::OBJECT_ALIGNMENT;

fn align_up(n: usize, align: usize) -> usize {
    (n + align - 1) & !(align - 1)
}

/// One half of the semi-space pair.
struct SemiSpace {
    buf: Vec<u8>,
    top: usize,
}

impl SemiSpace {
    fn new(size: usize) -> Self {
        Self {
            buf: vec![0u8; size],
            top: 0,
        }
    }

    fn reset(&mut self) {
        self.top = 0;
    }

    fn capacity(&self) -> usize {
        self.buf.len()
    }

    fn try_alloc(&mut self, size: usize) -> Option<*mut u8> {
        let aligned = align_up(size, OBJECT_ALIGNMENT);
        if self.top + aligned > self.buf.len() {
            return None;
        }
        let ptr = unsafe { self.buf.as_mut_ptr().add(self.top) };
        self.top += aligned;
        Some(ptr)
    }
}

/// The young generation: two equally-sized semi-spaces, one active
/// ("from-space") and one reserved for the next collection's copy target
/// ("to-space").
pub struct NewSpace {
    spaces: [SemiSpace; 2],
    active: usize,
}

impl NewSpace {
    pub fn new(size: usize) -> Self {
        Self {
            spaces: [SemiSpace::new(size), SemiSpace::new(size)],
            active: 0,
        }
    }

    /// Bump-allocate `size` bytes from the active (from-) space.
    pub fn try_alloc(&mut self, size: usize) -> Result<*mut u8> {
        self.spaces[self.active].try_alloc(size).ok_or(GcError::OutOfMemory {
            requested: size,
            available: self.spaces[self.active].capacity() - self.spaces[self.active].top,
        })
    }

    /// Bump-allocate into the to-space during relocation. Used by the
    /// collector while copying survivors out of from-space.
    pub fn try_alloc_to_space(&mut self, size: usize) -> Result<*mut u8> {
        let to = 1 - self.active;
        self.spaces[to].try_alloc(size).ok_or(GcError::OutOfMemory {
            requested: size,
            available: self.spaces[to].capacity() - self.spaces[to].top,
        })
    }

    /// Flip active/inactive halves after a minor collection has copied all
    /// survivors into to-space, and reset from-space (now unused) for reuse
    /// as the next cycle's to-space.
    pub fn flip(&mut self) {
        let old_active = self.active;
        self.active = 1 - self.active;
        self.spaces[old_active].reset();
    }

    pub fn used(&self) -> usize {
        self.spaces[self.active].top
    }

    /// Base address and live-data extent of the active (from-) space, used
    /// by full GC to walk live objects header-to-header.
    pub fn active_base_addr(&self) -> usize {
        self.spaces[self.active].buf.as_ptr() as usize
    }

    pub fn active_top(&self) -> usize {
        self.spaces[self.active].top
    }

    /// Base address and live-data extent of the to-space (inactive) half,
    /// used by full GC to walk the objects it just relocated there, before
    /// the post-collection flip makes this half active.
    pub fn inactive_base_addr(&self) -> usize {
        self.spaces[1 - self.active].buf.as_ptr() as usize
    }

    pub fn inactive_top(&self) -> usize {
        self.spaces[1 - self.active].top
    }

    pub fn capacity(&self) -> usize {
        self.spaces[self.active].capacity()
    }

    /// Whether `addr` currently falls within the active (from-space) range,
    /// i.e. is a live young object that hasn't been relocated yet this
    /// cycle.
    pub fn contains(&self, addr: usize) -> bool {
        let base = self.spaces[self.active].buf.as_ptr() as usize;
        addr >= base && addr < base + self.spaces[self.active].buf.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bump_alloc_advances_and_exhausts() {
        let mut ns = NewSpace::new(64);
        let first = ns.try_alloc(16).unwrap();
        let second = ns.try_alloc(16).unwrap();
        assert_ne!(first, second);
        assert_eq!(ns.used(), 32);
        assert!(ns.try_alloc(64).is_err());
    }

    #[test]
    fn flip_resets_from_space() {
        let mut ns = NewSpace::new(64);
        ns.try_alloc(16).unwrap();
        ns.try_alloc_to_space(16).unwrap();
        ns.flip();
        assert_eq!(ns.used(), 16, "new active space is the old to-space");
    }
}
