//! The heap: new space, old space and big space, plus the allocation
//! policy that routes a request to one of them.

pub mod big_space;
pub mod new_space;
pub mod old_space;

pub use big_space::BigSpace;
pub use new_space::NewSpace;
pub use old_space::OldSpace;

use crate::config::{AllocPolicy, GcConfig};
use crate::error::Result;

/// Owns the three spaces the memory manager allocates into.
pub struct Heap {
    pub new_space: NewSpace,
    pub old_space: OldSpace,
    pub big_space: BigSpace,
    big_object_threshold: usize,
}

impl Heap {
    pub fn new(config: &GcConfig) -> Self {
        Self {
            new_space: NewSpace::new(config.new_space_size),
            old_space: OldSpace::new(config.old_chunk_size, config.initial_old_chunks),
            big_space: BigSpace::new(),
            big_object_threshold: config.big_object_threshold,
        }
    }

    /// Route an allocation request to the space named by `policy`, honoring
    /// the big-object threshold regardless of what the caller asked for: an
    /// object too large for a semi-space or old-space chunk always goes to
    /// big space.
    pub fn allocate(&mut self, size: usize, policy: AllocPolicy) -> Result<(*mut u8, Space)> {
        if policy == AllocPolicy::Huge || size >= self.big_object_threshold {
            return Ok((self.big_space.alloc(size), Space::Big));
        }
        match policy {
            AllocPolicy::Survivor => {
                let p = self.old_space.try_alloc(size)?;
                Ok((p, Space::Old))
            }
            AllocPolicy::Auto | AllocPolicy::Huge => {
                match self.new_space.try_alloc(size) {
                    Ok(p) => Ok((p, Space::New)),
                    Err(_) => {
                        let p = self.old_space.try_alloc(size)?;
                        Ok((p, Space::Old))
                    }
                }
            }
        }
    }

    pub fn big_object_threshold(&self) -> usize {
        self.big_object_threshold
    }

    /// Whether `addr` currently falls within the (active) new-space range.
    pub fn is_young_addr(&self, addr: usize) -> bool {
        self.new_space.contains(addr)
    }

    pub fn stats(&self) -> HeapStats {
        HeapStats {
            new_used: self.new_space.used(),
            new_capacity: self.new_space.capacity(),
            old_used: self.old_space.used(),
            old_capacity: self.old_space.capacity(),
            big_objects: self.big_space.len(),
            big_used: self.big_space.used(),
        }
    }
}

/// Which space an allocated object ended up in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Space {
    New,
    Old,
    Big,
}

/// A snapshot of heap occupancy, logged once per GC cycle.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeapStats {
    pub new_used: usize,
    pub new_capacity: usize,
    pub old_used: usize,
    pub old_capacity: usize,
    pub big_objects: usize,
    pub big_used: usize,
}
