//! Root registration and the mark phase.
//!
//! A "root" is anything outside the heap that can hold live `Value`s: the
//! VM's global table, the operand stack, a pinned native handle. Roots
//! register a visitor closure once; the collector calls it once per cycle
//! and the closure calls back into the collector for each `Value` slot it
//! owns.
//!
//! A C-style collector might thread an explicit mode (mark-young,
//! mark-everything, or move) through every visit callback so one generic
//! tracing function can do all three depending on the caller's mode. Here
//! the collector itself already knows whether it is running a minor or
//! full cycle, so roots only need to report "here is a `Value` I hold" —
//! the collector decides what tracing that value requires. One fewer thing
//! for every root implementation to get right.

use crate::value::Value;

/// Identifies a registered root so it can later be unregistered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RootId(pub usize);

/// A root: visits every `Value` slot it directly owns, calling `visit` once
/// per slot. `visit` may mutate the slot in place — the collector uses this
/// during relocation to rewrite a root's pointer to an object that moved.
pub trait GcRoot {
    fn visit_values(&mut self, visit: &mut dyn FnMut(&mut Value));
}

/// Wraps a plain closure as a [`GcRoot`], for roots that don't warrant their
/// own type (ad hoc pinned handles).
pub struct ClosureRoot<F>(pub F)
where
    F: FnMut(&mut dyn FnMut(&mut Value));

impl<F> GcRoot for ClosureRoot<F>
where
    F: FnMut(&mut dyn FnMut(&mut Value)),
{
    fn visit_values(&mut self, visit: &mut dyn FnMut(&mut Value)) {
        (self.0)(visit)
    }
}

/// The registry of GC roots. Owned by the collector; the embedding API
/// exposes `add_gc_root`/`remove_gc_root` over this.
#[derive(Default)]
pub struct RootSet {
    next_id: usize,
    roots: Vec<(RootId, Box<dyn GcRoot>)>,
}

impl RootSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, root: Box<dyn GcRoot>) -> RootId {
        let id = RootId(self.next_id);
        self.next_id += 1;
        self.roots.push((id, root));
        id
    }

    /// Removes the root with the given id. Returns `false` if no such root
    /// was registered (the id was never issued, or already removed).
    pub fn remove(&mut self, id: RootId) -> bool {
        let before = self.roots.len();
        self.roots.retain(|(rid, _)| *rid != id);
        self.roots.len() != before
    }

    pub fn visit_all(&mut self, mut visit: impl FnMut(&mut Value)) {
        for (_, root) in self.roots.iter_mut() {
            root.visit_values(&mut visit);
        }
    }

    pub fn len(&self) -> usize {
        self.roots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }
}

/// A weak reference container: holds `Value`s the GC must clear to `nil`
/// (rather than keep alive) once their target is unreachable. The symbol
/// pool is the prototypical user of this.
pub trait WeakRefHolder {
    /// Visit every weakly-held slot. `finalize` tells the holder whether
    /// the slot's target survived this cycle; if not, the holder must drop
    /// or clear its own bookkeeping for that entry (e.g. remove the symbol
    /// pool's name -> value mapping).
    fn visit_weak(&mut self, check_live: &mut dyn FnMut(Value) -> bool);
}
