//! Symbol objects and the interning pool.
//!
//! A symbol is a byte string plus a cached hash, deduplicated by content:
//! two symbol objects with equal bytes are always pointer-identical. The
//! pool holds only *weak* references — it does not keep a symbol alive by
//! itself, relying on the GC's weak-ref visitor pass to drop pool entries
//! whose symbol object didn't survive a cycle.

use fax_gc::{GcError, Value, WeakRefHolder};
use rustc_hash::FxHashMap;

/// Native data region of a symbol object (`TypeTag::Symbol`). Holds its own
/// byte buffer rather than borrowing the pool's key so the object remains
/// self-contained once looked up.
pub struct SymbolData {
    pub bytes: Box<[u8]>,
    pub hash: u64,
}

impl SymbolData {
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn as_str(&self) -> Result<&str, std::str::Utf8Error> {
        std::str::from_utf8(&self.bytes)
    }
}

fn hash_bytes(bytes: &[u8]) -> u64 {
    use std::hash::{Hash, Hasher};
    let mut h = rustc_hash::FxHasher::default();
    bytes.hash(&mut h);
    h.finish()
}

/// Weak by-content deduplication table. `fax_objects::ObjectHeap::intern`
/// is the only way application code should mint a symbol: it consults this
/// pool first and only asks the GC for a fresh allocation on a miss.
#[derive(Default)]
pub struct SymbolPool {
    table: FxHashMap<Box<[u8]>, Value>,
}

impl SymbolPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(&self, bytes: &[u8]) -> Option<Value> {
        self.table.get(bytes).copied()
    }

    /// Record a freshly allocated symbol object under its bytes. Callers
    /// must have already checked [`Self::lookup`] returned `None`.
    pub fn insert(&mut self, bytes: Box<[u8]>, symbol: Value) {
        self.table.insert(bytes, symbol);
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

impl WeakRefHolder for SymbolPool {
    fn visit_weak(&mut self, check_live: &mut dyn FnMut(Value) -> bool) {
        self.table.retain(|_, v| check_live(*v));
    }
}

/// Compute the content hash used both to intern a symbol and to stamp its
/// `SymbolData::hash` field, so repeated lookups of a live symbol never
/// rehash its bytes.
pub fn compute_hash(bytes: &[u8]) -> u64 {
    hash_bytes(bytes)
}

pub type Result<T> = std::result::Result<T, GcError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_starts_empty() {
        let pool = SymbolPool::new();
        assert!(pool.is_empty());
        assert_eq!(pool.lookup(b"hi"), None);
    }

    #[test]
    fn insert_then_lookup_round_trips() {
        let mut pool = SymbolPool::new();
        let v = Value::from_smallint(1).unwrap();
        pool.insert(b"hi".to_vec().into_boxed_slice(), v);
        assert_eq!(pool.lookup(b"hi"), Some(v));
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn weak_visit_drops_dead_entries() {
        let mut pool = SymbolPool::new();
        let live = Value::from_smallint(1).unwrap();
        let dead = Value::from_smallint(2).unwrap();
        pool.insert(b"live".to_vec().into_boxed_slice(), live);
        pool.insert(b"dead".to_vec().into_boxed_slice(), dead);
        pool.visit_weak(&mut |v| v == live);
        assert_eq!(pool.lookup(b"live"), Some(live));
        assert_eq!(pool.lookup(b"dead"), None);
    }
}
