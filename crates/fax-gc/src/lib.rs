//! fax-gc — the Fax VM's memory manager.
//!
//! This crate owns the whole memory manager: the tagged-pointer [`value::Value`] representation, the two-word
//! [`object::header::ObjectHeader`] every heap object carries, the three
//! managed spaces (new/old/big, see [`heap`]), the write barrier
//! ([`barrier`]), root/weak-ref registration ([`marker`]), and the
//! copying/compacting machinery ([`relocate`]) that [`gc::GarbageCollector`]
//! drives through a fast (young-only) or full collection.
//!
//! It knows nothing about classes, strings, or bytecode — those live in
//! `fax-objects` and `fax-vm`, which allocate through [`gc::GarbageCollector`]
//! and register their own roots and weak-ref holders.

pub mod barrier;
pub mod config;
pub mod error;
pub mod gc;
pub mod heap;
pub mod marker;
pub mod object;
pub mod relocate;
pub mod value;

pub use config::{AllocPolicy, GcConfig};
pub use error::{GcError, Result};
pub use gc::{GarbageCollector, GcStats};
pub use marker::{ClosureRoot, GcRoot, RootId, WeakRefHolder};
pub use object::{header_of, ObjectHeader, HEADER_SIZE, OBJECT_ALIGNMENT};
pub use value::Value;
