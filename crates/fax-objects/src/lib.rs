//! fax-objects — the Fax VM's object model, layered directly on `fax-gc`.
//!
//! Defines what a "class" and an "object" are in terms `fax_gc::gc::ObjectModel`
//! understands ([`model`]), the pinned class table inheritance walks go
//! through instead of a self-referential heap object ([`class`]), the
//! weak-by-content symbol pool ([`symbol`]), every built-in type's native
//! data region ([`types`]), and [`heap::ObjectHeap`], the one handle
//! `fax-vm` allocates and reads objects through.
//!
//! Knows nothing about bytecode, call frames, or modules as *execution*
//! concepts — those live in `fax-vm`, which treats a [`heap::ObjectHeap`] as
//! its object layer and a [`class::ClassTable`] class pointer as an opaque
//! type tag.

pub mod class;
pub mod error;
pub mod heap;
pub mod model;
pub mod symbol;
pub mod types;

pub use class::{Class, ClassTable, Slot, TypeTag};
pub use error::{ObjectError, Result};
pub use heap::{BuiltinClasses, ObjectHeap};
pub use model::FaxObjectModel;
pub use symbol::{SymbolData, SymbolPool};
