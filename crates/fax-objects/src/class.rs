//! Class objects.
//!
//! A class holds the attribute/method name map, the method table, and the
//! inheritance link. A generational-heap design that stores classes as
//! ordinary objects has to solve a "class of the class-of-classes"
//! bootstrap problem by deferring the self-pointer write until
//! `basic_field_count` is known.
//!
//! Here classes live in a separate, stable arena ([`ClassTable`]) instead:
//! `fax_gc`'s full GC compacts old space, and a compacting move has no way
//! to fix up the *raw* `class_ptr` word stashed in every other object's
//! header (it isn't a `Value`, so it's invisible to `visit_fields`). Pinning
//! classes outside the three managed spaces sidesteps that without
//! special-casing the collector, and as a side effect removes the need for
//! the self-referential bootstrap entirely: a [`Class`] struct is plain
//! metadata, not a heap object that is an instance of itself. Script code
//! that wants to hold a class as a first-class value gets a tiny
//! [`crate::types::class_handle::ClassHandleObj`] heap wrapper instead.

use fax_gc::Value;
use indexmap::IndexMap;

/// Distinguishes the native data layout backing an instance of a class, so
/// the shared [`fax_gc::gc::ObjectModel`] impl in [`crate::model`] knows how
/// to size and scan it. Every built-in type gets one tag; user-defined
/// classes (declared purely in terms of attributes) use [`TypeTag::Instance`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeTag {
    /// A plain user-defined instance: `basic_field_count` (or, if
    /// `has_extended_region`, a runtime-determined count) `Value` slots
    /// laid out directly after the header.
    Instance,
    Bool,
    BoxedInt,
    BoxedFloat,
    Symbol,
    String,
    Tuple,
    Array,
    Map,
    Set,
    Function,
    NativeFunction,
    Module,
    Exception,
    ClassHandle,
}

/// Result of a combined attribute/method name lookup (spec: "two-directional
/// encoding... answers both 'where is attribute X' and 'where is method Y'
/// in one lookup", here as an enum instead of the C original's signed-index
/// trick — see `SPEC_FULL.md` §4.B/C).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    Attribute(usize),
    Method(usize),
    Missing,
}

enum MapEntry {
    Attribute(usize),
    Method(usize),
}

/// A native finalizer hook, run just before an instance of a native class
/// is reclaimed. Takes the object's raw data pointer (just past its
/// header); the same signature the shared `ObjectModel` finalize callback
/// uses.
pub type NativeFinalizer = unsafe fn(*mut u8);

/// A native field visitor hook for classes with native (non-`Value`)
/// fields that nonetheless hold references the GC must trace through some
/// other means (e.g. a boxed native handle table). Most built-in classes
/// don't need one; [`crate::model`] calls the built-in per-`TypeTag`
/// visitor directly instead of going through this indirection.
pub type NativeVisitor = unsafe fn(*mut u8, &mut dyn FnMut(&mut Value));

/// A class: attribute/method name resolution, inheritance, and (for
/// built-in types) the native layout tag. See module docs for why this is
/// not itself a GC heap object.
pub struct Class {
    pub name: Option<Box<str>>,
    pub super_class: Option<usize>,
    pub basic_field_count: usize,
    pub native_field_count: usize,
    pub has_extended_region: bool,
    pub kind: TypeTag,
    pub finalizer: Option<NativeFinalizer>,
    pub native_visitor: Option<NativeVisitor>,
    names: IndexMap<Box<str>, MapEntry>,
    method_table: Vec<Value>,
    static_map: IndexMap<Box<str>, Value>,
}

impl Class {
    pub fn new(kind: TypeTag) -> Self {
        Self {
            name: None,
            super_class: None,
            basic_field_count: 0,
            native_field_count: 0,
            has_extended_region: false,
            kind,
            finalizer: None,
            native_visitor: None,
            names: IndexMap::new(),
            method_table: Vec::new(),
            static_map: IndexMap::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<Box<str>>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_super(mut self, super_class: usize) -> Self {
        self.super_class = Some(super_class);
        self
    }

    pub fn with_basic_fields(mut self, count: usize) -> Self {
        self.basic_field_count = count;
        self
    }

    pub fn with_extended_region(mut self, yes: bool) -> Self {
        self.has_extended_region = yes;
        self
    }

    /// Declare `name` as attribute index `index`.
    pub fn add_attribute(&mut self, name: impl Into<Box<str>>, index: usize) {
        self.names.insert(name.into(), MapEntry::Attribute(index));
    }

    /// Add a method to the table, returning its slot index. If `name` is
    /// already in the method table, replaces it in place.
    pub fn add_method(&mut self, name: impl Into<Box<str>>, callable: Value) -> usize {
        let name = name.into();
        if let Some(MapEntry::Method(idx)) = self.names.get(&name) {
            let idx = *idx;
            self.method_table[idx] = callable;
            return idx;
        }
        let idx = self.method_table.len();
        self.method_table.push(callable);
        self.names.insert(name, MapEntry::Method(idx));
        idx
    }

    /// Inherit every method from `super_class` that this class does not
    /// already define itself: method lookup in a derived class sees the
    /// super-class's methods by inclusion at construction time.
    pub fn inherit_methods_from(&mut self, super_class: &Class) {
        for (name, entry) in super_class.names.iter() {
            if let MapEntry::Method(super_idx) = entry {
                if !self.names.contains_key(name) {
                    let callable = super_class.method_table[*super_idx];
                    self.add_method(name.clone(), callable);
                }
            }
        }
    }

    pub fn find(&self, name: &str) -> Slot {
        match self.names.get(name) {
            Some(MapEntry::Attribute(i)) => Slot::Attribute(*i),
            Some(MapEntry::Method(i)) => Slot::Method(*i),
            None => Slot::Missing,
        }
    }

    pub fn method_at(&self, index: usize) -> Option<Value> {
        self.method_table.get(index).copied()
    }

    pub fn set_method_at(&mut self, index: usize, callable: Value) -> bool {
        match self.method_table.get_mut(index) {
            Some(slot) => {
                *slot = callable;
                true
            }
            None => false,
        }
    }

    pub fn get_static(&self, name: &str) -> Option<Value> {
        self.static_map.get(name).copied()
    }

    pub fn set_static(&mut self, name: impl Into<Box<str>>, value: Value) {
        self.static_map.insert(name.into(), value);
    }

    /// Every GC-traceable `Value` a class holds directly: its method table
    /// and static attribute values. Called by [`ClassTable`]'s `GcRoot`
    /// impl, since these are the only pointers a pinned class holds into
    /// the managed heap.
    fn visit_values(&mut self, visit: &mut dyn FnMut(&mut Value)) {
        for v in self.method_table.iter_mut() {
            visit(v);
        }
        for v in self.static_map.values_mut() {
            visit(v);
        }
    }
}

/// Owns every [`Class`] in the VM, keyed by a stable address (`class_ptr`)
/// handed out to object headers. Classes are allocated in `Box`es so their
/// address never changes even as the table's own `Vec` grows.
pub struct ClassTable {
    classes: Vec<Box<Class>>,
}

impl ClassTable {
    pub fn new() -> Self {
        Self { classes: Vec::new() }
    }

    /// Register `class`, returning the stable `class_ptr` other objects'
    /// headers should store.
    pub fn register(&mut self, class: Class) -> usize {
        let boxed = Box::new(class);
        let ptr = boxed.as_ref() as *const Class as usize;
        self.classes.push(boxed);
        ptr
    }

    /// # Safety
    /// `class_ptr` must be a value previously returned by [`Self::register`]
    /// on this table, and still registered.
    pub unsafe fn get(&self, class_ptr: usize) -> &Class {
        &*(class_ptr as *const Class)
    }

    /// # Safety
    /// See [`Self::get`].
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn get_mut(&self, class_ptr: usize) -> &mut Class {
        &mut *(class_ptr as *mut Class)
    }

    pub fn find_by_name(&self, name: &str) -> Option<usize> {
        self.classes
            .iter()
            .find(|c| c.name.as_deref() == Some(name))
            .map(|c| c.as_ref() as *const Class as usize)
    }

    /// Walk from `class_ptr` up the inheritance chain looking for `name`:
    /// method lookup sees the super-class's methods by inclusion at
    /// construction time, which this also serves as a fallback for —
    /// attributes declared only on a super class.
    ///
    /// # Safety
    /// `class_ptr` must be registered in this table.
    pub unsafe fn find_in_chain(&self, class_ptr: usize, name: &str) -> Slot {
        let mut cur = Some(class_ptr);
        while let Some(ptr) = cur {
            let class = self.get(ptr);
            match class.find(name) {
                Slot::Missing => cur = class.super_class,
                found => return found,
            }
        }
        Slot::Missing
    }

    /// Whether `derived` is `base` or a (transitive) subclass of it.
    ///
    /// # Safety
    /// Both pointers must be registered in this table.
    pub unsafe fn is_base_of(&self, base: usize, derived: usize) -> bool {
        let mut cur = Some(derived);
        while let Some(ptr) = cur {
            if ptr == base {
                return true;
            }
            cur = self.get(ptr).super_class;
        }
        false
    }
}

impl Default for ClassTable {
    fn default() -> Self {
        Self::new()
    }
}

impl fax_gc::GcRoot for ClassTable {
    fn visit_values(&mut self, visit: &mut dyn FnMut(&mut Value)) {
        for class in self.classes.iter_mut() {
            class.visit_values(visit);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attribute_and_method_share_one_map_without_collision() {
        let mut class = Class::new(TypeTag::Instance).with_basic_fields(2);
        class.add_attribute("x", 0);
        class.add_attribute("y", 1);
        let idx = class.add_method("speak", Value::from_smallint(7).unwrap());
        assert_eq!(idx, 0);
        assert_eq!(class.find("x"), Slot::Attribute(0));
        assert_eq!(class.find("y"), Slot::Attribute(1));
        assert_eq!(class.find("speak"), Slot::Method(0));
        assert_eq!(class.find("nope"), Slot::Missing);
    }

    #[test]
    fn inherited_methods_are_visible_but_overridable() {
        let mut base = Class::new(TypeTag::Instance);
        base.add_method("greet", Value::from_smallint(1).unwrap());

        let mut derived = Class::new(TypeTag::Instance);
        derived.inherit_methods_from(&base);
        assert_eq!(derived.find("greet"), Slot::Method(0));

        let idx = derived.add_method("greet", Value::from_smallint(2).unwrap());
        assert_eq!(idx, 0, "overriding must reuse the inherited slot");
        assert_eq!(derived.method_at(0), Value::from_smallint(2));
    }

    #[test]
    fn class_table_hands_out_stable_addresses() {
        let mut table = ClassTable::new();
        let a = table.register(Class::new(TypeTag::Instance).with_name("A"));
        let b = table.register(Class::new(TypeTag::Instance).with_name("B").with_super(a));
        unsafe {
            assert!(table.is_base_of(a, b));
            assert!(!table.is_base_of(b, a));
            assert_eq!(table.get(a).name.as_deref(), Some("A"));
        }
    }

    #[test]
    fn find_in_chain_walks_to_super() {
        let mut table = ClassTable::new();
        let mut base = Class::new(TypeTag::Instance);
        base.add_attribute("shared", 0);
        let base_ptr = table.register(base);
        let derived_ptr = table.register(Class::new(TypeTag::Instance).with_super(base_ptr));
        unsafe {
            assert_eq!(table.find_in_chain(derived_ptr, "shared"), Slot::Attribute(0));
            assert_eq!(table.find_in_chain(derived_ptr, "absent"), Slot::Missing);
        }
    }
}
