//! Shared test harness: a minimal object model plus small root helpers,
//! reused across the allocation/barrier/correctness/stress integration
//! tests so each file only has to describe the scenario, not the plumbing.

#![allow(dead_code)]

use fax_gc::{AllocPolicy, GarbageCollector, GcRoot, Value, WeakRefHolder};
use std::cell::RefCell;
use std::rc::Rc;

/// Every object under this model is a fixed-size cell of `Value` slots, no
/// finalizer, no extra native data. Enough to exercise allocation, tracing
/// and relocation without pulling in `fax-objects`' real class table.
pub struct CellModel {
    pub fields_per_object: usize,
}

impl fax_gc::gc::ObjectModel for CellModel {
    unsafe fn data_size(&self, _class_ptr: usize, _data_ptr: *const u8) -> usize {
        self.fields_per_object * std::mem::size_of::<Value>()
    }

    unsafe fn visit_fields(&self, _class_ptr: usize, data_ptr: *mut u8, visit: &mut dyn FnMut(&mut Value)) {
        let slots = data_ptr as *mut Value;
        for i in 0..self.fields_per_object {
            visit(&mut *slots.add(i));
        }
    }

    unsafe fn finalize(&self, _class_ptr: usize, _data_ptr: *mut u8) {}
}

/// Allocate one cell with `fields.len()` slots under `CellModel`, stamped
/// with `class_ptr` (an arbitrary 4-byte-aligned tag, not a real class).
pub fn alloc_cell(gc: &mut GarbageCollector<CellModel>, class_ptr: usize, fields: &[Value]) -> Value {
    let ptr = gc
        .alloc(class_ptr, fields.len() * std::mem::size_of::<Value>(), AllocPolicy::Auto)
        .expect("allocation must succeed");
    unsafe {
        let slots = ptr as *mut Value;
        for (i, v) in fields.iter().enumerate() {
            *slots.add(i) = *v;
        }
    }
    unsafe { Value::from_ptr(ptr) }
}

pub fn alloc_cell_with_policy(
    gc: &mut GarbageCollector<CellModel>,
    class_ptr: usize,
    fields: &[Value],
    policy: AllocPolicy,
) -> Value {
    let ptr = gc
        .alloc(class_ptr, fields.len() * std::mem::size_of::<Value>(), policy)
        .expect("allocation must succeed");
    unsafe {
        let slots = ptr as *mut Value;
        for (i, v) in fields.iter().enumerate() {
            *slots.add(i) = *v;
        }
    }
    unsafe { Value::from_ptr(ptr) }
}

/// Read back the `index`th field of a cell allocated by [`alloc_cell`].
///
/// # Safety
/// `cell` must be a live pointer value allocated under `CellModel` with at
/// least `index + 1` fields.
pub unsafe fn cell_field(cell: Value, index: usize) -> Value {
    *(cell.as_ptr() as *const Value).add(index)
}

/// A GC root backed by a `Vec<Value>` in a shared cell, so relocation during
/// a collection is visible to the test afterward without a second lookup
/// mechanism.
pub struct VecRoot(pub Rc<RefCell<Vec<Value>>>);

impl GcRoot for VecRoot {
    fn visit_values(&mut self, visit: &mut dyn FnMut(&mut Value)) {
        for v in self.0.borrow_mut().iter_mut() {
            visit(v);
        }
    }
}

/// Register `values` as a rooted vector and return the shared handle used to
/// read back (possibly relocated) values after a collection.
pub fn root_vec(gc: &mut GarbageCollector<CellModel>, values: Vec<Value>) -> Rc<RefCell<Vec<Value>>> {
    let storage = Rc::new(RefCell::new(values));
    gc.add_gc_root(Box::new(VecRoot(storage.clone())));
    storage
}

/// Allocate a bare object (no data beyond its header) directly on a [`Heap`]
/// and stamp its generation/big flags, bypassing `GarbageCollector`. Used
/// only by the barrier tests, which need to reach the private-to-the-
/// collector `BigSpace::take_flagged` bookkeeping that `write_barrier`
/// feeds — something application code never does directly.
///
/// # Safety
/// Caller must not treat the returned address as holding any real fields.
pub unsafe fn alloc_raw_with_header(
    heap: &mut fax_gc::heap::Heap,
    policy: AllocPolicy,
    is_old: bool,
    is_big: bool,
) -> usize {
    let (ptr, _) = heap.allocate(8, policy).unwrap();
    let header_ptr = fax_gc::object::header_of(ptr);
    let mut header = fax_gc::ObjectHeader::new(0x1000);
    header.set_old(is_old);
    if is_old {
        header.set_big(is_big);
    }
    std::ptr::write(header_ptr, header);
    ptr as usize
}

/// A weak-reference holder backed by a `Vec<Value>`, dropping entries the
/// collector reports as dead. Mirrors how `fax-objects`' symbol pool uses
/// the same trait, but over a plain vector instead of a hash map.
pub struct WeakVec(pub Rc<RefCell<Vec<Value>>>);

impl WeakRefHolder for WeakVec {
    fn visit_weak(&mut self, check_live: &mut dyn FnMut(Value) -> bool) {
        self.0.borrow_mut().retain(|v| check_live(*v));
    }
}
