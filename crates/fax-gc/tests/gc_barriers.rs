//! Write barrier correctness: recording an old-to-young pointer store so a
//! minor collection that never re-scans old space still finds the young
//! object it reaches.

mod common;

use common::{alloc_cell, alloc_cell_with_policy, root_vec, CellModel};
use fax_gc::{header_of, AllocPolicy, GarbageCollector, GcConfig, Value};

fn gc(config: GcConfig) -> GarbageCollector<CellModel> {
    GarbageCollector::new(config, CellModel { fields_per_object: 1 }).unwrap()
}

#[test]
fn barrier_ignores_smallint_and_nil_targets() {
    let mut gc = gc(GcConfig::default());
    let holder = alloc_cell_with_policy(&mut gc, 0x1000, &[Value::NIL], AllocPolicy::Survivor);
    unsafe {
        gc.write_barrier(holder.as_ptr() as usize, Value::from_smallint(5).unwrap());
        gc.write_barrier(holder.as_ptr() as usize, Value::NIL);
    }
    assert!(gc.heap().old_space.chunks()[0].remembered_objects().is_empty());
}

#[test]
fn barrier_ignores_young_holder() {
    let mut gc = gc(GcConfig::default());
    let holder = alloc_cell(&mut gc, 0x1000, &[Value::NIL]);
    let target = alloc_cell(&mut gc, 0x1000, &[Value::NIL]);
    unsafe {
        gc.write_barrier(holder.as_ptr() as usize, target);
    }
    assert!(gc.heap().old_space.chunks()[0].remembered_objects().is_empty());
}

#[test]
fn barrier_records_old_to_young_pointer() {
    let mut gc = gc(GcConfig::default());
    let holder = alloc_cell_with_policy(&mut gc, 0x1000, &[Value::NIL], AllocPolicy::Survivor);
    let target = alloc_cell(&mut gc, 0x1000, &[Value::NIL]);
    unsafe {
        gc.write_barrier(holder.as_ptr() as usize, target);
    }
    assert_eq!(
        gc.heap().old_space.chunks()[0].remembered_objects(),
        vec![holder.as_ptr() as usize]
    );
}

#[test]
fn barrier_flags_big_space_holder() {
    let mut heap = fax_gc::heap::Heap::new(&GcConfig::default());
    let holder = unsafe { common::alloc_raw_with_header(&mut heap, AllocPolicy::Huge, true, true) };
    let target_ptr = heap.allocate(8, AllocPolicy::Auto).unwrap().0;
    let target = unsafe { Value::from_ptr(target_ptr) };
    unsafe {
        fax_gc::barrier::write_barrier(&mut heap, holder, target);
    }
    assert_eq!(heap.big_space.take_flagged(), vec![holder]);
}

#[test]
fn remembered_old_object_keeps_its_only_young_reference_alive_across_a_minor_collection() {
    let config = GcConfig {
        new_space_size: 4096,
        ..GcConfig::default()
    };
    let mut gc = gc(config);

    // An old-space holder is the VM's long-lived state (e.g. a module
    // global table entry); nothing roots the young object it points to
    // directly, only the holder itself is rooted.
    let holder = alloc_cell_with_policy(&mut gc, 0x1000, &[Value::NIL], AllocPolicy::Survivor);
    let root_storage = root_vec(&mut gc, vec![holder]);

    let young = alloc_cell(&mut gc, 0x2000, &[Value::NIL]);
    unsafe {
        *(holder.as_ptr() as *mut Value) = young;
        gc.write_barrier(holder.as_ptr() as usize, young);
    }

    // Unrooted garbage to make the minor collection do real work.
    for _ in 0..20 {
        alloc_cell(&mut gc, 0x1000, &[Value::NIL]);
    }

    gc.collect(false).unwrap();

    let holder_after = root_storage.borrow()[0];
    unsafe {
        let young_after = *(holder_after.as_ptr() as *const Value);
        assert!(young_after.is_ptr(), "young object reachable only via the remembered set must survive");
        assert_eq!((*header_of(young_after.as_ptr())).class_ptr(), 0x2000);
    }
}
