//! Allocation invariants: every live allocation gets a unique, aligned
//! address within the space it was routed to, and routing honors the
//! requested policy and the configured big-object threshold.

mod common;

use common::{alloc_cell, CellModel};
use fax_gc::{AllocPolicy, GarbageCollector, GcConfig, OBJECT_ALIGNMENT};
use std::collections::HashSet;

fn gc(config: GcConfig) -> GarbageCollector<CellModel> {
    GarbageCollector::new(config, CellModel { fields_per_object: 1 }).unwrap()
}

#[test]
fn allocations_never_alias() {
    let mut gc = gc(GcConfig {
        new_space_size: 1 << 16,
        ..GcConfig::default()
    });

    let mut seen = HashSet::new();
    for _ in 0..500 {
        let v = alloc_cell(&mut gc, 0x1000, &[fax_gc::Value::NIL]);
        assert!(seen.insert(v.as_ptr() as usize), "allocator handed out a duplicate address");
    }
}

#[test]
fn new_space_allocations_are_aligned() {
    let mut gc = gc(GcConfig::default());
    for _ in 0..64 {
        let v = alloc_cell(&mut gc, 0x1000, &[fax_gc::Value::NIL]);
        assert_eq!(v.as_ptr() as usize % OBJECT_ALIGNMENT, 0);
    }
}

#[test]
fn new_space_bump_pointer_is_monotonic_within_a_half() {
    let mut gc = gc(GcConfig {
        new_space_size: 1 << 16,
        ..GcConfig::default()
    });
    let mut prev = 0usize;
    for _ in 0..32 {
        let v = alloc_cell(&mut gc, 0x1000, &[fax_gc::Value::NIL]);
        let addr = v.as_ptr() as usize;
        assert!(addr >= prev, "bump allocation must not move backward within a half");
        prev = addr;
    }
}

#[test]
fn survivor_policy_lands_in_old_space_immediately() {
    let mut gc = gc(GcConfig::default());
    let v = common::alloc_cell_with_policy(&mut gc, 0x1000, &[fax_gc::Value::NIL], AllocPolicy::Survivor);
    unsafe {
        assert!((*fax_gc::header_of(v.as_ptr())).is_old());
    }
}

#[test]
fn huge_policy_lands_in_big_space_regardless_of_size() {
    let mut gc = gc(GcConfig::default());
    let v = common::alloc_cell_with_policy(&mut gc, 0x1000, &[fax_gc::Value::NIL], AllocPolicy::Huge);
    assert_eq!(gc.heap().big_space.len(), 1);
    unsafe {
        assert!((*fax_gc::header_of(v.as_ptr())).is_old(), "big objects are tagged old");
        assert!((*fax_gc::header_of(v.as_ptr())).is_big());
    }
}

#[test]
fn size_at_or_above_threshold_routes_to_big_space_even_under_auto_policy() {
    let config = GcConfig {
        big_object_threshold: 64,
        ..GcConfig::default()
    };
    let mut gc = gc(config);
    let big_fields = vec![fax_gc::Value::NIL; 16]; // 16 * 8 bytes = 128 bytes, over threshold
    let v = common::alloc_cell_with_policy(&mut gc, 0x1000, &big_fields, AllocPolicy::Auto);
    assert_eq!(gc.heap().big_space.len(), 1);
    unsafe {
        assert!((*fax_gc::header_of(v.as_ptr())).is_big());
    }
}

#[test]
fn allocation_reports_bytes_used_growing_with_each_call() {
    let mut gc = gc(GcConfig::default());
    assert_eq!(gc.heap().new_space.used(), 0);
    alloc_cell(&mut gc, 0x1000, &[fax_gc::Value::NIL]);
    let after_one = gc.heap().new_space.used();
    assert!(after_one > 0);
    alloc_cell(&mut gc, 0x1000, &[fax_gc::Value::NIL]);
    assert!(gc.heap().new_space.used() > after_one);
}

#[test]
fn exhausted_new_space_falls_back_to_old_space_instead_of_failing() {
    // A tiny new space forces every allocation past the first couple to
    // spill into old space rather than return an error — `alloc()`'s
    // contract is that it never returns null/fails for a reasonably sized
    // request, per the collect-and-retry fallback in `GarbageCollector::alloc`.
    let config = GcConfig {
        new_space_size: 64,
        ..GcConfig::default()
    };
    let mut gc = gc(config);
    for _ in 0..50 {
        let v = alloc_cell(&mut gc, 0x1000, &[fax_gc::Value::NIL]);
        assert!(v.is_ptr());
    }
}
