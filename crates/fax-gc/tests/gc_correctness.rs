//! GC correctness: unreachable objects are collected, reachable objects
//! (through roots, chains, and remembered old-space pointers) survive both
//! a minor and a full collection, and weak references are cleared exactly
//! for the entries that didn't survive.

mod common;

use common::{alloc_cell, alloc_cell_with_policy, root_vec, CellModel, WeakVec};
use fax_gc::{header_of, AllocPolicy, GarbageCollector, GcConfig, Value};
use std::cell::RefCell;
use std::rc::Rc;

fn gc(config: GcConfig) -> GarbageCollector<CellModel> {
    GarbageCollector::new(config, CellModel { fields_per_object: 1 }).unwrap()
}

#[test]
fn unreachable_objects_do_not_survive_a_minor_collection() {
    let config = GcConfig {
        new_space_size: 4096,
        ..GcConfig::default()
    };
    let mut gc = gc(config);

    let kept = alloc_cell(&mut gc, 0x1000, &[Value::NIL]);
    let root_storage = root_vec(&mut gc, vec![kept]);

    for _ in 0..50 {
        alloc_cell(&mut gc, 0x1000, &[Value::NIL]);
    }

    let used_before = gc.heap().new_space.used();
    gc.collect(false).unwrap();
    let used_after = gc.heap().new_space.used();

    assert!(used_after < used_before, "garbage must not be copied forward by a minor collection");
    assert!(root_storage.borrow()[0].is_ptr());
}

#[test]
fn a_chain_reachable_only_transitively_through_a_root_survives() {
    let mut gc = gc(GcConfig::default());
    let inner = alloc_cell(&mut gc, 0x1000, &[Value::NIL]);
    let middle = alloc_cell(&mut gc, 0x1000, &[inner]);
    let outer = alloc_cell(&mut gc, 0x1000, &[middle]);
    let root_storage = root_vec(&mut gc, vec![outer]);

    gc.collect(false).unwrap();

    unsafe {
        let outer_after = root_storage.borrow()[0];
        let middle_after = *(outer_after.as_ptr() as *const Value);
        assert!(middle_after.is_ptr());
        let inner_after = *(middle_after.as_ptr() as *const Value);
        assert!(inner_after.is_ptr(), "transitively reachable object must survive");
    }
}

#[test]
fn two_minor_collections_promote_a_survivor_to_old_space() {
    let config = GcConfig {
        promotion_age: 1,
        ..GcConfig::default()
    };
    let mut gc = gc(config);
    let kept = alloc_cell(&mut gc, 0x1000, &[Value::NIL]);
    let root_storage = root_vec(&mut gc, vec![kept]);

    gc.collect(false).unwrap();
    gc.collect(false).unwrap();

    unsafe {
        assert!((*header_of(root_storage.borrow()[0].as_ptr())).is_old());
    }
}

#[test]
fn full_gc_compacts_old_space_and_preserves_reachable_chains() {
    let config = GcConfig {
        promotion_age: 1,
        ..GcConfig::default()
    };
    let mut gc = gc(config);
    let a = alloc_cell(&mut gc, 0x1000, &[Value::NIL]);
    let b = alloc_cell(&mut gc, 0x1000, &[a]);
    let root_storage = root_vec(&mut gc, vec![b]);

    // promote both into old space
    gc.collect(false).unwrap();
    gc.collect(false).unwrap();

    // old-space garbage for compaction to reclaim
    for _ in 0..5 {
        alloc_cell_with_policy(&mut gc, 0x1000, &[Value::NIL], AllocPolicy::Survivor);
    }

    let old_used_before = gc.heap().old_space.used();
    gc.collect(true).unwrap();
    let old_used_after = gc.heap().old_space.used();

    assert!(old_used_after < old_used_before, "full GC must reclaim unreachable old-space garbage");

    unsafe {
        let b_after = root_storage.borrow()[0];
        assert!(b_after.is_ptr());
        let a_after = *(b_after.as_ptr() as *const Value);
        assert!(a_after.is_ptr(), "chain must survive full-gc compaction");
    }
}

#[test]
fn full_gc_sweeps_unreachable_big_space_objects() {
    let mut gc = gc(GcConfig::default());
    alloc_cell_with_policy(&mut gc, 0x1000, &[Value::NIL], AllocPolicy::Huge);
    let kept = alloc_cell_with_policy(&mut gc, 0x1000, &[Value::NIL], AllocPolicy::Huge);
    let root_storage = root_vec(&mut gc, vec![kept]);

    assert_eq!(gc.heap().big_space.len(), 2);
    gc.collect(true).unwrap();
    assert_eq!(gc.heap().big_space.len(), 1, "unrooted big object must be swept");
    assert!(root_storage.borrow()[0].is_ptr());
}

#[test]
fn weak_ref_holder_is_told_exactly_which_entries_died() {
    let mut gc = gc(GcConfig::default());

    let live = alloc_cell(&mut gc, 0x1000, &[Value::NIL]);
    let dead = alloc_cell(&mut gc, 0x1000, &[Value::NIL]);

    let root_storage = root_vec(&mut gc, vec![live]);
    let weak_storage = Rc::new(RefCell::new(vec![live, dead]));
    gc.add_weak_ref_holder(Box::new(WeakVec(weak_storage.clone())));

    gc.collect(false).unwrap();

    let remaining = weak_storage.borrow();
    assert_eq!(remaining.len(), 1, "only the rooted entry should remain after the weak pass");
    let root_after = root_storage.borrow()[0];
    assert_eq!(remaining[0].as_ptr(), root_after.as_ptr());
}

#[test]
fn gc_stats_report_one_cycle_per_collect_call() {
    let mut gc = gc(GcConfig::default());
    assert_eq!(gc.stats().cycles, 0);
    gc.collect(false).unwrap();
    assert_eq!(gc.stats().cycles, 1);
    gc.collect(true).unwrap();
    assert_eq!(gc.stats().cycles, 2);
}
