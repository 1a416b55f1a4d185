//! Write barrier: recording old-to-young pointer writes.
//!
//! A generational collector's minor collection only scans new space plus
//! whatever old-space and big-space objects are flagged as holding young
//! references. For that to be sound, every store of a young pointer into
//! an old object has to mark the holder so a later minor collection finds
//! it: check the holder's generation, skip small ints, and record only
//! when the held value is actually a young heap pointer.

use crate::heap::Heap;
use crate::object::header_of;
use crate::value::Value;

/// Call after storing `new_val` into a field of the object at
/// `holder_addr` (its first data byte, just past its header).
///
/// No-op unless the holder is old (or big) and `new_val` is a non-smallint
/// pointer into new space — exactly the condition under which a minor
/// collection could otherwise miss a live young object.
///
/// # Safety
/// `holder_addr` must point at a live object's data region.
pub unsafe fn write_barrier(heap: &mut Heap, holder_addr: usize, new_val: Value) {
    if new_val.is_smallint() || new_val.is_nil() {
        return;
    }
    if !new_val.is_ptr() || !heap.is_young_addr(new_val.as_ptr() as usize) {
        return;
    }
    let header = &*header_of(holder_addr as *mut u8);
    if !header.is_old() {
        return;
    }
    if header.is_big() {
        heap.big_space.mark_contains_young(holder_addr);
    } else {
        heap.old_space.remember(holder_addr);
    }
}

/// Assert that `holder_addr`'s header reflects the generation the caller
/// believes it has. Used in tests and debug builds to catch a barrier
/// invoked with a stale generation flag.
///
/// # Safety
/// `holder_addr` must point at a live object's data region (just past its
/// header).
pub unsafe fn debug_assert_generation_matches(holder_addr: usize, expected_old: bool) {
    let header = &*header_of(holder_addr as *mut u8);
    debug_assert_eq!(header.is_old(), expected_old);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AllocPolicy, GcConfig};
    use crate::object::ObjectHeader;
    use std::ptr;

    unsafe fn alloc_with_header(heap: &mut Heap, policy: AllocPolicy, is_old: bool, is_big: bool) -> usize {
        let (ptr, _) = heap.allocate(8, policy).unwrap();
        let header_ptr = crate::object::header_of(ptr);
        let mut header = ObjectHeader::new(0x1000);
        header.set_old(is_old);
        if is_old {
            header.set_big(is_big);
        }
        ptr::write(header_ptr, header);
        ptr as usize
    }

    #[test]
    fn barrier_ignores_smallint_targets() {
        let mut heap = Heap::new(&GcConfig::default());
        let holder = unsafe { alloc_with_header(&mut heap, AllocPolicy::Survivor, true, false) };
        unsafe { write_barrier(&mut heap, holder, Value::from_smallint(5).unwrap()) };
        assert!(heap.old_space.chunks()[0].remembered_objects().is_empty());
    }

    #[test]
    fn barrier_ignores_young_holder() {
        let mut heap = Heap::new(&GcConfig::default());
        let holder = unsafe { alloc_with_header(&mut heap, AllocPolicy::Auto, false, false) };
        let target_ptr = heap.allocate(8, AllocPolicy::Auto).unwrap().0;
        let target = unsafe { Value::from_ptr(target_ptr) };
        unsafe { write_barrier(&mut heap, holder, target) };
        assert!(heap.old_space.chunks()[0].remembered_objects().is_empty());
    }

    #[test]
    fn barrier_records_old_to_young_pointer() {
        let mut heap = Heap::new(&GcConfig::default());
        let holder = unsafe { alloc_with_header(&mut heap, AllocPolicy::Survivor, true, false) };
        let target_ptr = heap.allocate(8, AllocPolicy::Auto).unwrap().0;
        let target = unsafe { Value::from_ptr(target_ptr) };
        unsafe { write_barrier(&mut heap, holder, target) };
        assert_eq!(heap.old_space.chunks()[0].remembered_objects(), vec![holder]);
    }

    #[test]
    fn barrier_flags_big_space_holder() {
        let mut heap = Heap::new(&GcConfig::default());
        let holder = unsafe { alloc_with_header(&mut heap, AllocPolicy::Huge, true, true) };
        let target_ptr = heap.allocate(8, AllocPolicy::Auto).unwrap().0;
        let target = unsafe { Value::from_ptr(target_ptr) };
        unsafe { write_barrier(&mut heap, holder, target) };
        assert_eq!(heap.big_space.take_flagged(), vec![holder]);
    }
}
