//! Copying and forwarding: the piece of a collection that actually moves
//! object bytes and fixes up pointers to the new location.

use crate::object::{header_of, ObjectHeader, HEADER_SIZE};
use crate::value::Value;
use std::ptr;

/// Copy the header + data of the object at `from` (pointing at its data
/// region) to `to` (also a data-region pointer, already allocated with
/// room for `total_size - HEADER_SIZE` bytes of data), and record a
/// forwarding pointer at `from` so any other reference to this object can
/// be redirected.
///
/// `total_size` is header-inclusive.
///
/// # Safety
/// `from` must point at a live, non-forwarded object of exactly
/// `total_size` bytes (header included); `to` must point at fresh,
/// unaliased storage of at least that size.
pub unsafe fn copy_object(from: *mut u8, to: *mut u8, total_size: usize) {
    let from_header = header_of(from);
    let to_header = to.offset(-(HEADER_SIZE as isize)) as *mut ObjectHeader;
    ptr::copy_nonoverlapping(
        from_header as *const u8,
        to_header as *mut u8,
        total_size,
    );
    (*from_header).set_forwarding_ptr(to as usize);
}

/// If `val` points at an object that has already been forwarded this
/// cycle, return the forwarded value; otherwise return `val` unchanged.
/// Small ints and nil are returned unchanged without inspecting any
/// header.
///
/// # Safety
/// If `val.is_ptr()`, it must point at a live object's data region.
pub unsafe fn resolve_forwarding(val: Value) -> Value {
    if !val.is_ptr() {
        return val;
    }
    let header = &*header_of(val.as_ptr());
    match header.forwarding_ptr() {
        Some(new_addr) => Value::from_ptr(new_addr as *mut u8),
        None => val,
    }
}
