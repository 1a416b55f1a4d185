//! Wires the object layer into `fax_gc::gc::ObjectModel`.
//!
//! This is the one place that knows how every [`TypeTag`] maps to a native
//! Rust data region, so the collector can size, scan, and finalize
//! objects it otherwise treats as opaque bytes. Classes live in a pinned
//! table (see `class` module docs) addressed directly by `class_ptr`, so
//! this struct carries no state of its own.

use crate::class::{Class, TypeTag};
use crate::types::*;
use fax_gc::gc::ObjectModel;
use fax_gc::Value;
use std::mem::size_of;

/// Zero-sized glue between `fax_gc::GarbageCollector` and the object
/// layer's native data regions.
#[derive(Default, Clone, Copy)]
pub struct FaxObjectModel;

impl FaxObjectModel {
    pub fn new() -> Self {
        Self
    }
}

unsafe fn instance_field_count(class: &Class, data_ptr: *const u8) -> usize {
    if class.has_extended_region {
        let len_slot = *(data_ptr as *const Value);
        debug_assert!(len_slot.is_smallint());
        class.basic_field_count + len_slot.as_smallint() as usize
    } else {
        class.basic_field_count
    }
}

impl ObjectModel for FaxObjectModel {
    unsafe fn data_size(&self, class_ptr: usize, data_ptr: *const u8) -> usize {
        let class = &*(class_ptr as *const Class);
        match class.kind {
            TypeTag::Instance => instance_field_count(class, data_ptr) * size_of::<Value>(),
            TypeTag::Bool => 0,
            TypeTag::BoxedInt => size_of::<BoxedIntData>(),
            TypeTag::BoxedFloat => size_of::<BoxedFloatData>(),
            TypeTag::Symbol => size_of::<crate::symbol::SymbolData>(),
            TypeTag::String => size_of::<StringData>(),
            TypeTag::Tuple => size_of::<TupleData>(),
            TypeTag::Array => size_of::<ArrayData>(),
            TypeTag::Map => size_of::<MapData>(),
            TypeTag::Set => size_of::<SetData>(),
            TypeTag::Function => size_of::<FunctionData>(),
            TypeTag::NativeFunction => size_of::<NativeFunctionData>(),
            TypeTag::Module => size_of::<ModuleData>(),
            TypeTag::Exception => size_of::<ExceptionData>(),
            TypeTag::ClassHandle => size_of::<ClassHandleData>(),
        }
    }

    unsafe fn visit_fields(&self, class_ptr: usize, data_ptr: *mut u8, visit: &mut dyn FnMut(&mut Value)) {
        let class = &*(class_ptr as *const Class);
        match class.kind {
            TypeTag::Instance => {
                let count = instance_field_count(class, data_ptr);
                let slots = data_ptr as *mut Value;
                for i in 0..count {
                    visit(&mut *slots.add(i));
                }
            }
            TypeTag::Bool | TypeTag::BoxedInt | TypeTag::BoxedFloat | TypeTag::ClassHandle => {}
            TypeTag::Symbol => {}
            TypeTag::String => (&mut *(data_ptr as *mut StringData)).visit_fields(visit),
            TypeTag::Tuple => (&mut *(data_ptr as *mut TupleData)).visit_fields(visit),
            TypeTag::Array => (&mut *(data_ptr as *mut ArrayData)).visit_fields(visit),
            TypeTag::Map => (&mut *(data_ptr as *mut MapData)).visit_fields(visit),
            TypeTag::Set => (&mut *(data_ptr as *mut SetData)).visit_fields(visit),
            TypeTag::Function => (&mut *(data_ptr as *mut FunctionData)).visit_fields(visit),
            TypeTag::NativeFunction => (&mut *(data_ptr as *mut NativeFunctionData)).visit_fields(visit),
            TypeTag::Module => (&mut *(data_ptr as *mut ModuleData)).visit_fields(visit),
            TypeTag::Exception => (&mut *(data_ptr as *mut ExceptionData)).visit_fields(visit),
        }
        if let Some(visitor) = class.native_visitor {
            visitor(data_ptr, visit);
        }
    }

    unsafe fn finalize(&self, class_ptr: usize, data_ptr: *mut u8) {
        let class = &*(class_ptr as *const Class);
        match class.kind {
            TypeTag::Instance | TypeTag::Bool | TypeTag::BoxedInt | TypeTag::BoxedFloat | TypeTag::ClassHandle => {}
            TypeTag::Symbol => std::ptr::drop_in_place(data_ptr as *mut crate::symbol::SymbolData),
            TypeTag::String => std::ptr::drop_in_place(data_ptr as *mut StringData),
            TypeTag::Tuple => std::ptr::drop_in_place(data_ptr as *mut TupleData),
            TypeTag::Array => std::ptr::drop_in_place(data_ptr as *mut ArrayData),
            TypeTag::Map => std::ptr::drop_in_place(data_ptr as *mut MapData),
            TypeTag::Set => std::ptr::drop_in_place(data_ptr as *mut SetData),
            TypeTag::Function => std::ptr::drop_in_place(data_ptr as *mut FunctionData),
            TypeTag::NativeFunction => std::ptr::drop_in_place(data_ptr as *mut NativeFunctionData),
            TypeTag::Module => std::ptr::drop_in_place(data_ptr as *mut ModuleData),
            TypeTag::Exception => std::ptr::drop_in_place(data_ptr as *mut ExceptionData),
        }
        if let Some(finalizer) = class.finalizer {
            finalizer(data_ptr);
        }
    }
}
