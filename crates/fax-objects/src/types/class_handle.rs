//! `ClassHandle`: the first-class script-level value for a class.
//!
//! Classes themselves live outside the managed heap (see [`crate::class`]
//! module docs). When script code needs to hold "the `Foo` class" as an
//! ordinary value — to pass to `isa`, store in a variable, or look up a
//! static attribute on — it gets one of these instead: a tiny heap object
//! whose only field is the stable `class_ptr` into [`crate::class::ClassTable`].
//! That raw `usize` is not itself a `Value`, so it needs no GC tracing.

/// Native data region of a class-handle object (`TypeTag::ClassHandle`).
#[derive(Debug, Clone, Copy)]
pub struct ClassHandleData {
    pub class_ptr: usize,
}
