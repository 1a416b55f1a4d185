//! Boxed int and float.
//!
//! Small integers live entirely in the tagged [`fax_gc::Value`] and never
//! reach these types. A boxed int exists for values outside
//! `[SMALLINT_MIN, SMALLINT_MAX]` and for any path (native function
//! return, arithmetic method dispatch fallback) that needs to hand back an
//! integer as a heap object. Floats have no tagged representation at all —
//! every float is boxed.

/// Native data region of a boxed int object (`TypeTag::BoxedInt`).
#[derive(Debug, Clone, Copy)]
pub struct BoxedIntData {
    pub value: i64,
}

/// Native data region of a boxed float object (`TypeTag::BoxedFloat`).
#[derive(Debug, Clone, Copy)]
pub struct BoxedFloatData {
    pub value: f64,
}
