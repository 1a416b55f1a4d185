//! Interpreter-level errors.
//!
//! Every variant here either maps onto a script-visible exception (wrapped
//! into a real exception object by [`crate::interp::Interp::unwind`]) or is
//! surfaced to the embedder as an error code by [`crate::ffi`].

use fax_gc::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VmError {
    #[error("arity mismatch: expected {min}..{max:?} arguments, got {got}")]
    Arity { min: u32, max: Option<u32>, got: u32 },

    #[error("type error: {0}")]
    Type(String),

    #[error("name error: {0}")]
    Name(String),

    #[error("malformed operand: {0}")]
    Operand(String),

    #[error("not implemented: {0}")]
    NotImplemented(String),

    /// An exception value raised by script code or a native call (already a
    /// live `Exception` object, or a raw payload [`crate::interp::Interp::unwind`]
    /// will box into one).
    #[error("uncaught exception")]
    Native(Value),

    #[error(transparent)]
    Object(#[from] fax_objects::ObjectError),

    #[error(transparent)]
    Gc(#[from] fax_gc::GcError),
}

pub type VmResult<T> = std::result::Result<T, VmError>;
