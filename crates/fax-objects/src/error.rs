//! Error type for the object layer: class table lookups, symbol pool
//! misuse, and container bounds checks that the interpreter converts into
//! VM exceptions.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ObjectError {
    #[error("class not found: {0}")]
    ClassNotFound(String),

    #[error("attribute not found: {0}")]
    AttributeNotFound(String),

    #[error("method not found: {0}")]
    MethodNotFound(String),

    #[error("index out of range: index {index}, length {length}")]
    IndexOutOfRange { index: usize, length: usize },

    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: &'static str, actual: &'static str },

    #[error("string is not valid UTF-8 at byte {0}")]
    InvalidUtf8(usize),

    #[error("gc error: {0}")]
    Gc(#[from] fax_gc::GcError),
}

pub type Result<T> = std::result::Result<T, ObjectError>;
