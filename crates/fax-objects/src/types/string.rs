//! String objects, built from an inner/slice/cons tri-form.
//!
//! - `Inner` owns its UTF-8 bytes directly.
//! - `Slice` references another string's inner buffer by byte offset and
//!   length, used for substring operations without copying.
//! - `Cons` defers concatenation by holding both operands, avoiding the
//!   quadratic cost of repeated `+`; a read that needs a contiguous view
//!   flattens it in place into a `Slice` over a fresh `Inner`, caching the
//!   result for subsequent reads.
//!
//! Characters are UTF-8; both byte length and codepoint (`char`) length
//! are tracked, so `char_len`/indexing by codepoint never has to rescan a
//! `Cons` or `Slice` from scratch.

use fax_gc::Value;

/// Native data region of a string object (`TypeTag::String`).
pub enum StringData {
    Inner { bytes: Box<[u8]>, char_len: usize },
    Slice { base: Value, byte_off: usize, byte_len: usize, char_len: usize },
    Cons { left: Value, right: Value, byte_len: usize, char_len: usize },
}

impl StringData {
    pub fn new_inner(bytes: Vec<u8>) -> Self {
        let char_len = std::str::from_utf8(&bytes).map(|s| s.chars().count()).unwrap_or(bytes.len());
        StringData::Inner {
            bytes: bytes.into_boxed_slice(),
            char_len,
        }
    }

    pub fn byte_len(&self) -> usize {
        match self {
            StringData::Inner { bytes, .. } => bytes.len(),
            StringData::Slice { byte_len, .. } => *byte_len,
            StringData::Cons { byte_len, .. } => *byte_len,
        }
    }

    pub fn char_len(&self) -> usize {
        match self {
            StringData::Inner { char_len, .. } => *char_len,
            StringData::Slice { char_len, .. } => *char_len,
            StringData::Cons { char_len, .. } => *char_len,
        }
    }

    pub fn is_flat(&self) -> bool {
        !matches!(self, StringData::Cons { .. })
    }

    /// Direct byte access, valid only for the already-flat forms. Callers
    /// holding a `Cons` must flatten first (see
    /// [`crate::heap::ObjectHeap::string_flatten`]).
    ///
    /// # Safety
    /// `base` in the `Slice` case must still point at a live `Inner`
    /// string object.
    pub unsafe fn as_bytes_flat(&self) -> &[u8] {
        match self {
            StringData::Inner { bytes, .. } => bytes,
            StringData::Slice { base, byte_off, byte_len, .. } => {
                let base_data = base.as_ptr();
                let base_str = &*(base_data as *const StringData);
                let base_bytes = match base_str {
                    StringData::Inner { bytes, .. } => bytes,
                    _ => unreachable!("slice base must be an Inner string"),
                };
                &base_bytes[*byte_off..*byte_off + *byte_len]
            }
            StringData::Cons { .. } => panic!("cons string must be flattened before byte access"),
        }
    }

    pub(crate) fn visit_fields(&mut self, visit: &mut dyn FnMut(&mut Value)) {
        match self {
            StringData::Inner { .. } => {}
            StringData::Slice { base, .. } => visit(base),
            StringData::Cons { left, right, .. } => {
                visit(left);
                visit(right);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inner_tracks_byte_and_char_len_separately() {
        let s = StringData::new_inner("héllo".as_bytes().to_vec());
        assert_eq!(s.byte_len(), "héllo".len());
        assert_eq!(s.char_len(), 5);
    }

    #[test]
    fn ascii_byte_and_char_len_match() {
        let s = StringData::new_inner(b"hello".to_vec());
        assert_eq!(s.byte_len(), 5);
        assert_eq!(s.char_len(), 5);
    }
}
