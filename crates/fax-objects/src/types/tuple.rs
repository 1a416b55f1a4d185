//! Tuple objects: the same inner/slice/cons tri-form as string, but over
//! object-reference storage instead of bytes.

use fax_gc::Value;

/// Native data region of a tuple object (`TypeTag::Tuple`).
pub enum TupleData {
    Inner(Vec<Value>),
    Slice { base: Value, off: usize, len: usize },
    Cons { left: Value, right: Value, len: usize },
}

impl TupleData {
    pub fn new_inner(items: Vec<Value>) -> Self {
        TupleData::Inner(items)
    }

    pub fn len(&self) -> usize {
        match self {
            TupleData::Inner(v) => v.len(),
            TupleData::Slice { len, .. } => *len,
            TupleData::Cons { len, .. } => *len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_flat(&self) -> bool {
        matches!(self, TupleData::Inner(_))
    }

    /// # Safety
    /// `base` in the `Slice` case must still point at a live `Inner` tuple
    /// object.
    pub unsafe fn as_slice_flat(&self) -> &[Value] {
        match self {
            TupleData::Inner(v) => v,
            TupleData::Slice { base, off, len } => {
                let base_data = base.as_ptr();
                let base_tuple = &*(base_data as *const TupleData);
                match base_tuple {
                    TupleData::Inner(v) => &v[*off..*off + *len],
                    _ => unreachable!("slice base must be an Inner tuple"),
                }
            }
            TupleData::Cons { .. } => panic!("cons tuple must be flattened before element access"),
        }
    }

    pub(crate) fn visit_fields(&mut self, visit: &mut dyn FnMut(&mut Value)) {
        match self {
            TupleData::Inner(items) => {
                for v in items.iter_mut() {
                    visit(v);
                }
            }
            TupleData::Slice { base, .. } => visit(base),
            TupleData::Cons { left, right, .. } => {
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
    fn inner_len_matches_vec() {
        let t = TupleData::new_inner(vec![Value::from_smallint(1).unwrap(), Value::from_smallint(2).unwrap()]);
        assert_eq!(t.len(), 2);
        assert!(t.is_flat());
    }
}
