//! Map objects.
//!
//! A dynamically-typed map ideally hashes keys by calling the key's own
//! `hash`/`==` methods through the interpreter. `fax-objects` has no
//! interpreter to call back into, so keys are compared with
//! [`fax_gc::Value`]'s own `Eq` —
//! pointer identity for heap objects, numeric equality for small ints. Two
//! distinct boxed ints or strings with the same contents are therefore
//! distinct keys at this layer; `fax-vm`'s `LdElem`/`StElem` opcode
//! dispatch is expected to box through the class's `__eq__`/`__hash__`
//! methods for containers that need value semantics, the same layering
//! split the interpreter already does for `Cmp`/arithmetic.
//! A plain association vector (not a real hash table) keeps this honest
//! about its O(n) lookup instead of quietly mis-hashing relocatable keys.

use fax_gc::Value;

/// Native data region of a map object (`TypeTag::Map`).
#[derive(Default)]
pub struct MapData {
    entries: Vec<(Value, Value)>,
}

impl MapData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: Value) -> Option<Value> {
        self.entries.iter().find(|(k, _)| *k == key).map(|(_, v)| *v)
    }

    pub fn set(&mut self, key: Value, value: Value) {
        if let Some(entry) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            entry.1 = value;
        } else {
            self.entries.push((key, value));
        }
    }

    pub fn remove(&mut self, key: Value) -> Option<Value> {
        let pos = self.entries.iter().position(|(k, _)| *k == key)?;
        Some(self.entries.remove(pos).1)
    }

    pub fn contains_key(&self, key: Value) -> bool {
        self.entries.iter().any(|(k, _)| *k == key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Value, Value)> + '_ {
        self.entries.iter().copied()
    }

    /// Build from `2*count` stack items in `[key0, val0, key1, val1, ...]`
    /// order, matching the embedding API's `make_map(count)`.
    pub fn from_pairs(items: &[Value]) -> Self {
        debug_assert_eq!(items.len() % 2, 0);
        let mut map = Self::new();
        for pair in items.chunks_exact(2) {
            map.set(pair[0], pair[1]);
        }
        map
    }

    pub(crate) fn visit_fields(&mut self, visit: &mut dyn FnMut(&mut Value)) {
        for (k, v) in self.entries.iter_mut() {
            visit(k);
            visit(v);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_get_overwrite() {
        let mut m = MapData::new();
        let k = Value::from_smallint(1).unwrap();
        m.set(k, Value::from_smallint(10).unwrap());
        assert_eq!(m.get(k), Some(Value::from_smallint(10).unwrap()));
        m.set(k, Value::from_smallint(20).unwrap());
        assert_eq!(m.get(k), Some(Value::from_smallint(20).unwrap()));
        assert_eq!(m.len(), 1, "overwrite must not grow the map");
    }

    #[test]
    fn from_pairs_preserves_insertion_order() {
        let items = [
            Value::from_smallint(1).unwrap(),
            Value::from_smallint(10).unwrap(),
            Value::from_smallint(2).unwrap(),
            Value::from_smallint(20).unwrap(),
        ];
        let m = MapData::from_pairs(&items);
        let collected: Vec<_> = m.iter().collect();
        assert_eq!(
            collected,
            vec![
                (Value::from_smallint(1).unwrap(), Value::from_smallint(10).unwrap()),
                (Value::from_smallint(2).unwrap(), Value::from_smallint(20).unwrap()),
            ]
        );
    }
}
