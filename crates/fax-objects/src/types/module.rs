//! Module objects.

use fax_gc::Value;
use indexmap::IndexMap;

/// Native data region of a module object (`TypeTag::Module`).
pub struct ModuleData {
    pub name: Value,
    names: IndexMap<Box<str>, usize>,
    globals: Vec<Value>,
}

impl ModuleData {
    pub fn new(name: Value) -> Self {
        Self {
            name,
            names: IndexMap::new(),
            globals: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.globals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.globals.is_empty()
    }

    /// Declare a new global, or return the existing index if `name` is
    /// already bound.
    pub fn declare(&mut self, name: impl Into<Box<str>>, initial: Value) -> usize {
        let name = name.into();
        if let Some(&idx) = self.names.get(&name) {
            return idx;
        }
        let idx = self.globals.len();
        self.globals.push(initial);
        self.names.insert(name, idx);
        idx
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names.get(name).copied()
    }

    pub fn get_by_index(&self, index: usize) -> Option<Value> {
        self.globals.get(index).copied()
    }

    pub fn set_by_index(&mut self, index: usize, value: Value) -> bool {
        match self.globals.get_mut(index) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    pub fn get_by_name(&self, name: &str) -> Option<Value> {
        self.index_of(name).and_then(|i| self.get_by_index(i))
    }

    pub fn set_by_name(&mut self, name: &str, value: Value) -> bool {
        match self.index_of(name) {
            Some(i) => {
                self.set_by_index(i, value);
                true
            }
            None => false,
        }
    }

    pub(crate) fn visit_fields(&mut self, visit: &mut dyn FnMut(&mut Value)) {
        visit(&mut self.name);
        for v in self.globals.iter_mut() {
            visit(v);
        }
    }
}
