//! Module manager: name→module cache, native module definitions, and the
//! (injected) compiled-source fallback.
//!
//! Lexing/parsing/codegen are out of scope for this crate, so "search the
//! configured module paths for a source file, compile it" is expressed as
//! a trait an embedder plugs in rather than code living here: the core
//! owns the interface, and the driver (if any) supplies the
//! implementation.

use std::path::{Path, PathBuf};

use fax_gc::Value;
use fax_objects::ObjectHeap;
use indexmap::IndexMap;

use crate::error::{VmError, VmResult};
use fax_objects::types::{AritySpec, NativeEntry, NativeFunctionData};

bitflags::bitflags! {
    /// Flags accepted by [`ModuleManager::load`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct LoadFlags: u8 {
        const NONE = 0;
        /// Bypass the cache and reload even if a module by this name is
        /// already loaded.
        const RELOAD = 1 << 0;
    }
}

/// One compiled-in native module: a name plus its exported entries.
/// Registered in a static table the manager consults before falling back
/// to source-path search.
#[derive(Debug, Clone, Copy)]
pub struct NativeModuleDef {
    pub name: &'static str,
    pub entries: &'static [(&'static str, NativeEntry)],
}

/// Compiles a source file found on the module search path into a top-level
/// function object. Lexing/parsing/codegen live outside
/// this crate; an embedder that wants source-module loading to work
/// provides one of these. Without one, finding a source file but having no
/// compiler registered is a [`VmError::NotImplemented`].
pub trait SourceCompiler {
    fn compile(&self, path: &Path, heap: &mut ObjectHeap) -> VmResult<fax_objects::types::FunctionData>;
}

pub struct ModuleManager {
    modules: IndexMap<Box<str>, Value>,
    native_defs: Vec<NativeModuleDef>,
    search_paths: Vec<PathBuf>,
    compiler: Option<Box<dyn SourceCompiler>>,
}

impl ModuleManager {
    pub fn new() -> Self {
        Self {
            modules: IndexMap::new(),
            native_defs: Vec::new(),
            search_paths: Vec::new(),
            compiler: None,
        }
    }

    pub fn register_native_module(&mut self, def: NativeModuleDef) {
        if let Some(existing) = self.native_defs.iter_mut().find(|d| d.name == def.name) {
            *existing = def;
        } else {
            self.native_defs.push(def);
        }
    }

    pub fn set_search_paths(&mut self, paths: Vec<PathBuf>) {
        self.search_paths = paths;
    }

    pub fn set_compiler(&mut self, compiler: Box<dyn SourceCompiler>) {
        self.compiler = Some(compiler);
    }

    pub fn cached(&self, name: &str) -> Option<Value> {
        self.modules.get(name).copied()
    }

    fn native_def(&self, name: &str) -> Option<&NativeModuleDef> {
        self.native_defs.iter().find(|d| d.name == name)
    }

    fn find_source_file(&self, name: &str) -> Option<PathBuf> {
        self.search_paths.iter().map(|dir| dir.join(format!("{name}.fx"))).find(|p| p.exists())
    }

    /// Load (or return the cached) module by name.
    pub fn load(&mut self, heap: &mut ObjectHeap, name: &str, flags: LoadFlags) -> VmResult<Value> {
        if !flags.contains(LoadFlags::RELOAD) {
            if let Some(cached) = self.cached(name) {
                return Ok(cached);
            }
        }

        if let Some(def) = self.native_def(name).copied() {
            let module = self.build_native_module(heap, def)?;
            self.modules.insert(name.into(), module);
            return Ok(module);
        }

        if let Some(path) = self.find_source_file(name) {
            let module = self.compile_source_module(heap, name, &path)?;
            self.modules.insert(name.into(), module);
            return Ok(module);
        }

        Err(VmError::Name(format!("no module named {name:?}")))
    }

    fn build_native_module(&mut self, heap: &mut ObjectHeap, def: NativeModuleDef) -> VmResult<Value> {
        let name_sym = heap.intern_str(def.name)?;
        let module = heap.alloc_module(name_sym)?;
        for (entry_name, entry) in def.entries {
            let fn_name_sym = heap.intern_str(entry_name)?;
            let native = heap.alloc_native_function(NativeFunctionData {
                entry: *entry,
                arity: AritySpec::variadic(0),
                name: fn_name_sym,
            })?;
            unsafe {
                heap.module_data_mut(module).declare(*entry_name, native);
                heap.write_barrier(module, native);
            }
        }
        Ok(module)
    }

    fn compile_source_module(&mut self, heap: &mut ObjectHeap, name: &str, path: &Path) -> VmResult<Value> {
        let compiler = self
            .compiler
            .as_ref()
            .ok_or_else(|| VmError::NotImplemented("no source compiler registered".into()))?;
        let top_level = compiler.compile(path, heap)?;
        let name_sym = heap.intern_str(name)?;
        let module = heap.alloc_module(name_sym)?;
        let function = heap.alloc_function(top_level)?;
        unsafe {
            heap.module_data_mut(module).declare("", function);
            heap.write_barrier(module, function);
        }
        Ok(module)
    }
}

impl Default for ModuleManager {
    fn default() -> Self {
        Self::new()
    }
}
