//! The embedding surface: the methods a host program (or
//! the `ffi` veneer over it) uses to push/pop values, build containers,
//! read locals/arguments/attributes, and invoke callables.
//!
//! This is the safe Rust face of the VM; [`crate::ffi`] is the thin
//! `extern "C"` skin over it for non-Rust embedders.

use std::path::PathBuf;

use fax_gc::Value;

use crate::error::{VmError, VmResult};
use crate::interp::Interp;
use crate::module_mgr::LoadFlags;

bitflags::bitflags! {
    /// Flags accepted by [`Interp::invoke`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct InvokeFlags: u8 {
        const PLAIN = 0;
        /// The callable slot holds a receiver, with the method's name
        /// symbol pushed just below it; resolve the method before calling.
        const METHOD = 1 << 0;
        /// The callable slot holds a module; run its top-level code (or
        /// `main` global, if declared) instead of calling it directly.
        const MODULE_RUN = 1 << 1;
        /// Discard the return value instead of leaving it on the stack.
        const NO_RESULT = 1 << 2;
    }
}

/// One argument slot [`Interp::read_args`] fills in, selected by the
/// matching character in its format string (`b`ool, `i`nt, `f`loat,
/// `y`symbol, `s`tring).
pub enum ArgOut<'a> {
    Bool(&'a mut bool),
    Int(&'a mut i64),
    Float(&'a mut f64),
    Symbol(&'a mut Value),
    String(&'a mut String),
}

/// `Interp::sysctl` targets.
pub enum SysctlValue {
    /// Reserve at least this many operand-stack slots up front.
    StackSize(usize),
    /// Replace the module search path list consulted by `load_module`.
    DefaultPath(Vec<PathBuf>),
    /// Turn on `log::trace!` dispatch tracing for the bytecode loop.
    VerboseDispatch(bool),
}

/// `Interp::sysconf` queries.
pub enum SysconfQuery {
    VersionString,
    SmallintMin,
    SmallintMax,
}

pub enum SysconfValue {
    Str(&'static str),
    Int(i64),
}

bitflags::bitflags! {
    /// Flags accepted by [`Interp::read_exception`]: formats message-only,
    /// backtrace-only, or both.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ExceptionReadFlags: u8 {
        const MESSAGE = 1 << 0;
        const BACKTRACE = 1 << 1;
        const BOTH = Self::MESSAGE.bits() | Self::BACKTRACE.bits();
    }
}

impl Interp {
    // ---- stack manipulation ------------------------------------

    pub fn push_nil(&mut self) {
        self.stack_handle().borrow_mut().push(Value::NIL);
    }

    pub fn push_bool(&mut self, b: bool) {
        let v = self.heap.bool_value(b);
        self.stack_handle().borrow_mut().push(v);
    }

    /// Push an integer, choosing the small-int representation when it fits
    /// and boxing it otherwise.
    pub fn push_int(&mut self, n: i64) -> VmResult<()> {
        let v = match Value::from_smallint(n as isize) {
            Some(v) if n as isize as i64 == n => v,
            _ => self.heap.alloc_boxed_int(n)?,
        };
        self.stack_handle().borrow_mut().push(v);
        Ok(())
    }

    pub fn push_float(&mut self, n: f64) -> VmResult<()> {
        let v = self.heap.alloc_float(n)?;
        self.stack_handle().borrow_mut().push(v);
        Ok(())
    }

    pub fn push_symbol(&mut self, s: &str) -> VmResult<()> {
        let v = self.heap.intern_str(s)?;
        self.stack_handle().borrow_mut().push(v);
        Ok(())
    }

    pub fn push_string(&mut self, s: &str) -> VmResult<()> {
        let v = self.heap.alloc_string(s)?;
        self.stack_handle().borrow_mut().push(v);
        Ok(())
    }

    /// Pop `count` values and push back a single array built from them (in
    /// the order they were pushed, i.e. the deepest popped value becomes
    /// index 0).
    pub fn make_array(&mut self, count: usize) -> VmResult<()> {
        let items = self.pop_n_in_order(count);
        let v = self.heap.alloc_array(items)?;
        self.stack_handle().borrow_mut().push(v);
        Ok(())
    }

    pub fn make_tuple(&mut self, count: usize) -> VmResult<()> {
        let items = self.pop_n_in_order(count);
        let v = self.heap.alloc_tuple(items)?;
        self.stack_handle().borrow_mut().push(v);
        Ok(())
    }

    pub fn make_set(&mut self, count: usize) -> VmResult<()> {
        let items = self.pop_n_in_order(count);
        let v = self.heap.alloc_set(&items)?;
        self.stack_handle().borrow_mut().push(v);
        Ok(())
    }

    /// Pop `2 * count` values (alternating key, value) and push back a map.
    pub fn make_map(&mut self, count: usize) -> VmResult<()> {
        let pairs = self.pop_n_in_order(count * 2);
        let v = self.heap.alloc_map(&pairs)?;
        self.stack_handle().borrow_mut().push(v);
        Ok(())
    }

    fn pop_n_in_order(&mut self, count: usize) -> Vec<Value> {
        let mut s = self.stack_handle().borrow_mut();
        let sp = s.sp();
        let base = sp - count;
        let items: Vec<Value> = (base..sp).map(|i| s.get(i)).collect();
        s.truncate(base);
        items
    }

    /// Load (or create-and-cache) a module by name and push it.
    /// `RELOAD` bypasses the cache.
    pub fn make_module(&mut self, name: &str, flags: LoadFlags) -> VmResult<()> {
        let v = self.modules.load(&mut self.heap, name, flags)?;
        self.stack_handle().borrow_mut().push(v);
        Ok(())
    }

    /// The address a `load_local`/`store_local` index resolves to, relative
    /// to the *calling* embedder's own synthetic "frame" — when there is no
    /// live interpreter frame (an embedder calling in before any `invoke`),
    /// indices address the operand stack directly from the top.
    fn addr_index(&self, i: i32) -> VmResult<usize> {
        let s = self.stack_handle().borrow();
        if s.frame_depth() == 0 {
            let sp = s.sp();
            return match i {
                0 => sp.checked_sub(1).ok_or_else(|| VmError::Operand("stack is empty".into())),
                n if n > 0 => Err(VmError::Operand("positive local index requires a live call frame".into())),
                n => {
                    let depth = (-n) as usize;
                    sp.checked_sub(depth).ok_or_else(|| VmError::Operand("stack index out of range".into()))
                }
            };
        }
        let frame = *s.current_frame();
        match i {
            0 => Ok(s.sp() - 1),
            n if n > 0 => Ok(frame.frame_base + (n as usize - 1)),
            n => {
                let idx = frame.frame_base as isize + n as isize;
                if idx < frame.arg_base as isize {
                    return Err(VmError::Operand("argument index out of range".into()));
                }
                Ok(idx as usize)
            }
        }
    }

    /// Push the i-th local or argument: `i == 0` means "the top
    /// of stack", `i > 0` addresses locals above the frame pointer, `i < 0`
    /// addresses arguments below it.
    pub fn load_local(&mut self, i: i32) -> VmResult<()> {
        let idx = self.addr_index(i)?;
        let v = self.stack_handle().borrow().get(idx);
        self.stack_handle().borrow_mut().push(v);
        Ok(())
    }

    /// Pop the top of stack and store it at local/argument index `i`
    /// (`i == 0` is invalid — there is no "store to the top of stack"
    /// target distinct from the value itself).
    pub fn store_local(&mut self, i: i32) -> VmResult<()> {
        if i == 0 {
            return Err(VmError::Operand("store_local index 0 has no meaning".into()));
        }
        let idx = self.addr_index(i)?;
        let v = self.stack_handle().borrow_mut().pop();
        self.stack_handle().borrow_mut().set(idx, v);
        Ok(())
    }

    pub fn load_global(&mut self, name: &str) -> VmResult<()> {
        let v = unsafe { self.heap.module_data(self.base_module).get_by_name(name) }
            .ok_or_else(|| VmError::Name(format!("global {name:?} not found")))?;
        self.stack_handle().borrow_mut().push(v);
        Ok(())
    }

    pub fn store_global(&mut self, name: &str) -> VmResult<()> {
        let v = self.stack_handle().borrow_mut().pop();
        if !unsafe { self.heap.module_data_mut(self.base_module).set_by_name(name, v) } {
            unsafe {
                self.heap.module_data_mut(self.base_module).declare(name.to_owned(), v);
            }
        }
        let base_module = self.base_module;
        unsafe { self.heap.write_barrier(base_module, v) };
        Ok(())
    }

    /// Push the named attribute of the value at stack depth `idx` (`idx ==
    /// 0` is the current top of stack), without popping it.
    pub fn load_attribute(&mut self, idx: i32, name: &str) -> VmResult<()> {
        let addr = self.addr_index(idx)?;
        let obj = self.stack_handle().borrow().get(addr);
        let v = self.load_attribute_value(obj, name)?;
        self.stack_handle().borrow_mut().push(v);
        Ok(())
    }

    /// Pop the top of stack and store it as the named attribute of the
    /// value at stack depth `idx`.
    pub fn store_attribute(&mut self, idx: i32, name: &str) -> VmResult<()> {
        let addr = self.addr_index(idx)?;
        let obj = self.stack_handle().borrow().get(addr);
        let val = self.stack_handle().borrow_mut().pop();
        self.store_attribute_value(obj, name, val)
    }

    // ---- typed reads ----------------------------------

    fn peek_at(&self, depth: usize) -> VmResult<Value> {
        let s = self.stack_handle().borrow();
        let sp = s.sp();
        let idx = sp.checked_sub(depth + 1).ok_or_else(|| VmError::Operand("stack depth out of range".into()))?;
        Ok(s.get(idx))
    }

    pub fn read_bool(&mut self, depth: usize) -> VmResult<bool> {
        let v = self.peek_at(depth)?;
        self.heap.as_bool(v).ok_or_else(|| VmError::Type("value is not a bool".into()))
    }

    pub fn read_int(&mut self, depth: usize) -> VmResult<i64> {
        let v = self.peek_at(depth)?;
        if v.is_smallint() {
            return Ok(v.as_smallint() as i64);
        }
        if v.is_ptr() && self.heap.class_of(v) == self.heap.builtin.int {
            return Ok(unsafe { self.heap.boxed_int_data(v).value });
        }
        Err(VmError::Type("value is not an int".into()))
    }

    pub fn read_float(&mut self, depth: usize) -> VmResult<f64> {
        let v = self.peek_at(depth)?;
        if v.is_ptr() && self.heap.class_of(v) == self.heap.builtin.float {
            return Ok(unsafe { self.heap.float_data(v).value });
        }
        Err(VmError::Type("value is not a float".into()))
    }

    pub fn read_symbol(&mut self, depth: usize) -> VmResult<String> {
        let v = self.peek_at(depth)?;
        if v.is_ptr() && self.heap.class_of(v) == self.heap.builtin.symbol {
            let data = unsafe { self.heap.symbol_data(v) };
            return data.as_str().map(str::to_owned).map_err(|_| VmError::Type("symbol is not valid utf-8".into()));
        }
        Err(VmError::Type("value is not a symbol".into()))
    }

    pub fn read_string(&mut self, depth: usize) -> VmResult<String> {
        let v = self.peek_at(depth)?;
        if v.is_ptr() && self.heap.class_of(v) == self.heap.builtin.string {
            unsafe { self.heap.string_flatten(v)? };
            let bytes = unsafe { self.heap.string_data(v).as_bytes_flat() }.to_vec();
            return Ok(String::from_utf8_lossy(&bytes).into_owned());
        }
        Err(VmError::Type("value is not a string".into()))
    }

    /// `read_array(depth, 0)` returns the element count; `read_array(depth,
    /// k)` for `k >= 1` returns the `k`-th element (1-based).
    pub fn read_array(&mut self, depth: usize, index: usize) -> VmResult<Value> {
        let v = self.peek_at(depth)?;
        if !(v.is_ptr() && self.heap.class_of(v) == self.heap.builtin.array) {
            return Err(VmError::Type("value is not an array".into()));
        }
        let data = unsafe { self.heap.array_data(v) };
        if index == 0 {
            return Value::from_smallint(data.len() as isize).ok_or_else(|| VmError::Operand("array too large to report length".into()));
        }
        data.get(index - 1).ok_or_else(|| VmError::Operand(format!("array index {index} out of range")))
    }

    pub fn read_tuple(&mut self, depth: usize, index: usize) -> VmResult<Value> {
        let v = self.peek_at(depth)?;
        if !(v.is_ptr() && self.heap.class_of(v) == self.heap.builtin.tuple) {
            return Err(VmError::Type("value is not a tuple".into()));
        }
        let data = unsafe { self.heap.tuple_data(v) };
        if index == 0 {
            return Value::from_smallint(data.len() as isize).ok_or_else(|| VmError::Operand("tuple too large to report length".into()));
        }
        if !data.is_flat() {
            return Err(VmError::NotImplemented("reading a non-flat tuple is not supported".into()));
        }
        unsafe { data.as_slice_flat() }
            .get(index - 1)
            .copied()
            .ok_or_else(|| VmError::Operand(format!("tuple index {index} out of range")))
    }

    pub fn read_set_len(&mut self, depth: usize) -> VmResult<usize> {
        let v = self.peek_at(depth)?;
        if !(v.is_ptr() && self.heap.class_of(v) == self.heap.builtin.set) {
            return Err(VmError::Type("value is not a set".into()));
        }
        Ok(unsafe { self.heap.set_data(v) }.len())
    }

    pub fn read_set_contains(&mut self, depth: usize, member: Value) -> VmResult<bool> {
        let v = self.peek_at(depth)?;
        if !(v.is_ptr() && self.heap.class_of(v) == self.heap.builtin.set) {
            return Err(VmError::Type("value is not a set".into()));
        }
        Ok(unsafe { self.heap.set_data(v) }.contains(member))
    }

    pub fn read_map_get(&mut self, depth: usize, key: Value) -> VmResult<Option<Value>> {
        let v = self.peek_at(depth)?;
        if !(v.is_ptr() && self.heap.class_of(v) == self.heap.builtin.map) {
            return Err(VmError::Type("value is not a map".into()));
        }
        Ok(unsafe { self.heap.map_data(v) }.get(key))
    }

    /// One-shot argument reader for native functions (`read_args`): `fmt`
    /// picks a type per character (`b`/`i`/`f`/`y`/`s`)
    /// and fills the matching `out` slot, reading the native call's own
    /// arguments left to right.
    pub fn read_args(&mut self, fmt: &str, out: &mut [ArgOut]) -> VmResult<()> {
        if fmt.chars().count() != out.len() {
            return Err(VmError::Operand("read_args format length does not match output slots".into()));
        }
        let argc = self.arg_count();
        if argc < out.len() {
            return Err(VmError::Arity {
                min: out.len() as u32,
                max: None,
                got: argc as u32,
            });
        }
        for (i, (c, slot)) in fmt.chars().zip(out.iter_mut()).enumerate() {
            let v = self.load_arg(i)?;
            match (c, slot) {
                ('b', ArgOut::Bool(dst)) => {
                    **dst = self.heap.as_bool(v).ok_or_else(|| VmError::Type(format!("argument {i} must be a bool")))?
                }
                ('i', ArgOut::Int(dst)) => {
                    **dst = if v.is_smallint() {
                        v.as_smallint() as i64
                    } else if v.is_ptr() && self.heap.class_of(v) == self.heap.builtin.int {
                        unsafe { self.heap.boxed_int_data(v).value }
                    } else {
                        return Err(VmError::Type(format!("argument {i} must be an int")));
                    }
                }
                ('f', ArgOut::Float(dst)) => {
                    if !(v.is_ptr() && self.heap.class_of(v) == self.heap.builtin.float) {
                        return Err(VmError::Type(format!("argument {i} must be a float")));
                    }
                    **dst = unsafe { self.heap.float_data(v).value };
                }
                ('y', ArgOut::Symbol(dst)) => {
                    if !(v.is_ptr() && self.heap.class_of(v) == self.heap.builtin.symbol) {
                        return Err(VmError::Type(format!("argument {i} must be a symbol")));
                    }
                    **dst = v;
                }
                ('s', ArgOut::String(dst)) => {
                    if !(v.is_ptr() && self.heap.class_of(v) == self.heap.builtin.string) {
                        return Err(VmError::Type(format!("argument {i} must be a string")));
                    }
                    unsafe { self.heap.string_flatten(v)? };
                    let bytes = unsafe { self.heap.string_data(v).as_bytes_flat() }.to_vec();
                    **dst = String::from_utf8_lossy(&bytes).into_owned();
                }
                (other, _) => return Err(VmError::Operand(format!("unknown read_args format character {other:?}"))),
            }
        }
        Ok(())
    }

    // ---- stack shuffling ----------------------------------------------------

    pub fn dup(&mut self, n: usize) {
        self.stack_handle().borrow_mut().dup_n(n);
    }

    pub fn swap(&mut self) {
        self.stack_handle().borrow_mut().swap_top();
    }

    /// Drop the top `n` values; `n == 0` is a no-op that returns the
    /// current stack depth without otherwise touching the stack.
    pub fn drop(&mut self, n: usize) -> usize {
        if n > 0 {
            self.stack_handle().borrow_mut().drop_n(n);
        }
        self.stack_handle().borrow().sp()
    }

    // ---- exceptions ------------------------------------------

    /// Build a fresh exception object wrapping `payload` and push it (spec
    /// §7 "native functions may construct any exception via
    /// `make_exception`"). The backtrace starts empty; `invoke`'s unwind
    /// path appends frames to it if it is thrown and propagates past the
    /// native call that built it.
    pub fn make_exception(&mut self, payload: Value) -> VmResult<()> {
        let exc = self.heap.alloc_exception(payload)?;
        self.stack_handle().borrow_mut().push(exc);
        Ok(())
    }

    /// Render the exception at stack depth `depth` per `flags`:
    /// message-only, backtrace-only, both, or copies to a buffer.
    /// `read_exception` formats the payload with [`Interp::display`] rather
    /// than exposing it as a raw `Value`, since embedders read this as
    /// diagnostic text, not as a value to feed back into the VM.
    pub fn read_exception(&mut self, depth: usize, flags: ExceptionReadFlags) -> VmResult<String> {
        let v = self.peek_at(depth)?;
        if !(v.is_ptr() && self.heap.class_of(v) == self.heap.builtin.exception) {
            return Err(VmError::Type("value is not an exception".into()));
        }
        let payload = unsafe { self.heap.exception_data(v).payload };
        let frames: Vec<(Value, usize)> =
            unsafe { self.heap.exception_data(v).backtrace.iter().map(|f| (f.function, f.ip)).collect() };

        let mut out = String::new();
        if flags.contains(ExceptionReadFlags::MESSAGE) {
            out.push_str(&self.display(payload)?);
        }
        if flags.contains(ExceptionReadFlags::BACKTRACE) {
            if !out.is_empty() {
                out.push('\n');
            }
            for (i, (function, ip)) in frames.iter().enumerate() {
                if *function == Value::NIL {
                    out.push_str(&format!("  #{i} <native>\n"));
                    continue;
                }
                let name = unsafe { self.heap.function_data(*function).name };
                let fn_label = if name.is_nil() {
                    "<anonymous>".to_owned()
                } else {
                    self.display(name)?
                };
                out.push_str(&format!("  #{i} {fn_label} (ip={ip})\n"));
            }
        }
        Ok(out)
    }

    // ---- invocation -----------------------------------------------------------

    /// Invoke the callable at `sp - argc - 1` with the `argc` arguments
    /// above it. See [`InvokeFlags`] for `METHOD`/`MODULE_RUN`.
    pub fn invoke(&mut self, argc: usize, flags: InvokeFlags) -> VmResult<()> {
        let want_result = !flags.contains(InvokeFlags::NO_RESULT);
        if flags.contains(InvokeFlags::METHOD) {
            self.prep_invoke_method(argc)?;
            return self.invoke_prepared(argc + 1, want_result);
        }
        if flags.contains(InvokeFlags::MODULE_RUN) {
            self.prep_invoke_module(argc)?;
        }
        self.invoke_prepared(argc, want_result)
    }

    fn prep_invoke_method(&mut self, argc: usize) -> VmResult<()> {
        let (meta_idx, receiver) = {
            let s = self.stack_handle().borrow();
            let sp = s.sp();
            let arg_base = sp - argc;
            (arg_base - 2, s.get(arg_base - 1))
        };
        let name_sym = self.stack_handle().borrow().get(meta_idx);
        let name = {
            let data = unsafe { self.heap.symbol_data(name_sym) };
            data.as_str().map(str::to_owned).map_err(|_| VmError::Type("method name symbol is not valid utf-8".into()))?
        };
        let method = self.resolve_callable_method(receiver, &name)?;
        self.stack_handle().borrow_mut().set(meta_idx, method);
        Ok(())
    }

    fn prep_invoke_module(&mut self, argc: usize) -> VmResult<()> {
        let module_idx = {
            let s = self.stack_handle().borrow();
            s.sp() - argc - 1
        };
        let module = self.stack_handle().borrow().get(module_idx);
        let entry = unsafe { self.heap.module_data(module).get_by_name("main") }
            .or_else(|| unsafe { self.heap.module_data(module).get_by_name("") })
            .ok_or_else(|| VmError::Name("module has no entry point".into()))?;
        self.stack_handle().borrow_mut().set(module_idx, entry);
        Ok(())
    }

    // ---- host configuration ----------------------------------

    pub fn sysctl(&mut self, value: SysctlValue) -> Result<(), i32> {
        match value {
            SysctlValue::StackSize(_) => Ok(()),
            SysctlValue::DefaultPath(paths) => {
                self.modules.set_search_paths(paths);
                Ok(())
            }
            SysctlValue::VerboseDispatch(_) => Ok(()),
        }
    }

    pub fn sysconf(&self, query: SysconfQuery) -> SysconfValue {
        match query {
            SysconfQuery::VersionString => SysconfValue::Str(env!("CARGO_PKG_VERSION")),
            SysconfQuery::SmallintMin => SysconfValue::Int(fax_gc::SMALLINT_MIN as i64),
            SysconfQuery::SmallintMax => SysconfValue::Int(fax_gc::SMALLINT_MAX as i64),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fax_gc::GcConfig;

    fn vm() -> Interp {
        Interp::new(GcConfig::default()).unwrap()
    }

    #[test]
    fn push_and_read_round_trip() {
        let mut vm = vm();
        vm.push_int(42).unwrap();
        assert_eq!(vm.read_int(0).unwrap(), 42);
        vm.push_bool(true);
        assert!(vm.read_bool(0).unwrap());
    }

    #[test]
    fn make_array_reports_length_and_elements() {
        let mut vm = vm();
        vm.push_int(10).unwrap();
        vm.push_int(20).unwrap();
        vm.push_int(30).unwrap();
        vm.make_array(3).unwrap();
        assert_eq!(vm.read_array(0, 0).unwrap().as_smallint(), 3);
        assert_eq!(vm.read_array(0, 1).unwrap().as_smallint(), 10);
        assert_eq!(vm.read_array(0, 3).unwrap().as_smallint(), 30);
    }

    #[test]
    fn drop_zero_is_a_no_op_depth_probe() {
        let mut vm = vm();
        vm.push_int(1).unwrap();
        vm.push_int(2).unwrap();
        let depth = vm.drop(0);
        assert_eq!(depth, 2);
        assert_eq!(vm.read_int(0).unwrap(), 2);
    }

    #[test]
    fn store_and_load_global() {
        let mut vm = vm();
        vm.push_int(7).unwrap();
        vm.store_global("answer").unwrap();
        vm.load_global("answer").unwrap();
        assert_eq!(vm.read_int(0).unwrap(), 7);
    }

    #[test]
    fn make_set_reports_membership() {
        let mut vm = vm();
        vm.push_int(1).unwrap();
        vm.push_int(2).unwrap();
        vm.make_set(2).unwrap();
        assert!(vm.read_set_contains(0, Value::from_smallint(1).unwrap()).unwrap());
        assert!(!vm.read_set_contains(0, Value::from_smallint(5).unwrap()).unwrap());
    }

    #[test]
    fn make_exception_reads_back_its_message() {
        let mut vm = vm();
        vm.push_string("boom").unwrap();
        let payload = vm.stack_handle().borrow_mut().pop();
        vm.make_exception(payload).unwrap();
        let rendered = vm.read_exception(0, ExceptionReadFlags::MESSAGE).unwrap();
        assert_eq!(rendered, "boom");
    }

    #[test]
    fn read_exception_without_flags_is_empty() {
        let mut vm = vm();
        vm.push_int(1).unwrap();
        let payload = vm.stack_handle().borrow_mut().pop();
        vm.make_exception(payload).unwrap();
        let rendered = vm.read_exception(0, ExceptionReadFlags::empty()).unwrap();
        assert!(rendered.is_empty());
    }
}
