//! The bytecode dispatch loop: calling convention, method and attribute
//! resolution, control flow, and exception unwinding.
//!
//! `Interp` owns everything below the embedding surface: the object heap,
//! the shared call stack, and the module table. The call stack is kept
//! behind an `Rc<RefCell<_>>` so it can simultaneously be a field on
//! `Interp` (for direct push/pop during dispatch) and a registered GC root
//! (`fax-objects`'s `ClassTable`/`SymbolPool` use the same trick — see
//! `fax_objects::heap::ObjectHeap`).

use std::cell::RefCell;
use std::rc::Rc;

use fax_gc::{GcConfig, GcRoot, Value};
use fax_objects::{ObjectHeap, Slot};

use crate::error::{VmError, VmResult};
use crate::module_mgr::{LoadFlags, ModuleManager};
use crate::opcode::{apply_jump, decode_call_operand, decode_instruction, Op, Operand, RETLOC_TOP_OF_STACK};
use crate::stack::{CallStack, Frame};

struct CallStackRoot(Rc<RefCell<CallStack>>);
impl GcRoot for CallStackRoot {
    fn visit_values(&mut self, visit: &mut dyn FnMut(&mut Value)) {
        self.0.borrow_mut().visit_values(visit)
    }
}

/// A binary operand already classified as one of the three numeric
/// representations: small-int, boxed int, float.
#[derive(Debug, Clone, Copy)]
enum Num {
    Small(isize),
    Big(i64),
    Float(f64),
}

impl Num {
    fn as_i64(self) -> i64 {
        match self {
            Num::Small(v) => v as i64,
            Num::Big(v) => v,
            Num::Float(v) => v as i64,
        }
    }

    fn as_f64(self) -> f64 {
        match self {
            Num::Small(v) => v as f64,
            Num::Big(v) => v as f64,
            Num::Float(v) => v,
        }
    }
}

fn ordering_sign(o: std::cmp::Ordering) -> i64 {
    match o {
        std::cmp::Ordering::Less => -1,
        std::cmp::Ordering::Equal => 0,
        std::cmp::Ordering::Greater => 1,
    }
}

/// Wrap `v` into the small-int domain by dropping the bit the tag shift
/// would otherwise overflow into, then sign-extending. Overflow wraps
/// modularly rather than promoting to a boxed int; see `DESIGN.md`.
fn wrap_smallint(v: isize) -> isize {
    (v << 1) >> 1
}

fn op_symbol(op: Op) -> &'static str {
    use Op::*;
    match op {
        Add => "+",
        Sub => "-",
        Mul => "*",
        Div => "/",
        Rem => "%",
        Shl => "<<",
        Shr => ">>",
        And => "&",
        Or => "|",
        Xor => "^",
        _ => unreachable!("op_symbol called on a non-binary-arithmetic opcode"),
    }
}

/// The interpreter: object heap, call stack, module table, and the base
/// (`__builtins__`) module whose globals are searched by `LdGlobY`.
pub struct Interp {
    pub heap: ObjectHeap,
    stack: Rc<RefCell<CallStack>>,
    pub modules: ModuleManager,
    pub base_module: Value,
}

impl Interp {
    pub fn new(config: GcConfig) -> VmResult<Self> {
        let mut heap = ObjectHeap::new(config)?;
        let stack = Rc::new(RefCell::new(CallStack::new()));
        heap.gc.add_gc_root(Box::new(CallStackRoot(stack.clone())));
        let mut interp = Self {
            heap,
            stack,
            modules: ModuleManager::new(),
            base_module: Value::NIL,
        };
        interp.bootstrap_base_module()?;
        Ok(interp)
    }

    fn bootstrap_base_module(&mut self) -> VmResult<()> {
        crate::native::register(&mut self.modules);
        let module = self.modules.load(&mut self.heap, "__builtins__", LoadFlags::NONE)?;
        self.base_module = module;
        Ok(())
    }

    pub(crate) fn stack_handle(&self) -> &Rc<RefCell<CallStack>> {
        &self.stack
    }

    // ---- top-level entry point (called by `api::invoke`) -----------------

    /// Invoke whatever callable/args the caller already pushed onto the
    /// operand stack: `argc` values above `sp - argc - 1`. Returns once
    /// the call (and everything it transitively calls) has
    /// returned; on an uncaught exception, returns `Err(VmError::Native(exc))`
    /// with the operand stack back at its pre-call depth.
    pub(crate) fn invoke_prepared(&mut self, argc: usize, want_result: bool) -> VmResult<()> {
        let depth = self.stack.borrow().frame_depth();
        if let Err(e) = self.dispatch_call(argc, want_result) {
            return Err(self.unwind(depth, e));
        }
        self.run_loop(depth)
    }

    /// Push `callable` and `args`, call it, and drive it to completion
    /// synchronously — used from *inside* an opcode handler (operator
    /// dispatch fallback, `__find_attr__`/`__find_meth__`, `PrepMeth`'s
    /// miss path) where the result is needed before the calling frame's
    /// next instruction can run.
    fn call_value_sync(&mut self, callable: Value, args: &[Value], want_result: bool) -> VmResult<Option<Value>> {
        let depth = self.stack.borrow().frame_depth();
        {
            let mut s = self.stack.borrow_mut();
            s.push(callable);
            for a in args {
                s.push(*a);
            }
        }
        if let Err(e) = self.dispatch_call(args.len(), want_result) {
            return Err(self.unwind(depth, e));
        }
        self.run_loop(depth)?;
        if want_result {
            Ok(Some(self.stack.borrow_mut().pop()))
        } else {
            Ok(None)
        }
    }

    fn run_loop(&mut self, base_depth: usize) -> VmResult<()> {
        loop {
            if self.stack.borrow().frame_depth() <= base_depth {
                return Ok(());
            }
            if let Err(e) = self.step() {
                return Err(self.unwind(base_depth, e));
            }
        }
    }

    // ---- fetch-decode-execute ---------------------------------------------

    fn step(&mut self) -> VmResult<()> {
        let callable = self.stack.borrow().current_frame().function;
        let (op, operand) = {
            let data = unsafe { self.heap.function_data(callable) };
            let mut ip = self.stack.borrow().current_frame().ip;
            let decoded = decode_instruction(&data.code, &mut ip)?;
            self.stack.borrow_mut().current_frame_mut().ip = ip;
            decoded
        };
        log::trace!("dispatch {op:?} operand={operand:?}");
        self.execute(op, operand, callable)
    }

    fn const_at(&self, callable: Value, idx: usize) -> VmResult<Value> {
        let data = unsafe { self.heap.function_data(callable) };
        data.const_pool
            .get(idx)
            .copied()
            .ok_or_else(|| VmError::Operand(format!("constant pool index {idx} out of range")))
    }

    fn sym_at(&self, callable: Value, idx: usize) -> VmResult<Value> {
        let data = unsafe { self.heap.function_data(callable) };
        data.sym_pool
            .get(idx)
            .copied()
            .ok_or_else(|| VmError::Operand(format!("symbol pool index {idx} out of range")))
    }

    fn sym_name(&self, sym: Value) -> VmResult<String> {
        let data = unsafe { self.heap.symbol_data(sym) };
        data.as_str()
            .map(|s| s.to_owned())
            .map_err(|_| VmError::Operand("symbol bytes are not valid utf-8".into()))
    }

    fn execute(&mut self, op: Op, operand: Operand, callable: Value) -> VmResult<()> {
        use Op::*;
        match op {
            Nop => {}
            Swap => self.stack.borrow_mut().swap_top(),
            SwapN => {
                let n = operand.as_u8()? as usize;
                self.stack.borrow_mut().swap_n(n);
            }
            Drop => {
                self.stack.borrow_mut().pop();
            }
            DropN => {
                let n = operand.as_u8()? as usize;
                self.stack.borrow_mut().drop_n(n);
            }
            Dup => self.stack.borrow_mut().dup_top(),
            DupN => {
                let n = operand.as_u8()? as usize;
                self.stack.borrow_mut().dup_n(n);
            }

            LdNil => self.stack.borrow_mut().push(Value::NIL),
            LdBool => {
                let b = operand.as_u8()? != 0;
                let v = self.heap.bool_value(b);
                self.stack.borrow_mut().push(v);
            }
            LdInt => {
                let n = operand.as_i8()? as isize;
                self.stack.borrow_mut().push(Value::from_smallint(n).expect("i8 always fits"));
            }
            LdIntW => {
                let n = operand.as_i16()? as isize;
                self.stack.borrow_mut().push(Value::from_smallint(n).expect("i16 always fits"));
            }
            LdFlt => {
                let n = operand.as_i8()? as f64;
                let v = self.heap.alloc_float(n)?;
                self.stack.borrow_mut().push(v);
            }
            LdCnst => {
                let idx = operand.as_u8()? as usize;
                let v = self.const_at(callable, idx)?;
                self.stack.borrow_mut().push(v);
            }
            LdCnstW => {
                let idx = operand.as_u16()? as usize;
                let v = self.const_at(callable, idx)?;
                self.stack.borrow_mut().push(v);
            }
            LdSym => {
                let idx = operand.as_u8()? as usize;
                let v = self.sym_at(callable, idx)?;
                self.stack.borrow_mut().push(v);
            }
            LdSymW => {
                let idx = operand.as_u16()? as usize;
                let v = self.sym_at(callable, idx)?;
                self.stack.borrow_mut().push(v);
            }

            Add | Sub | Mul | Div | Rem | Shl | Shr | And | Or | Xor => {
                let (b, a) = {
                    let mut s = self.stack.borrow_mut();
                    let b = s.pop();
                    let a = s.pop();
                    (b, a)
                };
                let r = self.binary_op(op, a, b)?;
                self.stack.borrow_mut().push(r);
            }
            Neg | Inv => {
                let a = self.stack.borrow_mut().pop();
                let r = self.unary_op(op, a)?;
                self.stack.borrow_mut().push(r);
            }
            Not => {
                let a = self.stack.borrow_mut().pop();
                let b = self
                    .heap
                    .as_bool(a)
                    .ok_or_else(|| VmError::Type("Not operand must be boolean".into()))?;
                let r = self.heap.bool_value(!b);
                self.stack.borrow_mut().push(r);
            }
            Is => {
                let (b, a) = {
                    let mut s = self.stack.borrow_mut();
                    let b = s.pop();
                    let a = s.pop();
                    (b, a)
                };
                self.stack.borrow_mut().push(self.heap.bool_value(a == b));
            }
            Cmp => {
                let (b, a) = {
                    let mut s = self.stack.borrow_mut();
                    let b = s.pop();
                    let a = s.pop();
                    (b, a)
                };
                let sign = self.compare(a, b)?;
                self.stack
                    .borrow_mut()
                    .push(Value::from_smallint(sign as isize).expect("tri-valued sign always fits"));
            }
            CmpLt | CmpLe | CmpGt | CmpGe | CmpEq | CmpNe => {
                let (b, a) = {
                    let mut s = self.stack.borrow_mut();
                    let b = s.pop();
                    let a = s.pop();
                    (b, a)
                };
                let sign = self.compare(a, b)?;
                let result = match op {
                    CmpLt => sign < 0,
                    CmpLe => sign <= 0,
                    CmpGt => sign > 0,
                    CmpGe => sign >= 0,
                    CmpEq => sign == 0,
                    CmpNe => sign != 0,
                    _ => unreachable!(),
                };
                self.stack.borrow_mut().push(self.heap.bool_value(result));
            }

            LdArg => {
                let i = operand.as_u8()? as usize;
                let v = self.load_arg(i)?;
                self.stack.borrow_mut().push(v);
            }
            StArg => {
                let i = operand.as_u8()? as usize;
                let v = self.stack.borrow_mut().pop();
                self.store_arg(i, v)?;
            }
            LdLoc => {
                let i = operand.as_u8()? as usize;
                let v = self.load_local_slot(i)?;
                self.stack.borrow_mut().push(v);
            }
            LdLocW => {
                let i = operand.as_u16()? as usize;
                let v = self.load_local_slot(i)?;
                self.stack.borrow_mut().push(v);
            }
            StLoc => {
                let i = operand.as_u8()? as usize;
                let v = self.stack.borrow_mut().pop();
                self.store_local_slot(i, v);
            }
            StLocW => {
                let i = operand.as_u16()? as usize;
                let v = self.stack.borrow_mut().pop();
                self.store_local_slot(i, v);
            }

            LdGlob => {
                let i = operand.as_u8()? as usize;
                let v = self.load_global_by_index(callable, i)?;
                self.stack.borrow_mut().push(v);
            }
            LdGlobW => {
                let i = operand.as_u16()? as usize;
                let v = self.load_global_by_index(callable, i)?;
                self.stack.borrow_mut().push(v);
            }
            StGlob => {
                let i = operand.as_u8()? as usize;
                let v = self.stack.borrow_mut().pop();
                self.store_global_by_index(callable, i, v)?;
            }
            StGlobW => {
                let i = operand.as_u16()? as usize;
                let v = self.stack.borrow_mut().pop();
                self.store_global_by_index(callable, i, v)?;
            }
            LdGlobY => {
                let idx = operand.as_u8()? as usize;
                let name = self.sym_name(self.sym_at(callable, idx)?)?;
                let v = self.load_global_by_name(callable, &name)?;
                self.stack.borrow_mut().push(v);
            }
            LdGlobYW => {
                let idx = operand.as_u16()? as usize;
                let name = self.sym_name(self.sym_at(callable, idx)?)?;
                let v = self.load_global_by_name(callable, &name)?;
                self.stack.borrow_mut().push(v);
            }
            StGlobY => {
                let idx = operand.as_u8()? as usize;
                let name = self.sym_name(self.sym_at(callable, idx)?)?;
                let v = self.stack.borrow_mut().pop();
                self.store_global_by_name(callable, &name, v)?;
            }
            StGlobYW => {
                let idx = operand.as_u16()? as usize;
                let name = self.sym_name(self.sym_at(callable, idx)?)?;
                let v = self.stack.borrow_mut().pop();
                self.store_global_by_name(callable, &name, v)?;
            }

            LdAttrY => {
                let idx = operand.as_u8()? as usize;
                let name = self.sym_name(self.sym_at(callable, idx)?)?;
                let obj = self.stack.borrow_mut().pop();
                let v = self.load_attribute_value(obj, &name)?;
                self.stack.borrow_mut().push(v);
            }
            LdAttrYW => {
                let idx = operand.as_u16()? as usize;
                let name = self.sym_name(self.sym_at(callable, idx)?)?;
                let obj = self.stack.borrow_mut().pop();
                let v = self.load_attribute_value(obj, &name)?;
                self.stack.borrow_mut().push(v);
            }
            StAttrY => {
                let idx = operand.as_u8()? as usize;
                let name = self.sym_name(self.sym_at(callable, idx)?)?;
                let (val, obj) = {
                    let mut s = self.stack.borrow_mut();
                    let val = s.pop();
                    let obj = s.pop();
                    (val, obj)
                };
                self.store_attribute_value(obj, &name, val)?;
            }
            StAttrYW => {
                let idx = operand.as_u16()? as usize;
                let name = self.sym_name(self.sym_at(callable, idx)?)?;
                let (val, obj) = {
                    let mut s = self.stack.borrow_mut();
                    let val = s.pop();
                    let obj = s.pop();
                    (val, obj)
                };
                self.store_attribute_value(obj, &name, val)?;
            }

            LdElem => {
                let (idx, container) = {
                    let mut s = self.stack.borrow_mut();
                    let idx = s.pop();
                    let container = s.pop();
                    (idx, container)
                };
                let v = self.load_element(container, idx)?;
                self.stack.borrow_mut().push(v);
            }
            StElem => {
                let (val, idx, container) = {
                    let mut s = self.stack.borrow_mut();
                    let val = s.pop();
                    let idx = s.pop();
                    let container = s.pop();
                    (val, idx, container)
                };
                self.store_element(container, idx, val)?;
            }

            Jmp => {
                let off = operand.as_i8()? as isize;
                self.jump(off)?;
            }
            JmpW => {
                let off = operand.as_i16()? as isize;
                self.jump(off)?;
            }
            JmpWhen => {
                let off = operand.as_i8()? as isize;
                self.jump_cond(off, true)?;
            }
            JmpWhenW => {
                let off = operand.as_i16()? as isize;
                self.jump_cond(off, true)?;
            }
            JmpUnls => {
                let off = operand.as_i8()? as isize;
                self.jump_cond(off, false)?;
            }
            JmpUnlsW => {
                let off = operand.as_i16()? as isize;
                self.jump_cond(off, false)?;
            }

            LdMod => {
                let idx = operand.as_u16()? as usize;
                let name = self.sym_name(self.sym_at(callable, idx)?)?;
                let v = self.modules.load(&mut self.heap, &name, LoadFlags::NONE)?;
                self.stack.borrow_mut().push(v);
            }

            Ret => self.do_return(None)?,
            RetLoc => {
                let k = operand.as_u8()?;
                self.do_return(Some(k))?;
            }
            Call => {
                let byte = operand.as_u8()?;
                let (argc, want_result) = decode_call_operand(byte);
                self.dispatch_call(argc as usize, want_result)?;
            }
            PrepMethY => {
                let idx = operand.as_u8()? as usize;
                let name = self.sym_name(self.sym_at(callable, idx)?)?;
                self.prep_method(&name)?;
            }
            PrepMethYW => {
                let idx = operand.as_u16()? as usize;
                let name = self.sym_name(self.sym_at(callable, idx)?)?;
                self.prep_method(&name)?;
            }
        }
        Ok(())
    }

    // ---- control flow ------------------------------------------------------

    fn jump(&mut self, offset: isize) -> VmResult<()> {
        let base = self.stack.borrow().current_frame().ip;
        let target = apply_jump(base, offset)?;
        self.stack.borrow_mut().current_frame_mut().ip = target;
        Ok(())
    }

    fn jump_cond(&mut self, offset: isize, when: bool) -> VmResult<()> {
        let v = self.stack.borrow_mut().pop();
        let b = self
            .heap
            .as_bool(v)
            .ok_or_else(|| VmError::Type("branch condition must be boolean".into()))?;
        if b == when {
            self.jump(offset)?;
        }
        Ok(())
    }

    // ---- locals / args ------------------------------------------------------

    pub(crate) fn arg_count(&self) -> usize {
        let frame = *self.stack.borrow().current_frame();
        frame.frame_base - frame.arg_base
    }

    pub(crate) fn load_arg(&self, i: usize) -> VmResult<Value> {
        let frame = *self.stack.borrow().current_frame();
        let idx = frame.arg_base + i;
        if idx >= frame.frame_base {
            return Err(VmError::Operand(format!("argument index {i} out of range")));
        }
        Ok(self.stack.borrow().get(idx))
    }

    fn store_arg(&mut self, i: usize, v: Value) -> VmResult<()> {
        let frame = *self.stack.borrow().current_frame();
        let idx = frame.arg_base + i;
        if idx >= frame.frame_base {
            return Err(VmError::Operand(format!("argument index {i} out of range")));
        }
        self.stack.borrow_mut().set(idx, v);
        Ok(())
    }

    fn load_local_slot(&self, i: usize) -> VmResult<Value> {
        let frame = *self.stack.borrow().current_frame();
        let idx = frame.frame_base + i;
        if idx >= self.stack.borrow().sp() {
            // The compiler is expected to reserve every local it references
            // before the first read; a read past `sp` reads as nil rather
            // than erroring, since nothing has stored there yet.
            return Ok(Value::NIL);
        }
        Ok(self.stack.borrow().get(idx))
    }

    fn store_local_slot(&mut self, i: usize, v: Value) {
        let frame = *self.stack.borrow().current_frame();
        let idx = frame.frame_base + i;
        let mut s = self.stack.borrow_mut();
        while s.sp() <= idx {
            s.push(Value::NIL);
        }
        s.set(idx, v);
    }

    // ---- globals ------------------------------------------------------------

    fn load_global_by_index(&self, callable: Value, idx: usize) -> VmResult<Value> {
        let module = unsafe { self.heap.function_data(callable).module };
        unsafe { self.heap.module_data(module).get_by_index(idx) }
            .ok_or_else(|| VmError::Operand(format!("global index {idx} out of range")))
    }

    fn store_global_by_index(&mut self, callable: Value, idx: usize, v: Value) -> VmResult<()> {
        let module = unsafe { self.heap.function_data(callable).module };
        let ok = unsafe { self.heap.module_data_mut(module).set_by_index(idx, v) };
        if !ok {
            return Err(VmError::Operand(format!("global index {idx} out of range")));
        }
        unsafe { self.heap.write_barrier(module, v) };
        Ok(())
    }

    fn load_global_by_name(&self, callable: Value, name: &str) -> VmResult<Value> {
        let module = unsafe { self.heap.function_data(callable).module };
        if let Some(v) = unsafe { self.heap.module_data(module).get_by_name(name) } {
            return Ok(v);
        }
        if !self.base_module.is_nil() && module != self.base_module {
            if let Some(v) = unsafe { self.heap.module_data(self.base_module).get_by_name(name) } {
                return Ok(v);
            }
        }
        Err(VmError::Name(format!("global {name:?} not found")))
    }

    /// Unlike attribute stores, assigning to an unresolved global name
    /// declares it in the current module rather than raising — this is the
    /// only way a hand-assembled (or compiled) top-level `x = 1` can work
    /// without the compiler pre-declaring every global up front.
    fn store_global_by_name(&mut self, callable: Value, name: &str, v: Value) -> VmResult<()> {
        let module = unsafe { self.heap.function_data(callable).module };
        if unsafe { self.heap.module_data_mut(module).set_by_name(name, v) } {
            unsafe { self.heap.write_barrier(module, v) };
            return Ok(());
        }
        unsafe {
            self.heap.module_data_mut(module).declare(name.to_owned(), v);
            self.heap.write_barrier(module, v);
        }
        Ok(())
    }

    // ---- attributes / methods ------------------------------------------------

    fn is_module(&self, v: Value) -> bool {
        v.is_ptr() && self.heap.class_of(v) == self.heap.builtin.module
    }

    /// Walk the inheritance chain by hand instead of via
    /// `ClassTable::find_in_chain`, because that helper reports only the
    /// `Slot` and not which ancestor it matched in — and a `Slot::Method`
    /// index is only meaningful relative to the class that owns that
    /// method table.
    fn resolve_slot(&self, class_ptr: usize, name: &str) -> (usize, Slot) {
        let classes = self.heap.classes.borrow();
        let mut cur = class_ptr;
        loop {
            let class = unsafe { classes.get(cur) };
            let slot = class.find(name);
            if !matches!(slot, Slot::Missing) {
                return (cur, slot);
            }
            match class.super_class {
                Some(s) => cur = s,
                None => return (cur, Slot::Missing),
            }
        }
    }

    fn resolve_method(&self, class_ptr: usize, name: &str) -> Option<Value> {
        let (owner, slot) = self.resolve_slot(class_ptr, name);
        match slot {
            Slot::Method(i) => unsafe { self.heap.classes.borrow().get(owner).method_at(i) },
            _ => None,
        }
    }

    pub(crate) fn load_attribute_value(&mut self, obj: Value, name: &str) -> VmResult<Value> {
        if self.is_module(obj) {
            return unsafe { self.heap.module_data(obj).get_by_name(name) }
                .ok_or_else(|| VmError::Name(format!("module has no global {name:?}")));
        }
        let class_ptr = self.heap.class_of(obj);
        let (owner, slot) = self.resolve_slot(class_ptr, name);
        match slot {
            Slot::Attribute(i) => Ok(unsafe { self.heap.instance_get_field(obj, i) }),
            Slot::Method(i) => Ok(unsafe { self.heap.classes.borrow().get(owner).method_at(i) }.unwrap_or(Value::NIL)),
            Slot::Missing => match self.resolve_method(class_ptr, "__find_attr__") {
                Some(finder) => {
                    let name_sym = self.heap.intern_str(name)?;
                    Ok(self.call_value_sync(finder, &[obj, name_sym], true)?.unwrap_or(Value::NIL))
                }
                None => Err(VmError::Name(format!("no attribute {name:?}"))),
            },
        }
    }

    pub(crate) fn store_attribute_value(&mut self, obj: Value, name: &str, val: Value) -> VmResult<()> {
        if self.is_module(obj) {
            if unsafe { self.heap.module_data_mut(obj).set_by_name(name, val) } {
                unsafe { self.heap.write_barrier(obj, val) };
                return Ok(());
            }
            unsafe {
                self.heap.module_data_mut(obj).declare(name.to_owned(), val);
                self.heap.write_barrier(obj, val);
            }
            return Ok(());
        }
        let class_ptr = self.heap.class_of(obj);
        let (_, slot) = self.resolve_slot(class_ptr, name);
        match slot {
            Slot::Attribute(i) => {
                unsafe { self.heap.instance_set_field(obj, i, val) };
                Ok(())
            }
            _ => Err(VmError::Type(format!(
                "cannot store attribute {name:?} on a non-module object with no such attribute"
            ))),
        }
    }

    /// Resolve `name` as a method on `receiver`'s class, falling back to
    /// `__find_meth__` on a miss. Shared by the `PrepMeth` opcode and the
    /// embedding API's `invoke(METHOD)`.
    pub(crate) fn resolve_callable_method(&mut self, receiver: Value, name: &str) -> VmResult<Value> {
        let class_ptr = self.heap.class_of(receiver);
        if let Some(m) = self.resolve_method(class_ptr, name) {
            return Ok(m);
        }
        match self.resolve_method(class_ptr, "__find_meth__") {
            Some(finder) => {
                let name_sym = self.heap.intern_str(name)?;
                let found = self.call_value_sync(finder, &[receiver, name_sym], true)?;
                match found {
                    Some(v) if !v.is_nil() => Ok(v),
                    _ => Err(VmError::Name(format!("no method {name:?}"))),
                }
            }
            None => Err(VmError::Name(format!("no method {name:?}"))),
        }
    }

    fn prep_method(&mut self, name: &str) -> VmResult<()> {
        let receiver = self.stack.borrow_mut().pop();
        let method = self.resolve_callable_method(receiver, name)?;
        let mut s = self.stack.borrow_mut();
        s.push(method);
        s.push(receiver);
        Ok(())
    }

    // ---- elements -------------------------------------------------------------

    fn index_as_usize(index: Value) -> VmResult<usize> {
        if !index.is_smallint() {
            return Err(VmError::Type("index must be a small int".into()));
        }
        let n = index.as_smallint();
        if n < 0 {
            return Err(VmError::Operand("negative index".into()));
        }
        Ok(n as usize)
    }

    fn load_element(&mut self, container: Value, index: Value) -> VmResult<Value> {
        let class_ptr = self.heap.class_of(container);
        if class_ptr == self.heap.builtin.array {
            let i = Self::index_as_usize(index)?;
            return unsafe { self.heap.array_data(container) }
                .get(i)
                .ok_or_else(|| VmError::Operand(format!("array index {i} out of range")));
        }
        if class_ptr == self.heap.builtin.tuple {
            let i = Self::index_as_usize(index)?;
            let data = unsafe { self.heap.tuple_data(container) };
            if !data.is_flat() {
                return Err(VmError::NotImplemented("indexing a non-flat tuple is not supported".into()));
            }
            let item = unsafe { data.as_slice_flat() }.get(i).copied();
            return item.ok_or_else(|| VmError::Operand(format!("tuple index {i} out of range")));
        }
        if class_ptr == self.heap.builtin.map {
            return unsafe { self.heap.map_data(container) }
                .get(index)
                .ok_or_else(|| VmError::Name("key not found in map".into()));
        }
        if class_ptr == self.heap.builtin.set {
            let present = unsafe { self.heap.set_data(container) }.contains(index);
            return Ok(self.heap.bool_value(present));
        }
        if class_ptr == self.heap.builtin.string {
            unsafe { self.heap.string_flatten(container)? };
            let i = Self::index_as_usize(index)?;
            let bytes = unsafe { self.heap.string_data(container).as_bytes_flat() }.to_vec();
            let ch = std::str::from_utf8(&bytes)
                .ok()
                .and_then(|s| s.chars().nth(i))
                .ok_or_else(|| VmError::Operand(format!("string index {i} out of range")))?;
            return self.heap.alloc_string(&ch.to_string()).map_err(Into::into);
        }
        Err(VmError::Type("value does not support element access".into()))
    }

    fn store_element(&mut self, container: Value, index: Value, val: Value) -> VmResult<()> {
        let class_ptr = self.heap.class_of(container);
        if class_ptr == self.heap.builtin.array {
            let i = Self::index_as_usize(index)?;
            let ok = unsafe { self.heap.array_data_mut(container).set(i, val) };
            if !ok {
                return Err(VmError::Operand(format!("array index {i} out of range")));
            }
            unsafe { self.heap.write_barrier(container, val) };
            return Ok(());
        }
        if class_ptr == self.heap.builtin.map {
            unsafe {
                self.heap.map_data_mut(container).set(index, val);
                self.heap.write_barrier(container, index);
                self.heap.write_barrier(container, val);
            }
            return Ok(());
        }
        if class_ptr == self.heap.builtin.set {
            let insert = self
                .heap
                .as_bool(val)
                .ok_or_else(|| VmError::Type("set element store value must be the boolean membership flag".into()))?;
            unsafe {
                if insert {
                    self.heap.set_data_mut(container).insert(index);
                } else {
                    self.heap.set_data_mut(container).remove(index);
                }
                self.heap.write_barrier(container, index);
            }
            return Ok(());
        }
        if class_ptr == self.heap.builtin.tuple {
            return Err(VmError::Type("tuple is immutable".into()));
        }
        if class_ptr == self.heap.builtin.string {
            return Err(VmError::Type("string is immutable".into()));
        }
        Err(VmError::Type("value does not support element assignment".into()))
    }

    // ---- arithmetic / comparison ------------------------------------------------

    fn classify_numeric(&self, v: Value) -> Option<Num> {
        if v.is_smallint() {
            return Some(Num::Small(v.as_smallint()));
        }
        if v.is_ptr() {
            let class = self.heap.class_of(v);
            if class == self.heap.builtin.int {
                return Some(Num::Big(unsafe { self.heap.boxed_int_data(v).value }));
            }
            if class == self.heap.builtin.float {
                return Some(Num::Float(unsafe { self.heap.float_data(v).value }));
            }
        }
        None
    }

    fn invoke_operator(&mut self, name: &str, a: Value, b: Value) -> VmResult<Value> {
        let class_ptr = self.heap.class_of(a);
        match self.resolve_method(class_ptr, name) {
            Some(method) => Ok(self.call_value_sync(method, &[a, b], true)?.unwrap_or(Value::NIL)),
            None => Err(VmError::Name(format!("no operator {name:?} on this value's class"))),
        }
    }

    fn binary_op(&mut self, op: Op, a: Value, b: Value) -> VmResult<Value> {
        match (self.classify_numeric(a), self.classify_numeric(b)) {
            (Some(na), Some(nb)) => self.numeric_binop(op, na, nb),
            _ => self.invoke_operator(op_symbol(op), a, b),
        }
    }

    fn numeric_binop(&mut self, op: Op, a: Num, b: Num) -> VmResult<Value> {
        use Op::*;
        if let (Num::Small(x), Num::Small(y)) = (a, b) {
            return self.smallint_binop(op, x, y);
        }
        if matches!(op, Shl | Shr | And | Or | Xor) {
            if matches!(a, Num::Float(_)) || matches!(b, Num::Float(_)) {
                return Err(VmError::Type("bitwise operator requires integer operands".into()));
            }
            let r = int_bitwise(op, a.as_i64(), b.as_i64());
            return self.heap.alloc_boxed_int(r).map_err(Into::into);
        }
        if matches!(a, Num::Float(_)) || matches!(b, Num::Float(_)) {
            let r = float_arith(op, a.as_f64(), b.as_f64())?;
            self.heap.alloc_float(r).map_err(Into::into)
        } else {
            let r = int_arith(op, a.as_i64(), b.as_i64())?;
            self.heap.alloc_boxed_int(r).map_err(Into::into)
        }
    }

    fn smallint_binop(&mut self, op: Op, x: isize, y: isize) -> VmResult<Value> {
        use Op::*;
        let raw = match op {
            Add => x.wrapping_add(y),
            Sub => x.wrapping_sub(y),
            Mul => x.wrapping_mul(y),
            Div => {
                if y == 0 {
                    return Err(VmError::Type("division by zero".into()));
                }
                x.wrapping_div(y)
            }
            Rem => {
                if y == 0 {
                    return Err(VmError::Type("division by zero".into()));
                }
                x.wrapping_rem(y)
            }
            Shl => x.wrapping_shl(y as u32),
            Shr => x.wrapping_shr(y as u32),
            And => x & y,
            Or => x | y,
            Xor => x ^ y,
            _ => unreachable!(),
        };
        Ok(Value::from_smallint(wrap_smallint(raw)).expect("wrapped value always fits"))
    }

    fn unary_op(&mut self, op: Op, a: Value) -> VmResult<Value> {
        match self.classify_numeric(a) {
            Some(Num::Small(x)) => {
                let r = match op {
                    Op::Neg => wrap_smallint(x.wrapping_neg()),
                    Op::Inv => wrap_smallint(!x),
                    _ => unreachable!(),
                };
                Ok(Value::from_smallint(r).expect("wrapped value always fits"))
            }
            Some(Num::Big(x)) => {
                let r = match op {
                    Op::Neg => x.wrapping_neg(),
                    Op::Inv => !x,
                    _ => unreachable!(),
                };
                self.heap.alloc_boxed_int(r).map_err(Into::into)
            }
            Some(Num::Float(x)) if op == Op::Neg => self.heap.alloc_float(-x).map_err(Into::into),
            Some(Num::Float(_)) => Err(VmError::Type("bitwise invert requires an integer operand".into())),
            None => {
                let name = if op == Op::Neg { "-@" } else { "~" };
                self.invoke_operator(name, a, a)
            }
        }
    }

    fn compare(&mut self, a: Value, b: Value) -> VmResult<i64> {
        if let (Some(na), Some(nb)) = (self.classify_numeric(a), self.classify_numeric(b)) {
            if matches!(na, Num::Float(_)) || matches!(nb, Num::Float(_)) {
                return match na.as_f64().partial_cmp(&nb.as_f64()) {
                    Some(o) => Ok(ordering_sign(o)),
                    None => Err(VmError::Type("NaN is not ordered".into())),
                };
            }
            return Ok(ordering_sign(na.as_i64().cmp(&nb.as_i64())));
        }
        let result = self.invoke_operator("<=>", a, b)?;
        if result.is_smallint() {
            Ok(result.as_smallint() as i64)
        } else {
            Err(VmError::Type("<=> must return a small int".into()))
        }
    }

    // ---- calling convention ------------------------------------------------

    fn check_arity(arity: fax_objects::types::AritySpec, argc: usize) -> VmResult<()> {
        let mandatory = arity.mandatory();
        if (argc as u32) < mandatory {
            return Err(VmError::Arity {
                min: mandatory,
                max: arity.max_args(),
                got: argc as u32,
            });
        }
        if let Some(max) = arity.max_args() {
            if argc as u32 > max {
                return Err(VmError::Arity {
                    min: mandatory,
                    max: Some(max),
                    got: argc as u32,
                });
            }
        }
        Ok(())
    }

    fn dispatch_call(&mut self, argc: usize, want_result: bool) -> VmResult<()> {
        let (arg_base, callable) = {
            let stack = self.stack.borrow();
            let sp = stack.sp();
            if sp < argc + 1 {
                return Err(VmError::Operand("call operand stack underflow".into()));
            }
            let arg_base = sp - argc;
            (arg_base, stack.get(arg_base - 1))
        };
        let class_ptr = self.heap.class_of(callable);
        if class_ptr == self.heap.builtin.function {
            self.call_script(callable, arg_base, argc, want_result)
        } else if class_ptr == self.heap.builtin.native_function {
            self.call_native(callable, arg_base, argc, want_result)
        } else {
            Err(VmError::Type("value is not callable".into()))
        }
    }

    fn call_script(&mut self, callable: Value, arg_base: usize, argc: usize, want_result: bool) -> VmResult<()> {
        let arity = unsafe { self.heap.function_data(callable).arity };
        Self::check_arity(arity, argc)?;
        let total_args = if arity.is_variadic() {
            argc
        } else {
            arity.max_args().expect("non-variadic arity always has a max") as usize
        };
        {
            let mut s = self.stack.borrow_mut();
            for _ in argc..total_args {
                s.push(Value::NIL);
            }
        }
        let frame_base = arg_base + total_args;
        self.stack.borrow_mut().push_frame(Frame {
            function: callable,
            ip: 0,
            arg_base,
            frame_base,
            want_result,
        });
        Ok(())
    }

    fn call_native(&mut self, callable: Value, arg_base: usize, argc: usize, want_result: bool) -> VmResult<()> {
        let (arity, entry) = {
            let data = unsafe { self.heap.native_function_data(callable) };
            (data.arity, data.entry)
        };
        Self::check_arity(arity, argc)?;
        let frame_base = arg_base + argc;
        self.stack.borrow_mut().push_frame(Frame {
            function: callable,
            ip: 0,
            arg_base,
            frame_base,
            want_result,
        });
        // SAFETY: `entry` is a `NativeEntry` stored by `fax-objects` exactly
        // for this purpose; casting `self` to the opaque `*mut c_void` it
        // expects and back again on the other side of the FFI boundary is
        // the contract `fax_objects::types::NativeEntry` documents.
        let rc = unsafe { entry(self as *mut Interp as *mut std::ffi::c_void) };
        if rc != 0 {
            let payload = self.stack.borrow_mut().pop();
            return Err(VmError::Native(payload));
        }
        let result = self.stack.borrow_mut().pop();
        self.stack.borrow_mut().pop_frame();
        self.stack.borrow_mut().truncate(arg_base.saturating_sub(1));
        if want_result {
            self.stack.borrow_mut().push(result);
        }
        Ok(())
    }

    fn do_return(&mut self, local: Option<u8>) -> VmResult<()> {
        let value = match local {
            None => self.stack.borrow_mut().pop(),
            Some(k) if k == RETLOC_TOP_OF_STACK => self.stack.borrow_mut().pop(),
            Some(k) => self.load_local_slot(k as usize)?,
        };
        let frame = self.stack.borrow_mut().pop_frame();
        self.stack.borrow_mut().truncate(frame.arg_base.saturating_sub(1));
        if frame.want_result {
            self.stack.borrow_mut().push(value);
        }
        Ok(())
    }

    // ---- exception unwinding ------------------------------------------------

    fn is_exception(&self, v: Value) -> bool {
        v.is_ptr() && self.heap.class_of(v) == self.heap.builtin.exception
    }

    /// Convert `err` into a live exception object (boxing it if it isn't
    /// already one) and pop frames down to `target_depth`, appending a
    /// backtrace entry for each. Returns the wrapped exception as a fresh
    /// `VmError::Native` for the caller to propagate.
    fn unwind(&mut self, target_depth: usize, err: VmError) -> VmError {
        let raw_payload = match err {
            VmError::Native(v) => v,
            other => {
                let msg = other.to_string();
                self.heap.alloc_string(&msg).unwrap_or(Value::NIL)
            }
        };
        let exc_value = if self.is_exception(raw_payload) {
            raw_payload
        } else {
            self.heap.alloc_exception(raw_payload).unwrap_or(raw_payload)
        };
        loop {
            if self.stack.borrow().frame_depth() <= target_depth {
                break;
            }
            let frame = *self.stack.borrow().current_frame();
            let is_native = self.heap.class_of(frame.function) == self.heap.builtin.native_function;
            let bt_function = if is_native { Value::NIL } else { frame.function };
            if self.is_exception(exc_value) {
                unsafe { self.heap.exception_data_mut(exc_value).push_frame(bt_function, frame.ip) };
            }
            self.stack.borrow_mut().pop_frame();
            self.stack.borrow_mut().truncate(frame.arg_base.saturating_sub(1));
        }
        VmError::Native(exc_value)
    }

    // ---- misc ---------------------------------------------------------------

    /// Render a value as a human-readable string, for the `print` native
    /// and for composing exception messages. Not a full `__str__`
    /// protocol — just enough to run the native prelude.
    pub(crate) fn display(&mut self, v: Value) -> VmResult<String> {
        if v.is_nil() {
            return Ok("nil".to_owned());
        }
        if v.is_smallint() {
            return Ok(v.as_smallint().to_string());
        }
        if self.heap.is_bool(v) {
            return Ok(self.heap.as_bool(v).unwrap().to_string());
        }
        let class_ptr = self.heap.class_of(v);
        if class_ptr == self.heap.builtin.int {
            return Ok(unsafe { self.heap.boxed_int_data(v).value }.to_string());
        }
        if class_ptr == self.heap.builtin.float {
            return Ok(unsafe { self.heap.float_data(v).value }.to_string());
        }
        if class_ptr == self.heap.builtin.symbol {
            let data = unsafe { self.heap.symbol_data(v) };
            return Ok(data.as_str().unwrap_or("<symbol>").to_owned());
        }
        if class_ptr == self.heap.builtin.string {
            unsafe { self.heap.string_flatten(v)? };
            let bytes = unsafe { self.heap.string_data(v).as_bytes_flat() }.to_vec();
            return Ok(String::from_utf8_lossy(&bytes).into_owned());
        }
        Ok(format!("#<object {:#x}>", v.as_ptr() as usize))
    }
}

fn int_arith(op: Op, x: i64, y: i64) -> VmResult<i64> {
    use Op::*;
    match op {
        Add => Ok(x.wrapping_add(y)),
        Sub => Ok(x.wrapping_sub(y)),
        Mul => Ok(x.wrapping_mul(y)),
        Div => {
            if y == 0 {
                Err(VmError::Type("division by zero".into()))
            } else {
                Ok(x.wrapping_div(y))
            }
        }
        Rem => {
            if y == 0 {
                Err(VmError::Type("division by zero".into()))
            } else {
                Ok(x.wrapping_rem(y))
            }
        }
        _ => unreachable!(),
    }
}

fn int_bitwise(op: Op, x: i64, y: i64) -> i64 {
    use Op::*;
    match op {
        Shl => x.wrapping_shl(y as u32),
        Shr => x.wrapping_shr(y as u32),
        And => x & y,
        Or => x | y,
        Xor => x ^ y,
        _ => unreachable!(),
    }
}

fn float_arith(op: Op, x: f64, y: f64) -> VmResult<f64> {
    use Op::*;
    Ok(match op {
        Add => x + y,
        Sub => x - y,
        Mul => x * y,
        Div => x / y,
        Rem => x % y,
        _ => unreachable!(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opcode::{encode_call_operand, Op};
    use fax_objects::types::{AritySpec, FunctionData};

    fn interp() -> Interp {
        Interp::new(GcConfig::default()).unwrap()
    }

    fn asm(bytes: &[u8]) -> Vec<u8> {
        bytes.to_vec()
    }

    fn top_level_module(interp: &mut Interp) -> Value {
        let name = interp.heap.intern_str("test").unwrap();
        interp.heap.alloc_module(name).unwrap()
    }

    fn make_function(interp: &mut Interp, module: Value, code: Vec<u8>, arity: AritySpec) -> Value {
        interp
            .heap
            .alloc_function(FunctionData {
                module,
                const_pool: Vec::new(),
                sym_pool: Vec::new(),
                code: code.into_boxed_slice(),
                arity,
                name: Value::NIL,
            })
            .unwrap()
    }

    fn run_niladic(interp: &mut Interp, code: Vec<u8>) -> Value {
        let module = top_level_module(interp);
        let f = make_function(interp, module, code, AritySpec::fixed(0, 0));
        interp.stack.borrow_mut().push(f);
        interp.invoke_prepared(0, true).unwrap();
        interp.stack.borrow_mut().pop()
    }

    #[test]
    fn arithmetic_precedence_literal() {
        // 1 + 2 * 3 -> push 1; push 2; push 3; mul; add; ret
        let code = asm(&[
            Op::LdInt as u8,
            1,
            Op::LdInt as u8,
            2,
            Op::LdInt as u8,
            3,
            Op::Mul as u8,
            Op::Add as u8,
            Op::Ret as u8,
        ]);
        let mut vm = interp();
        let result = run_niladic(&mut vm, code);
        assert_eq!(result.as_smallint(), 7);
    }

    #[test]
    fn smallint_division_by_zero_unwinds_to_an_exception() {
        let code = asm(&[Op::LdInt as u8, 1, Op::LdInt as u8, 0, Op::Div as u8, Op::Ret as u8]);
        let mut vm = interp();
        let module = top_level_module(&mut vm);
        let f = make_function(&mut vm, module, code, AritySpec::fixed(0, 0));
        vm.stack.borrow_mut().push(f);
        let err = vm.invoke_prepared(0, true).unwrap_err();
        match err {
            VmError::Native(exc) => assert!(vm.is_exception(exc)),
            other => panic!("expected a wrapped exception, got {other:?}"),
        }
        assert_eq!(vm.stack.borrow().frame_depth(), 0);
    }

    #[test]
    fn conditional_jump_selects_branch() {
        // a=1 b=0; if a<b jump to else; y = -1 else y = 1; return y (via local 0)
        let lt = Op::CmpLt as u8;
        let code = asm(&[
            Op::LdInt as u8,
            1, // a
            Op::LdInt as u8,
            0, // b
            lt,
            Op::JmpWhen as u8,
            4, // jump past the "then" body (3 bytes of LdInt+StLoc + 0 offset landing) into else
            Op::LdInt as u8,
            1,
            Op::StLoc as u8,
            0,
            Op::Jmp as u8,
            3,
            Op::LdInt as u8,
            (-1i8) as u8,
            Op::StLoc as u8,
            0,
            Op::LdLoc as u8,
            0,
            Op::Ret as u8,
        ]);
        let mut vm = interp();
        let result = run_niladic(&mut vm, code);
        assert_eq!(result.as_smallint(), -1);
    }

    #[test]
    fn loop_increments_local_to_target() {
        // i = 0; while i < 5 { i += 1 }; return i
        let code = asm(&[
            Op::LdInt as u8,
            0,
            Op::StLoc as u8,
            0,
            // loop head
            Op::LdLoc as u8,
            0,
            Op::LdInt as u8,
            5,
            Op::CmpLt as u8,
            Op::JmpUnls as u8,
            9, // exit the loop once i < 5 is false
            Op::LdLoc as u8,
            0,
            Op::LdInt as u8,
            1,
            Op::Add as u8,
            Op::StLoc as u8,
            0,
            Op::Jmp as u8,
            (-13i8) as u8,
            Op::LdLoc as u8,
            0,
            Op::Ret as u8,
        ]);
        let mut vm = interp();
        let result = run_niladic(&mut vm, code);
        assert_eq!(result.as_smallint(), 5);
    }

    #[test]
    fn nested_call_returns_callee_value() {
        let mut vm = interp();
        let module = top_level_module(&mut vm);
        // callee: return 41 + 1
        let callee_code = asm(&[Op::LdInt as u8, 41, Op::LdInt as u8, 1, Op::Add as u8, Op::Ret as u8]);
        let callee = make_function(&mut vm, module, callee_code, AritySpec::fixed(0, 0));

        let const_pool = vec![callee];
        let caller_code = asm(&[
            Op::LdCnst as u8,
            0,
            Op::Call as u8,
            encode_call_operand(0, true),
            Op::Ret as u8,
        ]);
        let caller = vm
            .heap
            .alloc_function(FunctionData {
                module,
                const_pool,
                sym_pool: Vec::new(),
                code: caller_code.into_boxed_slice(),
                arity: AritySpec::fixed(0, 0),
                name: Value::NIL,
            })
            .unwrap();
        vm.stack.borrow_mut().push(caller);
        vm.invoke_prepared(0, true).unwrap();
        let result = vm.stack.borrow_mut().pop();
        assert_eq!(result.as_smallint(), 42);
    }

    #[test]
    fn arity_mismatch_on_call_raises() {
        let mut vm = interp();
        let module = top_level_module(&mut vm);
        let callee = make_function(&mut vm, module, asm(&[Op::Ret as u8]), AritySpec::fixed(1, 0));
        vm.stack.borrow_mut().push(callee);
        let err = vm.invoke_prepared(0, true).unwrap_err();
        assert!(matches!(err, VmError::Native(_)));
    }
}
