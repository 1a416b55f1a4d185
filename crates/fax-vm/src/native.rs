//! The minimal native prelude seeded into `__builtins__`: just enough
//! beyond the opcode-level arithmetic to run a program without a
//! surrounding embedder registering its own modules.
//!
//! Native entries use the `NativeEntry` C-ABI signature `fax_objects`
//! already commits to (`unsafe extern "C" fn(*mut c_void) -> i32`): 0
//! means success with the result on top of the operand stack, nonzero
//! means an exception was pushed instead.

use std::ffi::c_void;

use crate::interp::Interp;
use crate::module_mgr::{ModuleManager, NativeModuleDef};

pub fn register(modules: &mut ModuleManager) {
    modules.register_native_module(NativeModuleDef {
        name: "__builtins__",
        entries: &[("print", native_print)],
    });
}

unsafe extern "C" fn native_print(vm: *mut c_void) -> i32 {
    let interp = &mut *(vm as *mut Interp);
    match print_impl(interp) {
        Ok(()) => 0,
        Err(code) => code,
    }
}

/// `print(*args)` — writes the space-joined display form of its arguments
/// followed by a newline, and returns nil.
fn print_impl(interp: &mut Interp) -> Result<(), i32> {
    let argc = interp.arg_count();
    let mut parts = Vec::with_capacity(argc);
    for i in 0..argc {
        let v = interp.load_arg(i).map_err(|_| -3)?;
        parts.push(interp.display(v).map_err(|_| -4)?);
    }
    println!("{}", parts.join(" "));
    interp.push_nil();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opcode::{encode_call_operand, Op};
    use fax_gc::{GcConfig, Value};
    use fax_objects::types::{AritySpec, FunctionData};

    #[test]
    fn print_is_registered_in_the_base_module() {
        let vm = Interp::new(GcConfig::default()).unwrap();
        unsafe {
            assert!(vm.heap.module_data(vm.base_module).index_of("print").is_some());
        }
    }

    #[test]
    fn print_returns_nil_and_does_not_error() {
        let mut vm = Interp::new(GcConfig::default()).unwrap();
        let name = vm.heap.intern_str("m").unwrap();
        let module = vm.heap.alloc_module(name).unwrap();

        let print_fn = unsafe { vm.heap.module_data(vm.base_module).get_by_name("print") }.unwrap();
        let const_pool = vec![print_fn, {
            let s = vm.heap.alloc_string("hi").unwrap();
            s
        }];
        let code = vec![
            Op::LdCnst as u8,
            0,
            Op::LdCnst as u8,
            1,
            Op::Call as u8,
            encode_call_operand(1, true),
            Op::Ret as u8,
        ];
        let f = vm
            .heap
            .alloc_function(FunctionData {
                module,
                const_pool,
                sym_pool: Vec::new(),
                code: code.into_boxed_slice(),
                arity: AritySpec::fixed(0, 0),
                name: Value::NIL,
            })
            .unwrap();
        vm.stack_handle().borrow_mut().push(f);
        vm.invoke_prepared(0, true).unwrap();
        let result = vm.stack_handle().borrow_mut().pop();
        assert!(result.is_nil());
    }
}
