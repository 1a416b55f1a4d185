//! The `extern "C"` veneer over [`crate::api`].
//!
//! Every function here is a thin, panic-safe wrapper: decode raw arguments,
//! call the matching safe method on [`Interp`], translate the `Result`
//! into one of the integer codes this boundary exposes (`0` success, `-1`
//! general failure, `-2` invalid argument, `-3` index/name not found, `-4`
//! type mismatch, `-128` not implemented), and never let a Rust panic
//! unwind across the FFI boundary.
//!
//! A non-Rust embedder links against this module; a Rust embedder should
//! prefer [`crate::api`] directly and never needs to see a `VmHandle`.

use std::ffi::{c_char, c_double, c_int, c_void, CStr};
use std::panic::{self, AssertUnwindSafe};

use crate::api::{ExceptionReadFlags, InvokeFlags, SysconfQuery, SysconfValue, SysctlValue};
use crate::error::VmError;
use crate::interp::Interp;

/// Opaque handle a C caller holds; never dereferenced on that side.
pub struct VmHandle(Interp);

const OK: c_int = 0;
const ERR_GENERAL: c_int = -1;
const ERR_INVALID_ARG: c_int = -2;
const ERR_NOT_FOUND: c_int = -3;
const ERR_TYPE: c_int = -4;
const ERR_NOT_IMPLEMENTED: c_int = -128;

fn code_of(err: &VmError) -> c_int {
    match err {
        VmError::Arity { .. } | VmError::Operand(_) => ERR_INVALID_ARG,
        VmError::Name(_) => ERR_NOT_FOUND,
        VmError::Type(_) => ERR_TYPE,
        VmError::NotImplemented(_) => ERR_NOT_IMPLEMENTED,
        VmError::Native(_) | VmError::Object(_) | VmError::Gc(_) => ERR_GENERAL,
    }
}

/// Run `f` with the panic/unwind boundary a C-ABI surface requires: a Rust
/// panic crossing into C caller code is undefined behavior, so it is
/// caught here and reported as `ERR_GENERAL` instead.
fn guard(f: impl FnOnce() -> Result<(), crate::error::VmError>) -> c_int {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(())) => OK,
        Ok(Err(e)) => code_of(&e),
        Err(_) => ERR_GENERAL,
    }
}

unsafe fn vm_mut<'a>(vm: *mut VmHandle) -> &'a mut Interp {
    &mut (*vm).0
}

unsafe fn c_str<'a>(s: *const c_char) -> Option<&'a str> {
    if s.is_null() {
        return None;
    }
    CStr::from_ptr(s).to_str().ok()
}

// ---- lifecycle -------------------------

/// Create a fresh VM with default configuration. Returns null on
/// (unrecoverable) construction failure.
///
/// # Safety
/// The returned pointer must be passed to [`fax_vm_destroy`] exactly once
/// and to no other `fax_vm_*` function after that.
#[no_mangle]
pub unsafe extern "C" fn fax_vm_create() -> *mut VmHandle {
    match panic::catch_unwind(|| Interp::new(fax_gc::GcConfig::default())) {
        Ok(Ok(interp)) => Box::into_raw(Box::new(VmHandle(interp))),
        _ => std::ptr::null_mut(),
    }
}

/// Tear down a VM created by [`fax_vm_create`], running finalizers for
/// every object still reachable.
///
/// # Safety
/// `vm` must be a live pointer returned by [`fax_vm_create`], not yet
/// destroyed.
#[no_mangle]
pub unsafe extern "C" fn fax_vm_destroy(vm: *mut VmHandle) {
    if !vm.is_null() {
        drop(Box::from_raw(vm));
    }
}

// ---- stack manipulation ----------------------------------------

/// # Safety
/// `vm` must be a live handle.
#[no_mangle]
pub unsafe extern "C" fn fax_push_nil(vm: *mut VmHandle) -> c_int {
    guard(|| {
        vm_mut(vm).push_nil();
        Ok(())
    })
}

/// # Safety
/// `vm` must be a live handle.
#[no_mangle]
pub unsafe extern "C" fn fax_push_bool(vm: *mut VmHandle, value: c_int) -> c_int {
    guard(|| {
        vm_mut(vm).push_bool(value != 0);
        Ok(())
    })
}

/// # Safety
/// `vm` must be a live handle.
#[no_mangle]
pub unsafe extern "C" fn fax_push_int(vm: *mut VmHandle, value: i64) -> c_int {
    guard(|| vm_mut(vm).push_int(value))
}

/// # Safety
/// `vm` must be a live handle.
#[no_mangle]
pub unsafe extern "C" fn fax_push_float(vm: *mut VmHandle, value: c_double) -> c_int {
    guard(|| vm_mut(vm).push_float(value))
}

/// # Safety
/// `vm` must be a live handle; `name` a NUL-terminated, valid UTF-8 string.
#[no_mangle]
pub unsafe extern "C" fn fax_push_symbol(vm: *mut VmHandle, name: *const c_char) -> c_int {
    guard(|| {
        let name = c_str(name).ok_or_else(|| VmError::Operand("name is not valid UTF-8".into()))?;
        vm_mut(vm).push_symbol(name)
    })
}

/// # Safety
/// `vm` must be a live handle; `s` a NUL-terminated, valid UTF-8 string.
#[no_mangle]
pub unsafe extern "C" fn fax_push_string(vm: *mut VmHandle, s: *const c_char) -> c_int {
    guard(|| {
        let s = c_str(s).ok_or_else(|| VmError::Operand("string is not valid UTF-8".into()))?;
        vm_mut(vm).push_string(s)
    })
}

/// # Safety
/// `vm` must be a live handle with at least `count` values pushed.
#[no_mangle]
pub unsafe extern "C" fn fax_make_array(vm: *mut VmHandle, count: usize) -> c_int {
    guard(|| vm_mut(vm).make_array(count))
}

/// # Safety
/// `vm` must be a live handle with at least `count` values pushed.
#[no_mangle]
pub unsafe extern "C" fn fax_make_tuple(vm: *mut VmHandle, count: usize) -> c_int {
    guard(|| vm_mut(vm).make_tuple(count))
}

/// # Safety
/// `vm` must be a live handle with at least `count` values pushed.
#[no_mangle]
pub unsafe extern "C" fn fax_make_set(vm: *mut VmHandle, count: usize) -> c_int {
    guard(|| vm_mut(vm).make_set(count))
}

/// # Safety
/// `vm` must be a live handle with at least `2 * count` values pushed.
#[no_mangle]
pub unsafe extern "C" fn fax_make_map(vm: *mut VmHandle, count: usize) -> c_int {
    guard(|| vm_mut(vm).make_map(count))
}

/// # Safety
/// `vm` must be a live handle.
#[no_mangle]
pub unsafe extern "C" fn fax_load_local(vm: *mut VmHandle, index: i32) -> c_int {
    guard(|| vm_mut(vm).load_local(index))
}

/// # Safety
/// `vm` must be a live handle with a value on top of the stack.
#[no_mangle]
pub unsafe extern "C" fn fax_store_local(vm: *mut VmHandle, index: i32) -> c_int {
    guard(|| vm_mut(vm).store_local(index))
}

/// # Safety
/// `vm` must be a live handle; `name` a NUL-terminated, valid UTF-8 string.
#[no_mangle]
pub unsafe extern "C" fn fax_load_global(vm: *mut VmHandle, name: *const c_char) -> c_int {
    guard(|| {
        let name = c_str(name).ok_or_else(|| VmError::Operand("name is not valid UTF-8".into()))?;
        vm_mut(vm).load_global(name)
    })
}

/// # Safety
/// `vm` must be a live handle with a value on top of the stack; `name` a
/// NUL-terminated, valid UTF-8 string.
#[no_mangle]
pub unsafe extern "C" fn fax_store_global(vm: *mut VmHandle, name: *const c_char) -> c_int {
    guard(|| {
        let name = c_str(name).ok_or_else(|| VmError::Operand("name is not valid UTF-8".into()))?;
        vm_mut(vm).store_global(name)
    })
}

// ---- typed reads --------------------------------------

/// # Safety
/// `vm` must be a live handle; `out` a valid, writable `bool`-sized pointer.
#[no_mangle]
pub unsafe extern "C" fn fax_read_bool(vm: *mut VmHandle, depth: usize, out: *mut c_int) -> c_int {
    guard(|| {
        let v = vm_mut(vm).read_bool(depth)?;
        if !out.is_null() {
            *out = v as c_int;
        }
        Ok(())
    })
}

/// # Safety
/// `vm` must be a live handle; `out` a valid, writable `i64` pointer.
#[no_mangle]
pub unsafe extern "C" fn fax_read_int(vm: *mut VmHandle, depth: usize, out: *mut i64) -> c_int {
    guard(|| {
        let v = vm_mut(vm).read_int(depth)?;
        if !out.is_null() {
            *out = v;
        }
        Ok(())
    })
}

/// # Safety
/// `vm` must be a live handle; `out` a valid, writable `f64` pointer.
#[no_mangle]
pub unsafe extern "C" fn fax_read_float(vm: *mut VmHandle, depth: usize, out: *mut c_double) -> c_int {
    guard(|| {
        let v = vm_mut(vm).read_float(depth)?;
        if !out.is_null() {
            *out = v;
        }
        Ok(())
    })
}

/// Copy the string/symbol at `depth` into `buf` (size `buf_len`), truncating
/// (but always NUL-terminating if `buf_len > 0`) if it does not fit. Writes
/// the full untruncated byte length to `*out_len` when non-null, matching
/// the "index out of range or buffer too small" convention of `read_args`'s
/// `s*` format.
///
/// # Safety
/// `vm` must be a live handle; `buf` valid and writable for `buf_len`
/// bytes if non-null; `out_len` a valid, writable `usize` pointer if
/// non-null.
#[no_mangle]
pub unsafe extern "C" fn fax_read_string_to(
    vm: *mut VmHandle,
    depth: usize,
    buf: *mut c_char,
    buf_len: usize,
    out_len: *mut usize,
) -> c_int {
    guard(|| {
        let s = vm_mut(vm).read_string(depth)?;
        if !out_len.is_null() {
            *out_len = s.len();
        }
        if !buf.is_null() && buf_len > 0 {
            let n = s.len().min(buf_len - 1);
            std::ptr::copy_nonoverlapping(s.as_ptr(), buf as *mut u8, n);
            *buf.add(n) = 0;
        }
        Ok(())
    })
}

/// # Safety
/// `vm` must be a live handle; `out` a valid, writable `usize` pointer.
#[no_mangle]
pub unsafe extern "C" fn fax_read_array_len(vm: *mut VmHandle, depth: usize, out: *mut usize) -> c_int {
    guard(|| {
        let v = vm_mut(vm).read_array(depth, 0)?;
        if !out.is_null() {
            *out = v.as_smallint() as usize;
        }
        Ok(())
    })
}

// ---- stack shuffling --------------------------------------------------------

/// # Safety
/// `vm` must be a live handle with at least `n + 1` values on the stack.
#[no_mangle]
pub unsafe extern "C" fn fax_dup(vm: *mut VmHandle, n: usize) -> c_int {
    guard(|| {
        vm_mut(vm).dup(n);
        Ok(())
    })
}

/// # Safety
/// `vm` must be a live handle with at least two values on the stack.
#[no_mangle]
pub unsafe extern "C" fn fax_swap(vm: *mut VmHandle) -> c_int {
    guard(|| {
        vm_mut(vm).swap();
        Ok(())
    })
}

/// Drop the top `n` values; `n == 0` reports the current depth without
/// modifying the stack, written to `*out` when
/// non-null.
///
/// # Safety
/// `vm` must be a live handle; `out` a valid, writable `usize` pointer if
/// non-null.
#[no_mangle]
pub unsafe extern "C" fn fax_drop(vm: *mut VmHandle, n: usize, out: *mut usize) -> c_int {
    guard(|| {
        let depth = vm_mut(vm).drop(n);
        if !out.is_null() {
            *out = depth;
        }
        Ok(())
    })
}

// ---- invocation -------------------------------------------------------------

/// Plain-call flag for [`fax_invoke`]'s `flags` parameter.
pub const FAX_INVOKE_PLAIN: c_int = 0;
/// Method-call flag: see [`InvokeFlags::METHOD`].
pub const FAX_INVOKE_METHOD: c_int = 1 << 0;
/// Module-run flag: see [`InvokeFlags::MODULE_RUN`].
pub const FAX_INVOKE_MODULE_RUN: c_int = 1 << 1;
/// No-result flag: see [`InvokeFlags::NO_RESULT`].
pub const FAX_INVOKE_NO_RESULT: c_int = 1 << 2;

/// Invoke the callable at `sp - argc - 1`. On a thrown (uncaught)
/// exception the exception object is left on top of the stack and
/// `ERR_GENERAL` is returned.
///
/// # Safety
/// `vm` must be a live handle with `argc` (plus the callable, plus for
/// `FAX_INVOKE_METHOD` the receiver and name) already pushed.
#[no_mangle]
pub unsafe extern "C" fn fax_invoke(vm: *mut VmHandle, argc: usize, flags: c_int) -> c_int {
    guard(|| {
        let flags = InvokeFlags::from_bits_truncate(flags as u8);
        vm_mut(vm).invoke(argc, flags)
    })
}

// ---- exceptions --------------------------------------------------------------

/// # Safety
/// `vm` must be a live handle with a value on top of the stack to wrap.
#[no_mangle]
pub unsafe extern "C" fn fax_make_exception(vm: *mut VmHandle) -> c_int {
    guard(|| {
        let payload = {
            let interp = vm_mut(vm);
            interp.stack_handle().borrow_mut().pop()
        };
        vm_mut(vm).make_exception(payload)
    })
}

/// Render the exception at `depth` per `flags` (`1`=message, `2`=backtrace,
/// `3`=both) into `buf`/`buf_len`, NUL-terminated, truncating if needed;
/// writes the untruncated length to `*out_len` when non-null.
///
/// # Safety
/// `vm` must be a live handle; `buf` valid and writable for `buf_len`
/// bytes if non-null; `out_len` a valid, writable `usize` pointer if
/// non-null.
#[no_mangle]
pub unsafe extern "C" fn fax_read_exception(
    vm: *mut VmHandle,
    depth: usize,
    flags: c_int,
    buf: *mut c_char,
    buf_len: usize,
    out_len: *mut usize,
) -> c_int {
    guard(|| {
        let flags = ExceptionReadFlags::from_bits_truncate(flags as u8);
        let s = vm_mut(vm).read_exception(depth, flags)?;
        if !out_len.is_null() {
            *out_len = s.len();
        }
        if !buf.is_null() && buf_len > 0 {
            let n = s.len().min(buf_len - 1);
            std::ptr::copy_nonoverlapping(s.as_ptr(), buf as *mut u8, n);
            *buf.add(n) = 0;
        }
        Ok(())
    })
}

// ---- configuration ---------------------------------

/// `name`: `0`=`STACKSIZE` (`value` points at a `usize`), `1`=`VERBOSE`
/// (`value` points at a `c_int`, nonzero enables dispatch tracing). There
/// is no C-surface `DEFAULTPATH` entry point since module search-path
/// *policy* is out of scope; embedders that need it use
/// [`crate::api::Interp::sysctl`] directly from Rust.
///
/// # Safety
/// `vm` must be a live handle; `value` must point at data matching `name`'s
/// expected type, for at least `size` bytes.
#[no_mangle]
pub unsafe extern "C" fn fax_sysctl(vm: *mut VmHandle, name: c_int, value: *const c_void, _size: usize) -> c_int {
    guard(|| {
        let interp = vm_mut(vm);
        match name {
            0 => {
                let size = if value.is_null() { 0 } else { *(value as *const usize) };
                interp.sysctl(SysctlValue::StackSize(size)).map_err(|_| VmError::Operand("sysctl rejected".into()))
            }
            1 => {
                let on = if value.is_null() { false } else { *(value as *const c_int) != 0 };
                interp
                    .sysctl(SysctlValue::VerboseDispatch(on))
                    .map_err(|_| VmError::Operand("sysctl rejected".into()))
            }
            _ => Err(VmError::Operand(format!("unknown sysctl name {name}"))),
        }
    })
}

/// `name`: `0`=version string (copied into `buf`/`buf_len`, `*out_int`
/// untouched), `1`=`SMALLINT_MIN`, `2`=`SMALLINT_MAX` (written to
/// `*out_int`, `buf` untouched).
///
/// # Safety
/// `vm` must be a live handle; `buf` valid and writable for `buf_len` bytes
/// if non-null; `out_int` a valid, writable `i64` pointer if non-null.
#[no_mangle]
pub unsafe extern "C" fn fax_sysconf(
    vm: *const VmHandle,
    name: c_int,
    buf: *mut c_char,
    buf_len: usize,
    out_int: *mut i64,
) -> c_int {
    let interp = &(*vm).0;
    let query = match name {
        0 => SysconfQuery::VersionString,
        1 => SysconfQuery::SmallintMin,
        2 => SysconfQuery::SmallintMax,
        _ => return ERR_INVALID_ARG,
    };
    match interp.sysconf(query) {
        SysconfValue::Str(s) => {
            if !buf.is_null() && buf_len > 0 {
                let n = s.len().min(buf_len - 1);
                std::ptr::copy_nonoverlapping(s.as_ptr(), buf as *mut u8, n);
                *buf.add(n) = 0;
            }
            OK
        }
        SysconfValue::Int(n) => {
            if !out_int.is_null() {
                *out_int = n;
            }
            OK
        }
    }
}
