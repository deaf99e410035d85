//! Initialisation, thread attach, last error and raw module access

use super::{guard, last_error, status};
use crate::error::{Error, Result};
use crate::il2cpp::{runtime, Il2CppRuntime};
use std::ffi::c_void;
use std::os::raw::c_char;

/// Bind the runtime exports. Returns 0 or the error code.
#[no_mangle]
pub extern "C" fn mdb_init() -> i32 {
    status(|| runtime().map(drop))
}

#[no_mangle]
pub extern "C" fn mdb_domain_get() -> *mut c_void {
    guard(std::ptr::null_mut(), || runtime()?.domain())
}

/// Attach the calling thread. `domain` is accepted for callers that already
/// hold one; the runtime's own domain is used either way.
#[no_mangle]
pub extern "C" fn mdb_thread_attach(_domain: *mut c_void) -> *mut c_void {
    guard(std::ptr::null_mut(), || runtime()?.attach_current_thread())
}

/// Message of the last failed call on this thread. Valid until the next
/// bridge call on the same thread.
#[no_mangle]
pub extern "C" fn mdb_get_last_error() -> *const c_char {
    last_error::message_ptr()
}

#[no_mangle]
pub extern "C" fn mdb_get_last_error_code() -> i32 {
    last_error::code().as_i32()
}

#[no_mangle]
pub extern "C" fn mdb_get_gameassembly_base() -> *mut c_void {
    guard(std::ptr::null_mut(), || Ok(runtime()?.base() as *mut c_void))
}

pub(crate) fn rva_to_pointer(rt: &Il2CppRuntime, rva: u64) -> Result<usize> {
    let base = rt.base();
    if base == 0 {
        return Err(Error::NotInitialized);
    }
    base.checked_add(rva as usize)
        .ok_or_else(|| Error::InvalidArgument(format!("RVA 0x{:X} out of range", rva)))
}

#[no_mangle]
pub extern "C" fn mdb_get_method_pointer_from_rva(rva: u64) -> *mut c_void {
    guard(std::ptr::null_mut(), || {
        Ok(rva_to_pointer(runtime()?, rva)? as *mut c_void)
    })
}
