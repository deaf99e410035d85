//! Hook exports
//!
//! Creation calls return a positive handle or the negated error code and
//! write the trampoline for calling the original code to `out_original`.

use super::{guard, handle_or_code, non_null, status};
use crate::backend::{MethodHandle, MetadataSource};
use crate::error::{Error, Result};
use crate::hook::{self, engine, HookInfo};
use crate::il2cpp::runtime;
use std::ffi::c_void;
use std::os::raw::c_char;
use std::ptr;

pub const DESCRIPTION_LEN: usize = 256;

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct MdbHookDebugInfo {
    pub handle: i64,
    pub target: *mut c_void,
    pub detour: *mut c_void,
    pub trampoline: *mut c_void,
    pub enabled: bool,
    pub description: [c_char; DESCRIPTION_LEN],
}

impl MdbHookDebugInfo {
    fn fill(info: &HookInfo) -> Self {
        let mut description = [0 as c_char; DESCRIPTION_LEN];
        let bytes = info.description.as_bytes();
        let mut len = bytes.len().min(DESCRIPTION_LEN - 1);
        while !info.description.is_char_boundary(len) {
            len -= 1;
        }
        for (dst, src) in description.iter_mut().zip(&bytes[..len]) {
            *dst = *src as c_char;
        }
        MdbHookDebugInfo {
            handle: info.handle,
            target: info.target as *mut c_void,
            detour: info.detour as *mut c_void,
            trampoline: info.trampoline as *mut c_void,
            enabled: info.enabled,
            description,
        }
    }
}

unsafe fn finish(installed: Result<(i64, usize)>, out_original: *mut *mut c_void) -> Result<i64> {
    let (handle, trampoline) = installed?;
    if !out_original.is_null() {
        *out_original = trampoline as *mut c_void;
    }
    Ok(handle)
}

/// Hook the compiled code of a managed method.
#[no_mangle]
pub unsafe extern "C" fn mdb_create_hook(
    method: *mut c_void,
    detour: *mut c_void,
    out_original: *mut *mut c_void,
) -> i64 {
    handle_or_code(|| {
        let method = MethodHandle(non_null(method, "method")? as usize);
        let detour = non_null(detour, "detour")? as usize;
        finish(hook::hook_method(method, detour), out_original)
    })
}

/// Hook the function at `GameAssembly base + rva`.
#[no_mangle]
pub unsafe extern "C" fn mdb_create_hook_rva(rva: u64, detour: *mut c_void, out_original: *mut *mut c_void) -> i64 {
    handle_or_code(|| {
        let detour = non_null(detour, "detour")? as usize;
        finish(hook::hook_rva(rva, detour), out_original)
    })
}

#[no_mangle]
pub unsafe extern "C" fn mdb_create_hook_ptr(
    target: *mut c_void,
    detour: *mut c_void,
    out_original: *mut *mut c_void,
) -> i64 {
    handle_or_code(|| {
        let target = non_null(target, "target")? as usize;
        let detour = non_null(detour, "detour")? as usize;
        finish(hook::hook_pointer(target, detour), out_original)
    })
}

#[no_mangle]
pub extern "C" fn mdb_remove_hook(handle: i64) -> i32 {
    status(|| engine().remove(handle))
}

#[no_mangle]
pub extern "C" fn mdb_set_hook_enabled(handle: i64, enabled: bool) -> i32 {
    status(|| engine().set_enabled(handle, enabled))
}

/// Parameter count and call shape of a method, for building a matching
/// detour signature.
#[no_mangle]
pub unsafe extern "C" fn mdb_get_method_info(
    method: *mut c_void,
    out_param_count: *mut i32,
    out_is_static: *mut bool,
    out_has_return: *mut bool,
) -> i32 {
    status(|| {
        let method = MethodHandle(non_null(method, "method")? as usize);
        let rt = runtime()?;
        if rt.method_pointer(method) == 0 && rt.method_name(method).is_empty() {
            return Err(Error::InvalidMethod);
        }
        let shape = hook::method_shape(rt, method);
        if !out_param_count.is_null() {
            *out_param_count = shape.param_count as i32;
        }
        if !out_is_static.is_null() {
            *out_is_static = shape.is_static;
        }
        if !out_has_return.is_null() {
            *out_has_return = shape.has_return;
        }
        Ok(())
    })
}

#[no_mangle]
pub extern "C" fn mdb_hook_get_count() -> i32 {
    guard(0, || Ok(engine().count() as i32))
}

/// Snapshot of the `index`-th hook in handle order.
#[no_mangle]
pub unsafe extern "C" fn mdb_hook_get_debug_info(index: i32, out_info: *mut MdbHookDebugInfo) -> bool {
    guard(false, || {
        let out_info = non_null(out_info, "out_info")?;
        let info = usize::try_from(index)
            .ok()
            .and_then(|i| engine().info_at(i))
            .ok_or_else(|| Error::InvalidArgument(format!("hook index {}", index)))?;
        ptr::write(out_info, MdbHookDebugInfo::fill(&info));
        Ok(true)
    })
}

#[no_mangle]
pub extern "C" fn mdb_hook_set_debug_enabled(enabled: bool) {
    guard((), || {
        hook::set_debug(enabled);
        Ok(())
    })
}

#[no_mangle]
pub extern "C" fn mdb_hook_is_debug_enabled() -> bool {
    guard(false, || Ok(hook::debug_enabled()))
}

/// Log every installed hook.
#[no_mangle]
pub extern "C" fn mdb_hook_dump_all() {
    guard((), || {
        engine().dump();
        Ok(())
    })
}
