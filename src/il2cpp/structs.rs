//! Direct reads of runtime structures
//!
//! All pointers passed here come from the runtime and live for the process
//! lifetime. Callers guarantee they are non-null and point at the named
//! structure.

use super::offsets::OFFSETS;
use crate::common::TypeCode;
use std::ffi::{c_void, CStr};
use std::os::raw::c_char;

/// Decoded `Il2CppType` bitfield word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeBits {
    pub attrs: u16,
    pub code: TypeCode,
    pub num_mods: u8,
    pub byref: bool,
    pub pinned: bool,
}

impl TypeBits {
    pub fn decode(word: u32) -> Self {
        TypeBits {
            attrs: (word & 0xFFFF) as u16,
            code: TypeCode::from_raw((word >> 16) & 0xFF),
            num_mods: ((word >> 24) & 0x3F) as u8,
            byref: (word >> 30) & 1 == 1,
            pinned: (word >> 31) & 1 == 1,
        }
    }
}

unsafe fn read_at<T: Copy>(base: *const c_void, offset: u32) -> T {
    std::ptr::read_unaligned((base as *const u8).add(offset as usize) as *const T)
}

pub unsafe fn type_bits(ty: *const c_void) -> TypeBits {
    TypeBits::decode(read_at::<u32>(ty, OFFSETS.type_bits))
}

pub unsafe fn type_data(ty: *const c_void) -> *const c_void {
    read_at::<*const c_void>(ty, OFFSETS.type_data)
}

/// Type arguments of a GENERICINST type, walking generic class -> context -> class_inst.
pub unsafe fn generic_args(ty: *const c_void) -> Vec<*const c_void> {
    let generic_class = type_data(ty);
    if generic_class.is_null() {
        return Vec::new();
    }
    let class_inst = read_at::<*const c_void>(generic_class, OFFSETS.generic_class_context);
    if class_inst.is_null() {
        return Vec::new();
    }
    let argc = read_at::<u32>(class_inst, OFFSETS.generic_inst_argc) as usize;
    let argv = read_at::<*const *const c_void>(class_inst, OFFSETS.generic_inst_argv);
    if argv.is_null() || argc > 32 {
        return Vec::new();
    }
    (0..argc).map(|i| *argv.add(i)).collect()
}

/// Position of a VAR/MVAR parameter.
pub unsafe fn generic_param_num(ty: *const c_void) -> Option<u16> {
    let param = type_data(ty);
    if param.is_null() {
        return None;
    }
    Some(read_at::<u16>(param, OFFSETS.generic_param_num))
}

/// `MethodInfo::methodPointer`
pub unsafe fn method_pointer(method: *const c_void) -> usize {
    read_at::<usize>(method, OFFSETS.method_pointer)
}

/// Start of the value payload of a boxed object.
pub unsafe fn unbox(obj: *mut c_void) -> *mut c_void {
    (obj as *mut u8).add(OFFSETS.object_header as usize) as *mut c_void
}

pub unsafe fn array_length(array: *const c_void) -> usize {
    read_at::<usize>(array, OFFSETS.array_length)
}

pub unsafe fn array_data(array: *const c_void) -> *mut c_void {
    (array as *mut u8).add(OFFSETS.array_elements as usize) as *mut c_void
}

/// Pointer-sized element `index` of a reference-type array.
pub unsafe fn array_ref_element(array: *const c_void, index: usize) -> *mut c_void {
    *(array_data(array) as *const *mut c_void).add(index)
}

/// UTF-16 contents of a managed string.
pub unsafe fn string_utf16<'a>(string: *const c_void) -> &'a [u16] {
    let len = read_at::<i32>(string, OFFSETS.string_length).max(0) as usize;
    let chars = (string as *const u8).add(OFFSETS.string_chars as usize) as *const u16;
    std::slice::from_raw_parts(chars, len)
}

pub unsafe fn read_string(string: *const c_void) -> String {
    String::from_utf16_lossy(string_utf16(string))
}

/// Copy a C string owned by the runtime. Null yields an empty string.
pub unsafe fn c_str(ptr: *const c_char) -> String {
    if ptr.is_null() {
        return String::new();
    }
    CStr::from_ptr(ptr).to_string_lossy().into_owned()
}
