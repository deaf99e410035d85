//! Invocation, field access, object and string creation, arrays

use super::{c_arg, guard, non_null, write_c_buffer};
use crate::backend::{FieldHandle, MetadataSource};
use crate::error::{Error, Result};
use crate::il2cpp::runtime::require;
use crate::il2cpp::{runtime, structs};
use std::ffi::c_void;
use std::os::raw::c_char;
use std::ptr;

/// Invoke `method` with an argument array of boxes (value types) and object
/// pointers (reference types). A thrown managed exception is written to
/// `exception` and reported as `ExceptionThrown`.
#[no_mangle]
pub unsafe extern "C" fn mdb_invoke_method(
    method: *mut c_void,
    instance: *mut c_void,
    args: *mut *mut c_void,
    exception: *mut *mut c_void,
) -> *mut c_void {
    if !exception.is_null() {
        *exception = ptr::null_mut();
    }
    guard(ptr::null_mut(), || {
        let method = non_null(method, "method")?;
        let rt = runtime()?;
        let mut thrown = ptr::null_mut();
        let result = rt.invoke(method, instance, args, &mut thrown);
        if !exception.is_null() {
            *exception = thrown;
        }
        result
    })
}

#[no_mangle]
pub unsafe extern "C" fn mdb_field_get_value(instance: *mut c_void, field: *mut c_void, out_value: *mut c_void) {
    guard((), || {
        let instance = non_null(instance, "instance")?;
        let field = non_null(field, "field")?;
        let out_value = non_null(out_value, "out_value")?;
        let get = require(runtime()?.exports().field_get_value, "il2cpp_field_get_value")?;
        get(instance, field, out_value);
        Ok(())
    })
}

#[no_mangle]
pub unsafe extern "C" fn mdb_field_set_value(instance: *mut c_void, field: *mut c_void, value: *mut c_void) {
    guard((), || {
        let instance = non_null(instance, "instance")?;
        let field = non_null(field, "field")?;
        let set = require(runtime()?.exports().field_set_value, "il2cpp_field_set_value")?;
        set(instance, field, value);
        Ok(())
    })
}

#[no_mangle]
pub unsafe extern "C" fn mdb_field_static_get_value(field: *mut c_void, out_value: *mut c_void) {
    guard((), || {
        let field = non_null(field, "field")?;
        let out_value = non_null(out_value, "out_value")?;
        let get = require(
            runtime()?.exports().field_static_get_value,
            "il2cpp_field_static_get_value",
        )?;
        get(field, out_value);
        Ok(())
    })
}

#[no_mangle]
pub unsafe extern "C" fn mdb_field_static_set_value(field: *mut c_void, value: *mut c_void) {
    guard((), || {
        let field = non_null(field, "field")?;
        let set = require(
            runtime()?.exports().field_static_set_value,
            "il2cpp_field_static_set_value",
        )?;
        set(field, value);
        Ok(())
    })
}

/// Offset and inline size of an instance field. Struct fields take the
/// unboxed size of their class; a field whose size is unknown is rejected.
fn field_layout<S: MetadataSource + ?Sized>(source: &S, field: FieldHandle) -> Result<(usize, usize)> {
    let offset = source.field_offset(field);
    if offset < 0 {
        return Err(Error::InvalidField);
    }
    let ty = source.field_type(field).ok_or(Error::InvalidField)?;
    let size = match source.type_code(ty).size() {
        0 => source
            .type_class(ty)
            .and_then(|class| source.class_value_size(class))
            .ok_or(Error::InvalidField)?,
        size => size,
    };
    Ok((offset as usize, size))
}

/// Bytes to copy: always exactly the field's size.
fn checked_copy_len(field_size: usize, caller_size: i32) -> Result<usize> {
    let available = usize::try_from(caller_size)
        .map_err(|_| Error::InvalidArgument(format!("size {}", caller_size)))?;
    if available < field_size {
        return Err(Error::BufferTooSmall {
            needed: field_size,
            available,
        });
    }
    Ok(field_size)
}

/// Copy a field straight out of the object at `instance + offset`.
#[no_mangle]
pub unsafe extern "C" fn mdb_field_get_value_direct(
    instance: *mut c_void,
    field: *mut c_void,
    out_buffer: *mut c_void,
    buffer_size: i32,
) -> bool {
    guard(false, || {
        let instance = non_null(instance, "instance")?;
        let field = FieldHandle(non_null(field, "field")? as usize);
        let out_buffer = non_null(out_buffer, "out_buffer")?;
        let (offset, size) = field_layout(runtime()?, field)?;
        let len = checked_copy_len(size, buffer_size)?;
        ptr::copy_nonoverlapping((instance as *const u8).add(offset), out_buffer as *mut u8, len);
        Ok(true)
    })
}

#[no_mangle]
pub unsafe extern "C" fn mdb_field_set_value_direct(
    instance: *mut c_void,
    field: *mut c_void,
    value: *mut c_void,
    value_size: i32,
) -> bool {
    guard(false, || {
        let instance = non_null(instance, "instance")?;
        let field = FieldHandle(non_null(field, "field")? as usize);
        let value = non_null(value, "value")?;
        let (offset, size) = field_layout(runtime()?, field)?;
        let len = checked_copy_len(size, value_size)?;
        ptr::copy_nonoverlapping(value as *const u8, (instance as *mut u8).add(offset), len);
        Ok(true)
    })
}

/// Allocate an object without running a constructor.
#[no_mangle]
pub extern "C" fn mdb_object_new(klass: *mut c_void) -> *mut c_void {
    guard(ptr::null_mut(), || {
        let klass = non_null(klass, "klass")?;
        runtime()?.object_new(klass)
    })
}

#[no_mangle]
pub unsafe extern "C" fn mdb_string_new(text: *const c_char) -> *mut c_void {
    guard(ptr::null_mut(), || {
        let text = c_arg(text, "str")?;
        runtime()?.string_new(text)
    })
}

/// Write a managed string as UTF-8. Returns the bytes written, truncating
/// with `BufferTooSmall` when the buffer cannot hold it.
#[no_mangle]
pub unsafe extern "C" fn mdb_string_to_utf8(string: *mut c_void, buffer: *mut c_char, buffer_size: i32) -> i32 {
    guard(-1, || {
        let string = non_null(string, "str")?;
        let text = structs::read_string(string);
        write_c_buffer(&text, buffer, buffer_size)
    })
}

/// Pointer to the value payload of a boxed value type.
#[no_mangle]
pub extern "C" fn mdb_object_unbox(obj: *mut c_void) -> *mut c_void {
    guard(ptr::null_mut(), || {
        let obj = non_null(obj, "obj")?;
        Ok(unsafe { structs::unbox(obj) })
    })
}

#[no_mangle]
pub extern "C" fn mdb_array_length(array: *mut c_void) -> i32 {
    guard(-1, || {
        let array = non_null(array, "array")?;
        Ok(unsafe { structs::array_length(array) } as i32)
    })
}

pub(crate) fn array_index(array: *mut c_void, index: i32) -> Result<usize> {
    let len = unsafe { structs::array_length(array) };
    usize::try_from(index)
        .ok()
        .filter(|i| *i < len)
        .ok_or_else(|| Error::InvalidArgument(format!("index {} out of bounds for length {}", index, len)))
}

/// Element of an array of references.
#[no_mangle]
pub extern "C" fn mdb_array_get_element(array: *mut c_void, index: i32) -> *mut c_void {
    guard(ptr::null_mut(), || {
        let array = non_null(array, "array")?;
        let index = array_index(array, index)?;
        Ok(unsafe { structs::array_ref_element(array, index) })
    })
}

#[no_mangle]
pub extern "C" fn mdb_array_get_element_class(array: *mut c_void) -> *mut c_void {
    guard(ptr::null_mut(), || {
        let array = non_null(array, "array")?;
        let rt = runtime()?;
        let class = rt.object_class(array).ok_or(Error::InvalidClass)?;
        rt.class_element_class(class)
            .map(|c| c.as_ptr())
            .ok_or(Error::InvalidClass)
    })
}
