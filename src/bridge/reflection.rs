//! Class, method, field and property lookup and reflection helpers

use super::{c_arg, guard, non_null, opaque};
use crate::backend::*;
use crate::common::attributes::field_attrs;
use crate::error::{Error, Result};
use crate::il2cpp::runtime::require;
use crate::il2cpp::{runtime, structs};
use std::ffi::c_void;
use std::os::raw::c_char;
use std::ptr;

fn class_arg(klass: *mut c_void) -> Result<ClassHandle> {
    ClassHandle::from_ptr(non_null(klass, "klass")?).ok_or(Error::NullPointer("klass"))
}

fn method_arg(method: *mut c_void) -> Result<MethodHandle> {
    MethodHandle::from_ptr(non_null(method, "method")?).ok_or(Error::NullPointer("method"))
}

fn field_arg(field: *mut c_void) -> Result<FieldHandle> {
    FieldHandle::from_ptr(non_null(field, "field")?).ok_or(Error::NullPointer("field"))
}

fn type_arg(ty: *mut c_void) -> Result<TypeHandle> {
    TypeHandle::from_ptr(non_null(ty, "type")?).ok_or(Error::NullPointer("type"))
}

fn property_arg(prop: *mut c_void) -> Result<PropertyHandle> {
    PropertyHandle::from_ptr(non_null(prop, "property")?).ok_or(Error::NullPointer("property"))
}

fn nth<T: Copy>(items: Vec<T>, index: i32, what: &str) -> Result<T> {
    usize::try_from(index)
        .ok()
        .and_then(|i| items.get(i).copied())
        .ok_or_else(|| Error::InvalidArgument(format!("{} index {} out of range ({})", what, index, items.len())))
}

/// Find a class by assembly, namespace and name. An empty assembly name
/// searches every loaded image.
#[no_mangle]
pub unsafe extern "C" fn mdb_find_class(
    assembly: *const c_char,
    namespace: *const c_char,
    name: *const c_char,
) -> *mut c_void {
    guard(ptr::null_mut(), || {
        let assembly = c_arg(assembly, "assembly")?;
        let namespace = c_arg(namespace, "namespace")?;
        let name = c_arg(name, "name")?;
        let rt = runtime()?;
        if assembly.is_empty() {
            rt.find_class_anywhere(namespace, name)
        } else {
            rt.find_class(assembly, namespace, name)
        }
    })
}

#[no_mangle]
pub extern "C" fn mdb_get_class_size(klass: *mut c_void) -> i32 {
    guard(-1, || {
        let class = class_arg(klass)?;
        runtime()?
            .class_instance_size(class)
            .ok_or_else(|| Error::ExportNotFound("il2cpp_class_instance_size".into()))
    })
}

/// Method by name; `param_count == -1` searches every count up to 16.
#[no_mangle]
pub unsafe extern "C" fn mdb_get_method(klass: *mut c_void, name: *const c_char, param_count: i32) -> *mut c_void {
    guard(ptr::null_mut(), || {
        let klass = non_null(klass, "klass")?;
        let name = c_arg(name, "name")?;
        runtime()?.find_method(klass, name, param_count).map(opaque)
    })
}

#[no_mangle]
pub extern "C" fn mdb_get_method_pointer(method: *mut c_void) -> *mut c_void {
    guard(ptr::null_mut(), || {
        let method = non_null(method, "method")?;
        match unsafe { structs::method_pointer(method) } {
            0 => Err(Error::MethodPointerNull),
            p => Ok(p as *mut c_void),
        }
    })
}

#[no_mangle]
pub unsafe extern "C" fn mdb_get_field(klass: *mut c_void, name: *const c_char) -> *mut c_void {
    guard(ptr::null_mut(), || {
        let klass = non_null(klass, "klass")?;
        let name = c_arg(name, "name")?;
        runtime()?.find_field(klass, name)
    })
}

#[no_mangle]
pub extern "C" fn mdb_get_field_offset(field: *mut c_void) -> i32 {
    guard(-1, || {
        let field = field_arg(field)?;
        Ok(runtime()?.field_offset(field))
    })
}

#[no_mangle]
pub extern "C" fn mdb_property_get_get_method(prop: *mut c_void) -> *mut c_void {
    guard(ptr::null_mut(), || {
        let prop = property_arg(prop)?;
        runtime()?.property_getter(prop).map(|h| h.as_ptr()).ok_or(Error::MethodNotFound("getter".into()))
    })
}

#[no_mangle]
pub extern "C" fn mdb_property_get_set_method(prop: *mut c_void) -> *mut c_void {
    guard(ptr::null_mut(), || {
        let prop = property_arg(prop)?;
        runtime()?.property_setter(prop).map(|h| h.as_ptr()).ok_or(Error::MethodNotFound("setter".into()))
    })
}

#[no_mangle]
pub extern "C" fn mdb_class_get_name(klass: *mut c_void) -> *const c_char {
    guard(ptr::null(), || {
        let klass = non_null(klass, "klass")?;
        let get = require(runtime()?.exports().class_get_name, "il2cpp_class_get_name")?;
        Ok(unsafe { get(klass) })
    })
}

#[no_mangle]
pub extern "C" fn mdb_class_get_namespace(klass: *mut c_void) -> *const c_char {
    guard(ptr::null(), || {
        let klass = non_null(klass, "klass")?;
        let get = require(runtime()?.exports().class_get_namespace, "il2cpp_class_get_namespace")?;
        Ok(unsafe { get(klass) })
    })
}

#[no_mangle]
pub extern "C" fn mdb_class_get_type(klass: *mut c_void) -> *mut c_void {
    guard(ptr::null_mut(), || {
        let class = class_arg(klass)?;
        runtime()?.class_type(class).map(|h| h.as_ptr()).ok_or(Error::InvalidClass)
    })
}

#[no_mangle]
pub extern "C" fn mdb_class_get_parent(klass: *mut c_void) -> *mut c_void {
    guard(ptr::null_mut(), || {
        let class = class_arg(klass)?;
        Ok(runtime()?
            .class_parent(class)
            .map_or(ptr::null_mut(), |p| p.as_ptr()))
    })
}

#[no_mangle]
pub extern "C" fn mdb_class_get_element_class(klass: *mut c_void) -> *mut c_void {
    guard(ptr::null_mut(), || {
        let class = class_arg(klass)?;
        runtime()?.class_element_class(class).map(|h| h.as_ptr()).ok_or(Error::InvalidClass)
    })
}

/// 1 for value types, 0 for reference types, -1 on error.
#[no_mangle]
pub extern "C" fn mdb_class_is_valuetype(klass: *mut c_void) -> i32 {
    guard(-1, || {
        let class = class_arg(klass)?;
        Ok(runtime()?.class_is_valuetype(class) as i32)
    })
}

#[no_mangle]
pub extern "C" fn mdb_type_get_object(ty: *mut c_void) -> *mut c_void {
    guard(ptr::null_mut(), || {
        let ty = type_arg(ty)?;
        runtime()?
            .type_object(ty)
            .ok_or_else(|| Error::ExportNotFound("il2cpp_type_get_object".into()))
    })
}

#[no_mangle]
pub extern "C" fn mdb_type_get_type_enum(ty: *mut c_void) -> i32 {
    guard(-1, || {
        let ty = type_arg(ty)?;
        Ok(runtime()?.type_code(ty) as i32)
    })
}

#[no_mangle]
pub extern "C" fn mdb_type_get_class(ty: *mut c_void) -> *mut c_void {
    guard(ptr::null_mut(), || {
        let ty = type_arg(ty)?;
        runtime()?.type_class(ty).map(|h| h.as_ptr()).ok_or(Error::InvalidClass)
    })
}

#[no_mangle]
pub extern "C" fn mdb_object_get_class(instance: *mut c_void) -> *mut c_void {
    guard(ptr::null_mut(), || {
        let instance = non_null(instance, "instance")?;
        runtime()?.object_class(instance).map(|h| h.as_ptr()).ok_or(Error::InvalidClass)
    })
}

#[no_mangle]
pub extern "C" fn mdb_method_get_name(method: *mut c_void) -> *const c_char {
    guard(ptr::null(), || {
        let method = non_null(method, "method")?;
        let get = require(runtime()?.exports().method_get_name, "il2cpp_method_get_name")?;
        Ok(unsafe { get(method) })
    })
}

#[no_mangle]
pub extern "C" fn mdb_method_get_param_count(method: *mut c_void) -> i32 {
    guard(-1, || {
        let method = method_arg(method)?;
        Ok(runtime()?.method_param_count(method) as i32)
    })
}

#[no_mangle]
pub extern "C" fn mdb_method_get_param_type(method: *mut c_void, index: i32) -> *mut c_void {
    guard(ptr::null_mut(), || {
        let method = method_arg(method)?;
        let rt = runtime()?;
        let count = rt.method_param_count(method);
        let index = usize::try_from(index)
            .ok()
            .filter(|i| *i < count)
            .ok_or_else(|| Error::InvalidArgument(format!("parameter {} of {}", index, count)))?;
        rt.method_param_type(method, index).map(|h| h.as_ptr()).ok_or(Error::InvalidMethod)
    })
}

#[no_mangle]
pub extern "C" fn mdb_method_get_return_type(method: *mut c_void) -> *mut c_void {
    guard(ptr::null_mut(), || {
        let method = method_arg(method)?;
        runtime()?.method_return_type(method).map(|h| h.as_ptr()).ok_or(Error::InvalidMethod)
    })
}

#[no_mangle]
pub extern "C" fn mdb_method_get_flags(method: *mut c_void) -> i32 {
    guard(-1, || {
        let method = method_arg(method)?;
        Ok(runtime()?.method_flags(method) as i32)
    })
}

#[no_mangle]
pub extern "C" fn mdb_class_get_field_count(klass: *mut c_void) -> i32 {
    guard(-1, || {
        let class = class_arg(klass)?;
        Ok(runtime()?.class_fields(class).len() as i32)
    })
}

#[no_mangle]
pub extern "C" fn mdb_class_get_field_by_index(klass: *mut c_void, index: i32) -> *mut c_void {
    guard(ptr::null_mut(), || {
        let class = class_arg(klass)?;
        let fields = runtime()?.class_fields(class);
        Ok(nth(fields, index, "field")?.as_ptr())
    })
}

#[no_mangle]
pub extern "C" fn mdb_class_get_method_count(klass: *mut c_void) -> i32 {
    guard(-1, || {
        let class = class_arg(klass)?;
        Ok(runtime()?.class_methods(class).len() as i32)
    })
}

#[no_mangle]
pub extern "C" fn mdb_class_get_method_by_index(klass: *mut c_void, index: i32) -> *mut c_void {
    guard(ptr::null_mut(), || {
        let class = class_arg(klass)?;
        let methods = runtime()?.class_methods(class);
        Ok(nth(methods, index, "method")?.as_ptr())
    })
}

#[no_mangle]
pub extern "C" fn mdb_class_get_property_count(klass: *mut c_void) -> i32 {
    guard(-1, || {
        let class = class_arg(klass)?;
        Ok(runtime()?.class_properties(class).len() as i32)
    })
}

#[no_mangle]
pub extern "C" fn mdb_class_get_property_by_index(klass: *mut c_void, index: i32) -> *mut c_void {
    guard(ptr::null_mut(), || {
        let class = class_arg(klass)?;
        let properties = runtime()?.class_properties(class);
        Ok(nth(properties, index, "property")?.as_ptr())
    })
}

#[no_mangle]
pub extern "C" fn mdb_field_get_name(field: *mut c_void) -> *const c_char {
    guard(ptr::null(), || {
        let field = non_null(field, "field")?;
        let get = require(runtime()?.exports().field_get_name, "il2cpp_field_get_name")?;
        Ok(unsafe { get(field) })
    })
}

#[no_mangle]
pub extern "C" fn mdb_field_get_type(field: *mut c_void) -> *mut c_void {
    guard(ptr::null_mut(), || {
        let field = field_arg(field)?;
        runtime()?.field_type(field).map(|h| h.as_ptr()).ok_or(Error::InvalidField)
    })
}

#[no_mangle]
pub extern "C" fn mdb_field_is_static(field: *mut c_void) -> bool {
    guard(false, || {
        let field = field_arg(field)?;
        Ok(runtime()?.field_flags(field) & field_attrs::STATIC != 0)
    })
}

#[no_mangle]
pub extern "C" fn mdb_property_get_name(prop: *mut c_void) -> *const c_char {
    guard(ptr::null(), || {
        let prop = non_null(prop, "property")?;
        let get = require(runtime()?.exports().property_get_name, "il2cpp_property_get_name")?;
        Ok(unsafe { get(prop) })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::last_error;
    use crate::error::ErrorCode;

    #[test]
    fn test_null_arguments_are_rejected_before_the_runtime() {
        let name = std::ffi::CString::new("Player").unwrap();
        let found = unsafe { mdb_find_class(ptr::null(), name.as_ptr(), name.as_ptr()) };
        assert!(found.is_null());
        assert_eq!(last_error::code(), ErrorCode::NullPointer);
        assert!(last_error::message().contains("assembly"));

        assert_eq!(mdb_get_class_size(ptr::null_mut()), -1);
        assert_eq!(last_error::code(), ErrorCode::NullPointer);

        assert!(mdb_get_method_pointer(ptr::null_mut()).is_null());
        assert!(!mdb_field_is_static(ptr::null_mut()));
        assert_eq!(mdb_method_get_param_count(ptr::null_mut()), -1);
        assert_eq!(last_error::code(), ErrorCode::NullPointer);
    }

    #[test]
    fn test_null_method_code_pointer() {
        // a MethodInfo whose first word (the code pointer) is zero
        let method = [0usize; 8];
        assert!(mdb_get_method_pointer(method.as_ptr() as *mut c_void).is_null());
        assert_eq!(last_error::code(), ErrorCode::MethodPointerNull);

        let live = [0x1234usize, 0, 0, 0];
        assert_eq!(mdb_get_method_pointer(live.as_ptr() as *mut c_void) as usize, 0x1234);
        assert_eq!(last_error::code(), ErrorCode::Success);
    }

    #[test]
    fn test_index_bounds() {
        let items = vec![FieldHandle(1), FieldHandle(2)];
        assert_eq!(nth(items.clone(), 1, "field").unwrap(), FieldHandle(2));
        assert!(nth(items.clone(), 2, "field").is_err());
        assert_eq!(nth(items, -1, "field").unwrap_err().code(), ErrorCode::InvalidArgument);
    }
}
