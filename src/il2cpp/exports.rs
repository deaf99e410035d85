//! Typed table of the IL2CPP C API entry points
//!
//! Each entry is bound once by the resolver. Required entries must all be
//! present for the runtime to be usable; best-effort entries degrade the
//! features that need them.

use std::ffi::c_void;
use std::os::raw::c_char;

pub type Il2CppDomain = c_void;
pub type Il2CppThread = c_void;
pub type Il2CppAssembly = c_void;
pub type Il2CppImage = c_void;
pub type Il2CppClass = c_void;
pub type Il2CppType = c_void;
pub type Il2CppObject = c_void;
pub type Il2CppString = c_void;
pub type Il2CppArray = c_void;
pub type MethodInfo = c_void;
pub type FieldInfo = c_void;
pub type PropertyInfo = c_void;

macro_rules! define_exports {
    (
        required { $($req:ident: fn($($rarg:ty),*) $(-> $rret:ty)?;)* }
        best_effort { $($opt:ident: fn($($oarg:ty),*) $(-> $oret:ty)?;)* }
    ) => {
        /// Bound entry points. `None` means the entry could not be resolved.
        #[derive(Clone, Copy, Default)]
        pub struct ExportTable {
            $(pub $req: Option<unsafe extern "C" fn($($rarg),*) $(-> $rret)?>,)*
            $(pub $opt: Option<unsafe extern "C" fn($($oarg),*) $(-> $oret)?>,)*
        }

        /// Canonical names the runtime cannot work without.
        pub const REQUIRED_EXPORTS: &[&str] = &[$(concat!("il2cpp_", stringify!($req))),*];

        /// Canonical names bound when available.
        pub const BEST_EFFORT_EXPORTS: &[&str] = &[$(concat!("il2cpp_", stringify!($opt))),*];

        impl ExportTable {
            /// Bind every entry through `resolve`. Returns the table and the
            /// required names that could not be resolved.
            pub fn bind<F>(mut resolve: F) -> (ExportTable, Vec<String>)
            where
                F: FnMut(&str) -> Option<usize>,
            {
                let mut table = ExportTable::default();
                let mut missing = Vec::new();
                $(
                    let name = concat!("il2cpp_", stringify!($req));
                    match resolve(name) {
                        // SAFETY: the address is an exported function with the C API signature.
                        Some(addr) if addr != 0 => table.$req = Some(unsafe { std::mem::transmute::<usize, unsafe extern "C" fn($($rarg),*) $(-> $rret)?>(addr) }),
                        _ => missing.push(name.to_string()),
                    }
                )*
                $(
                    let name = concat!("il2cpp_", stringify!($opt));
                    if let Some(addr) = resolve(name).filter(|a| *a != 0) {
                        table.$opt = Some(unsafe { std::mem::transmute::<usize, unsafe extern "C" fn($($oarg),*) $(-> $oret)?>(addr) });
                    }
                )*
                (table, missing)
            }
        }

        impl std::fmt::Debug for ExportTable {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                let mut s = f.debug_struct("ExportTable");
                $(s.field(stringify!($req), &self.$req.is_some());)*
                $(s.field(stringify!($opt), &self.$opt.is_some());)*
                s.finish()
            }
        }
    };
}

define_exports! {
    required {
        domain_get: fn() -> *mut Il2CppDomain;
        thread_attach: fn(*mut Il2CppDomain) -> *mut Il2CppThread;
        domain_get_assemblies: fn(*const Il2CppDomain, *mut usize) -> *const *const Il2CppAssembly;
        assembly_get_image: fn(*const Il2CppAssembly) -> *const Il2CppImage;
        image_get_class_count: fn(*const Il2CppImage) -> usize;
        image_get_class: fn(*const Il2CppImage, usize) -> *const Il2CppClass;
        class_get_name: fn(*const Il2CppClass) -> *const c_char;
        class_from_name: fn(*const Il2CppImage, *const c_char, *const c_char) -> *mut Il2CppClass;
        class_get_method_from_name: fn(*const Il2CppClass, *const c_char, i32) -> *const MethodInfo;
        class_get_field_from_name: fn(*const Il2CppClass, *const c_char) -> *mut FieldInfo;
        field_get_value: fn(*mut Il2CppObject, *mut FieldInfo, *mut c_void);
        field_set_value: fn(*mut Il2CppObject, *mut FieldInfo, *mut c_void);
        field_static_get_value: fn(*mut FieldInfo, *mut c_void);
        field_static_set_value: fn(*mut FieldInfo, *mut c_void);
        object_new: fn(*const Il2CppClass) -> *mut Il2CppObject;
    }
    best_effort {
        thread_detach: fn(*mut Il2CppThread);
        string_new: fn(*const c_char) -> *mut Il2CppString;
        image_get_name: fn(*const Il2CppImage) -> *const c_char;
        class_get_namespace: fn(*const Il2CppClass) -> *const c_char;
        class_get_type: fn(*const Il2CppClass) -> *const Il2CppType;
        class_from_type: fn(*const Il2CppType) -> *mut Il2CppClass;
        class_get_flags: fn(*const Il2CppClass) -> i32;
        class_is_valuetype: fn(*const Il2CppClass) -> bool;
        class_is_enum: fn(*const Il2CppClass) -> bool;
        class_get_declaring_type: fn(*const Il2CppClass) -> *mut Il2CppClass;
        class_get_parent: fn(*const Il2CppClass) -> *mut Il2CppClass;
        class_get_element_class: fn(*const Il2CppClass) -> *mut Il2CppClass;
        class_instance_size: fn(*const Il2CppClass) -> i32;
        class_get_fields: fn(*const Il2CppClass, *mut *mut c_void) -> *mut FieldInfo;
        class_get_methods: fn(*const Il2CppClass, *mut *mut c_void) -> *const MethodInfo;
        class_get_properties: fn(*const Il2CppClass, *mut *mut c_void) -> *const PropertyInfo;
        field_get_flags: fn(*mut FieldInfo) -> i32;
        field_get_type: fn(*mut FieldInfo) -> *const Il2CppType;
        field_get_name: fn(*mut FieldInfo) -> *const c_char;
        field_get_offset: fn(*mut FieldInfo) -> usize;
        property_get_get_method: fn(*const PropertyInfo) -> *const MethodInfo;
        property_get_set_method: fn(*const PropertyInfo) -> *const MethodInfo;
        property_get_name: fn(*const PropertyInfo) -> *const c_char;
        method_get_flags: fn(*const MethodInfo, *mut u32) -> u32;
        method_get_return_type: fn(*const MethodInfo) -> *const Il2CppType;
        method_get_param: fn(*const MethodInfo, u32) -> *const Il2CppType;
        method_get_param_count: fn(*const MethodInfo) -> u32;
        method_get_param_name: fn(*const MethodInfo, u32) -> *const c_char;
        method_get_name: fn(*const MethodInfo) -> *const c_char;
        method_get_class: fn(*const MethodInfo) -> *mut Il2CppClass;
        method_is_generic: fn(*const MethodInfo) -> bool;
        type_is_byref: fn(*const Il2CppType) -> bool;
        type_get_type: fn(*const Il2CppType) -> i32;
        type_get_object: fn(*const Il2CppType) -> *mut Il2CppObject;
        object_get_class: fn(*mut Il2CppObject) -> *mut Il2CppClass;
        array_new: fn(*const Il2CppClass, usize) -> *mut Il2CppArray;
        runtime_invoke: fn(*const MethodInfo, *mut c_void, *mut *mut c_void, *mut *mut Il2CppObject) -> *mut Il2CppObject;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    unsafe extern "C" fn fake_domain_get() -> *mut Il2CppDomain {
        0x1234 as *mut Il2CppDomain
    }

    #[test]
    fn test_required_set() {
        for name in [
            "il2cpp_domain_get",
            "il2cpp_thread_attach",
            "il2cpp_domain_get_assemblies",
            "il2cpp_class_from_name",
            "il2cpp_class_get_method_from_name",
            "il2cpp_class_get_field_from_name",
            "il2cpp_field_static_set_value",
            "il2cpp_object_new",
            "il2cpp_image_get_class_count",
        ] {
            assert!(REQUIRED_EXPORTS.contains(&name), "{} should be required", name);
        }
        assert!(BEST_EFFORT_EXPORTS.contains(&"il2cpp_runtime_invoke"));
        assert!(!BEST_EFFORT_EXPORTS.iter().any(|n| REQUIRED_EXPORTS.contains(n)));
    }

    #[test]
    fn test_bind_reports_missing_required() {
        let (table, missing) = ExportTable::bind(|name| {
            (name == "il2cpp_domain_get").then_some(fake_domain_get as usize)
        });
        assert!(table.domain_get.is_some());
        assert!(table.runtime_invoke.is_none());
        assert_eq!(missing.len(), REQUIRED_EXPORTS.len() - 1);
        assert!(missing.contains(&"il2cpp_object_new".to_string()));
        let domain = unsafe { (table.domain_get.unwrap())() };
        assert_eq!(domain as usize, 0x1234);
    }
}
