//! Core traits for metadata access
//!
//! The detector, the type-name resolver and the wrapper generator only see
//! the runtime through [`MetadataSource`]. The live implementation forwards to
//! the resolved IL2CPP exports; tests use an in-memory universe.

use crate::common::TypeCode;

macro_rules! define_handle {
    ($($(#[$meta:meta])* $name:ident;)*) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
            pub struct $name(pub usize);

            impl $name {
                pub fn from_ptr<T>(ptr: *const T) -> Option<Self> {
                    if ptr.is_null() {
                        None
                    } else {
                        Some($name(ptr as usize))
                    }
                }

                pub fn as_ptr<T>(self) -> *mut T {
                    self.0 as *mut T
                }
            }
        )*
    };
}

define_handle! {
    /// Non-owning reference to an `Il2CppAssembly`
    AssemblyHandle;
    /// Non-owning reference to an `Il2CppImage`
    ImageHandle;
    /// Non-owning reference to an `Il2CppClass`
    ClassHandle;
    /// Non-owning reference to a `MethodInfo`
    MethodHandle;
    /// Non-owning reference to a `FieldInfo`
    FieldHandle;
    /// Non-owning reference to a `PropertyInfo`
    PropertyHandle;
    /// Non-owning reference to an `Il2CppType`
    TypeHandle;
}

/// Read-only view over the runtime's type system.
///
/// Every accessor tolerates descriptors the runtime cannot describe and
/// returns an empty value instead of failing.
pub trait MetadataSource {
    /// All loaded assemblies in domain order
    fn assemblies(&self) -> Vec<AssemblyHandle>;

    /// The image owned by an assembly
    fn assembly_image(&self, assembly: AssemblyHandle) -> Option<ImageHandle>;

    /// Image file name, e.g. `Assembly-CSharp.dll`
    fn image_name(&self, image: ImageHandle) -> String;

    /// Ordered class slots of an image
    fn image_classes(&self, image: ImageHandle) -> Vec<ClassHandle>;

    fn class_name(&self, class: ClassHandle) -> String;

    fn class_namespace(&self, class: ClassHandle) -> String;

    /// Raw `TypeAttributes`
    fn class_flags(&self, class: ClassHandle) -> u32;

    fn class_is_valuetype(&self, class: ClassHandle) -> bool;

    fn class_is_enum(&self, class: ClassHandle) -> bool;

    /// Unboxed size of a value type, `None` when the runtime cannot tell
    fn class_value_size(&self, class: ClassHandle) -> Option<usize>;

    fn class_declaring_type(&self, class: ClassHandle) -> Option<ClassHandle>;

    fn class_parent(&self, class: ClassHandle) -> Option<ClassHandle>;

    /// The `byval_arg` type describing the class itself
    fn class_type(&self, class: ClassHandle) -> Option<TypeHandle>;

    fn class_fields(&self, class: ClassHandle) -> Vec<FieldHandle>;

    fn class_methods(&self, class: ClassHandle) -> Vec<MethodHandle>;

    fn class_properties(&self, class: ClassHandle) -> Vec<PropertyHandle>;

    fn field_name(&self, field: FieldHandle) -> String;

    fn field_type(&self, field: FieldHandle) -> Option<TypeHandle>;

    /// Raw `FieldAttributes`
    fn field_flags(&self, field: FieldHandle) -> u32;

    fn field_offset(&self, field: FieldHandle) -> i32;

    /// Raw bits of a literal (constant) field, zero-extended to 64 bits
    fn field_literal_bits(&self, field: FieldHandle) -> Option<u64>;

    fn property_name(&self, property: PropertyHandle) -> String;

    fn property_getter(&self, property: PropertyHandle) -> Option<MethodHandle>;

    fn property_setter(&self, property: PropertyHandle) -> Option<MethodHandle>;

    fn method_name(&self, method: MethodHandle) -> String;

    /// Raw `MethodAttributes`
    fn method_flags(&self, method: MethodHandle) -> u32;

    /// Whether the method definition declares its own type parameters,
    /// used or not in its signature.
    fn method_is_generic(&self, method: MethodHandle) -> bool;

    /// Native entry point, 0 when the method has no code
    fn method_pointer(&self, method: MethodHandle) -> usize;

    fn method_class(&self, method: MethodHandle) -> Option<ClassHandle>;

    fn method_return_type(&self, method: MethodHandle) -> Option<TypeHandle>;

    fn method_param_count(&self, method: MethodHandle) -> usize;

    fn method_param_type(&self, method: MethodHandle, index: usize) -> Option<TypeHandle>;

    fn method_param_name(&self, method: MethodHandle, index: usize) -> String;

    fn type_code(&self, ty: TypeHandle) -> TypeCode;

    fn type_is_byref(&self, ty: TypeHandle) -> bool;

    /// `ParamAttributes` bits stored on a parameter type
    fn type_attrs(&self, ty: TypeHandle) -> u32;

    /// The class a type refers to
    fn type_class(&self, ty: TypeHandle) -> Option<ClassHandle>;

    /// Element type of an array or pointer type
    fn type_element(&self, ty: TypeHandle) -> Option<TypeHandle>;

    /// Type arguments of a generic instantiation
    fn type_generic_args(&self, ty: TypeHandle) -> Vec<TypeHandle>;

    /// Position of a class or method type parameter
    fn type_generic_param_index(&self, ty: TypeHandle) -> Option<u16>;

    /// Base address of the runtime module, used to print relative addresses
    fn module_base(&self) -> usize;

    /// Bytes at a code address, `None` if the address is not readable
    fn code_bytes(&self, addr: usize, len: usize) -> Option<Vec<u8>>;
}

/// Helpers derived from the primitive accessors.
pub trait MetadataExt: MetadataSource {
    /// Namespace of the class, or of its closest declaring type that has one.
    fn effective_namespace(&self, class: ClassHandle) -> String {
        let mut current = Some(class);
        let mut depth = 0;
        while let Some(c) = current {
            let ns = self.class_namespace(c);
            if !ns.is_empty() {
                return ns;
            }
            current = self.class_declaring_type(c);
            depth += 1;
            if depth > 32 {
                break;
            }
        }
        String::new()
    }

    /// `Namespace.Name`, or just `Name` for the global namespace.
    fn class_full_name(&self, class: ClassHandle) -> String {
        let ns = self.class_namespace(class);
        let name = self.class_name(class);
        if ns.is_empty() {
            name
        } else {
            format!("{}.{}", ns, name)
        }
    }

    fn is_void_type(&self, ty: Option<TypeHandle>) -> bool {
        match ty {
            None => true,
            Some(t) => self.type_code(t) == TypeCode::VOID,
        }
    }
}

impl<T: MetadataSource + ?Sized> MetadataExt for T {}
