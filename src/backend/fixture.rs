//! In-memory metadata universe for unit tests

use super::traits::*;
use crate::common::attributes::{method_attrs, type_attrs};
use crate::common::TypeCode;
use std::collections::HashMap;

#[derive(Default)]
struct AssemblyRec {
    name: String,
    classes: Vec<ClassHandle>,
}

#[derive(Default)]
struct ClassRec {
    name: String,
    namespace: String,
    flags: u32,
    valuetype: bool,
    value_size: Option<usize>,
    is_enum: bool,
    declaring: Option<ClassHandle>,
    parent: Option<ClassHandle>,
    ty: Option<TypeHandle>,
    fields: Vec<FieldHandle>,
    methods: Vec<MethodHandle>,
    properties: Vec<PropertyHandle>,
}

struct FieldRec {
    name: String,
    ty: Option<TypeHandle>,
    flags: u32,
    offset: i32,
    literal: Option<u64>,
}

struct MethodRec {
    name: String,
    class: ClassHandle,
    flags: u32,
    generic: bool,
    pointer: usize,
    ret: Option<TypeHandle>,
    params: Vec<(String, TypeHandle)>,
}

struct PropertyRec {
    name: String,
    get: Option<MethodHandle>,
    set: Option<MethodHandle>,
}

#[derive(Clone)]
struct TypeRec {
    code: TypeCode,
    byref: bool,
    attrs: u32,
    class: Option<ClassHandle>,
    element: Option<TypeHandle>,
    args: Vec<TypeHandle>,
    param_index: Option<u16>,
}

impl TypeRec {
    fn new(code: TypeCode) -> Self {
        TypeRec {
            code,
            byref: false,
            attrs: 0,
            class: None,
            element: None,
            args: Vec::new(),
            param_index: None,
        }
    }
}

/// A small, mutable universe. Handles are 1-based indexes so that 0 stays null.
#[derive(Default)]
pub struct Universe {
    assemblies: Vec<AssemblyRec>,
    classes: Vec<ClassRec>,
    fields: Vec<FieldRec>,
    methods: Vec<MethodRec>,
    properties: Vec<PropertyRec>,
    types: Vec<TypeRec>,
    code: HashMap<usize, Vec<u8>>,
    base: usize,
}

impl Universe {
    pub fn new() -> Self {
        Universe {
            base: 0x1_8000_0000,
            ..Default::default()
        }
    }

    pub fn add_assembly(&mut self, name: &str) -> AssemblyHandle {
        self.assemblies.push(AssemblyRec {
            name: name.to_string(),
            classes: Vec::new(),
        });
        AssemblyHandle(self.assemblies.len())
    }

    /// Add a class with the given `TypeAttributes`. A CLASS type is created for it.
    pub fn add_class(&mut self, asm: AssemblyHandle, ns: &str, name: &str, flags: u32) -> ClassHandle {
        self.classes.push(ClassRec {
            name: name.to_string(),
            namespace: ns.to_string(),
            flags,
            ..Default::default()
        });
        let handle = ClassHandle(self.classes.len());
        let mut ty = TypeRec::new(TypeCode::CLASS);
        ty.class = Some(handle);
        let ty = self.push_type(ty);
        self.class_mut(handle).ty = Some(ty);
        self.assemblies[asm.0 - 1].classes.push(handle);
        handle
    }

    pub fn add_public_class(&mut self, asm: AssemblyHandle, ns: &str, name: &str) -> ClassHandle {
        self.add_class(asm, ns, name, type_attrs::PUBLIC)
    }

    /// Builtin `System` classes live in an implicit `mscorlib.dll`.
    pub fn system_class(&mut self, name: &str) -> ClassHandle {
        let class = self.library_class("System", name);
        if name == "Object" {
            let ty = self.class_mut(class).ty.unwrap();
            self.types[ty.0 - 1].code = TypeCode::OBJECT;
        }
        class
    }

    /// Class in `mscorlib.dll`, created once per (namespace, name).
    pub fn library_class(&mut self, ns: &str, name: &str) -> ClassHandle {
        if let Some(idx) = self
            .classes
            .iter()
            .position(|c| c.namespace == ns && c.name == name)
        {
            return ClassHandle(idx + 1);
        }
        let asm = match self.assemblies.iter().position(|a| a.name == "mscorlib.dll") {
            Some(idx) => AssemblyHandle(idx + 1),
            None => self.add_assembly("mscorlib.dll"),
        };
        self.add_public_class(asm, ns, name)
    }

    pub fn set_parent(&mut self, class: ClassHandle, parent: ClassHandle) {
        self.class_mut(class).parent = Some(parent);
    }

    pub fn set_declaring(&mut self, class: ClassHandle, outer: ClassHandle) {
        self.class_mut(class).declaring = Some(outer);
    }

    pub fn make_valuetype(&mut self, class: ClassHandle) {
        let value_type = self.system_class("ValueType");
        let rec = self.class_mut(class);
        rec.valuetype = true;
        rec.parent = Some(value_type);
        let ty = rec.ty.unwrap();
        self.types[ty.0 - 1].code = TypeCode::VALUETYPE;
    }

    pub fn set_value_size(&mut self, class: ClassHandle, size: usize) {
        self.class_mut(class).value_size = Some(size);
    }

    pub fn make_enum(&mut self, class: ClassHandle, backing: TypeCode) {
        self.make_valuetype(class);
        let enum_base = self.system_class("Enum");
        let rec = self.class_mut(class);
        rec.is_enum = true;
        rec.parent = Some(enum_base);
        let value_ty = self.prim(backing);
        self.add_field(class, "value__", value_ty, 0x0006 | 0x0800);
    }

    pub fn make_delegate(&mut self, class: ClassHandle) {
        let base = self.system_class("MulticastDelegate");
        self.set_parent(class, base);
    }

    pub fn prim(&mut self, code: TypeCode) -> TypeHandle {
        let mut rec = TypeRec::new(code);
        if code == TypeCode::STRING {
            rec.class = Some(self.system_class("String"));
        }
        self.push_type(rec)
    }

    pub fn class_type_of(&self, class: ClassHandle) -> TypeHandle {
        self.classes[class.0 - 1].ty.unwrap()
    }

    pub fn array_of(&mut self, elem: TypeHandle) -> TypeHandle {
        let mut rec = TypeRec::new(TypeCode::SZARRAY);
        rec.element = Some(elem);
        self.push_type(rec)
    }

    pub fn pointer_to(&mut self, elem: TypeHandle) -> TypeHandle {
        let mut rec = TypeRec::new(TypeCode::PTR);
        rec.element = Some(elem);
        self.push_type(rec)
    }

    pub fn generic_inst(&mut self, definition: ClassHandle, args: &[TypeHandle]) -> TypeHandle {
        let mut rec = TypeRec::new(TypeCode::GENERICINST);
        rec.class = Some(definition);
        rec.args = args.to_vec();
        self.push_type(rec)
    }

    pub fn method_param(&mut self, index: u16) -> TypeHandle {
        let mut rec = TypeRec::new(TypeCode::MVAR);
        rec.param_index = Some(index);
        self.push_type(rec)
    }

    pub fn class_param(&mut self, index: u16) -> TypeHandle {
        let mut rec = TypeRec::new(TypeCode::VAR);
        rec.param_index = Some(index);
        self.push_type(rec)
    }

    /// A by-reference copy of `ty` carrying parameter attributes.
    pub fn byref(&mut self, ty: TypeHandle, param_attrs: u32) -> TypeHandle {
        let mut rec = self.types[ty.0 - 1].clone();
        rec.byref = true;
        rec.attrs = param_attrs;
        self.push_type(rec)
    }

    pub fn add_field(&mut self, class: ClassHandle, name: &str, ty: TypeHandle, flags: u32) -> FieldHandle {
        let offset = 0x10 + 8 * self.class_mut(class).fields.len() as i32;
        self.fields.push(FieldRec {
            name: name.to_string(),
            ty: Some(ty),
            flags,
            offset,
            literal: None,
        });
        let handle = FieldHandle(self.fields.len());
        self.class_mut(class).fields.push(handle);
        handle
    }

    pub fn add_literal(&mut self, class: ClassHandle, name: &str, bits: u64) -> FieldHandle {
        let ty = self.class_type_of(class);
        let field = self.add_field(class, name, ty, 0x0006 | 0x0010 | 0x0040);
        self.fields[field.0 - 1].literal = Some(bits);
        field
    }

    pub fn add_method(
        &mut self,
        class: ClassHandle,
        name: &str,
        flags: u32,
        ret: Option<TypeHandle>,
        params: &[(&str, TypeHandle)],
        pointer: usize,
    ) -> MethodHandle {
        self.methods.push(MethodRec {
            name: name.to_string(),
            class,
            flags,
            generic: false,
            pointer,
            ret,
            params: params.iter().map(|(n, t)| (n.to_string(), *t)).collect(),
        });
        let handle = MethodHandle(self.methods.len());
        self.class_mut(class).methods.push(handle);
        handle
    }

    pub fn make_generic_method(&mut self, method: MethodHandle) {
        self.methods[method.0 - 1].generic = true;
    }

    /// Public instance method with a unique code pointer.
    pub fn add_public_method(&mut self, class: ClassHandle, name: &str, ret: Option<TypeHandle>) -> MethodHandle {
        let ptr = self.base + 0x1000 + self.methods.len() * 0x40;
        self.add_method(class, name, method_attrs::PUBLIC, ret, &[], ptr)
    }

    pub fn add_property(
        &mut self,
        class: ClassHandle,
        name: &str,
        get: Option<MethodHandle>,
        set: Option<MethodHandle>,
    ) -> PropertyHandle {
        self.properties.push(PropertyRec {
            name: name.to_string(),
            get,
            set,
        });
        let handle = PropertyHandle(self.properties.len());
        self.class_mut(class).properties.push(handle);
        handle
    }

    pub fn write_code(&mut self, addr: usize, bytes: &[u8]) {
        self.code.insert(addr, bytes.to_vec());
    }

    pub fn base(&self) -> usize {
        self.base
    }

    fn push_type(&mut self, rec: TypeRec) -> TypeHandle {
        self.types.push(rec);
        TypeHandle(self.types.len())
    }

    fn class_mut(&mut self, class: ClassHandle) -> &mut ClassRec {
        &mut self.classes[class.0 - 1]
    }

    fn class(&self, class: ClassHandle) -> &ClassRec {
        &self.classes[class.0 - 1]
    }

    fn method(&self, method: MethodHandle) -> &MethodRec {
        &self.methods[method.0 - 1]
    }

    fn ty(&self, ty: TypeHandle) -> &TypeRec {
        &self.types[ty.0 - 1]
    }
}

impl MetadataSource for Universe {
    fn assemblies(&self) -> Vec<AssemblyHandle> {
        (1..=self.assemblies.len()).map(AssemblyHandle).collect()
    }

    fn assembly_image(&self, assembly: AssemblyHandle) -> Option<ImageHandle> {
        Some(ImageHandle(assembly.0))
    }

    fn image_name(&self, image: ImageHandle) -> String {
        self.assemblies[image.0 - 1].name.clone()
    }

    fn image_classes(&self, image: ImageHandle) -> Vec<ClassHandle> {
        self.assemblies[image.0 - 1].classes.clone()
    }

    fn class_name(&self, class: ClassHandle) -> String {
        self.class(class).name.clone()
    }

    fn class_namespace(&self, class: ClassHandle) -> String {
        self.class(class).namespace.clone()
    }

    fn class_flags(&self, class: ClassHandle) -> u32 {
        self.class(class).flags
    }

    fn class_is_valuetype(&self, class: ClassHandle) -> bool {
        self.class(class).valuetype
    }

    fn class_is_enum(&self, class: ClassHandle) -> bool {
        self.class(class).is_enum
    }

    fn class_value_size(&self, class: ClassHandle) -> Option<usize> {
        self.class(class).value_size
    }

    fn class_declaring_type(&self, class: ClassHandle) -> Option<ClassHandle> {
        self.class(class).declaring
    }

    fn class_parent(&self, class: ClassHandle) -> Option<ClassHandle> {
        self.class(class).parent
    }

    fn class_type(&self, class: ClassHandle) -> Option<TypeHandle> {
        self.class(class).ty
    }

    fn class_fields(&self, class: ClassHandle) -> Vec<FieldHandle> {
        self.class(class).fields.clone()
    }

    fn class_methods(&self, class: ClassHandle) -> Vec<MethodHandle> {
        self.class(class).methods.clone()
    }

    fn class_properties(&self, class: ClassHandle) -> Vec<PropertyHandle> {
        self.class(class).properties.clone()
    }

    fn field_name(&self, field: FieldHandle) -> String {
        self.fields[field.0 - 1].name.clone()
    }

    fn field_type(&self, field: FieldHandle) -> Option<TypeHandle> {
        self.fields[field.0 - 1].ty
    }

    fn field_flags(&self, field: FieldHandle) -> u32 {
        self.fields[field.0 - 1].flags
    }

    fn field_offset(&self, field: FieldHandle) -> i32 {
        self.fields[field.0 - 1].offset
    }

    fn field_literal_bits(&self, field: FieldHandle) -> Option<u64> {
        self.fields[field.0 - 1].literal
    }

    fn property_name(&self, property: PropertyHandle) -> String {
        self.properties[property.0 - 1].name.clone()
    }

    fn property_getter(&self, property: PropertyHandle) -> Option<MethodHandle> {
        self.properties[property.0 - 1].get
    }

    fn property_setter(&self, property: PropertyHandle) -> Option<MethodHandle> {
        self.properties[property.0 - 1].set
    }

    fn method_name(&self, method: MethodHandle) -> String {
        self.method(method).name.clone()
    }

    fn method_flags(&self, method: MethodHandle) -> u32 {
        self.method(method).flags
    }

    fn method_is_generic(&self, method: MethodHandle) -> bool {
        self.method(method).generic
    }

    fn method_pointer(&self, method: MethodHandle) -> usize {
        self.method(method).pointer
    }

    fn method_class(&self, method: MethodHandle) -> Option<ClassHandle> {
        Some(self.method(method).class)
    }

    fn method_return_type(&self, method: MethodHandle) -> Option<TypeHandle> {
        self.method(method).ret
    }

    fn method_param_count(&self, method: MethodHandle) -> usize {
        self.method(method).params.len()
    }

    fn method_param_type(&self, method: MethodHandle, index: usize) -> Option<TypeHandle> {
        self.method(method).params.get(index).map(|(_, t)| *t)
    }

    fn method_param_name(&self, method: MethodHandle, index: usize) -> String {
        self.method(method)
            .params
            .get(index)
            .map(|(n, _)| n.clone())
            .unwrap_or_default()
    }

    fn type_code(&self, ty: TypeHandle) -> TypeCode {
        self.ty(ty).code
    }

    fn type_is_byref(&self, ty: TypeHandle) -> bool {
        self.ty(ty).byref
    }

    fn type_attrs(&self, ty: TypeHandle) -> u32 {
        self.ty(ty).attrs
    }

    fn type_class(&self, ty: TypeHandle) -> Option<ClassHandle> {
        self.ty(ty).class
    }

    fn type_element(&self, ty: TypeHandle) -> Option<TypeHandle> {
        self.ty(ty).element
    }

    fn type_generic_args(&self, ty: TypeHandle) -> Vec<TypeHandle> {
        self.ty(ty).args.clone()
    }

    fn type_generic_param_index(&self, ty: TypeHandle) -> Option<u16> {
        self.ty(ty).param_index
    }

    fn module_base(&self) -> usize {
        self.base
    }

    fn code_bytes(&self, addr: usize, len: usize) -> Option<Vec<u8>> {
        self.code
            .get(&addr)
            .map(|b| b.iter().copied().take(len).collect())
    }
}
