//! C# source emission
//!
//! One file per namespace bucket. Every member body dispatches through the
//! SDK's `Il2CppRuntime` helpers using the raw runtime names; friendly
//! aliases only change the declared identifiers.

use super::mapping::MappingTable;
use super::model::{Collection, TypeInfo};
use super::naming::{is_compiler_generated, sanitize_identifier, sanitize_namespace};
use crate::backend::*;
use crate::common::attributes::{field_attrs, member_visibility, method_attrs, param_attrs, type_attrs};
use crate::common::{TypeCode, TypeKind};
use crate::il2cpp::type_name::{method_generic_arity, placeholder, KnownTypes, NameContext, TypeNameResolver, ERASED};
use crate::obfuscation::Detector;
use std::collections::{BTreeSet, HashSet};
use std::fmt::Write as _;

pub const EMPTY_TYPES: &str = "global::System.Type.EmptyTypes";

const WARNING_PREAMBLE: &str =
    "#pragma warning disable CS0108, CS0109, CS0114, CS0162, CS0414, CS0618, CS0649, CS0660, CS0661, CS1591";

/// Unity namespaces imported by every file when the SDK contains them.
const COMMON_NAMESPACES: &[&str] = &[
    "UnityEngine",
    "UnityEngine.AI",
    "UnityEngine.Animations",
    "UnityEngine.Audio",
    "UnityEngine.EventSystems",
    "UnityEngine.Events",
    "UnityEngine.Rendering",
    "UnityEngine.SceneManagement",
    "UnityEngine.UI",
    "TMPro",
];

/// Contents of a C# string literal.
fn escape(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Identifiers already used by non-method members of one class.
struct MemberNames {
    type_name: String,
    taken: HashSet<String>,
}

impl MemberNames {
    fn new(type_name: &str) -> Self {
        MemberNames {
            type_name: type_name.to_string(),
            taken: HashSet::new(),
        }
    }

    fn is_free(&self, name: &str) -> bool {
        name != self.type_name && !self.taken.contains(name)
    }

    /// Reserve `wanted`, or a `_`-suffixed variant of it.
    fn claim(&mut self, wanted: &str) -> String {
        let mut name = wanted.to_string();
        while !self.is_free(&name) {
            name.push('_');
        }
        self.taken.insert(name.clone());
        name
    }

    /// A method name that does not clash with a field, property or the type.
    fn method_name(&self, wanted: &str) -> String {
        let mut name = wanted.to_string();
        while !self.is_free(&name) {
            name.push('_');
        }
        name
    }
}

struct Param {
    modifier: &'static str,
    ty: String,
    name: String,
}

impl Param {
    fn declaration(&self) -> String {
        format!("{}{} {}", self.modifier, self.ty, self.name)
    }
}

pub struct Emitter<'a, S: MetadataSource + ?Sized> {
    source: &'a S,
    known: &'a KnownTypes,
    resolver: TypeNameResolver<'a, S>,
    detector: Option<&'a Detector>,
    mapping: &'a MappingTable,
    buckets: BTreeSet<&'a str>,
}

impl<'a, S: MetadataSource + ?Sized> Emitter<'a, S> {
    pub fn new(
        source: &'a S,
        collection: &'a Collection,
        detector: Option<&'a Detector>,
        mapping: &'a MappingTable,
    ) -> Self {
        Emitter {
            source,
            known: &collection.known,
            resolver: TypeNameResolver::new(source, &collection.known),
            detector,
            mapping,
            buckets: collection.buckets.keys().map(String::as_str).collect(),
        }
    }

    pub fn known(&self) -> &KnownTypes {
        self.known
    }

    fn is_fake(&self, method: MethodHandle) -> bool {
        self.detector.is_some_and(|d| d.is_fake_method(method))
    }

    /// The whole `GameSDK.<bucket>.cs` file.
    pub fn emit_file(&self, bucket: &str, types: &[TypeInfo]) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "// Auto-generated Il2Cpp wrapper classes");
        let _ = writeln!(out, "// Namespace: {}", bucket);
        let _ = writeln!(out, "// Do not edit manually");
        let _ = writeln!(out);
        let _ = writeln!(out, "{}", WARNING_PREAMBLE);
        let _ = writeln!(out);
        let _ = writeln!(out, "using System;");
        let _ = writeln!(out, "using System.Collections;");
        let _ = writeln!(out, "using System.Collections.Generic;");
        let _ = writeln!(out, "using GameSDK;");
        for ns in COMMON_NAMESPACES {
            if *ns != bucket && self.buckets.contains(ns) {
                let _ = writeln!(out, "using {};", ns);
            }
        }
        let _ = writeln!(out);
        let _ = writeln!(out, "namespace {}", sanitize_namespace(bucket));
        let _ = writeln!(out, "{{");
        for info in types {
            let body = match info.kind {
                TypeKind::Delegate => self.emit_delegate(info),
                TypeKind::Enum => self.emit_enum(info),
                TypeKind::Interface => self.emit_interface(info),
                TypeKind::Struct => self.emit_struct(info),
                TypeKind::Class => self.emit_class(info),
            };
            out.push_str(&body);
            out.push('\n');
        }
        let _ = writeln!(out, "}}");
        out
    }

    fn params(&self, method: MethodHandle, ctx: NameContext<'_>, arity: usize) -> Vec<Param> {
        let placeholders: HashSet<String> = (0..arity).map(|i| placeholder(i, arity)).collect();
        let mut names = HashSet::new();
        (0..self.source.method_param_count(method))
            .map(|i| {
                let ty = self.source.method_param_type(method, i);
                let modifier = match ty {
                    Some(t) if self.source.type_is_byref(t) => {
                        let attrs = self.source.type_attrs(t);
                        let is_in = attrs & param_attrs::IN != 0;
                        let is_out = attrs & param_attrs::OUT != 0;
                        if is_out && !is_in {
                            "out "
                        } else if is_in && !is_out {
                            "in "
                        } else {
                            "ref "
                        }
                    }
                    _ => "",
                };
                let raw = self.source.method_param_name(method, i);
                let mut name = if raw.is_empty() {
                    format!("arg{}", i)
                } else {
                    sanitize_identifier(&raw)
                };
                while placeholders.contains(&name) || !names.insert(name.clone()) {
                    name.push('_');
                }
                Param {
                    modifier,
                    ty: self.resolver.resolve(ty, ctx),
                    name,
                }
            })
            .collect()
    }

    fn type_array(params: &[Param]) -> String {
        if params.is_empty() {
            EMPTY_TYPES.to_string()
        } else {
            let types: Vec<String> = params.iter().map(|p| format!("typeof({})", p.ty)).collect();
            format!("new global::System.Type[] {{ {} }}", types.join(", "))
        }
    }

    pub fn emit_delegate(&self, info: &TypeInfo) -> String {
        let ctx = NameContext::new(&info.bucket);
        let invoke = self
            .source
            .class_methods(info.class)
            .into_iter()
            .find(|m| self.source.method_name(*m) == "Invoke");
        match invoke {
            Some(invoke) => {
                let ret = self.resolver.resolve(self.source.method_return_type(invoke), ctx);
                let ret = if self.source.is_void_type(self.source.method_return_type(invoke)) {
                    "void".to_string()
                } else {
                    ret
                };
                let params: Vec<String> = self.params(invoke, ctx, 0).iter().map(Param::declaration).collect();
                format!(
                    "    {} delegate {} {}({});\n",
                    info.visibility,
                    ret,
                    info.name,
                    params.join(", ")
                )
            }
            None => format!("    {} delegate void {}();\n", info.visibility, info.name),
        }
    }

    fn enum_backing(&self, class: ClassHandle) -> TypeCode {
        self.source
            .class_fields(class)
            .into_iter()
            .find(|f| self.source.field_name(*f) == "value__")
            .and_then(|f| self.source.field_type(f))
            .map(|t| self.source.type_code(t))
            .filter(|code| {
                matches!(
                    code,
                    TypeCode::I1
                        | TypeCode::U1
                        | TypeCode::I2
                        | TypeCode::U2
                        | TypeCode::I4
                        | TypeCode::U4
                        | TypeCode::I8
                        | TypeCode::U8
                )
            })
            .unwrap_or(TypeCode::I4)
    }

    pub fn emit_enum(&self, info: &TypeInfo) -> String {
        let backing = self.enum_backing(info.class);
        let mut out = String::new();
        let _ = write!(out, "    {} enum {}", info.visibility, info.name);
        if backing != TypeCode::I4 {
            if let Some(keyword) = backing.csharp_keyword() {
                let _ = write!(out, " : {}", keyword);
            }
        }
        out.push_str("\n    {\n");

        let mut names = MemberNames::new(&info.name);
        let mut members = Vec::new();
        for field in self.source.class_fields(info.class) {
            if self.source.field_flags(field) & field_attrs::LITERAL == 0 {
                continue;
            }
            let raw = self.source.field_name(field);
            if is_compiler_generated(&raw) {
                continue;
            }
            let bits = self.source.field_literal_bits(field).unwrap_or(0);
            let name = names.claim(&sanitize_identifier(&raw));
            members.push(format!("        {} = {}", name, format_enum_value(bits, backing)));
        }
        if !members.is_empty() {
            out.push_str(&members.join(",\n"));
            out.push('\n');
        }
        out.push_str("    }\n");
        out
    }

    pub fn emit_interface(&self, info: &TypeInfo) -> String {
        format!(
            "    {} interface {}\n    {{\n        // Stub interface\n    }}\n",
            info.visibility, info.name
        )
    }

    pub fn emit_struct(&self, info: &TypeInfo) -> String {
        let ctx = NameContext::new(&info.bucket);
        let mut out = format!("    {} struct {}\n    {{\n", info.visibility, info.name);
        let mut names = MemberNames::new(&info.name);
        let mut any = false;
        for field in self.source.class_fields(info.class) {
            let flags = self.source.field_flags(field);
            if flags & (field_attrs::STATIC | field_attrs::LITERAL) != 0 {
                continue;
            }
            if flags & field_attrs::ACCESS_MASK != field_attrs::PUBLIC {
                continue;
            }
            let raw = self.source.field_name(field);
            if raw.starts_with('<') || is_compiler_generated(&raw) {
                continue;
            }
            let ty = self.resolver.resolve(self.source.field_type(field), ctx);
            let friendly = self.mapping.member_alias(&info.raw_name, &raw).unwrap_or(&raw);
            let name = names.claim(&sanitize_identifier(friendly));
            let _ = writeln!(out, "        public {} {};", ty, name);
            any = true;
        }
        if !any {
            out.push_str("        // Stub struct\n");
        }
        out.push_str("    }\n");
        out
    }

    /// Field type, with interface types exposed as `object`.
    fn field_type_name(&self, field: FieldHandle, ctx: NameContext<'_>) -> String {
        let ty = self.source.field_type(field);
        if let Some(t) = ty {
            if self.source.type_code(t) == TypeCode::CLASS {
                if let Some(class) = self.source.type_class(t) {
                    if self.source.class_flags(class) & type_attrs::INTERFACE != 0 {
                        return ERASED.to_string();
                    }
                }
            }
        }
        self.resolver.resolve(ty, ctx)
    }

    pub fn emit_class(&self, info: &TypeInfo) -> String {
        let mut out = String::new();
        let mut names = MemberNames::new(&info.name);
        names.taken.insert("_il2cppClassName".into());
        names.taken.insert("_il2cppNamespace".into());

        let _ = writeln!(out, "    {} partial class {} : {}", info.visibility, info.name, info.base);
        let _ = writeln!(out, "    {{");
        let _ = writeln!(out, "        public const string _il2cppClassName = \"{}\";", escape(&info.raw_name));
        let _ = writeln!(
            out,
            "        public const string _il2cppNamespace = \"{}\";",
            escape(&info.raw_namespace)
        );
        let _ = writeln!(out);
        let _ = writeln!(out, "        public {}(IntPtr nativePtr) : base(nativePtr) {{ }}", info.name);

        if !info.is_static {
            out.push_str(&self.emit_fields(info, &mut names));
        }
        let (properties, accessors) = self.emit_properties(info, &mut names);
        out.push_str(&properties);
        out.push_str(&self.emit_methods(info, &names, &accessors));
        let _ = writeln!(out, "    }}");
        out
    }

    fn emit_fields(&self, info: &TypeInfo, names: &mut MemberNames) -> String {
        let ctx = NameContext::new(&info.bucket);
        let mut out = String::new();
        for field in self.source.class_fields(info.class) {
            let flags = self.source.field_flags(field);
            if flags & (field_attrs::LITERAL | field_attrs::STATIC) != 0 {
                continue;
            }
            // compiler-controlled access
            if flags & field_attrs::ACCESS_MASK == 0 {
                continue;
            }
            let raw = self.source.field_name(field);
            if raw.is_empty() || raw.starts_with('<') || is_compiler_generated(&raw) {
                continue;
            }
            let ty = self.field_type_name(field, ctx);
            let friendly = self.mapping.member_alias(&info.raw_name, &raw).unwrap_or(&raw);
            let name = names.claim(&sanitize_identifier(friendly));

            if out.is_empty() {
                out.push_str("\n        // Fields\n");
            }
            let raw = escape(&raw);
            let _ = writeln!(out, "        {} {} {}", member_visibility(flags), ty, name);
            let _ = writeln!(out, "        {{");
            let _ = writeln!(out, "            get => Il2CppRuntime.GetField<{}>(this, \"{}\");", ty, raw);
            let _ = writeln!(
                out,
                "            set => Il2CppRuntime.SetField<{}>(this, \"{}\", value);",
                ty, raw
            );
            let _ = writeln!(out, "        }}");
            let _ = writeln!(out);
        }
        out
    }

    /// Property wrappers, plus the accessor names methods must not repeat.
    fn emit_properties(&self, info: &TypeInfo, names: &mut MemberNames) -> (String, HashSet<String>) {
        let ctx = NameContext::new(&info.bucket);
        let mut out = String::new();
        let mut accessors = HashSet::new();
        let mut seen = HashSet::new();

        for property in self.source.class_properties(info.class) {
            let raw = self.source.property_name(property);
            if raw.is_empty() || raw.contains('.') || is_compiler_generated(&raw) {
                continue;
            }
            let get = self
                .source
                .property_getter(property)
                .filter(|m| !self.is_fake(*m) && self.source.method_param_count(*m) == 0);
            let set = self
                .source
                .property_setter(property)
                .filter(|m| !self.is_fake(*m) && self.source.method_param_count(*m) == 1);
            let Some(first) = get.or(set) else {
                continue;
            };
            if !seen.insert(raw.clone()) {
                continue;
            }

            let ty = match get {
                Some(g) => self.resolver.resolve(self.source.method_return_type(g), ctx),
                None => self.resolver.resolve(self.source.method_param_type(first, 0), ctx),
            };
            if ty == "void" {
                continue;
            }
            if get.is_some() {
                accessors.insert(format!("get_{}", raw));
            }
            if set.is_some() {
                accessors.insert(format!("set_{}", raw));
            }

            let flags = self.source.method_flags(first);
            let is_static = flags & method_attrs::STATIC != 0;
            let friendly = self.mapping.member_alias(&info.raw_name, &raw).unwrap_or(&raw);
            let name = names.claim(&sanitize_identifier(friendly));
            let raw = escape(&raw);
            let ns = escape(info.dispatch_namespace());
            let cls = escape(&info.raw_name);

            if out.is_empty() {
                out.push_str("\n        // Properties\n");
            }
            let _ = writeln!(
                out,
                "        {}{} {} {}",
                member_visibility(flags),
                if is_static { " static" } else { "" },
                ty,
                name
            );
            let _ = writeln!(out, "        {{");
            if get.is_some() {
                if is_static {
                    let _ = writeln!(
                        out,
                        "            get => Il2CppRuntime.CallStatic<{}>(\"{}\", \"{}\", \"get_{}\", {});",
                        ty, ns, cls, raw, EMPTY_TYPES
                    );
                } else {
                    let _ = writeln!(
                        out,
                        "            get => Il2CppRuntime.Call<{}>(this, \"get_{}\", {});",
                        ty, raw, EMPTY_TYPES
                    );
                }
            }
            if set.is_some() {
                if is_static {
                    let _ = writeln!(
                        out,
                        "            set => Il2CppRuntime.InvokeStaticVoid(\"{}\", \"{}\", \"set_{}\", new global::System.Type[] {{ typeof({}) }}, value);",
                        ns, cls, raw, ty
                    );
                } else {
                    let _ = writeln!(
                        out,
                        "            set => Il2CppRuntime.InvokeVoid(this, \"set_{}\", new global::System.Type[] {{ typeof({}) }}, value);",
                        raw, ty
                    );
                }
            }
            let _ = writeln!(out, "        }}");
            let _ = writeln!(out);
        }
        (out, accessors)
    }

    fn skip_method(&self, name: &str, flags: u32, accessors: &HashSet<String>) -> bool {
        if matches!(name, ".ctor" | ".cctor" | "Finalize") || accessors.contains(name) {
            return true;
        }
        if name.is_empty() || name.contains('.') || is_compiler_generated(name) {
            return true;
        }
        if flags & method_attrs::SPECIAL_NAME != 0
            && (name.starts_with("add_") || name.starts_with("remove_") || name.starts_with("op_"))
        {
            return true;
        }
        flags & method_attrs::ABSTRACT != 0
    }

    fn emit_methods(&self, info: &TypeInfo, names: &MemberNames, accessors: &HashSet<String>) -> String {
        let mut out = String::new();
        let mut signatures = HashSet::new();
        let ns = escape(info.dispatch_namespace());
        let cls = escape(&info.raw_name);

        for method in self.source.class_methods(info.class) {
            let raw = self.source.method_name(method);
            let flags = self.source.method_flags(method);
            if self.skip_method(&raw, flags, accessors) || self.is_fake(method) {
                continue;
            }

            let arity = method_generic_arity(self.source, method);
            // type parameters absent from the signature cannot be named by callers
            if arity == 0 && self.source.method_is_generic(method) {
                continue;
            }
            let ctx = NameContext::new(&info.bucket).in_method(arity);
            let is_static = flags & method_attrs::STATIC != 0;
            let ret_ty = self.source.method_return_type(method);
            let is_void = self.source.is_void_type(ret_ty);
            let ret = if is_void {
                "void".to_string()
            } else {
                self.resolver.resolve(ret_ty, ctx)
            };
            let params = self.params(method, ctx, arity);

            let friendly = self.mapping.member_alias(&info.raw_name, &raw).unwrap_or(&raw);
            let name = names.method_name(&sanitize_identifier(friendly));

            // Overloads may not differ only in ref/out or in return type.
            let key = format!(
                "{}`{}({})",
                name,
                arity,
                params.iter().map(|p| p.ty.as_str()).collect::<Vec<_>>().join(",")
            );
            if !signatures.insert(key) {
                continue;
            }

            let generics: Vec<String> = (0..arity).map(|i| placeholder(i, arity)).collect();
            let decl_params: Vec<String> = params.iter().map(Param::declaration).collect();

            if out.is_empty() {
                out.push_str("\n        // Methods\n");
            }
            let _ = write!(
                out,
                "        {}{} {} {}",
                member_visibility(flags),
                if is_static { " static" } else { "" },
                ret,
                name
            );
            if arity > 0 {
                let _ = write!(out, "<{}>", generics.join(", "));
            }
            let _ = write!(out, "({})", decl_params.join(", "));
            for g in &generics {
                let _ = write!(out, " where {} : class", g);
            }
            out.push('\n');
            let _ = writeln!(out, "        {{");
            for p in params.iter().filter(|p| p.modifier == "out ") {
                let _ = writeln!(out, "            {} = default;", p.name);
            }

            let raw = escape(&raw);
            let types = Self::type_array(&params);
            let args: String = params.iter().map(|p| format!(", {}", p.name)).collect();
            let call = if arity > 0 {
                let generic_types: Vec<String> = generics.iter().map(|g| format!("typeof({})", g)).collect();
                let generic_types = format!("new global::System.Type[] {{ {} }}", generic_types.join(", "));
                let result = if is_void { "object" } else { ret.as_str() };
                if is_static {
                    format!(
                        "Il2CppRuntime.CallStaticGeneric<{}>(\"{}\", \"{}\", \"{}\", {}, {}{})",
                        result, ns, cls, raw, types, generic_types, args
                    )
                } else {
                    format!(
                        "Il2CppRuntime.CallGeneric<{}>(this, \"{}\", {}, {}{})",
                        result, raw, types, generic_types, args
                    )
                }
            } else if is_static {
                if is_void {
                    format!("Il2CppRuntime.InvokeStaticVoid(\"{}\", \"{}\", \"{}\", {}{})", ns, cls, raw, types, args)
                } else {
                    format!(
                        "Il2CppRuntime.CallStatic<{}>(\"{}\", \"{}\", \"{}\", {}{})",
                        ret, ns, cls, raw, types, args
                    )
                }
            } else if is_void {
                format!("Il2CppRuntime.InvokeVoid(this, \"{}\", {}{})", raw, types, args)
            } else {
                format!("Il2CppRuntime.Call<{}>(this, \"{}\", {}{})", ret, raw, types, args)
            };
            if is_void {
                let _ = writeln!(out, "            {};", call);
            } else {
                let _ = writeln!(out, "            return {};", call);
            }
            let _ = writeln!(out, "        }}");
            let _ = writeln!(out);
        }
        out
    }
}

/// Literal value as the backing type spells it.
pub fn format_enum_value(bits: u64, backing: TypeCode) -> String {
    match backing {
        TypeCode::I1 => (bits as u8 as i8).to_string(),
        TypeCode::U1 => (bits as u8).to_string(),
        TypeCode::I2 => (bits as u16 as i16).to_string(),
        TypeCode::U2 => (bits as u16).to_string(),
        TypeCode::U4 => (bits as u32).to_string(),
        TypeCode::I8 => (bits as i64).to_string(),
        TypeCode::U8 => bits.to_string(),
        _ => (bits as u32 as i32).to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::fixture::Universe;
    use crate::codegen::mapping::MappingEntry;
    use crate::codegen::model::{collect, SkipList};
    use crate::config::GeneratorSettings;

    fn emit_bucket(u: &Universe, bucket: &str, mapping: &MappingTable, detector: Option<&Detector>) -> String {
        let skip = SkipList::new(&GeneratorSettings::default());
        let collection = collect(u, &skip, detector, mapping);
        let emitter = Emitter::new(u, &collection, detector, mapping);
        emitter.emit_file(bucket, &collection.buckets[bucket])
    }

    fn count(haystack: &str, needle: &str) -> usize {
        haystack.matches(needle).count()
    }

    #[test]
    fn test_basic_class_wrapper() {
        let mut u = Universe::new();
        let asm = u.add_assembly("Assembly-CSharp.dll");
        let baz = u.add_public_class(asm, "Foo.Bar", "Baz");
        let int = u.prim(TypeCode::I4);
        u.add_field(baz, "value", int, field_attrs::PUBLIC);
        u.add_method(
            baz,
            "Add",
            method_attrs::PUBLIC,
            Some(int),
            &[("a", int), ("b", int)],
            u.base() + 0x2000,
        );

        let text = emit_bucket(&u, "Foo.Bar", &MappingTable::default(), None);
        assert!(text.starts_with("// Auto-generated Il2Cpp wrapper classes\n// Namespace: Foo.Bar\n"));
        assert!(text.contains("namespace Foo.Bar\n{"));
        assert!(text.contains("    public partial class Baz : Il2CppObject\n"));
        assert!(text.contains("public const string _il2cppClassName = \"Baz\";"));
        assert!(text.contains("public const string _il2cppNamespace = \"Foo.Bar\";"));
        assert!(text.contains("public Baz(IntPtr nativePtr) : base(nativePtr) { }"));
        assert!(text.contains("        public int value\n"));
        assert!(text.contains("get => Il2CppRuntime.GetField<int>(this, \"value\");"));
        assert!(text.contains("set => Il2CppRuntime.SetField<int>(this, \"value\", value);"));
        assert!(text.contains("        public int Add(int a, int b)\n"));
        assert!(text.contains(
            "return Il2CppRuntime.Call<int>(this, \"Add\", new global::System.Type[] { typeof(int), typeof(int) }, a, b);"
        ));
        assert!(text.trim_end().ends_with('}'));
    }

    #[test]
    fn test_duplicate_erased_signatures() {
        let mut u = Universe::new();
        let asm = u.add_assembly("Assembly-CSharp.dll");
        let class = u.add_public_class(asm, "Game", "Store");
        let nullable = u.library_class("System", "Nullable`1");
        let tuple = u.library_class("System", "Tuple`2");
        let int = u.prim(TypeCode::I4);
        let a = u.generic_inst(nullable, &[int]);
        let b = u.generic_inst(tuple, &[int, int]);
        u.add_method(class, "Put", method_attrs::PUBLIC, None, &[("x", a)], u.base() + 0x100);
        u.add_method(class, "Put", method_attrs::PUBLIC, None, &[("x", b)], u.base() + 0x200);
        let by_ref = u.byref(int, param_attrs::OUT);
        u.add_method(class, "Get", method_attrs::PUBLIC, None, &[("x", int)], u.base() + 0x300);
        u.add_method(class, "Get", method_attrs::PUBLIC, None, &[("x", by_ref)], u.base() + 0x400);

        let text = emit_bucket(&u, "Game", &MappingTable::default(), None);
        assert_eq!(count(&text, "public void Put(object x)"), 1);
        assert_eq!(count(&text, "public void Get("), 1);
    }

    #[test]
    fn test_raw_name_survives_remapping() {
        let mut u = Universe::new();
        let asm = u.add_assembly("Assembly-CSharp.dll");
        let class = u.add_public_class(asm, "Game", "ABCDEFGHIJK");
        u.add_method(class, "KJIHGFEDCBA", method_attrs::PUBLIC, None, &[], u.base() + 0x100);
        let mapping = MappingTable::from_entries(vec![
            MappingEntry {
                obfuscated_name: "ABCDEFGHIJK".into(),
                friendly_name: "PlayerController".into(),
                symbol_type: 0,
                parent_type: None,
            },
            MappingEntry {
                obfuscated_name: "KJIHGFEDCBA".into(),
                friendly_name: "Jump".into(),
                symbol_type: 3,
                parent_type: Some("ABCDEFGHIJK".into()),
            },
        ]);

        let text = emit_bucket(&u, "Game", &mapping, None);
        assert!(text.contains("public partial class PlayerController : Il2CppObject"));
        assert!(text.contains("public const string _il2cppClassName = \"ABCDEFGHIJK\";"));
        assert!(text.contains("public void Jump()"));
        assert!(text.contains("Il2CppRuntime.InvokeVoid(this, \"KJIHGFEDCBA\", global::System.Type.EmptyTypes);"));
    }

    #[test]
    fn test_properties_and_accessors() {
        let mut u = Universe::new();
        let asm = u.add_assembly("Assembly-CSharp.dll");
        let class = u.add_public_class(asm, "Game", "Player");
        let int = u.prim(TypeCode::I4);
        let get = u.add_method(
            class,
            "get_Health",
            method_attrs::PUBLIC | method_attrs::SPECIAL_NAME,
            Some(int),
            &[],
            u.base() + 0x100,
        );
        let set = u.add_method(
            class,
            "set_Health",
            method_attrs::PUBLIC | method_attrs::SPECIAL_NAME,
            None,
            &[("value", int)],
            u.base() + 0x140,
        );
        u.add_property(class, "Health", Some(get), Some(set));
        let count_get = u.add_method(
            class,
            "get_Count",
            method_attrs::PUBLIC | method_attrs::STATIC | method_attrs::SPECIAL_NAME,
            Some(int),
            &[],
            u.base() + 0x180,
        );
        u.add_property(class, "Count", Some(count_get), None);
        u.add_property(class, "Count", Some(count_get), None);
        u.add_property(class, "System.IDisposable.Thing", Some(count_get), None);

        let text = emit_bucket(&u, "Game", &MappingTable::default(), None);
        assert!(text.contains("        public int Health\n"));
        assert!(text.contains("get => Il2CppRuntime.Call<int>(this, \"get_Health\", global::System.Type.EmptyTypes);"));
        assert!(text.contains(
            "set => Il2CppRuntime.InvokeVoid(this, \"set_Health\", new global::System.Type[] { typeof(int) }, value);"
        ));
        assert!(text.contains(
            "get => Il2CppRuntime.CallStatic<int>(\"Game\", \"Player\", \"get_Count\", global::System.Type.EmptyTypes);"
        ));
        assert_eq!(count(&text, "public static int Count"), 1);
        assert!(!text.contains("get_Health("));
        assert!(!text.contains("IDisposable"));
    }

    #[test]
    fn test_generic_method_and_modifiers() {
        let mut u = Universe::new();
        let asm = u.add_assembly("Assembly-CSharp.dll");
        let class = u.add_public_class(asm, "", "Services");
        let t = u.method_param(0);
        let string = u.prim(TypeCode::STRING);
        u.add_method(
            class,
            "Resolve",
            method_attrs::PUBLIC | method_attrs::STATIC,
            Some(t),
            &[("key", string)],
            u.base() + 0x100,
        );
        let int = u.prim(TypeCode::I4);
        let boolean = u.prim(TypeCode::BOOLEAN);
        let out_int = u.byref(int, param_attrs::OUT);
        let ref_int = u.byref(int, 0);
        let in_int = u.byref(int, param_attrs::IN);
        u.add_method(
            class,
            "TryGet",
            method_attrs::PUBLIC,
            Some(boolean),
            &[("a", out_int), ("b", ref_int), ("c", in_int)],
            u.base() + 0x140,
        );

        let text = emit_bucket(&u, "Global", &MappingTable::default(), None);
        assert!(text.contains("namespace Global\n"));
        assert!(text.contains("public static T Resolve<T>(string key) where T : class\n"));
        assert!(text.contains(
            "return Il2CppRuntime.CallStaticGeneric<T>(\"Global\", \"Services\", \"Resolve\", new global::System.Type[] { typeof(string) }, new global::System.Type[] { typeof(T) }, key);"
        ));
        assert!(text.contains("public bool TryGet(out int a, ref int b, in int c)\n"));
        assert!(text.contains("            a = default;\n"));
    }

    #[test]
    fn test_generic_method_without_signature_placeholders_is_left_out() {
        let mut u = Universe::new();
        let asm = u.add_assembly("Assembly-CSharp.dll");
        let class = u.add_public_class(asm, "", "Registry");
        let register = u.add_method(class, "Register", method_attrs::PUBLIC, None, &[], u.base() + 0x100);
        u.make_generic_method(register);
        let t = u.method_param(0);
        let add = u.add_method(class, "Add", method_attrs::PUBLIC, None, &[("item", t)], u.base() + 0x140);
        u.make_generic_method(add);
        u.add_public_method(class, "Clear", None);

        let text = emit_bucket(&u, "Global", &MappingTable::default(), None);
        assert!(!text.contains("Register"));
        assert!(text.contains("public void Add<T>(T item)"));
        assert!(text.contains("public void Clear()"));
    }

    #[test]
    fn test_decoys_and_special_methods_are_left_out() {
        use crate::obfuscation::DetectorConfig;

        let mut u = Universe::new();
        let asm = u.add_assembly("Assembly-CSharp.dll");
        let class = u.add_public_class(asm, "Game", "Enemy");
        u.add_method(class, ".ctor", method_attrs::PUBLIC | method_attrs::SPECIAL_NAME, None, &[], u.base() + 0x10);
        u.add_method(class, "add_OnDeath", method_attrs::PUBLIC | method_attrs::SPECIAL_NAME, None, &[], u.base() + 0x20);
        u.add_method(class, "op_Equality", method_attrs::PUBLIC | method_attrs::SPECIAL_NAME | method_attrs::STATIC, None, &[], u.base() + 0x30);
        u.add_method(class, "Tick", method_attrs::PUBLIC | method_attrs::ABSTRACT | method_attrs::VIRTUAL, None, &[], 0);
        u.add_method(class, "<Start>b__0", method_attrs::PRIVATE, None, &[], u.base() + 0x40);
        u.add_method(class, "HGFEDCBAKJI", method_attrs::PUBLIC, None, &[], 0);
        u.add_method(class, "Enemy", method_attrs::PUBLIC, None, &[], u.base() + 0x50);
        u.add_public_method(class, "Attack", None);

        let mut detector = Detector::new(DetectorConfig::default());
        detector.analyze(&u);
        let text = emit_bucket(&u, "Game", &MappingTable::default(), Some(&detector));
        assert!(!text.contains("ctor"));
        assert!(!text.contains("add_OnDeath"));
        assert!(!text.contains("op_Equality"));
        assert!(!text.contains(" Tick("));
        assert!(!text.contains("b__0"));
        assert!(!text.contains("HGFEDCBAKJI"));
        assert!(text.contains("public void Enemy_()"));
        assert!(text.contains("Il2CppRuntime.InvokeVoid(this, \"Enemy\", global::System.Type.EmptyTypes);"));
        assert!(text.contains("public void Attack()"));
    }

    #[test]
    fn test_enum_struct_delegate_interface() {
        let mut u = Universe::new();
        let asm = u.add_assembly("Assembly-CSharp.dll");
        let flags = u.add_public_class(asm, "Game", "Flags");
        u.make_enum(flags, TypeCode::I1);
        u.add_literal(flags, "None", 0);
        u.add_literal(flags, "Negative", 0xFF);
        u.add_literal(flags, "Max", 0x7F);
        let mask = u.add_public_class(asm, "Game", "Mask");
        u.make_enum(mask, TypeCode::U8);
        u.add_literal(mask, "All", u64::MAX);

        let point = u.add_public_class(asm, "Game", "Point");
        u.make_valuetype(point);
        let float = u.prim(TypeCode::R4);
        u.add_field(point, "x", float, field_attrs::PUBLIC);
        u.add_field(point, "<y>k__BackingField", float, field_attrs::PRIVATE);
        u.add_field(point, "Zero", u.class_type_of(point), field_attrs::PUBLIC | field_attrs::STATIC);
        let empty = u.add_public_class(asm, "Game", "Empty");
        u.make_valuetype(empty);

        let handler = u.add_public_class(asm, "Game", "Handler");
        u.make_delegate(handler);
        let int = u.prim(TypeCode::I4);
        u.add_method(handler, "Invoke", method_attrs::PUBLIC, Some(int), &[("sender", int)], u.base() + 0x10);
        let bare = u.add_public_class(asm, "Game", "Bare");
        u.make_delegate(bare);
        u.add_class(asm, "Game", "IThing", type_attrs::PUBLIC | type_attrs::INTERFACE | type_attrs::ABSTRACT);

        let text = emit_bucket(&u, "Game", &MappingTable::default(), None);
        assert!(text.contains("    public enum Flags : sbyte\n    {\n        None = 0,\n        Negative = -1,\n        Max = 127\n    }\n"));
        assert!(text.contains("    public enum Mask : ulong\n"));
        assert!(text.contains("        All = 18446744073709551615\n"));
        assert!(text.contains("    public struct Point\n    {\n        public float x;\n    }\n"));
        assert!(text.contains("    public struct Empty\n    {\n        // Stub struct\n    }\n"));
        assert!(text.contains("    public delegate int Handler(int sender);\n"));
        assert!(text.contains("    public delegate void Bare();\n"));
        assert!(text.contains("    public interface IThing\n    {\n        // Stub interface\n    }\n"));

        let delegate_at = text.find("delegate int Handler").unwrap();
        let enum_at = text.find("enum Flags").unwrap();
        let iface_at = text.find("interface IThing").unwrap();
        let struct_at = text.find("struct Point").unwrap();
        assert!(delegate_at < enum_at && enum_at < iface_at && iface_at < struct_at);
    }

    #[test]
    fn test_interface_fields_and_usings() {
        let mut u = Universe::new();
        let asm = u.add_assembly("Assembly-CSharp.dll");
        u.add_public_class(asm, "UnityEngine", "Camera");
        let iface = u.add_class(asm, "Game", "ITarget", type_attrs::PUBLIC | type_attrs::INTERFACE | type_attrs::ABSTRACT);
        let class = u.add_public_class(asm, "Game", "Turret");
        u.add_field(class, "target", u.class_type_of(iface), field_attrs::PRIVATE);
        let int = u.prim(TypeCode::I4);
        u.add_field(class, "Turret", int, field_attrs::PUBLIC);

        let text = emit_bucket(&u, "Game", &MappingTable::default(), None);
        assert!(text.contains("using UnityEngine;\n"));
        assert!(!text.contains("using UnityEngine.UI;"));
        assert!(text.contains("        private object target\n"));
        assert!(text.contains("        public int Turret_\n"));
        assert!(text.contains("GetField<int>(this, \"Turret\")"));
    }

    #[test]
    fn test_enum_values_by_backing() {
        assert_eq!(format_enum_value(0xFFFF_FFFF, TypeCode::I4), "-1");
        assert_eq!(format_enum_value(0xFFFF_FFFF, TypeCode::U4), "4294967295");
        assert_eq!(format_enum_value(0x8000, TypeCode::I2), "-32768");
        assert_eq!(format_enum_value(0x1_0000_0005, TypeCode::U2), "5");
        assert_eq!(format_enum_value(u64::MAX, TypeCode::I8), "-1");
    }
}
