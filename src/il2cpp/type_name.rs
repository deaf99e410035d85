//! C# spelling of runtime types
//!
//! Resolution is a pure function of the type, the namespace being emitted,
//! the generic arity of the enclosing method and the registry of types the
//! generator will emit. Anything that cannot be spelled safely erases to
//! `object`.

use crate::backend::*;
use crate::codegen::naming::{sanitize_namespace, split_arity};
use crate::common::TypeCode;
use std::collections::HashMap;

/// Universal base every unresolvable type erases to.
pub const ERASED: &str = "object";

/// Namespaces whose types do not exist on the SDK's target framework.
const UNSUPPORTED_NAMESPACES: &[&str] = &[
    "System.IO.Enumeration",
    "System.Runtime.Intrinsics",
    "System.Buffers",
    "UnityEngineInternal",
];

const UNSUPPORTED_PREFIXES: &[&str] = &[
    "System.Runtime.Intrinsics.",
    "System.Buffers.",
    "Internal.",
    "Internal",
    "Mono.",
    "Mono",
    "Microsoft.",
    "Microsoft",
];

const SPAN_TYPES: &[&str] = &["Span`1", "ReadOnlySpan`1", "Memory`1", "ReadOnlyMemory`1"];

/// Generic containers that keep their shape: (namespace, definition, spelling).
const CONTAINERS: &[(&str, &str, &str)] = &[
    ("System.Collections.Generic", "List`1", "global::System.Collections.Generic.List"),
    ("System.Collections.Generic", "Dictionary`2", "global::System.Collections.Generic.Dictionary"),
    ("System.Collections.Generic", "HashSet`1", "global::System.Collections.Generic.HashSet"),
    ("System.Collections.Generic", "Queue`1", "global::System.Collections.Generic.Queue"),
    ("System.Collections.Generic", "Stack`1", "global::System.Collections.Generic.Stack"),
    ("System.Collections.Generic", "LinkedList`1", "global::System.Collections.Generic.LinkedList"),
    ("System.Collections.Generic", "IList`1", "global::System.Collections.Generic.IList"),
    ("System.Collections.Generic", "ICollection`1", "global::System.Collections.Generic.ICollection"),
    ("System.Collections.Generic", "IEnumerable`1", "global::System.Collections.Generic.IEnumerable"),
    ("System.Collections.Generic", "IEnumerator`1", "global::System.Collections.Generic.IEnumerator"),
    ("System.Collections.Generic", "IReadOnlyList`1", "global::System.Collections.Generic.IReadOnlyList"),
    ("System.Collections.Generic", "IReadOnlyCollection`1", "global::System.Collections.Generic.IReadOnlyCollection"),
    ("System.Collections.Generic", "IDictionary`2", "global::System.Collections.Generic.IDictionary"),
    ("System.Collections.Generic", "KeyValuePair`2", "global::System.Collections.Generic.KeyValuePair"),
    ("System.Threading.Tasks", "Task`1", "global::System.Threading.Tasks.Task"),
];

/// `System` classes spelled with a C# keyword.
const SYSTEM_KEYWORDS: &[(&str, &str)] = &[
    ("Void", "void"),
    ("Boolean", "bool"),
    ("Char", "char"),
    ("SByte", "sbyte"),
    ("Byte", "byte"),
    ("Int16", "short"),
    ("UInt16", "ushort"),
    ("Int32", "int"),
    ("UInt32", "uint"),
    ("Int64", "long"),
    ("UInt64", "ulong"),
    ("Single", "float"),
    ("Double", "double"),
    ("Decimal", "decimal"),
    ("String", "string"),
    ("Object", "object"),
    ("IntPtr", "IntPtr"),
    ("UIntPtr", "UIntPtr"),
];

/// Non-generic `System` types the SDK may reference directly.
const ALLOWED_SYSTEM_TYPES: &[&str] = &["Type", "DateTime", "TimeSpan", "Guid", "Exception", "Array", "Action"];

pub fn is_unsupported_namespace(ns: &str) -> bool {
    UNSUPPORTED_NAMESPACES.contains(&ns)
        || UNSUPPORTED_PREFIXES
            .iter()
            .any(|p| if p.ends_with('.') { ns.starts_with(p) } else { ns == *p })
}

/// Namespace bucket a type is emitted into.
pub fn bucket_of(ns: &str) -> &str {
    if ns.is_empty() {
        "Global"
    } else {
        ns
    }
}

/// Method generic placeholder: `T` for a single parameter, `T<n>` otherwise.
pub fn placeholder(index: usize, arity: usize) -> String {
    if arity == 1 {
        "T".to_string()
    } else {
        format!("T{}", index)
    }
}

/// Every fully-qualified type the generator is going to emit, with the name
/// it is emitted under (friendly alias or sanitised raw name).
#[derive(Debug, Default, Clone)]
pub struct KnownTypes {
    types: HashMap<(String, String), String>,
}

impl KnownTypes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, namespace: &str, raw_name: &str, emitted_name: &str) {
        self.types.insert(
            (bucket_of(namespace).to_string(), raw_name.to_string()),
            emitted_name.to_string(),
        );
    }

    pub fn lookup(&self, namespace: &str, raw_name: &str) -> Option<&str> {
        self.types
            .get(&(bucket_of(namespace).to_string(), raw_name.to_string()))
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

/// Where a type name is being written.
#[derive(Debug, Clone, Copy)]
pub struct NameContext<'c> {
    /// Namespace bucket of the file being emitted
    pub namespace: &'c str,
    /// Generic arity of the enclosing method, 0 outside generic methods
    pub method_arity: usize,
}

impl<'c> NameContext<'c> {
    pub fn new(namespace: &'c str) -> Self {
        NameContext {
            namespace,
            method_arity: 0,
        }
    }

    pub fn in_method(self, method_arity: usize) -> Self {
        NameContext { method_arity, ..self }
    }
}

pub struct TypeNameResolver<'a, S: MetadataSource + ?Sized> {
    source: &'a S,
    known: &'a KnownTypes,
}

impl<'a, S: MetadataSource + ?Sized> TypeNameResolver<'a, S> {
    pub fn new(source: &'a S, known: &'a KnownTypes) -> Self {
        TypeNameResolver { source, known }
    }

    pub fn resolve(&self, ty: Option<TypeHandle>, ctx: NameContext<'_>) -> String {
        match ty {
            Some(ty) => self.resolve_depth(ty, ctx, 0),
            None => ERASED.to_string(),
        }
    }

    fn resolve_depth(&self, ty: TypeHandle, ctx: NameContext<'_>, depth: usize) -> String {
        if depth > 16 {
            return ERASED.to_string();
        }
        let code = self.source.type_code(ty);
        if let Some(keyword) = code.csharp_keyword() {
            return keyword.to_string();
        }
        match code {
            TypeCode::SZARRAY => match self.source.type_element(ty) {
                Some(elem) => {
                    let inner = self.resolve_depth(elem, ctx, depth + 1);
                    if inner == "void" {
                        format!("{}[]", ERASED)
                    } else {
                        format!("{}[]", inner)
                    }
                }
                None => format!("{}[]", ERASED),
            },
            TypeCode::ARRAY => "Array".to_string(),
            TypeCode::PTR | TypeCode::FNPTR => "IntPtr".to_string(),
            TypeCode::MVAR => match self.source.type_generic_param_index(ty) {
                Some(index) if (index as usize) < ctx.method_arity => {
                    placeholder(index as usize, ctx.method_arity)
                }
                _ => ERASED.to_string(),
            },
            TypeCode::VAR => ERASED.to_string(),
            TypeCode::GENERICINST => self.resolve_generic(ty, ctx, depth),
            TypeCode::CLASS | TypeCode::VALUETYPE => match self.source.type_class(ty) {
                Some(class) => self.class_spelling(class, ctx),
                None => ERASED.to_string(),
            },
            _ => ERASED.to_string(),
        }
    }

    fn resolve_generic(&self, ty: TypeHandle, ctx: NameContext<'_>, depth: usize) -> String {
        let Some(definition) = self.source.type_class(ty) else {
            return ERASED.to_string();
        };
        let ns = self.source.class_namespace(definition);
        let name = self.source.class_name(definition);
        if is_unsupported_namespace(&ns) || SPAN_TYPES.contains(&name.as_str()) {
            return ERASED.to_string();
        }

        if let Some((_, _, spelled)) = CONTAINERS.iter().find(|(n, d, _)| *n == ns && *d == name) {
            let (_, arity) = split_arity(&name);
            let args = self.source.type_generic_args(ty);
            let args: Vec<String> = if args.len() == arity {
                args.into_iter()
                    .map(|a| self.resolve_depth(a, ctx, depth + 1))
                    .map(|a| if a == "void" { ERASED.to_string() } else { a })
                    .collect()
            } else {
                vec![ERASED.to_string(); arity]
            };
            return format!("{}<{}>", spelled, args.join(", "));
        }

        let (base, _) = split_arity(&name);
        if ns == "System" && base == "Action" {
            return "global::System.Action".to_string();
        }
        ERASED.to_string()
    }

    /// Spelling of a non-generic class reference.
    pub fn class_spelling(&self, class: ClassHandle, ctx: NameContext<'_>) -> String {
        let name = self.source.class_name(class);
        if name.is_empty() || name.contains('`') {
            return ERASED.to_string();
        }
        let ns = self.source.effective_namespace(class);
        if ns == "System" {
            if let Some((_, kw)) = SYSTEM_KEYWORDS.iter().find(|(n, _)| *n == name) {
                return kw.to_string();
            }
        }
        if is_unsupported_namespace(&ns) {
            return ERASED.to_string();
        }
        if let Some(emitted) = self.known.lookup(&ns, &name) {
            return self.qualify(bucket_of(&ns), emitted, ctx);
        }
        if ns == "System" && ALLOWED_SYSTEM_TYPES.contains(&name.as_str()) {
            return format!("global::System.{}", name);
        }
        ERASED.to_string()
    }

    fn qualify(&self, bucket: &str, emitted: &str, ctx: NameContext<'_>) -> String {
        // `Object` collides with System.Object through `using System`
        if bucket == ctx.namespace && emitted != "Object" {
            emitted.to_string()
        } else {
            format!("global::{}.{}", sanitize_namespace(bucket), emitted)
        }
    }
}

/// Number of method-level generic parameters a method uses, derived from the
/// highest `MVAR` index in its signature.
pub fn method_generic_arity<S: MetadataSource + ?Sized>(source: &S, method: MethodHandle) -> usize {
    fn walk<S: MetadataSource + ?Sized>(source: &S, ty: TypeHandle, depth: usize) -> usize {
        if depth > 16 {
            return 0;
        }
        match source.type_code(ty) {
            TypeCode::MVAR => source
                .type_generic_param_index(ty)
                .map(|i| i as usize + 1)
                .unwrap_or(0),
            TypeCode::SZARRAY | TypeCode::PTR => source
                .type_element(ty)
                .map(|e| walk(source, e, depth + 1))
                .unwrap_or(0),
            TypeCode::GENERICINST => source
                .type_generic_args(ty)
                .into_iter()
                .map(|a| walk(source, a, depth + 1))
                .max()
                .unwrap_or(0),
            _ => 0,
        }
    }

    let ret = source.method_return_type(method).map(|t| walk(source, t, 0)).unwrap_or(0);
    (0..source.method_param_count(method))
        .filter_map(|i| source.method_param_type(method, i))
        .map(|t| walk(source, t, 0))
        .fold(ret, usize::max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::fixture::Universe;

    fn setup() -> (Universe, KnownTypes, ClassHandle, ClassHandle) {
        let mut u = Universe::new();
        let asm = u.add_assembly("Assembly-CSharp.dll");
        let player = u.add_public_class(asm, "Game.Actors", "Player");
        let item = u.add_public_class(asm, "", "Item");
        let mut known = KnownTypes::new();
        known.insert("Game.Actors", "Player", "Player");
        known.insert("", "Item", "Item");
        (u, known, player, item)
    }

    #[test]
    fn test_primitives_and_arrays() {
        let (mut u, known, _, _) = setup();
        let int = u.prim(TypeCode::I4);
        let string = u.prim(TypeCode::STRING);
        let arr = u.array_of(int);
        let jagged = u.array_of(arr);
        let ptr = u.pointer_to(int);
        let native = u.prim(TypeCode::I);
        let r = TypeNameResolver::new(&u, &known);
        let ctx = NameContext::new("Game");
        assert_eq!(r.resolve(Some(int), ctx), "int");
        assert_eq!(r.resolve(Some(string), ctx), "string");
        assert_eq!(r.resolve(Some(arr), ctx), "int[]");
        assert_eq!(r.resolve(Some(jagged), ctx), "int[][]");
        assert_eq!(r.resolve(Some(ptr), ctx), "IntPtr");
        assert_eq!(r.resolve(Some(native), ctx), "IntPtr");
        assert_eq!(r.resolve(None, ctx), "object");
    }

    #[test]
    fn test_qualification() {
        let (u, known, player, item) = setup();
        let r = TypeNameResolver::new(&u, &known);
        let player_ty = u.class_type_of(player);
        let item_ty = u.class_type_of(item);
        assert_eq!(r.resolve(Some(player_ty), NameContext::new("Game.Actors")), "Player");
        assert_eq!(
            r.resolve(Some(player_ty), NameContext::new("Global")),
            "global::Game.Actors.Player"
        );
        assert_eq!(r.resolve(Some(item_ty), NameContext::new("Global")), "Item");
        assert_eq!(r.resolve(Some(item_ty), NameContext::new("Game")), "global::Global.Item");
    }

    #[test]
    fn test_unknown_game_type_erases() {
        let (mut u, known, _, _) = setup();
        let asm = u.add_assembly("Other.dll");
        let hidden = u.add_public_class(asm, "Game", "Hidden");
        let r = TypeNameResolver::new(&u, &known);
        assert_eq!(r.resolve(Some(u.class_type_of(hidden)), NameContext::new("Game")), "object");
    }

    #[test]
    fn test_friendly_alias_from_registry() {
        let mut u = Universe::new();
        let asm = u.add_assembly("Assembly-CSharp.dll");
        let obf = u.add_public_class(asm, "Game", "ABCDEFGHIJK");
        let mut known = KnownTypes::new();
        known.insert("Game", "ABCDEFGHIJK", "PlayerController");
        let r = TypeNameResolver::new(&u, &known);
        assert_eq!(r.resolve(Some(u.class_type_of(obf)), NameContext::new("Game")), "PlayerController");
    }

    #[test]
    fn test_nested_type_uses_outer_namespace() {
        let (mut u, mut known, player, _) = setup();
        let asm = AssemblyHandle(1);
        let state = u.add_class(asm, "", "State", crate::common::attributes::type_attrs::NESTED_PUBLIC);
        u.set_declaring(state, player);
        known.insert("Game.Actors", "State", "State");
        let r = TypeNameResolver::new(&u, &known);
        assert_eq!(r.resolve(Some(u.class_type_of(state)), NameContext::new("Game.Actors")), "State");
    }

    #[test]
    fn test_generic_containers() {
        let (mut u, known, player, _) = setup();
        let list = u.library_class("System.Collections.Generic", "List`1");
        let dict = u.library_class("System.Collections.Generic", "Dictionary`2");
        let nullable = u.library_class("System", "Nullable`1");
        let action = u.library_class("System", "Action`2");
        let span = u.library_class("System", "Span`1");
        let custom = u.add_public_class(AssemblyHandle(1), "Game", "Pool`1");
        let task = u.library_class("System.Threading.Tasks", "Task`1");

        let int = u.prim(TypeCode::I4);
        let string = u.prim(TypeCode::STRING);
        let player_ty = u.class_type_of(player);
        let var = u.class_param(0);
        let list_player = u.generic_inst(list, &[player_ty]);
        let dict_str_list = u.generic_inst(dict, &[string, list_player]);
        let list_var = u.generic_inst(list, &[var]);
        let nullable_int = u.generic_inst(nullable, &[int]);
        let action_ty = u.generic_inst(action, &[int, string]);
        let span_ty = u.generic_inst(span, &[int]);
        let custom_ty = u.generic_inst(custom, &[int]);
        let task_ty = u.generic_inst(task, &[int]);
        let broken = u.generic_inst(dict, &[int]);

        let r = TypeNameResolver::new(&u, &known);
        let ctx = NameContext::new("Game.Actors");
        let generic = "global::System.Collections.Generic";
        assert_eq!(r.resolve(Some(list_player), ctx), format!("{}.List<Player>", generic));
        assert_eq!(
            r.resolve(Some(dict_str_list), ctx),
            format!("{0}.Dictionary<string, {0}.List<Player>>", generic)
        );
        assert_eq!(r.resolve(Some(list_var), ctx), format!("{}.List<object>", generic));
        assert_eq!(r.resolve(Some(nullable_int), ctx), "object");
        assert_eq!(r.resolve(Some(action_ty), ctx), "global::System.Action");
        assert_eq!(r.resolve(Some(span_ty), ctx), "object");
        assert_eq!(r.resolve(Some(custom_ty), ctx), "object");
        assert_eq!(r.resolve(Some(task_ty), ctx), "global::System.Threading.Tasks.Task<int>");
        assert_eq!(r.resolve(Some(broken), ctx), format!("{}.Dictionary<object, object>", generic));
    }

    #[test]
    fn test_game_types_do_not_shadow_system_generics() {
        let (mut u, mut known, _, _) = setup();
        let asm = AssemblyHandle(1);
        let game_list = u.add_public_class(asm, "Game.Actors", "List");
        let game_action = u.add_public_class(asm, "Game.Actors", "Action");
        known.insert("Game.Actors", "List", "List");
        known.insert("Game.Actors", "Action", "Action");
        let list = u.library_class("System.Collections.Generic", "List`1");
        let action = u.library_class("System", "Action`1");
        let int = u.prim(TypeCode::I4);
        let list_int = u.generic_inst(list, &[int]);
        let action_int = u.generic_inst(action, &[int]);

        let r = TypeNameResolver::new(&u, &known);
        let ctx = NameContext::new("Game.Actors");
        assert_eq!(r.resolve(Some(u.class_type_of(game_list)), ctx), "List");
        assert_eq!(r.resolve(Some(u.class_type_of(game_action)), ctx), "Action");
        assert_eq!(r.resolve(Some(list_int), ctx), "global::System.Collections.Generic.List<int>");
        assert_eq!(r.resolve(Some(action_int), ctx), "global::System.Action");
    }

    #[test]
    fn test_method_placeholders() {
        let (mut u, known, player, _) = setup();
        let t0 = u.method_param(0);
        let t1 = u.method_param(1);
        let arr = u.array_of(t1);
        let m = u.add_method(player, "Swap", 0x0006, Some(t0), &[("a", t0), ("b", arr)], 0x1000);
        assert_eq!(method_generic_arity(&u, m), 2);

        let r = TypeNameResolver::new(&u, &known);
        let ctx = NameContext::new("Game.Actors");
        assert_eq!(r.resolve(Some(t0), ctx.in_method(1)), "T");
        assert_eq!(r.resolve(Some(t0), ctx.in_method(2)), "T0");
        assert_eq!(r.resolve(Some(arr), ctx.in_method(2)), "T1[]");
        assert_eq!(r.resolve(Some(t0), ctx), "object");
    }

    #[test]
    fn test_system_and_unsupported() {
        let (mut u, known, _, _) = setup();
        let int32 = u.library_class("System", "Int32");
        let type_class = u.library_class("System", "Type");
        let enumerator = u.library_class("System.IO.Enumeration", "FileSystemEntry");
        let mono = u.library_class("Mono.Security", "Cert");
        let internal = u.library_class("UnityEngineInternal", "Probe");
        let r = TypeNameResolver::new(&u, &known);
        let ctx = NameContext::new("Game");
        assert_eq!(r.class_spelling(int32, ctx), "int");
        assert_eq!(r.class_spelling(type_class, ctx), "global::System.Type");
        assert_eq!(r.class_spelling(enumerator, ctx), "object");
        assert_eq!(r.class_spelling(mono, ctx), "object");
        assert_eq!(r.class_spelling(internal, ctx), "object");
    }

    #[test]
    fn test_unity_object_is_always_qualified() {
        let mut u = Universe::new();
        let asm = u.add_assembly("UnityEngine.CoreModule.dll");
        let obj = u.add_public_class(asm, "UnityEngine", "Object");
        let mut known = KnownTypes::new();
        known.insert("UnityEngine", "Object", "Object");
        let r = TypeNameResolver::new(&u, &known);
        assert_eq!(r.class_spelling(obj, NameContext::new("UnityEngine")), "global::UnityEngine.Object");
    }

    #[test]
    fn test_unsupported_namespace_rules() {
        assert!(is_unsupported_namespace("System.Buffers"));
        assert!(is_unsupported_namespace("Mono.Unix"));
        assert!(is_unsupported_namespace("Microsoft"));
        assert!(!is_unsupported_namespace("MonoBehaviourExtras"));
        assert!(!is_unsupported_namespace("UnityEngine"));
    }
}
