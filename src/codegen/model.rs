//! Collection and registration of the types the SDK will contain

use super::mapping::MappingTable;
use super::naming::{is_compiler_generated, sanitize_identifier, split_arity};
use crate::backend::*;
use crate::common::attributes::{is_public_type, type_attrs, type_visibility};
use crate::common::TypeKind;
use crate::config::GeneratorSettings;
use crate::il2cpp::type_name::{bucket_of, KnownTypes, NameContext, TypeNameResolver, ERASED};
use crate::obfuscation::Detector;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use tracing::debug;

/// Base class of every wrapper without an emitted parent.
pub const ROOT_BASE: &str = "Il2CppObject";

/// Names the SDK runtime itself declares.
const RESERVED_NAMES: &[&str] = &["Il2CppObject", "Il2CppRuntime", "GameSDK"];

const SKIP_NAMESPACES: &[&str] = &[
    "System",
    "Mono",
    "mscorlib",
    "Internal",
    "Microsoft",
    "UnityEngine.Internal",
    "UnityEngineInternal",
];

const SKIP_PREFIXES: &[&str] = &["System.", "Mono.", "Internal.", "Microsoft."];

/// Namespaces the generator never wraps.
#[derive(Debug, Clone, Default)]
pub struct SkipList {
    namespaces: Vec<String>,
    prefixes: Vec<String>,
}

impl SkipList {
    pub fn new(settings: &GeneratorSettings) -> Self {
        SkipList {
            namespaces: SKIP_NAMESPACES
                .iter()
                .map(|s| s.to_string())
                .chain(settings.custom_skip_namespaces.iter().cloned())
                .collect(),
            prefixes: SKIP_PREFIXES
                .iter()
                .map(|s| s.to_string())
                .chain(settings.custom_skip_prefixes.iter().cloned())
                .collect(),
        }
    }

    pub fn should_skip(&self, ns: &str) -> bool {
        self.namespaces.iter().any(|n| n == ns) || self.prefixes.iter().any(|p| ns.starts_with(p.as_str()))
    }
}

/// A class that survived collection.
#[derive(Debug, Clone)]
pub struct TypeInfo {
    pub class: ClassHandle,
    pub raw_name: String,
    /// The class's own namespace, possibly empty for nested types
    pub raw_namespace: String,
    /// Emitted identifier: friendly alias or sanitised raw name
    pub name: String,
    pub bucket: String,
    pub kind: TypeKind,
    pub visibility: &'static str,
    pub is_static: bool,
    pub base: String,
}

impl TypeInfo {
    /// Namespace argument for static dispatch.
    pub fn dispatch_namespace(&self) -> &str {
        bucket_of(&self.raw_namespace)
    }
}

#[derive(Debug, Default)]
pub struct Collection {
    pub buckets: BTreeMap<String, Vec<TypeInfo>>,
    pub known: KnownTypes,
    pub total_classes: usize,
    pub total_assemblies: usize,
    pub image_names: Vec<String>,
    pub skipped_fake_classes: usize,
}

impl Collection {
    pub fn type_count(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }
}

fn classify<S: MetadataSource + ?Sized>(source: &S, class: ClassHandle) -> TypeKind {
    if let Some(parent) = source.class_parent(class) {
        let ns = source.class_namespace(parent);
        let name = source.class_name(parent);
        if ns == "System" && (name == "MulticastDelegate" || name == "Delegate") {
            return TypeKind::Delegate;
        }
    }
    if source.class_is_enum(class) {
        TypeKind::Enum
    } else if source.class_flags(class) & type_attrs::INTERFACE != 0 {
        TypeKind::Interface
    } else if source.class_is_valuetype(class) {
        TypeKind::Struct
    } else {
        TypeKind::Class
    }
}

fn emitted_name(raw: &str, mapping: &MappingTable) -> String {
    let name = match mapping.type_alias(raw) {
        Some(alias) => sanitize_identifier(alias),
        None => sanitize_identifier(split_arity(raw).0),
    };
    if RESERVED_NAMES.contains(&name.as_str()) {
        format!("{}_", name)
    } else {
        name
    }
}

/// Walk every image, keep the wrappable classes, register their emitted
/// names and compute base classes.
pub fn collect<S: MetadataSource + ?Sized>(
    source: &S,
    skip: &SkipList,
    detector: Option<&Detector>,
    mapping: &MappingTable,
) -> Collection {
    let mut collection = Collection::default();
    let mut candidates = Vec::new();

    for assembly in source.assemblies() {
        collection.total_assemblies += 1;
        let Some(image) = source.assembly_image(assembly) else {
            continue;
        };
        collection.image_names.push(source.image_name(image));

        for class in source.image_classes(image) {
            collection.total_classes += 1;
            let name = source.class_name(class);
            if name.is_empty() || is_compiler_generated(&name) {
                continue;
            }
            let ns = source.effective_namespace(class);
            if skip.should_skip(&ns) {
                continue;
            }
            let flags = source.class_flags(class);
            if !is_public_type(flags) {
                continue;
            }
            if detector.is_some_and(|d| d.is_entirely_fake_class(class)) {
                collection.skipped_fake_classes += 1;
                continue;
            }

            candidates.push(TypeInfo {
                class,
                name: emitted_name(&name, mapping),
                raw_namespace: source.class_namespace(class),
                raw_name: name,
                bucket: bucket_of(&ns).to_string(),
                kind: classify(source, class),
                visibility: type_visibility(flags),
                is_static: flags & type_attrs::ABSTRACT != 0 && flags & type_attrs::SEALED != 0,
                base: ROOT_BASE.to_string(),
            });
        }
    }

    // A type may not share its full name with a namespace.
    let bucket_names: HashSet<String> = candidates.iter().map(|t| t.bucket.clone()).collect();
    let mut seen: HashMap<String, BTreeSet<String>> = HashMap::new();
    let mut emitted_classes = HashSet::new();

    for mut info in candidates {
        while bucket_names.contains(&format!("{}.{}", info.bucket, info.name)) {
            info.name.push('_');
        }
        if !seen.entry(info.bucket.clone()).or_default().insert(info.name.clone()) {
            debug!("Duplicate type name {}.{}, skipped", info.bucket, info.name);
            continue;
        }
        if collection.known.lookup(&info.bucket, &info.raw_name).is_none() {
            collection.known.insert(&info.bucket, &info.raw_name, &info.name);
        }
        if info.kind == TypeKind::Class {
            emitted_classes.insert(info.class);
        }
        collection.buckets.entry(info.bucket.clone()).or_default().push(info);
    }

    let resolver = TypeNameResolver::new(source, &collection.known);
    let mut bases = HashMap::new();
    for info in collection.buckets.values().flat_map(|v| v.iter()) {
        if info.kind != TypeKind::Class {
            continue;
        }
        let Some(parent) = source.class_parent(info.class) else {
            continue;
        };
        if !emitted_classes.contains(&parent) {
            continue;
        }
        let spelled = resolver.class_spelling(parent, NameContext::new(&info.bucket));
        if spelled != ERASED && spelled != info.name {
            bases.insert(info.class, spelled);
        }
    }
    for info in collection.buckets.values_mut().flat_map(|v| v.iter_mut()) {
        if let Some(base) = bases.remove(&info.class) {
            info.base = base;
        }
    }

    for types in collection.buckets.values_mut() {
        types.sort_by_key(|t| t.kind);
    }
    collection
}
