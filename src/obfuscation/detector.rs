use super::DetectorConfig;
use crate::backend::*;
use crate::common::attributes::method_attrs;
use crate::il2cpp::signature::Pattern;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use tracing::{debug, info};

/// Bodies of empty or constant-returning stubs. Only used to tag stub
/// pointers, never as a detection signal on its own.
pub const STUB_BODY_PATTERNS: &[&str] = &[
    "C3",
    "CC C3",
    "33 C0 C3",
    "90 33 C0 C3",
    "B8 00 00 00 00 C3",
    "B8 01 00 00 00 C3",
    "55 48 89 E5 5D C3",
    "48 83 EC ?? 48 83 C4 ?? C3",
];

/// Exactly 11 characters, all in `A..Z`.
pub fn is_obfuscated_name(name: &str) -> bool {
    name.len() == 11 && name.bytes().all(|b| b.is_ascii_uppercase())
}

fn is_generic_class_name(name: &str) -> bool {
    name.contains('`')
}

fn is_lifecycle_method(name: &str) -> bool {
    matches!(name, ".ctor" | ".cctor" | "Finalize")
}

/// Whether `bytes` starts with one of the known stub bodies.
pub fn is_stub_body(bytes: &[u8]) -> bool {
    STUB_BODY_PATTERNS
        .iter()
        .filter_map(|p| Pattern::parse(p).ok())
        .any(|p| p.matches_at(bytes))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FakeReason {
    SharedMethodPointer,
    NullMethodPointer,
}

impl fmt::Display for FakeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FakeReason::SharedMethodPointer => write!(f, "SharedMethodPointer"),
            FakeReason::NullMethodPointer => write!(f, "NullMethodPointer"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FakeMethod {
    pub method: MethodHandle,
    pub class: ClassHandle,
    pub class_name: String,
    pub method_name: String,
    /// `Ret Class::Name(PType pname, ...)`
    pub signature: String,
    pub pointer: usize,
    pub reason: FakeReason,
    pub shared_count: usize,
}

#[derive(Debug, Clone)]
pub struct ClassAnalysis {
    pub class: ClassHandle,
    pub full_name: String,
    pub total_methods: usize,
    pub fake_methods: usize,
    pub real_methods: usize,
    pub is_entirely_fake: bool,
}

#[derive(Debug, Clone)]
pub struct StubPointer {
    pub address: usize,
    pub rva: usize,
    pub shared_by: usize,
    /// First bytes of the body, empty when unreadable
    pub bytes: Vec<u8>,
    pub matches_stub_body: bool,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DetectorStats {
    pub total_methods: usize,
    pub whitelisted_methods: usize,
    pub generic_skipped: usize,
    pub fake_methods: usize,
    pub fake_classes: usize,
    pub stub_pointers: usize,
    pub vtable_methods: usize,
}

pub struct Detector {
    config: DetectorConfig,
    module_base: usize,
    pointer_map: HashMap<usize, Vec<MethodHandle>>,
    stub_pointers: Vec<StubPointer>,
    vtable_methods: HashSet<MethodHandle>,
    fakes: Vec<FakeMethod>,
    fake_set: HashSet<MethodHandle>,
    fake_classes: HashSet<ClassHandle>,
    analysis: Vec<ClassAnalysis>,
    stats: DetectorStats,
}

impl Detector {
    pub fn new(config: DetectorConfig) -> Self {
        Detector {
            config,
            module_base: 0,
            pointer_map: HashMap::new(),
            stub_pointers: Vec::new(),
            vtable_methods: HashSet::new(),
            fakes: Vec::new(),
            fake_set: HashSet::new(),
            fake_classes: HashSet::new(),
            analysis: Vec::new(),
            stats: DetectorStats::default(),
        }
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Run the three phases over every class the source exposes.
    pub fn analyze<S: MetadataSource + ?Sized>(&mut self, source: &S) {
        let images: Vec<(String, Vec<ClassHandle>)> = source
            .assemblies()
            .into_iter()
            .filter_map(|a| source.assembly_image(a))
            .map(|img| (source.image_name(img), source.image_classes(img)))
            .collect();

        self.module_base = source.module_base();
        self.collect_pointers(source, &images);
        self.build_vtable_whitelist(source, &images);
        self.classify(source, &images);

        self.stats.fake_methods = self.fakes.len();
        self.stats.fake_classes = self.fake_classes.len();
        self.stats.stub_pointers = self.stub_pointers.len();
        self.stats.vtable_methods = self.vtable_methods.len();
        info!(
            "Obfuscation analysis: {} methods, {} fake, {} fake classes, {} stub pointers",
            self.stats.total_methods,
            self.stats.fake_methods,
            self.stats.fake_classes,
            self.stats.stub_pointers
        );
    }

    fn collect_pointers<S: MetadataSource + ?Sized>(&mut self, source: &S, images: &[(String, Vec<ClassHandle>)]) {
        self.pointer_map.clear();
        self.stats = DetectorStats::default();

        for (image_name, classes) in images {
            let whitelisted = self.config.is_whitelisted_image(image_name);
            for &class in classes {
                let generic = is_generic_class_name(&source.class_name(class));
                for method in source.class_methods(class) {
                    self.stats.total_methods += 1;
                    if whitelisted {
                        self.stats.whitelisted_methods += 1;
                        continue;
                    }
                    if generic {
                        self.stats.generic_skipped += 1;
                        continue;
                    }
                    self.pointer_map
                        .entry(source.method_pointer(method))
                        .or_default()
                        .push(method);
                }
            }
        }

        let mut stubs: Vec<StubPointer> = self
            .pointer_map
            .iter()
            .filter(|(&ptr, methods)| ptr != 0 && methods.len() >= self.config.pointer_sharing_threshold)
            .map(|(&ptr, methods)| {
                let bytes = source
                    .code_bytes(ptr, self.config.max_stub_body_size)
                    .unwrap_or_default();
                let matches_stub_body = self.config.check_stub_patterns && is_stub_body(&bytes);
                StubPointer {
                    address: ptr,
                    rva: ptr.saturating_sub(self.module_base),
                    shared_by: methods.len(),
                    bytes,
                    matches_stub_body,
                }
            })
            .collect();
        stubs.sort_by(|a, b| b.shared_by.cmp(&a.shared_by).then(a.address.cmp(&b.address)));
        for stub in &stubs {
            debug!(
                "Stub pointer 0x{:X} shared by {} methods{}",
                stub.address,
                stub.shared_by,
                if stub.matches_stub_body { " [STUB]" } else { "" }
            );
        }
        self.stub_pointers = stubs;
    }

    fn build_vtable_whitelist<S: MetadataSource + ?Sized>(&mut self, source: &S, images: &[(String, Vec<ClassHandle>)]) {
        self.vtable_methods.clear();
        if !self.config.whitelist_vtable_methods {
            return;
        }
        for (_, classes) in images {
            for &class in classes {
                for method in source.class_methods(class) {
                    let flags = source.method_flags(method);
                    if flags & (method_attrs::VIRTUAL | method_attrs::ABSTRACT) != 0 {
                        self.vtable_methods.insert(method);
                    }
                }
            }
        }
    }

    fn classify<S: MetadataSource + ?Sized>(&mut self, source: &S, images: &[(String, Vec<ClassHandle>)]) {
        self.fakes.clear();
        self.fake_set.clear();
        self.fake_classes.clear();
        self.analysis.clear();

        let stub_counts: HashMap<usize, usize> = self
            .stub_pointers
            .iter()
            .map(|s| (s.address, s.shared_by))
            .collect();

        for (image_name, classes) in images {
            if self.config.is_whitelisted_image(image_name) {
                continue;
            }
            for &class in classes {
                let name = source.class_name(class);
                if name.is_empty() {
                    continue;
                }
                let full_name = source.class_full_name(class);
                let generic = is_generic_class_name(&name);

                let mut result = ClassAnalysis {
                    class,
                    full_name: full_name.clone(),
                    total_methods: 0,
                    fake_methods: 0,
                    real_methods: 0,
                    is_entirely_fake: false,
                };
                let mut real_non_special = 0;

                for method in source.class_methods(class) {
                    result.total_methods += 1;
                    let method_name = source.method_name(method);
                    let pointer = source.method_pointer(method);

                    let reason = if self.vtable_methods.contains(&method)
                        || is_lifecycle_method(&method_name)
                        || generic
                    {
                        None
                    } else if pointer == 0 {
                        is_obfuscated_name(&method_name).then_some(FakeReason::NullMethodPointer)
                    } else if stub_counts.contains_key(&pointer) {
                        is_obfuscated_name(&method_name).then_some(FakeReason::SharedMethodPointer)
                    } else {
                        None
                    };

                    match reason {
                        Some(reason) => {
                            result.fake_methods += 1;
                            self.fake_set.insert(method);
                            self.fakes.push(FakeMethod {
                                method,
                                class,
                                class_name: full_name.clone(),
                                signature: method_signature(source, method, &full_name),
                                method_name,
                                pointer,
                                reason,
                                shared_count: stub_counts.get(&pointer).copied().unwrap_or(0),
                            });
                        }
                        None => {
                            result.real_methods += 1;
                            if !is_lifecycle_method(&method_name) {
                                real_non_special += 1;
                            }
                        }
                    }
                }

                result.is_entirely_fake = (result.total_methods > 0 && real_non_special == 0 && result.fake_methods > 0)
                    || (result.fake_methods >= 5 && result.fake_methods * 100 / result.total_methods >= 90);
                if result.is_entirely_fake {
                    self.fake_classes.insert(class);
                }
                if result.fake_methods > 0 {
                    self.analysis.push(result);
                }
            }
        }
    }

    pub fn is_fake_method(&self, method: MethodHandle) -> bool {
        self.fake_set.contains(&method)
    }

    pub fn is_entirely_fake_class(&self, class: ClassHandle) -> bool {
        self.fake_classes.contains(&class)
    }

    pub fn fake_methods(&self) -> &[FakeMethod] {
        &self.fakes
    }

    /// Classes with at least one fake method.
    pub fn class_analysis(&self) -> &[ClassAnalysis] {
        &self.analysis
    }

    /// Stub pointers, most shared first.
    pub fn stub_pointers(&self) -> &[StubPointer] {
        &self.stub_pointers
    }

    pub fn stats(&self) -> DetectorStats {
        self.stats
    }

    /// Fake methods grouped by class name, in name order.
    pub fn fakes_by_class(&self) -> BTreeMap<&str, Vec<&FakeMethod>> {
        let mut grouped: BTreeMap<&str, Vec<&FakeMethod>> = BTreeMap::new();
        for fake in &self.fakes {
            grouped.entry(fake.class_name.as_str()).or_default().push(fake);
        }
        grouped
    }
}

fn short_type_name<S: MetadataSource + ?Sized>(source: &S, ty: TypeHandle) -> String {
    if let Some(keyword) = source.type_code(ty).csharp_keyword() {
        return keyword.to_string();
    }
    match source.type_class(ty) {
        Some(class) => source.class_name(class),
        None => "?".to_string(),
    }
}

/// `Ret Class::Name(PType pname, ...)`
pub fn method_signature<S: MetadataSource + ?Sized>(source: &S, method: MethodHandle, class_name: &str) -> String {
    let ret = match source.method_return_type(method) {
        Some(ty) => short_type_name(source, ty),
        None => "void".to_string(),
    };
    let params: Vec<String> = (0..source.method_param_count(method))
        .map(|i| {
            let ty = source
                .method_param_type(method, i)
                .map(|t| short_type_name(source, t))
                .unwrap_or_else(|| "?".to_string());
            let name = source.method_param_name(method, i);
            if name.is_empty() {
                ty
            } else {
                format!("{} {}", ty, name)
            }
        })
        .collect();
    format!("{} {}::{}({})", ret, class_name, source.method_name(method), params.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::fixture::Universe;
    use crate::common::TypeCode;

    #[test]
    fn test_obfuscated_name_shape() {
        assert!(is_obfuscated_name("AJLPLCGICMF"));
        assert!(is_obfuscated_name("FPGHODFCFKC"));
        assert!(!is_obfuscated_name("AJLPLCGICM"));
        assert!(!is_obfuscated_name("AJLPLCGICMFX"));
        assert!(!is_obfuscated_name("AjLPLCGICMF"));
        assert!(!is_obfuscated_name("AJLPL_GICMF"));
        assert!(!is_obfuscated_name("AJLPL1GICMF"));
        assert!(!is_obfuscated_name("LegitUpdate"));
        assert!(!is_obfuscated_name(""));
        assert!(!is_obfuscated_name("ÄJLPLCGICM"));
    }

    #[test]
    fn test_stub_bodies() {
        assert!(is_stub_body(&[0xC3, 0xCC]));
        assert!(is_stub_body(&[0x33, 0xC0, 0xC3]));
        assert!(is_stub_body(&[0x48, 0x83, 0xEC, 0x28, 0x48, 0x83, 0xC4, 0x28, 0xC3]));
        assert!(!is_stub_body(&[0x48, 0x89, 0x5C, 0x24, 0x08]));
        assert!(!is_stub_body(&[]));
    }

    /// One game class with the five methods of the shared-pointer scenario,
    /// plus filler methods that bring the stub pointer to 50 users.
    fn shared_pointer_universe() -> (Universe, ClassHandle, Vec<MethodHandle>) {
        let mut u = Universe::new();
        let asm = u.add_assembly("Assembly-CSharp.dll");
        let class = u.add_public_class(asm, "Game", "Enemy");
        let stub = u.base() + 0x5000;
        u.write_code(stub, &[0x33, 0xC0, 0xC3, 0xCC]);

        let real_virtual = u.add_method(class, "OnHit", method_attrs::PUBLIC | method_attrs::VIRTUAL, None, &[], stub);
        let ctor = u.add_method(class, ".ctor", method_attrs::PUBLIC, None, &[], stub);
        let int = u.prim(TypeCode::I4);
        let decoy = u.add_method(class, "AJLPLCGICMF", method_attrs::PUBLIC, Some(int), &[("a", int)], stub);
        let legit = u.add_method(class, "LegitUpdate", method_attrs::PUBLIC, None, &[], stub);

        let generic = u.add_public_class(asm, "Game", "Pool`1");
        let generic_method = u.add_method(generic, "Rent", method_attrs::PUBLIC, None, &[], stub);

        let filler = u.add_public_class(asm, "Game", "Filler");
        for i in 0..46 {
            u.add_method(filler, &format!("Helper{}", i), method_attrs::PUBLIC, None, &[], stub);
        }
        (u, class, vec![real_virtual, generic_method, ctor, decoy, legit])
    }

    #[test]
    fn test_shared_pointer_decoy() {
        let (u, class, methods) = shared_pointer_universe();
        let mut detector = Detector::new(DetectorConfig::default());
        detector.analyze(&u);

        let fakes = detector.fake_methods();
        assert_eq!(fakes.len(), 1);
        assert_eq!(fakes[0].method, methods[3]);
        assert_eq!(fakes[0].reason, FakeReason::SharedMethodPointer);
        assert_eq!(fakes[0].shared_count, 50);
        assert_eq!(fakes[0].signature, "int Game.Enemy::AJLPLCGICMF(int a)");
        for m in [methods[0], methods[1], methods[2], methods[4]] {
            assert!(!detector.is_fake_method(m));
        }
        assert!(!detector.is_entirely_fake_class(class));

        let stubs = detector.stub_pointers();
        assert_eq!(stubs.len(), 1);
        assert_eq!(stubs[0].rva, 0x5000);
        assert!(stubs[0].matches_stub_body);

        let stats = detector.stats();
        assert_eq!(stats.total_methods, 51);
        assert_eq!(stats.generic_skipped, 1);
        assert_eq!(stats.fake_methods, 1);
    }

    #[test]
    fn test_framework_code_never_flagged() {
        let mut u = Universe::new();
        let stub = u.base() + 0x7000;
        for image in ["UnityEngine.CoreModule.dll", "System.Core.dll", "mscorlib.dll", "Unity.Mathematics.dll"] {
            let asm = u.add_assembly(image);
            let class = u.add_public_class(asm, "UnityEngine", "Thing");
            for i in 0..30 {
                let name = format!("ABCDEFGHIJ{}", (b'A' + i as u8) as char);
                u.add_method(class, &name, method_attrs::PUBLIC, None, &[], if i % 2 == 0 { stub } else { 0 });
            }
        }
        let mut detector = Detector::new(DetectorConfig::default());
        detector.analyze(&u);
        assert!(detector.fake_methods().is_empty());
        assert!(detector.class_analysis().is_empty());
        assert_eq!(detector.stats().whitelisted_methods, detector.stats().total_methods);
    }

    #[test]
    fn test_null_pointer_rules() {
        let mut u = Universe::new();
        let asm = u.add_assembly("Assembly-CSharp.dll");
        let class = u.add_public_class(asm, "", "ByteBuffer");
        let generic_def = u.add_method(class, "ToArray", method_attrs::PUBLIC, None, &[], 0);
        let decoy = u.add_method(class, "KLFGNILMCJN", method_attrs::PUBLIC, None, &[], 0);
        let real = u.add_public_method(class, "Write", None);

        let mut detector = Detector::new(DetectorConfig::default());
        detector.analyze(&u);
        assert!(!detector.is_fake_method(generic_def));
        assert!(!detector.is_fake_method(real));
        assert!(detector.is_fake_method(decoy));
        assert_eq!(detector.fake_methods()[0].reason, FakeReason::NullMethodPointer);
        let analysis = &detector.class_analysis()[0];
        assert_eq!(analysis.full_name, "ByteBuffer");
        assert_eq!((analysis.fake_methods, analysis.real_methods), (1, 2));
    }

    #[test]
    fn test_entirely_fake_classes() {
        let mut u = Universe::new();
        let asm = u.add_assembly("Assembly-CSharp.dll");
        let only_decoys = u.add_public_class(asm, "", "FPGHODFCFKC");
        u.add_method(only_decoys, ".ctor", method_attrs::PUBLIC, None, &[], u.base() + 0x100);
        u.add_method(only_decoys, "AAAAAAAAAAA", method_attrs::PUBLIC, None, &[], 0);
        u.add_method(only_decoys, "BBBBBBBBBBB", method_attrs::PUBLIC, None, &[], 0);

        let mostly_decoys = u.add_public_class(asm, "", "Mixed");
        for i in 0..10u8 {
            let name = format!("CCCCCCCCCC{}", (b'A' + i) as char);
            u.add_method(mostly_decoys, &name, method_attrs::PUBLIC, None, &[], 0);
        }
        u.add_public_method(mostly_decoys, "Real", None);

        let partial = u.add_public_class(asm, "", "Partial");
        u.add_method(partial, "DDDDDDDDDDD", method_attrs::PUBLIC, None, &[], 0);
        u.add_public_method(partial, "Real", None);

        let empty = u.add_public_class(asm, "", "Empty");

        let mut detector = Detector::new(DetectorConfig::default());
        detector.analyze(&u);
        assert!(detector.is_entirely_fake_class(only_decoys));
        assert!(detector.is_entirely_fake_class(mostly_decoys));
        assert!(!detector.is_entirely_fake_class(partial));
        assert!(!detector.is_entirely_fake_class(empty));
        assert_eq!(detector.stats().fake_classes, 2);
        assert_eq!(detector.fakes_by_class().len(), 3);
    }

    #[test]
    fn test_vtable_whitelist_can_be_disabled() {
        let mut u = Universe::new();
        let asm = u.add_assembly("Assembly-CSharp.dll");
        let class = u.add_public_class(asm, "", "Thing");
        let m = u.add_method(class, "QQQQQQQQQQQ", method_attrs::PUBLIC | method_attrs::VIRTUAL, None, &[], 0);
        u.add_public_method(class, "Keep", None);

        let mut on = Detector::new(DetectorConfig::default());
        on.analyze(&u);
        assert!(!on.is_fake_method(m));

        let mut off = Detector::new(DetectorConfig {
            whitelist_vtable_methods: false,
            ..DetectorConfig::default()
        });
        off.analyze(&u);
        assert!(off.is_fake_method(m));
    }
}
