//! The live IL2CPP runtime
//!
//! [`Il2CppRuntime`] wraps the bound export table and implements
//! [`MetadataSource`] over it. [`RuntimeCell`] owns the one-time binding pass
//! and its state machine; [`runtime`] is the process-wide instance.

use super::exports::*;
use super::module::ModuleImage;
use super::resolver::ExportResolver;
use super::structs;
use crate::backend::*;
use crate::common::TypeCode;
use crate::error::{Error, Result};
use std::cell::Cell;
use std::collections::HashMap;
use std::ffi::{c_void, CString};
use std::path::Path;
use std::ptr;
use std::sync::{Mutex, OnceLock, TryLockError};
use tracing::{error, info, warn};

/// Upper bound used when a method is looked up without a parameter count.
pub const MAX_SEARCH_PARAMS: i32 = 16;

thread_local! {
    static ATTACHED_THREAD: Cell<usize> = const { Cell::new(0) };
}

/// Fetch a bound entry point or fail with the canonical name.
pub fn require<T: Copy>(entry: Option<T>, name: &str) -> Result<T> {
    entry.ok_or_else(|| Error::ExportNotFound(name.to_string()))
}

fn cstring(s: &str) -> Result<CString> {
    CString::new(s).map_err(|_| Error::InvalidArgument(format!("interior NUL in '{}'", s)))
}

pub struct Il2CppRuntime {
    exports: ExportTable,
    base: usize,
    size: usize,
    images: Mutex<HashMap<String, usize>>,
}

impl std::fmt::Debug for Il2CppRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Il2CppRuntime")
            .field("base", &format_args!("0x{:X}", self.base))
            .field("size", &self.size)
            .finish()
    }
}

impl Il2CppRuntime {
    pub fn new(exports: ExportTable, base: usize, size: usize) -> Self {
        Il2CppRuntime {
            exports,
            base,
            size,
            images: Mutex::new(HashMap::new()),
        }
    }

    pub fn exports(&self) -> &ExportTable {
        &self.exports
    }

    pub fn base(&self) -> usize {
        self.base
    }

    pub fn domain(&self) -> Result<*mut c_void> {
        let domain_get = require(self.exports.domain_get, "il2cpp_domain_get")?;
        let domain = unsafe { domain_get() };
        if domain.is_null() {
            return Err(Error::NotInitialized);
        }
        Ok(domain)
    }

    /// Attach the calling thread to the domain once and return its thread
    /// object.
    pub fn attach_current_thread(&self) -> Result<*mut c_void> {
        let attached = ATTACHED_THREAD.with(|a| a.get());
        if attached != 0 {
            return Ok(attached as *mut c_void);
        }
        let attach = require(self.exports.thread_attach, "il2cpp_thread_attach")?;
        let domain = self.domain()?;
        let thread = unsafe { attach(domain) };
        if thread.is_null() {
            return Err(Error::ThreadNotAttached);
        }
        ATTACHED_THREAD.with(|a| a.set(thread as usize));
        Ok(thread)
    }

    pub fn is_thread_attached() -> bool {
        ATTACHED_THREAD.with(|a| a.get() != 0)
    }

    pub fn raw_assemblies(&self) -> Vec<*const c_void> {
        let (Some(get_assemblies), Ok(domain)) = (self.exports.domain_get_assemblies, self.domain())
        else {
            return Vec::new();
        };
        let mut count = 0usize;
        let list = unsafe { get_assemblies(domain, &mut count) };
        if list.is_null() {
            return Vec::new();
        }
        (0..count).map(|i| unsafe { *list.add(i) }).filter(|a| !a.is_null()).collect()
    }

    /// Image of the assembly called `name` (with or without `.dll`).
    pub fn find_image(&self, name: &str) -> Result<*const c_void> {
        let key = name.trim_end_matches(".dll").to_string();
        let mut cache = self.images.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(&image) = cache.get(&key) {
            return Ok(image as *const c_void);
        }
        let get_image = require(self.exports.assembly_get_image, "il2cpp_assembly_get_image")?;
        for assembly in self.raw_assemblies() {
            let image = unsafe { get_image(assembly) };
            if image.is_null() {
                continue;
            }
            let image_name = self.image_name(ImageHandle(image as usize));
            if image_name.trim_end_matches(".dll") == key {
                cache.insert(key, image as usize);
                return Ok(image);
            }
        }
        Err(Error::AssemblyNotFound(name.to_string()))
    }

    pub fn find_class(&self, assembly: &str, namespace: &str, name: &str) -> Result<*mut c_void> {
        let image = self.find_image(assembly)?;
        self.class_in_image(image, namespace, name)
            .ok_or_else(|| Error::ClassNotFound(format!("{}.{} in {}", namespace, name, assembly)))
    }

    /// Search every loaded image, first match wins.
    pub fn find_class_anywhere(&self, namespace: &str, name: &str) -> Result<*mut c_void> {
        let get_image = require(self.exports.assembly_get_image, "il2cpp_assembly_get_image")?;
        for assembly in self.raw_assemblies() {
            let image = unsafe { get_image(assembly) };
            if image.is_null() {
                continue;
            }
            if let Some(class) = self.class_in_image(image, namespace, name) {
                return Ok(class);
            }
        }
        Err(Error::ClassNotFound(format!("{}.{}", namespace, name)))
    }

    fn class_in_image(&self, image: *const c_void, namespace: &str, name: &str) -> Option<*mut c_void> {
        let from_name = self.exports.class_from_name?;
        let ns = cstring(namespace).ok()?;
        let n = cstring(name).ok()?;
        let class = unsafe { from_name(image, ns.as_ptr(), n.as_ptr()) };
        (!class.is_null()).then_some(class)
    }

    /// Method by name. `param_count == -1` tries every count from 0 to 16.
    pub fn find_method(&self, class: *const c_void, name: &str, param_count: i32) -> Result<*const c_void> {
        let lookup = require(
            self.exports.class_get_method_from_name,
            "il2cpp_class_get_method_from_name",
        )?;
        let cname = cstring(name)?;
        let counts: Vec<i32> = if param_count < 0 {
            (0..=MAX_SEARCH_PARAMS).collect()
        } else {
            vec![param_count]
        };
        counts
            .into_iter()
            .map(|argc| unsafe { lookup(class, cname.as_ptr(), argc) })
            .find(|m| !m.is_null())
            .ok_or_else(|| Error::MethodNotFound(name.to_string()))
    }

    pub fn find_field(&self, class: *const c_void, name: &str) -> Result<*mut c_void> {
        let lookup = require(self.exports.class_get_field_from_name, "il2cpp_class_get_field_from_name")?;
        let cname = cstring(name)?;
        let field = unsafe { lookup(class, cname.as_ptr()) };
        if field.is_null() {
            return Err(Error::FieldNotFound(name.to_string()));
        }
        Ok(field)
    }

    /// Invoke through `il2cpp_runtime_invoke`. A thrown managed exception is
    /// stored in `exception` and reported as [`Error::ExceptionThrown`].
    pub fn invoke(
        &self,
        method: *const c_void,
        instance: *mut c_void,
        args: *mut *mut c_void,
        exception: &mut *mut c_void,
    ) -> Result<*mut c_void> {
        let runtime_invoke = require(self.exports.runtime_invoke, "il2cpp_runtime_invoke")?;
        self.attach_current_thread()?;
        *exception = ptr::null_mut();
        let result = unsafe { runtime_invoke(method, instance, args, exception) };
        if !exception.is_null() {
            return Err(Error::ExceptionThrown);
        }
        Ok(result)
    }

    /// Invoke a method found by name on `class` and fail on exceptions.
    pub fn invoke_by_name(
        &self,
        class: *const c_void,
        name: &str,
        param_count: i32,
        instance: *mut c_void,
        args: &mut [*mut c_void],
    ) -> Result<*mut c_void> {
        let method = self.find_method(class, name, param_count)?;
        let mut exception = ptr::null_mut();
        let argv = if args.is_empty() { ptr::null_mut() } else { args.as_mut_ptr() };
        self.invoke(method, instance, argv, &mut exception)
    }

    pub fn object_new(&self, class: *const c_void) -> Result<*mut c_void> {
        let new = require(self.exports.object_new, "il2cpp_object_new")?;
        self.attach_current_thread()?;
        let obj = unsafe { new(class) };
        if obj.is_null() {
            return Err(Error::AllocationFailed("il2cpp_object_new returned null".to_string()));
        }
        Ok(obj)
    }

    pub fn string_new(&self, text: &str) -> Result<*mut c_void> {
        let new = require(self.exports.string_new, "il2cpp_string_new")?;
        let ctext = cstring(text)?;
        let s = unsafe { new(ctext.as_ptr()) };
        if s.is_null() {
            return Err(Error::AllocationFailed("il2cpp_string_new returned null".to_string()));
        }
        Ok(s)
    }

    pub fn object_class(&self, obj: *mut c_void) -> Option<ClassHandle> {
        let get = self.exports.object_get_class?;
        ClassHandle::from_ptr(unsafe { get(obj) })
    }

    pub fn class_element_class(&self, class: ClassHandle) -> Option<ClassHandle> {
        let get = self.exports.class_get_element_class?;
        ClassHandle::from_ptr(unsafe { get(class.as_ptr()) })
    }

    pub fn class_instance_size(&self, class: ClassHandle) -> Option<i32> {
        let get = self.exports.class_instance_size?;
        Some(unsafe { get(class.as_ptr()) })
    }

    pub fn type_object(&self, ty: TypeHandle) -> Option<*mut c_void> {
        let get = self.exports.type_get_object?;
        let obj = unsafe { get(ty.as_ptr()) };
        (!obj.is_null()).then_some(obj)
    }

    /// Drain an `il2cpp_class_get_*(class, &iter)` style iterator.
    fn iterate(&self, class: ClassHandle, next: impl Fn(*const c_void, *mut *mut c_void) -> usize) -> Vec<usize> {
        let mut iter: *mut c_void = ptr::null_mut();
        let mut out = Vec::new();
        loop {
            let item = next(class.as_ptr(), &mut iter);
            if item == 0 {
                break;
            }
            out.push(item);
        }
        out
    }
}

impl MetadataSource for Il2CppRuntime {
    fn assemblies(&self) -> Vec<AssemblyHandle> {
        self.raw_assemblies().into_iter().map(|a| AssemblyHandle(a as usize)).collect()
    }

    fn assembly_image(&self, assembly: AssemblyHandle) -> Option<ImageHandle> {
        let get = self.exports.assembly_get_image?;
        ImageHandle::from_ptr(unsafe { get(assembly.as_ptr()) })
    }

    fn image_name(&self, image: ImageHandle) -> String {
        match self.exports.image_get_name {
            Some(get) => unsafe { structs::c_str(get(image.as_ptr())) },
            None => String::new(),
        }
    }

    fn image_classes(&self, image: ImageHandle) -> Vec<ClassHandle> {
        let (Some(count), Some(get)) = (self.exports.image_get_class_count, self.exports.image_get_class)
        else {
            return Vec::new();
        };
        let n = unsafe { count(image.as_ptr()) };
        (0..n)
            .filter_map(|i| ClassHandle::from_ptr(unsafe { get(image.as_ptr(), i) }))
            .collect()
    }

    fn class_name(&self, class: ClassHandle) -> String {
        match self.exports.class_get_name {
            Some(get) => unsafe { structs::c_str(get(class.as_ptr())) },
            None => String::new(),
        }
    }

    fn class_namespace(&self, class: ClassHandle) -> String {
        match self.exports.class_get_namespace {
            Some(get) => unsafe { structs::c_str(get(class.as_ptr())) },
            None => String::new(),
        }
    }

    fn class_flags(&self, class: ClassHandle) -> u32 {
        self.exports
            .class_get_flags
            .map(|get| unsafe { get(class.as_ptr()) } as u32)
            .unwrap_or(0)
    }

    fn class_is_valuetype(&self, class: ClassHandle) -> bool {
        self.exports
            .class_is_valuetype
            .map(|get| unsafe { get(class.as_ptr()) })
            .unwrap_or(false)
    }

    fn class_value_size(&self, class: ClassHandle) -> Option<usize> {
        let size = usize::try_from(self.class_instance_size(class)?).ok()?;
        size.checked_sub(super::offsets::OFFSETS.object_header as usize)
            .filter(|payload| *payload > 0)
    }

    fn class_is_enum(&self, class: ClassHandle) -> bool {
        self.exports
            .class_is_enum
            .map(|get| unsafe { get(class.as_ptr()) })
            .unwrap_or(false)
    }

    fn class_declaring_type(&self, class: ClassHandle) -> Option<ClassHandle> {
        let get = self.exports.class_get_declaring_type?;
        ClassHandle::from_ptr(unsafe { get(class.as_ptr()) })
    }

    fn class_parent(&self, class: ClassHandle) -> Option<ClassHandle> {
        let get = self.exports.class_get_parent?;
        ClassHandle::from_ptr(unsafe { get(class.as_ptr()) })
    }

    fn class_type(&self, class: ClassHandle) -> Option<TypeHandle> {
        let get = self.exports.class_get_type?;
        TypeHandle::from_ptr(unsafe { get(class.as_ptr()) })
    }

    fn class_fields(&self, class: ClassHandle) -> Vec<FieldHandle> {
        let Some(next) = self.exports.class_get_fields else {
            return Vec::new();
        };
        self.iterate(class, |c, it| unsafe { next(c, it) } as usize)
            .into_iter()
            .map(FieldHandle)
            .collect()
    }

    fn class_methods(&self, class: ClassHandle) -> Vec<MethodHandle> {
        let Some(next) = self.exports.class_get_methods else {
            return Vec::new();
        };
        self.iterate(class, |c, it| unsafe { next(c, it) } as usize)
            .into_iter()
            .map(MethodHandle)
            .collect()
    }

    fn class_properties(&self, class: ClassHandle) -> Vec<PropertyHandle> {
        let Some(next) = self.exports.class_get_properties else {
            return Vec::new();
        };
        self.iterate(class, |c, it| unsafe { next(c, it) } as usize)
            .into_iter()
            .map(PropertyHandle)
            .collect()
    }

    fn field_name(&self, field: FieldHandle) -> String {
        match self.exports.field_get_name {
            Some(get) => unsafe { structs::c_str(get(field.as_ptr())) },
            None => String::new(),
        }
    }

    fn field_type(&self, field: FieldHandle) -> Option<TypeHandle> {
        let get = self.exports.field_get_type?;
        TypeHandle::from_ptr(unsafe { get(field.as_ptr()) })
    }

    fn field_flags(&self, field: FieldHandle) -> u32 {
        self.exports
            .field_get_flags
            .map(|get| unsafe { get(field.as_ptr()) } as u32)
            .unwrap_or(0)
    }

    fn field_offset(&self, field: FieldHandle) -> i32 {
        match self.exports.field_get_offset {
            Some(get) => unsafe { get(field.as_ptr()) as i32 },
            None => unsafe {
                ptr::read_unaligned(
                    (field.0 + super::offsets::OFFSETS.field_offset as usize) as *const i32,
                )
            },
        }
    }

    fn field_literal_bits(&self, field: FieldHandle) -> Option<u64> {
        let get = self.exports.field_static_get_value?;
        let mut bits = 0u64;
        unsafe { get(field.as_ptr(), &mut bits as *mut u64 as *mut c_void) };
        Some(bits)
    }

    fn property_name(&self, property: PropertyHandle) -> String {
        match self.exports.property_get_name {
            Some(get) => unsafe { structs::c_str(get(property.as_ptr())) },
            None => String::new(),
        }
    }

    fn property_getter(&self, property: PropertyHandle) -> Option<MethodHandle> {
        let get = self.exports.property_get_get_method?;
        MethodHandle::from_ptr(unsafe { get(property.as_ptr()) })
    }

    fn property_setter(&self, property: PropertyHandle) -> Option<MethodHandle> {
        let get = self.exports.property_get_set_method?;
        MethodHandle::from_ptr(unsafe { get(property.as_ptr()) })
    }

    fn method_name(&self, method: MethodHandle) -> String {
        match self.exports.method_get_name {
            Some(get) => unsafe { structs::c_str(get(method.as_ptr())) },
            None => String::new(),
        }
    }

    fn method_flags(&self, method: MethodHandle) -> u32 {
        let mut iflags = 0u32;
        self.exports
            .method_get_flags
            .map(|get| unsafe { get(method.as_ptr(), &mut iflags) })
            .unwrap_or(0)
    }

    fn method_is_generic(&self, method: MethodHandle) -> bool {
        self.exports
            .method_is_generic
            .map(|get| unsafe { get(method.as_ptr()) })
            .unwrap_or(false)
    }

    fn method_pointer(&self, method: MethodHandle) -> usize {
        unsafe { structs::method_pointer(method.as_ptr()) }
    }

    fn method_class(&self, method: MethodHandle) -> Option<ClassHandle> {
        let get = self.exports.method_get_class?;
        ClassHandle::from_ptr(unsafe { get(method.as_ptr()) })
    }

    fn method_return_type(&self, method: MethodHandle) -> Option<TypeHandle> {
        let get = self.exports.method_get_return_type?;
        TypeHandle::from_ptr(unsafe { get(method.as_ptr()) })
    }

    fn method_param_count(&self, method: MethodHandle) -> usize {
        self.exports
            .method_get_param_count
            .map(|get| unsafe { get(method.as_ptr()) } as usize)
            .unwrap_or(0)
    }

    fn method_param_type(&self, method: MethodHandle, index: usize) -> Option<TypeHandle> {
        let get = self.exports.method_get_param?;
        TypeHandle::from_ptr(unsafe { get(method.as_ptr(), index as u32) })
    }

    fn method_param_name(&self, method: MethodHandle, index: usize) -> String {
        match self.exports.method_get_param_name {
            Some(get) => unsafe { structs::c_str(get(method.as_ptr(), index as u32)) },
            None => String::new(),
        }
    }

    fn type_code(&self, ty: TypeHandle) -> TypeCode {
        unsafe { structs::type_bits(ty.as_ptr()).code }
    }

    fn type_is_byref(&self, ty: TypeHandle) -> bool {
        match self.exports.type_is_byref {
            Some(get) => unsafe { get(ty.as_ptr()) },
            None => unsafe { structs::type_bits(ty.as_ptr()).byref },
        }
    }

    fn type_attrs(&self, ty: TypeHandle) -> u32 {
        unsafe { structs::type_bits(ty.as_ptr()).attrs as u32 }
    }

    fn type_class(&self, ty: TypeHandle) -> Option<ClassHandle> {
        let get = self.exports.class_from_type?;
        ClassHandle::from_ptr(unsafe { get(ty.as_ptr()) })
    }

    fn type_element(&self, ty: TypeHandle) -> Option<TypeHandle> {
        match self.type_code(ty) {
            TypeCode::SZARRAY | TypeCode::PTR => {
                TypeHandle::from_ptr(unsafe { structs::type_data(ty.as_ptr()) })
            }
            _ => None,
        }
    }

    fn type_generic_args(&self, ty: TypeHandle) -> Vec<TypeHandle> {
        if self.type_code(ty) != TypeCode::GENERICINST {
            return Vec::new();
        }
        unsafe { structs::generic_args(ty.as_ptr()) }
            .into_iter()
            .filter_map(TypeHandle::from_ptr)
            .collect()
    }

    fn type_generic_param_index(&self, ty: TypeHandle) -> Option<u16> {
        match self.type_code(ty) {
            TypeCode::VAR | TypeCode::MVAR => unsafe { structs::generic_param_num(ty.as_ptr()) },
            _ => None,
        }
    }

    fn module_base(&self) -> usize {
        self.base
    }

    fn code_bytes(&self, addr: usize, len: usize) -> Option<Vec<u8>> {
        let end = self.base.checked_add(self.size)?;
        if addr < self.base || addr.checked_add(len)? > end {
            return None;
        }
        Some(unsafe { std::slice::from_raw_parts(addr as *const u8, len) }.to_vec())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolverState {
    Uninitialised,
    Scanning,
    Ready,
    FatalMissingRequired,
}

/// One-time binding of the export table with a sticky outcome.
pub struct RuntimeCell {
    ready: OnceLock<Il2CppRuntime>,
    state: Mutex<(ResolverState, Vec<String>)>,
}

impl Default for RuntimeCell {
    fn default() -> Self {
        Self::new()
    }
}

impl RuntimeCell {
    pub const fn new() -> Self {
        RuntimeCell {
            ready: OnceLock::new(),
            state: Mutex::new((ResolverState::Uninitialised, Vec::new())),
        }
    }

    pub fn state(&self) -> ResolverState {
        if self.ready.get().is_some() {
            return ResolverState::Ready;
        }
        match self.state.try_lock() {
            Ok(guard) => guard.0,
            Err(TryLockError::WouldBlock) => ResolverState::Scanning,
            Err(TryLockError::Poisoned(p)) => p.into_inner().0,
        }
    }

    pub fn get(&self) -> Option<&Il2CppRuntime> {
        self.ready.get()
    }

    /// Bind on first use. A missing module leaves the cell uninitialised so a
    /// later call can retry; a missing required export is final.
    pub fn get_or_init<M, F>(&self, locate: F, log_path: Option<&Path>) -> Result<&Il2CppRuntime>
    where
        M: ModuleImage,
        F: FnOnce() -> Result<M>,
    {
        if let Some(rt) = self.ready.get() {
            return Ok(rt);
        }
        let mut guard = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(rt) = self.ready.get() {
            return Ok(rt);
        }
        if guard.0 == ResolverState::FatalMissingRequired {
            return Err(Error::MissingRequiredExports(guard.1.clone()));
        }

        guard.0 = ResolverState::Scanning;
        let module = match locate() {
            Ok(m) => m,
            Err(e) => {
                guard.0 = ResolverState::Uninitialised;
                return Err(e);
            }
        };
        info!("Binding IL2CPP exports, module base 0x{:X}", module.base());

        let resolver = ExportResolver::new(module);
        let (table, missing) = ExportTable::bind(|name| resolver.resolve(name).ok());
        if let Some(path) = log_path {
            resolver.persist_log(path);
        }

        let unresolved_optional = BEST_EFFORT_EXPORTS
            .iter()
            .filter(|n| resolver.resolve(n).is_err())
            .count();
        if unresolved_optional > 0 {
            warn!("{} best-effort exports unresolved", unresolved_optional);
        }

        if !missing.is_empty() {
            error!("Missing required exports: {}", missing.join(", "));
            *guard = (ResolverState::FatalMissingRequired, missing.clone());
            return Err(Error::MissingRequiredExports(missing));
        }

        let module = resolver.module();
        let rt = self
            .ready
            .get_or_init(|| Il2CppRuntime::new(table, module.base(), module.size()));
        guard.0 = ResolverState::Ready;
        info!("IL2CPP exports bound");
        Ok(rt)
    }
}

static RUNTIME: RuntimeCell = RuntimeCell::new();

/// The process-wide runtime, binding exports on first use.
pub fn runtime() -> Result<&'static Il2CppRuntime> {
    if let Some(rt) = RUNTIME.get() {
        return Ok(rt);
    }
    let log_path = crate::config::MdbPaths::from_current_exe()
        .ok()
        .map(|p| p.resolution_log());
    RUNTIME.get_or_init(locate_runtime_module, log_path.as_deref())
}

pub fn runtime_state() -> ResolverState {
    RUNTIME.state()
}

#[cfg(target_os = "windows")]
fn locate_runtime_module() -> Result<super::module::LoadedModule> {
    super::module::LoadedModule::find(super::offsets::IL2CPP_LIBRARY).ok_or(Error::GameAssemblyNotFound)
}

#[cfg(not(target_os = "windows"))]
fn locate_runtime_module() -> Result<super::module::NoModule> {
    Err(Error::GameAssemblyNotFound)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::il2cpp::module::memory::{obfuscated_image, MemoryImage};

    #[test]
    fn test_missing_required_export_is_fatal_and_sticky() {
        let cell = RuntimeCell::new();
        assert_eq!(cell.state(), ResolverState::Uninitialised);

        let err = cell.get_or_init(|| Ok(obfuscated_image(false)), None).unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::ExportNotFound);
        assert!(err.to_string().contains("il2cpp_image_get_class_count"));
        assert_eq!(cell.state(), ResolverState::FatalMissingRequired);

        // a later call does not rescan, even with a complete module
        let again = cell.get_or_init(|| Ok(obfuscated_image(true)), None).unwrap_err();
        assert!(again.to_string().contains("il2cpp_image_get_class_count"));
    }

    #[test]
    fn test_complete_module_becomes_ready() {
        let cell = RuntimeCell::new();
        let tmp = tempfile::tempdir().unwrap();
        let log = tmp.path().join("resolved_exports.txt");
        let rt = cell.get_or_init(|| Ok(obfuscated_image(true)), Some(&log)).unwrap();
        assert!(rt.exports().domain_get_assemblies.is_some());
        assert!(rt.exports().assembly_get_image.is_some());
        assert_eq!(cell.state(), ResolverState::Ready);

        let text = std::fs::read_to_string(&log).unwrap();
        assert!(text.contains("il2cpp_domain_get_assemblies -> xY_wasting_your_time"));
        assert!(text.contains("[SuffixMatch]"));
        assert!(text.contains("il2cpp_assembly_get_image -> il2cpp_assembly_get_image"));
        assert!(text.contains("[SignatureScan]"));

        let base = rt.base();
        let second = cell.get_or_init(|| -> Result<MemoryImage> { panic!("must not rescan") }, None).unwrap();
        assert_eq!(second.base(), base);
    }

    #[test]
    fn test_missing_module_can_retry() {
        let cell = RuntimeCell::new();
        let err = cell
            .get_or_init(|| -> Result<MemoryImage> { Err(Error::GameAssemblyNotFound) }, None)
            .unwrap_err();
        assert!(matches!(err, Error::GameAssemblyNotFound));
        assert_eq!(cell.state(), ResolverState::Uninitialised);
        assert!(cell.get_or_init(|| Ok(obfuscated_image(true)), None).is_ok());
    }

    #[test]
    fn test_code_bytes_bounds() {
        let buf = vec![0xC3u8; 64];
        let rt = Il2CppRuntime::new(ExportTable::default(), buf.as_ptr() as usize, buf.len());
        assert_eq!(rt.code_bytes(buf.as_ptr() as usize, 4), Some(vec![0xC3; 4]));
        assert_eq!(rt.code_bytes(buf.as_ptr() as usize + 62, 4), None);
        assert_eq!(rt.code_bytes(0x10, 4), None);
    }

    #[test]
    fn test_unbound_exports_fail_softly() {
        let rt = Il2CppRuntime::new(ExportTable::default(), 0, 0);
        assert!(matches!(rt.domain(), Err(Error::ExportNotFound(_))));
        assert!(rt.assemblies().is_empty());
        assert!(matches!(rt.find_image("Assembly-CSharp"), Err(Error::ExportNotFound(_))));
    }
}
