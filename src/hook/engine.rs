//! Hook registry and the front doors used by the bridge

use super::inline::InlinePatcher;
use super::{Detour, DetourBackend};
use crate::backend::{MetadataExt, MetadataSource, MethodHandle};
use crate::common::attributes::method_attrs;
use crate::error::{Error, Result};
use crate::il2cpp::runtime;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, OnceLock};
use tracing::{debug, info};

static DEBUG: AtomicBool = AtomicBool::new(false);

pub fn set_debug(enabled: bool) {
    DEBUG.store(enabled, Ordering::Relaxed);
    info!("Hook debugging {}", if enabled { "enabled" } else { "disabled" });
}

pub fn debug_enabled() -> bool {
    DEBUG.load(Ordering::Relaxed)
}

/// Snapshot of one installed hook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookInfo {
    pub handle: i64,
    pub target: usize,
    pub detour: usize,
    pub trampoline: usize,
    pub enabled: bool,
    pub description: String,
}

struct HookRecord {
    info: HookInfo,
    patch: Box<dyn Detour>,
}

pub struct HookRegistry<B: DetourBackend> {
    backend: B,
    next_handle: i64,
    hooks: BTreeMap<i64, HookRecord>,
}

impl<B: DetourBackend> HookRegistry<B> {
    pub fn new(backend: B) -> Self {
        HookRegistry {
            backend,
            next_handle: 1,
            hooks: BTreeMap::new(),
        }
    }

    /// Patch `target` to jump to `detour` and enable it. Returns the handle
    /// and the trampoline that runs the original code.
    pub fn install(&mut self, target: usize, detour: usize, description: &str) -> Result<(i64, usize)> {
        if target == 0 {
            return Err(Error::NullPointer("hook target"));
        }
        if detour == 0 {
            return Err(Error::NullPointer("hook detour"));
        }
        if self.hooks.values().any(|r| r.info.target == target) {
            return Err(Error::HookInstallFailed(format!("0x{:X} is already hooked", target)));
        }

        let mut patch = self.backend.create(target, detour)?;
        patch.enable()?;

        let handle = self.next_handle;
        self.next_handle += 1;
        let info = HookInfo {
            handle,
            target,
            detour,
            trampoline: patch.trampoline(),
            enabled: true,
            description: description.to_string(),
        };
        info!(
            "Hook {} installed on 0x{:X} -> 0x{:X} ({})",
            handle, target, detour, description
        );
        if debug_enabled() {
            debug!("Hook {} trampoline at 0x{:X}", handle, info.trampoline);
        }
        let trampoline = info.trampoline;
        self.hooks.insert(handle, HookRecord { info, patch });
        Ok((handle, trampoline))
    }

    /// Restore the original code and free the trampoline. A hook whose
    /// original bytes could not be restored stays registered.
    pub fn remove(&mut self, handle: i64) -> Result<()> {
        let record = self.hooks.get_mut(&handle).ok_or(Error::HookNotFound(handle))?;
        record.patch.disable()?;
        record.info.enabled = false;
        if let Some(record) = self.hooks.remove(&handle) {
            info!("Hook {} removed from 0x{:X}", handle, record.info.target);
        }
        Ok(())
    }

    pub fn set_enabled(&mut self, handle: i64, enabled: bool) -> Result<()> {
        let record = self.hooks.get_mut(&handle).ok_or(Error::HookNotFound(handle))?;
        if enabled {
            record.patch.enable()?;
        } else {
            record.patch.disable()?;
        }
        record.info.enabled = enabled;
        debug!("Hook {} {}", handle, if enabled { "enabled" } else { "disabled" });
        Ok(())
    }

    pub fn count(&self) -> usize {
        self.hooks.len()
    }

    /// The `index`-th hook in handle order.
    pub fn info_at(&self, index: usize) -> Option<HookInfo> {
        self.hooks.values().nth(index).map(|r| r.info.clone())
    }

    pub fn infos(&self) -> Vec<HookInfo> {
        self.hooks.values().map(|r| r.info.clone()).collect()
    }

    pub fn dump(&self) {
        info!("=== {} hooks installed ===", self.hooks.len());
        for r in self.hooks.values() {
            let i = &r.info;
            info!(
                "[{}] target=0x{:X} detour=0x{:X} trampoline=0x{:X} enabled={} {}",
                i.handle, i.target, i.detour, i.trampoline, i.enabled, i.description
            );
        }
    }

    /// Disable every hook, keeping the records.
    pub fn disable_all(&mut self) {
        for (handle, record) in self.hooks.iter_mut() {
            match record.patch.disable() {
                Ok(()) => record.info.enabled = false,
                Err(e) => tracing::warn!("Could not disable hook {}: {}", handle, e),
            }
        }
    }
}

static ENGINE: OnceLock<Mutex<HookRegistry<InlinePatcher>>> = OnceLock::new();

/// The process-wide registry, created on first use.
pub fn engine() -> MutexGuard<'static, HookRegistry<InlinePatcher>> {
    ENGINE
        .get_or_init(|| {
            info!("Hook engine initialized");
            Mutex::new(HookRegistry::new(InlinePatcher))
        })
        .lock()
        .unwrap_or_else(|e| e.into_inner())
}

pub fn hook_pointer(target: usize, detour: usize) -> Result<(i64, usize)> {
    engine().install(target, detour, &format!("ptr 0x{:X}", target))
}

pub fn hook_rva(rva: u64, detour: usize) -> Result<(i64, usize)> {
    let base = runtime()?.base();
    if base == 0 {
        return Err(Error::NotInitialized);
    }
    let target = base
        .checked_add(rva as usize)
        .ok_or_else(|| Error::InvalidArgument(format!("RVA 0x{:X} out of range", rva)))?;
    engine().install(target, detour, &format!("RVA 0x{:X}", rva))
}

pub fn hook_method(method: MethodHandle, detour: usize) -> Result<(i64, usize)> {
    let rt = runtime()?;
    let target = rt.method_pointer(method);
    if target == 0 {
        return Err(Error::MethodPointerNull);
    }
    let description = match rt.method_class(method) {
        Some(class) => format!("{}::{}", rt.class_full_name(class), rt.method_name(method)),
        None => rt.method_name(method),
    };
    engine().install(target, detour, &description)
}

/// Call shape a detour for `method` must have.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MethodShape {
    pub param_count: usize,
    pub is_static: bool,
    pub has_return: bool,
}

pub fn method_shape<S: MetadataSource + ?Sized>(source: &S, method: MethodHandle) -> MethodShape {
    MethodShape {
        param_count: source.method_param_count(method),
        is_static: source.method_flags(method) & method_attrs::STATIC != 0,
        has_return: !source.is_void_type(source.method_return_type(method)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::fixture::Universe;
    use crate::common::TypeCode;
    use std::sync::{Arc, Mutex as StdMutex};

    #[derive(Default)]
    struct Log {
        enabled: Vec<usize>,
        disabled: Vec<usize>,
        dropped: Vec<usize>,
        stuck: bool,
    }

    struct FakeDetour {
        target: usize,
        log: Arc<StdMutex<Log>>,
    }

    impl Detour for FakeDetour {
        fn trampoline(&self) -> usize {
            self.target + 0x1000
        }
        fn enable(&mut self) -> Result<()> {
            self.log.lock().unwrap().enabled.push(self.target);
            Ok(())
        }
        fn disable(&mut self) -> Result<()> {
            let mut log = self.log.lock().unwrap();
            if log.stuck {
                return Err(Error::HookInstallFailed("page is not writable".into()));
            }
            log.disabled.push(self.target);
            Ok(())
        }
    }

    impl Drop for FakeDetour {
        fn drop(&mut self) {
            self.log.lock().unwrap().dropped.push(self.target);
        }
    }

    #[derive(Default)]
    struct FakeBackend {
        log: Arc<StdMutex<Log>>,
    }

    impl DetourBackend for FakeBackend {
        fn create(&mut self, target: usize, _detour: usize) -> Result<Box<dyn Detour>> {
            if target == 0xBAD {
                return Err(Error::HookInstallFailed("unpatchable".into()));
            }
            Ok(Box::new(FakeDetour {
                target,
                log: self.log.clone(),
            }))
        }
    }

    #[test]
    fn test_handles_are_monotonic() {
        let mut reg = HookRegistry::new(FakeBackend::default());
        let (h1, t1) = reg.install(0x1000, 0x9000, "a").unwrap();
        let (h2, _) = reg.install(0x2000, 0x9000, "b").unwrap();
        assert_eq!((h1, h2), (1, 2));
        assert_eq!(t1, 0x2000);

        reg.remove(h1).unwrap();
        let (h3, _) = reg.install(0x1000, 0x9000, "a again").unwrap();
        assert_eq!(h3, 3);
        assert_eq!(reg.count(), 2);
        assert_eq!(reg.info_at(0).unwrap().handle, 2);
        assert_eq!(reg.info_at(1).unwrap().description, "a again");
        assert!(reg.info_at(2).is_none());
    }

    #[test]
    fn test_install_rejects_bad_input() {
        let mut reg = HookRegistry::new(FakeBackend::default());
        assert!(matches!(reg.install(0, 0x9000, ""), Err(Error::NullPointer(_))));
        assert!(matches!(reg.install(0x1000, 0, ""), Err(Error::NullPointer(_))));
        assert!(matches!(reg.install(0xBAD, 0x9000, ""), Err(Error::HookInstallFailed(_))));

        reg.install(0x1000, 0x9000, "").unwrap();
        let dup = reg.install(0x1000, 0x9100, "").unwrap_err();
        assert_eq!(dup.code(), crate::error::ErrorCode::HookInstallFailed);
        assert_eq!(reg.count(), 1);
    }

    #[test]
    fn test_enable_disable_and_unknown_handles() {
        let backend = FakeBackend::default();
        let log = backend.log.clone();
        let mut reg = HookRegistry::new(backend);
        let (h, _) = reg.install(0x1000, 0x9000, "").unwrap();

        reg.set_enabled(h, false).unwrap();
        assert!(!reg.info_at(0).unwrap().enabled);
        reg.set_enabled(h, true).unwrap();
        assert!(reg.info_at(0).unwrap().enabled);

        let err = reg.set_enabled(99, true).unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::InvalidArgument);
        assert!(matches!(reg.remove(99), Err(Error::HookNotFound(99))));

        reg.remove(h).unwrap();
        let log = log.lock().unwrap();
        assert_eq!(log.enabled, vec![0x1000, 0x1000]);
        assert_eq!(log.disabled, vec![0x1000, 0x1000]);
    }

    #[test]
    fn test_failed_removal_keeps_the_hook() {
        let backend = FakeBackend::default();
        let log = backend.log.clone();
        let mut reg = HookRegistry::new(backend);
        let (h, trampoline) = reg.install(0x1000, 0x9000, "stuck").unwrap();

        log.lock().unwrap().stuck = true;
        assert!(reg.remove(h).is_err());
        assert_eq!(reg.count(), 1);
        assert!(log.lock().unwrap().dropped.is_empty());
        let info = reg.info_at(0).unwrap();
        assert_eq!((info.handle, info.trampoline, info.enabled), (h, trampoline, true));

        log.lock().unwrap().stuck = false;
        reg.remove(h).unwrap();
        assert_eq!(reg.count(), 0);
        assert_eq!(log.lock().unwrap().dropped, vec![0x1000]);
    }

    #[test]
    fn test_method_shape() {
        let mut u = Universe::new();
        let asm = u.add_assembly("Assembly-CSharp.dll");
        let class = u.add_public_class(asm, "", "Player");
        let int = u.prim(TypeCode::I4);
        let float = u.prim(TypeCode::R4);
        let get = u.add_method(
            class,
            "GetScore",
            method_attrs::PUBLIC | method_attrs::STATIC,
            Some(int),
            &[("id", int)],
            u.base() + 0x100,
        );
        let set = u.add_method(
            class,
            "Move",
            method_attrs::PUBLIC,
            None,
            &[("x", float), ("y", float)],
            u.base() + 0x200,
        );

        assert_eq!(
            method_shape(&u, get),
            MethodShape {
                param_count: 1,
                is_static: true,
                has_return: true
            }
        );
        assert_eq!(
            method_shape(&u, set),
            MethodShape {
                param_count: 2,
                is_static: false,
                has_return: false
            }
        );
    }

    #[cfg(all(target_arch = "x86_64", any(windows, target_os = "linux")))]
    mod live {
        use super::super::*;
        use std::hint::black_box;
        use std::sync::atomic::{AtomicUsize, Ordering};

        static TRAMPOLINE: AtomicUsize = AtomicUsize::new(0);

        #[inline(never)]
        extern "C" fn add_one(x: i32) -> i32 {
            let y = black_box(x);
            black_box(y + 1)
        }

        extern "C" fn plus_ten(x: i32) -> i32 {
            let original: extern "C" fn(i32) -> i32 =
                unsafe { std::mem::transmute(TRAMPOLINE.load(Ordering::SeqCst)) };
            original(x) + 10
        }

        fn call(x: i32) -> i32 {
            let f = black_box(add_one as extern "C" fn(i32) -> i32);
            f(black_box(x))
        }

        #[test]
        fn test_detour_calls_through_trampoline() {
            assert_eq!(call(5), 6);
            let mut reg = HookRegistry::new(InlinePatcher);
            let (handle, trampoline) = reg
                .install(add_one as usize, plus_ten as usize, "add_one")
                .unwrap();
            TRAMPOLINE.store(trampoline, Ordering::SeqCst);
            assert_eq!(call(5), 16);

            reg.set_enabled(handle, false).unwrap();
            assert_eq!(call(5), 6);
            reg.set_enabled(handle, true).unwrap();
            assert_eq!(call(5), 16);

            reg.remove(handle).unwrap();
            assert_eq!(call(5), 6);
        }
    }
}
