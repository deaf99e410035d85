//! Access to the loaded runtime module
//!
//! The resolver works against [`ModuleImage`] so the same fallback chain runs
//! over the mapped `GameAssembly.dll` and over synthetic images in tests.

use crate::error::{Error, Result};
use std::time::Duration;
use tracing::{info, warn};

pub trait ModuleImage {
    /// Load address of the module
    fn base(&self) -> usize;

    /// Mapped size of the module in bytes
    fn size(&self) -> usize;

    /// Address of `name` through the operating system's symbol resolver
    fn proc_address(&self, name: &str) -> Option<usize>;

    /// Every named export as `(name, absolute address)`
    fn exports(&self) -> Vec<(String, usize)>;

    /// Absolute start address and contents of the executable code section
    fn text_section(&self) -> Option<(usize, &[u8])>;

    /// `len` bytes at `addr`, `None` if the range lies outside the image
    fn read(&self, addr: usize, len: usize) -> Option<&[u8]>;

    fn read_u64(&self, addr: usize) -> Option<u64> {
        let bytes = self.read(addr, 8)?;
        Some(u64::from_le_bytes(bytes.try_into().ok()?))
    }
}

#[cfg(target_os = "windows")]
pub use self::windows_impl::LoadedModule;

#[cfg(target_os = "windows")]
mod windows_impl {
    use super::ModuleImage;
    use pelite::pe64::exports::Export;
    use pelite::pe64::{Pe, PeView};
    use std::ffi::CString;
    use widestring::U16CString;
    use winapi::shared::minwindef::HMODULE;
    use winapi::um::libloaderapi::{GetModuleHandleW, GetProcAddress};

    /// A module mapped into the current process.
    pub struct LoadedModule {
        handle: HMODULE,
        view: PeView<'static>,
    }

    // The module stays mapped for the process lifetime.
    unsafe impl Send for LoadedModule {}
    unsafe impl Sync for LoadedModule {}

    impl std::fmt::Debug for LoadedModule {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("LoadedModule")
                .field("base", &format_args!("0x{:X}", self.handle as usize))
                .finish()
        }
    }

    impl LoadedModule {
        /// Look up an already loaded module by file name.
        pub fn find(name: &str) -> Option<LoadedModule> {
            let wide = U16CString::from_str(name).ok()?;
            let handle = unsafe { GetModuleHandleW(wide.as_ptr()) };
            if handle.is_null() {
                return None;
            }
            let view = unsafe { PeView::module(handle as *const u8) };
            Some(LoadedModule { handle, view })
        }

        fn image(&self) -> &'static [u8] {
            self.view.image()
        }
    }

    impl ModuleImage for LoadedModule {
        fn base(&self) -> usize {
            self.handle as usize
        }

        fn size(&self) -> usize {
            self.image().len()
        }

        fn proc_address(&self, name: &str) -> Option<usize> {
            let cname = CString::new(name).ok()?;
            let addr = unsafe { GetProcAddress(self.handle, cname.as_ptr()) };
            (!addr.is_null()).then_some(addr as usize)
        }

        fn exports(&self) -> Vec<(String, usize)> {
            let base = self.base();
            let by = match self.view.exports().and_then(|e| e.by()) {
                Ok(by) => by,
                Err(_) => return Vec::new(),
            };
            by.iter_names()
                .filter_map(|(name, export)| {
                    let name = name.ok()?.to_str().ok()?.to_string();
                    match export.ok()? {
                        Export::Symbol(rva) => Some((name, base + *rva as usize)),
                        Export::Forward(_) => None,
                    }
                })
                .collect()
        }

        fn text_section(&self) -> Option<(usize, &[u8])> {
            let section = self.view.section_headers().by_name(".text")?;
            let range = section.virtual_range();
            let bytes = self.image().get(range.start as usize..range.end as usize)?;
            Some((self.base() + range.start as usize, bytes))
        }

        fn read(&self, addr: usize, len: usize) -> Option<&[u8]> {
            let start = addr.checked_sub(self.base())?;
            self.image().get(start..start.checked_add(len)?)
        }
    }
}

/// Stand-in on platforms where the runtime library is never present.
#[cfg(not(target_os = "windows"))]
#[derive(Debug)]
pub enum NoModule {}

#[cfg(not(target_os = "windows"))]
impl ModuleImage for NoModule {
    fn base(&self) -> usize {
        match *self {}
    }

    fn size(&self) -> usize {
        match *self {}
    }

    fn proc_address(&self, _name: &str) -> Option<usize> {
        match *self {}
    }

    fn exports(&self) -> Vec<(String, usize)> {
        match *self {}
    }

    fn text_section(&self) -> Option<(usize, &[u8])> {
        match *self {}
    }

    fn read(&self, _addr: usize, _len: usize) -> Option<&[u8]> {
        match *self {}
    }
}

/// Poll for the runtime library until it is loaded or `timeout` elapses.
#[cfg(target_os = "windows")]
pub fn wait_for_runtime_module(timeout: Duration) -> Result<LoadedModule> {
    wait_for(timeout, || LoadedModule::find(super::offsets::IL2CPP_LIBRARY))
}

/// Poll `probe` every 100 ms.
pub fn wait_for<T>(timeout: Duration, mut probe: impl FnMut() -> Option<T>) -> Result<T> {
    let interval = Duration::from_millis(100);
    let attempts = (timeout.as_millis() / interval.as_millis()).max(1);
    for attempt in 0..attempts {
        if let Some(found) = probe() {
            if attempt > 0 {
                info!("Runtime module appeared after {} ms", attempt * interval.as_millis());
            }
            return Ok(found);
        }
        std::thread::sleep(interval);
    }
    warn!("Runtime module did not load within {:?}", timeout);
    Err(Error::GameAssemblyNotFound)
}
