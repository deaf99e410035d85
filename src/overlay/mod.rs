//! In-game UI overlay
//!
//! Direct3D 11 Present is detoured through the hook engine. Each frame runs
//! the registered draw callbacks between frame setup and present. A replaced
//! window procedure decides, per message, whether input reaches the game.

pub mod callbacks;
pub mod frame;
pub mod input;

#[cfg(all(windows, feature = "overlay"))]
mod d3d11;
#[cfg(all(windows, feature = "overlay"))]
mod renderer;

use crate::config::DEFAULT_TOGGLE_KEY;
use crate::error::{Error, Result};
use crate::hook::engine;
use input::{CaptureState, EventQueue};
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicI64, Ordering};
use std::time::Duration;
use tracing::{error, info, warn};

/// Slot of `IDXGISwapChain::Present` in the swap chain vtable.
pub const PRESENT_VTABLE_INDEX: usize = 8;

const DETECT_ATTEMPTS: u32 = 10;
const DETECT_INTERVAL: Duration = Duration::from_millis(100);

#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DxVersion {
    Unknown = 0,
    Dx11 = 11,
    Dx12 = 12,
}

impl DxVersion {
    fn from_i32(v: i32) -> Self {
        match v {
            11 => DxVersion::Dx11,
            12 => DxVersion::Dx12,
            _ => DxVersion::Unknown,
        }
    }
}

pub static CAPTURE: CaptureState = CaptureState::new(DEFAULT_TOGGLE_KEY);
pub static EVENTS: EventQueue = EventQueue::new();

static DX_VERSION: AtomicI32 = AtomicI32::new(DxVersion::Unknown as i32);
static PRESENT_HOOK: AtomicI64 = AtomicI64::new(0);
static ENABLED: AtomicBool = AtomicBool::new(true);

/// Graphics API in use, judged by which runtime is loaded. Games may load
/// both, so Direct3D 12 is checked first.
pub fn detect(loaded: impl Fn(&str) -> bool) -> DxVersion {
    if loaded("d3d12.dll") {
        DxVersion::Dx12
    } else if loaded("d3d11.dll") {
        DxVersion::Dx11
    } else {
        DxVersion::Unknown
    }
}

pub fn detect_with_retry(loaded: impl Fn(&str) -> bool, attempts: u32, interval: Duration) -> DxVersion {
    let mut version = detect(&loaded);
    if version != DxVersion::Unknown {
        return version;
    }
    warn!("Graphics API unknown, polling {} times", attempts);
    for poll in 1..=attempts {
        std::thread::sleep(interval);
        version = detect(&loaded);
        if version != DxVersion::Unknown {
            info!("Graphics API detected after {} polls: {:?}", poll, version);
            break;
        }
    }
    version
}

#[cfg(all(windows, feature = "overlay"))]
mod platform {
    pub use super::d3d11::{install, module_loaded, teardown};
}

#[cfg(not(all(windows, feature = "overlay")))]
mod platform {
    use crate::error::{Error, Result};

    pub fn module_loaded(_name: &str) -> bool {
        false
    }

    pub fn install() -> Result<i64> {
        Err(Error::InitFailed("overlay needs Direct3D 11 on Windows".to_string()))
    }

    pub fn teardown() {}
}

/// Detect the graphics API and hook Present. The UI itself comes up on the
/// first presented frame. Calling again after a successful install is a no-op.
pub fn init() -> Result<()> {
    if PRESENT_HOOK.load(Ordering::Acquire) != 0 {
        return Ok(());
    }
    if !is_enabled() {
        warn!("Overlay disabled in settings, Present is left alone");
        return Err(Error::InitFailed("overlay is disabled in settings".to_string()));
    }
    info!(
        "Module check: d3d11.dll={} d3d12.dll={} dxgi.dll={}",
        platform::module_loaded("d3d11.dll"),
        platform::module_loaded("d3d12.dll"),
        platform::module_loaded("dxgi.dll")
    );

    let version = detect_with_retry(platform::module_loaded, DETECT_ATTEMPTS, DETECT_INTERVAL);
    DX_VERSION.store(version as i32, Ordering::Release);
    match version {
        DxVersion::Dx11 => {
            let handle = platform::install()?;
            PRESENT_HOOK.store(handle, Ordering::Release);
            Ok(())
        }
        DxVersion::Dx12 => {
            error!("Direct3D 12 detected but not supported");
            Err(Error::InitFailed("Direct3D 12 is not supported".to_string()))
        }
        DxVersion::Unknown => {
            error!("No Direct3D runtime detected");
            Err(Error::InitFailed("no Direct3D runtime loaded".to_string()))
        }
    }
}

/// Clear callbacks, restore the window procedure and disable hooks.
pub fn shutdown() {
    if !is_initialized() && PRESENT_HOOK.load(Ordering::Acquire) == 0 {
        return;
    }
    CAPTURE.initialized.store(false, Ordering::Release);
    callbacks::registry().clear();
    platform::teardown();
    engine().disable_all();
    if PRESENT_HOOK.swap(0, Ordering::AcqRel) != 0 {
        info!("Overlay shut down");
    }
}

/// Allow or forbid [`init`]. Set from `overlay.enabled` at startup.
pub fn set_enabled(enabled: bool) {
    ENABLED.store(enabled, Ordering::Relaxed);
}

pub fn is_enabled() -> bool {
    ENABLED.load(Ordering::Relaxed)
}

pub fn is_initialized() -> bool {
    CAPTURE.initialized.load(Ordering::Acquire)
}

pub fn dx_version() -> DxVersion {
    DxVersion::from_i32(DX_VERSION.load(Ordering::Acquire))
}

pub fn set_input_enabled(enabled: bool) {
    CAPTURE.input_enabled.store(enabled, Ordering::Relaxed);
}

pub fn input_enabled() -> bool {
    CAPTURE.input_enabled.load(Ordering::Relaxed)
}

pub fn set_toggle_key(vk: i32) {
    CAPTURE.toggle_key.store(vk, Ordering::Relaxed);
}

pub fn toggle_key() -> i32 {
    CAPTURE.toggle_key.load(Ordering::Relaxed)
}
