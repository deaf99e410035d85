//! Startup when the bridge is injected into the game process
//!
//! `DllMain` must not block under the loader lock, so it only spawns the
//! background initialiser. Hosting the managed runtime stays with the
//! external loader; this side binds the runtime and keeps the SDK current.

use crate::codegen::{prepare_sdk, SdkAction};
use crate::config::{MdbPaths, Settings};
use crate::error::Result;
use crate::il2cpp::runtime;
use crate::{logging, overlay};
use std::time::Duration;
use tracing::{error, info};

/// Create the on-disk layout and load settings.
pub fn prepare_environment(paths: &MdbPaths) -> Result<Settings> {
    paths.ensure_layout()?;
    Ok(Settings::load_or_default(&paths.config_file()))
}

/// Bind the runtime, attach this thread and bring the SDK up to date.
pub fn bootstrap(paths: &MdbPaths, settings: &Settings) -> Result<SdkAction> {
    let rt = runtime()?;
    rt.attach_current_thread()?;
    info!("Runtime bound at 0x{:X}", rt.base());
    let action = prepare_sdk(rt, paths, settings)?;
    info!("SDK ready ({:?})", action);
    Ok(action)
}

fn initialize() -> Result<()> {
    let paths = MdbPaths::from_current_exe()?;
    let settings = prepare_environment(&paths)?;
    logging::init(&paths, &settings.log_level)?;
    overlay::set_toggle_key(settings.overlay.toggle_key);
    overlay::set_enabled(settings.overlay.enabled);
    info!("mdb_bridge {} starting in {}", env!("CARGO_PKG_VERSION"), paths.game_dir.display());
    wait_for_runtime(Duration::from_secs(settings.init_timeout_secs))?;
    bootstrap(&paths, &settings).map(drop)
}

#[cfg(target_os = "windows")]
fn wait_for_runtime(timeout: Duration) -> Result<()> {
    crate::il2cpp::module::wait_for_runtime_module(timeout).map(drop)
}

#[cfg(not(target_os = "windows"))]
fn wait_for_runtime(_timeout: Duration) -> Result<()> {
    Err(crate::error::Error::GameAssemblyNotFound)
}

/// Background initialiser entry point.
pub fn spawn_initializer() {
    let spawned = std::thread::Builder::new()
        .name("mdb-init".to_string())
        .spawn(|| {
            if let Err(e) = initialize() {
                error!("Initialisation failed: {}", e);
            }
        });
    if let Err(e) = spawned {
        error!("Could not start the initialiser thread: {}", e);
    }
}

#[cfg(target_os = "windows")]
mod entry {
    use std::ffi::c_void;
    use windows::Win32::Foundation::{BOOL, HMODULE, TRUE};
    use windows::Win32::System::LibraryLoader::DisableThreadLibraryCalls;
    use windows::Win32::System::SystemServices::DLL_PROCESS_ATTACH;

    #[no_mangle]
    #[allow(non_snake_case)]
    pub extern "system" fn DllMain(module: HMODULE, reason: u32, _reserved: *mut c_void) -> BOOL {
        if reason == DLL_PROCESS_ATTACH {
            let _ = unsafe { DisableThreadLibraryCalls(module) };
            super::spawn_initializer();
        }
        TRUE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn test_environment_is_created_and_settings_loaded() {
        let tmp = tempfile::tempdir().unwrap();
        let paths = MdbPaths::new(tmp.path());
        std::fs::create_dir_all(&paths.mdb_dir).unwrap();
        std::fs::write(paths.config_file(), r#"{ "overlay": { "toggle_key": 112 }, "init_timeout_secs": 5 }"#).unwrap();

        let settings = prepare_environment(&paths).unwrap();
        assert_eq!(settings.init_timeout_secs, 5);
        assert_eq!(settings.overlay.toggle_key, 112);
        assert!(settings.overlay.enabled);
        assert!(paths.generated_dir.is_dir());
        assert!(paths.logs_dir.is_dir());
    }

    #[cfg(not(target_os = "windows"))]
    #[test]
    fn test_bootstrap_without_runtime_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let paths = MdbPaths::new(tmp.path());
        let err = bootstrap(&paths, &Settings::default()).unwrap_err();
        assert!(matches!(err, Error::GameAssemblyNotFound));
        assert!(matches!(wait_for_runtime(Duration::ZERO), Err(Error::GameAssemblyNotFound)));
    }
}
