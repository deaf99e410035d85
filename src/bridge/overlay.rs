//! Overlay exports

use super::{c_arg, guard};
use crate::error::Error;
use crate::overlay::{self, callbacks};
use std::os::raw::c_char;

pub type MdbDrawCallback = Option<unsafe extern "C" fn()>;

/// Hook Present. The UI comes up on the next presented frame.
#[no_mangle]
pub extern "C" fn mdb_imgui_init() -> bool {
    guard(false, || overlay::init().map(|()| true))
}

#[no_mangle]
pub extern "C" fn mdb_imgui_shutdown() {
    guard((), || {
        overlay::shutdown();
        Ok(())
    })
}

#[no_mangle]
pub extern "C" fn mdb_imgui_is_initialized() -> bool {
    guard(false, || Ok(overlay::is_initialized()))
}

/// 0 unknown, 11 or 12.
#[no_mangle]
pub extern "C" fn mdb_imgui_get_dx_version() -> i32 {
    guard(0, || Ok(overlay::dx_version() as i32))
}

/// Set the single legacy callback slot. Null clears it.
#[no_mangle]
pub extern "C" fn mdb_imgui_register_draw_callback(callback: MdbDrawCallback) {
    guard((), || {
        callbacks::registry().set_legacy(callback);
        Ok(())
    })
}

/// Register a draw callback. Returns its id, or 0 when `callback` is null.
#[no_mangle]
pub unsafe extern "C" fn mdb_imgui_add_callback(name: *const c_char, callback: MdbDrawCallback, priority: i32) -> i32 {
    guard(0, || {
        let callback = callback.ok_or(Error::NullPointer("callback"))?;
        let name = if name.is_null() { "" } else { c_arg(name, "name")? };
        Ok(callbacks::registry().add(name, callback, priority))
    })
}

#[no_mangle]
pub extern "C" fn mdb_imgui_remove_callback(id: i32) -> bool {
    guard(false, || Ok(callbacks::registry().remove(id)))
}

#[no_mangle]
pub extern "C" fn mdb_imgui_set_callback_enabled(id: i32, enabled: bool) -> bool {
    guard(false, || Ok(callbacks::registry().set_enabled(id, enabled)))
}

/// Registered callbacks, including the legacy slot.
#[no_mangle]
pub extern "C" fn mdb_imgui_get_callback_count() -> i32 {
    guard(0, || Ok(callbacks::registry().count() as i32))
}

#[no_mangle]
pub extern "C" fn mdb_imgui_set_input_enabled(enabled: bool) {
    guard((), || {
        overlay::set_input_enabled(enabled);
        Ok(())
    })
}

#[no_mangle]
pub extern "C" fn mdb_imgui_is_input_enabled() -> bool {
    guard(false, || Ok(overlay::input_enabled()))
}

#[no_mangle]
pub extern "C" fn mdb_imgui_set_toggle_key(vk_code: i32) {
    guard((), || {
        overlay::set_toggle_key(vk_code);
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::last_error;
    use crate::error::ErrorCode;
    use std::ffi::CString;

    unsafe extern "C" fn draw() {}

    #[test]
    fn test_add_callback_rejects_null() {
        let name = CString::new("explorer").unwrap();
        assert_eq!(unsafe { mdb_imgui_add_callback(name.as_ptr(), None, 0) }, 0);
        assert_eq!(last_error::code(), ErrorCode::NullPointer);
    }

    #[test]
    fn test_callback_lifecycle_through_exports() {
        let name = CString::new("explorer").unwrap();
        let id = unsafe { mdb_imgui_add_callback(name.as_ptr(), Some(draw), 10) };
        assert!(id > 0);
        assert!(mdb_imgui_set_callback_enabled(id, false));
        assert!(mdb_imgui_remove_callback(id));
        assert!(!mdb_imgui_remove_callback(id));
        assert!(!mdb_imgui_set_callback_enabled(id, true));

        let anonymous = unsafe { mdb_imgui_add_callback(std::ptr::null(), Some(draw), 0) };
        assert!(anonymous > id);
        assert!(mdb_imgui_remove_callback(anonymous));
    }

    #[test]
    fn test_shutdown_clears_stale_error() {
        last_error::set(ErrorCode::NotInitialized, "left over");
        mdb_imgui_shutdown();
        assert_eq!(last_error::code(), ErrorCode::Success);
        assert!(!mdb_imgui_is_initialized());

        last_error::set(ErrorCode::NotInitialized, "left over");
        assert!(mdb_imgui_get_callback_count() >= 0);
        assert_eq!(last_error::code(), ErrorCode::Success);
    }

    #[test]
    fn test_toggle_key_is_settable() {
        let previous = overlay::toggle_key();
        mdb_imgui_set_toggle_key(0x2D);
        assert_eq!(overlay::toggle_key(), 0x2D);
        mdb_imgui_set_toggle_key(previous);
    }
}
