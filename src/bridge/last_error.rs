//! Per-thread last error reported to managed callers

use crate::error::{Error, ErrorCode};
use std::cell::RefCell;
use std::ffi::CString;
use std::os::raw::c_char;

struct LastError {
    code: ErrorCode,
    message: CString,
}

thread_local! {
    static LAST_ERROR: RefCell<LastError> = RefCell::new(LastError {
        code: ErrorCode::Success,
        message: CString::default(),
    });
}

pub fn clear() {
    LAST_ERROR.with(|e| {
        let mut e = e.borrow_mut();
        if e.code != ErrorCode::Success || !e.message.as_bytes().is_empty() {
            e.code = ErrorCode::Success;
            e.message = CString::default();
        }
    });
}

pub fn set(code: ErrorCode, message: &str) {
    // interior NULs would cut the message short on the managed side
    let message = CString::new(message.replace('\0', " ")).unwrap_or_default();
    LAST_ERROR.with(|e| *e.borrow_mut() = LastError { code, message });
}

pub fn set_error(err: &Error) {
    set(err.code(), &err.to_string());
}

pub fn code() -> ErrorCode {
    LAST_ERROR.with(|e| e.borrow().code)
}

pub fn message() -> String {
    LAST_ERROR.with(|e| e.borrow().message.to_string_lossy().into_owned())
}

/// The message as a C string, valid until the next bridge call on this thread.
pub fn message_ptr() -> *const c_char {
    LAST_ERROR.with(|e| e.borrow().message.as_ptr())
}
