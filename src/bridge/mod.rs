//! Flat C ABI consumed by the managed mod host
//!
//! Every export clears the calling thread's last error, runs its body under
//! [`std::panic::catch_unwind`], and on failure records the error and returns
//! a sentinel: null, `-1`, `false`, or the error code for status returns.

pub mod hooks;
pub mod last_error;
pub mod lifecycle;
pub mod overlay;
pub mod reflection;
pub mod unity;
pub mod values;

use crate::error::{Error, ErrorCode, Result};
use std::any::Any;
use std::ffi::{c_void, CStr};
use std::os::raw::c_char;
use std::panic::{self, AssertUnwindSafe};
use tracing::error;

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn run<T>(body: impl FnOnce() -> Result<T>) -> Option<T> {
    last_error::clear();
    match panic::catch_unwind(AssertUnwindSafe(body)) {
        Ok(Ok(value)) => Some(value),
        Ok(Err(e)) => {
            last_error::set_error(&e);
            None
        }
        Err(payload) => {
            let msg = panic_message(&*payload);
            error!("Panic inside bridge call: {}", msg);
            last_error::set(ErrorCode::ExceptionThrown, &format!("panic: {}", msg));
            None
        }
    }
}

/// Run `body`, returning `sentinel` on failure.
pub(crate) fn guard<T>(sentinel: T, body: impl FnOnce() -> Result<T>) -> T {
    run(body).unwrap_or(sentinel)
}

/// Run `body`, returning 0 on success or the recorded error code.
pub(crate) fn status(body: impl FnOnce() -> Result<()>) -> i32 {
    match run(body) {
        Some(()) => 0,
        None => last_error::code().as_i32(),
    }
}

/// Run `body`, returning its handle or the negated error code.
pub(crate) fn handle_or_code(body: impl FnOnce() -> Result<i64>) -> i64 {
    match run(body) {
        Some(handle) => handle,
        None => -(last_error::code().as_i32() as i64),
    }
}

pub(crate) fn non_null<T>(ptr: *mut T, what: &'static str) -> Result<*mut T> {
    if ptr.is_null() {
        Err(Error::NullPointer(what))
    } else {
        Ok(ptr)
    }
}

/// Borrow a NUL-terminated UTF-8 argument.
///
/// # Safety
/// `ptr` must be null or point at a NUL-terminated string that outlives the call.
pub(crate) unsafe fn c_arg<'a>(ptr: *const c_char, what: &'static str) -> Result<&'a str> {
    if ptr.is_null() {
        return Err(Error::NullPointer(what));
    }
    CStr::from_ptr(ptr)
        .to_str()
        .map_err(|_| Error::InvalidArgument(format!("{} is not valid UTF-8", what)))
}

/// Copy `text` into a caller buffer of `size` bytes, always NUL-terminated.
/// Returns the bytes written without the terminator; a truncated copy
/// records [`ErrorCode::BufferTooSmall`].
///
/// # Safety
/// `buffer` must be valid for `size` bytes.
pub(crate) unsafe fn write_c_buffer(text: &str, buffer: *mut c_char, size: i32) -> Result<i32> {
    let buffer = non_null(buffer, "buffer")?;
    if size <= 0 {
        return Err(Error::InvalidArgument(format!("buffer size {}", size)));
    }
    let capacity = size as usize - 1;
    let mut len = text.len().min(capacity);
    while !text.is_char_boundary(len) {
        len -= 1;
    }
    std::ptr::copy_nonoverlapping(text.as_ptr(), buffer as *mut u8, len);
    *buffer.add(len) = 0;
    if len < text.len() {
        last_error::set(
            ErrorCode::BufferTooSmall,
            &Error::BufferTooSmall {
                needed: text.len() + 1,
                available: size as usize,
            }
            .to_string(),
        );
    }
    Ok(len as i32)
}

pub(crate) fn opaque<T>(ptr: *const T) -> *mut c_void {
    ptr as *mut c_void
}
