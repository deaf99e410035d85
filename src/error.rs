//! Error types shared by every layer of the bridge
//!
//! Internal code propagates [`Error`] with `?`. Only the C ABI surface
//! flattens it into an [`ErrorCode`] plus a message on the calling thread.

use thiserror::Error;

/// Numeric error codes reported across the C boundary.
///
/// Ranges: 0 success, 1-99 initialisation, 100-199 argument validation,
/// 200-299 resolution, 300-399 invocation, 400-499 memory.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    Success = 0,

    NotInitialized = 1,
    InitFailed = 2,
    GameAssemblyNotFound = 3,
    ExportNotFound = 4,

    InvalidArgument = 100,
    NullPointer = 101,
    InvalidClass = 102,
    InvalidMethod = 103,
    InvalidField = 104,

    ClassNotFound = 200,
    MethodNotFound = 201,
    FieldNotFound = 202,
    AssemblyNotFound = 203,

    InvocationFailed = 300,
    ExceptionThrown = 301,
    ThreadNotAttached = 302,
    HookInstallFailed = 303,
    /// Reserved. Unknown hook handles report `InvalidArgument`.
    HookNotFound = 304,
    MethodPointerNull = 305,

    AllocationFailed = 400,
    BufferTooSmall = 401,
}

impl ErrorCode {
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Reverse lookup used when a negated code comes back from a hook call.
    pub fn from_raw(value: i32) -> Option<ErrorCode> {
        use ErrorCode::*;
        let code = match value {
            0 => Success,
            1 => NotInitialized,
            2 => InitFailed,
            3 => GameAssemblyNotFound,
            4 => ExportNotFound,
            100 => InvalidArgument,
            101 => NullPointer,
            102 => InvalidClass,
            103 => InvalidMethod,
            104 => InvalidField,
            200 => ClassNotFound,
            201 => MethodNotFound,
            202 => FieldNotFound,
            203 => AssemblyNotFound,
            300 => InvocationFailed,
            301 => ExceptionThrown,
            302 => ThreadNotAttached,
            303 => HookInstallFailed,
            304 => HookNotFound,
            305 => MethodPointerNull,
            400 => AllocationFailed,
            401 => BufferTooSmall,
            _ => return None,
        };
        Some(code)
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?} ({})", self, self.as_i32())
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("IL2CPP runtime not initialized")]
    NotInitialized,

    #[error("initialization failed: {0}")]
    InitFailed(String),

    #[error("GameAssembly module not found")]
    GameAssemblyNotFound,

    #[error("required export(s) not found: {}", .0.join(", "))]
    MissingRequiredExports(Vec<String>),

    #[error("export not found: {0}")]
    ExportNotFound(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("null pointer: {0}")]
    NullPointer(&'static str),

    #[error("invalid class handle")]
    InvalidClass,

    #[error("invalid method handle")]
    InvalidMethod,

    #[error("invalid field handle")]
    InvalidField,

    #[error("class not found: {0}")]
    ClassNotFound(String),

    #[error("method not found: {0}")]
    MethodNotFound(String),

    #[error("field not found: {0}")]
    FieldNotFound(String),

    #[error("assembly not found: {0}")]
    AssemblyNotFound(String),

    #[error("thread not attached to the IL2CPP domain")]
    ThreadNotAttached,

    #[error("managed exception thrown during invoke")]
    ExceptionThrown,

    #[error("invocation failed: {0}")]
    InvocationFailed(String),

    #[error("hook install failed: {0}")]
    HookInstallFailed(String),

    #[error("no hook with handle {0}")]
    HookNotFound(i64),

    #[error("method has no native code pointer")]
    MethodPointerNull,

    #[error("allocation failed: {0}")]
    AllocationFailed(String),

    #[error("buffer too small: need {needed} bytes, have {available}")]
    BufferTooSmall { needed: usize, available: usize },

    #[error("build failed: {0}")]
    BuildFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// The code reported to managed callers for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::NotInitialized => ErrorCode::NotInitialized,
            Error::InitFailed(_) | Error::BuildFailed(_) | Error::Io(_) | Error::Json(_) => {
                ErrorCode::InitFailed
            }
            Error::GameAssemblyNotFound => ErrorCode::GameAssemblyNotFound,
            Error::MissingRequiredExports(_) | Error::ExportNotFound(_) => {
                ErrorCode::ExportNotFound
            }
            Error::InvalidArgument(_) => ErrorCode::InvalidArgument,
            Error::NullPointer(_) => ErrorCode::NullPointer,
            Error::InvalidClass => ErrorCode::InvalidClass,
            Error::InvalidMethod => ErrorCode::InvalidMethod,
            Error::InvalidField => ErrorCode::InvalidField,
            Error::ClassNotFound(_) => ErrorCode::ClassNotFound,
            Error::MethodNotFound(_) => ErrorCode::MethodNotFound,
            Error::FieldNotFound(_) => ErrorCode::FieldNotFound,
            Error::AssemblyNotFound(_) => ErrorCode::AssemblyNotFound,
            Error::ThreadNotAttached => ErrorCode::ThreadNotAttached,
            Error::ExceptionThrown => ErrorCode::ExceptionThrown,
            Error::InvocationFailed(_) => ErrorCode::InvocationFailed,
            Error::HookInstallFailed(_) => ErrorCode::HookInstallFailed,
            Error::HookNotFound(_) => ErrorCode::InvalidArgument,
            Error::MethodPointerNull => ErrorCode::MethodPointerNull,
            Error::AllocationFailed(_) => ErrorCode::AllocationFailed,
            Error::BufferTooSmall { .. } => ErrorCode::BufferTooSmall,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
