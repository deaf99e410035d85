//! Native bridge between an IL2CPP Unity game and a managed mod layer
//!
//! The bridge binds the runtime's C exports even when their names are
//! obfuscated, exposes metadata and invocation through a flat C ABI, dumps
//! typed C# wrappers for the game's assemblies, detours native functions and
//! drives an in-game UI overlay.

pub mod backend;
pub mod bridge;
pub mod codegen;
pub mod common;
pub mod config;
pub mod error;
pub mod hook;
pub mod il2cpp;
pub mod init;
pub mod logging;
pub mod obfuscation;
pub mod overlay;

pub use error::{Error, ErrorCode, Result};
