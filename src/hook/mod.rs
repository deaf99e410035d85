//! Native function hooking
//!
//! A [`DetourBackend`] turns a (target, detour) pair into a [`Detour`] that can
//! be switched on and off. The registry in [`engine`] owns every installed
//! hook behind one mutex and hands out monotonic handles.

pub mod engine;
pub mod inline;
pub mod memory;

pub use engine::{
    debug_enabled, engine, hook_method, hook_pointer, hook_rva, method_shape, set_debug, HookInfo,
    HookRegistry, MethodShape,
};
pub use inline::InlinePatcher;

use crate::error::Result;

/// A prepared patch on one function.
pub trait Detour: Send {
    /// Entry that runs the original code.
    fn trampoline(&self) -> usize;
    fn enable(&mut self) -> Result<()>;
    fn disable(&mut self) -> Result<()>;
}

pub trait DetourBackend: Send {
    /// Build the patch for `target`. The target is not modified until
    /// [`Detour::enable`].
    fn create(&mut self, target: usize, detour: usize) -> Result<Box<dyn Detour>>;
}
