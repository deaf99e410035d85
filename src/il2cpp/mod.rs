//! IL2CPP runtime backend
//!
//! Everything that touches the embedded runtime's ABI: binding its exports
//! under name obfuscation, the raw struct layouts, and the live
//! [`MetadataSource`](crate::backend::MetadataSource) implementation.

pub mod exports;
pub mod module;
pub mod offsets;
pub mod resolver;
pub mod runtime;
pub mod signature;
pub mod structs;
pub mod type_name;

pub use exports::{ExportTable, BEST_EFFORT_EXPORTS, REQUIRED_EXPORTS};
pub use offsets::{Il2CppOffsets, OFFSETS};
pub use resolver::{ExportResolver, Resolution, Strategy};
pub use runtime::{runtime, runtime_state, Il2CppRuntime, ResolverState, RuntimeCell};
pub use type_name::{KnownTypes, NameContext, TypeNameResolver};
