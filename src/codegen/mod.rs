//! Wrapper generator
//!
//! Turns the runtime's metadata into a C# SDK whose members call back into
//! the bridge, then builds it.

pub mod build;
pub mod dumper;
pub mod emit;
pub mod freshness;
pub mod mapping;
pub mod model;
pub mod naming;

pub use build::BuildResult;
pub use dumper::{dump_runtime, prepare_sdk, DumpResult, DumpTargets, SdkAction};
pub use emit::Emitter;
pub use freshness::{are_wrappers_fresh, is_dump_fresh};
pub use mapping::MappingTable;
pub use model::{collect, Collection, SkipList, TypeInfo};
