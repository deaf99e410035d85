//! Runtime enums shared by the metadata, detector and generator layers

pub mod attributes;
pub mod type_code;
pub mod type_kind;

pub use type_code::TypeCode;
pub use type_kind::TypeKind;
