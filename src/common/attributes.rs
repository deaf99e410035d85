//! ECMA-335 attribute flag words as stored by IL2CPP
//!
//! Classes keep `TypeAttributes`, methods `MethodAttributes`, fields
//! `FieldAttributes`, parameters `ParamAttributes` (in `Il2CppType::attrs`).

pub mod type_attrs {
    pub const VISIBILITY_MASK: u32 = 0x0000_0007;
    pub const NOT_PUBLIC: u32 = 0x0;
    pub const PUBLIC: u32 = 0x1;
    pub const NESTED_PUBLIC: u32 = 0x2;
    pub const NESTED_PRIVATE: u32 = 0x3;
    pub const NESTED_FAMILY: u32 = 0x4;
    pub const NESTED_ASSEMBLY: u32 = 0x5;
    pub const NESTED_FAM_AND_ASSEM: u32 = 0x6;
    pub const NESTED_FAM_OR_ASSEM: u32 = 0x7;

    pub const INTERFACE: u32 = 0x0000_0020;
    pub const ABSTRACT: u32 = 0x0000_0080;
    pub const SEALED: u32 = 0x0000_0100;
}

pub mod method_attrs {
    pub const ACCESS_MASK: u32 = 0x0007;
    pub const PRIVATE: u32 = 0x0001;
    pub const FAM_AND_ASSEM: u32 = 0x0002;
    pub const ASSEMBLY: u32 = 0x0003;
    pub const FAMILY: u32 = 0x0004;
    pub const FAM_OR_ASSEM: u32 = 0x0005;
    pub const PUBLIC: u32 = 0x0006;

    pub const STATIC: u32 = 0x0010;
    pub const VIRTUAL: u32 = 0x0040;
    pub const ABSTRACT: u32 = 0x0400;
    pub const SPECIAL_NAME: u32 = 0x0800;
}

pub mod field_attrs {
    pub const ACCESS_MASK: u32 = 0x0007;
    pub const PRIVATE: u32 = 0x0001;
    pub const PUBLIC: u32 = 0x0006;

    pub const STATIC: u32 = 0x0010;
    pub const INIT_ONLY: u32 = 0x0020;
    pub const LITERAL: u32 = 0x0040;
}

pub mod param_attrs {
    pub const IN: u32 = 0x0001;
    pub const OUT: u32 = 0x0002;
}

/// C# access modifier for a type's visibility bits.
pub fn type_visibility(flags: u32) -> &'static str {
    use type_attrs::*;
    match flags & VISIBILITY_MASK {
        PUBLIC | NESTED_PUBLIC => "public",
        NESTED_PRIVATE => "private",
        NESTED_FAMILY => "protected",
        NESTED_FAM_OR_ASSEM => "protected internal",
        _ => "internal",
    }
}

/// C# access modifier for a method or field access field.
pub fn member_visibility(flags: u32) -> &'static str {
    use method_attrs::*;
    match flags & ACCESS_MASK {
        PUBLIC => "public",
        FAMILY => "protected",
        FAM_OR_ASSEM => "protected internal",
        PRIVATE => "private",
        _ => "internal",
    }
}

pub fn is_public_type(flags: u32) -> bool {
    matches!(
        flags & type_attrs::VISIBILITY_MASK,
        type_attrs::PUBLIC | type_attrs::NESTED_PUBLIC
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_visibility() {
        assert_eq!(type_visibility(type_attrs::PUBLIC | type_attrs::SEALED), "public");
        assert_eq!(type_visibility(type_attrs::NESTED_PUBLIC), "public");
        assert_eq!(type_visibility(type_attrs::NESTED_FAMILY), "protected");
        assert_eq!(type_visibility(type_attrs::NESTED_FAM_AND_ASSEM), "internal");
        assert_eq!(type_visibility(type_attrs::NOT_PUBLIC), "internal");
        assert!(is_public_type(type_attrs::NESTED_PUBLIC | type_attrs::ABSTRACT));
        assert!(!is_public_type(type_attrs::NESTED_PRIVATE));
    }

    #[test]
    fn test_member_visibility() {
        assert_eq!(member_visibility(method_attrs::PUBLIC | method_attrs::STATIC), "public");
        assert_eq!(member_visibility(method_attrs::FAM_OR_ASSEM), "protected internal");
        assert_eq!(member_visibility(method_attrs::ASSEMBLY), "internal");
        assert_eq!(member_visibility(0), "internal");
    }
}
