//! Element type tags of the IL2CPP type system
//!
//! `Il2CppType::type` stores one of these in an 8-bit field.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeCode {
    END = 0x00,
    VOID = 0x01,
    BOOLEAN = 0x02,
    CHAR = 0x03,
    I1 = 0x04,
    U1 = 0x05,
    I2 = 0x06,
    U2 = 0x07,
    I4 = 0x08,
    U4 = 0x09,
    I8 = 0x0a,
    U8 = 0x0b,
    R4 = 0x0c,
    R8 = 0x0d,
    STRING = 0x0e,
    PTR = 0x0f,
    BYREF = 0x10,
    VALUETYPE = 0x11,
    CLASS = 0x12,
    VAR = 0x13,
    ARRAY = 0x14,
    GENERICINST = 0x15,
    TYPEDBYREF = 0x16,
    I = 0x18,
    U = 0x19,
    FNPTR = 0x1b,
    OBJECT = 0x1c,
    SZARRAY = 0x1d,
    MVAR = 0x1e,
    CMODREQD = 0x1f,
    CMODOPT = 0x20,
    INTERNAL = 0x21,
    MODIFIER = 0x40,
    SENTINEL = 0x41,
    PINNED = 0x45,
    ENUM = 0x55,
}

impl TypeCode {
    const ALL: [TypeCode; 36] = [
        TypeCode::END, TypeCode::VOID, TypeCode::BOOLEAN, TypeCode::CHAR,
        TypeCode::I1, TypeCode::U1, TypeCode::I2, TypeCode::U2,
        TypeCode::I4, TypeCode::U4, TypeCode::I8, TypeCode::U8,
        TypeCode::R4, TypeCode::R8, TypeCode::STRING, TypeCode::PTR,
        TypeCode::BYREF, TypeCode::VALUETYPE, TypeCode::CLASS, TypeCode::VAR,
        TypeCode::ARRAY, TypeCode::GENERICINST, TypeCode::TYPEDBYREF, TypeCode::I,
        TypeCode::U, TypeCode::FNPTR, TypeCode::OBJECT, TypeCode::SZARRAY,
        TypeCode::MVAR, TypeCode::CMODREQD, TypeCode::CMODOPT, TypeCode::INTERNAL,
        TypeCode::MODIFIER, TypeCode::SENTINEL, TypeCode::PINNED, TypeCode::ENUM,
    ];

    /// Decode a raw tag. Unknown tags decode as `END`.
    pub fn from_raw(value: u32) -> TypeCode {
        Self::ALL
            .iter()
            .copied()
            .find(|code| *code as u32 == value)
            .unwrap_or(TypeCode::END)
    }

    /// Inline width in an object. 0 for structs, whose size is on the class.
    pub fn size(&self) -> usize {
        match self {
            TypeCode::BOOLEAN | TypeCode::I1 | TypeCode::U1 => 1,
            TypeCode::CHAR | TypeCode::I2 | TypeCode::U2 => 2,
            TypeCode::I4 | TypeCode::U4 | TypeCode::R4 => 4,
            TypeCode::I8 | TypeCode::U8 | TypeCode::R8 => 8,
            TypeCode::PTR | TypeCode::BYREF | TypeCode::CLASS | TypeCode::OBJECT |
            TypeCode::STRING | TypeCode::SZARRAY | TypeCode::ARRAY |
            TypeCode::GENERICINST | TypeCode::FNPTR | TypeCode::I | TypeCode::U => 8,
            _ => 0,
        }
    }

    /// The C# keyword for types that have one.
    pub fn csharp_keyword(&self) -> Option<&'static str> {
        let kw = match self {
            TypeCode::VOID => "void",
            TypeCode::BOOLEAN => "bool",
            TypeCode::CHAR => "char",
            TypeCode::I1 => "sbyte",
            TypeCode::U1 => "byte",
            TypeCode::I2 => "short",
            TypeCode::U2 => "ushort",
            TypeCode::I4 => "int",
            TypeCode::U4 => "uint",
            TypeCode::I8 => "long",
            TypeCode::U8 => "ulong",
            TypeCode::R4 => "float",
            TypeCode::R8 => "double",
            TypeCode::STRING => "string",
            TypeCode::OBJECT => "object",
            TypeCode::I => "IntPtr",
            TypeCode::U => "UIntPtr",
            _ => return None,
        };
        Some(kw)
    }
}

impl fmt::Display for TypeCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.csharp_keyword() {
            Some(kw) => write!(f, "{}", kw),
            None => write!(f, "{:?}", self),
        }
    }
}
