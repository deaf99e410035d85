//! Raw layouts of runtime structures
//!
//! The bridge reads a handful of runtime structures directly instead of going
//! through exports. These offsets are the x64 layout shared by the Unity
//! 2019 through 2022 runtimes.

/// Only 64-bit games are supported.
pub const SIZE_OF_PTR: usize = 8;

/// File name of the runtime library.
#[cfg(target_os = "windows")]
pub const IL2CPP_LIBRARY: &str = "GameAssembly.dll";

#[cfg(target_os = "linux")]
pub const IL2CPP_LIBRARY: &str = "GameAssembly.so";

#[cfg(target_os = "macos")]
pub const IL2CPP_LIBRARY: &str = "GameAssembly.dylib";

#[derive(Debug, Clone)]
pub struct Il2CppOffsets {
    // Il2CppObject
    /// Size of the object header (klass + monitor); boxed payloads start here
    pub object_header: u32,

    // MethodInfo
    /// Native entry point
    pub method_pointer: u32,

    // FieldInfo
    /// `int32_t offset` of the field inside its instance
    pub field_offset: u32,

    // Il2CppType
    /// Data union (klassIndex, type, genericClass, genericParameterHandle)
    pub type_data: u32,
    /// Bitfield word: attrs:16 | type:8 | num_mods:6 | byref:1 | pinned:1
    pub type_bits: u32,

    // Il2CppGenericClass
    /// Context (class_inst, method_inst)
    pub generic_class_context: u32,

    // Il2CppGenericInst
    /// `type_argc`
    pub generic_inst_argc: u32,
    /// `type_argv`
    pub generic_inst_argv: u32,

    // Il2CppGenericParameter
    /// Position of the parameter in its owner's list
    pub generic_param_num: u32,

    // Il2CppString
    pub string_length: u32,
    /// First UTF-16 code unit
    pub string_chars: u32,

    // Il2CppArray
    /// Bounds pointer, null for single-dimension arrays
    pub array_bounds: u32,
    /// `max_length`
    pub array_length: u32,
    pub array_elements: u32,
}

impl Default for Il2CppOffsets {
    fn default() -> Self {
        Self::x64()
    }
}

impl Il2CppOffsets {
    pub const fn x64() -> Self {
        Il2CppOffsets {
            object_header: 0x10,

            method_pointer: 0x0,

            field_offset: 0x18,

            type_data: 0x0,
            type_bits: 0x8,

            generic_class_context: 0x8,

            generic_inst_argc: 0x0,
            generic_inst_argv: 0x8,

            generic_param_num: 0xC,

            string_length: 0x10,
            string_chars: 0x14,

            array_bounds: 0x10,
            array_length: 0x18,
            array_elements: 0x20,
        }
    }
}

/// Offsets used throughout the crate.
pub const OFFSETS: Il2CppOffsets = Il2CppOffsets::x64();
