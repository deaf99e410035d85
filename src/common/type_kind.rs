//! Kind of an emitted type declaration

/// Declaration kind of a wrapped class. The ordering is the order in which
/// kinds are written inside a namespace block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TypeKind {
    Delegate = 0,
    Enum = 1,
    Interface = 2,
    Struct = 3,
    Class = 4,
}

impl TypeKind {
    /// The C# keyword that opens a declaration of this kind.
    pub fn keyword(&self) -> &'static str {
        match self {
            TypeKind::Delegate => "delegate",
            TypeKind::Enum => "enum",
            TypeKind::Interface => "interface",
            TypeKind::Struct => "struct",
            TypeKind::Class => "class",
        }
    }
}

impl std::fmt::Display for TypeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TypeKind::Delegate => write!(f, "Delegate"),
            TypeKind::Enum => write!(f, "Enum"),
            TypeKind::Interface => write!(f, "Interface"),
            TypeKind::Struct => write!(f, "Struct"),
            TypeKind::Class => write!(f, "Class"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_order() {
        let mut kinds = vec![TypeKind::Class, TypeKind::Enum, TypeKind::Struct, TypeKind::Delegate, TypeKind::Interface];
        kinds.sort();
        assert_eq!(
            kinds,
            vec![TypeKind::Delegate, TypeKind::Enum, TypeKind::Interface, TypeKind::Struct, TypeKind::Class]
        );
        assert_eq!(TypeKind::Struct.keyword(), "struct");
    }
}
