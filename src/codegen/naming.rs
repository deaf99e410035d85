//! C# identifier rules

pub const CSHARP_KEYWORDS: &[&str] = &[
    "abstract", "as", "base", "bool", "break", "byte", "case", "catch", "char", "checked",
    "class", "const", "continue", "decimal", "default", "delegate", "do", "double", "else",
    "enum", "event", "explicit", "extern", "false", "finally", "fixed", "float", "for",
    "foreach", "goto", "if", "implicit", "in", "int", "interface", "internal", "is", "lock",
    "long", "namespace", "new", "null", "object", "operator", "out", "override", "params",
    "private", "protected", "public", "readonly", "ref", "return", "sbyte", "sealed", "short",
    "sizeof", "stackalloc", "static", "string", "struct", "switch", "this", "throw", "true",
    "try", "typeof", "uint", "ulong", "unchecked", "unsafe", "ushort", "using", "virtual",
    "void", "volatile", "while",
];

pub fn is_keyword(name: &str) -> bool {
    CSHARP_KEYWORDS.contains(&name)
}

/// Turn any runtime name into a valid C# identifier.
pub fn sanitize_identifier(name: &str) -> String {
    if name.is_empty() {
        return "_unnamed".to_string();
    }
    let mut out: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if out.starts_with(|c: char| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    if is_keyword(&out) {
        out.insert(0, '@');
    }
    out
}

/// Sanitize each dot-separated segment of a namespace.
pub fn sanitize_namespace(ns: &str) -> String {
    if ns.is_empty() {
        return "Global".to_string();
    }
    ns.split('.').map(sanitize_identifier).collect::<Vec<_>>().join(".")
}

/// `Foo.Bar` -> `Foo_Bar`, empty -> `Global`.
pub fn safe_file_stem(ns: &str) -> String {
    if ns.is_empty() {
        return "Global".to_string();
    }
    ns.replace('.', "_")
}

/// Names the C# compiler synthesises and that have no legal spelling.
pub fn is_compiler_generated(name: &str) -> bool {
    name.contains('<') || name.contains('>') || name.contains('/')
}

/// `List`1` -> (`List`, 1). Names without a backtick have arity 0.
pub fn split_arity(name: &str) -> (&str, usize) {
    match name.split_once('`') {
        Some((base, arity)) => (base, arity.parse().unwrap_or(0)),
        None => (name, 0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_identifier() {
        assert_eq!(sanitize_identifier("Player"), "Player");
        assert_eq!(sanitize_identifier("my-field.x"), "my_field_x");
        assert_eq!(sanitize_identifier("3D"), "_3D");
        assert_eq!(sanitize_identifier("object"), "@object");
        assert_eq!(sanitize_identifier("in"), "@in");
        assert_eq!(sanitize_identifier(""), "_unnamed");
        assert_eq!(sanitize_identifier("héllo"), "h_llo");
    }

    #[test]
    fn test_namespaces_and_files() {
        assert_eq!(sanitize_namespace("Foo.Bar"), "Foo.Bar");
        assert_eq!(sanitize_namespace("Foo.2nd"), "Foo._2nd");
        assert_eq!(sanitize_namespace(""), "Global");
        assert_eq!(safe_file_stem("Foo.Bar"), "Foo_Bar");
        assert_eq!(safe_file_stem(""), "Global");
    }

    #[test]
    fn test_split_arity() {
        assert_eq!(split_arity("Dictionary`2"), ("Dictionary", 2));
        assert_eq!(split_arity("Player"), ("Player", 0));
        assert!(is_compiler_generated("<Start>d__4"));
        assert!(!is_compiler_generated("Start"));
    }
}
