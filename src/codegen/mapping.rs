//! Deobfuscation mapping file
//!
//! `mappings.json` is a JSON array of
//! `{ "ObfuscatedName", "FriendlyName", "SymbolType", "ParentType"? }` where
//! `SymbolType` is 0 for types, 1 for fields, 2 for properties and 3 for
//! methods. Friendly names only ever change emitted spellings; dispatch keeps
//! the raw name.

use crate::error::Result;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    Type,
    Field,
    Property,
    Method,
}

impl SymbolKind {
    pub fn from_raw(value: i64) -> Option<SymbolKind> {
        match value {
            0 => Some(SymbolKind::Type),
            1 => Some(SymbolKind::Field),
            2 => Some(SymbolKind::Property),
            3 => Some(SymbolKind::Method),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MappingEntry {
    #[serde(default)]
    pub obfuscated_name: String,
    #[serde(default)]
    pub friendly_name: String,
    #[serde(default)]
    pub symbol_type: i64,
    #[serde(default)]
    pub parent_type: Option<String>,
}

#[derive(Debug, Default, Clone)]
pub struct MappingTable {
    types: HashMap<String, String>,
    /// Keyed `Parent::member`, or just `member` when the entry has no parent
    members: HashMap<String, String>,
}

impl MappingTable {
    /// Load `path`. A missing file is an empty table.
    pub fn load(path: &Path) -> Result<MappingTable> {
        if !path.exists() {
            info!("No mapping file at {}", path.display());
            return Ok(MappingTable::default());
        }
        let text = std::fs::read_to_string(path)?;
        let table = Self::from_json(&text)?;
        info!("Loaded {} deobfuscation mappings from {}", table.len(), path.display());
        Ok(table)
    }

    pub fn from_json(text: &str) -> Result<MappingTable> {
        let entries: Vec<MappingEntry> = serde_json::from_str(text)?;
        Ok(Self::from_entries(entries))
    }

    pub fn from_entries(entries: impl IntoIterator<Item = MappingEntry>) -> MappingTable {
        let mut table = MappingTable::default();
        for entry in entries {
            if entry.obfuscated_name.is_empty() || entry.friendly_name.is_empty() {
                continue;
            }
            match SymbolKind::from_raw(entry.symbol_type) {
                Some(SymbolKind::Type) => {
                    table.types.insert(entry.obfuscated_name, entry.friendly_name);
                }
                Some(_) => {
                    let key = match entry.parent_type.as_deref() {
                        Some(parent) if !parent.is_empty() => {
                            format!("{}::{}", parent, entry.obfuscated_name)
                        }
                        _ => entry.obfuscated_name,
                    };
                    table.members.insert(key, entry.friendly_name);
                }
                None => warn!(
                    "Ignoring mapping for '{}' with unknown symbol type {}",
                    entry.obfuscated_name, entry.symbol_type
                ),
            }
        }
        table
    }

    pub fn type_alias(&self, raw: &str) -> Option<&str> {
        self.types.get(raw).map(String::as_str)
    }

    /// Parent-qualified key first, then the bare member name.
    pub fn member_alias(&self, parent: &str, raw: &str) -> Option<&str> {
        self.members
            .get(&format!("{}::{}", parent, raw))
            .or_else(|| self.members.get(raw))
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.types.len() + self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"[
        { "ObfuscatedName": "ABCDEFGHIJK", "FriendlyName": "PlayerController", "SymbolType": 0 },
        { "ObfuscatedName": "KJIHGFEDCBA", "FriendlyName": "Jump", "SymbolType": 3, "ParentType": "ABCDEFGHIJK" },
        { "ObfuscatedName": "QQQQQQQQQQQ", "FriendlyName": "health", "SymbolType": 1 },
        { "ObfuscatedName": "", "FriendlyName": "Ignored", "SymbolType": 0 },
        { "ObfuscatedName": "ZZZZZZZZZZZ", "FriendlyName": "", "SymbolType": 0 },
        { "ObfuscatedName": "XXXXXXXXXXX", "FriendlyName": "Extra", "SymbolType": 2, "Comment": "unknown field" }
    ]"#;

    #[test]
    fn test_from_json() {
        let table = MappingTable::from_json(SAMPLE).unwrap();
        assert_eq!(table.len(), 4);
        assert_eq!(table.type_alias("ABCDEFGHIJK"), Some("PlayerController"));
        assert_eq!(table.type_alias("ZZZZZZZZZZZ"), None);
        assert_eq!(table.member_alias("ABCDEFGHIJK", "KJIHGFEDCBA"), Some("Jump"));
        assert_eq!(table.member_alias("Other", "KJIHGFEDCBA"), None);
        assert_eq!(table.member_alias("Anything", "QQQQQQQQQQQ"), Some("health"));
        assert_eq!(table.member_alias("Anything", "XXXXXXXXXXX"), Some("Extra"));
    }

    #[test]
    fn test_parent_key_wins() {
        let table = MappingTable::from_entries(vec![
            MappingEntry {
                obfuscated_name: "AAAAAAAAAAA".into(),
                friendly_name: "Generic".into(),
                symbol_type: 3,
                parent_type: None,
            },
            MappingEntry {
                obfuscated_name: "AAAAAAAAAAA".into(),
                friendly_name: "Specific".into(),
                symbol_type: 3,
                parent_type: Some("Owner".into()),
            },
        ]);
        assert_eq!(table.member_alias("Owner", "AAAAAAAAAAA"), Some("Specific"));
        assert_eq!(table.member_alias("Stranger", "AAAAAAAAAAA"), Some("Generic"));
    }

    #[test]
    fn test_load_missing_and_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let missing = MappingTable::load(&dir.path().join("mappings.json")).unwrap();
        assert!(missing.is_empty());

        let bad = dir.path().join("bad.json");
        std::fs::write(&bad, "{ not json").unwrap();
        assert!(MappingTable::load(&bad).is_err());
    }
}
