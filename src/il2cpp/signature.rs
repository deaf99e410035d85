//! Masked byte patterns
//!
//! Patterns are written as hex bytes separated by spaces, `??` (or `?`)
//! marks a wildcard. Scanning anchors on the longest run of fixed bytes with
//! `memchr::memmem` and verifies the full pattern at each anchor hit.

use crate::error::{Error, Result};

/// Known bodies of small accessors, tried in order per entry point.
pub const BUILTIN_SIGNATURES: &[(&str, &[&str])] = &[
    (
        "il2cpp_domain_get",
        &["48 8B 05 ?? ?? ?? ?? C3", "48 8B 05 ?? ?? ?? ?? 48 85 C0"],
    ),
    (
        "il2cpp_domain_get_assemblies",
        &[
            "48 89 5C 24 ?? 48 89 74 24 ?? 57 48 83 EC",
            "40 53 48 83 EC ?? 48 8B DA",
        ],
    ),
    (
        "il2cpp_assembly_get_image",
        &["48 8B 41 ?? C3", "48 8B 81 ?? ?? ?? ?? C3"],
    ),
    (
        "il2cpp_image_get_class_count",
        &["8B 41 ?? C3", "48 8B 41 ?? C3", "8B 81 ?? ?? ?? ?? C3"],
    ),
    (
        "il2cpp_class_get_name",
        &["48 8B 41 ?? C3", "48 8B 81 ?? ?? ?? ?? C3"],
    ),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    bytes: Vec<u8>,
    /// 1 for a fixed byte, 0 for a wildcard
    mask: Vec<u8>,
}

impl Pattern {
    pub fn parse(text: &str) -> Result<Pattern> {
        let mut bytes = Vec::new();
        let mut mask = Vec::new();
        for token in text.split_whitespace() {
            if token.chars().all(|c| c == '?') {
                bytes.push(0);
                mask.push(0);
            } else {
                let byte = u8::from_str_radix(token, 16).map_err(|_| {
                    Error::InvalidArgument(format!("bad pattern byte '{}' in '{}'", token, text))
                })?;
                bytes.push(byte);
                mask.push(1);
            }
        }
        if bytes.is_empty() {
            return Err(Error::InvalidArgument("empty pattern".to_string()));
        }
        Ok(Pattern { bytes, mask })
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Whether `data` starts with this pattern.
    pub fn matches_at(&self, data: &[u8]) -> bool {
        if data.len() < self.bytes.len() {
            return false;
        }
        self.bytes
            .iter()
            .zip(&self.mask)
            .zip(data)
            .all(|((&b, &m), &d)| m == 0 || b == d)
    }

    /// Longest contiguous run of fixed bytes, as (offset, bytes).
    fn anchor(&self) -> (usize, &[u8]) {
        let mut best = (0, 0);
        let mut run_start = 0;
        let mut run_len = 0;
        for (i, &m) in self.mask.iter().enumerate() {
            if m != 0 {
                if run_len == 0 {
                    run_start = i;
                }
                run_len += 1;
                if run_len > best.1 {
                    best = (run_start, run_len);
                }
            } else {
                run_len = 0;
            }
        }
        (best.0, &self.bytes[best.0..best.0 + best.1])
    }

    /// Offsets of every match in `data`, ascending.
    pub fn find_all(&self, data: &[u8]) -> Vec<usize> {
        self.find_iter(data).collect()
    }

    pub fn find_first(&self, data: &[u8]) -> Option<usize> {
        self.find_iter(data).next()
    }

    fn find_iter<'a>(&'a self, data: &'a [u8]) -> Box<dyn Iterator<Item = usize> + 'a> {
        let (anchor_offset, anchor) = self.anchor();
        if anchor.is_empty() {
            let last = data.len().saturating_sub(self.len());
            return Box::new(
                (0..=last).filter(move |&i| data.len() >= self.len() && self.matches_at(&data[i..])),
            );
        }
        let finder = memchr::memmem::Finder::new(anchor);
        let hits: Vec<usize> = finder.find_iter(data).collect();
        Box::new(hits.into_iter().filter_map(move |pos| {
            let start = pos.checked_sub(anchor_offset)?;
            self.matches_at(&data[start..]).then_some(start)
        }))
    }
}

/// Parsed builtin patterns for a canonical entry point name.
pub fn builtin_patterns(name: &str) -> Vec<Pattern> {
    BUILTIN_SIGNATURES
        .iter()
        .filter(|(n, _)| *n == name)
        .flat_map(|(_, patterns)| patterns.iter())
        .filter_map(|p| Pattern::parse(p).ok())
        .collect()
}
