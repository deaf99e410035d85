//! Export resolution under name obfuscation
//!
//! Each canonical `il2cpp_*` name goes through an ordered fallback chain:
//! direct lookup, obfuscation-suffix match over the export directory,
//! signature scan of `.text`, and finally jump-thunk following on whatever
//! address was found. Results are cached per name for the process lifetime.

use super::module::ModuleImage;
use super::signature::builtin_patterns;
use crate::error::{Error, Result};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tracing::{debug, warn};

/// Obfuscation suffix -> canonical suffix it stands in for. Tried in order.
pub const SUFFIX_TABLE: &[(&str, &str)] = &[
    ("_wasting_your_time", "_domain_get_assemblies"),
    ("_wasting_your_life", "_domain_get_assemblies"),
    ("_stop_reversing", "_domain_get_assemblies"),
    ("_go_outside", "_domain_get_assemblies"),
];

/// Maximum number of jumps followed from a resolved address.
pub const MAX_THUNK_DEPTH: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Direct,
    SuffixMatch,
    SignatureScan,
    Thunk,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::Direct => write!(f, "Direct"),
            Strategy::SuffixMatch => write!(f, "SuffixMatch"),
            Strategy::SignatureScan => write!(f, "SignatureScan"),
            Strategy::Thunk => write!(f, "Thunk"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub canonical: String,
    /// Export name that produced the hit, or the canonical name for scans
    pub resolved_name: String,
    pub address: usize,
    pub strategy: Strategy,
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -> {} @ 0x{:X} [{}]",
            self.canonical, self.resolved_name, self.address, self.strategy
        )
    }
}

/// Follow `jmp rel32` and `jmp [rip+rel32]` chains starting at `addr`.
///
/// Stops at the first non-jump instruction, at an unreadable address, or
/// after [`MAX_THUNK_DEPTH`] hops.
pub fn follow_thunk<M: ModuleImage + ?Sized>(module: &M, addr: usize) -> usize {
    let mut current = addr;
    for _ in 0..MAX_THUNK_DEPTH {
        let next = match module.read(current, 2) {
            Some([0xE9, ..]) => module.read(current + 1, 4).map(|rel| {
                let rel = i32::from_le_bytes([rel[0], rel[1], rel[2], rel[3]]);
                (current as i64 + 5 + rel as i64) as usize
            }),
            Some([0xFF, 0x25]) => module.read(current + 2, 4).and_then(|rel| {
                let rel = i32::from_le_bytes([rel[0], rel[1], rel[2], rel[3]]);
                let slot = (current as i64 + 6 + rel as i64) as usize;
                module.read_u64(slot).map(|p| p as usize)
            }),
            _ => None,
        };
        match next {
            Some(target) if target != 0 => current = target,
            _ => break,
        }
    }
    current
}

fn is_function_start(text: &[u8], offset: usize) -> bool {
    offset == 0 || matches!(text[offset - 1], 0xCC | 0xC3 | 0x90)
}

pub struct ExportResolver<M: ModuleImage> {
    module: M,
    cache: Mutex<HashMap<String, Option<Resolution>>>,
    log: Mutex<Vec<String>>,
    uncached_lookups: AtomicUsize,
}

impl<M: ModuleImage> ExportResolver<M> {
    pub fn new(module: M) -> Self {
        ExportResolver {
            module,
            cache: Mutex::new(HashMap::new()),
            log: Mutex::new(Vec::new()),
            uncached_lookups: AtomicUsize::new(0),
        }
    }

    pub fn module(&self) -> &M {
        &self.module
    }

    /// Resolve a canonical name to an entry point.
    pub fn resolve(&self, name: &str) -> Result<usize> {
        self.resolve_detailed(name)
            .map(|r| r.address)
            .ok_or_else(|| Error::ExportNotFound(name.to_string()))
    }

    pub fn resolve_detailed(&self, name: &str) -> Option<Resolution> {
        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(hit) = cache.get(name) {
            return hit.clone();
        }
        self.uncached_lookups.fetch_add(1, Ordering::Relaxed);

        let claimed: HashSet<usize> = cache.values().flatten().map(|r| r.address).collect();
        let result = self.run_chain(name, &claimed);
        let line = match &result {
            Some(r) => r.to_string(),
            None => format!("{} -> NOT FOUND", name),
        };
        debug!("{}", line);
        self.log.lock().unwrap_or_else(|e| e.into_inner()).push(line);
        cache.insert(name.to_string(), result.clone());
        result
    }

    fn run_chain(&self, name: &str, claimed: &HashSet<usize>) -> Option<Resolution> {
        let (resolved_name, address, strategy) = self
            .direct(name)
            .or_else(|| self.suffix_match(name))
            .or_else(|| self.signature_scan(name, claimed))?;

        let target = follow_thunk(&self.module, address);
        let strategy = if target != address { Strategy::Thunk } else { strategy };
        Some(Resolution {
            canonical: name.to_string(),
            resolved_name,
            address: target,
            strategy,
        })
    }

    fn direct(&self, name: &str) -> Option<(String, usize, Strategy)> {
        self.module
            .proc_address(name)
            .map(|addr| (name.to_string(), addr, Strategy::Direct))
    }

    fn suffix_match(&self, name: &str) -> Option<(String, usize, Strategy)> {
        let candidates: Vec<&str> = SUFFIX_TABLE
            .iter()
            .filter(|(_, canonical)| name.ends_with(canonical))
            .map(|(suffix, _)| *suffix)
            .collect();
        if candidates.is_empty() {
            return None;
        }
        let exports = self.module.exports();
        candidates.iter().find_map(|suffix| {
            exports
                .iter()
                .find(|(export, _)| export.ends_with(suffix))
                .map(|(export, addr)| (export.clone(), *addr, Strategy::SuffixMatch))
        })
    }

    /// Accessor patterns are short and overlap, so a hit only counts when it
    /// starts a function (preceded by padding or a `ret`) and is not already
    /// the entry point of another resolved name.
    fn signature_scan(&self, name: &str, claimed: &HashSet<usize>) -> Option<(String, usize, Strategy)> {
        let patterns = builtin_patterns(name);
        if patterns.is_empty() {
            return None;
        }
        let (text_start, text) = self.module.text_section()?;
        patterns.iter().find_map(|p| {
            p.find_all(text)
                .into_iter()
                .filter(|&offset| is_function_start(text, offset))
                .map(|offset| text_start + offset)
                .find(|addr| !claimed.contains(addr))
                .map(|addr| (name.to_string(), addr, Strategy::SignatureScan))
        })
    }

    /// Number of lookups that actually ran the fallback chain.
    pub fn uncached_lookups(&self) -> usize {
        self.uncached_lookups.load(Ordering::Relaxed)
    }

    pub fn log_lines(&self) -> Vec<String> {
        self.log.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Write the resolution log, one line per canonical name.
    pub fn write_log(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = std::fs::File::create(path)?;
        writeln!(file, "# IL2CPP export resolution log")?;
        writeln!(file, "# module base 0x{:X}", self.module.base())?;
        for line in self.log_lines() {
            writeln!(file, "{}", line)?;
        }
        Ok(())
    }

    /// Write the log, logging instead of failing.
    pub fn persist_log(&self, path: &Path) {
        if let Err(e) = self.write_log(path) {
            warn!("Failed to write resolution log {}: {}", path.display(), e);
        }
    }
}
