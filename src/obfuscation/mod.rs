//! Decoy method detection
//!
//! Name obfuscators inject methods with meaningless 11-letter names whose code
//! pointers all land on a handful of shared stub bodies. The detector finds
//! them so the generator can leave them out of the SDK.

pub mod detector;
pub mod report;

pub use detector::{is_obfuscated_name, ClassAnalysis, Detector, DetectorStats, FakeMethod, FakeReason, StubPointer};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// A code pointer shared by at least this many methods is a stub pointer
    pub pointer_sharing_threshold: usize,
    /// Bytes read from each stub pointer for pattern checks and the report
    pub max_stub_body_size: usize,
    pub check_stub_patterns: bool,
    /// Treat every virtual or abstract method as real
    pub whitelist_vtable_methods: bool,
    /// Image name prefixes whose methods are never counted or flagged
    pub assembly_prefixes_whitelist: Vec<String>,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        DetectorConfig {
            pointer_sharing_threshold: 10,
            max_stub_body_size: 16,
            check_stub_patterns: true,
            whitelist_vtable_methods: true,
            assembly_prefixes_whitelist: [
                "UnityEngine",
                "Unity.",
                "System",
                "mscorlib",
                "Mono.",
                "netstandard",
                "Newtonsoft",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

impl DetectorConfig {
    pub fn is_whitelisted_image(&self, image_name: &str) -> bool {
        !image_name.is_empty()
            && self
                .assembly_prefixes_whitelist
                .iter()
                .any(|prefix| image_name.starts_with(prefix.as_str()))
    }
}
