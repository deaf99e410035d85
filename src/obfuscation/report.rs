//! Plain-text report of a detector pass

use super::detector::{Detector, FakeReason};
use crate::error::Result;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;
use tracing::info;

const RULE: &str = "// ============================================================================";

fn hex_bytes(bytes: &[u8]) -> String {
    if bytes.is_empty() {
        return "[unreadable]".to_string();
    }
    bytes
        .iter()
        .take(8)
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Render the report. `generated` is the timestamp line content.
pub fn render_report(detector: &Detector, module_base: usize, generated: &str) -> String {
    let config = detector.config();
    let stats = detector.stats();
    let mut out = String::new();

    let _ = writeln!(out, "{}", RULE);
    let _ = writeln!(out, "// Obfuscation Fake Method Detection Report");
    let _ = writeln!(out, "// Generated: {}", generated);
    let _ = writeln!(out, "{}", RULE);
    let _ = writeln!(out, "//");
    let _ = writeln!(out, "// Configuration:");
    let _ = writeln!(out, "//   Pointer sharing threshold: {}", config.pointer_sharing_threshold);
    let _ = writeln!(
        out,
        "//   VTable whitelist enabled:  {}",
        if config.whitelist_vtable_methods { "yes" } else { "no" }
    );
    let _ = writeln!(
        out,
        "//   Stub pattern check:        {}",
        if config.check_stub_patterns { "yes" } else { "no" }
    );
    let whitelist: Vec<String> = config
        .assembly_prefixes_whitelist
        .iter()
        .map(|p| format!("{}*", p))
        .collect();
    let _ = writeln!(out, "//   Assembly whitelist: {}", whitelist.join(", "));
    let _ = writeln!(out, "//");
    let _ = writeln!(out, "// Summary:");
    let _ = writeln!(out, "//   Total methods analyzed:     {}", stats.total_methods);
    let _ = writeln!(out, "//   Whitelisted (skipped):      {}", stats.whitelisted_methods);
    let _ = writeln!(out, "//   Generic shared (skipped):   {}", stats.generic_skipped);
    let _ = writeln!(out, "//   Fake methods detected:      {}", stats.fake_methods);
    let _ = writeln!(out, "//   Fake classes detected:      {}", stats.fake_classes);
    let _ = writeln!(out, "//   Unique stub pointers:       {}", stats.stub_pointers);
    let _ = writeln!(out, "//   VTable methods (whitelist): {}", stats.vtable_methods);
    let _ = writeln!(out, "{}", RULE);

    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "// STUB POINTERS (shared by {}+ methods)",
        config.pointer_sharing_threshold
    );
    for stub in detector.stub_pointers() {
        let _ = writeln!(
            out,
            "// Pointer 0x{:X} (RVA: 0x{:X}) - shared by {} methods - bytes: {}{}",
            stub.address,
            stub.rva,
            stub.shared_by,
            hex_bytes(&stub.bytes),
            if stub.matches_stub_body { " [STUB]" } else { "" }
        );
    }

    let fake_classes: Vec<_> = detector
        .class_analysis()
        .iter()
        .filter(|c| c.is_entirely_fake)
        .collect();
    let _ = writeln!(out);
    let _ = writeln!(out, "// ENTIRELY FAKE CLASSES ({} detected)", fake_classes.len());
    for class in &fake_classes {
        let _ = writeln!(
            out,
            "// [FAKE CLASS] {} - {}/{} methods are fake",
            class.full_name, class.fake_methods, class.total_methods
        );
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "// ALL FAKE METHODS ({} detected)", detector.fake_methods().len());
    for (class_name, fakes) in detector.fakes_by_class() {
        let entirely = fakes
            .first()
            .map(|f| detector.is_entirely_fake_class(f.class))
            .unwrap_or(false);
        let _ = writeln!(out);
        let _ = writeln!(
            out,
            "// --- {}{} ---",
            class_name,
            if entirely { " [ENTIRE CLASS IS FAKE]" } else { "" }
        );
        for fake in fakes {
            let tag = match fake.reason {
                FakeReason::SharedMethodPointer => format!("[SHARED x{}]", fake.shared_count),
                FakeReason::NullMethodPointer => "[NULL PTR]".to_string(),
            };
            let _ = writeln!(
                out,
                "//   {} {} // RVA: 0x{:X}",
                tag,
                fake.signature,
                fake.pointer.saturating_sub(module_base)
            );
        }
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "// PARTIALLY AFFECTED CLASSES (mix of real + fake methods)");
    for class in detector.class_analysis().iter().filter(|c| !c.is_entirely_fake) {
        let _ = writeln!(
            out,
            "// {} - {} fake / {} real / {} total",
            class.full_name, class.fake_methods, class.real_methods, class.total_methods
        );
    }

    out.push_str("\n// === End of Report ===\n");
    out
}

/// Write the report to `path`, creating parent directories.
pub fn write_report(detector: &Detector, module_base: usize, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let generated = chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
    fs::write(path, render_report(detector, module_base, &generated))?;
    info!("Fake method report written to {}", path.display());
    Ok(())
}
