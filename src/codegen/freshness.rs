//! Timestamp checks that let a restart skip regeneration

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::debug;

/// Lists the files of the last generation, one name per line.
pub const MANIFEST_NAME: &str = "GameSDK.manifest";

fn modified(path: &Path) -> io::Result<SystemTime> {
    fs::metadata(path)?.modified()
}

fn wrapper_files(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().is_some_and(|ext| ext == "cs") {
            files.push(path);
        }
    }
    Ok(files)
}

/// The dump exists and is newer than the runtime library.
pub fn is_dump_fresh(dump: &Path, runtime_lib: &Path) -> bool {
    match (modified(dump), modified(runtime_lib)) {
        (Ok(dump_time), Ok(lib_time)) => dump_time > lib_time,
        _ => false,
    }
}

/// At least one `.cs` file exists, the oldest one is newer than the runtime
/// library, and nothing listed in the manifest has gone missing.
pub fn are_wrappers_fresh(dir: &Path, runtime_lib: &Path) -> bool {
    let Ok(lib_time) = modified(runtime_lib) else {
        return false;
    };
    let Ok(files) = wrapper_files(dir) else {
        return false;
    };
    if files.is_empty() {
        return false;
    }

    let mut oldest = None;
    for file in &files {
        match modified(file) {
            Ok(time) => oldest = Some(oldest.map_or(time, |o: SystemTime| o.min(time))),
            Err(_) => return false,
        }
    }
    if oldest.map_or(true, |o| o <= lib_time) {
        debug!("Wrappers in {} are older than the runtime library", dir.display());
        return false;
    }

    match read_manifest(dir) {
        Some(names) => {
            let missing: Vec<&String> = names.iter().filter(|n| !dir.join(n).exists()).collect();
            if !missing.is_empty() {
                debug!("Generated files missing: {:?}", missing);
                return false;
            }
            true
        }
        None => true,
    }
}

pub fn read_manifest(dir: &Path) -> Option<Vec<String>> {
    let text = fs::read_to_string(dir.join(MANIFEST_NAME)).ok()?;
    Some(
        text.lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect(),
    )
}

pub fn write_manifest(dir: &Path, files: &[PathBuf]) -> io::Result<()> {
    let names: Vec<String> = files
        .iter()
        .filter_map(|f| f.file_name())
        .map(|n| n.to_string_lossy().into_owned())
        .collect();
    fs::write(dir.join(MANIFEST_NAME), names.join("\n") + "\n")
}
