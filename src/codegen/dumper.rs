//! One full SDK generation pass: detector, collection, emission, build

use super::build::{build_project, BuildResult};
use super::emit::Emitter;
use super::freshness::{are_wrappers_fresh, write_manifest};
use super::mapping::MappingTable;
use super::model::{collect, SkipList};
use super::naming::safe_file_stem;
use crate::backend::MetadataSource;
use crate::config::{MdbPaths, Settings};
use crate::error::{Error, Result};
use crate::obfuscation::{report, Detector};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

#[derive(Debug, Clone, Default)]
pub struct DumpResult {
    pub success: bool,
    pub dump_path: PathBuf,
    pub error_message: String,
    pub total_classes: usize,
    pub total_assemblies: usize,
    pub generated_files: Vec<PathBuf>,
    pub total_wrappers_generated: usize,
    pub fake_methods_detected: usize,
    pub fake_classes_detected: usize,
    pub fake_report_path: PathBuf,
    pub mappings_loaded: usize,
}

/// Where generation reads its inputs and writes its outputs.
#[derive(Debug, Clone)]
pub struct DumpTargets {
    pub generated_dir: PathBuf,
    pub dump_file: PathBuf,
    pub fake_report: PathBuf,
    pub mapping_file: PathBuf,
}

impl DumpTargets {
    pub fn from_paths(paths: &MdbPaths) -> Self {
        DumpTargets {
            generated_dir: paths.generated_dir.clone(),
            dump_file: paths.raw_dump(),
            fake_report: paths.fake_report(),
            mapping_file: paths.mapping_file(),
        }
    }
}

pub fn wrapper_file_name(bucket: &str) -> String {
    format!("GameSDK.{}.cs", safe_file_stem(bucket))
}

fn write_outputs<S: MetadataSource + ?Sized>(
    source: &S,
    targets: &DumpTargets,
    settings: &Settings,
    result: &mut DumpResult,
) -> Result<()> {
    let mapping = MappingTable::load(&targets.mapping_file).unwrap_or_else(|e| {
        warn!("Ignoring unreadable mapping file: {}", e);
        MappingTable::default()
    });
    result.mappings_loaded = mapping.len();

    let mut detector = Detector::new(settings.detector.clone());
    detector.analyze(source);
    let stats = detector.stats();
    result.fake_methods_detected = stats.fake_methods;
    result.fake_classes_detected = stats.fake_classes;
    match report::write_report(&detector, source.module_base(), &targets.fake_report) {
        Ok(()) => result.fake_report_path = targets.fake_report.clone(),
        Err(e) => warn!("Could not write fake method report: {}", e),
    }

    let skip = SkipList::new(&settings.generator);
    let collection = collect(source, &skip, Some(&detector), &mapping);
    result.total_classes = collection.total_classes;
    result.total_assemblies = collection.total_assemblies;
    info!(
        "Collected {} types in {} namespaces ({} decoy classes dropped)",
        collection.type_count(),
        collection.buckets.len(),
        collection.skipped_fake_classes
    );

    fs::create_dir_all(&targets.generated_dir)?;
    for stale in fs::read_dir(&targets.generated_dir)? {
        let path = stale?.path();
        if path.extension().is_some_and(|e| e == "cs") {
            fs::remove_file(&path)?;
        }
    }

    let emitter = Emitter::new(source, &collection, Some(&detector), &mapping);
    for (bucket, types) in &collection.buckets {
        if types.is_empty() {
            continue;
        }
        let path = targets.generated_dir.join(wrapper_file_name(bucket));
        fs::write(&path, emitter.emit_file(bucket, types))?;
        result.total_wrappers_generated += types
            .iter()
            .filter(|t| t.kind == crate::common::TypeKind::Class)
            .count();
        result.generated_files.push(path);
    }
    write_manifest(&targets.generated_dir, &result.generated_files)?;

    let mut listing = String::new();
    for (i, name) in collection.image_names.iter().enumerate() {
        listing.push_str(&format!("// Image {}: {}\n", i, name));
    }
    if let Some(parent) = targets.dump_file.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&targets.dump_file, listing)?;
    result.dump_path = targets.dump_file.clone();
    Ok(())
}

/// Run the detector, emit every wrapper file and the image listing.
pub fn dump_runtime<S: MetadataSource + ?Sized>(source: &S, targets: &DumpTargets, settings: &Settings) -> DumpResult {
    let mut result = DumpResult::default();
    match write_outputs(source, targets, settings, &mut result) {
        Ok(()) => {
            result.success = true;
            info!(
                "Generated {} files, {} class wrappers, {} fake methods skipped",
                result.generated_files.len(),
                result.total_wrappers_generated,
                result.fake_methods_detected
            );
        }
        Err(e) => {
            error!("SDK generation failed: {}", e);
            result.error_message = e.to_string();
        }
    }
    result
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SdkAction {
    /// Wrappers and the mod host are current
    UpToDate,
    /// Wrappers were current, only the build ran
    Rebuilt,
    /// Everything was regenerated and built
    Regenerated,
}

/// What [`prepare_sdk`] has to do given the state on disk.
pub fn plan_sdk(generated_dir: &Path, runtime_lib: &Path, modhost_dll: &Path) -> SdkAction {
    if are_wrappers_fresh(generated_dir, runtime_lib) {
        if modhost_dll.exists() {
            SdkAction::UpToDate
        } else {
            SdkAction::Rebuilt
        }
    } else {
        SdkAction::Regenerated
    }
}

fn check_build(result: BuildResult) -> Result<()> {
    if result.success {
        Ok(())
    } else {
        if !result.build_output.is_empty() {
            error!("Build output:\n{}", result.build_output);
        }
        Err(Error::BuildFailed(result.error_message))
    }
}

/// Regenerate and rebuild the SDK when the runtime library changed.
pub fn prepare_sdk<S: MetadataSource + ?Sized>(source: &S, paths: &MdbPaths, settings: &Settings) -> Result<SdkAction> {
    let action = plan_sdk(&paths.generated_dir, &paths.game_assembly(), &paths.modhost_dll());
    match action {
        SdkAction::UpToDate => info!("SDK is up to date, skipping generation"),
        SdkAction::Rebuilt => {
            info!("Wrappers are current but the mod host is missing, rebuilding");
            check_build(build_project(&paths.core_project()))?;
        }
        SdkAction::Regenerated => {
            let dump = dump_runtime(source, &DumpTargets::from_paths(paths), settings);
            if !dump.success {
                return Err(Error::InitFailed(dump.error_message));
            }
            check_build(build_project(&paths.core_project()))?;
        }
    }
    Ok(action)
}
