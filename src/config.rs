//! Filesystem layout and user settings
//!
//! All paths are derived from the directory of the host executable. Settings
//! come from `MDB/mdb_config.json`; a missing or malformed file falls back to
//! defaults.

use crate::error::Result;
use crate::obfuscation::DetectorConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Virtual key code of F2, the default overlay toggle.
pub const DEFAULT_TOGGLE_KEY: i32 = 0x71;

/// The on-disk layout created at startup.
#[derive(Debug, Clone)]
pub struct MdbPaths {
    pub game_dir: PathBuf,
    pub mdb_dir: PathBuf,
    pub logs_dir: PathBuf,
    pub managed_dir: PathBuf,
    pub mods_dir: PathBuf,
    pub dump_dir: PathBuf,
    pub core_dir: PathBuf,
    pub generated_dir: PathBuf,
}

impl MdbPaths {
    pub fn new(game_dir: impl Into<PathBuf>) -> Self {
        let game_dir = game_dir.into();
        let mdb_dir = game_dir.join("MDB");
        let core_dir = game_dir.join("MDB_Core");
        MdbPaths {
            logs_dir: mdb_dir.join("Logs"),
            managed_dir: mdb_dir.join("Managed"),
            mods_dir: mdb_dir.join("Mods"),
            dump_dir: mdb_dir.join("Dump"),
            generated_dir: core_dir.join("Generated"),
            mdb_dir,
            core_dir,
            game_dir,
        }
    }

    /// Layout rooted next to the running executable.
    pub fn from_current_exe() -> Result<Self> {
        let exe = std::env::current_exe()?;
        let dir = exe.parent().map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from("."));
        Ok(Self::new(dir))
    }

    pub fn core_project(&self) -> PathBuf {
        self.core_dir.join("MDB_Core.csproj")
    }

    pub fn modhost_dll(&self) -> PathBuf {
        self.managed_dir.join("GameSDK.ModHost.dll")
    }

    pub fn mapping_file(&self) -> PathBuf {
        self.dump_dir.join("mappings.json")
    }

    pub fn fake_report(&self) -> PathBuf {
        self.dump_dir.join("fake_methods.txt")
    }

    pub fn resolution_log(&self) -> PathBuf {
        self.dump_dir.join("resolved_exports.txt")
    }

    pub fn raw_dump(&self) -> PathBuf {
        self.dump_dir.join("dump.cs")
    }

    pub fn config_file(&self) -> PathBuf {
        self.mdb_dir.join("mdb_config.json")
    }

    pub fn log_file(&self) -> PathBuf {
        self.logs_dir.join("mdb_bridge.log")
    }

    /// The runtime library the freshness checks compare against.
    pub fn game_assembly(&self) -> PathBuf {
        self.game_dir.join(crate::il2cpp::offsets::IL2CPP_LIBRARY)
    }

    /// Create every directory of the layout.
    pub fn ensure_layout(&self) -> Result<()> {
        for dir in [
            &self.mdb_dir,
            &self.logs_dir,
            &self.managed_dir,
            &self.mods_dir,
            &self.dump_dir,
            &self.core_dir,
            &self.generated_dir,
        ] {
            fs::create_dir_all(dir)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlaySettings {
    pub enabled: bool,
    pub toggle_key: i32,
}

impl Default for OverlaySettings {
    fn default() -> Self {
        OverlaySettings {
            enabled: true,
            toggle_key: DEFAULT_TOGGLE_KEY,
        }
    }
}

/// Extra namespaces the wrapper generator should leave alone.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorSettings {
    pub custom_skip_namespaces: Vec<String>,
    pub custom_skip_prefixes: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub log_level: String,
    pub init_timeout_secs: u64,
    pub overlay: OverlaySettings,
    pub detector: DetectorConfig,
    pub generator: GeneratorSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            log_level: "mdb_bridge=info".to_string(),
            init_timeout_secs: 30,
            overlay: OverlaySettings::default(),
            detector: DetectorConfig::default(),
            generator: GeneratorSettings::default(),
        }
    }
}

impl Settings {
    /// Parse settings from a file. A missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Settings::default());
        }
        let contents = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Like [`Settings::load`] but never fails.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(settings) => settings,
            Err(e) => {
                warn!("Failed to load config {}: {}, using defaults", path.display(), e);
                Settings::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_paths() {
        let paths = MdbPaths::new("/game");
        assert_eq!(paths.dump_dir, PathBuf::from("/game/MDB/Dump"));
        assert_eq!(paths.generated_dir, PathBuf::from("/game/MDB_Core/Generated"));
        assert_eq!(paths.mapping_file(), PathBuf::from("/game/MDB/Dump/mappings.json"));
        assert_eq!(
            paths.modhost_dll(),
            PathBuf::from("/game/MDB/Managed/GameSDK.ModHost.dll")
        );
    }

    #[test]
    fn test_ensure_layout_creates_directories() {
        let tmp = tempfile::tempdir().unwrap();
        let paths = MdbPaths::new(tmp.path());
        paths.ensure_layout().unwrap();
        assert!(paths.logs_dir.is_dir());
        assert!(paths.mods_dir.is_dir());
        assert!(paths.generated_dir.is_dir());
    }

    #[test]
    fn test_missing_config_is_default() {
        let tmp = tempfile::tempdir().unwrap();
        let settings = Settings::load(&tmp.path().join("nope.json")).unwrap();
        assert_eq!(settings.overlay.toggle_key, DEFAULT_TOGGLE_KEY);
        assert_eq!(settings.detector.pointer_sharing_threshold, 10);
    }

    #[test]
    fn test_partial_config_keeps_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("mdb_config.json");
        fs::write(
            &path,
            r#"{ "overlay": { "toggle_key": 45 }, "generator": { "custom_skip_namespaces": ["Vendor.Ads"] }, "extra": 1 }"#,
        )
        .unwrap();
        let settings = Settings::load(&path).unwrap();
        assert_eq!(settings.overlay.toggle_key, 45);
        assert!(settings.overlay.enabled);
        assert_eq!(settings.generator.custom_skip_namespaces, vec!["Vendor.Ads"]);
        assert_eq!(settings.init_timeout_secs, 30);
    }

    #[test]
    fn test_malformed_config_falls_back() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("mdb_config.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(Settings::load(&path).is_err());
        let settings = Settings::load_or_default(&path);
        assert_eq!(settings.log_level, "mdb_bridge=info");
    }
}
