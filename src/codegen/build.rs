//! MSBuild trigger for the SDK project

use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Default)]
pub struct BuildResult {
    pub success: bool,
    pub error_message: String,
    pub build_output: String,
    pub exit_code: i32,
}

impl BuildResult {
    fn failed(message: impl Into<String>) -> Self {
        BuildResult {
            success: false,
            error_message: message.into(),
            build_output: String::new(),
            exit_code: -1,
        }
    }
}

const FALLBACK_MSBUILD: &[&str] = &[
    r"C:\Program Files\Microsoft Visual Studio\2022\Community\MSBuild\Current\Bin\MSBuild.exe",
    r"C:\Program Files\Microsoft Visual Studio\2022\Professional\MSBuild\Current\Bin\MSBuild.exe",
    r"C:\Program Files\Microsoft Visual Studio\2022\Enterprise\MSBuild\Current\Bin\MSBuild.exe",
    r"C:\Program Files\Microsoft Visual Studio\2022\BuildTools\MSBuild\Current\Bin\MSBuild.exe",
    r"C:\Program Files (x86)\Microsoft Visual Studio\2019\Community\MSBuild\Current\Bin\MSBuild.exe",
    r"C:\Program Files (x86)\Microsoft Visual Studio\2019\Professional\MSBuild\Current\Bin\MSBuild.exe",
    r"C:\Program Files (x86)\Microsoft Visual Studio\2019\Enterprise\MSBuild\Current\Bin\MSBuild.exe",
    r"C:\Program Files (x86)\Microsoft Visual Studio\2019\BuildTools\MSBuild\Current\Bin\MSBuild.exe",
];

pub fn vswhere_args() -> Vec<&'static str> {
    vec![
        "-latest",
        "-requires",
        "Microsoft.Component.MSBuild",
        "-find",
        r"MSBuild\**\Bin\MSBuild.exe",
    ]
}

pub fn msbuild_args(project: &Path) -> Vec<String> {
    vec![
        project.display().to_string(),
        "/restore".to_string(),
        "/p:Configuration=Release".to_string(),
        "/p:Platform=AnyCPU".to_string(),
        "/v:minimal".to_string(),
        "/nologo".to_string(),
    ]
}

fn vswhere_path() -> PathBuf {
    let program_files = std::env::var_os("ProgramFiles(x86)")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(r"C:\Program Files (x86)"));
    program_files
        .join("Microsoft Visual Studio")
        .join("Installer")
        .join("vswhere.exe")
}

/// First MSBuild reported by vswhere, otherwise the first known install path.
pub fn find_msbuild() -> Option<PathBuf> {
    let vswhere = vswhere_path();
    if vswhere.exists() {
        match Command::new(&vswhere).args(vswhere_args()).output() {
            Ok(output) if output.status.success() => {
                let stdout = String::from_utf8_lossy(&output.stdout);
                if let Some(line) = stdout.lines().map(str::trim).find(|l| !l.is_empty()) {
                    let path = PathBuf::from(line);
                    if path.exists() {
                        return Some(path);
                    }
                }
            }
            Ok(output) => warn!("vswhere exited with {}", output.status),
            Err(e) => warn!("Failed to run vswhere: {}", e),
        }
    }
    FALLBACK_MSBUILD.iter().map(PathBuf::from).find(|p| p.exists())
}

/// Build `project` with `msbuild`, capturing stdout and stderr.
pub fn run_msbuild(msbuild: &Path, project: &Path) -> BuildResult {
    if !project.exists() {
        return BuildResult::failed(format!("project not found: {}", project.display()));
    }
    info!("Building {} with {}", project.display(), msbuild.display());
    let mut command = Command::new(msbuild);
    command.args(msbuild_args(project));
    if let Some(dir) = project.parent() {
        command.current_dir(dir);
    }

    match command.output() {
        Ok(output) => {
            let mut build_output = String::from_utf8_lossy(&output.stdout).into_owned();
            build_output.push_str(&String::from_utf8_lossy(&output.stderr));
            let exit_code = output.status.code().unwrap_or(-1);
            if output.status.success() {
                info!("Build succeeded");
                BuildResult {
                    success: true,
                    error_message: String::new(),
                    build_output,
                    exit_code,
                }
            } else {
                error!("Build failed with exit code {}", exit_code);
                BuildResult {
                    success: false,
                    error_message: format!("MSBuild exited with code {}", exit_code),
                    build_output,
                    exit_code,
                }
            }
        }
        Err(e) => BuildResult::failed(format!("failed to start MSBuild: {}", e)),
    }
}

pub fn build_project(project: &Path) -> BuildResult {
    match find_msbuild() {
        Some(msbuild) => run_msbuild(&msbuild, project),
        None => BuildResult::failed("MSBuild not found"),
    }
}
