//! Log sink setup
//!
//! The bridge runs inside a game process with no console, so everything goes
//! to `MDB/Logs/mdb_bridge.log`. The filter comes from `MDB_LOG` when set,
//! otherwise from the configured level.

use crate::config::MdbPaths;
use crate::error::Result;
use std::fs::File;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

static INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Install the global subscriber. Later calls are no-ops.
pub fn init(paths: &MdbPaths, default_filter: &str) -> Result<()> {
    if INITIALIZED.swap(true, Ordering::SeqCst) {
        return Ok(());
    }

    std::fs::create_dir_all(&paths.logs_dir)?;
    let file = File::create(paths.log_file())?;

    let filter = EnvFilter::try_from_env("MDB_LOG")
        .or_else(|_| EnvFilter::try_new(default_filter))
        .unwrap_or_else(|_| EnvFilter::new("mdb_bridge=info"));

    // Another subscriber may already be installed by a host test harness.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_thread_ids(true)
        .try_init();

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_creates_log_file_once() {
        let tmp = tempfile::tempdir().unwrap();
        let paths = MdbPaths::new(tmp.path());
        init(&paths, "mdb_bridge=debug").unwrap();
        assert!(paths.log_file().exists());
        // second call is ignored even with a different root
        let other = MdbPaths::new(tmp.path().join("other"));
        init(&other, "mdb_bridge=debug").unwrap();
        assert!(!other.log_file().exists());
    }
}
