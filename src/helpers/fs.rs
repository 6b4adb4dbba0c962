//! File System Utilities
//!
//! Configuration and data directory management.

use crate::error::{Error, Result};
use directories::ProjectDirs;
use std::fs;
use std::path::{Path, PathBuf};

fn project_dirs() -> Result<ProjectDirs> {
    let Some(project_dirs) = ProjectDirs::from("org", "shudhvayu", "vayu-sync") else {
        return Err(Error::Invalid {
            message: "Could not determine project directories".to_string(),
        });
    };
    Ok(project_dirs)
}

fn ensure_dir(dir: &Path) -> Result<PathBuf> {
    if !dir.exists() {
        fs::create_dir_all(dir)?;
    }
    Ok(dir.to_path_buf())
}

/// Get or create the application's configuration directory
///
/// Platform-specific locations:
/// - **Linux**: `~/.config/vayu-sync/` or `$XDG_CONFIG_HOME/vayu-sync/`
/// - **macOS**: `~/Library/Application Support/org.shudhvayu.vayu-sync/`
/// - **Windows**: `C:\Users\<User>\AppData\Roaming\shudhvayu\vayu-sync\config\`
pub fn get_or_create_config_dir() -> Result<PathBuf> {
    ensure_dir(project_dirs()?.config_dir())
}

/// Get or create the data directory (bucket store, log files)
///
/// Platform-specific locations:
/// - **Linux**: `~/.local/share/vayu-sync/`
/// - **macOS**: `~/Library/Application Support/org.shudhvayu.vayu-sync/`
/// - **Windows**: `C:\Users\<User>\AppData\Roaming\shudhvayu\vayu-sync\data\`
pub fn get_or_create_data_dir() -> Result<PathBuf> {
    ensure_dir(project_dirs()?.data_dir())
}

/// Create `dir` (and parents) if needed and return it
pub fn get_or_create_dir(dir: impl AsRef<Path>) -> Result<PathBuf> {
    ensure_dir(dir.as_ref())
}

/// Check if running in development mode
pub fn is_development() -> bool {
    cfg!(debug_assertions)
}
