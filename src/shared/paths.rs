use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

const APP_DIR_NAME: &str = "mjpeg-recorder";

/// Get the base storage directory following XDG Base Directory Specification.
/// Returns `$XDG_DATA_HOME/mjpeg-recorder`, or the platform data dir.
pub fn get_storage_dir() -> PathBuf {
    if let Ok(xdg_data) = std::env::var("XDG_DATA_HOME") {
        return PathBuf::from(xdg_data).join(APP_DIR_NAME);
    }

    dirs::data_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(APP_DIR_NAME)
}

/// Get the logs directory path.
/// Returns `{storage_dir}/logs`.
pub fn get_log_dir() -> PathBuf {
    get_storage_dir().join("logs")
}

/// Get the default directory for finished recordings.
pub fn get_recordings_dir() -> PathBuf {
    get_storage_dir().join("recordings")
}

/// Ensure a directory exists, creating it if necessary.
pub fn ensure_dir(path: &Path) -> std::io::Result<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }
    Ok(())
}

/// File name for a recording started at `now`, e.g. `2026-10-19-14-03-27.avi`.
pub fn recording_file_name(now: DateTime<Local>) -> String {
    format!("{}.avi", now.format("%Y-%m-%d-%H-%M-%S"))
}

/// Path of the side file that accumulates index records while `output` is open.
pub fn temp_index_path(output: &Path) -> PathBuf {
    let mut name = output.as_os_str().to_owned();
    name.push(".idx.tmp");
    PathBuf::from(name)
}
