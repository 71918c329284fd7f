//! Saving the arrangement made during a session.
//!
//! The exported records of every changed window are written as one JSON
//! array to `<data dir>/rearrange/arrangement.json`.  Writes go to a
//! temporary file in the same directory first and are renamed into place, so
//! a reader never observes a half-written file.

use crate::collection::ExportRecord;
use log::info;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Directory and socket name component.
pub const APP_NAME: &str = "rearrange";

/// File name of the saved arrangement.
pub const ARRANGEMENT_FILE: &str = "arrangement.json";

/// Errors from saving or loading an arrangement.
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("no per-user data directory on this system")]
    NoDataDir,
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> PersistError + '_ {
    move |source| PersistError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Per-user data directory of the application
/// (`$XDG_DATA_HOME/rearrange`, `%APPDATA%\rearrange`,
/// `~/Library/Application Support/rearrange`).
pub fn data_dir() -> Result<PathBuf, PersistError> {
    dirs::data_dir()
        .map(|d| d.join(APP_NAME))
        .ok_or(PersistError::NoDataDir)
}

/// Write `records` to `dir/arrangement.json`, creating `dir` if needed.
/// Returns the path written.
pub fn save(records: &[ExportRecord], dir: &Path) -> Result<PathBuf, PersistError> {
    fs::create_dir_all(dir).map_err(io_error(dir))?;
    let target = dir.join(ARRANGEMENT_FILE);
    let staging = dir.join(format!(".{}.{}.tmp", ARRANGEMENT_FILE, std::process::id()));

    let json = serde_json::to_vec_pretty(records)?;
    let written = fs::File::create(&staging).and_then(|mut file| {
        file.write_all(&json)?;
        file.write_all(b"\n")?;
        file.sync_all()
    });
    if let Err(e) = written {
        let _ = fs::remove_file(&staging);
        return Err(io_error(&staging)(e));
    }
    if let Err(e) = fs::rename(&staging, &target) {
        let _ = fs::remove_file(&staging);
        return Err(io_error(&target)(e));
    }

    info!("saved {} window(s) to {}", records.len(), target.display());
    Ok(target)
}

/// Read an arrangement written by [`save`].
pub fn load(path: &Path) -> Result<Vec<ExportRecord>, PersistError> {
    let contents = fs::read_to_string(path).map_err(io_error(path))?;
    Ok(serde_json::from_str(&contents)?)
}
