//! Small JSON document stores.
//!
//! Each store is a single pretty-printed JSON file, rewritten in full on
//! every mutation. Writes go to a unique temp file in the same directory
//! and are renamed into place; on Unix the file mode is restricted to the
//! owner before the rename.

use std::path::Path;

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("serialize error for {path}: {message}")]
    Serialize { path: String, message: String },
    #[error("write error for {path}: {message}")]
    Write { path: String, message: String },
}

/// Load a JSON document, treating a missing or unreadable file as absent.
///
/// A corrupt file is logged and treated as absent rather than aborting
/// startup; the next successful mutation rewrites it.
pub fn load_json<T: DeserializeOwned>(path: &Path) -> Option<T> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(error) => {
            if error.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(error = %error, path = %path.display(), "store file unreadable, starting empty");
            }
            return None;
        }
    };
    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(error) => {
            tracing::warn!(error = %error, path = %path.display(), "store file corrupt, starting empty");
            None
        }
    }
}

/// Atomically replace `path` with the pretty-printed JSON form of `value`.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), PersistError> {
    let content = serde_json::to_string_pretty(value).map_err(|error| PersistError::Serialize {
        path: path.display().to_string(),
        message: error.to_string(),
    })?;

    let write_error = |error: std::io::Error| PersistError::Write {
        path: path.display().to_string(),
        message: error.to_string(),
    };

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(write_error)?;
    }

    // Temp file in the same directory keeps the rename atomic.
    let temp_path = path.with_extension(format!("tmp.{}", uuid::Uuid::new_v4().simple()));
    std::fs::write(&temp_path, &content).map_err(write_error)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;

        let _ = std::fs::set_permissions(&temp_path, std::fs::Permissions::from_mode(0o600));
    }

    #[cfg(windows)]
    {
        // Windows does not rename over an existing file.
        if path.exists() {
            std::fs::remove_file(path).map_err(write_error)?;
        }
    }

    std::fs::rename(&temp_path, path).map_err(write_error)
}
