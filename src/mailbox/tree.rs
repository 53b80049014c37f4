//! Thin filesystem collaborator used by the scanner, delivery and config
//! bootstrap. Failures carry the path they happened on; callers log and
//! abandon the operation, the daemon keeps running.

use std::path::{Path, PathBuf};

use crate::error::DispatchError;

fn fs_err(path: &Path, source: std::io::Error) -> DispatchError {
    DispatchError::Filesystem {
        path: path.to_path_buf(),
        source,
    }
}

/// Create-if-absent, including parents.
pub async fn ensure_dir(path: &Path) -> Result<(), DispatchError> {
    tokio::fs::create_dir_all(path)
        .await
        .map_err(|e| fs_err(path, e))
}

pub async fn read_file(path: &Path) -> Result<Vec<u8>, DispatchError> {
    tokio::fs::read(path).await.map_err(|e| fs_err(path, e))
}

pub async fn read_text(path: &Path) -> Result<String, DispatchError> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|e| fs_err(path, e))
}

pub async fn write_file(path: &Path, content: &[u8]) -> Result<(), DispatchError> {
    tokio::fs::write(path, content)
        .await
        .map_err(|e| fs_err(path, e))
}

pub async fn exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}

/// Immediate children of a directory, `.`/`..` excluded, each flagged as
/// directory or not. Symlinks count as non-directories so traversal cannot
/// loop.
pub async fn list_entries(path: &Path) -> Result<Vec<(PathBuf, bool)>, DispatchError> {
    let mut entries = Vec::new();
    let mut reader = tokio::fs::read_dir(path).await.map_err(|e| fs_err(path, e))?;
    while let Some(entry) = reader.next_entry().await.map_err(|e| fs_err(path, e))? {
        let file_type = entry.file_type().await.map_err(|e| fs_err(path, e))?;
        entries.push((entry.path(), file_type.is_dir()));
    }
    entries.sort();
    Ok(entries)
}
