//! Artifact persistence
//!
//! `book.json` is written through a temporary file and a rename; whole
//! artifact directories are swapped into place with [`publish_directory`].

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::document::Document;

/// Serialized document inside an artifact directory
pub const ARTIFACT_FILE: &str = "book.json";

#[derive(Debug, Error)]
pub enum ArtifactError {
    /// No `book.json` in the directory
    #[error("Artifact not found: {0}")]
    NotFound(PathBuf),

    /// `book.json` exists but does not deserialize
    #[error("Corrupt artifact {path}: {message}")]
    Corrupt { path: PathBuf, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Write `book.json` into `dir`, replacing any previous copy
pub fn save_artifact(dir: &Path, document: &Document) -> Result<PathBuf, ArtifactError> {
    let path = dir.join(ARTIFACT_FILE);
    let tmp = dir.join(format!("{}.tmp", ARTIFACT_FILE));

    let json = serde_json::to_vec(document)?;
    std::fs::write(&tmp, json)?;
    std::fs::rename(&tmp, &path)?;

    tracing::debug!(path = %path.display(), "Saved artifact");
    Ok(path)
}

/// Read `book.json` from `dir`
pub fn load_artifact(dir: &Path) -> Result<Document, ArtifactError> {
    let path = dir.join(ARTIFACT_FILE);
    let bytes = match std::fs::read(&path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ArtifactError::NotFound(path));
        }
        Err(e) => return Err(e.into()),
    };

    serde_json::from_slice(&bytes).map_err(|e| ArtifactError::Corrupt {
        path,
        message: e.to_string(),
    })
}

/// Move a finished `staging` directory to `destination`
///
/// An existing destination is renamed aside first and removed afterwards,
/// so the destination path always holds a complete artifact.
pub fn publish_directory(staging: &Path, destination: &Path) -> Result<(), ArtifactError> {
    if let Some(parent) = destination.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    if !destination.exists() {
        std::fs::rename(staging, destination)?;
        return Ok(());
    }

    let retired = sibling(destination, "old");
    if retired.exists() {
        std::fs::remove_dir_all(&retired)?;
    }
    std::fs::rename(destination, &retired)?;

    if let Err(e) = std::fs::rename(staging, destination) {
        // Put the previous artifact back before reporting
        if let Err(restore) = std::fs::rename(&retired, destination) {
            tracing::error!(path = %destination.display(), error = %restore, "Failed to restore previous artifact");
        }
        return Err(e.into());
    }

    if let Err(e) = std::fs::remove_dir_all(&retired) {
        tracing::warn!(path = %retired.display(), error = %e, "Failed to remove previous artifact");
    }
    Ok(())
}

fn sibling(path: &Path, tag: &str) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{}.{}", name, tag))
}
