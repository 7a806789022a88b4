//! Conversion error types

use std::path::PathBuf;

use thiserror::Error;

use super::Stage;
use crate::epub::EpubError;
use crate::library::ArtifactError;

/// Fatal conversion failure; no artifact is produced
#[derive(Debug, Error)]
pub enum ConvertError {
    /// Source path does not exist
    #[error("EPUB file not found: {0}")]
    SourceNotFound(PathBuf),

    /// Source path is a directory or special file
    #[error("Path is not a file: {0}")]
    NotAFile(PathBuf),

    /// Source file has zero length
    #[error("EPUB file is empty: {0}")]
    EmptySource(PathBuf),

    /// Source metadata could not be read
    #[error("Failed to read {path}: {source}")]
    SourceIo {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Archive or package document unreadable
    #[error("Invalid or corrupted EPUB file: {0}")]
    InvalidContainer(#[from] EpubError),

    /// Destination could not be cleared or created
    #[error("Failed to prepare output directory {path}: {source}")]
    Output {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Every spine document was skipped
    #[error("No sections could be processed from {0}")]
    NoContent(String),

    /// Artifact could not be written or published
    #[error("Failed to store artifact: {0}")]
    Artifact(#[from] ArtifactError),
}

/// Coarse classification for callers reporting failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    SourceUnreadable,
    NoContent,
    Storage,
}

impl ConvertError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::SourceNotFound(_)
            | Self::NotAFile(_)
            | Self::EmptySource(_)
            | Self::SourceIo { .. }
            | Self::InvalidContainer(_) => ErrorKind::SourceUnreadable,
            Self::NoContent(_) => ErrorKind::NoContent,
            Self::Output { .. } | Self::Artifact(_) => ErrorKind::Storage,
        }
    }

    /// Pipeline stage the failure happened in
    pub fn stage(&self) -> Stage {
        match self {
            Self::SourceNotFound(_)
            | Self::NotAFile(_)
            | Self::EmptySource(_)
            | Self::SourceIo { .. } => Stage::ValidatingInput,
            Self::InvalidContainer(_) => Stage::LoadingContainer,
            Self::Output { .. } => Stage::PreparingOutput,
            Self::NoContent(_) => Stage::SanitizingContent,
            Self::Artifact(_) => Stage::Publishing,
        }
    }
}
