//! Library service
//!
//! The boundary between stored artifacts and whatever serves them: validates
//! book ids, loads documents through the [`ArtifactCache`], pages through
//! sections, serves images, and imports or deletes books.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

mod artifact;
mod cache;

pub use artifact::{load_artifact, publish_directory, save_artifact, ArtifactError, ARTIFACT_FILE};
pub use cache::{ArtifactCache, CacheStats};

use crate::config::Config;
use crate::convert::{ConversionReport, ConvertError, Converter, IMAGES_DIR};
use crate::document::{Document, Section};

/// Suffix every book id carries
pub const BOOK_ID_SUFFIX: &str = "_data";
/// Longest accepted book id, in bytes
pub const MAX_BOOK_ID_LEN: usize = 255;
/// Largest section index accepted before looking at the book
pub const MAX_SECTION_INDEX: usize = 10_000;

#[derive(Debug, Error)]
pub enum LibraryError {
    #[error("Invalid book identifier: {0}")]
    InvalidId(String),

    #[error("Book not found: {0}")]
    NotFound(String),

    #[error("Corrupt book {id}: {message}")]
    Corrupt { id: String, message: String },

    #[error("Invalid section index: {0}")]
    InvalidIndex(usize),

    #[error("Section {index} not found in {id}")]
    SectionNotFound { id: String, index: usize },

    #[error("Invalid asset name: {0}")]
    InvalidAssetName(String),

    #[error("Asset not found: {0}")]
    AssetNotFound(String),

    #[error("Access denied: {0}")]
    Forbidden(String),

    #[error("Conversion failed: {0}")]
    Conversion(#[from] ConvertError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Background task failed: {0}")]
    Task(String),
}

/// Check a book id is safe to turn into a path
pub fn validate_book_id(id: &str) -> Result<(), LibraryError> {
    let valid = !id.is_empty()
        && id.len() <= MAX_BOOK_ID_LEN
        && id.ends_with(BOOK_ID_SUFFIX)
        && !id.contains("..")
        && !id.contains('/')
        && !id.contains('\\');

    if valid {
        Ok(())
    } else {
        tracing::warn!(book_id = %id, "Rejected book id");
        Err(LibraryError::InvalidId(id.to_string()))
    }
}

/// A section with pagination context
#[derive(Debug, Clone, Serialize)]
pub struct SectionView {
    pub section: Section,
    pub index: usize,
    pub prev: Option<usize>,
    pub next: Option<usize>,
    pub total: usize,
}

/// Image bytes with their content type
#[derive(Debug, Clone)]
pub struct Asset {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

/// One row of the library listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BookSummary {
    pub id: String,
    pub title: String,
    pub author: String,
    pub chapters: usize,
}

/// Result of importing a book
#[derive(Debug, Clone)]
pub struct Imported {
    pub id: String,
    pub report: ConversionReport,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HealthStatus {
    pub books_dir_accessible: bool,
    pub cache: CacheStats,
}

/// Shared library handle
#[derive(Clone)]
pub struct Library {
    inner: Arc<LibraryInner>,
}

struct LibraryInner {
    books_dir: PathBuf,
    cache: ArtifactCache,
    converter: Converter,
}

impl Library {
    pub fn new(config: &Config) -> Self {
        Self::with_converter(
            &config.books_dir,
            config.cache_size,
            Converter::new(config.converter_options()),
        )
    }

    pub fn with_converter(books_dir: impl Into<PathBuf>, cache_size: usize, converter: Converter) -> Self {
        Self {
            inner: Arc::new(LibraryInner {
                books_dir: books_dir.into(),
                cache: ArtifactCache::new(cache_size),
                converter,
            }),
        }
    }

    pub fn books_dir(&self) -> &Path {
        &self.inner.books_dir
    }

    pub fn cache(&self) -> &ArtifactCache {
        &self.inner.cache
    }

    /// Load a book's document
    pub async fn document(&self, id: &str) -> Result<Arc<Document>, LibraryError> {
        validate_book_id(id)?;
        let dir = self.inner.books_dir.join(id);
        let book_id = id.to_string();

        self.inner
            .cache
            .get_or_load(id, || async move {
                let loaded = match tokio::task::spawn_blocking(move || load_artifact(&dir)).await {
                    Ok(loaded) => loaded,
                    Err(e) => return Err(LibraryError::Task(e.to_string())),
                };

                match loaded {
                    Ok(document) => {
                        tracing::info!(book_id = %book_id, "Loaded book");
                        Ok(document)
                    }
                    Err(ArtifactError::NotFound(_)) => Err(LibraryError::NotFound(book_id)),
                    Err(e) => {
                        tracing::error!(book_id = %book_id, error = %e, "Failed to load book");
                        Err(LibraryError::Corrupt {
                            id: book_id,
                            message: e.to_string(),
                        })
                    }
                }
            })
            .await
    }

    /// One section plus previous/next indices
    pub async fn section(&self, id: &str, index: usize) -> Result<SectionView, LibraryError> {
        validate_book_id(id)?;
        if index > MAX_SECTION_INDEX {
            return Err(LibraryError::InvalidIndex(index));
        }

        let document = self.document(id).await?;
        let total = document.section_count();
        let section = document
            .section(index)
            .cloned()
            .ok_or_else(|| LibraryError::SectionNotFound {
                id: id.to_string(),
                index,
            })?;

        Ok(SectionView {
            section,
            index,
            prev: index.checked_sub(1),
            next: (index + 1 < total).then_some(index + 1),
            total,
        })
    }

    /// Read an extracted image
    pub async fn asset(&self, id: &str, name: &str) -> Result<Asset, LibraryError> {
        validate_book_id(id)?;

        let safe_name = name.rsplit(['/', '\\']).next().unwrap_or(name);
        if safe_name.is_empty() || safe_name == "." || safe_name.contains("..") {
            tracing::warn!(book_id = %id, name = %name, "Rejected asset name");
            return Err(LibraryError::InvalidAssetName(name.to_string()));
        }

        let images_dir = self.inner.books_dir.join(id).join(IMAGES_DIR);
        let path = images_dir.join(safe_name);

        let allowed = match tokio::fs::canonicalize(&images_dir).await {
            Ok(dir) => dir,
            Err(_) => return Err(LibraryError::AssetNotFound(safe_name.to_string())),
        };
        let resolved = match tokio::fs::canonicalize(&path).await {
            Ok(resolved) => resolved,
            Err(_) => return Err(LibraryError::AssetNotFound(safe_name.to_string())),
        };
        if !resolved.starts_with(&allowed) {
            tracing::warn!(book_id = %id, path = %resolved.display(), "Asset outside images directory");
            return Err(LibraryError::Forbidden(safe_name.to_string()));
        }

        let meta = tokio::fs::metadata(&resolved).await?;
        if !meta.is_file() {
            return Err(LibraryError::Forbidden(safe_name.to_string()));
        }

        let content_type = mime_guess::from_path(&resolved)
            .first()
            .filter(|mime| mime.type_() == mime_guess::mime::IMAGE)
            .ok_or_else(|| {
                tracing::warn!(book_id = %id, name = %safe_name, "Refusing to serve non-image file");
                LibraryError::Forbidden(safe_name.to_string())
            })?;

        let bytes = tokio::fs::read(&resolved).await?;
        Ok(Asset {
            bytes,
            content_type: content_type.essence_str().to_string(),
        })
    }

    /// Every readable book, sorted by title
    pub async fn list(&self) -> Result<Vec<BookSummary>, LibraryError> {
        let mut entries = tokio::fs::read_dir(&self.inner.books_dir).await?;
        let mut books = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let Ok(id) = entry.file_name().into_string() else {
                continue;
            };
            if validate_book_id(&id).is_err() || !entry.path().join(ARTIFACT_FILE).is_file() {
                continue;
            }

            match self.document(&id).await {
                Ok(document) => books.push(BookSummary {
                    title: document.metadata.title.clone(),
                    author: document.metadata.author_line(),
                    chapters: document.section_count(),
                    id,
                }),
                Err(e) => tracing::warn!(book_id = %id, error = %e, "Skipping unreadable book"),
            }
        }

        books.sort_by_key(|book| book.title.to_lowercase());
        tracing::info!(count = books.len(), "Listed library");
        Ok(books)
    }

    /// Convert an EPUB into `<books_dir>/<stem>_data`
    pub async fn import(&self, source: &Path) -> Result<Imported, LibraryError> {
        let stem = source
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let id = format!("{}{}", stem, BOOK_ID_SUFFIX);
        validate_book_id(&id)?;

        let destination = self.inner.books_dir.join(&id);
        let converter = self.inner.converter.clone();
        let source = source.to_path_buf();

        let conversion = tokio::task::spawn_blocking(move || converter.convert(&source, &destination))
            .await
            .map_err(|e| LibraryError::Task(e.to_string()))?;

        // Invalidate even on failure: the old directory may have been replaced
        self.inner.cache.invalidate(&id);
        let conversion = conversion?;

        tracing::info!(book_id = %id, title = %conversion.document.metadata.title, "Imported book");
        Ok(Imported {
            id,
            report: conversion.report,
        })
    }

    /// Remove a book's artifact directory
    pub async fn delete(&self, id: &str) -> Result<(), LibraryError> {
        validate_book_id(id)?;
        let dir = self.inner.books_dir.join(id);

        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                self.inner.cache.invalidate(id);
                return Err(LibraryError::NotFound(id.to_string()));
            }
            Err(e) => return Err(e.into()),
        }

        self.inner.cache.invalidate(id);
        tracing::info!(book_id = %id, "Deleted book");
        Ok(())
    }

    pub async fn health(&self) -> HealthStatus {
        let books_dir_accessible = tokio::fs::read_dir(&self.inner.books_dir).await.is_ok();
        HealthStatus {
            books_dir_accessible,
            cache: self.inner.cache.stats(),
        }
    }
}
