//! Asset extraction
//!
//! Persists image entries under `images/` with filesystem-safe, collision-free
//! names and records where each one ended up.

use std::collections::HashSet;
use std::io::{Read, Seek};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use super::ConversionReport;
use crate::document::{AssetTable, Registration};
use crate::epub::path::file_name;
use crate::epub::{EpubArchive, ItemKind, ManifestItem};

/// Subdirectory of the artifact holding extracted assets
pub const IMAGES_DIR: &str = "images";

/// Default cap on persisted filename length
pub const DEFAULT_MAX_FILENAME_LEN: usize = 200;

/// Hex characters of the content hash used to disambiguate names
const HASH_SUFFIX_LEN: usize = 8;

const PLACEHOLDER_NAME: &str = "unnamed";

/// Reduce a filename to `[A-Za-z0-9._-]`, capped at `max_len` bytes
///
/// The extension survives truncation; the stem is shortened instead.
pub fn sanitize_filename(name: &str, max_len: usize) -> String {
    let replaced: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();

    let trimmed = replaced.trim_matches(|c| c == '.' || c == ' ');
    let name = if trimmed.is_empty() {
        PLACEHOLDER_NAME
    } else {
        trimmed
    };

    fit_length(name, "", max_len)
}

/// First characters of the SHA-256 digest of `data`
pub fn content_hash(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let mut digest = hex::encode(hasher.finalize());
    digest.truncate(HASH_SUFFIX_LEN);
    digest
}

fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(idx) if idx > 0 => name.split_at(idx),
        _ => (name, ""),
    }
}

/// `stem + suffix + ext`, shortening the stem to stay within `max_len`
///
/// Names reaching here are ASCII, so byte slicing is safe.
fn fit_length(name: &str, suffix: &str, max_len: usize) -> String {
    let (stem, ext) = split_extension(name);
    let budget = max_len.saturating_sub(ext.len() + suffix.len());
    let stem = &stem[..stem.len().min(budget)];
    format!("{}{}{}", stem, suffix, ext)
}

/// Writes assets into the images directory, tracking names already used
pub struct AssetWriter {
    images_dir: PathBuf,
    max_len: usize,
    /// Lower-cased so case-insensitive filesystems never see a clash
    used: HashSet<String>,
}

impl AssetWriter {
    pub fn new(images_dir: impl Into<PathBuf>, max_len: usize) -> Self {
        Self {
            images_dir: images_dir.into(),
            max_len,
            used: HashSet::new(),
        }
    }

    /// Persist one asset and return its final filename
    pub fn write(&mut self, original_href: &str, data: &[u8]) -> std::io::Result<String> {
        let base = sanitize_filename(file_name(original_href), self.max_len);

        let name = if self.is_used(&base) {
            let suffix = format!("_{}", content_hash(data));
            let disambiguated = fit_length(&base, &suffix, self.max_len);
            if self.is_used(&disambiguated) {
                // Same name and same content hash: the bytes are already on disk
                tracing::debug!(href = %original_href, name = %disambiguated, "Reusing identical asset");
                return Ok(disambiguated);
            }
            disambiguated
        } else {
            base
        };

        std::fs::write(self.images_dir.join(&name), data)?;
        self.used.insert(name.to_ascii_lowercase());
        Ok(name)
    }

    fn is_used(&self, name: &str) -> bool {
        self.used.contains(&name.to_ascii_lowercase())
    }
}

/// Extract every image item into `images_dir`
///
/// Unreadable entries and write failures are logged and skipped.
pub fn extract_assets<R: Read + Seek>(
    archive: &mut EpubArchive<R>,
    images_dir: &Path,
    max_len: usize,
    report: &mut ConversionReport,
) -> AssetTable {
    let images: Vec<ManifestItem> = archive
        .package()
        .items()
        .filter(|item| item.kind() == ItemKind::Image)
        .cloned()
        .collect();

    let mut writer = AssetWriter::new(images_dir, max_len);
    let mut table = AssetTable::new();

    for item in &images {
        let data = match archive.read_item(item) {
            Ok(data) => data,
            Err(e) => {
                tracing::warn!(href = %item.href, error = %e, "Failed to read image, skipping");
                report.warn(format!("image {} unreadable: {}", item.href, e));
                report.assets_failed += 1;
                continue;
            }
        };

        let name = match writer.write(&item.href, &data) {
            Ok(name) => name,
            Err(e) => {
                tracing::warn!(href = %item.href, error = %e, "Failed to write image, skipping");
                report.warn(format!("image {} not written: {}", item.href, e));
                report.assets_failed += 1;
                continue;
            }
        };

        let local_path = format!("{}/{}", IMAGES_DIR, name);
        if table.register(&item.href, &local_path) == Registration::FullPathOnly {
            tracing::warn!(
                href = %item.href,
                local = %local_path,
                "Bare filename already maps to another image; reachable by full path only"
            );
            report.warn(format!(
                "image {} shares its filename with an earlier image",
                item.href
            ));
        }
        report.assets_extracted += 1;
    }

    tracing::info!(
        extracted = report.assets_extracted,
        failed = report.assets_failed,
        "Extracted images"
    );
    table
}
