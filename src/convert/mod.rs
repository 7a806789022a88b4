//! EPUB → reading artifact conversion
//!
//! [`Converter::assemble`] runs the pipeline into a destination directory and
//! returns the assembled [`Document`]. [`Converter::convert`] additionally
//! persists `book.json` and publishes the result atomically.
//!
//! # Failure policy
//!
//! Only an unreadable source, an unreadable container, an unusable output
//! directory, or a book with zero readable sections abort the run. Metadata,
//! navigation and asset problems degrade to documented fallbacks which are
//! recorded in the [`ConversionReport`].

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Serialize;

mod assets;
mod content;
mod error;
mod metadata;
mod navigation;

pub use assets::{
    content_hash, extract_assets, sanitize_filename, AssetWriter, DEFAULT_MAX_FILENAME_LEN,
    IMAGES_DIR,
};
pub use content::{sanitize_section, SanitizedSection, SectionSource};
pub use error::{ConvertError, ErrorKind};
pub use metadata::extract_metadata;
pub use navigation::{build_navigation, fallback_toc, normalize, title_from_filename, MAX_TOC_DEPTH};

use crate::document::{Document, ARTIFACT_VERSION};
use crate::epub::{EpubArchive, ItemKind};
use crate::library::{publish_directory, save_artifact};

/// Default size above which a source only triggers a warning
pub const DEFAULT_SIZE_WARNING_BYTES: u64 = 500 * 1024 * 1024;

/// Pipeline states, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    ValidatingInput,
    LoadingContainer,
    ExtractingMetadata,
    PreparingOutput,
    ExtractingAssets,
    NormalizingNavigation,
    SanitizingContent,
    Assembled,
    /// Writing `book.json` and swapping the artifact into place
    Publishing,
    Failed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ValidatingInput => "validating input",
            Self::LoadingContainer => "loading container",
            Self::ExtractingMetadata => "extracting metadata",
            Self::PreparingOutput => "preparing output location",
            Self::ExtractingAssets => "extracting assets",
            Self::NormalizingNavigation => "normalizing navigation",
            Self::SanitizingContent => "sanitizing content",
            Self::Assembled => "assembled",
            Self::Publishing => "publishing",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Outcome of a non-fatal pipeline step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step<T> {
    Complete(T),
    Fallback { value: T, reason: String },
}

impl<T> Step<T> {
    pub fn into_value(self) -> T {
        match self {
            Self::Complete(value) | Self::Fallback { value, .. } => value,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::Fallback { .. })
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Complete(_) => None,
            Self::Fallback { reason, .. } => Some(reason),
        }
    }
}

/// What happened during a conversion besides the result itself
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConversionReport {
    pub warnings: Vec<String>,
    /// `"<stage>: <reason>"` for every step that used its fallback
    pub fallbacks: Vec<String>,
    pub sections_skipped: usize,
    pub assets_extracted: usize,
    pub assets_failed: usize,
    pub unresolved_asset_refs: usize,
}

impl ConversionReport {
    pub fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    /// Unwrap a step, logging and recording its fallback
    fn settle<T>(&mut self, stage: Stage, step: Step<T>) -> T {
        if let Some(reason) = step.reason() {
            tracing::warn!(stage = %stage, reason = %reason, "Using fallback");
            self.fallbacks.push(format!("{}: {}", stage, reason));
        }
        step.into_value()
    }
}

/// An assembled document and its report
#[derive(Debug, Clone)]
pub struct Conversion {
    pub document: Document,
    pub report: ConversionReport,
}

/// Converter tuning
#[derive(Debug, Clone)]
pub struct ConverterOptions {
    /// Sources larger than this are converted with a warning
    pub size_warning_bytes: u64,
    /// Cap on persisted asset filename length
    pub max_filename_len: usize,
}

impl Default for ConverterOptions {
    fn default() -> Self {
        Self {
            size_warning_bytes: DEFAULT_SIZE_WARNING_BYTES,
            max_filename_len: DEFAULT_MAX_FILENAME_LEN,
        }
    }
}

/// EPUB conversion pipeline
#[derive(Debug, Clone, Default)]
pub struct Converter {
    options: ConverterOptions,
}

impl Converter {
    pub fn new(options: ConverterOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &ConverterOptions {
        &self.options
    }

    /// Convert `source` and publish the artifact at `destination`
    ///
    /// The pipeline runs in a hidden sibling staging directory; readers of
    /// `destination` see either the previous artifact or the new one.
    pub fn convert(&self, source: &Path, destination: &Path) -> Result<Conversion, ConvertError> {
        let staging = staging_path(destination).ok_or_else(|| ConvertError::Output {
            path: destination.to_path_buf(),
            source: std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "destination has no directory name",
            ),
        })?;

        let result = self.assemble(source, &staging).and_then(|conversion| {
            enter(Stage::Publishing);
            save_artifact(&staging, &conversion.document)?;
            publish_directory(&staging, destination)?;
            Ok(conversion)
        });

        match result {
            Ok(conversion) => {
                tracing::info!(
                    destination = %destination.display(),
                    sections = conversion.document.spine.len(),
                    "Published artifact"
                );
                Ok(conversion)
            }
            Err(e) => {
                if staging.exists() {
                    if let Err(cleanup) = std::fs::remove_dir_all(&staging) {
                        tracing::warn!(path = %staging.display(), error = %cleanup, "Failed to remove staging directory");
                    }
                }
                Err(e)
            }
        }
    }

    /// Run the pipeline, writing assets under `output_dir`
    ///
    /// `output_dir` is cleared and recreated. The document is returned, not
    /// persisted.
    pub fn assemble(&self, source: &Path, output_dir: &Path) -> Result<Conversion, ConvertError> {
        let result = self.run(source, output_dir);
        match &result {
            Ok(_) => enter(Stage::Assembled),
            Err(e) => {
                tracing::error!(stage = %e.stage(), source = %source.display(), error = %e, "Conversion failed");
                enter(Stage::Failed);
            }
        }
        result
    }

    fn run(&self, source: &Path, output_dir: &Path) -> Result<Conversion, ConvertError> {
        let mut report = ConversionReport::default();

        enter(Stage::ValidatingInput);
        let size = self.validate_input(source, &mut report)?;
        let source_file = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let source_stem = source
            .file_stem()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| source_file.clone());

        enter(Stage::LoadingContainer);
        tracing::info!(source = %source.display(), bytes = size, "Loading EPUB");
        let mut archive = EpubArchive::open(source)?;
        let package = archive.package().clone();

        enter(Stage::ExtractingMetadata);
        let metadata = report.settle(
            Stage::ExtractingMetadata,
            extract_metadata(package.metadata.as_ref(), &source_stem),
        );
        tracing::info!(title = %metadata.title, "Extracted metadata");

        enter(Stage::PreparingOutput);
        let images_dir = prepare_output(output_dir)?;

        enter(Stage::ExtractingAssets);
        let images = extract_assets(
            &mut archive,
            &images_dir,
            self.options.max_filename_len,
            &mut report,
        );

        enter(Stage::NormalizingNavigation);
        let navigation = build_navigation(archive.navigation(), &package, &mut report);
        let toc = report.settle(Stage::NormalizingNavigation, navigation);
        tracing::info!(entries = toc.len(), "Built table of contents");

        enter(Stage::SanitizingContent);
        let mut spine = Vec::new();
        for spine_ref in &package.spine {
            let Some(item) = package.item(&spine_ref.idref) else {
                tracing::warn!(idref = %spine_ref.idref, "Spine item not in manifest, skipping");
                report.sections_skipped += 1;
                continue;
            };
            if item.kind() != ItemKind::Document {
                tracing::debug!(href = %item.href, media_type = %item.media_type, "Spine item is not a content document, skipping");
                report.sections_skipped += 1;
                continue;
            }

            let raw = match archive.read_item(item) {
                Ok(raw) => raw,
                Err(e) => {
                    tracing::warn!(href = %item.href, error = %e, "Failed to read spine document, skipping");
                    report.warn(format!("section {} unreadable: {}", item.href, e));
                    report.sections_skipped += 1;
                    continue;
                }
            };

            let source = SectionSource {
                id: &item.id,
                href: &item.href,
                order: spine.len(),
            };
            let sanitized = sanitize_section(source, &raw, &images);
            report.unresolved_asset_refs += sanitized.unresolved.len();
            for reason in sanitized.degraded {
                report.warn(format!("section {}: {}", item.href, reason));
            }
            spine.push(sanitized.section);
        }

        tracing::info!(
            sections = spine.len(),
            skipped = report.sections_skipped,
            "Processed sections"
        );
        if spine.is_empty() {
            return Err(ConvertError::NoContent(source_file));
        }

        Ok(Conversion {
            document: Document {
                metadata,
                spine,
                toc,
                images,
                source_file,
                processed_at: Utc::now(),
                version: ARTIFACT_VERSION.to_string(),
            },
            report,
        })
    }

    /// Check the source exists, is a non-empty regular file; returns its size
    fn validate_input(&self, source: &Path, report: &mut ConversionReport) -> Result<u64, ConvertError> {
        let meta = match std::fs::metadata(source) {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ConvertError::SourceNotFound(source.to_path_buf()))
            }
            Err(e) => {
                return Err(ConvertError::SourceIo {
                    path: source.to_path_buf(),
                    source: e,
                })
            }
        };

        if !meta.is_file() {
            return Err(ConvertError::NotAFile(source.to_path_buf()));
        }
        if meta.len() == 0 {
            return Err(ConvertError::EmptySource(source.to_path_buf()));
        }
        if meta.len() > self.options.size_warning_bytes {
            let megabytes = meta.len() as f64 / 1024.0 / 1024.0;
            tracing::warn!(size_mb = megabytes, "Large EPUB file");
            report.warn(format!("large source file: {:.2}MB", megabytes));
        }
        Ok(meta.len())
    }
}

fn enter(stage: Stage) {
    tracing::debug!(stage = %stage, "Conversion stage");
}

/// Clear and recreate the output directory; returns the images directory
fn prepare_output(output_dir: &Path) -> Result<PathBuf, ConvertError> {
    let output_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source| ConvertError::Output { path, source }
    };

    if output_dir.exists() {
        tracing::info!(path = %output_dir.display(), "Removing existing output directory");
        std::fs::remove_dir_all(output_dir).map_err(output_err(output_dir))?;
    }

    let images_dir = output_dir.join(IMAGES_DIR);
    std::fs::create_dir_all(&images_dir).map_err(output_err(&images_dir))?;
    Ok(images_dir)
}

/// `<parent>/.<name>.staging` for a destination directory
fn staging_path(destination: &Path) -> Option<PathBuf> {
    let name = destination.file_name()?.to_string_lossy();
    let parent = destination.parent().unwrap_or_else(|| Path::new(""));
    Some(parent.join(format!(".{}.staging", name)))
}
