//! EPUB container access
//!
//! Opens the zip container, locates the package document through
//! `META-INF/container.xml`, and exposes the manifest, spine, descriptive
//! metadata and raw navigation structure to the conversion pipeline.

use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;

use thiserror::Error;
use zip::ZipArchive;

mod nav;
mod opf;
pub mod path;

pub use nav::RawNavEntry;
pub use opf::{ItemKind, ManifestItem, MetadataStore, Package, SpineRef};

const CONTAINER_PATH: &str = "META-INF/container.xml";

#[derive(Error, Debug)]
pub enum EpubError {
    #[error("Failed to read ZIP archive: {0}")]
    ZipError(#[from] zip::result::ZipError),

    #[error("Failed to read file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid EPUB: {0}")]
    InvalidEpub(String),

    #[error("XML parse error in {path}: {message}")]
    XmlError { path: String, message: String },

    #[error("Resource not found: {0}")]
    ResourceNotFound(String),
}

/// An opened EPUB container
pub struct EpubArchive<R: Read + Seek> {
    zip: ZipArchive<R>,
    package: Package,
}

impl EpubArchive<BufReader<File>> {
    /// Open an EPUB from a file path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, EpubError> {
        let file = File::open(path.as_ref())?;
        Self::from_reader(BufReader::new(file))
    }
}

impl<R: Read + Seek> EpubArchive<R> {
    /// Open an EPUB from any seekable reader
    pub fn from_reader(reader: R) -> Result<Self, EpubError> {
        let mut zip = ZipArchive::new(reader)?;

        let container = read_entry(&mut zip, CONTAINER_PATH)?;
        let opf_path = find_opf_path(&decode_text(&container))?;
        let opf = read_entry(&mut zip, &opf_path)?;
        let package = opf::parse_package(&opf_path, &decode_text(&opf))?;

        tracing::debug!(
            opf = %opf_path,
            manifest = package.manifest.len(),
            spine = package.spine.len(),
            "Opened EPUB package"
        );

        Ok(Self { zip, package })
    }

    /// Parsed package document
    pub fn package(&self) -> &Package {
        &self.package
    }

    /// Read the raw bytes of a manifest item
    pub fn read_item(&mut self, item: &ManifestItem) -> Result<Vec<u8>, EpubError> {
        match read_entry(&mut self.zip, &item.path) {
            Err(EpubError::ZipError(zip::result::ZipError::FileNotFound)) => {
                Err(EpubError::ResourceNotFound(item.path.clone()))
            }
            other => other,
        }
    }

    /// Read the raw navigation structure
    ///
    /// The EPUB 3 navigation document is preferred, the NCX is tried next.
    /// Returns `Ok(None)` when the package declares no navigation at all.
    pub fn navigation(&mut self) -> Result<Option<Vec<RawNavEntry>>, EpubError> {
        let candidates: Vec<ManifestItem> = [self.package.nav_item(), self.package.ncx_item()]
            .into_iter()
            .flatten()
            .cloned()
            .collect();

        if candidates.is_empty() {
            return Ok(None);
        }

        let mut last_error = None;
        for item in &candidates {
            let parsed = self.read_item(item).and_then(|bytes| {
                let content = decode_text(&bytes);
                if item.is_ncx() {
                    nav::parse_ncx_document(&content, &item.path, &self.package.opf_dir)
                } else {
                    nav::parse_nav_document(&content, &item.path, &self.package.opf_dir)
                }
            });

            match parsed {
                Ok(entries) if !entries.is_empty() => return Ok(Some(entries)),
                Ok(_) => {
                    tracing::debug!(href = %item.href, "Navigation document has no entries");
                }
                Err(e) => {
                    tracing::warn!(href = %item.href, error = %e, "Failed to parse navigation document");
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) => Err(e),
            None => Ok(Some(Vec::new())),
        }
    }
}

/// Decode container text, stripping a UTF-8 BOM and replacing invalid sequences
pub fn decode_text(bytes: &[u8]) -> String {
    let bytes = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

/// Parse XML leniently enough for real-world EPUBs (DOCTYPE declarations allowed)
pub(crate) fn parse_xml<'a>(
    content: &'a str,
    path: &str,
) -> Result<roxmltree::Document<'a>, EpubError> {
    let mut options = roxmltree::ParsingOptions::default();
    options.allow_dtd = true;

    roxmltree::Document::parse_with_options(content, options).map_err(|e| EpubError::XmlError {
        path: path.to_string(),
        message: e.to_string(),
    })
}

fn read_entry<R: Read + Seek>(zip: &mut ZipArchive<R>, path: &str) -> Result<Vec<u8>, EpubError> {
    let mut file = zip.by_name(path)?;
    let mut content = Vec::new();
    file.read_to_end(&mut content)?;
    Ok(content)
}

/// Find the path to the OPF file from container.xml
fn find_opf_path(container: &str) -> Result<String, EpubError> {
    let doc = parse_xml(container, CONTAINER_PATH)?;

    doc.descendants()
        .filter(|node| node.tag_name().name() == "rootfile")
        .find_map(|node| node.attribute("full-path"))
        .map(|p| p.trim_start_matches('/').to_string())
        .ok_or_else(|| {
            EpubError::InvalidEpub("Could not find OPF path in container.xml".to_string())
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_text_strips_bom() {
        let bytes = [0xEF, 0xBB, 0xBF, b'a', b'b'];
        assert_eq!(decode_text(&bytes), "ab");
    }

    #[test]
    fn test_decode_text_replaces_invalid_bytes() {
        let bytes = [b'a', 0xFF, b'b'];
        assert_eq!(decode_text(&bytes), "a\u{FFFD}b");
    }

    #[test]
    fn test_find_opf_path() {
        let container = r#"<?xml version="1.0"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>"#;
        assert_eq!(find_opf_path(container).unwrap(), "OEBPS/content.opf");
    }

    #[test]
    fn test_find_opf_path_missing_rootfile() {
        let container = r#"<container><rootfiles/></container>"#;
        assert!(matches!(
            find_opf_path(container),
            Err(EpubError::InvalidEpub(_))
        ));
    }

    #[test]
    fn test_from_reader_rejects_non_zip() {
        let data = std::io::Cursor::new(b"definitely not a zip file".to_vec());
        assert!(matches!(
            EpubArchive::from_reader(data),
            Err(EpubError::ZipError(_))
        ));
    }
}
