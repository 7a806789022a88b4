//! OPF (Open Packaging Format) parser
//!
//! Parses the package document into descriptive metadata, manifest and spine.

use std::collections::HashMap;

use super::path::{parent_dir, resolve_href, strip_dir};
use super::{parse_xml, EpubError};

const DC_NAMESPACE: &str = "http://purl.org/dc/elements/1.1/";
const NCX_MEDIA_TYPE: &str = "application/x-dtbncx+xml";

/// Parsed package document
#[derive(Debug, Clone)]
pub struct Package {
    /// Full in-container path of the OPF file
    pub opf_path: String,
    /// Directory of the OPF file; manifest hrefs are relative to it
    pub opf_dir: String,
    /// Dublin Core fields, `None` when the package has no `<metadata>` element
    pub metadata: Option<MetadataStore>,
    /// Manifest items keyed by id
    pub manifest: HashMap<String, ManifestItem>,
    /// Manifest ids in document order
    pub manifest_order: Vec<String>,
    /// Reading order
    pub spine: Vec<SpineRef>,
    /// Value of the spine `toc` attribute (NCX manifest id)
    pub spine_toc: Option<String>,
}

/// Manifest item (resource in the EPUB)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestItem {
    pub id: String,
    /// Href relative to the OPF directory, percent-decoded
    pub href: String,
    /// Full path inside the zip container
    pub path: String,
    pub media_type: String,
    pub properties: Vec<String>,
}

/// Coarse classification of manifest items
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
    Document,
    Image,
    Navigation,
    Style,
    Font,
    Other,
}

/// Spine item reference (reading order entry)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpineRef {
    pub idref: String,
    pub linear: bool,
}

/// Dublin Core descriptive fields in document order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataStore {
    entries: Vec<(String, String)>,
}

impl MetadataStore {
    pub fn new(entries: Vec<(String, String)>) -> Self {
        Self { entries }
    }

    /// First non-empty value for a field
    pub fn first<'a>(&'a self, name: &str) -> Option<&'a str> {
        self.all(name).next()
    }

    /// Every non-empty value for a field, duplicates included
    pub fn all<'a, 'n>(&'a self, name: &'n str) -> impl Iterator<Item = &'a str> + use<'a, 'n> {
        self.entries
            .iter()
            .filter(move |(key, value)| key == name && !value.is_empty())
            .map(|(_, value)| value.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl ManifestItem {
    pub fn kind(&self) -> ItemKind {
        if self.has_property("nav") {
            return ItemKind::Navigation;
        }
        match self.media_type.as_str() {
            "application/xhtml+xml" | "text/html" => ItemKind::Document,
            NCX_MEDIA_TYPE => ItemKind::Navigation,
            "text/css" => ItemKind::Style,
            m if m.starts_with("image/") => ItemKind::Image,
            m if m.starts_with("font/") || m.contains("font") => ItemKind::Font,
            _ => ItemKind::Other,
        }
    }

    pub fn has_property(&self, property: &str) -> bool {
        self.properties.iter().any(|p| p == property)
    }

    pub fn is_ncx(&self) -> bool {
        self.media_type == NCX_MEDIA_TYPE
    }
}

impl Package {
    /// Look up a manifest item by id
    pub fn item(&self, id: &str) -> Option<&ManifestItem> {
        self.manifest.get(id)
    }

    /// Manifest items in document order
    pub fn items(&self) -> impl Iterator<Item = &ManifestItem> {
        self.manifest_order
            .iter()
            .filter_map(|id| self.manifest.get(id))
    }

    /// Spine documents that resolve to a content item, in reading order
    pub fn spine_documents(&self) -> impl Iterator<Item = &ManifestItem> {
        self.spine
            .iter()
            .filter_map(|spine_ref| self.item(&spine_ref.idref))
            .filter(|item| item.kind() == ItemKind::Document)
    }

    /// EPUB 3 navigation document
    pub fn nav_item(&self) -> Option<&ManifestItem> {
        self.items().find(|item| item.has_property("nav"))
    }

    /// EPUB 2 NCX document
    pub fn ncx_item(&self) -> Option<&ManifestItem> {
        self.spine_toc
            .as_deref()
            .and_then(|id| self.item(id))
            .filter(|item| item.is_ncx())
            .or_else(|| self.items().find(|item| item.is_ncx()))
    }
}

/// Parse an OPF file
pub fn parse_package(opf_path: &str, content: &str) -> Result<Package, EpubError> {
    let doc = parse_xml(content, opf_path)?;
    let opf_dir = parent_dir(opf_path).to_string();

    let root = doc.root_element();
    if root.tag_name().name() != "package" {
        return Err(EpubError::InvalidEpub(format!(
            "Expected <package> root in {}, found <{}>",
            opf_path,
            root.tag_name().name()
        )));
    }

    let metadata = parse_metadata(&doc);
    let (manifest, manifest_order) = parse_manifest(&doc, &opf_dir);
    let (spine, spine_toc) = parse_spine(&doc);

    Ok(Package {
        opf_path: opf_path.to_string(),
        opf_dir,
        metadata,
        manifest,
        manifest_order,
        spine,
        spine_toc,
    })
}

fn parse_metadata(doc: &roxmltree::Document) -> Option<MetadataStore> {
    let metadata = doc
        .descendants()
        .find(|node| node.is_element() && node.tag_name().name() == "metadata")?;

    let entries = metadata
        .descendants()
        .filter(|node| node.is_element() && node.tag_name().namespace() == Some(DC_NAMESPACE))
        .map(|node| {
            let text: String = node
                .descendants()
                .filter(|n| n.is_text())
                .filter_map(|n| n.text())
                .collect();
            (node.tag_name().name().to_string(), text.trim().to_string())
        })
        .collect();

    Some(MetadataStore::new(entries))
}

fn parse_manifest(
    doc: &roxmltree::Document,
    opf_dir: &str,
) -> (HashMap<String, ManifestItem>, Vec<String>) {
    let mut manifest = HashMap::new();
    let mut order = Vec::new();

    for node in doc.descendants() {
        if !node.is_element() || node.tag_name().name() != "item" {
            continue;
        }
        let (Some(id), Some(href)) = (node.attribute("id"), node.attribute("href")) else {
            tracing::debug!("Skipping manifest item without id or href");
            continue;
        };

        let decoded = urlencoding::decode(href)
            .map(|s| s.into_owned())
            .unwrap_or_else(|_| href.to_string());
        let path = resolve_href(opf_dir, &decoded);
        let href = strip_dir(opf_dir, &path).to_string();

        let media_type = node
            .attribute("media-type")
            .unwrap_or("")
            .trim()
            .to_ascii_lowercase();
        let properties = node
            .attribute("properties")
            .map(|p| p.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default();

        if manifest.contains_key(id) {
            tracing::warn!(id = %id, "Duplicate manifest id, keeping first");
            continue;
        }
        order.push(id.to_string());
        manifest.insert(
            id.to_string(),
            ManifestItem {
                id: id.to_string(),
                href,
                path,
                media_type,
                properties,
            },
        );
    }

    (manifest, order)
}

fn parse_spine(doc: &roxmltree::Document) -> (Vec<SpineRef>, Option<String>) {
    let Some(spine) = doc
        .descendants()
        .find(|node| node.is_element() && node.tag_name().name() == "spine")
    else {
        return (Vec::new(), None);
    };

    let toc = spine.attribute("toc").map(str::to_string);
    let refs = spine
        .children()
        .filter(|node| node.is_element() && node.tag_name().name() == "itemref")
        .filter_map(|node| {
            node.attribute("idref").map(|idref| SpineRef {
                idref: idref.to_string(),
                linear: node.attribute("linear").map(|s| s != "no").unwrap_or(true),
            })
        })
        .collect();

    (refs, toc)
}

#[cfg(test)]
mod tests {
    use super::*;

    const OPF: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="3.0">
    <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
        <dc:title>Test Book</dc:title>
        <dc:creator>First Author</dc:creator>
        <dc:creator>Second Author</dc:creator>
        <dc:creator>First Author</dc:creator>
        <dc:language>fr</dc:language>
        <dc:subject>  </dc:subject>
    </metadata>
    <manifest>
        <item id="nav" href="nav.xhtml" media-type="application/xhtml+xml" properties="nav"/>
        <item id="ncx" href="toc.ncx" media-type="application/x-dtbncx+xml"/>
        <item id="ch1" href="Text/chapter%201.xhtml" media-type="application/xhtml+xml"/>
        <item id="img" href="../images/cover.JPG" media-type="image/jpeg"/>
        <item id="css" href="style.css" media-type="text/css"/>
    </manifest>
    <spine toc="ncx">
        <itemref idref="ch1"/>
        <itemref idref="missing" linear="no"/>
    </spine>
</package>"#;

    #[test]
    fn test_parse_package() {
        let package = parse_package("OEBPS/content.opf", OPF).unwrap();

        assert_eq!(package.opf_dir, "OEBPS");
        assert_eq!(package.manifest_order, vec!["nav", "ncx", "ch1", "img", "css"]);
        assert_eq!(package.spine.len(), 2);
        assert!(!package.spine[1].linear);
        assert_eq!(package.spine_toc.as_deref(), Some("ncx"));

        let ch1 = package.item("ch1").unwrap();
        assert_eq!(ch1.href, "Text/chapter 1.xhtml");
        assert_eq!(ch1.path, "OEBPS/Text/chapter 1.xhtml");
        assert_eq!(ch1.kind(), ItemKind::Document);

        let img = package.item("img").unwrap();
        assert_eq!(img.path, "images/cover.JPG");
        assert_eq!(img.kind(), ItemKind::Image);

        assert_eq!(package.item("css").unwrap().kind(), ItemKind::Style);
        assert_eq!(package.nav_item().unwrap().id, "nav");
        assert_eq!(package.ncx_item().unwrap().id, "ncx");
        assert_eq!(package.spine_documents().count(), 1);
    }

    #[test]
    fn test_metadata_store_keeps_order_and_duplicates() {
        let package = parse_package("content.opf", OPF).unwrap();
        let metadata = package.metadata.unwrap();

        assert_eq!(metadata.first("title"), Some("Test Book"));
        assert_eq!(
            metadata.all("creator").collect::<Vec<_>>(),
            vec!["First Author", "Second Author", "First Author"]
        );
        assert_eq!(metadata.first("subject"), None);
        assert_eq!(metadata.first("publisher"), None);
    }

    #[test]
    fn test_metadata_values_outlive_field_name() {
        let store = MetadataStore::new(vec![("language".to_string(), "fr".to_string())]);

        let language = {
            let field = String::from("language");
            store.first(&field)
        };
        assert_eq!(language, Some("fr"));
    }

    #[test]
    fn test_package_without_metadata() {
        let opf = r#"<package xmlns="http://www.idpf.org/2007/opf"><manifest/><spine/></package>"#;
        let package = parse_package("content.opf", opf).unwrap();
        assert!(package.metadata.is_none());
        assert!(package.spine.is_empty());
    }

    #[test]
    fn test_rejects_non_package_root() {
        let result = parse_package("content.opf", "<html/>");
        assert!(matches!(result, Err(EpubError::InvalidEpub(_))));
    }
}
