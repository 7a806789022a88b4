//! Shared fixtures: in-memory EPUB construction

#![allow(dead_code)]

use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};

use zip::{write::SimpleFileOptions, ZipWriter};

struct ManifestEntry {
    id: String,
    href: String,
    media_type: String,
    properties: Option<String>,
}

/// Builds a minimal EPUB 3 container
pub struct EpubBuilder {
    opf_dir: String,
    metadata: Option<String>,
    manifest: Vec<ManifestEntry>,
    spine: Vec<String>,
    spine_toc: Option<String>,
    files: Vec<(String, Vec<u8>)>,
}

impl Default for EpubBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EpubBuilder {
    pub fn new() -> Self {
        Self {
            opf_dir: "OEBPS".to_string(),
            metadata: Some(
                r#"<dc:title>Fixture Book</dc:title>
    <dc:creator>Jane Doe</dc:creator>
    <dc:language>en</dc:language>
    <dc:identifier id="uid">urn:uuid:fixture</dc:identifier>"#
                    .to_string(),
            ),
            manifest: Vec::new(),
            spine: Vec::new(),
            spine_toc: None,
            files: Vec::new(),
        }
    }

    /// Replace the Dublin Core block (inner XML of `<metadata>`)
    pub fn metadata(mut self, xml: &str) -> Self {
        self.metadata = Some(xml.to_string());
        self
    }

    pub fn without_metadata(mut self) -> Self {
        self.metadata = None;
        self
    }

    pub fn title(self, title: &str) -> Self {
        let xml = format!(
            "<dc:title>{}</dc:title>\n    <dc:creator>Jane Doe</dc:creator>",
            title
        );
        self.metadata(&xml)
    }

    /// Content document, added to manifest and spine
    pub fn chapter(mut self, id: &str, href: &str, html: &str) -> Self {
        self.add_item(id, href, "application/xhtml+xml", None, html.as_bytes());
        self.spine.push(id.to_string());
        self
    }

    /// Content document in the manifest only
    pub fn document(mut self, id: &str, href: &str, html: &str) -> Self {
        self.add_item(id, href, "application/xhtml+xml", None, html.as_bytes());
        self
    }

    pub fn image(mut self, id: &str, href: &str, bytes: &[u8]) -> Self {
        let media_type = match href.rsplit('.').next() {
            Some("jpg") | Some("jpeg") => "image/jpeg",
            Some("gif") => "image/gif",
            Some("svg") => "image/svg+xml",
            _ => "image/png",
        };
        self.add_item(id, href, media_type, None, bytes);
        self
    }

    /// EPUB 3 navigation document
    pub fn nav(mut self, href: &str, html: &str) -> Self {
        self.add_item("nav", href, "application/xhtml+xml", Some("nav"), html.as_bytes());
        self
    }

    /// EPUB 2 NCX referenced from the spine
    pub fn ncx(mut self, href: &str, xml: &str) -> Self {
        self.add_item("ncx", href, "application/x-dtbncx+xml", None, xml.as_bytes());
        self.spine_toc = Some("ncx".to_string());
        self
    }

    /// Raw spine reference, whether or not the id exists
    pub fn spine_ref(mut self, idref: &str) -> Self {
        self.spine.push(idref.to_string());
        self
    }

    fn add_item(
        &mut self,
        id: &str,
        href: &str,
        media_type: &str,
        properties: Option<&str>,
        bytes: &[u8],
    ) {
        self.manifest.push(ManifestEntry {
            id: id.to_string(),
            href: href.to_string(),
            media_type: media_type.to_string(),
            properties: properties.map(str::to_string),
        });
        let decoded = urlencoding::decode(href)
            .map(|s| s.into_owned())
            .unwrap_or_else(|_| href.to_string());
        self.files.push((join_path(&self.opf_dir, &decoded), bytes.to_vec()));
    }

    fn opf(&self) -> String {
        let metadata = self
            .metadata
            .as_ref()
            .map(|inner| {
                format!(
                    "  <metadata xmlns:dc=\"http://purl.org/dc/elements/1.1/\">\n    {}\n  </metadata>\n",
                    inner
                )
            })
            .unwrap_or_default();

        let manifest: String = self
            .manifest
            .iter()
            .map(|item| {
                let properties = item
                    .properties
                    .as_ref()
                    .map(|p| format!(" properties=\"{}\"", p))
                    .unwrap_or_default();
                format!(
                    "    <item id=\"{}\" href=\"{}\" media-type=\"{}\"{}/>\n",
                    item.id, item.href, item.media_type, properties
                )
            })
            .collect();

        let spine: String = self
            .spine
            .iter()
            .map(|idref| format!("    <itemref idref=\"{}\"/>\n", idref))
            .collect();
        let toc = self
            .spine_toc
            .as_ref()
            .map(|t| format!(" toc=\"{}\"", t))
            .unwrap_or_default();

        format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<package xmlns=\"http://www.idpf.org/2007/opf\" version=\"3.0\" unique-identifier=\"uid\">\n{}  <manifest>\n{}  </manifest>\n  <spine{}>\n{}  </spine>\n</package>\n",
            metadata, manifest, toc, spine
        )
    }

    pub fn build(&self) -> Vec<u8> {
        let mut buffer = Vec::new();
        {
            let mut zip = ZipWriter::new(Cursor::new(&mut buffer));
            let options =
                SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);

            zip.start_file("mimetype", options).unwrap();
            zip.write_all(b"application/epub+zip").unwrap();

            zip.start_file("META-INF/container.xml", options).unwrap();
            zip.write_all(
                format!(
                    r#"<?xml version="1.0"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="{}/content.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>"#,
                    self.opf_dir
                )
                .as_bytes(),
            )
            .unwrap();

            zip.start_file(format!("{}/content.opf", self.opf_dir), options)
                .unwrap();
            zip.write_all(self.opf().as_bytes()).unwrap();

            for (path, bytes) in &self.files {
                zip.start_file(path.as_str(), options).unwrap();
                zip.write_all(bytes).unwrap();
            }

            zip.finish().unwrap();
        }
        buffer
    }

    /// Write the container to `<dir>/<name>` and return its path
    pub fn write_to(&self, dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, self.build()).unwrap();
        path
    }
}

/// Join an href onto the OPF directory, collapsing `..`
fn join_path(base: &str, href: &str) -> String {
    let mut segments: Vec<&str> = base.split('/').filter(|s| !s.is_empty()).collect();
    for segment in href.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    segments.join("/")
}

pub fn chapter_html(title: &str, body: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE html>
<html xmlns="http://www.w3.org/1999/xhtml">
<head><title>{}</title></head>
<body>
{}
</body>
</html>"#,
        title, body
    )
}

/// Navigation document wrapping the given `<ol>` children
pub fn nav_html(items: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE html>
<html xmlns="http://www.w3.org/1999/xhtml" xmlns:epub="http://www.idpf.org/2007/ops">
<head><title>Contents</title></head>
<body>
<nav epub:type="toc"><ol>
{}
</ol></nav>
</body>
</html>"#,
        items
    )
}

/// Two chapters, one image referenced by URL-encoded path from chapter 1
pub fn two_chapter_book() -> EpubBuilder {
    EpubBuilder::new()
        .nav(
            "nav.xhtml",
            &nav_html(
                r#"<li><a href="Text/ch1.xhtml">Chapter One</a></li>
<li><a href="Text/ch2.xhtml#part">Chapter Two</a></li>"#,
            ),
        )
        .chapter(
            "ch1",
            "Text/ch1.xhtml",
            &chapter_html(
                "One",
                r#"<h1>Chapter One</h1>
<p>The <em>first</em> chapter.</p>
<img src="../Images/cover%20art.png" alt="cover"/>"#,
            ),
        )
        .chapter(
            "ch2",
            "Text/ch2.xhtml",
            &chapter_html("Two", r#"<h1 id="part">Chapter Two</h1><p>The end.</p>"#),
        )
        .image("cover", "Images/cover%20art.png", b"\x89PNG fake cover")
}
