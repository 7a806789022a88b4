//! Navigation document parsing (EPUB 3 NAV and EPUB 2 NCX)
//!
//! Produces the raw, un-normalized entry tree. Links, section groupings and
//! bare labels all come out as [`RawNavEntry`]; deciding what is usable is
//! left to the navigation normalizer.

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::{Captures, Regex};

use super::path::{parent_dir, resolve_href, split_fragment, strip_dir};
use super::{parse_xml, EpubError};

/// Hard stop for pathological nesting while reading the raw tree
const MAX_RAW_NESTING: usize = 256;

/// Entities every XML parser knows without a DTD
const XML_ENTITIES: &[&str] = &["amp", "lt", "gt", "quot", "apos"];

static NAMED_ENTITY: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"&([A-Za-z][A-Za-z0-9]*);"));

/// Raw navigation entry as authored in the container
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawNavEntry {
    pub title: Option<String>,
    /// Href relative to the OPF directory, fragment preserved
    pub href: Option<String>,
    pub children: Vec<RawNavEntry>,
}

impl RawNavEntry {
    pub fn link(title: &str, href: &str) -> Self {
        Self {
            title: Some(title.to_string()),
            href: Some(href.to_string()),
            children: Vec::new(),
        }
    }
}

/// Parse EPUB 3 Navigation Document
pub fn parse_nav_document(
    content: &str,
    nav_path: &str,
    opf_dir: &str,
) -> Result<Vec<RawNavEntry>, EpubError> {
    let content = numeric_entities(content);
    let doc = parse_xml(&content, nav_path)?;
    let ctx = HrefContext { nav_path, opf_dir };

    let navs: Vec<roxmltree::Node> = doc
        .descendants()
        .filter(|node| node.is_element() && node.tag_name().name() == "nav")
        .collect();

    // <nav epub:type="toc"> first
    for nav in &navs {
        let is_toc = nav
            .attributes()
            .any(|a| a.name() == "type" && a.value().split_whitespace().any(|v| v == "toc"));
        if is_toc {
            if let Some(ol) = first_child_element(nav, "ol") {
                return Ok(parse_nav_ol(&ol, 0, &ctx));
            }
        }
    }

    // Fallback: any nav > ol structure
    for nav in &navs {
        if let Some(ol) = first_child_element(nav, "ol") {
            let entries = parse_nav_ol(&ol, 0, &ctx);
            if !entries.is_empty() {
                return Ok(entries);
            }
        }
    }

    Ok(Vec::new())
}

/// Replace HTML named entities (`&nbsp;`, `&mdash;`) with numeric references
///
/// Navigation documents are XHTML but often carry HTML entities that a
/// strict XML parser rejects. Unknown names are left for the parser to report.
fn numeric_entities(content: &str) -> Cow<'_, str> {
    let Ok(pattern) = NAMED_ENTITY.as_ref() else {
        return Cow::Borrowed(content);
    };

    pattern.replace_all(content, |caps: &Captures| {
        let entity = &caps[0];
        if XML_ENTITIES.contains(&&caps[1]) {
            return entity.to_string();
        }
        let decoded = html_escape::decode_html_entities(entity);
        if decoded == entity {
            return entity.to_string();
        }
        decoded.chars().map(|ch| format!("&#{};", ch as u32)).collect()
    })
}

/// Parse EPUB 2 NCX Document
pub fn parse_ncx_document(
    content: &str,
    ncx_path: &str,
    opf_dir: &str,
) -> Result<Vec<RawNavEntry>, EpubError> {
    let doc = parse_xml(content, ncx_path)?;
    let ctx = HrefContext {
        nav_path: ncx_path,
        opf_dir,
    };

    Ok(doc
        .descendants()
        .find(|node| node.is_element() && node.tag_name().name() == "navMap")
        .map(|nav_map| parse_ncx_children(&nav_map, 0, &ctx))
        .unwrap_or_default())
}

struct HrefContext<'a> {
    nav_path: &'a str,
    opf_dir: &'a str,
}

impl HrefContext<'_> {
    /// Re-express an href written in the navigation file relative to the OPF directory
    fn resolve(&self, raw: &str) -> Option<String> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        if raw.contains("://") || raw.starts_with("mailto:") {
            return Some(raw.to_string());
        }

        let (file, fragment) = split_fragment(raw);
        let full = if file.is_empty() {
            self.nav_path.to_string()
        } else {
            let decoded = urlencoding::decode(file)
                .map(|s| s.into_owned())
                .unwrap_or_else(|_| file.to_string());
            resolve_href(parent_dir(self.nav_path), &decoded)
        };
        let relative = strip_dir(self.opf_dir, &full);

        Some(if fragment.is_empty() {
            relative.to_string()
        } else {
            format!("{}#{}", relative, fragment)
        })
    }
}

fn first_child_element<'a, 'input>(
    node: &roxmltree::Node<'a, 'input>,
    name: &str,
) -> Option<roxmltree::Node<'a, 'input>> {
    node.descendants()
        .find(|child| child.is_element() && child.tag_name().name() == name)
}

/// Parse an ol element in the NAV document
fn parse_nav_ol(ol: &roxmltree::Node, depth: usize, ctx: &HrefContext) -> Vec<RawNavEntry> {
    if depth >= MAX_RAW_NESTING {
        tracing::warn!(depth, "Navigation nesting exceeds hard limit, ignoring deeper entries");
        return Vec::new();
    }

    ol.children()
        .filter(|child| child.is_element() && child.tag_name().name() == "li")
        .map(|li| parse_nav_li(&li, depth, ctx))
        .collect()
}

/// Parse an li element in the NAV document
fn parse_nav_li(li: &roxmltree::Node, depth: usize, ctx: &HrefContext) -> RawNavEntry {
    let mut entry = RawNavEntry::default();

    for child in li.children().filter(|c| c.is_element()) {
        match child.tag_name().name() {
            "a" => {
                entry.href = child.attribute("href").and_then(|h| ctx.resolve(h));
                entry.title = label_text(&child);
            }
            "span" => {
                if entry.title.is_none() {
                    entry.title = label_text(&child);
                }
            }
            "ol" => {
                entry.children = parse_nav_ol(&child, depth + 1, ctx);
            }
            _ => {}
        }
    }

    entry
}

fn parse_ncx_children(parent: &roxmltree::Node, depth: usize, ctx: &HrefContext) -> Vec<RawNavEntry> {
    if depth >= MAX_RAW_NESTING {
        tracing::warn!(depth, "NCX nesting exceeds hard limit, ignoring deeper entries");
        return Vec::new();
    }

    parent
        .children()
        .filter(|child| child.is_element() && child.tag_name().name() == "navPoint")
        .map(|nav_point| parse_ncx_nav_point(&nav_point, depth, ctx))
        .collect()
}

/// Parse navPoint element in NCX
fn parse_ncx_nav_point(nav_point: &roxmltree::Node, depth: usize, ctx: &HrefContext) -> RawNavEntry {
    let mut entry = RawNavEntry::default();

    for child in nav_point.children().filter(|c| c.is_element()) {
        match child.tag_name().name() {
            "navLabel" => {
                entry.title = child
                    .descendants()
                    .find(|sub| sub.is_element() && sub.tag_name().name() == "text")
                    .and_then(|text| label_text(&text));
            }
            "content" => {
                entry.href = child.attribute("src").and_then(|s| ctx.resolve(s));
            }
            _ => {}
        }
    }
    entry.children = parse_ncx_children(nav_point, depth + 1, ctx);

    entry
}

/// Whitespace-collapsed text content, `None` when blank
fn label_text(node: &roxmltree::Node) -> Option<String> {
    let text: String = node
        .descendants()
        .filter(|n| n.is_text())
        .filter_map(|n| n.text())
        .collect();
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    (!collapsed.is_empty()).then_some(collapsed)
}
