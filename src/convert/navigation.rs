//! Navigation normalization
//!
//! Turns the raw navigation entries into [`NavigationNode`] trees, or builds a
//! flat table of contents from the reading order when there is nothing usable.

use super::{ConversionReport, Step};
use crate::document::NavigationNode;
use crate::epub::path::file_name;
use crate::epub::{EpubError, Package, RawNavEntry};

/// Maximum number of levels kept in the table of contents
pub const MAX_TOC_DEPTH: usize = 10;

const UNTITLED: &str = "Untitled";

/// Counters gathered while normalizing
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct NormalizeStats {
    /// Entries with neither title nor href
    pub skipped: usize,
    /// Whether anything deeper than [`MAX_TOC_DEPTH`] was dropped
    pub truncated: bool,
}

/// Normalize raw entries into navigation nodes
pub fn normalize(entries: &[RawNavEntry]) -> (Vec<NavigationNode>, NormalizeStats) {
    let mut stats = NormalizeStats::default();
    let nodes = normalize_level(entries, 0, &mut stats);
    (nodes, stats)
}

fn normalize_level(
    entries: &[RawNavEntry],
    depth: usize,
    stats: &mut NormalizeStats,
) -> Vec<NavigationNode> {
    if depth >= MAX_TOC_DEPTH {
        if !entries.is_empty() {
            stats.truncated = true;
        }
        return Vec::new();
    }

    let mut nodes = Vec::with_capacity(entries.len());
    for entry in entries {
        if entry.title.is_none() && entry.href.is_none() {
            tracing::debug!(depth, "Skipping navigation entry without title or href");
            stats.skipped += 1;
            continue;
        }

        let title = entry.title.as_deref().unwrap_or(UNTITLED);
        let href = entry.href.as_deref().unwrap_or("");
        let children = normalize_level(&entry.children, depth + 1, stats);
        nodes.push(NavigationNode::new(title, href).with_children(children));
    }
    nodes
}

/// One node per spine document, titled after its filename
pub fn fallback_toc(package: &Package) -> Vec<NavigationNode> {
    package
        .spine_documents()
        .map(|item| NavigationNode::new(title_from_filename(&item.href), item.href.as_str()))
        .collect()
}

/// `chapter_one.xhtml` → `Chapter One`
///
/// Every letter that follows a non-letter is upper-cased and the rest are
/// lower-cased, so `chapter-one` becomes `Chapter-One`.
pub fn title_from_filename(href: &str) -> String {
    let name = file_name(href);
    let stem = match name.rfind('.') {
        Some(idx) if idx > 0 => &name[..idx],
        _ => name,
    };

    let mut title = String::with_capacity(stem.len());
    let mut after_letter = false;
    for ch in stem.chars() {
        let ch = if ch == '_' { ' ' } else { ch };
        if ch.is_alphabetic() {
            if after_letter {
                title.extend(ch.to_lowercase());
            } else {
                title.extend(ch.to_uppercase());
            }
            after_letter = true;
        } else {
            title.push(ch);
            after_letter = false;
        }
    }
    title
}

/// Produce the table of contents from whatever the container offered
pub fn build_navigation(
    raw: Result<Option<Vec<RawNavEntry>>, EpubError>,
    package: &Package,
    report: &mut ConversionReport,
) -> Step<Vec<NavigationNode>> {
    let entries = match raw {
        Ok(Some(entries)) if !entries.is_empty() => entries,
        Ok(Some(_)) => return fallback(package, "navigation document has no entries"),
        Ok(None) => return fallback(package, "container has no navigation document"),
        Err(e) => return fallback(package, &format!("navigation unreadable: {}", e)),
    };

    let (nodes, stats) = normalize(&entries);
    if stats.truncated {
        tracing::warn!(max_depth = MAX_TOC_DEPTH, "Navigation nesting too deep, deeper entries dropped");
        report.warn(format!(
            "navigation deeper than {} levels truncated",
            MAX_TOC_DEPTH
        ));
    }
    if stats.skipped > 0 {
        tracing::warn!(skipped = stats.skipped, "Skipped malformed navigation entries");
        report.warn(format!("{} navigation entries skipped", stats.skipped));
    }

    if nodes.is_empty() {
        return fallback(package, "navigation has no usable entries");
    }
    Step::Complete(nodes)
}

fn fallback(package: &Package, reason: &str) -> Step<Vec<NavigationNode>> {
    Step::Fallback {
        value: fallback_toc(package),
        reason: reason.to_string(),
    }
}
