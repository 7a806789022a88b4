//! Section content sanitization
//!
//! Every step degrades on failure instead of aborting the section: a failed
//! rewrite or clean keeps the previous markup, a failed text pass yields "".

use crate::document::{is_external, AssetTable, Section};
use crate::epub::decode_text;
use crate::html;

/// A sanitized section plus what went wrong along the way
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SanitizedSection {
    pub section: Section,
    /// Container asset references left untouched (remote ones excluded)
    pub unresolved: Vec<String>,
    /// Steps that fell back, with the reason
    pub degraded: Vec<String>,
}

/// Identity of the content file being sanitized
#[derive(Debug, Clone, Copy)]
pub struct SectionSource<'a> {
    pub id: &'a str,
    /// OPF-relative path
    pub href: &'a str,
    pub order: usize,
}

/// Build a [`Section`] from one content file's raw bytes
pub fn sanitize_section(source: SectionSource<'_>, raw: &[u8], assets: &AssetTable) -> SanitizedSection {
    let mut degraded = Vec::new();
    let markup = decode_text(raw);

    let rewrite = html::rewrite_asset_refs(&markup, |reference| {
        assets.resolve(source.href, reference).map(str::to_string)
    });
    let (markup, unresolved) = match rewrite {
        Ok(outcome) => {
            let mut unresolved = outcome.unresolved;
            unresolved.retain(|reference| !is_external(reference));
            (outcome.html, unresolved)
        }
        Err(e) => {
            degraded.push(format!("asset rewrite failed: {}", e));
            (markup, Vec::new())
        }
    };

    for reference in &unresolved {
        tracing::warn!(href = %source.href, reference = %reference, "Unresolved asset reference");
    }

    let cleaned = html::clean_markup(&markup).unwrap_or_else(|e| {
        degraded.push(format!("cleaning failed: {}", e));
        markup.clone()
    });

    let content = html::extract_body(&cleaned)
        .map(str::to_string)
        .unwrap_or_else(|| cleaned.clone());

    let text = html::plain_text(&cleaned).unwrap_or_else(|e| {
        degraded.push(format!("text extraction failed: {}", e));
        String::new()
    });

    for reason in &degraded {
        tracing::warn!(href = %source.href, reason = %reason, "Section step degraded");
    }

    SanitizedSection {
        section: Section {
            id: source.id.to_string(),
            href: source.href.to_string(),
            title: format!("Section {}", source.order + 1),
            content,
            text,
            order: source.order,
        },
        unresolved,
        degraded,
    }
}
