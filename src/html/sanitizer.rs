//! Markup cleaning, asset reference rewriting and text extraction
//!
//! All passes use lol_html for streaming rewrites. Callers decide what to do
//! when a pass fails; none of these functions panic on malformed markup.

use std::borrow::Cow;
use std::cell::RefCell;
use std::sync::LazyLock;

use lol_html::errors::AttributeNameError;
use lol_html::html_content::Element;
use lol_html::{doc_comments, doc_text, element, rewrite_str, RewriteStrSettings};
use regex::{Captures, Regex};

/// Elements with no safe renderable value
pub const REMOVED_ELEMENTS: &[&str] = &[
    "script", "style", "iframe", "video", "nav", "form", "button", "input",
];

/// Elements that never take content, so `<x/>` already means `<x>` to an HTML parser
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param",
    "source", "track", "wbr",
];

static BODY_OPEN: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"(?is)<body(?:\s[^>]*)?>"));

static SELF_CLOSING: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"<([A-Za-z][A-Za-z0-9:_.-]*)((?:\s[^<>]*?)?)\s*/>"));

#[derive(Debug, thiserror::Error)]
pub enum HtmlError {
    #[error("HTML rewrite failed: {0}")]
    RewriteError(String),
}

/// Result of rewriting asset references
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteOutcome {
    pub html: String,
    pub rewritten: usize,
    /// References the resolver could not map, in document order
    pub unresolved: Vec<String>,
}

/// Expand XHTML self-closing non-void elements into open/close pairs
///
/// HTML parsing ignores the trailing slash, so `<script src="a.js"/>` or
/// `<title/>` would otherwise swallow everything after it. Void elements
/// are left as written.
pub fn expand_self_closing(html: &str) -> Cow<'_, str> {
    let Ok(pattern) = SELF_CLOSING.as_ref() else {
        return Cow::Borrowed(html);
    };

    pattern.replace_all(html, |caps: &Captures| {
        let name = &caps[1];
        if VOID_ELEMENTS.contains(&name.to_ascii_lowercase().as_str()) {
            caps[0].to_string()
        } else {
            format!("<{}{}></{}>", name, &caps[2], name)
        }
    })
}

/// Remove unsafe or noise elements (with their contents) and comments
pub fn clean_markup(html: &str) -> Result<String, HtmlError> {
    let html = expand_self_closing(html);
    let removals = REMOVED_ELEMENTS
        .iter()
        .map(|tag| {
            element!(*tag, |el| {
                el.remove();
                Ok(())
            })
        })
        .collect();

    rewrite_str(
        &html,
        RewriteStrSettings {
            element_content_handlers: removals,
            document_content_handlers: vec![doc_comments!(|comment| {
                comment.remove();
                Ok(())
            })],
            ..RewriteStrSettings::default()
        },
    )
    .map_err(|e| HtmlError::RewriteError(e.to_string()))
}

/// Rewrite `<img src>` and SVG `<image href|xlink:href>` through `resolve`
///
/// References `resolve` maps to `None` are left untouched and reported.
pub fn rewrite_asset_refs<F>(html: &str, resolve: F) -> Result<RewriteOutcome, HtmlError>
where
    F: Fn(&str) -> Option<String>,
{
    let html = expand_self_closing(html);
    let rewritten = RefCell::new(0usize);
    let unresolved = RefCell::new(Vec::new());

    let rewrite_attr = |el: &mut Element, attr: &str| -> Result<(), AttributeNameError> {
        let Some(reference) = el.get_attribute(attr) else {
            return Ok(());
        };
        if reference.trim().is_empty() {
            return Ok(());
        }
        match resolve(&reference) {
            Some(local) => {
                el.set_attribute(attr, &local)?;
                *rewritten.borrow_mut() += 1;
            }
            None => unresolved.borrow_mut().push(reference),
        }
        Ok(())
    };

    let html = rewrite_str(
        &html,
        RewriteStrSettings {
            element_content_handlers: vec![
                element!("img[src]", |el| {
                    rewrite_attr(el, "src")?;
                    Ok(())
                }),
                element!("image", |el| {
                    for attr in ["href", "xlink:href"] {
                        rewrite_attr(el, attr)?;
                    }
                    Ok(())
                }),
            ],
            ..RewriteStrSettings::default()
        },
    )
    .map_err(|e| HtmlError::RewriteError(e.to_string()))?;

    Ok(RewriteOutcome {
        html,
        rewritten: rewritten.into_inner(),
        unresolved: unresolved.into_inner(),
    })
}

/// Inner markup of the top-level `<body>`, `None` when there is no body
pub fn extract_body(html: &str) -> Option<&str> {
    let open = BODY_OPEN.as_ref().ok()?.find(html)?;
    let rest = &html[open.end()..];
    // ASCII lowercasing keeps byte offsets stable
    let end = rest
        .to_ascii_lowercase()
        .rfind("</body")
        .unwrap_or(rest.len());
    Some(rest[..end].trim())
}

/// Flatten text nodes with single-space separators and collapse whitespace
pub fn plain_text(html: &str) -> Result<String, HtmlError> {
    let html = expand_self_closing(html);
    let mut raw = String::new();

    rewrite_str(
        &html,
        RewriteStrSettings {
            document_content_handlers: vec![doc_text!(|chunk| {
                raw.push_str(chunk.as_str());
                if chunk.last_in_text_node() {
                    raw.push(' ');
                }
                Ok(())
            })],
            ..RewriteStrSettings::default()
        },
    )
    .map_err(|e| HtmlError::RewriteError(e.to_string()))?;

    let decoded = html_escape::decode_html_entities(&raw);
    Ok(decoded.split_whitespace().collect::<Vec<_>>().join(" "))
}
