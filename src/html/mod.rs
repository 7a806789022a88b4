//! HTML processing for section content

mod sanitizer;

pub use sanitizer::{
    clean_markup, expand_self_closing, extract_body, plain_text, rewrite_asset_refs, HtmlError,
    RewriteOutcome, REMOVED_ELEMENTS,
};
