//! Descriptive metadata extraction

use super::Step;
use crate::document::DocumentMetadata;
use crate::epub::MetadataStore;

const DEFAULT_LANGUAGE: &str = "en";

/// Build [`DocumentMetadata`] from the package's Dublin Core fields
///
/// Singular fields take the first non-empty value; repeated fields keep every
/// value in source order. A package without a metadata block yields the
/// fallback record.
pub fn extract_metadata(store: Option<&MetadataStore>, source_stem: &str) -> Step<DocumentMetadata> {
    let Some(store) = store else {
        return Step::Fallback {
            value: DocumentMetadata::fallback(source_stem),
            reason: "package has no metadata block".to_string(),
        };
    };

    let one = |name: &str| store.first(name).map(str::to_string);
    let many = |name: &str| store.all(name).map(str::to_string).collect::<Vec<_>>();

    let title = one("title").unwrap_or_else(|| {
        tracing::debug!(title = %source_stem, "No dc:title, using source filename");
        source_stem.to_string()
    });

    Step::Complete(DocumentMetadata {
        title,
        language: one("language").unwrap_or_else(|| DEFAULT_LANGUAGE.to_string()),
        authors: many("creator"),
        description: one("description"),
        publisher: one("publisher"),
        date: one("date"),
        identifiers: many("identifier"),
        subjects: many("subject"),
    })
}
