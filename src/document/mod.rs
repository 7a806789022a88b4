//! Reading artifact model
//!
//! The normalized document, its sections, navigation tree and asset table.
//! Built once by the converter and treated as immutable afterwards.

mod assets;
mod types;

pub use assets::{is_external, AssetTable, Registration};
pub use types::{Document, DocumentMetadata, NavigationNode, Section, ARTIFACT_VERSION};
