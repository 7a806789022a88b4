//! Reader Server Library
//!
//! Converts EPUB books into normalized reading artifacts and serves them
//! section by section. The command-line front end is in main.rs.
//!
//! # Modules
//!
//! - `epub`: EPUB container access (zip, OPF, NAV/NCX)
//! - `convert`: Conversion pipeline producing a [`document::Document`]
//! - `document`: Artifact model (sections, navigation tree, asset table)
//! - `html`: Markup cleaning, asset rewriting, text extraction
//! - `library`: Artifact storage, cache and the serving boundary

pub mod config;
pub mod convert;
pub mod document;
pub mod epub;
pub mod html;
pub mod library;

pub use config::Config;
pub use convert::{Conversion, ConversionReport, ConvertError, Converter, ConverterOptions};
pub use document::{Document, DocumentMetadata, NavigationNode, Section};
pub use library::{Library, LibraryError};
