//! Core data structures for ferry.
//!
//! - Manifests (`package.json`) and the publish sanitizer
//! - Source-side package and version metadata

pub mod manifest;
pub mod package;

pub use manifest::{sanitize, Manifest, MANIFEST_NAME};
pub use package::{SourcePackage, VersionEntry};
