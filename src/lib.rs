//! ferry - Migrate npm packages from Gemfury to an npm registry
//!
//! This crate provides the core library functionality for ferry,
//! including the version diff, the streaming tarball rewrite and the
//! migration orchestrator.

pub mod core;
pub mod ops;
pub mod sources;
pub mod util;

/// Test utilities and mocks for ferry unit tests.
///
/// This module is only available when compiling with `--cfg test` or
/// running tests. It provides in-memory registries, a recording publisher
/// and tarball fixtures.
#[cfg(test)]
pub mod test_support;

pub use crate::core::{sanitize, Manifest, SourcePackage, VersionEntry};
pub use crate::ops::{MigrateOptions, MigrationSummary, Migrator};
