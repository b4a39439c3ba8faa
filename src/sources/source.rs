//! Collaborator traits used by the migration pipeline.

use std::collections::HashSet;
use std::io::Read;
use std::path::Path;

use anyhow::Result;

use crate::core::SourcePackage;
use crate::sources::error::RegistryResult;

/// The registry packages are migrated from.
pub trait SourceRegistry {
    /// Get the registry name for display.
    fn name(&self) -> &str;

    /// List every module name, in registry order.
    fn list_modules(&self) -> RegistryResult<Vec<String>>;

    /// Fetch a module's versions and their tarball URLs.
    ///
    /// Fails with `RegistryError::NotFound` if the module does not exist.
    fn fetch_metadata(&self, module: &str) -> RegistryResult<SourcePackage>;

    /// Open a tarball for streaming.
    fn download_archive(&self, url: &str) -> RegistryResult<Box<dyn Read>>;
}

/// The registry packages are migrated to.
pub trait DestinationRegistry {
    /// Get the registry name for display.
    fn name(&self) -> &str;

    /// Versions already published for a module.
    ///
    /// Fails with `RegistryError::NotFound` if the module was never published.
    fn fetch_versions(&self, module: &str) -> RegistryResult<HashSet<String>>;
}

/// Result of publishing one archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    /// The version is now live at the destination.
    Published,
    /// The destination already has this version.
    AlreadyExists,
    /// Anything else; carries the publisher's message.
    Failed(String),
}

/// Publishes rewritten archives to the destination.
pub trait Publisher {
    /// Publish a local tarball.
    fn publish(&self, archive: &Path) -> PublishOutcome;

    /// Point the `latest` dist-tag of a module at a version.
    fn set_latest(&self, module: &str, version: &str) -> Result<()>;
}
