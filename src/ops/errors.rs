//! Migration error taxonomy.
//!
//! Only [`MigrateError::ListModules`] ever leaves
//! [`Migrator::run`](crate::ops::migrate::Migrator::run). Every other variant
//! is caught at the module or version boundary it belongs to and reported as
//! a warning.

use std::io;

use thiserror::Error;

use crate::ops::rewrite::RewriteError;
use crate::sources::RegistryError;

/// Error during a migration run.
#[derive(Debug, Error)]
pub enum MigrateError {
    /// The source module listing could not be fetched. Fatal.
    #[error("failed to list source modules: {0}")]
    ListModules(RegistryError),

    /// Source metadata or destination versions could not be fetched.
    #[error("failed to fetch `{module}`: {source}")]
    ModuleFetch {
        module: String,
        #[source]
        source: RegistryError,
    },

    /// The tarball could not be downloaded.
    #[error("failed to download {module}@{version}: {source}")]
    Download {
        module: String,
        version: String,
        #[source]
        source: RegistryError,
    },

    /// The manifest inside the tarball is not valid JSON.
    #[error("malformed manifest in {module}@{version} (`{path}`): {source}")]
    MalformedManifest {
        module: String,
        version: String,
        path: String,
        #[source]
        source: serde_json::Error,
    },

    /// The tarball could not be rewritten.
    #[error("failed to rewrite {module}@{version}: {source}")]
    Rewrite {
        module: String,
        version: String,
        #[source]
        source: RewriteError,
    },

    /// The temporary archive (or the directory holding it) could not be
    /// created or written.
    #[error("temporary archive for {module}@{version}: {source}")]
    TempFile {
        module: String,
        version: String,
        #[source]
        source: io::Error,
    },

    /// The destination already has this version.
    #[error("{module}@{version} already exists at the destination")]
    PublishConflict { module: String, version: String },

    /// Publishing failed for another reason.
    #[error("failed to publish {module}@{version}: {message}")]
    Publish {
        module: String,
        version: String,
        message: String,
    },
}

impl MigrateError {
    /// Whether this error ends the whole run.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::ListModules(_))
    }

    /// Build the right variant for a rewrite failure.
    pub fn from_rewrite(module: &str, version: &str, err: RewriteError) -> Self {
        match err {
            RewriteError::MalformedManifest { path, source } => Self::MalformedManifest {
                module: module.to_string(),
                version: version.to_string(),
                path,
                source,
            },
            other => Self::Rewrite {
                module: module.to_string(),
                version: version.to_string(),
                source: other,
            },
        }
    }
}
