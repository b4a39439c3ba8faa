//! The npm registry as a migration destination.
//!
//! Version lookups go straight to the registry's JSON API. Publishing and
//! dist-tag changes shell out to the `npm` CLI so that the user's existing
//! npm login (`~/.npmrc`) is what authorizes the write.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use url::Url;

use crate::core::package::versions_from_json;
use crate::sources::error::{RegistryError, RegistryResult};
use crate::sources::http::{join_segments, HttpClient};
use crate::sources::source::{DestinationRegistry, PublishOutcome, Publisher};
use crate::util::process::{find_executable, ProcessBuilder};

/// Public npm registry.
pub const DEFAULT_REGISTRY: &str = "https://registry.npmjs.org";

/// stderr fragments npm prints when a version is already taken.
const CONFLICT_MARKERS: &[&str] = &[
    "EPUBLISHCONFLICT",
    "cannot publish over",
    "previously published",
];

/// Read-only view of an npm-compatible registry.
#[derive(Debug, Clone)]
pub struct NpmRegistry {
    http: HttpClient,
    base: Url,
}

impl NpmRegistry {
    /// Create a client for the registry at `base_url`.
    pub fn new(http: HttpClient, base_url: &str) -> Result<Self> {
        let base = Url::parse(base_url)
            .with_context(|| format!("invalid destination registry url: {}", base_url))?;
        Ok(NpmRegistry { http, base })
    }
}

impl DestinationRegistry for NpmRegistry {
    fn name(&self) -> &str {
        "npm"
    }

    fn fetch_versions(&self, module: &str) -> RegistryResult<HashSet<String>> {
        let url = join_segments(&self.base, &[module])?;
        let body = self.http.get_bytes(&url, module)?;

        let versions = versions_from_json(&body).map_err(|e| RegistryError::InvalidResponse {
            url: url.to_string(),
            message: e.to_string(),
        })?;
        Ok(versions.into_iter().collect())
    }
}

/// Publishes through the `npm` command line client.
#[derive(Debug, Clone)]
pub struct NpmPublisher {
    npm: PathBuf,
    registry: Option<String>,
}

impl NpmPublisher {
    /// Use the given `npm` executable.
    pub fn new(npm: impl Into<PathBuf>) -> Self {
        NpmPublisher {
            npm: npm.into(),
            registry: None,
        }
    }

    /// Locate `npm` (or a path/name override) on PATH.
    pub fn locate(npm: &str) -> Result<Self> {
        let path = find_executable(npm)
            .ok_or_else(|| anyhow!("`{}` not found in PATH; install Node.js or set destination.npm", npm))?;
        Ok(Self::new(path))
    }

    /// Publish to a non-default registry.
    ///
    /// The public registry is npm's own default and is not passed explicitly.
    pub fn with_registry(mut self, registry: &str) -> Self {
        let trimmed = registry.trim_end_matches('/');
        self.registry = if trimmed == DEFAULT_REGISTRY {
            None
        } else {
            Some(trimmed.to_string())
        };
        self
    }

    fn command(&self) -> ProcessBuilder {
        let cmd = ProcessBuilder::new(&self.npm);
        match &self.registry {
            Some(registry) => cmd.args(["--registry", registry.as_str()]),
            None => cmd,
        }
    }

    fn publish_command(&self, archive: &Path) -> ProcessBuilder {
        self.command().arg("publish").arg(archive)
    }

    fn dist_tag_command(&self, module: &str, version: &str) -> ProcessBuilder {
        self.command()
            .args(["dist-tag", "add"])
            .arg(format!("{}@{}", module, version))
            .arg("latest")
    }
}

impl Publisher for NpmPublisher {
    fn publish(&self, archive: &Path) -> PublishOutcome {
        match self.publish_command(archive).exec() {
            Ok(output) if output.success => PublishOutcome::Published,
            Ok(output) => classify_publish_failure(&output.stderr),
            Err(e) => PublishOutcome::Failed(format!("{:#}", e)),
        }
    }

    fn set_latest(&self, module: &str, version: &str) -> Result<()> {
        self.dist_tag_command(module, version)
            .exec_and_check()
            .with_context(|| format!("failed to tag {}@{} as latest", module, version))?;
        Ok(())
    }
}

/// Turn the stderr of a failed `npm publish` into an outcome.
pub fn classify_publish_failure(stderr: &str) -> PublishOutcome {
    if CONFLICT_MARKERS.iter().any(|m| stderr.contains(m)) {
        return PublishOutcome::AlreadyExists;
    }

    let message = stderr.trim();
    if message.is_empty() {
        PublishOutcome::Failed("npm publish failed without output".to_string())
    } else {
        PublishOutcome::Failed(message.to_string())
    }
}
