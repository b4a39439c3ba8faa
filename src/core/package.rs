//! Source-side package metadata.
//!
//! A `SourcePackage` is the subset of an npm "packument" that migration
//! needs: the version strings in publish order and, for each, the tarball
//! it can be downloaded from.

use serde::Deserialize;
use serde_json::{Map, Value};

/// One published version at the source registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionEntry {
    /// Version string exactly as the registry reports it.
    pub version: String,

    /// URL of the packaged archive.
    pub tarball: String,
}

/// A module and all of its versions at the source registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourcePackage {
    /// Module name (may be scoped, e.g. `@acme/widgets`).
    pub name: String,

    /// Versions in the order the registry enumerated them.
    pub versions: Vec<VersionEntry>,
}

#[derive(Deserialize)]
struct RawPackument {
    #[serde(default)]
    versions: Map<String, Value>,
}

#[derive(Deserialize)]
struct RawVersion {
    dist: RawDist,
}

#[derive(Deserialize)]
struct RawDist {
    tarball: String,
}

impl SourcePackage {
    /// Create a package from already-known versions.
    pub fn new(name: impl Into<String>, versions: Vec<VersionEntry>) -> Self {
        SourcePackage {
            name: name.into(),
            versions,
        }
    }

    /// Parse registry metadata JSON.
    ///
    /// Versions keep the key order of the `versions` object.
    pub fn from_json(name: &str, body: &[u8]) -> serde_json::Result<Self> {
        let raw: RawPackument = serde_json::from_slice(body)?;

        let mut versions = Vec::with_capacity(raw.versions.len());
        for (version, meta) in raw.versions {
            let meta: RawVersion = serde_json::from_value(meta)?;
            versions.push(VersionEntry {
                version,
                tarball: meta.dist.tarball,
            });
        }

        Ok(SourcePackage::new(name, versions))
    }

    /// Version strings in source order.
    pub fn version_names(&self) -> Vec<String> {
        self.versions.iter().map(|v| v.version.clone()).collect()
    }
}

/// Collect the version keys of an npm packument body.
pub fn versions_from_json(body: &[u8]) -> serde_json::Result<Vec<String>> {
    let raw: RawPackument = serde_json::from_slice(body)?;
    Ok(raw.versions.keys().cloned().collect())
}
