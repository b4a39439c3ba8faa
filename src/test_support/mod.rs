//! Test utilities and mocks for ferry unit tests.
//!
//! The mocks implement the registry and publisher traits in memory and
//! record every call, so orchestration can be tested without a network or
//! an `npm` binary.
//!
//! # Example
//!
//! ```rust,ignore
//! use ferry::test_support::{MockSource, MockDestination, MockPublisher, TarballFixture};
//!
//! #[test]
//! fn test_example() {
//!     let tgz = TarballFixture::npm_package(json!({"name": "a", "version": "1.0.0"})).to_tgz();
//!     let source = MockSource::new().module("a", &[("1.0.0", tgz)]);
//!     let dest = MockDestination::new();
//!     let publisher = MockPublisher::new();
//!
//!     // Run a Migrator over the mocks...
//! }
//! ```

pub mod fixtures;

use std::collections::{HashMap, HashSet};
use std::io::{self, Cursor, Read, Write};
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{bail, Result};
use serde_json::Value;

use crate::core::{SourcePackage, VersionEntry, MANIFEST_NAME};
use crate::sources::{
    DestinationRegistry, PublishOutcome, Publisher, RegistryError, RegistryResult, SourceRegistry,
};

// Re-export fixtures for convenience
pub use fixtures::*;

/// In-memory source registry.
#[derive(Debug, Default)]
pub struct MockSource {
    modules: Vec<String>,
    packages: HashMap<String, SourcePackage>,
    /// Tarball URL -> (id, bytes).
    archives: HashMap<String, (String, Vec<u8>)>,
    failing_metadata: HashSet<String>,
    failing_downloads: HashSet<String>,
    /// Tarball URL -> bytes served before the stream breaks.
    interrupted_downloads: HashMap<String, usize>,
    fail_listing: bool,
    metadata_requests: Mutex<Vec<String>>,
    downloads: Mutex<Vec<String>>,
}

impl MockSource {
    /// Create an empty source.
    pub fn new() -> Self {
        MockSource::default()
    }

    /// Tarball URL for a version.
    pub fn tarball_url(name: &str, version: &str) -> String {
        format!("https://npm.fury.io/acme/{name}/-/{name}-{version}.tgz")
    }

    /// Add a module with its versions in publish order.
    pub fn module(mut self, name: &str, versions: &[(&str, Vec<u8>)]) -> Self {
        let mut entries = Vec::new();
        for (version, bytes) in versions {
            let url = Self::tarball_url(name, version);
            self.archives
                .insert(url.clone(), (format!("{name}@{version}"), bytes.clone()));
            entries.push(VersionEntry {
                version: version.to_string(),
                tarball: url,
            });
        }

        self.modules.push(name.to_string());
        self.packages
            .insert(name.to_string(), SourcePackage::new(name, entries));
        self
    }

    /// Make the module listing fail.
    pub fn fail_listing(mut self) -> Self {
        self.fail_listing = true;
        self
    }

    /// Make metadata for a module fail.
    pub fn fail_metadata(mut self, name: &str) -> Self {
        self.failing_metadata.insert(name.to_string());
        self
    }

    /// Make one tarball download fail.
    pub fn fail_download(mut self, name: &str, version: &str) -> Self {
        self.failing_downloads
            .insert(Self::tarball_url(name, version));
        self
    }

    /// Make one tarball stream fail with a connection reset after `after`
    /// bytes.
    pub fn interrupt_download(mut self, name: &str, version: &str, after: usize) -> Self {
        self.interrupted_downloads
            .insert(Self::tarball_url(name, version), after);
        self
    }

    /// Modules whose metadata was requested, in order.
    pub fn metadata_requests(&self) -> Vec<String> {
        self.metadata_requests.lock().unwrap().clone()
    }

    /// `name@version` of every download attempt, in order.
    pub fn downloads(&self) -> Vec<String> {
        self.downloads.lock().unwrap().clone()
    }
}

impl SourceRegistry for MockSource {
    fn name(&self) -> &str {
        "mock-source"
    }

    fn list_modules(&self) -> RegistryResult<Vec<String>> {
        if self.fail_listing {
            return Err(RegistryError::Http {
                url: "https://npm.fury.io/***/acme".into(),
                status: 500,
            });
        }
        Ok(self.modules.clone())
    }

    fn fetch_metadata(&self, module: &str) -> RegistryResult<SourcePackage> {
        self.metadata_requests
            .lock()
            .unwrap()
            .push(module.to_string());

        if self.failing_metadata.contains(module) {
            return Err(RegistryError::Network {
                url: format!("https://npm.fury.io/***/acme/{module}"),
                message: "connection reset".into(),
            });
        }
        self.packages
            .get(module)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound {
                name: module.to_string(),
            })
    }

    fn download_archive(&self, url: &str) -> RegistryResult<Box<dyn Read>> {
        let (id, bytes) = self
            .archives
            .get(url)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound {
                name: url.to_string(),
            })?;
        self.downloads.lock().unwrap().push(id);

        if self.failing_downloads.contains(url) {
            return Err(RegistryError::Http {
                url: url.to_string(),
                status: 502,
            });
        }
        match self.interrupted_downloads.get(url) {
            Some(&after) => Ok(Box::new(InterruptedReader {
                inner: Cursor::new(bytes),
                remaining: after,
            })),
            None => Ok(Box::new(Cursor::new(bytes))),
        }
    }
}

/// Reader that serves some bytes and then fails like a dropped connection.
struct InterruptedReader {
    inner: Cursor<Vec<u8>>,
    remaining: usize,
}

impl Read for InterruptedReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.remaining == 0 {
            return Err(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "connection reset by peer",
            ));
        }
        let limit = buf.len().min(self.remaining);
        let n = self.inner.read(&mut buf[..limit])?;
        self.remaining -= n;
        Ok(n)
    }
}

/// In-memory destination registry.
///
/// Modules without registered versions answer `NotFound`.
#[derive(Debug, Default)]
pub struct MockDestination {
    versions: HashMap<String, HashSet<String>>,
    errors: HashMap<String, u16>,
}

impl MockDestination {
    /// Create a destination with nothing published.
    pub fn new() -> Self {
        MockDestination::default()
    }

    /// Mark versions of a module as already published.
    pub fn versions(mut self, name: &str, versions: &[&str]) -> Self {
        self.versions.insert(
            name.to_string(),
            versions.iter().map(|v| v.to_string()).collect(),
        );
        self
    }

    /// Make lookups for a module answer with an HTTP error.
    pub fn fail(mut self, name: &str, status: u16) -> Self {
        self.errors.insert(name.to_string(), status);
        self
    }
}

impl DestinationRegistry for MockDestination {
    fn name(&self) -> &str {
        "mock-destination"
    }

    fn fetch_versions(&self, module: &str) -> RegistryResult<HashSet<String>> {
        if let Some(status) = self.errors.get(module) {
            return Err(RegistryError::Http {
                url: format!("https://registry.npmjs.org/{module}"),
                status: *status,
            });
        }
        self.versions
            .get(module)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound {
                name: module.to_string(),
            })
    }
}

/// A publish attempt seen by [`MockPublisher`].
#[derive(Debug, Clone)]
pub struct PublishedArchive {
    /// `name@version` from the archive's manifest.
    pub id: String,
    /// The manifest as published.
    pub manifest: Value,
    /// Where the archive was when it was published.
    pub path: PathBuf,
    /// Whether the archive was gzip-framed.
    pub gzipped: bool,
    /// Every file in the archive's directory at publish time.
    pub siblings: Vec<PathBuf>,
    /// What the publisher answered.
    pub outcome: PublishOutcome,
}

/// Publisher that inspects archives instead of uploading them.
#[derive(Debug, Default)]
pub struct MockPublisher {
    outcomes: HashMap<String, PublishOutcome>,
    published: Mutex<Vec<PublishedArchive>>,
    latest: Mutex<Vec<(String, String)>>,
    fail_latest: bool,
}

impl MockPublisher {
    /// Create a publisher that accepts everything.
    pub fn new() -> Self {
        MockPublisher::default()
    }

    /// Answer `outcome` when `id` (`name@version`) is published.
    pub fn outcome(mut self, id: &str, outcome: PublishOutcome) -> Self {
        self.outcomes.insert(id.to_string(), outcome);
        self
    }

    /// Make `set_latest` fail.
    pub fn fail_latest(mut self) -> Self {
        self.fail_latest = true;
        self
    }

    /// Every publish attempt, in order.
    pub fn published(&self) -> Vec<PublishedArchive> {
        self.published.lock().unwrap().clone()
    }

    /// `name@version` of every successful publish, in order.
    pub fn published_ids(&self) -> Vec<String> {
        self.published()
            .into_iter()
            .filter(|p| p.outcome == PublishOutcome::Published)
            .map(|p| p.id)
            .collect()
    }

    /// Every `set_latest` call, in order.
    pub fn latest_tags(&self) -> Vec<(String, String)> {
        self.latest.lock().unwrap().clone()
    }

    fn inspect(path: &Path) -> (Value, bool) {
        let bytes = std::fs::read(path).unwrap();
        let gzipped = bytes.starts_with(&[0x1f, 0x8b]);
        let tar = if gzipped { gunzip(&bytes) } else { bytes };

        let manifest = read_raw_entries(&tar)
            .into_iter()
            .find(|e| e.path == MANIFEST_NAME || e.path.ends_with(&format!("/{MANIFEST_NAME}")))
            .map(|e| serde_json::from_slice(&e.data).unwrap())
            .unwrap_or(Value::Null);

        (manifest, gzipped)
    }
}

impl Publisher for MockPublisher {
    fn publish(&self, archive: &Path) -> PublishOutcome {
        let (manifest, gzipped) = Self::inspect(archive);
        let id = format!(
            "{}@{}",
            manifest["name"].as_str().unwrap_or_default(),
            manifest["version"].as_str().unwrap_or_default()
        );
        let outcome = self
            .outcomes
            .get(&id)
            .cloned()
            .unwrap_or(PublishOutcome::Published);

        let mut siblings: Vec<PathBuf> = archive
            .parent()
            .map(|dir| {
                std::fs::read_dir(dir)
                    .unwrap()
                    .map(|e| e.unwrap().path())
                    .collect()
            })
            .unwrap_or_default();
        siblings.sort();

        self.published.lock().unwrap().push(PublishedArchive {
            id,
            manifest,
            path: archive.to_path_buf(),
            gzipped,
            siblings,
            outcome: outcome.clone(),
        });
        outcome
    }

    fn set_latest(&self, module: &str, version: &str) -> Result<()> {
        if self.fail_latest {
            bail!("`npm dist-tag add {module}@{version} latest` failed");
        }
        self.latest
            .lock()
            .unwrap()
            .push((module.to_string(), version.to_string()));
        Ok(())
    }
}

/// Answer a single HTTP request on a local port with a canned response.
///
/// Returns the base URL (`http://127.0.0.1:<port>`).
pub fn serve_once(response: &'static str) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    std::thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut request = Vec::new();
        let mut buf = [0u8; 1024];
        while !request.windows(4).any(|w| w == b"\r\n\r\n") {
            match stream.read(&mut buf) {
                Ok(0) | Err(_) => break,
                Ok(n) => request.extend_from_slice(&buf[..n]),
            }
        }
        stream.write_all(response.as_bytes()).unwrap();
    });
    format!("http://127.0.0.1:{port}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_mock_source_serves_archives() {
        let tgz = TarballFixture::npm_package(json!({"name": "a"})).to_tgz();
        let source = MockSource::new().module("a", &[("1.0.0", tgz.clone())]);

        assert_eq!(source.list_modules().unwrap(), vec!["a"]);
        let pkg = source.fetch_metadata("a").unwrap();
        let mut body = Vec::new();
        source
            .download_archive(&pkg.versions[0].tarball)
            .unwrap()
            .read_to_end(&mut body)
            .unwrap();

        assert_eq!(body, tgz);
        assert_eq!(source.downloads(), vec!["a@1.0.0"]);
    }

    #[test]
    fn test_mock_source_interrupts_stream() {
        let tgz = TarballFixture::npm_package(json!({"name": "a"})).to_tgz();
        let source = MockSource::new()
            .module("a", &[("1.0.0", tgz)])
            .interrupt_download("a", "1.0.0", 10);

        let mut body = Vec::new();
        let err = source
            .download_archive(&MockSource::tarball_url("a", "1.0.0"))
            .unwrap()
            .read_to_end(&mut body)
            .unwrap_err();

        assert_eq!(err.kind(), io::ErrorKind::ConnectionReset);
        assert_eq!(body.len(), 10);
    }

    #[test]
    fn test_mock_destination_not_found() {
        let dest = MockDestination::new().versions("a", &["1.0.0"]);

        assert!(dest.fetch_versions("a").unwrap().contains("1.0.0"));
        assert!(dest.fetch_versions("b").unwrap_err().is_not_found());
    }

    #[test]
    fn test_mock_publisher_reads_manifest() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("a.tgz");
        let tgz = TarballFixture::npm_package(json!({"name": "a", "version": "1.0.0"})).to_tgz();
        std::fs::write(&path, tgz).unwrap();

        let publisher = MockPublisher::new();
        assert_eq!(publisher.publish(&path), PublishOutcome::Published);
        assert_eq!(publisher.published_ids(), vec!["a@1.0.0"]);
        assert!(publisher.published()[0].gzipped);
    }
}
