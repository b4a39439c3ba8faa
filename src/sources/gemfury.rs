//! Gemfury npm registry as a migration source.
//!
//! Gemfury serves a private npm registry at `{base}/{api_key}/{user}`:
//!
//! - `GET {root}` returns a JSON array of module names
//! - `GET {root}/{name}` returns npm-style package metadata
//! - tarball URLs inside that metadata are fetched as-is

use std::io::Read;

use anyhow::{Context, Result};
use url::Url;

use crate::core::SourcePackage;
use crate::sources::error::{RegistryError, RegistryResult};
use crate::sources::http::{join_segments, HttpClient};
use crate::sources::source::SourceRegistry;

/// Default Gemfury npm endpoint.
pub const DEFAULT_GEMFURY_URL: &str = "https://npm.fury.io";

/// A Gemfury account used as the source registry.
#[derive(Debug, Clone)]
pub struct GemfurySource {
    http: HttpClient,
    root: Url,
    user: String,
}

impl GemfurySource {
    /// Create a source for `user`, authenticated by `api_key`.
    pub fn new(http: HttpClient, base_url: &str, user: &str, api_key: &str) -> Result<Self> {
        let base = Url::parse(base_url)
            .with_context(|| format!("invalid source registry url: {}", base_url))?;
        let root = join_segments(&base, &[api_key, user])?;

        Ok(GemfurySource {
            http: http.with_secret(api_key),
            root,
            user: user.to_string(),
        })
    }

    /// The account name.
    pub fn user(&self) -> &str {
        &self.user
    }
}

impl SourceRegistry for GemfurySource {
    fn name(&self) -> &str {
        "gemfury"
    }

    fn list_modules(&self) -> RegistryResult<Vec<String>> {
        let body = self.http.get_bytes(&self.root, &self.user)?;

        serde_json::from_slice(&body).map_err(|e| RegistryError::InvalidResponse {
            url: self.http.display_url(self.root.as_str()),
            message: format!("expected a list of module names: {}", e),
        })
    }

    fn fetch_metadata(&self, module: &str) -> RegistryResult<SourcePackage> {
        let url = join_segments(&self.root, &[module])?;
        let body = self.http.get_bytes(&url, module)?;

        SourcePackage::from_json(module, &body).map_err(|e| RegistryError::InvalidResponse {
            url: self.http.display_url(url.as_str()),
            message: e.to_string(),
        })
    }

    fn download_archive(&self, url: &str) -> RegistryResult<Box<dyn Read>> {
        let parsed = Url::parse(url).map_err(|_| RegistryError::InvalidUrl {
            url: self.http.display_url(url),
        })?;
        let response = self.http.get_archive(&parsed, url)?;
        Ok(Box::new(response))
    }
}
