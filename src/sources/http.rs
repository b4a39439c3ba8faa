//! Blocking HTTP plumbing shared by the registry clients.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::blocking::{Client, Response};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use reqwest::StatusCode;
use url::Url;

use crate::sources::error::{RegistryError, RegistryResult};

/// User agent for registry requests.
const USER_AGENT_VALUE: &str = concat!("ferry/", env!("CARGO_PKG_VERSION"));

/// Default request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Accept header for metadata requests.
const ACCEPT_JSON: &str = "application/json";

/// Accept header for tarball downloads.
const ACCEPT_ARCHIVE: &str = "application/octet-stream";

/// Thin wrapper over a blocking reqwest client.
///
/// Maps transport failures and HTTP statuses onto [`RegistryError`] and
/// keeps a secret (the Gemfury API key lives in the URL path) out of every
/// message it produces.
///
/// Metadata requests are bounded by the configured timeout as a whole.
/// Tarball downloads only bound connection setup, since the body is streamed
/// and may take arbitrarily long for a large package.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    timeout: Duration,
    secret: Option<String>,
}

impl HttpClient {
    /// Create a client with the given request timeout.
    pub fn new(timeout: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));

        let client = Client::builder()
            .connect_timeout(timeout)
            .timeout(None::<Duration>)
            .default_headers(headers)
            .build()
            .context("failed to create HTTP client")?;

        Ok(HttpClient {
            client,
            timeout,
            secret: None,
        })
    }

    /// Mask `secret` wherever a URL is reported.
    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        let secret = secret.into();
        if !secret.is_empty() {
            self.secret = Some(secret);
        }
        self
    }

    /// Render a URL (or any text containing one) for logs and errors.
    pub fn display_url(&self, url: &str) -> String {
        match &self.secret {
            Some(secret) => url.replace(secret.as_str(), "***"),
            None => url.to_string(),
        }
    }

    /// GET a JSON document and read the whole body.
    ///
    /// A 404 becomes `RegistryError::NotFound { name: subject }`.
    pub fn get_bytes(&self, url: &Url, subject: &str) -> RegistryResult<Vec<u8>> {
        let response = self.send(url, subject, ACCEPT_JSON, Some(self.timeout))?;
        let body = response.bytes().map_err(|e| RegistryError::Network {
            url: self.display_url(url.as_str()),
            message: format!("failed to read response body: {}", e.without_url()),
        })?;
        Ok(body.to_vec())
    }

    /// GET a tarball, returning the response for streaming.
    pub fn get_archive(&self, url: &Url, subject: &str) -> RegistryResult<Response> {
        self.send(url, subject, ACCEPT_ARCHIVE, None)
    }

    fn send(
        &self,
        url: &Url,
        subject: &str,
        accept: &'static str,
        timeout: Option<Duration>,
    ) -> RegistryResult<Response> {
        let shown = self.display_url(url.as_str());
        tracing::debug!("GET {}", shown);

        let mut request = self.client.get(url.clone()).header(ACCEPT, accept);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        let response = request.send().map_err(|e| RegistryError::Network {
            url: shown.clone(),
            message: self.display_url(&e.without_url().to_string()),
        })?;

        match response.status() {
            status if status.is_success() => Ok(response),
            StatusCode::NOT_FOUND => Err(RegistryError::NotFound {
                name: self.display_url(subject),
            }),
            status => Err(RegistryError::Http {
                url: shown,
                status: status.as_u16(),
            }),
        }
    }
}

/// Append path segments to a base URL, percent-encoding each one.
///
/// Scoped names such as `@acme/widgets` become a single `@acme%2Fwidgets`
/// segment, which is how npm-compatible registries address them.
pub fn join_segments(base: &Url, segments: &[&str]) -> RegistryResult<Url> {
    let mut url = base.clone();
    {
        let mut path = url.path_segments_mut().map_err(|_| RegistryError::InvalidUrl {
            url: base.to_string(),
        })?;
        path.pop_if_empty();
        for segment in segments {
            path.push(segment);
        }
    }
    Ok(url)
}
