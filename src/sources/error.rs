//! Error types for registry access.

/// Registry errors.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// Module does not exist at this registry.
    #[error("module not found: {name}")]
    NotFound { name: String },

    /// Transport failure (DNS, connect, reset, timeout).
    #[error("network error fetching {url}: {message}")]
    Network { url: String, message: String },

    /// Registry answered with an unexpected status.
    #[error("{url} returned HTTP {status}")]
    Http { url: String, status: u16 },

    /// Body could not be decoded.
    #[error("invalid response from {url}: {message}")]
    InvalidResponse { url: String, message: String },

    /// A request URL could not be built.
    #[error("invalid registry url: {url}")]
    InvalidUrl { url: String },
}

impl RegistryError {
    /// Whether this is the "module does not exist" case.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Result type for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;
