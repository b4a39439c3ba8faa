//! Configuration file support for ferry.
//!
//! ferry reads two configuration file locations:
//! - Global: `~/.ferry/config.toml` - User-wide defaults
//! - Project: `.ferry/config.toml` - Directory-specific overrides
//!
//! Project config takes precedence over global config. Command-line flags
//! and environment variables take precedence over both.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::ops::rewrite::{OutputCompression, RewriteOptions};
use crate::sources::gemfury::DEFAULT_GEMFURY_URL;
use crate::sources::http::DEFAULT_TIMEOUT;
use crate::sources::npm::DEFAULT_REGISTRY;

/// Name of the per-user and per-project config directory.
pub const CONFIG_DIR: &str = ".ferry";

/// ferry configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Where packages come from
    pub source: SourceConfig,

    /// Where packages go
    pub destination: DestinationConfig,

    /// Migration behavior
    pub migrate: MigrateConfig,
}

/// Source registry (Gemfury) settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Base URL of the Gemfury npm endpoint
    pub url: Option<String>,

    /// Gemfury account name
    pub user: Option<String>,

    /// Gemfury API key
    pub api_key: Option<String>,
}

/// Destination registry settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DestinationConfig {
    /// npm registry URL
    pub registry: Option<String>,

    /// npm executable used for publishing
    pub npm: Option<String>,

    /// HTTP timeout in seconds
    pub timeout_secs: Option<u64>,
}

/// Migration settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrateConfig {
    /// Framing of rewritten archives (gzip, none)
    pub output_compression: Option<OutputCompression>,

    /// File name of the manifest inside tarballs
    pub manifest_name: Option<String>,

    /// Where temporary archives are written
    pub temp_dir: Option<PathBuf>,

    /// Move the `latest` dist-tag after publishing
    #[serde(default)]
    pub tag_latest: bool,
}

impl Config {
    /// Load configuration from a file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("failed to parse config file: {}", path.display()))
    }

    /// Load configuration with fallback to defaults if file doesn't exist.
    pub fn load_or_default(path: &Path) -> Self {
        if path.exists() {
            Self::load(path).unwrap_or_else(|e| {
                tracing::warn!("Failed to load config from {}: {:#}", path.display(), e);
                Self::default()
            })
        } else {
            Self::default()
        }
    }

    /// Merge another config into this one (other takes precedence).
    pub fn merge(&mut self, other: Config) {
        // Source settings
        if other.source.url.is_some() {
            self.source.url = other.source.url;
        }
        if other.source.user.is_some() {
            self.source.user = other.source.user;
        }
        if other.source.api_key.is_some() {
            self.source.api_key = other.source.api_key;
        }

        // Destination settings
        if other.destination.registry.is_some() {
            self.destination.registry = other.destination.registry;
        }
        if other.destination.npm.is_some() {
            self.destination.npm = other.destination.npm;
        }
        if other.destination.timeout_secs.is_some() {
            self.destination.timeout_secs = other.destination.timeout_secs;
        }

        // Migrate settings
        if other.migrate.output_compression.is_some() {
            self.migrate.output_compression = other.migrate.output_compression;
        }
        if other.migrate.manifest_name.is_some() {
            self.migrate.manifest_name = other.migrate.manifest_name;
        }
        if other.migrate.temp_dir.is_some() {
            self.migrate.temp_dir = other.migrate.temp_dir;
        }
        if other.migrate.tag_latest {
            self.migrate.tag_latest = true;
        }
    }

    /// Source base URL, defaulting to Gemfury.
    pub fn source_url(&self) -> &str {
        self.source.url.as_deref().unwrap_or(DEFAULT_GEMFURY_URL)
    }

    /// Destination registry URL, defaulting to the public npm registry.
    pub fn registry(&self) -> &str {
        self.destination
            .registry
            .as_deref()
            .unwrap_or(DEFAULT_REGISTRY)
    }

    /// npm executable name or path.
    pub fn npm(&self) -> &str {
        self.destination.npm.as_deref().unwrap_or("npm")
    }

    /// HTTP request timeout.
    pub fn timeout(&self) -> Duration {
        self.destination
            .timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_TIMEOUT)
    }

    /// Rewrite options derived from the `[migrate]` section.
    pub fn rewrite_options(&self) -> RewriteOptions {
        let defaults = RewriteOptions::default();
        RewriteOptions {
            manifest_name: self
                .migrate
                .manifest_name
                .clone()
                .unwrap_or(defaults.manifest_name),
            compression: self
                .migrate
                .output_compression
                .unwrap_or(defaults.compression),
        }
    }
}

/// Load merged configuration from global and project locations.
///
/// Order of precedence (highest to lowest):
/// 1. Project config (.ferry/config.toml)
/// 2. Global config (~/.ferry/config.toml)
/// 3. Defaults
pub fn load_config(global_path: &Path, project_path: &Path) -> Config {
    let mut config = Config::default();

    if global_path.exists() {
        let global = Config::load_or_default(global_path);
        config.merge(global);
    }

    // Project config overrides global
    if project_path.exists() {
        let project = Config::load_or_default(project_path);
        config.merge(project);
    }

    config
}

/// Get the global ferry config directory (~/.ferry).
pub fn global_config_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|b| b.home_dir().join(CONFIG_DIR))
}

/// Get the global config path (~/.ferry/config.toml).
pub fn global_config_path() -> Option<PathBuf> {
    global_config_dir().map(|dir| dir.join("config.toml"))
}

/// Get the project config path (.ferry/config.toml).
pub fn project_config_path(project_root: &Path) -> PathBuf {
    project_root.join(CONFIG_DIR).join("config.toml")
}
