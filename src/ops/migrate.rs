//! The migration orchestrator.
//!
//! For every source module, in listing order:
//!
//! ```text
//! Listing ─> Diffing ─> Draining ─> Done
//!    │          │           │
//!    └──────────┴───────────┴──> Failed(reason)
//! ```
//!
//! and for every pending version of that module, strictly one at a time:
//!
//! ```text
//! Downloading ─> Rewriting ─> Publishing ─> Published | Skipped | Failed(reason)
//! ```
//!
//! A failure only ever ends the module or version it happened in. The one
//! exception is the initial module listing: without it there is nothing to
//! iterate, so the run fails.

use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use semver::Version;
use tempfile::TempDir;

use crate::core::{SourcePackage, VersionEntry};
use crate::ops::diff;
use crate::ops::errors::MigrateError;
use crate::ops::events::{MigrationEvent, Reporter};
use crate::ops::rewrite::{rewrite, RewriteOptions};
use crate::sources::{DestinationRegistry, PublishOutcome, Publisher, SourceRegistry};

/// Options for a migration run.
#[derive(Debug, Clone, Default)]
pub struct MigrateOptions {
    /// How archives are rewritten.
    pub rewrite: RewriteOptions,

    /// Parent directory for temporary archives (system temp dir if unset).
    pub temp_dir: Option<PathBuf>,

    /// Only list pending versions; download and publish nothing.
    pub dry_run: bool,

    /// Point `latest` at the highest version after publishing.
    pub tag_latest: bool,

    /// Restrict the run to these modules (empty = all).
    pub only: Vec<String>,
}

/// Lifecycle of one module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleState {
    Listing,
    Diffing,
    Draining,
    Done,
    Failed(String),
}

/// Lifecycle of one version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionState {
    Downloading,
    Rewriting,
    Publishing,
    Published,
    Skipped,
    Failed(String),
}

impl fmt::Display for ModuleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModuleState::Listing => write!(f, "listing"),
            ModuleState::Diffing => write!(f, "diffing"),
            ModuleState::Draining => write!(f, "draining"),
            ModuleState::Done => write!(f, "done"),
            ModuleState::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

impl fmt::Display for VersionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionState::Downloading => write!(f, "downloading"),
            VersionState::Rewriting => write!(f, "rewriting"),
            VersionState::Publishing => write!(f, "publishing"),
            VersionState::Published => write!(f, "published"),
            VersionState::Skipped => write!(f, "skipped"),
            VersionState::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

/// Pending versions of one module, drained front to back.
pub type VersionQueue<'p> = VecDeque<&'p VersionEntry>;

/// Outcome of one module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleReport {
    pub name: String,
    pub state: ModuleState,
    /// Published during this run.
    pub published: Vec<String>,
    /// Already present at the destination before the run.
    pub skipped: Vec<String>,
    /// Rejected by the publisher as already existing.
    pub conflicts: Vec<String>,
    /// Failed, with the reason.
    pub failed: Vec<(String, String)>,
    /// Would have been migrated (dry run).
    pub pending: Vec<String>,
}

impl ModuleReport {
    fn new(name: &str) -> Self {
        ModuleReport {
            name: name.to_string(),
            state: ModuleState::Listing,
            published: Vec::new(),
            skipped: Vec::new(),
            conflicts: Vec::new(),
            failed: Vec::new(),
            pending: Vec::new(),
        }
    }

    /// Number of versions published during this run.
    pub fn published_count(&self) -> usize {
        self.published.len()
    }

    /// Versions not migrated because the destination already had them.
    pub fn skipped_count(&self) -> usize {
        self.skipped.len() + self.conflicts.len()
    }
}

/// Outcome of a whole run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationSummary {
    pub modules: Vec<ModuleReport>,
}

impl MigrationSummary {
    /// Versions published across all modules.
    pub fn published(&self) -> usize {
        self.modules.iter().map(ModuleReport::published_count).sum()
    }

    /// Versions that failed across all modules.
    pub fn failed_versions(&self) -> usize {
        self.modules.iter().map(|m| m.failed.len()).sum()
    }

    /// Modules that could not be processed at all.
    pub fn failed_modules(&self) -> usize {
        self.modules
            .iter()
            .filter(|m| matches!(m.state, ModuleState::Failed(_)))
            .count()
    }

    /// Whether anything at all went wrong.
    pub fn has_failures(&self) -> bool {
        self.failed_versions() > 0 || self.failed_modules() > 0
    }
}

/// Drives a migration from a source registry to a destination.
pub struct Migrator<'a> {
    source: &'a dyn SourceRegistry,
    dest: &'a dyn DestinationRegistry,
    publisher: &'a dyn Publisher,
    reporter: &'a dyn Reporter,
    opts: MigrateOptions,
}

impl<'a> Migrator<'a> {
    /// Wire up a migrator.
    pub fn new(
        source: &'a dyn SourceRegistry,
        dest: &'a dyn DestinationRegistry,
        publisher: &'a dyn Publisher,
        reporter: &'a dyn Reporter,
        opts: MigrateOptions,
    ) -> Self {
        Migrator {
            source,
            dest,
            publisher,
            reporter,
            opts,
        }
    }

    /// Migrate every module.
    ///
    /// Returns an error only if the module listing cannot be obtained;
    /// per-module and per-version failures are reported and recorded in the
    /// summary.
    pub fn run(&self) -> Result<MigrationSummary, MigrateError> {
        let listed = self
            .source
            .list_modules()
            .map_err(MigrateError::ListModules)?;
        let modules = self.select(listed);

        tracing::info!(
            "{} module(s) to check from {} to {}",
            modules.len(),
            self.source.name(),
            self.dest.name()
        );

        let mut scratch = Scratch::new(self.opts.temp_dir.as_deref());
        self.emit(MigrationEvent::RunStarted {
            modules: modules.len(),
        });

        let mut summary = MigrationSummary::default();
        for (i, name) in modules.iter().enumerate() {
            self.emit(MigrationEvent::ModuleStarted {
                index: i + 1,
                total: modules.len(),
                name: name.clone(),
            });
            summary.modules.push(self.migrate_module(name, &mut scratch));
        }

        self.emit(MigrationEvent::RunFinished {
            modules: summary.modules.len(),
            published: summary.published(),
            failed: summary.failed_versions(),
        });

        Ok(summary)
    }

    /// Apply the `only` filter, keeping listing order.
    fn select(&self, listed: Vec<String>) -> Vec<String> {
        if self.opts.only.is_empty() {
            return listed;
        }

        let wanted: HashSet<&str> = self.opts.only.iter().map(String::as_str).collect();
        for name in &self.opts.only {
            if !listed.iter().any(|m| m == name) {
                self.warn(format!("{} is not published at {}", name, self.source.name()));
            }
        }
        listed
            .into_iter()
            .filter(|m| wanted.contains(m.as_str()))
            .collect()
    }

    fn migrate_module(&self, name: &str, scratch: &mut Scratch<'_>) -> ModuleReport {
        let mut report = ModuleReport::new(name);

        match self.drain_module(name, scratch, &mut report) {
            Ok(()) => {
                self.set_state(&mut report, ModuleState::Done);
                self.emit(MigrationEvent::ModuleDone {
                    name: name.to_string(),
                    published: report.published_count(),
                    skipped: report.skipped_count(),
                    failed: report.failed.len(),
                });
            }
            Err(e) => {
                let message = e.to_string();
                self.warn(message.clone());
                self.set_state(&mut report, ModuleState::Failed(message.clone()));
                self.emit(MigrationEvent::ModuleFailed {
                    name: name.to_string(),
                    message,
                });
            }
        }

        report
    }

    fn drain_module(
        &self,
        name: &str,
        scratch: &mut Scratch<'_>,
        report: &mut ModuleReport,
    ) -> Result<(), MigrateError> {
        self.progress(name, "Source Fetch", 0.0);
        let package = self
            .source
            .fetch_metadata(name)
            .map_err(|source| MigrateError::ModuleFetch {
                module: name.to_string(),
                source,
            })?;

        self.progress(name, "Destination Fetch", 0.05);
        let existing = match self.dest.fetch_versions(name) {
            Ok(versions) => versions,
            Err(e) if e.is_not_found() => {
                tracing::debug!("{} is not yet published at {}", name, self.dest.name());
                HashSet::new()
            }
            Err(source) => {
                return Err(MigrateError::ModuleFetch {
                    module: name.to_string(),
                    source,
                })
            }
        };

        self.set_state(report, ModuleState::Diffing);
        let all = package.version_names();
        for version in diff::skipped(&all, &existing) {
            self.emit(MigrationEvent::VersionSkipped {
                name: name.to_string(),
                version: version.clone(),
            });
            report.skipped.push(version);
        }
        let pending: HashSet<String> = diff::pending(&all, &existing).into_iter().collect();
        let mut queue: VersionQueue<'_> = package
            .versions
            .iter()
            .filter(|entry| pending.contains(&entry.version))
            .collect();

        self.set_state(report, ModuleState::Draining);
        let total = queue.len();
        let mut done = 0;

        while let Some(entry) = queue.pop_front() {
            let version = entry.version.clone();
            self.progress(name, &version, 0.1 + 0.85 * (done as f64 / total as f64));
            done += 1;

            if self.opts.dry_run {
                self.emit(MigrationEvent::VersionPending {
                    name: name.to_string(),
                    version: version.clone(),
                });
                report.pending.push(version);
                continue;
            }

            match self.migrate_version(name, entry, scratch) {
                Ok(()) => {
                    self.emit(MigrationEvent::VersionPublished {
                        name: name.to_string(),
                        version: version.clone(),
                    });
                    report.published.push(version);
                }
                Err(e @ MigrateError::PublishConflict { .. }) => {
                    self.log_version(name, &version, &VersionState::Skipped);
                    self.warn(format!("Skipping {}: {}", version, e));
                    report.conflicts.push(version);
                }
                Err(e) => {
                    let reason = e.to_string();
                    self.log_version(name, &version, &VersionState::Failed(reason.clone()));
                    self.warn(reason.clone());
                    report.failed.push((version, reason));
                }
            }
        }

        if self.opts.tag_latest && !report.published.is_empty() {
            self.tag_latest(&package, &existing);
        }

        self.progress(name, "", 1.0);
        Ok(())
    }

    /// Download, rewrite and publish one version.
    ///
    /// The rewritten archive lives in a uniquely named temporary file that is
    /// deleted when this function returns, whatever the outcome.
    fn migrate_version(
        &self,
        module: &str,
        entry: &VersionEntry,
        scratch: &mut Scratch<'_>,
    ) -> Result<(), MigrateError> {
        let version = entry.version.as_str();
        let temp_err = |source| MigrateError::TempFile {
            module: module.to_string(),
            version: version.to_string(),
            source,
        };

        self.log_version(module, version, &VersionState::Downloading);
        let mut archive = tempfile::Builder::new()
            .prefix(&archive_prefix(module, version))
            .suffix(self.opts.rewrite.compression.extension())
            .tempfile_in(scratch.path().map_err(temp_err)?)
            .map_err(temp_err)?;
        let body = self
            .source
            .download_archive(&entry.tarball)
            .map_err(|source| MigrateError::Download {
                module: module.to_string(),
                version: version.to_string(),
                source,
            })?;

        self.log_version(module, version, &VersionState::Rewriting);
        {
            let mut writer = BufWriter::new(archive.as_file_mut());
            let summary = rewrite(body, &mut writer, &self.opts.rewrite)
                .map_err(|e| MigrateError::from_rewrite(module, version, e))?;
            writer.flush().map_err(temp_err)?;
            tracing::debug!(
                "{}@{}: {} entries, manifest {:?}",
                module,
                version,
                summary.entries,
                summary.manifest.map(|m| m.path)
            );
        }
        archive.as_file().sync_all().map_err(temp_err)?;

        self.log_version(module, version, &VersionState::Publishing);
        match self.publisher.publish(archive.path()) {
            PublishOutcome::Published => {
                self.log_version(module, version, &VersionState::Published);
                Ok(())
            }
            PublishOutcome::AlreadyExists => Err(MigrateError::PublishConflict {
                module: module.to_string(),
                version: version.to_string(),
            }),
            PublishOutcome::Failed(message) => Err(MigrateError::Publish {
                module: module.to_string(),
                version: version.to_string(),
                message,
            }),
        }
    }

    fn tag_latest(&self, package: &SourcePackage, existing: &HashSet<String>) {
        let candidates = package
            .versions
            .iter()
            .map(|v| v.version.as_str())
            .chain(existing.iter().map(String::as_str));

        let Some(latest) = highest_version(candidates) else {
            return;
        };

        match self.publisher.set_latest(&package.name, &latest) {
            Ok(()) => tracing::info!("tagged {}@{} as latest", package.name, latest),
            Err(e) => self.warn(format!("{:#}", e)),
        }
    }

    fn set_state(&self, report: &mut ModuleReport, state: ModuleState) {
        tracing::debug!("{}: {} -> {}", report.name, report.state, state);
        report.state = state;
    }

    fn log_version(&self, module: &str, version: &str, state: &VersionState) {
        tracing::debug!("{}@{}: {}", module, version, state);
    }

    fn progress(&self, name: &str, stage: &str, fraction: f64) {
        self.emit(MigrationEvent::Progress {
            name: name.to_string(),
            stage: stage.to_string(),
            fraction,
        });
    }

    fn warn(&self, message: String) {
        self.emit(MigrationEvent::Warning { message });
    }

    fn emit(&self, event: MigrationEvent) {
        self.reporter.report(&event);
    }
}

/// Directory for temporary archives, created on first use.
///
/// A dry run never asks for it, so nothing is created on disk.
struct Scratch<'p> {
    parent: Option<&'p Path>,
    dir: Option<TempDir>,
}

impl<'p> Scratch<'p> {
    fn new(parent: Option<&'p Path>) -> Self {
        Scratch { parent, dir: None }
    }

    fn path(&mut self) -> io::Result<&Path> {
        let dir = match self.dir.take() {
            Some(dir) => dir,
            None => {
                let mut builder = tempfile::Builder::new();
                builder.prefix("ferry-");
                let dir = match self.parent {
                    Some(parent) => builder.tempdir_in(parent)?,
                    None => builder.tempdir()?,
                };
                tracing::debug!("scratch directory {}", dir.path().display());
                dir
            }
        };
        Ok(self.dir.insert(dir).path())
    }
}

/// Highest semver version, preferring releases over prereleases.
///
/// Strings that are not valid semver are ignored.
pub fn highest_version<'v>(versions: impl IntoIterator<Item = &'v str>) -> Option<String> {
    let parsed: Vec<Version> = versions
        .into_iter()
        .filter_map(|v| Version::parse(v).ok())
        .collect();

    let release = parsed.iter().filter(|v| v.pre.is_empty()).max();
    release
        .or_else(|| parsed.iter().max())
        .map(Version::to_string)
}

/// Temp file prefix: `<name>-<version>-`, with path separators flattened.
fn archive_prefix(module: &str, version: &str) -> String {
    let flat: String = format!("{}-{}", module, version)
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '-'
            }
        })
        .collect();
    format!("{}-", flat.trim_start_matches('-'))
}
