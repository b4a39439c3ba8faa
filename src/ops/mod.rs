//! High-level operations.
//!
//! This module contains the implementation of ferry commands.

pub mod diff;
pub mod errors;
pub mod events;
pub mod migrate;
pub mod rewrite;

pub use errors::MigrateError;
pub use events::{MigrationEvent, NullReporter, RecordingReporter, Reporter, TracingReporter};
pub use migrate::{
    MigrateOptions, MigrationSummary, Migrator, ModuleReport, ModuleState, VersionState,
};
pub use rewrite::{
    rewrite, rewrite_file, OutputCompression, RewriteError, RewriteOptions, RewriteSummary,
};
