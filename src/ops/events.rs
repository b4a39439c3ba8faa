//! Migration progress events.
//!
//! The orchestrator never prints. It emits one [`MigrationEvent`] per state
//! change to a [`Reporter`], which decides how (or whether) to render it.
//! With `--message-format=json` each event is written as one JSON object
//! per line, tagged by `reason`.

use std::sync::Mutex;

use serde::Serialize;

/// A discrete progress or status message.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "reason", rename_all = "kebab-case")]
pub enum MigrationEvent {
    /// Module listing succeeded.
    RunStarted { modules: usize },

    /// Processing of a module began.
    ModuleStarted {
        /// 1-based position in the listing.
        index: usize,
        total: usize,
        name: String,
    },

    /// Progress within the current module.
    Progress {
        name: String,
        /// Stage label, or the version being migrated.
        stage: String,
        /// 0.0 to 1.0.
        fraction: f64,
    },

    /// Version already exists at the destination.
    VersionSkipped { name: String, version: String },

    /// Version would be migrated (dry run only).
    VersionPending { name: String, version: String },

    /// Version was published.
    VersionPublished { name: String, version: String },

    /// Non-fatal problem.
    Warning { message: String },

    /// A module finished draining.
    ModuleDone {
        name: String,
        published: usize,
        skipped: usize,
        failed: usize,
    },

    /// A module was abandoned.
    ModuleFailed { name: String, message: String },

    /// Every module has been processed.
    RunFinished {
        modules: usize,
        published: usize,
        failed: usize,
    },
}

/// Sink for migration events.
pub trait Reporter {
    /// Handle one event.
    fn report(&self, event: &MigrationEvent);
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullReporter;

impl Reporter for NullReporter {
    fn report(&self, _event: &MigrationEvent) {}
}

/// Forwards events to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn report(&self, event: &MigrationEvent) {
        match event {
            MigrationEvent::Warning { message } => tracing::warn!("{}", message),
            MigrationEvent::ModuleFailed { name, message } => {
                tracing::warn!("{}: {}", name, message)
            }
            MigrationEvent::Progress { .. } => tracing::trace!(?event),
            _ => tracing::info!(?event),
        }
    }
}

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct RecordingReporter {
    events: Mutex<Vec<MigrationEvent>>,
}

impl RecordingReporter {
    /// Create an empty recorder.
    pub fn new() -> Self {
        RecordingReporter::default()
    }

    /// Snapshot of everything reported so far.
    pub fn events(&self) -> Vec<MigrationEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    /// Warning messages only.
    pub fn warnings(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                MigrationEvent::Warning { message } => Some(message),
                _ => None,
            })
            .collect()
    }
}

impl Reporter for RecordingReporter {
    fn report(&self, event: &MigrationEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}
