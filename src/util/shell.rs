//! Centralized shell output and progress management.
//!
//! The Shell module provides a unified API for all CLI output, including:
//! - Status messages with consistent formatting
//! - A per-module progress bar (via indicatif)
//! - JSON output mode for machine-readable output
//!
//! # Design Principles
//!
//! 1. **Commands never manage spacing/indentation directly** - Shell handles all formatting
//! 2. **JSON mode is mutually exclusive** - No human output when JSON mode is enabled
//! 3. **Migration code never prints** - it emits events; [`ShellReporter`] renders them

use std::fmt::Display;
use std::io::{self, IsTerminal, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

use crate::ops::events::{MigrationEvent, Reporter};

/// Shell output mode - Human and Json are mutually exclusive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellMode {
    /// Human-readable output with optional colors and progress bars.
    Human {
        verbosity: Verbosity,
        color: ColorChoice,
    },
    /// Machine-readable JSON output only.
    Json,
}

impl Default for ShellMode {
    fn default() -> Self {
        ShellMode::Human {
            verbosity: Verbosity::Normal,
            color: ColorChoice::Auto,
        }
    }
}

/// Output verbosity level (Human mode only).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verbosity {
    /// --quiet: errors only, no progress
    Quiet,
    /// Default: status messages + progress bars
    #[default]
    Normal,
    /// --verbose: immediate status lines, debug info, no progress bars
    Verbose,
}

/// Color output mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorChoice {
    /// Detect TTY and use colors if available.
    #[default]
    Auto,
    /// Always use ANSI colors.
    Always,
    /// Never use ANSI colors.
    Never,
}

impl std::str::FromStr for ColorChoice {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(ColorChoice::Auto),
            "always" => Ok(ColorChoice::Always),
            "never" => Ok(ColorChoice::Never),
            _ => Err(format!(
                "invalid color choice '{}'; expected 'auto', 'always', or 'never'",
                s
            )),
        }
    }
}

/// Status types for output messages.
///
/// Shell handles all formatting - callers just specify the semantic status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    // Success statuses (green)
    Published,
    Rewrote,
    Finished,

    // In-progress statuses (cyan)
    Checking,
    Migrating,

    // Info statuses (blue/default)
    Pending,

    // Warning statuses (yellow)
    Skipped,
    Warning,

    // Error status (red)
    Error,
}

impl Status {
    /// Get the display text for this status.
    fn as_str(&self) -> &'static str {
        match self {
            Status::Published => "Published",
            Status::Rewrote => "Rewrote",
            Status::Finished => "Finished",
            Status::Checking => "Checking",
            Status::Migrating => "Migrating",
            Status::Pending => "Pending",
            Status::Skipped => "Skipped",
            Status::Warning => "Warning",
            Status::Error => "error",
        }
    }

    /// Get the ANSI color code for this status.
    fn color_code(&self) -> &'static str {
        match self {
            Status::Published | Status::Rewrote | Status::Finished => "\x1b[1;32m",
            Status::Checking | Status::Migrating => "\x1b[1;36m",
            Status::Pending => "\x1b[1;34m",
            Status::Skipped | Status::Warning => "\x1b[1;33m",
            Status::Error => "\x1b[1;31m",
        }
    }

    /// Get the width for alignment (12 characters).
    fn width(&self) -> usize {
        12
    }
}

/// Central shell for all CLI output.
#[derive(Debug)]
pub struct Shell {
    mode: ShellMode,
    use_color: bool,
    /// JSON output buffer for machine-readable mode
    json_output: Mutex<Vec<String>>,
    /// Whether we've printed anything (for newline management)
    has_output: AtomicBool,
}

impl Shell {
    /// Create a new shell with the given mode.
    pub fn new(mode: ShellMode) -> Self {
        let use_color = match &mode {
            ShellMode::Json => false,
            ShellMode::Human { color, .. } => match color {
                ColorChoice::Auto => io::stderr().is_terminal(),
                ColorChoice::Always => true,
                ColorChoice::Never => false,
            },
        };

        Shell {
            mode,
            use_color,
            json_output: Mutex::new(Vec::new()),
            has_output: AtomicBool::new(false),
        }
    }

    /// Create a shell from CLI flags with proper precedence.
    ///
    /// JSON mode takes precedence over quiet/verbose.
    pub fn from_flags(
        quiet: bool,
        verbose: bool,
        color: ColorChoice,
        message_format_json: bool,
    ) -> Self {
        let mode = if message_format_json {
            ShellMode::Json
        } else {
            let verbosity = if quiet {
                Verbosity::Quiet
            } else if verbose {
                Verbosity::Verbose
            } else {
                Verbosity::Normal
            };
            ShellMode::Human { verbosity, color }
        };

        Shell::new(mode)
    }

    /// Check if shell is in quiet mode.
    pub fn is_quiet(&self) -> bool {
        matches!(
            self.mode,
            ShellMode::Human {
                verbosity: Verbosity::Quiet,
                ..
            }
        )
    }

    /// Check if shell is in verbose mode.
    pub fn is_verbose(&self) -> bool {
        matches!(
            self.mode,
            ShellMode::Human {
                verbosity: Verbosity::Verbose,
                ..
            }
        )
    }

    /// Check if shell is in JSON mode.
    pub fn is_json(&self) -> bool {
        matches!(self.mode, ShellMode::Json)
    }

    /// Print a status message.
    ///
    /// Format: `{status:>12} {message}`
    ///
    /// In quiet mode, only Error status is printed.
    /// In JSON mode, messages are silently ignored (use json_event for JSON output).
    pub fn status(&self, status: Status, msg: impl Display) {
        if self.is_json() {
            return;
        }

        if self.is_quiet() && status != Status::Error {
            return;
        }

        let prefix = self.format_status(status);
        eprintln!("{} {}", prefix, msg);
        self.has_output.store(true, Ordering::SeqCst);
    }

    /// Print a warning message.
    pub fn warn(&self, msg: impl Display) {
        self.status(Status::Warning, msg);
    }

    /// Print an error message.
    ///
    /// In JSON mode, this outputs a JSON error event.
    pub fn error(&self, msg: impl Display) {
        if self.is_json() {
            let event = serde_json::json!({
                "reason": "error",
                "message": msg.to_string()
            });
            self.json_event(&event);
        } else {
            self.status(Status::Error, msg);
        }
    }

    /// Print a JSON event to stdout.
    ///
    /// Only works in JSON mode; silently ignored in human mode.
    pub fn json_event(&self, event: &serde_json::Value) {
        if !self.is_json() {
            return;
        }

        let json_str = serde_json::to_string(event).unwrap_or_default();
        println!("{}", json_str);
        let _ = io::stdout().flush();

        if let Ok(mut buffer) = self.json_output.lock() {
            buffer.push(json_str);
        }
    }

    /// Every JSON line emitted so far.
    pub fn json_lines(&self) -> Vec<String> {
        self.json_output
            .lock()
            .map(|lines| lines.clone())
            .unwrap_or_default()
    }

    /// Format a status prefix with optional color.
    fn format_status(&self, status: Status) -> String {
        let text = status.as_str();
        let width = status.width();

        if self.use_color {
            let color = status.color_code();
            format!("{}{:>width$}\x1b[0m", color, text, width = width)
        } else {
            format!("{:>width$}", text, width = width)
        }
    }

    /// Create a progress bar for one module.
    ///
    /// In quiet, verbose or JSON mode, returns a no-op progress bar.
    pub fn module_progress(&self, index: usize, total: usize, name: &str) -> ModuleProgress {
        ModuleProgress::new(self, index, total, name)
    }
}

impl Default for Shell {
    fn default() -> Self {
        Shell::new(ShellMode::default())
    }
}

/// Progress bar for the module currently being migrated.
///
/// Renders as `[ 3 / 12 ] name stage [#####>----] 45%`.
pub struct ModuleProgress {
    pb: Option<ProgressBar>,
    name: String,
}

impl ModuleProgress {
    /// Resolution of the underlying bar.
    const STEPS: u64 = 1000;

    fn new(shell: &Shell, index: usize, total: usize, name: &str) -> Self {
        let pb = if shell.is_quiet() || shell.is_verbose() || shell.is_json() {
            None
        } else {
            let pb = ProgressBar::new(Self::STEPS);
            if let Ok(style) = ProgressStyle::default_bar()
                .template("[ {prefix} ] {msg} [{bar:40.cyan/blue}] {percent}%")
            {
                pb.set_style(style.progress_chars("#>-"));
            }
            pb.set_prefix(format!("{} / {}", index, total));
            pb.set_message(name.to_string());
            Some(pb)
        };

        ModuleProgress {
            pb,
            name: name.to_string(),
        }
    }

    /// Move the bar to `fraction` (0.0 to 1.0) and show `stage`.
    pub fn set(&self, stage: &str, fraction: f64) {
        if let Some(pb) = &self.pb {
            pb.set_position(fraction_to_position(fraction, Self::STEPS));
            if stage.is_empty() {
                pb.set_message(self.name.clone());
            } else {
                pb.set_message(format!("{} {}", self.name, stage));
            }
        }
    }

    /// Run `f` with the bar hidden, so printed lines do not interleave.
    pub fn suspend<F: FnOnce()>(&self, f: F) {
        match &self.pb {
            Some(pb) => pb.suspend(f),
            None => f(),
        }
    }

    /// Remove the bar from the terminal.
    pub fn finish(&self) {
        if let Some(pb) = &self.pb {
            pb.finish_and_clear();
        }
    }
}

/// Map a fraction onto `0..=steps`, clamping out-of-range values.
fn fraction_to_position(fraction: f64, steps: u64) -> u64 {
    if !fraction.is_finite() {
        return 0;
    }
    (fraction.clamp(0.0, 1.0) * steps as f64).round() as u64
}

/// Renders migration events through a [`Shell`].
pub struct ShellReporter {
    shell: Arc<Shell>,
    progress: Mutex<Option<ModuleProgress>>,
}

impl ShellReporter {
    /// Create a reporter writing to `shell`.
    pub fn new(shell: Arc<Shell>) -> Self {
        ShellReporter {
            shell,
            progress: Mutex::new(None),
        }
    }

    /// Print a status line without tearing the progress bar.
    fn line(&self, status: Status, msg: impl Display) {
        let guard = self.progress.lock().ok();
        match guard.as_deref().and_then(Option::as_ref) {
            Some(progress) => progress.suspend(|| self.shell.status(status, &msg)),
            None => self.shell.status(status, msg),
        }
    }

    fn start_module(&self, index: usize, total: usize, name: &str) {
        if self.shell.is_verbose() {
            self.shell
                .status(Status::Checking, format!("[{}/{}] {}", index, total, name));
        }
        if let Ok(mut slot) = self.progress.lock() {
            if let Some(old) = slot.take() {
                old.finish();
            }
            *slot = Some(self.shell.module_progress(index, total, name));
        }
    }

    fn end_module(&self) {
        if let Ok(mut slot) = self.progress.lock() {
            if let Some(progress) = slot.take() {
                progress.finish();
            }
        }
    }
}

impl Reporter for ShellReporter {
    fn report(&self, event: &MigrationEvent) {
        if self.shell.is_json() {
            if let Ok(value) = serde_json::to_value(event) {
                self.shell.json_event(&value);
            }
            return;
        }

        match event {
            MigrationEvent::RunStarted { modules } => {
                self.shell
                    .status(Status::Checking, format!("{} module(s)", modules));
            }
            MigrationEvent::ModuleStarted { index, total, name } => {
                self.start_module(*index, *total, name);
            }
            MigrationEvent::Progress {
                stage, fraction, ..
            } => {
                if let Ok(slot) = self.progress.lock() {
                    if let Some(progress) = &*slot {
                        progress.set(stage, *fraction);
                    }
                }
            }
            MigrationEvent::VersionSkipped { name, version } => {
                if self.shell.is_verbose() {
                    self.line(
                        Status::Skipped,
                        format!("{}@{} (already published)", name, version),
                    );
                }
            }
            MigrationEvent::VersionPending { name, version } => {
                self.line(Status::Pending, format!("{}@{}", name, version));
            }
            MigrationEvent::VersionPublished { name, version } => {
                self.line(Status::Published, format!("{}@{}", name, version));
            }
            MigrationEvent::Warning { message } => {
                self.line(Status::Warning, message);
            }
            MigrationEvent::ModuleDone {
                name,
                published,
                skipped,
                failed,
            } => {
                self.end_module();
                if *published > 0 || *failed > 0 || self.shell.is_verbose() {
                    self.shell.status(
                        Status::Migrating,
                        format!(
                            "{}: {} published, {} skipped, {} failed",
                            name, published, skipped, failed
                        ),
                    );
                }
            }
            MigrationEvent::ModuleFailed { .. } => {
                self.end_module();
            }
            MigrationEvent::RunFinished { .. } => {
                self.end_module();
            }
        }
    }
}

/// Format a duration in a human-readable way.
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs_f64();
    if secs < 60.0 {
        format!("{:.2}s", secs)
    } else {
        let mins = secs / 60.0;
        format!("{:.1}m", mins)
    }
}
