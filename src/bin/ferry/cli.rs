//! CLI definitions using clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_complete::Shell as CompletionShell;

use ferry::util::shell::ColorChoice;

/// ferry - Migrate npm packages from Gemfury to an npm registry
#[derive(Parser)]
#[command(name = "ferry")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Only print errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Coloring: auto, always, never
    #[arg(long, global = true, default_value = "auto")]
    pub color: ColorChoice,

    /// Output format for status messages
    #[arg(long, global = true, value_enum, default_value_t = MessageFormat::Human)]
    pub message_format: MessageFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum MessageFormat {
    /// Status lines and progress bars on stderr
    Human,
    /// One JSON object per line on stdout
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Republish every Gemfury version missing from the npm registry
    Migrate(MigrateArgs),

    /// Sanitize the manifest of a local package tarball
    Rewrite(RewriteArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Args)]
pub struct MigrateArgs {
    /// Gemfury account name
    #[arg(long, env = "FURY_USER")]
    pub user: Option<String>,

    /// Gemfury API key
    #[arg(long, env = "FURY_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Destination npm registry URL
    #[arg(long, env = "FERRY_REGISTRY")]
    pub registry: Option<String>,

    /// Base URL of the Gemfury npm endpoint
    #[arg(long)]
    pub source_url: Option<String>,

    /// Only migrate these modules
    #[arg(long, value_name = "NAME")]
    pub only: Vec<String>,

    /// List pending versions without downloading or publishing
    #[arg(long)]
    pub dry_run: bool,

    /// Point the `latest` dist-tag at the highest version afterwards
    #[arg(long)]
    pub tag_latest: bool,

    /// Publish plain tar archives instead of gzip
    #[arg(long)]
    pub no_gzip: bool,

    /// Exit with an error if any version failed
    #[arg(long)]
    pub strict: bool,
}

#[derive(Args)]
pub struct RewriteArgs {
    /// Package tarball to read (.tgz or .tar)
    pub input: PathBuf,

    /// Where to write the rewritten tarball
    pub output: PathBuf,

    /// Write a plain tar instead of gzip
    #[arg(long)]
    pub no_gzip: bool,

    /// File name of the manifest entry
    #[arg(long, value_name = "NAME")]
    pub manifest_name: Option<String>,
}

#[derive(Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: CompletionShell,
}
