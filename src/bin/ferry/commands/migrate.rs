//! `ferry migrate` command

use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Context, Result};

use crate::cli::MigrateArgs;
use ferry::ops::migrate::{MigrateOptions, Migrator};
use ferry::ops::rewrite::OutputCompression;
use ferry::sources::{GemfurySource, HttpClient, NpmPublisher, NpmRegistry};
use ferry::util::config::{global_config_path, load_config, project_config_path, Config};
use ferry::util::shell::{format_duration, Shell, ShellReporter, Status};

pub fn execute(args: MigrateArgs, shell: Arc<Shell>) -> Result<()> {
    let cwd = std::env::current_dir().context("failed to determine current directory")?;
    let global = global_config_path().unwrap_or_default();
    let mut config = load_config(&global, &project_config_path(&cwd));
    apply_overrides(&mut config, &args);

    let (user, api_key) = match (&config.source.user, &config.source.api_key) {
        (Some(user), Some(key)) if !user.is_empty() && !key.is_empty() => (user.clone(), key.clone()),
        _ => bail!(
            "missing Gemfury credentials; pass --user and --api-key, \
             set FURY_USER and FURY_API_KEY, or add them to [source] in {}",
            global.display()
        ),
    };

    let http = HttpClient::new(config.timeout())?;
    let source = GemfurySource::new(http.clone(), config.source_url(), &user, &api_key)?;
    let dest = NpmRegistry::new(http, config.registry())?;
    let publisher = if args.dry_run {
        NpmPublisher::new(config.npm())
    } else {
        NpmPublisher::locate(config.npm())?
    }
    .with_registry(config.registry());

    let opts = MigrateOptions {
        rewrite: config.rewrite_options(),
        temp_dir: config.migrate.temp_dir.clone(),
        dry_run: args.dry_run,
        tag_latest: config.migrate.tag_latest,
        only: args.only.clone(),
    };

    let reporter = ShellReporter::new(Arc::clone(&shell));
    let start = Instant::now();
    let summary = Migrator::new(&source, &dest, &publisher, &reporter, opts).run()?;

    shell.status(
        Status::Finished,
        format!(
            "{} module(s) in {}: {} published, {} failed",
            summary.modules.len(),
            format_duration(start.elapsed()),
            summary.published(),
            summary.failed_versions()
        ),
    );

    for module in summary.modules.iter().filter(|m| !m.failed.is_empty()) {
        for (version, reason) in &module.failed {
            shell.error(format!("{}@{}: {}", module.name, version, reason));
        }
    }

    if args.strict && summary.has_failures() {
        bail!(
            "{} version(s) and {} module(s) failed to migrate",
            summary.failed_versions(),
            summary.failed_modules()
        );
    }

    Ok(())
}

/// Command-line values win over both config files.
fn apply_overrides(config: &mut Config, args: &MigrateArgs) {
    if args.user.is_some() {
        config.source.user = args.user.clone();
    }
    if args.api_key.is_some() {
        config.source.api_key = args.api_key.clone();
    }
    if args.source_url.is_some() {
        config.source.url = args.source_url.clone();
    }
    if args.registry.is_some() {
        config.destination.registry = args.registry.clone();
    }
    if args.tag_latest {
        config.migrate.tag_latest = true;
    }
    if args.no_gzip {
        config.migrate.output_compression = Some(OutputCompression::None);
    }
}
