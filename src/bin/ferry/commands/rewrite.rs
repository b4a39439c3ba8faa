//! `ferry rewrite` command

use std::sync::Arc;

use anyhow::Result;

use crate::cli::RewriteArgs;
use ferry::ops::rewrite::{rewrite_file, OutputCompression, RewriteOptions};
use ferry::util::shell::{Shell, Status};

pub fn execute(args: RewriteArgs, shell: Arc<Shell>) -> Result<()> {
    let mut opts = RewriteOptions::default();
    if let Some(name) = args.manifest_name {
        opts.manifest_name = name;
    }
    if args.no_gzip {
        opts.compression = OutputCompression::None;
    }

    let summary = rewrite_file(&args.input, &args.output, &opts)?;
    let manifest = summary.manifest.as_ref();

    if shell.is_json() {
        shell.json_event(&serde_json::json!({
            "reason": "rewrite-finished",
            "output": args.output.display().to_string(),
            "entries": summary.entries,
            "manifest": manifest.map(|m| m.path.as_str()),
            "name": manifest.and_then(|m| m.name.as_deref()),
            "version": manifest.and_then(|m| m.version.as_deref()),
        }));
        return Ok(());
    }

    let label = match manifest.and_then(|m| m.name.as_deref().zip(m.version.as_deref())) {
        Some((name, version)) => format!("{}@{}", name, version),
        None => args.input.display().to_string(),
    };
    shell.status(
        Status::Rewrote,
        format!(
            "{} ({} entries) -> {}",
            label,
            summary.entries,
            args.output.display()
        ),
    );

    Ok(())
}
