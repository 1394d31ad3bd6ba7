//! Export command implementation

use anyhow::Result;
use std::path::PathBuf;

use crate::cli::upload::{output_target, sink_for};
use crate::config::Config;
use crate::export::{ExportStats, Exporter};
use crate::sink::RAW_SOURCE_TAG;

#[derive(Debug, Default)]
pub struct ExportOptions {
    /// Only this project; every project when unset.
    pub project: Option<String>,
    pub bucket: Option<String>,
    pub prefix: Option<String>,
    pub output_dir: Option<PathBuf>,
    pub dry_run: bool,
    pub projects_dir: Option<PathBuf>,
}

pub fn run(config: &Config, opts: ExportOptions) -> Result<()> {
    let target = output_target(
        config,
        opts.bucket.as_deref(),
        opts.prefix.as_deref(),
        opts.output_dir.as_deref(),
    )?;
    let sink = sink_for(config, &target, opts.dry_run)?.with_source(RAW_SOURCE_TAG);
    let projects_dir = opts.projects_dir.unwrap_or_else(|| config.projects_dir());

    let exporter = Exporter::new(projects_dir, target, sink);
    let stats = match &opts.project {
        Some(project) => exporter.export_project(project, opts.dry_run)?,
        None => exporter.export_all(opts.dry_run)?,
    };

    print_summary(&stats, opts.dry_run);
    Ok(())
}

fn print_summary(stats: &ExportStats, dry_run: bool) {
    println!();
    println!("{}", "=".repeat(60));
    println!("Summary{}:", if dry_run { " (dry run)" } else { "" });
    println!("  Files found: {}", stats.files_found);
    println!("  Files processed: {}", stats.files_processed);
    println!("  Files saved: {}", stats.files_saved);
    println!("  Total messages extracted: {}", stats.messages_extracted);
    println!("{}", "=".repeat(60));
}
