//! Upload command implementation

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::Config;
use crate::git::GitInfo;
use crate::sink::{OutputTarget, S3Client, Sink};
use crate::store::UploadHistoryStore;
use crate::upload::{resolve_commit_range, CommitRange, UploadMode, UploadStats, Uploader};

/// Command-line options; unset values fall back to the config file.
#[derive(Debug, Default)]
pub struct UploadOptions {
    pub project: Option<String>,
    pub repo_path: Option<PathBuf>,
    pub mode: Option<UploadMode>,
    pub before_commit: Option<String>,
    pub after_commit: Option<String>,
    pub bucket: Option<String>,
    pub prefix: Option<String>,
    pub output_dir: Option<PathBuf>,
    pub dry_run: bool,
    pub projects_dir: Option<PathBuf>,
    pub history_dir: Option<PathBuf>,
}

/// Pick the single output target. `--output-dir` wins over a bucket from
/// the config file but not over `--bucket`.
pub(crate) fn output_target(
    config: &Config,
    bucket: Option<&str>,
    prefix: Option<&str>,
    output_dir: Option<&Path>,
) -> Result<OutputTarget> {
    if bucket.is_some() && output_dir.is_some() {
        bail!("Only one of --bucket or --output-dir can be specified");
    }
    if let Some(dir) = output_dir {
        return Ok(OutputTarget::Directory(dir.to_path_buf()));
    }
    match bucket.map(str::to_string).or_else(|| config.s3.bucket.clone()) {
        Some(bucket) => Ok(OutputTarget::ObjectStorage {
            bucket,
            prefix: prefix.map(str::to_string).unwrap_or_else(|| config.s3.prefix.clone()),
        }),
        None => bail!("Either --bucket, --output-dir, or s3.bucket in the config file must be specified"),
    }
}

/// A dry run never writes, so it does not need credentials.
pub(crate) fn sink_for(config: &Config, target: &OutputTarget, dry_run: bool) -> Result<Sink> {
    Ok(match target {
        OutputTarget::ObjectStorage { .. } if !dry_run => Sink::with_store(Box::new(
            S3Client::from_config(&config.s3, Duration::from_secs(config.s3.timeout_secs))?,
        )),
        _ => Sink::local(),
    })
}

pub fn run(config: &Config, opts: UploadOptions) -> Result<()> {
    let project = opts
        .project
        .clone()
        .or_else(|| config.project.name.clone())
        .context("--project is required (either as argument or in config file)")?;
    let repo_path = opts
        .repo_path
        .clone()
        .or_else(|| config.repo_path())
        .context("--repo-path is required (either as argument or in config file)")?;
    let mode = opts.mode.unwrap_or(UploadMode::Manual);
    let target = output_target(
        config,
        opts.bucket.as_deref(),
        opts.prefix.as_deref(),
        opts.output_dir.as_deref(),
    )?;

    let history = UploadHistoryStore::new(
        opts.history_dir
            .clone()
            .unwrap_or_else(|| config.history_dir()),
    );
    let projects_dir = opts
        .projects_dir
        .clone()
        .unwrap_or_else(|| config.projects_dir());

    let git = GitInfo::open(&repo_path);
    let (before, after) = match resolve_commit_range(
        mode,
        &git,
        &repo_path,
        &history,
        &project,
        opts.before_commit.as_deref(),
        opts.after_commit.as_deref(),
    )? {
        CommitRange::Range { before, after } => (before, after),
        CommitRange::UpToDate { commit } => {
            println!("No new commits since last upload ({}).", commit);
            return Ok(());
        }
    };
    println!("Mode: {}", mode);
    println!("Commit range: {} .. {}", before, after);

    let sink = sink_for(config, &target, opts.dry_run)?;

    let uploader = Uploader::new(projects_dir, target, sink);
    let stats = uploader.process_with(&project, &git, &before, &after, opts.dry_run)?;

    if !opts.dry_run && mode == UploadMode::Latest {
        history.save(&project, &after, &repo_path)?;
        println!("Recorded {} as last uploaded commit", after);
    }

    print_summary(&stats, opts.dry_run);
    Ok(())
}

fn print_summary(stats: &UploadStats, dry_run: bool) {
    println!();
    println!("{}", "=".repeat(60));
    println!("Summary{}:", if dry_run { " (dry run)" } else { "" });
    println!("  Files found: {}", stats.files_found);
    println!("  Files processed: {}", stats.files_processed);
    println!("  Files saved: {}", stats.files_saved);
    println!("  Total messages: {}", stats.messages_total);
    println!("  Messages in commit range: {}", stats.messages_trimmed);
    println!("{}", "=".repeat(60));
}
