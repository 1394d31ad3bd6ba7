//! Writing session records to their destination

mod s3;

pub use s3::{Credentials, S3Client};

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use serde::Serialize;
use std::fmt;
use std::fs;
use std::path::PathBuf;
use tracing::{error, info};

pub const CONTENT_TYPE: &str = "application/json";
/// `source` metadata of commit-range session records.
pub const SOURCE_TAG: &str = "claude_code_history_enhanced";
/// `source` metadata of raw transcript exports.
pub const RAW_SOURCE_TAG: &str = "claude_code_history";

/// Durable object storage.
pub trait ObjectStore {
    fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: &[u8],
        content_type: &str,
        metadata: &[(&str, String)],
    ) -> Result<()>;
}

/// Where one record goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    ObjectStorage { bucket: String, key: String },
    File(PathBuf),
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Destination::ObjectStorage { bucket, key } => write!(f, "s3://{bucket}/{key}"),
            Destination::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Where a whole run writes: a bucket under a key prefix, or a directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputTarget {
    ObjectStorage { bucket: String, prefix: String },
    Directory(PathBuf),
}

/// File name of one artifact; one per run, so reruns never overwrite.
pub fn artifact_name(conversation_id: &str, generated_at: DateTime<Local>) -> String {
    format!(
        "{}_{}.json",
        conversation_id,
        generated_at.format("%Y%m%d_%H%M%S")
    )
}

impl OutputTarget {
    /// `<prefix-or-dir>/<project>/<after-commit>/<conversation>_<timestamp>.json`
    pub fn destination(
        &self,
        project: &str,
        after_commit: &str,
        conversation_id: &str,
        generated_at: DateTime<Local>,
    ) -> Destination {
        self.locate(&[project, after_commit], artifact_name(conversation_id, generated_at))
    }

    /// `<prefix-or-dir>/<project>/<conversation>_<timestamp>.json`, the
    /// layout of raw exports that carry no commit range.
    pub fn export_destination(
        &self,
        project: &str,
        conversation_id: &str,
        generated_at: DateTime<Local>,
    ) -> Destination {
        self.locate(&[project], artifact_name(conversation_id, generated_at))
    }

    fn locate(&self, dirs: &[&str], name: String) -> Destination {
        match self {
            OutputTarget::ObjectStorage { bucket, prefix } => {
                let prefix = prefix.trim_end_matches('/');
                let mut parts: Vec<&str> = Vec::with_capacity(dirs.len() + 2);
                if !prefix.is_empty() {
                    parts.push(prefix);
                }
                parts.extend_from_slice(dirs);
                parts.push(&name);
                Destination::ObjectStorage {
                    bucket: bucket.clone(),
                    key: parts.join("/"),
                }
            }
            OutputTarget::Directory(dir) => {
                let mut path = dir.clone();
                path.extend(dirs);
                Destination::File(path.join(name))
            }
        }
    }
}

/// Serializes records and hands them to the filesystem or object storage.
pub struct Sink {
    store: Option<Box<dyn ObjectStore>>,
    source: &'static str,
}

impl Sink {
    /// A sink that can only write files.
    pub fn local() -> Self {
        Self {
            store: None,
            source: SOURCE_TAG,
        }
    }

    pub fn with_store(store: Box<dyn ObjectStore>) -> Self {
        Self {
            store: Some(store),
            source: SOURCE_TAG,
        }
    }

    /// Tag objects with a different `source` metadata value.
    pub fn with_source(mut self, source: &'static str) -> Self {
        self.source = source;
        self
    }

    /// Write `record` to `destination`. Failures are logged and reported as
    /// `false` so one bad file does not stop a batch.
    pub fn write<T: Serialize>(&self, record: &T, destination: &Destination) -> bool {
        match self.try_write(record, destination) {
            Ok(()) => {
                info!("Successfully saved to {}", destination);
                true
            }
            Err(e) => {
                error!("Error saving to {}: {:#}", destination, e);
                false
            }
        }
    }

    fn try_write<T: Serialize>(&self, record: &T, destination: &Destination) -> Result<()> {
        let json = serde_json::to_string_pretty(record).context("serializing record")?;

        match destination {
            Destination::File(path) => {
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent)
                        .with_context(|| format!("creating {}", parent.display()))?;
                }
                fs::write(path, json.as_bytes())
                    .with_context(|| format!("writing {}", path.display()))?;
            }
            Destination::ObjectStorage { bucket, key } => {
                let store = self
                    .store
                    .as_ref()
                    .context("no object storage client configured")?;
                let metadata = [
                    ("uploaded_at", Local::now().to_rfc3339()),
                    ("source", self.source.to_string()),
                ];
                store.put_object(bucket, key, json.as_bytes(), CONTENT_TYPE, &metadata)?;
            }
        }

        Ok(())
    }
}
