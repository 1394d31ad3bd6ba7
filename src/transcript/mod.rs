//! Conversation transcript loading
//!
//! Claude Code writes one JSON object per line to
//! `~/.claude/projects/<project>/<conversation>.jsonl`. Records are free-form;
//! this module gives them a typed view while keeping the original object so
//! it can be written back out untouched.

mod discovery;

pub use discovery::{find_conversation_files, list_projects, ProjectSummary};

use chrono::{DateTime, FixedOffset};
use serde::{Serialize, Serializer};
use serde_json::Value;
use std::fs;
use std::path::Path;
use tracing::warn;

use crate::timestamp::parse_timestamp;

/// Record type tag (`type` field).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordKind {
    User,
    Assistant,
    Other(String),
    /// No `type` field at all.
    Untyped,
}

/// One block of `message.content`.
#[derive(Debug, Clone, PartialEq)]
pub enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: Option<String>,
        name: Option<String>,
        input: Value,
    },
    /// Any block type not modelled above (`thinking`, `tool_result`, ...).
    Other {
        kind: Option<String>,
    },
}

/// Token counts from `message.usage`; missing counts are zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// A single transcript line.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptRecord {
    pub kind: RecordKind,
    pub timestamp: Option<String>,
    pub cwd: Option<String>,
    pub git_branch: Option<String>,
    pub version: Option<String>,
    pub content: Vec<ContentBlock>,
    pub usage: TokenUsage,
    message_model: Option<String>,
    top_level_model: Option<String>,
    raw: Value,
}

/// Non-empty string field of a JSON object.
fn str_field(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(String::from)
}

fn parse_block(item: &Value) -> ContentBlock {
    match item.get("type").and_then(|t| t.as_str()) {
        Some("text") => ContentBlock::Text {
            text: item
                .get("text")
                .and_then(|t| t.as_str())
                .unwrap_or_default()
                .to_string(),
        },
        Some("tool_use") => ContentBlock::ToolUse {
            id: str_field(item, "id"),
            name: str_field(item, "name"),
            input: item.get("input").cloned().unwrap_or(Value::Null),
        },
        other => ContentBlock::Other {
            kind: other.map(String::from),
        },
    }
}

impl TranscriptRecord {
    /// Build the typed view of a parsed line. Returns `None` for JSON values
    /// that are not objects.
    pub fn from_value(raw: Value) -> Option<Self> {
        if !raw.is_object() {
            return None;
        }

        let kind = match raw.get("type").and_then(|v| v.as_str()) {
            Some("user") => RecordKind::User,
            Some("assistant") => RecordKind::Assistant,
            Some(other) => RecordKind::Other(other.to_string()),
            None => RecordKind::Untyped,
        };

        let message = raw.get("message");

        // Only block lists carry blocks; a bare string prompt stays in `raw`.
        let content = match message.and_then(|m| m.get("content")) {
            Some(Value::Array(items)) => items.iter().map(parse_block).collect(),
            _ => Vec::new(),
        };

        let usage = message
            .and_then(|m| m.get("usage"))
            .map(|usage| TokenUsage {
                input_tokens: usage.get("input_tokens").and_then(|v| v.as_u64()).unwrap_or(0),
                output_tokens: usage.get("output_tokens").and_then(|v| v.as_u64()).unwrap_or(0),
            })
            .unwrap_or_default();

        Some(Self {
            kind,
            timestamp: str_field(&raw, "timestamp"),
            cwd: str_field(&raw, "cwd"),
            git_branch: str_field(&raw, "gitBranch"),
            version: str_field(&raw, "version"),
            content,
            usage,
            message_model: message.and_then(|m| str_field(m, "model")),
            top_level_model: str_field(&raw, "model"),
            raw,
        })
    }

    /// The record's timestamp, if present and parsable.
    pub fn parsed_timestamp(&self) -> Option<DateTime<FixedOffset>> {
        self.timestamp.as_deref().and_then(parse_timestamp)
    }

    /// Model identifier: `message.model` first, then the top-level `model`.
    pub fn model(&self) -> Option<&str> {
        self.message_model
            .as_deref()
            .or(self.top_level_model.as_deref())
    }

    pub fn raw(&self) -> &Value {
        &self.raw
    }
}

impl Serialize for TranscriptRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.raw.serialize(serializer)
    }
}

/// A line that could not be turned into a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    /// 1-based line number.
    pub line: usize,
    pub message: String,
}

/// Ordered records of one transcript file.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    records: Vec<TranscriptRecord>,
}

impl Transcript {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Parse JSONL contents. Blank lines are ignored; every other line that
    /// is not a JSON object is reported and skipped.
    pub fn parse(contents: &str) -> (Self, Vec<ParseError>) {
        let mut records = Vec::new();
        let mut errors = Vec::new();

        for (i, line) in contents.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<Value>(line) {
                Ok(value) => match TranscriptRecord::from_value(value) {
                    Some(record) => records.push(record),
                    None => errors.push(ParseError {
                        line: i + 1,
                        message: "expected a JSON object".to_string(),
                    }),
                },
                Err(e) => errors.push(ParseError {
                    line: i + 1,
                    message: e.to_string(),
                }),
            }
        }

        (Self { records }, errors)
    }

    pub fn records(&self) -> &[TranscriptRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<TranscriptRecord> {
        self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Read a transcript file. Never fails: an unreadable file gives an empty
/// transcript and malformed lines are skipped, each with a warning.
pub fn read_transcript(path: &Path) -> Transcript {
    let contents = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            warn!("Error reading file {}: {}", path.display(), e);
            return Transcript::empty();
        }
    };

    let (transcript, errors) = Transcript::parse(&contents);
    for err in &errors {
        warn!(
            "Failed to parse line {} in {}: {}",
            err.line,
            path.display(),
            err.message
        );
    }
    transcript
}
