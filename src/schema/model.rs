//! Session record layout

use chrono::{DateTime, FixedOffset};
use serde::{Serialize, Serializer};

use super::ModelTally;
use crate::git::ChangeSet;
use crate::transcript::TranscriptRecord;

fn rfc3339_or_empty<S: Serializer>(
    value: &Option<DateTime<FixedOffset>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match value {
        Some(dt) => serializer.serialize_str(&dt.to_rfc3339()),
        None => serializer.serialize_str(""),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionRecord {
    pub session: SessionInfo,
    pub data: SessionData,
    pub metadata: Metadata,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub id: String,
    pub conversation_id: String,
    #[serde(serialize_with = "rfc3339_or_empty")]
    pub started_at: Option<DateTime<FixedOffset>>,
    #[serde(serialize_with = "rfc3339_or_empty")]
    pub ended_at: Option<DateTime<FixedOffset>>,
    pub duration_seconds: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionData {
    pub conversation: Conversation,
    pub git: GitData,
    pub io_summary: IoSummary,
}

#[derive(Debug, Clone, Serialize)]
pub struct Conversation {
    pub messages: Vec<TranscriptRecord>,
    pub total_turns: usize,
    pub total_tokens: TokenTotals,
}

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct TokenTotals {
    pub input: u64,
    pub output: u64,
    /// Always `input + output`.
    pub total: u64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct GitData {
    pub commits: CommitPair,
    pub branch: BranchInfo,
    pub changes: ChangeSet,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct CommitPair {
    pub before: String,
    pub after: String,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct BranchInfo {
    pub name: String,
    pub base: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct IoSummary {
    pub user_requests: Vec<UserRequest>,
    pub agent_actions: AgentActions,
    pub outcomes: Outcomes,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct UserRequest {
    pub timestamp: Option<String>,
    pub text: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct AgentActions {
    pub tool_uses: Vec<ToolUse>,
    pub files_read: Vec<String>,
    pub files_written: Vec<String>,
    pub commands_executed: Vec<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ToolUse {
    pub timestamp: Option<String>,
    pub tool: Option<String>,
    pub id: Option<String>,
}

/// Not derived from transcripts yet; kept so consumers see a stable shape.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Outcomes {
    pub completed_tasks: Vec<String>,
    pub failed_tasks: Vec<String>,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Metadata {
    pub project: ProjectMeta,
    pub user: UserMeta,
    pub agent: AgentMeta,
    pub environment: EnvironmentMeta,
    pub feedback: Feedback,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProjectMeta {
    pub name: String,
    pub repo_url: String,
    pub local_path: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserMeta {
    pub id: String,
    pub email: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AgentMeta {
    pub name: String,
    pub model: String,
    pub version: String,
    #[serde(skip_serializing_if = "ModelTally::is_empty")]
    pub model_usage: ModelTally,
}

#[derive(Debug, Clone, Serialize)]
pub struct EnvironmentMeta {
    pub os: String,
    pub platform: String,
    pub working_directory: String,
}

impl EnvironmentMeta {
    pub fn current(working_directory: String) -> Self {
        Self {
            os: std::env::consts::OS.to_string(),
            platform: format!("{}-{}", std::env::consts::OS, std::env::consts::ARCH),
            working_directory,
        }
    }
}

/// Filled in later by reviewers; always empty when generated.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Feedback {
    pub rating: Option<u8>,
    pub comment: String,
    pub submitted_at: String,
}
