//! Normalization of a filtered transcript into a [`SessionRecord`]

mod model;
mod tally;

pub use model::*;
pub use tally::ModelTally;

use chrono::{DateTime, FixedOffset};
use serde_json::Value;
use uuid::Uuid;

use crate::git::CommitMetadata;
use crate::transcript::{ContentBlock, RecordKind, TranscriptRecord};

pub const AGENT_NAME: &str = "claude-code";

/// User request texts are cut to this many characters.
const REQUEST_TEXT_LIMIT: usize = 200;

const READ_TOOLS: &[&str] = &["Read"];
const WRITE_TOOLS: &[&str] = &["Write", "Edit", "MultiEdit", "NotebookEdit"];
const COMMAND_TOOLS: &[&str] = &["Bash"];

/// Earliest and latest parsable timestamps.
fn session_bounds(
    messages: &[TranscriptRecord],
) -> (Option<DateTime<FixedOffset>>, Option<DateTime<FixedOffset>>) {
    let mut start: Option<DateTime<FixedOffset>> = None;
    let mut end: Option<DateTime<FixedOffset>> = None;

    for ts in messages.iter().filter_map(|m| m.parsed_timestamp()) {
        if start.map_or(true, |s| ts < s) {
            start = Some(ts);
        }
        if end.map_or(true, |e| ts > e) {
            end = Some(ts);
        }
    }

    (start, end)
}

pub fn token_totals(messages: &[TranscriptRecord]) -> TokenTotals {
    let (input, output) = messages.iter().fold((0u64, 0u64), |(i, o), m| {
        (
            i.saturating_add(m.usage.input_tokens),
            o.saturating_add(m.usage.output_tokens),
        )
    });
    TokenTotals {
        input,
        output,
        total: input.saturating_add(output),
    }
}

fn push_unique(list: &mut Vec<String>, value: &str) {
    if !list.iter().any(|v| v == value) {
        list.push(value.to_string());
    }
}

fn input_str<'a>(input: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .find_map(|key| input.get(*key).and_then(|v| v.as_str()))
        .filter(|s| !s.is_empty())
}

/// User requests and agent tool activity.
pub fn extract_io_summary(messages: &[TranscriptRecord]) -> IoSummary {
    let mut summary = IoSummary::default();

    for msg in messages {
        match msg.kind {
            RecordKind::User => {
                for block in &msg.content {
                    if let ContentBlock::Text { text } = block {
                        summary.user_requests.push(UserRequest {
                            timestamp: msg.timestamp.clone(),
                            text: text.chars().take(REQUEST_TEXT_LIMIT).collect(),
                        });
                    }
                }
            }
            RecordKind::Assistant => {
                for block in &msg.content {
                    let ContentBlock::ToolUse { id, name, input } = block else {
                        continue;
                    };
                    summary.agent_actions.tool_uses.push(ToolUse {
                        timestamp: msg.timestamp.clone(),
                        tool: name.clone(),
                        id: id.clone(),
                    });

                    let actions = &mut summary.agent_actions;
                    match name.as_deref() {
                        Some(tool) if READ_TOOLS.contains(&tool) => {
                            if let Some(path) = input_str(input, &["file_path"]) {
                                push_unique(&mut actions.files_read, path);
                            }
                        }
                        Some(tool) if WRITE_TOOLS.contains(&tool) => {
                            if let Some(path) = input_str(input, &["file_path", "notebook_path"]) {
                                push_unique(&mut actions.files_written, path);
                            }
                        }
                        Some(tool) if COMMAND_TOOLS.contains(&tool) => {
                            if let Some(command) = input_str(input, &["command"]) {
                                actions.commands_executed.push(command.to_string());
                            }
                        }
                        _ => {}
                    }
                }
            }
            RecordKind::Other(_) | RecordKind::Untyped => {}
        }
    }

    summary
}

/// Build the session record for one transcript.
///
/// `git` is the repository the session worked in, if known. `before` and
/// `after` are the commits bounding the session.
pub fn build_session_record(
    project_name: &str,
    conversation_id: &str,
    messages: Vec<TranscriptRecord>,
    git: Option<&dyn CommitMetadata>,
    before: Option<&str>,
    after: Option<&str>,
) -> SessionRecord {
    let (started_at, ended_at) = session_bounds(&messages);
    let duration_seconds = match (started_at, ended_at) {
        (Some(start), Some(end)) => (end - start).num_seconds(),
        _ => 0,
    };

    let before = before.unwrap_or_default();
    let after = after.unwrap_or_default();

    // First non-empty value wins, independently per field.
    let cwd = messages.iter().find_map(|m| m.cwd.clone());
    let git_branch = messages.iter().find_map(|m| m.git_branch.clone());
    let version = messages.iter().find_map(|m| m.version.clone());

    let mut model_usage = ModelTally::default();
    for model in messages.iter().filter_map(|m| m.model()) {
        model_usage.record(model);
    }

    let mut git_data = GitData {
        commits: CommitPair {
            before: before.to_string(),
            after: after.to_string(),
        },
        ..Default::default()
    };
    let mut repo_url = String::new();

    if let Some(git) = git {
        git_data.branch.name = git.current_branch();
        if !before.is_empty() && !after.is_empty() {
            git_data.changes = git.changes_between(before, after);
        }
        repo_url = git.remote_url();
    }

    if let Some(branch) = git_branch {
        git_data.branch.name = branch;
    }

    let total_tokens = token_totals(&messages);
    let io_summary = extract_io_summary(&messages);
    let cwd = cwd.unwrap_or_default();

    SessionRecord {
        session: SessionInfo {
            id: Uuid::new_v4().to_string(),
            conversation_id: conversation_id.to_string(),
            started_at,
            ended_at,
            duration_seconds,
        },
        data: SessionData {
            conversation: Conversation {
                total_turns: messages.len(),
                total_tokens,
                messages,
            },
            git: git_data,
            io_summary,
        },
        metadata: Metadata {
            project: ProjectMeta {
                name: project_name.to_string(),
                repo_url,
                local_path: cwd.clone(),
            },
            user: UserMeta {
                id: std::env::var("USER").unwrap_or_default(),
                email: String::new(),
            },
            agent: AgentMeta {
                name: AGENT_NAME.to_string(),
                model: model_usage.primary().unwrap_or_default().to_string(),
                version: version.unwrap_or_default(),
                model_usage,
            },
            environment: EnvironmentMeta::current(cwd),
            feedback: Feedback::default(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::{ChangeSet, CommitInfo};
    use crate::timestamp::parse_timestamp;
    use serde_json::json;
    use std::cell::RefCell;

    /// Answers from fixed values and records which diffs were requested.
    #[derive(Default)]
    struct StubGit {
        branch: String,
        remote: String,
        changes: ChangeSet,
        diff_calls: RefCell<Vec<(String, String)>>,
    }

    impl CommitMetadata for StubGit {
        fn commit_timestamp(&self, _commit: &str) -> Option<DateTime<FixedOffset>> {
            None
        }
        fn commit_info(&self, _commit: &str) -> Option<CommitInfo> {
            None
        }
        fn changes_between(&self, before: &str, after: &str) -> ChangeSet {
            self.diff_calls
                .borrow_mut()
                .push((before.to_string(), after.to_string()));
            self.changes.clone()
        }
        fn current_branch(&self) -> String {
            self.branch.clone()
        }
        fn remote_url(&self) -> String {
            self.remote.clone()
        }
        fn first_commit(&self) -> String {
            String::new()
        }
        fn previous_commit(&self, _commit: &str) -> String {
            String::new()
        }
        fn resolve(&self, _rev: &str) -> String {
            String::new()
        }
    }

    fn record(value: Value) -> TranscriptRecord {
        TranscriptRecord::from_value(value).unwrap()
    }

    #[test]
    fn test_session_timing() {
        let messages = vec![
            record(json!({"type": "user", "timestamp": "2025-10-21T10:10:00Z"})),
            record(json!({"type": "assistant", "timestamp": "2025-10-21T10:00:00Z"})),
            record(json!({"type": "assistant", "timestamp": "2025-10-21T10:40:00Z"})),
            record(json!({"type": "summary"})),
        ];
        let rec = build_session_record("proj", "conv", messages, None, None, None);

        assert_eq!(rec.session.started_at, parse_timestamp("2025-10-21T10:00:00Z"));
        assert_eq!(rec.session.ended_at, parse_timestamp("2025-10-21T10:40:00Z"));
        assert_eq!(rec.session.duration_seconds, 2400);
        assert_eq!(rec.data.conversation.total_turns, 4);
    }

    #[test]
    fn test_duration_truncates_fractional_seconds() {
        let messages = vec![
            record(json!({"timestamp": "2025-10-21T10:00:00.900Z"})),
            record(json!({"timestamp": "2025-10-21T10:00:02.100Z"})),
        ];
        let rec = build_session_record("p", "c", messages, None, None, None);
        assert_eq!(rec.session.duration_seconds, 1);
    }

    #[test]
    fn test_empty_messages() {
        let rec = build_session_record("p", "c", vec![], None, None, None);
        assert_eq!(rec.session.started_at, None);
        assert_eq!(rec.session.duration_seconds, 0);
        assert_eq!(rec.data.conversation.total_tokens, TokenTotals::default());
        assert_eq!(rec.metadata.agent.model, "");
        assert_eq!(rec.data.git.commits, CommitPair::default());

        let value = serde_json::to_value(&rec).unwrap();
        assert_eq!(value["session"]["started_at"], "");
        assert_eq!(value["session"]["ended_at"], "");
        assert!(value["metadata"]["agent"].get("model_usage").is_none());
        assert_eq!(value["metadata"]["feedback"]["rating"], Value::Null);
    }

    #[test]
    fn test_token_totals() {
        let messages = vec![
            record(json!({"message": {"usage": {"input_tokens": 10, "output_tokens": 3}}})),
            record(json!({"message": {"usage": {"input_tokens": 7}}})),
            record(json!({"message": {"content": "no usage"}})),
        ];
        let totals = token_totals(&messages);
        assert_eq!(totals, TokenTotals { input: 17, output: 3, total: 20 });
    }

    #[test]
    fn test_token_totals_saturate() {
        let messages = vec![
            record(json!({"message": {"usage": {"input_tokens": u64::MAX, "output_tokens": 5}}})),
            record(json!({"message": {"usage": {"input_tokens": 1}}})),
        ];
        let totals = token_totals(&messages);
        assert_eq!(totals.input, u64::MAX);
        assert_eq!(totals.output, 5);
        assert_eq!(totals.total, u64::MAX);

        let rec = build_session_record("p", "c", messages, None, None, None);
        assert_eq!(rec.data.conversation.total_tokens.total, u64::MAX);
    }

    #[test]
    fn test_string_prompt_is_not_a_user_request() {
        let messages = vec![
            record(json!({"type": "user", "message": {"content": "hello"}})),
            record(json!({"type": "user", "message": {"content": [{"type": "text", "text": "hi"}]}})),
        ];
        let summary = extract_io_summary(&messages);
        assert_eq!(summary.user_requests.len(), 1);
        assert_eq!(summary.user_requests[0].text, "hi");
    }

    #[test]
    fn test_model_attribution_and_version() {
        let messages = vec![
            record(json!({"type": "assistant", "message": {"model": "a"}, "version": "1.0.1"})),
            record(json!({"type": "assistant", "model": "b", "version": "1.0.2"})),
            record(json!({"type": "assistant", "message": {"model": "a"}})),
        ];
        let rec = build_session_record("p", "c", messages, None, None, None);
        let agent = &rec.metadata.agent;
        assert_eq!(agent.name, AGENT_NAME);
        assert_eq!(agent.model, "a");
        assert_eq!(agent.version, "1.0.1");
        assert_eq!(agent.model_usage.get("a"), Some(2));
        assert_eq!(agent.model_usage.get("b"), Some(1));

        let value = serde_json::to_value(&rec).unwrap();
        assert_eq!(value["metadata"]["agent"]["model_usage"], json!({"a": 2, "b": 1}));
    }

    #[test]
    fn test_io_summary() {
        let long_text: String = "x".repeat(250);
        let messages = vec![
            record(json!({
                "type": "user",
                "timestamp": "2025-10-21T10:00:00Z",
                "message": {"content": [
                    {"type": "text", "text": long_text},
                    {"type": "image", "source": {}}
                ]}
            })),
            record(json!({
                "type": "assistant",
                "timestamp": "2025-10-21T10:01:00Z",
                "message": {"content": [
                    {"type": "text", "text": "on it"},
                    {"type": "tool_use", "id": "t1", "name": "Read", "input": {"file_path": "src/lib.rs"}},
                    {"type": "tool_use", "id": "t2", "name": "Edit", "input": {"file_path": "src/lib.rs"}},
                    {"type": "tool_use", "id": "t3", "name": "Read", "input": {"file_path": "src/lib.rs"}},
                    {"type": "tool_use", "id": "t4", "name": "Bash", "input": {"command": "cargo test"}}
                ]}
            })),
            record(json!({
                "type": "user",
                "message": {"content": [{"type": "tool_result", "tool_use_id": "t1"}]}
            })),
        ];

        let summary = extract_io_summary(&messages);
        assert_eq!(summary.user_requests.len(), 1);
        assert_eq!(summary.user_requests[0].text.chars().count(), 200);
        assert_eq!(
            summary.user_requests[0].timestamp.as_deref(),
            Some("2025-10-21T10:00:00Z")
        );

        let tools: Vec<_> = summary
            .agent_actions
            .tool_uses
            .iter()
            .map(|t| (t.tool.clone().unwrap(), t.id.clone().unwrap()))
            .collect();
        assert_eq!(tools.len(), 4);
        assert_eq!(tools[0], ("Read".to_string(), "t1".to_string()));
        assert_eq!(summary.agent_actions.files_read, vec!["src/lib.rs"]);
        assert_eq!(summary.agent_actions.files_written, vec!["src/lib.rs"]);
        assert_eq!(summary.agent_actions.commands_executed, vec!["cargo test"]);
    }

    #[test]
    fn test_text_truncation_counts_characters() {
        let text: String = "日本語".repeat(100);
        let messages = vec![record(json!({
            "type": "user",
            "message": {"content": [{"type": "text", "text": text}]}
        }))];
        let summary = extract_io_summary(&messages);
        assert_eq!(summary.user_requests[0].text.chars().count(), 200);
    }

    #[test]
    fn test_cwd_and_branch_first_non_empty_wins() {
        let messages = vec![
            record(json!({"cwd": "", "gitBranch": ""})),
            record(json!({"cwd": "/first"})),
            record(json!({"cwd": "/second", "gitBranch": "feature/x"})),
            record(json!({"gitBranch": "later"})),
        ];
        let rec = build_session_record("p", "c", messages, None, None, None);
        assert_eq!(rec.metadata.project.local_path, "/first");
        assert_eq!(rec.metadata.environment.working_directory, "/first");
        assert_eq!(rec.data.git.branch.name, "feature/x");
    }

    #[test]
    fn test_transcript_branch_overrides_repository_branch() {
        let git = StubGit {
            branch: "main".into(),
            remote: "git@github.com:acme/app.git".into(),
            changes: ChangeSet {
                files_added: vec!["file2.txt".into()],
                total_additions: 1,
                ..Default::default()
            },
            ..Default::default()
        };

        let messages = vec![record(json!({"gitBranch": "feature/login"}))];
        let rec = build_session_record("p", "c", messages, Some(&git), Some("c1"), Some("c2"));
        assert_eq!(rec.data.git.branch.name, "feature/login");
        assert_eq!(rec.metadata.project.repo_url, "git@github.com:acme/app.git");
        assert_eq!(rec.data.git.changes.files_added, vec!["file2.txt"]);
        assert_eq!(
            *git.diff_calls.borrow(),
            vec![("c1".to_string(), "c2".to_string())]
        );

        let rec = build_session_record("p", "c", vec![], Some(&git), Some("c1"), Some("c2"));
        assert_eq!(rec.data.git.branch.name, "main");
    }

    #[test]
    fn test_changes_need_both_commits() {
        let git = StubGit {
            changes: ChangeSet {
                files_added: vec!["x".into()],
                ..Default::default()
            },
            ..Default::default()
        };
        let rec = build_session_record("p", "c", vec![], Some(&git), Some("c1"), None);
        assert!(rec.data.git.changes.is_empty());
        assert!(git.diff_calls.borrow().is_empty());
        assert_eq!(rec.data.git.commits.before, "c1");
        assert_eq!(rec.data.git.commits.after, "");
    }

    #[test]
    fn test_session_ids_are_unique() {
        let a = build_session_record("p", "c", vec![], None, None, None);
        let b = build_session_record("p", "c", vec![], None, None, None);
        assert_ne!(a.session.id, b.session.id);
        assert_eq!(a.session.conversation_id, "c");
    }

    #[test]
    fn test_messages_pass_through() {
        let raw = json!({"type": "user", "uuid": "u-1", "isSidechain": false});
        let rec = build_session_record("p", "c", vec![record(raw.clone())], None, None, None);
        let value = serde_json::to_value(&rec).unwrap();
        assert_eq!(value["data"]["conversation"]["messages"][0], raw);
        assert_eq!(value["metadata"]["project"]["name"], "p");
    }
}
