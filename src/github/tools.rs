//! Named tool registry and dispatch over [`GithubClient`]

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use super::{GithubClient, GithubTransport, IssueState, StatusChangeError};
use crate::error::GithubError;

const DEFAULT_LIMIT: u32 = 30;
const MAX_LIMIT: u32 = 100;

/// A tool as advertised to callers.
#[derive(Debug, Clone, Serialize)]
pub struct ToolDefinition {
    pub name: &'static str,
    pub description: &'static str,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

pub fn tool_definitions() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition {
            name: "get_issue_project_info",
            description: "Get the project items and status of an issue",
            input_schema: json!({
                "type": "object",
                "properties": {"issue_node_id": {"type": "string"}},
                "required": ["issue_node_id"]
            }),
        },
        ToolDefinition {
            name: "update_project_status",
            description: "Change the status of a GitHub Projects V2 item",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "project_id": {"type": "string"},
                    "item_id": {"type": "string"},
                    "field_id": {"type": "string"},
                    "option_id": {"type": "string"}
                },
                "required": ["project_id", "item_id", "field_id", "option_id"]
            }),
        },
        ToolDefinition {
            name: "get_issue_node_id_from_repo_info",
            description: "Get the node ID of an issue from its repository and number",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "owner": {"type": "string"},
                    "repo": {"type": "string"},
                    "issue_number": {"type": "integer"}
                },
                "required": ["owner", "repo", "issue_number"]
            }),
        },
        ToolDefinition {
            name: "change_issue_status_by_repo_info",
            description: "Change the project status of an issue identified by repository and number",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "owner": {"type": "string"},
                    "repo": {"type": "string"},
                    "issue_number": {"type": "integer"},
                    "from_status": {"type": "string"},
                    "to_status": {"type": "string"}
                },
                "required": ["owner", "repo", "issue_number", "from_status", "to_status"]
            }),
        },
        ToolDefinition {
            name: "change_issue_status_by_node_id",
            description: "Change the project status of an issue identified by node ID",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "issue_node_id": {"type": "string"},
                    "from_status": {"type": "string"},
                    "to_status": {"type": "string"}
                },
                "required": ["issue_node_id", "from_status", "to_status"]
            }),
        },
        ToolDefinition {
            name: "list_repository_issues",
            description: "List the issues of a repository",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "owner": {"type": "string"},
                    "repo": {"type": "string"},
                    "state": {
                        "type": "string",
                        "enum": ["open", "closed", "all"],
                        "default": "open"
                    },
                    "labels": {"type": "array", "items": {"type": "string"}},
                    "limit": {
                        "type": "integer",
                        "minimum": 1,
                        "maximum": MAX_LIMIT,
                        "default": DEFAULT_LIMIT
                    }
                },
                "required": ["owner", "repo"]
            }),
        },
        ToolDefinition {
            name: "update_issue_assignees",
            description: "Set the assignees field in the body of an issue",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "owner": {"type": "string"},
                    "repo": {"type": "string"},
                    "issue_number": {"type": "integer"},
                    "assignees": {"type": "array", "items": {"type": "string"}}
                },
                "required": ["owner", "repo", "issue_number", "assignees"]
            }),
        },
    ]
}

#[derive(Deserialize)]
struct IssueNodeArgs {
    issue_node_id: String,
}

#[derive(Deserialize)]
struct UpdateStatusArgs {
    project_id: String,
    item_id: String,
    field_id: String,
    option_id: String,
}

#[derive(Deserialize)]
struct RepoIssueArgs {
    owner: String,
    repo: String,
    issue_number: u64,
}

#[derive(Deserialize)]
struct StatusByRepoArgs {
    owner: String,
    repo: String,
    issue_number: u64,
    from_status: String,
    to_status: String,
}

#[derive(Deserialize)]
struct StatusByNodeArgs {
    issue_node_id: String,
    from_status: String,
    to_status: String,
}

fn default_limit() -> u32 {
    DEFAULT_LIMIT
}

#[derive(Deserialize)]
struct ListIssuesArgs {
    owner: String,
    repo: String,
    #[serde(default)]
    state: IssueState,
    #[serde(default)]
    labels: Vec<String>,
    #[serde(default = "default_limit")]
    limit: u32,
}

#[derive(Deserialize)]
struct AssigneesArgs {
    owner: String,
    repo: String,
    issue_number: u64,
    assignees: Vec<String>,
}

fn parse_args<A: DeserializeOwned>(tool: &str, arguments: Value) -> Result<A, GithubError> {
    let arguments = if arguments.is_null() { json!({}) } else { arguments };
    serde_json::from_value(arguments).map_err(|e| GithubError::InvalidArguments {
        tool: tool.to_string(),
        message: e.to_string(),
    })
}

fn status_result<T: Serialize>(result: Result<T, StatusChangeError>) -> Result<Value, GithubError> {
    match result {
        Ok(change) => Ok(json!(change)),
        Err(StatusChangeError::Transport(e)) => Err(e),
        Err(miss) => Ok(miss.to_json()),
    }
}

/// Run the tool `name` with JSON `arguments` and render its result as
/// pretty JSON. Lookup misses are rendered as `{"error": ...}`; transport
/// failures and bad invocations are errors.
pub fn dispatch<T: GithubTransport>(
    client: &GithubClient<T>,
    name: &str,
    arguments: Value,
) -> Result<String, GithubError> {
    debug!("Dispatching tool {}", name);

    let result = match name {
        "get_issue_project_info" => {
            let args: IssueNodeArgs = parse_args(name, arguments)?;
            client.get_issue_project_info(&args.issue_node_id)?
        }
        "update_project_status" => {
            let args: UpdateStatusArgs = parse_args(name, arguments)?;
            client.update_project_status(&args.project_id, &args.item_id, &args.field_id, &args.option_id)?
        }
        "get_issue_node_id_from_repo_info" => {
            let args: RepoIssueArgs = parse_args(name, arguments)?;
            client.get_issue_node_id_from_repo_info(&args.owner, &args.repo, args.issue_number)?
        }
        "change_issue_status_by_repo_info" => {
            let args: StatusByRepoArgs = parse_args(name, arguments)?;
            status_result(client.change_issue_status_by_repo_info(
                &args.owner,
                &args.repo,
                args.issue_number,
                &args.from_status,
                &args.to_status,
            ))?
        }
        "change_issue_status_by_node_id" => {
            let args: StatusByNodeArgs = parse_args(name, arguments)?;
            status_result(client.change_issue_status_by_node_id(
                &args.issue_node_id,
                &args.from_status,
                &args.to_status,
            ))?
        }
        "list_repository_issues" => {
            let args: ListIssuesArgs = parse_args(name, arguments)?;
            if !(1..=MAX_LIMIT).contains(&args.limit) {
                return Err(GithubError::InvalidArguments {
                    tool: name.to_string(),
                    message: format!("limit must be between 1 and {MAX_LIMIT}, got {}", args.limit),
                });
            }
            client.list_repository_issues(&args.owner, &args.repo, args.state, &args.labels, args.limit)?
        }
        "update_issue_assignees" => {
            let args: AssigneesArgs = parse_args(name, arguments)?;
            match client.update_issue_assignees(&args.owner, &args.repo, args.issue_number, &args.assignees) {
                Ok(update) => json!(update),
                Err(super::AssigneeUpdateError::Transport(e)) => return Err(e),
                Err(miss) => miss.to_json(),
            }
        }
        other => return Err(GithubError::UnknownTool(other.to_string())),
    };

    serde_json::to_string_pretty(&result).map_err(|e| GithubError::Request(e.to_string()))
}
