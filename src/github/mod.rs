//! GitHub Projects and Issues operations
//!
//! Raw operations return the API response unchanged. The composite status
//! change and assignee update report every lookup miss as its own error
//! variant so callers can tell the stages apart.

mod server;
mod tools;
mod transport;

pub use server::{mcp_tools, serve_stdio, GithubToolServer};
pub use tools::{dispatch, tool_definitions, ToolDefinition};
pub use transport::{GithubTransport, HttpTransport};

use chrono::Local;
use regex::{NoExpand, Regex};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

use crate::error::GithubError;

const ISSUE_PROJECT_INFO_QUERY: &str = r#"
query($issueId: ID!) {
  node(id: $issueId) {
    ... on Issue {
      number
      title
      projectItems(first: 10) {
        nodes {
          id
          project { id title number }
          fieldValues(first: 20) {
            nodes {
              ... on ProjectV2ItemFieldSingleSelectValue {
                name
                optionId
                field {
                  ... on ProjectV2SingleSelectField {
                    id
                    name
                    options { id name }
                  }
                }
              }
            }
          }
        }
      }
    }
  }
}
"#;

const UPDATE_STATUS_MUTATION: &str = r#"
mutation($projectId: ID!, $itemId: ID!, $fieldId: ID!, $optionId: String!) {
  updateProjectV2ItemFieldValue(
    input: {
      projectId: $projectId
      itemId: $itemId
      fieldId: $fieldId
      value: { singleSelectOptionId: $optionId }
    }
  ) {
    projectV2Item {
      id
      fieldValues(first: 20) {
        nodes {
          ... on ProjectV2ItemFieldSingleSelectValue {
            name
            field { ... on ProjectV2SingleSelectField { name } }
          }
        }
      }
    }
  }
}
"#;

const ISSUE_NODE_ID_QUERY: &str = r#"
query($owner: String!, $repo: String!, $issueNumber: Int!) {
  repository(owner: $owner, name: $repo) {
    issue(number: $issueNumber) { id number title state }
  }
}
"#;

const SEARCH_ISSUES_QUERY: &str = r#"
query($searchQuery: String!, $limit: Int!) {
  search(query: $searchQuery, type: ISSUE, first: $limit) {
    issueCount
    edges {
      node {
        ... on Issue {
          id
          number
          title
          state
          createdAt
          updatedAt
          author { login }
          labels(first: 10) { nodes { name color } }
          assignees(first: 5) { nodes { login } }
          projectItems(first: 5) {
            nodes {
              id
              project { id title number }
              fieldValues(first: 10) {
                nodes {
                  ... on ProjectV2ItemFieldSingleSelectValue {
                    name
                    field { ... on ProjectV2SingleSelectField { name } }
                  }
                }
              }
            }
          }
        }
      }
    }
  }
}
"#;

/// Name of the single-select project field holding an item's status.
pub const STATUS_FIELD: &str = "Status";

const ASSIGNEES_PATTERN: &str = r"(?m)^assignees:\s*\[.*?\]";

/// Why a status change stopped. Every variant except `Transport` is a
/// lookup miss reported to the caller as a structured result.
#[derive(Debug, thiserror::Error)]
pub enum StatusChangeError {
    #[error("Failed to fetch issue: {0}")]
    IssueQuery(Value),

    #[error("Issue #{0} not found")]
    IssueNotFound(u64),

    #[error("Failed to fetch project info: {0}")]
    ProjectQuery(Value),

    #[error("Issue not found")]
    NodeNotFound,

    #[error("Issue is not assigned to any project")]
    NotInProject,

    #[error("Status field not found")]
    StatusFieldMissing,

    #[error("Current status {} differs from expected \"{}\"", display_status(.current), .expected)]
    StatusMismatch {
        current: Option<String>,
        expected: String,
    },

    #[error("Status \"{target}\" not found")]
    OptionMissing {
        target: String,
        available: Vec<String>,
    },

    #[error("Failed to update status: {0}")]
    UpdateFailed(Value),

    #[error(transparent)]
    Transport(#[from] GithubError),
}

fn display_status(status: &Option<String>) -> String {
    match status {
        Some(s) => format!("\"{s}\""),
        None => "(none)".to_string(),
    }
}

impl StatusChangeError {
    /// `{"error": message}` plus the fields that help the caller recover.
    pub fn to_json(&self) -> Value {
        let mut value = json!({ "error": self.to_string() });
        match self {
            StatusChangeError::StatusMismatch { current, .. } => {
                value["current_status"] = json!(current);
            }
            StatusChangeError::OptionMissing { available, .. } => {
                value["available_statuses"] = json!(available);
            }
            _ => {}
        }
        value
    }
}

/// Why an assignee update stopped.
#[derive(Debug, thiserror::Error)]
pub enum AssigneeUpdateError {
    #[error("Issue #{0} not found")]
    IssueNotFound(u64),

    #[error("Issue body is empty")]
    EmptyBody,

    #[error("No assignees field found in issue body")]
    NoAssigneesField,

    #[error(transparent)]
    Transport(#[from] GithubError),
}

impl AssigneeUpdateError {
    pub fn to_json(&self) -> Value {
        let mut value = json!({ "error": self.to_string() });
        if let AssigneeUpdateError::NoAssigneesField = self {
            value["details"] =
                json!("Make sure the issue template contains \"assignees: []\"");
        }
        value
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IssueRef {
    pub number: u64,
    pub title: String,
    pub node_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectRef {
    pub id: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusTransition {
    pub from: String,
    pub to: String,
}

/// Successful status change.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusChange {
    pub success: bool,
    pub issue: IssueRef,
    pub project: ProjectRef,
    pub status_change: StatusTransition,
    pub update_response: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssigneeUpdate {
    pub success: bool,
    pub issue_number: u64,
    pub assignees: Vec<String>,
    pub updated_at: String,
}

/// Issue state filter for listing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueState {
    #[default]
    Open,
    Closed,
    All,
}

/// `repo:o/r is:issue [is:open|is:closed] [label:"x"]...`
pub fn issue_search_query(owner: &str, repo: &str, state: IssueState, labels: &[String]) -> String {
    let mut parts = vec![format!("repo:{owner}/{repo}"), "is:issue".to_string()];
    match state {
        IssueState::Open => parts.push("is:open".to_string()),
        IssueState::Closed => parts.push("is:closed".to_string()),
        IssueState::All => {}
    }
    for label in labels {
        parts.push(format!("label:\"{label}\""));
    }
    parts.join(" ")
}

/// Replace the first `assignees: [...]` line of an issue body.
pub fn replace_assignees(body: &str, assignees: &[String]) -> Option<String> {
    let re = Regex::new(ASSIGNEES_PATTERN).ok()?;
    if !re.is_match(body) {
        return None;
    }
    let line = format!("assignees: [{}]", assignees.join(", "));
    Some(re.replace_all(body, NoExpand(&line)).into_owned())
}

fn request_errors(response: &Value) -> Option<&Value> {
    response.get("errors")
}

fn str_at<'a>(value: &'a Value, key: &str) -> &'a str {
    value.get(key).and_then(Value::as_str).unwrap_or_default()
}

pub struct GithubClient<T: GithubTransport> {
    transport: T,
}

impl<T: GithubTransport> GithubClient<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    /// Project items of an issue with their single-select field values.
    pub fn get_issue_project_info(&self, issue_node_id: &str) -> Result<Value, GithubError> {
        self.transport
            .graphql(ISSUE_PROJECT_INFO_QUERY, json!({ "issueId": issue_node_id }))
    }

    /// Set a single-select field of a project item.
    pub fn update_project_status(
        &self,
        project_id: &str,
        item_id: &str,
        field_id: &str,
        option_id: &str,
    ) -> Result<Value, GithubError> {
        self.transport.graphql(
            UPDATE_STATUS_MUTATION,
            json!({
                "projectId": project_id,
                "itemId": item_id,
                "fieldId": field_id,
                "optionId": option_id,
            }),
        )
    }

    pub fn get_issue_node_id_from_repo_info(
        &self,
        owner: &str,
        repo: &str,
        issue_number: u64,
    ) -> Result<Value, GithubError> {
        self.transport.graphql(
            ISSUE_NODE_ID_QUERY,
            json!({ "owner": owner, "repo": repo, "issueNumber": issue_number }),
        )
    }

    pub fn change_issue_status_by_repo_info(
        &self,
        owner: &str,
        repo: &str,
        issue_number: u64,
        from_status: &str,
        to_status: &str,
    ) -> Result<StatusChange, StatusChangeError> {
        let response = self.get_issue_node_id_from_repo_info(owner, repo, issue_number)?;
        if let Some(errors) = request_errors(&response) {
            return Err(StatusChangeError::IssueQuery(errors.clone()));
        }

        let issue = &response["data"]["repository"]["issue"];
        if !issue.is_object() {
            return Err(StatusChangeError::IssueNotFound(issue_number));
        }
        let known = IssueRef {
            number: issue["number"].as_u64().unwrap_or(issue_number),
            title: str_at(issue, "title").to_string(),
            node_id: str_at(issue, "id").to_string(),
        };

        let node_id = known.node_id.clone();
        self.change_status(&node_id, Some(known), from_status, to_status)
    }

    pub fn change_issue_status_by_node_id(
        &self,
        issue_node_id: &str,
        from_status: &str,
        to_status: &str,
    ) -> Result<StatusChange, StatusChangeError> {
        self.change_status(issue_node_id, None, from_status, to_status)
    }

    /// Verify the first project item of the issue is at `from_status`, then
    /// move it to `to_status`.
    fn change_status(
        &self,
        issue_node_id: &str,
        known: Option<IssueRef>,
        from_status: &str,
        to_status: &str,
    ) -> Result<StatusChange, StatusChangeError> {
        let response = self.get_issue_project_info(issue_node_id)?;
        if let Some(errors) = request_errors(&response) {
            return Err(StatusChangeError::ProjectQuery(errors.clone()));
        }

        let node = &response["data"]["node"];
        if node.as_object().map(|o| o.is_empty()).unwrap_or(true) {
            return Err(StatusChangeError::NodeNotFound);
        }

        let item = node["projectItems"]["nodes"]
            .as_array()
            .and_then(|items| items.first())
            .ok_or(StatusChangeError::NotInProject)?;
        let project_id = str_at(&item["project"], "id");
        let item_id = str_at(item, "id");

        let (status_field, current) = item["fieldValues"]["nodes"]
            .as_array()
            .into_iter()
            .flatten()
            .find(|fv| fv["field"]["name"].as_str() == Some(STATUS_FIELD))
            .map(|fv| (&fv["field"], fv["name"].as_str().map(str::to_string)))
            .ok_or(StatusChangeError::StatusFieldMissing)?;

        if current.as_deref() != Some(from_status) {
            return Err(StatusChangeError::StatusMismatch {
                current,
                expected: from_status.to_string(),
            });
        }

        let options = status_field["options"].as_array().map(Vec::as_slice).unwrap_or_default();
        let Some(option_id) = options
            .iter()
            .find(|o| o["name"].as_str() == Some(to_status))
            .map(|o| str_at(o, "id"))
        else {
            return Err(StatusChangeError::OptionMissing {
                target: to_status.to_string(),
                available: options
                    .iter()
                    .filter_map(|o| o["name"].as_str().map(str::to_string))
                    .collect(),
            });
        };

        let update_response =
            self.update_project_status(project_id, item_id, str_at(status_field, "id"), option_id)?;
        if let Some(errors) = request_errors(&update_response) {
            return Err(StatusChangeError::UpdateFailed(errors.clone()));
        }

        let issue = known.unwrap_or_else(|| IssueRef {
            number: node["number"].as_u64().unwrap_or_default(),
            title: str_at(node, "title").to_string(),
            node_id: issue_node_id.to_string(),
        });
        info!(
            "Moved issue #{} from '{}' to '{}'",
            issue.number, from_status, to_status
        );

        Ok(StatusChange {
            success: true,
            issue,
            project: ProjectRef {
                id: project_id.to_string(),
                title: str_at(&item["project"], "title").to_string(),
            },
            status_change: StatusTransition {
                from: from_status.to_string(),
                to: to_status.to_string(),
            },
            update_response,
        })
    }

    pub fn list_repository_issues(
        &self,
        owner: &str,
        repo: &str,
        state: IssueState,
        labels: &[String],
        limit: u32,
    ) -> Result<Value, GithubError> {
        let search_query = issue_search_query(owner, repo, state, labels);
        self.transport.graphql(
            SEARCH_ISSUES_QUERY,
            json!({ "searchQuery": search_query, "limit": limit }),
        )
    }

    /// Rewrite the `assignees: [...]` line in the issue body.
    pub fn update_issue_assignees(
        &self,
        owner: &str,
        repo: &str,
        issue_number: u64,
        assignees: &[String],
    ) -> Result<AssigneeUpdate, AssigneeUpdateError> {
        let endpoint = format!("/repos/{owner}/{repo}/issues/{issue_number}");

        let issue = match self.transport.rest("GET", &endpoint, None) {
            Ok(issue) => issue,
            Err(GithubError::Http { status: 404, .. }) => {
                return Err(AssigneeUpdateError::IssueNotFound(issue_number))
            }
            Err(e) => return Err(e.into()),
        };
        if str_at(&issue, "message").contains("Not Found") {
            return Err(AssigneeUpdateError::IssueNotFound(issue_number));
        }

        let body = str_at(&issue, "body");
        if body.is_empty() {
            return Err(AssigneeUpdateError::EmptyBody);
        }
        let new_body =
            replace_assignees(body, assignees).ok_or(AssigneeUpdateError::NoAssigneesField)?;

        self.transport
            .rest("PATCH", &endpoint, Some(&json!({ "body": new_body })))?;
        info!("Updated assignees of issue #{}: {:?}", issue_number, assignees);

        Ok(AssigneeUpdate {
            success: true,
            issue_number,
            assignees: assignees.to_vec(),
            updated_at: Local::now().to_rfc3339(),
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::VecDeque;

    /// Replays canned responses and records every request.
    #[derive(Default)]
    pub(crate) struct ScriptedTransport {
        pub responses: RefCell<VecDeque<Result<Value, GithubError>>>,
        pub requests: RefCell<Vec<(String, Value)>>,
    }

    impl ScriptedTransport {
        pub fn with(responses: Vec<Result<Value, GithubError>>) -> Self {
            Self {
                responses: RefCell::new(responses.into()),
                requests: RefCell::default(),
            }
        }

        fn next(&self) -> Result<Value, GithubError> {
            self.responses
                .borrow_mut()
                .pop_front()
                .unwrap_or_else(|| panic!("unexpected request"))
        }
    }

    impl GithubTransport for ScriptedTransport {
        fn graphql(&self, query: &str, variables: Value) -> Result<Value, GithubError> {
            let op = query.split_whitespace().next().unwrap_or_default().to_string();
            self.requests.borrow_mut().push((op, variables));
            self.next()
        }

        fn rest(&self, method: &str, endpoint: &str, body: Option<&Value>) -> Result<Value, GithubError> {
            self.requests.borrow_mut().push((
                format!("{method} {endpoint}"),
                body.cloned().unwrap_or(Value::Null),
            ));
            self.next()
        }
    }

    fn issue_response() -> Value {
        json!({"data": {"repository": {"issue": {
            "id": "I_1", "number": 7, "title": "Fix login", "state": "OPEN"
        }}}})
    }

    pub(crate) fn project_response(status: &str) -> Value {
        json!({"data": {"node": {
            "number": 7,
            "title": "Fix login",
            "projectItems": {"nodes": [{
                "id": "ITEM_1",
                "project": {"id": "PROJ_1", "title": "Roadmap", "number": 1},
                "fieldValues": {"nodes": [
                    {},
                    {"name": "P1", "optionId": "p1", "field": {"id": "F_PRI", "name": "Priority", "options": []}},
                    {"name": status, "optionId": "o1", "field": {
                        "id": "F_STATUS",
                        "name": "Status",
                        "options": [
                            {"id": "o1", "name": "Todo"},
                            {"id": "o2", "name": "In Progress"},
                            {"id": "o3", "name": "Done"}
                        ]
                    }}
                ]}
            }]}
        }}})
    }

    fn client(responses: Vec<Result<Value, GithubError>>) -> GithubClient<ScriptedTransport> {
        GithubClient::new(ScriptedTransport::with(responses))
    }

    #[test]
    fn test_status_change_by_repo_info() {
        let update = json!({"data": {"updateProjectV2ItemFieldValue": {"projectV2Item": {"id": "ITEM_1"}}}});
        let client = client(vec![
            Ok(issue_response()),
            Ok(project_response("Todo")),
            Ok(update.clone()),
        ]);

        let change = client
            .change_issue_status_by_repo_info("acme", "app", 7, "Todo", "In Progress")
            .unwrap();
        assert!(change.success);
        assert_eq!(
            change.issue,
            IssueRef {
                number: 7,
                title: "Fix login".into(),
                node_id: "I_1".into()
            }
        );
        assert_eq!(change.project.title, "Roadmap");
        assert_eq!(change.update_response, update);

        let requests = client.transport.requests.borrow();
        assert_eq!(requests[0].1, json!({"owner": "acme", "repo": "app", "issueNumber": 7}));
        assert_eq!(requests[1].1, json!({"issueId": "I_1"}));
        assert_eq!(requests[2].0, "mutation($projectId:");
        assert_eq!(
            requests[2].1,
            json!({"projectId": "PROJ_1", "itemId": "ITEM_1", "fieldId": "F_STATUS", "optionId": "o2"})
        );
    }

    #[test]
    fn test_status_change_stops_at_each_stage() {
        let c = client(vec![Ok(json!({"errors": [{"message": "bad"}]}))]);
        assert!(matches!(
            c.change_issue_status_by_repo_info("o", "r", 1, "Todo", "Done"),
            Err(StatusChangeError::IssueQuery(_))
        ));

        let c = client(vec![Ok(json!({"data": {"repository": {"issue": null}}}))]);
        assert!(matches!(
            c.change_issue_status_by_repo_info("o", "r", 1, "Todo", "Done"),
            Err(StatusChangeError::IssueNotFound(1))
        ));

        let c = client(vec![Ok(json!({"errors": [{"message": "bad"}]}))]);
        assert!(matches!(
            c.change_issue_status_by_node_id("I_1", "Todo", "Done"),
            Err(StatusChangeError::ProjectQuery(_))
        ));

        let c = client(vec![Ok(json!({"data": {"node": null}}))]);
        assert!(matches!(
            c.change_issue_status_by_node_id("I_1", "Todo", "Done"),
            Err(StatusChangeError::NodeNotFound)
        ));

        let c = client(vec![Ok(json!({"data": {"node": {"number": 1, "projectItems": {"nodes": []}}}}))]);
        assert!(matches!(
            c.change_issue_status_by_node_id("I_1", "Todo", "Done"),
            Err(StatusChangeError::NotInProject)
        ));

        let mut no_status = project_response("Todo");
        no_status["data"]["node"]["projectItems"]["nodes"][0]["fieldValues"]["nodes"] = json!([{}]);
        let c = client(vec![Ok(no_status)]);
        assert!(matches!(
            c.change_issue_status_by_node_id("I_1", "Todo", "Done"),
            Err(StatusChangeError::StatusFieldMissing)
        ));

        let c = client(vec![Ok(project_response("Done"))]);
        let err = c
            .change_issue_status_by_node_id("I_1", "Todo", "In Progress")
            .unwrap_err();
        assert_eq!(
            err.to_json(),
            json!({
                "error": "Current status \"Done\" differs from expected \"Todo\"",
                "current_status": "Done"
            })
        );

        let c = client(vec![Ok(project_response("Todo"))]);
        let err = c.change_issue_status_by_node_id("I_1", "Todo", "Blocked").unwrap_err();
        assert_eq!(
            err.to_json()["available_statuses"],
            json!(["Todo", "In Progress", "Done"])
        );

        let c = client(vec![
            Ok(project_response("Todo")),
            Ok(json!({"errors": [{"message": "denied"}]})),
        ]);
        assert!(matches!(
            c.change_issue_status_by_node_id("I_1", "Todo", "Done"),
            Err(StatusChangeError::UpdateFailed(_))
        ));

        let c = client(vec![Err(GithubError::Http {
            status: 401,
            body: "Bad credentials".into(),
        })]);
        assert!(matches!(
            c.change_issue_status_by_node_id("I_1", "Todo", "Done"),
            Err(StatusChangeError::Transport(GithubError::Http { status: 401, .. }))
        ));
    }

    #[test]
    fn test_status_change_by_node_id_reads_issue_from_node() {
        let c = client(vec![Ok(project_response("Todo")), Ok(json!({"data": {}}))]);
        let change = c.change_issue_status_by_node_id("I_9", "Todo", "Done").unwrap();
        assert_eq!(change.issue.number, 7);
        assert_eq!(change.issue.node_id, "I_9");
        assert_eq!(change.status_change.to, "Done");
    }

    #[test]
    fn test_issue_search_query() {
        assert_eq!(
            issue_search_query("o", "r", IssueState::Open, &[]),
            "repo:o/r is:issue is:open"
        );
        assert_eq!(
            issue_search_query("o", "r", IssueState::All, &["bug".into(), "good first issue".into()]),
            "repo:o/r is:issue label:\"bug\" label:\"good first issue\""
        );
        assert_eq!(
            issue_search_query("o", "r", IssueState::Closed, &[]),
            "repo:o/r is:issue is:closed"
        );
    }

    #[test]
    fn test_replace_assignees() {
        let body = "## Task\nassignees: []\nnotes: assignees: [x]\nassignees: [old]\n";
        assert_eq!(
            replace_assignees(body, &["devplanner".into(), "bug-analysis".into()]).unwrap(),
            "## Task\nassignees: [devplanner, bug-analysis]\nnotes: assignees: [x]\nassignees: [devplanner, bug-analysis]\n"
        );
        assert_eq!(
            replace_assignees("assignees: [a]\ntext\nassignees: [b]\n", &["x".into()]).unwrap(),
            "assignees: [x]\ntext\nassignees: [x]\n"
        );
        assert!(replace_assignees("no field here", &[]).is_none());
        assert_eq!(replace_assignees("assignees: [a]", &["$1".into()]).unwrap(), "assignees: [$1]");
    }

    #[test]
    fn test_update_issue_assignees() {
        let c = client(vec![
            Ok(json!({"number": 3, "body": "title\nassignees: []\n"})),
            Ok(json!({"number": 3})),
        ]);
        let update = c
            .update_issue_assignees("o", "r", 3, &["devplanner".into()])
            .unwrap();
        assert!(update.success);
        assert_eq!(update.assignees, vec!["devplanner"]);

        let requests = c.transport.requests.borrow();
        assert_eq!(requests[0].0, "GET /repos/o/r/issues/3");
        assert_eq!(requests[1].0, "PATCH /repos/o/r/issues/3");
        assert_eq!(requests[1].1, json!({"body": "title\nassignees: [devplanner]\n"}));
    }

    #[test]
    fn test_update_issue_assignees_errors() {
        let c = client(vec![Err(GithubError::Http {
            status: 404,
            body: "{\"message\":\"Not Found\"}".into(),
        })]);
        assert!(matches!(
            c.update_issue_assignees("o", "r", 3, &[]),
            Err(AssigneeUpdateError::IssueNotFound(3))
        ));

        let c = client(vec![Ok(json!({"body": null}))]);
        assert!(matches!(
            c.update_issue_assignees("o", "r", 3, &[]),
            Err(AssigneeUpdateError::EmptyBody)
        ));

        let c = client(vec![Ok(json!({"body": "no field"}))]);
        let err = c.update_issue_assignees("o", "r", 3, &[]).unwrap_err();
        assert!(err.to_json()["details"].is_string());
    }
}
