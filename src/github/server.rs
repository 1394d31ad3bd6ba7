//! MCP server exposing the tool registry over stdio

use rmcp::model::{
    CallToolRequestParam, CallToolResult, Content, JsonObject, ListToolsResult,
    PaginatedRequestParam, ServerCapabilities, ServerInfo, Tool,
};
use rmcp::service::RequestContext;
use rmcp::transport::stdio;
use rmcp::{ErrorData as McpError, RoleServer, ServerHandler, ServiceExt};
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

use super::{dispatch, tool_definitions, GithubClient, GithubTransport};
use crate::error::GithubError;

pub struct GithubToolServer<T: GithubTransport> {
    client: Arc<GithubClient<T>>,
}

impl<T: GithubTransport> Clone for GithubToolServer<T> {
    fn clone(&self) -> Self {
        Self {
            client: Arc::clone(&self.client),
        }
    }
}

impl<T: GithubTransport> GithubToolServer<T> {
    pub fn new(client: GithubClient<T>) -> Self {
        Self {
            client: Arc::new(client),
        }
    }

    /// Run one tool. Every outcome, failures included, is returned as text.
    pub fn call(&self, name: &str, arguments: Value) -> CallToolResult {
        tool_output(dispatch(&self.client, name, arguments))
    }
}

/// The registry in MCP form.
pub fn mcp_tools() -> Vec<Tool> {
    tool_definitions()
        .into_iter()
        .map(|def| {
            let schema = match def.input_schema {
                Value::Object(map) => map,
                _ => JsonObject::new(),
            };
            Tool::new(def.name, def.description, Arc::new(schema))
        })
        .collect()
}

fn tool_output(result: Result<String, GithubError>) -> CallToolResult {
    let text = match result {
        Ok(text) => text,
        Err(e) => format!("Error: {e}"),
    };
    CallToolResult::success(vec![Content::text(text)])
}

impl<T> ServerHandler for GithubToolServer<T>
where
    T: GithubTransport + Send + Sync + 'static,
{
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            instructions: Some("GitHub Projects V2 status and issue tools".into()),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, McpError> {
        Ok(ListToolsResult::with_all_items(mcp_tools()))
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        let server = self.clone();
        let name = request.name.to_string();
        let arguments = Value::Object(request.arguments.unwrap_or_default());

        // The HTTP transport blocks.
        tokio::task::spawn_blocking(move || server.call(&name, arguments))
            .await
            .map_err(|e| McpError::internal_error(e.to_string(), None))
    }
}

/// Serve until the client disconnects. Stdout carries the protocol, so
/// logging must stay on stderr.
pub fn serve_stdio<T>(client: GithubClient<T>) -> anyhow::Result<()>
where
    T: GithubTransport + Send + Sync + 'static,
{
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        info!("Serving GitHub tools on stdio");
        let service = GithubToolServer::new(client).serve(stdio()).await?;
        let reason = service.waiting().await?;
        info!("MCP session ended: {:?}", reason);
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::github::tests::{project_response, ScriptedTransport};
    use serde_json::json;

    fn text_of(result: &CallToolResult) -> String {
        let value = serde_json::to_value(result).unwrap();
        value["content"][0]["text"].as_str().unwrap().to_string()
    }

    fn server(responses: Vec<Result<Value, GithubError>>) -> GithubToolServer<ScriptedTransport> {
        GithubToolServer::new(GithubClient::new(ScriptedTransport::with(responses)))
    }

    #[test]
    fn test_tools_carry_input_schema() {
        let tools = mcp_tools();
        assert_eq!(tools.len(), tool_definitions().len());

        let value = serde_json::to_value(&tools[0]).unwrap();
        assert_eq!(value["name"], "get_issue_project_info");
        assert_eq!(value["inputSchema"]["required"], json!(["issue_node_id"]));
    }

    #[test]
    fn test_results_are_text() {
        let s = server(vec![Ok(project_response("Todo"))]);
        let result = s.call(
            "change_issue_status_by_node_id",
            json!({"issue_node_id": "I_1", "from_status": "Done", "to_status": "Todo"}),
        );
        let text = text_of(&result);
        let body: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(body["current_status"], "Todo");
        assert!(body["error"].as_str().unwrap().contains("Done"));
    }

    #[test]
    fn test_failures_are_error_text() {
        let s = server(vec![]);
        assert_eq!(text_of(&s.call("no_such_tool", json!({}))), "Error: Unknown tool: no_such_tool");

        let s = server(vec![Err(GithubError::Http {
            status: 502,
            body: "bad gateway".into(),
        })]);
        let text = text_of(&s.call("get_issue_project_info", json!({"issue_node_id": "I_1"})));
        assert_eq!(text, "Error: GitHub API error: 502 - bad gateway");
    }
}
