//! GitHub tool commands

use anyhow::{Context, Result};
use serde_json::Value;

use crate::config::GithubConfig;
use crate::github::{dispatch, serve_stdio, tool_definitions, GithubClient, HttpTransport};

pub fn list() -> Result<()> {
    for tool in tool_definitions() {
        println!("{:<36} {}", tool.name, tool.description);
    }
    Ok(())
}

/// Print every tool definition with its input schema as JSON.
pub fn list_json() -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&tool_definitions())?);
    Ok(())
}

pub fn call(config: &GithubConfig, tool: &str, args: Option<&str>) -> Result<()> {
    let arguments: Value = match args {
        Some(raw) => serde_json::from_str(raw).context("--args must be a JSON object")?,
        None => Value::Object(Default::default()),
    };

    let client = GithubClient::new(HttpTransport::from_env(config)?);
    let output = dispatch(&client, tool, arguments)?;
    println!("{}", output);
    Ok(())
}

/// Serve every tool to an MCP client over stdin/stdout.
pub fn serve(config: &GithubConfig) -> Result<()> {
    let client = GithubClient::new(HttpTransport::from_env(config)?);
    serve_stdio(client)
}
