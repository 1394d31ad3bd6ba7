//! Request/response transport for the GitHub GraphQL and REST APIs

use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use crate::config::GithubConfig;
use crate::error::GithubError;

const API_VERSION: &str = "2022-11-28";

/// One GitHub API request at a time, answered with the decoded JSON body.
pub trait GithubTransport {
    /// POST a GraphQL document. Request-level `errors` are part of the
    /// returned value, not an `Err`.
    fn graphql(&self, query: &str, variables: Value) -> Result<Value, GithubError>;

    /// Call a REST endpoint such as `/repos/o/r/issues/1`.
    fn rest(&self, method: &str, endpoint: &str, body: Option<&Value>) -> Result<Value, GithubError>;
}

/// Blocking HTTP transport authenticated with a bearer token.
pub struct HttpTransport {
    agent: ureq::Agent,
    api_url: String,
    graphql_url: String,
    token: String,
}

impl HttpTransport {
    pub fn new(api_url: &str, graphql_url: &str, token: impl Into<String>, timeout: Duration) -> Self {
        Self {
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
            api_url: api_url.trim_end_matches('/').to_string(),
            graphql_url: graphql_url.to_string(),
            token: token.into(),
        }
    }

    /// Transport using `GITHUB_TOKEN`. Fails before any request when the
    /// token is absent.
    pub fn from_env(config: &GithubConfig) -> Result<Self, GithubError> {
        let token = std::env::var("GITHUB_TOKEN")
            .ok()
            .filter(|t| !t.is_empty())
            .ok_or(GithubError::MissingToken)?;
        Ok(Self::new(
            &config.api_url,
            &config.graphql_endpoint(),
            token,
            Duration::from_secs(config.timeout_secs),
        ))
    }

    fn send(&self, request: ureq::Request, body: Option<&Value>) -> Result<Value, GithubError> {
        let request = request
            .set("Authorization", &format!("Bearer {}", self.token))
            .set("Content-Type", "application/json");

        let result = match body {
            Some(body) => request.send_json(body),
            None => request.call(),
        };

        match result {
            Ok(response) => {
                let text = response
                    .into_string()
                    .map_err(|e| GithubError::Request(e.to_string()))?;
                if text.trim().is_empty() {
                    return Ok(Value::Null);
                }
                serde_json::from_str(&text).map_err(|e| GithubError::Request(e.to_string()))
            }
            Err(ureq::Error::Status(status, response)) => Err(GithubError::Http {
                status,
                body: response.into_string().unwrap_or_default(),
            }),
            Err(e) => Err(GithubError::Request(e.to_string())),
        }
    }
}

impl GithubTransport for HttpTransport {
    fn graphql(&self, query: &str, variables: Value) -> Result<Value, GithubError> {
        debug!("POST {}", self.graphql_url);
        let body = json!({ "query": query, "variables": variables });
        self.send(self.agent.post(&self.graphql_url), Some(&body))
    }

    fn rest(&self, method: &str, endpoint: &str, body: Option<&Value>) -> Result<Value, GithubError> {
        let url = format!("{}{}", self.api_url, endpoint);
        debug!("{} {}", method, url);
        let request = self
            .agent
            .request(method, &url)
            .set("Accept", "application/vnd.github+json")
            .set("X-GitHub-Api-Version", API_VERSION);
        self.send(request, body)
    }
}
