//! Configuration management with YAML support
//!
//! JSON config files are read through the same YAML parser, so the
//! `.claude/uploader_config.json` written by earlier tooling keeps working.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub s3: S3Config,

    #[serde(default)]
    pub project: ProjectConfig,

    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub github: GithubConfig,
}

/// Object storage destination
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3Config {
    #[serde(default)]
    pub bucket: Option<String>,

    #[serde(default = "default_prefix")]
    pub prefix: String,

    /// Falls back to `AWS_REGION` / `AWS_DEFAULT_REGION`.
    #[serde(default)]
    pub region: Option<String>,

    /// Custom endpoint for S3-compatible stores (path-style addressing).
    #[serde(default)]
    pub endpoint: Option<String>,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Default project to process
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectConfig {
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub repo_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "default_projects_dir")]
    pub projects_dir: String,

    #[serde(default = "default_history_dir")]
    pub history_dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GithubConfig {
    /// REST base URL
    #[serde(default = "default_github_api_url")]
    pub api_url: String,

    /// GraphQL endpoint; derived from `api_url` when unset
    #[serde(default)]
    pub graphql_url: Option<String>,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl GithubConfig {
    /// GitHub Enterprise serves REST under `/api/v3` but GraphQL under
    /// `/api/graphql`.
    pub fn graphql_endpoint(&self) -> String {
        if let Some(url) = &self.graphql_url {
            return url.trim_end_matches('/').to_string();
        }
        let base = self.api_url.trim_end_matches('/');
        match base.strip_suffix("/v3") {
            Some(api) => format!("{}/graphql", api),
            None => format!("{}/graphql", base),
        }
    }
}

// Default value functions
fn default_prefix() -> String {
    "claude_history".to_string()
}

fn default_projects_dir() -> String {
    "~/.claude/projects".to_string()
}

fn default_history_dir() -> String {
    "~/.claude/upload_history".to_string()
}

fn default_github_api_url() -> String {
    "https://api.github.com".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            bucket: None,
            prefix: default_prefix(),
            region: None,
            endpoint: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            projects_dir: default_projects_dir(),
            history_dir: default_history_dir(),
        }
    }
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            api_url: default_github_api_url(),
            graphql_url: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn expand(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).to_string())
}

impl Config {
    /// Load configuration.
    /// Searches in order:
    /// 1. Provided path
    /// 2. ./.claude/uploader_config.json
    /// 3. ./uploader.yaml
    /// 4. ~/.config/history-uploader/uploader.yaml
    ///
    /// An explicitly provided path must exist.
    pub fn load(path: Option<&str>) -> Result<Self> {
        if let Some(path) = path {
            return Self::from_file(&expand(path));
        }

        let search_paths = [
            PathBuf::from(".claude/uploader_config.json"),
            PathBuf::from("uploader.yaml"),
            dirs::home_dir()
                .unwrap_or_default()
                .join(".config/history-uploader/uploader.yaml"),
        ];

        for search_path in &search_paths {
            if search_path.exists() {
                return Self::from_file(search_path);
            }
        }

        // No config file found, use defaults
        Ok(Config::default())
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("parsing config {}", path.display()))?;
        Ok(config)
    }

    /// Conversation projects directory, `~` expanded
    pub fn projects_dir(&self) -> PathBuf {
        expand(&self.paths.projects_dir)
    }

    /// Upload history directory, `~` expanded
    pub fn history_dir(&self) -> PathBuf {
        expand(&self.paths.history_dir)
    }

    /// Repository path of the configured project, `~` expanded
    pub fn repo_path(&self) -> Option<PathBuf> {
        self.project.repo_path.as_deref().map(expand)
    }
}
