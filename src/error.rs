//! Typed errors surfaced by the upload pipeline.
//!
//! Command handlers propagate with `anyhow`; these variants mark the
//! failures a caller may want to branch on.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    /// A time bound for commit-range filtering could not be established.
    #[error("Both start and end timestamps are required for commit filtering (missing {missing})")]
    MissingBound { missing: &'static str },

    /// Manual mode was requested without both commit identifiers.
    #[error("--before-commit and --after-commit are required for manual mode")]
    MissingCommit,

    #[error("Project directory {} does not exist", path.display())]
    ProjectNotFound { path: PathBuf },

    #[error("No conversation files found in {project}")]
    NoConversationFiles { project: String },

    #[error("No upload history found for '{project}'. Use manual or latest mode for the first upload.")]
    NoUploadHistory { project: String },

    #[error("Could not find the root commit of {}", repo.display())]
    NoRootCommit { repo: PathBuf },

    #[error("Could not resolve HEAD in {}", repo.display())]
    HeadUnresolvable { repo: PathBuf },

    #[error("Missing credential: {0}")]
    MissingCredential(&'static str),
}

/// Failures of the GitHub transport or of tool invocation.
#[derive(Debug, thiserror::Error)]
pub enum GithubError {
    #[error("GITHUB_TOKEN environment variable is not set")]
    MissingToken,

    #[error("GitHub API error: {status} - {body}")]
    Http { status: u16, body: String },

    #[error("GitHub request failed: {0}")]
    Request(String),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Invalid arguments for {tool}: {message}")]
    InvalidArguments { tool: String, message: String },
}
