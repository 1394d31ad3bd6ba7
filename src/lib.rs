pub mod cli;
pub mod config;
pub mod error;
pub mod export;
pub mod filter;
pub mod git;
pub mod github;
pub mod schema;
pub mod sink;
pub mod store;
pub mod timestamp;
pub mod transcript;
pub mod upload;

pub use config::Config;
pub use error::{GithubError, UploadError};
pub use export::{ExportStats, Exporter};
pub use git::{CommitMetadata, GitInfo};
pub use schema::{build_session_record, SessionRecord};
pub use store::UploadHistoryStore;
pub use upload::{resolve_commit_range, UploadMode, UploadStats, Uploader};
