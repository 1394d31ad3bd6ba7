use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use history_uploader::cli::export::ExportOptions;
use history_uploader::cli::upload::UploadOptions;
use history_uploader::cli::{export, github, history, projects, upload};
use history_uploader::config::Config;
use history_uploader::store::UploadHistoryStore;
use history_uploader::upload::UploadMode;

#[derive(Parser)]
#[command(name = "history-uploader")]
#[command(about = "Conversation history extraction with git commit filtering, plus GitHub Projects tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract conversations in a commit range and upload or save them
    Upload {
        /// Project name (e.g. -home-ubuntu-agents)
        #[arg(long, allow_hyphen_values = true)]
        project: Option<String>,

        /// Path to the git repository
        #[arg(long)]
        repo_path: Option<PathBuf>,

        /// How the commit range is chosen
        #[arg(long, value_enum, default_value_t = UploadMode::Manual)]
        mode: UploadMode,

        /// Start commit (manual mode)
        #[arg(long)]
        before_commit: Option<String>,

        /// End commit (manual mode)
        #[arg(long)]
        after_commit: Option<String>,

        /// S3 bucket to upload to
        #[arg(long, conflicts_with = "output_dir")]
        bucket: Option<String>,

        /// S3 key prefix (default: claude_history)
        #[arg(long)]
        prefix: Option<String>,

        /// Local directory to write to instead of S3
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Show what would be written without writing anything
        #[arg(long)]
        dry_run: bool,

        /// Conversation projects directory
        #[arg(long)]
        projects_dir: Option<PathBuf>,

        /// Upload history directory
        #[arg(long)]
        history_dir: Option<PathBuf>,
    },

    /// Export whole conversations without commit filtering
    Export {
        /// Only this project (default: every project)
        #[arg(long, allow_hyphen_values = true)]
        project: Option<String>,

        /// S3 bucket to upload to
        #[arg(long, conflicts_with = "output_dir")]
        bucket: Option<String>,

        /// S3 key prefix (default: claude_history)
        #[arg(long)]
        prefix: Option<String>,

        /// Local directory to write to instead of S3
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Show what would be written without writing anything
        #[arg(long)]
        dry_run: bool,

        /// Conversation projects directory
        #[arg(long)]
        projects_dir: Option<PathBuf>,
    },

    /// List conversation projects
    Projects {
        /// Conversation projects directory
        #[arg(long)]
        projects_dir: Option<PathBuf>,
    },

    /// Show the upload history of a project
    History {
        #[arg(allow_hyphen_values = true)]
        project: String,

        /// Upload history directory
        #[arg(long)]
        history_dir: Option<PathBuf>,
    },

    /// GitHub Projects tools
    Github {
        #[command(subcommand)]
        command: GithubCommands,
    },
}

#[derive(Subcommand)]
enum GithubCommands {
    /// List available tools
    List {
        /// Print full definitions with input schemas as JSON
        #[arg(long)]
        json: bool,
    },
    /// Call a tool
    Call {
        /// Tool name
        tool: String,
        /// Tool arguments as a JSON object
        #[arg(long)]
        args: Option<String>,
    },
    /// Serve the tools to an MCP client over stdio
    Serve,
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("history_uploader=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    // Load config
    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Upload {
            project,
            repo_path,
            mode,
            before_commit,
            after_commit,
            bucket,
            prefix,
            output_dir,
            dry_run,
            projects_dir,
            history_dir,
        } => {
            upload::run(
                &config,
                UploadOptions {
                    project,
                    repo_path,
                    mode: Some(mode),
                    before_commit,
                    after_commit,
                    bucket,
                    prefix,
                    output_dir,
                    dry_run,
                    projects_dir,
                    history_dir,
                },
            )?;
        }
        Commands::Export {
            project,
            bucket,
            prefix,
            output_dir,
            dry_run,
            projects_dir,
        } => {
            export::run(
                &config,
                ExportOptions {
                    project,
                    bucket,
                    prefix,
                    output_dir,
                    dry_run,
                    projects_dir,
                },
            )?;
        }
        Commands::Projects { projects_dir } => {
            projects::run(&projects_dir.unwrap_or_else(|| config.projects_dir()))?;
        }
        Commands::History {
            project,
            history_dir,
        } => {
            let store = UploadHistoryStore::new(history_dir.unwrap_or_else(|| config.history_dir()));
            history::run(&store, &project)?;
        }
        Commands::Github { command } => match command {
            GithubCommands::List { json } => {
                if json {
                    github::list_json()?;
                } else {
                    github::list()?;
                }
            }
            GithubCommands::Call { tool, args } => {
                github::call(&config.github, &tool, args.as_deref())?;
            }
            GithubCommands::Serve => github::serve(&config.github)?,
        },
    }

    Ok(())
}
