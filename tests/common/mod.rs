#![allow(dead_code)]

use git2::{Repository, Signature, Time};
use serde_json::json;
use std::fs;
use std::path::Path;

/// 2025-10-21T10:00:00Z
pub const BASE: i64 = 1_761_040_800;

pub struct Fixture {
    pub dir: tempfile::TempDir,
    pub commits: Vec<String>,
}

impl Fixture {
    pub fn repo_path(&self) -> std::path::PathBuf {
        self.dir.path().join("repo")
    }

    pub fn projects_dir(&self) -> std::path::PathBuf {
        self.dir.path().join("projects")
    }

    pub fn out_dir(&self) -> std::path::PathBuf {
        self.dir.path().join("out")
    }

    pub fn history_dir(&self) -> std::path::PathBuf {
        self.dir.path().join("history")
    }
}

pub fn commit_file(repo: &Repository, name: &str, body: &str, message: &str, secs: i64) -> String {
    let workdir = repo.workdir().unwrap();
    fs::write(workdir.join(name), body).unwrap();
    let mut index = repo.index().unwrap();
    index.add_path(Path::new(name)).unwrap();
    index.write().unwrap();
    let tree = repo.find_tree(index.write_tree().unwrap()).unwrap();
    let sig = Signature::new("Test User", "test@example.com", &Time::new(secs, 0)).unwrap();
    let parent = repo.head().ok().and_then(|h| h.peel_to_commit().ok());
    let parents: Vec<&git2::Commit> = parent.iter().collect();
    repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)
        .unwrap()
        .to_string()
}

/// Repository with commits at 10:00, 10:30 and 11:00, and a project holding
/// one conversation of six messages ten minutes apart starting at 10:00.
pub fn fixture(project: &str) -> Fixture {
    fixture_with_messages(project, &[0, 10, 20, 30, 40, 50])
}

/// Same repository; one message at each of `minutes` past 10:00.
pub fn fixture_with_messages(project: &str, minutes: &[u32]) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let repo_path = dir.path().join("repo");
    fs::create_dir_all(&repo_path).unwrap();
    let repo = Repository::init(&repo_path).unwrap();

    let commits = vec![
        commit_file(&repo, "file1.txt", "Initial content\n", "Initial commit", BASE),
        commit_file(&repo, "file2.txt", "Second file\n", "Add file2", BASE + 30 * 60),
        commit_file(&repo, "file3.txt", "Third file\n", "Add file3", BASE + 60 * 60),
    ];

    let project_dir = dir.path().join("projects").join(project);
    fs::create_dir_all(&project_dir).unwrap();
    let lines: Vec<String> = minutes
        .iter()
        .enumerate()
        .map(|(i, minute)| {
            let kind = if i % 2 == 0 { "user" } else { "assistant" };
            json!({
                "type": kind,
                "timestamp": format!("2025-10-21T10:{:02}:00Z", minute),
                "message": {"content": [{"type": "text", "text": format!("Test message {i}")}]},
                "cwd": "/home/ubuntu/agents",
                "gitBranch": "main"
            })
            .to_string()
        })
        .collect();
    fs::write(project_dir.join("conv-1.jsonl"), lines.join("\n") + "\n").unwrap();

    Fixture { dir, commits }
}

/// Every `.json` file under `dir`, recursively.
pub fn written_files(dir: &Path) -> Vec<std::path::PathBuf> {
    if !dir.exists() {
        return vec![];
    }
    let mut files: Vec<_> = walkdir::WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().map(|x| x == "json").unwrap_or(false))
        .map(|e| e.into_path())
        .collect();
    files.sort();
    files
}
