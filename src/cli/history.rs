//! History command implementation

use anyhow::Result;

use crate::store::UploadHistoryStore;

pub fn run(store: &UploadHistoryStore, project: &str) -> Result<()> {
    let Some(record) = store.load(project) else {
        println!("No upload history for '{}' in {}", project, store.dir().display());
        return Ok(());
    };

    println!("Project:              {}", record.project_name);
    println!("Last uploaded commit: {}", record.last_uploaded_commit);
    println!("Last uploaded at:     {}", record.last_uploaded_at);
    println!("Repository:           {}", record.repo_path);
    Ok(())
}
