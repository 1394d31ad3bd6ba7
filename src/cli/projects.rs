//! Projects command implementation

use anyhow::Result;
use std::path::Path;

use crate::transcript::list_projects;

pub fn run(projects_dir: &Path) -> Result<()> {
    let projects = list_projects(projects_dir)?;

    if projects.is_empty() {
        println!("No projects found in {}", projects_dir.display());
        return Ok(());
    }

    println!("{:<60} {}", "Project", "Conversations");
    println!("{}", "-".repeat(75));
    for project in projects {
        println!("{:<60} {}", project.name, project.conversations);
    }

    Ok(())
}
