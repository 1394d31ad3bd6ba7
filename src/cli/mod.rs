//! Command handlers

pub mod export;
pub mod github;
pub mod history;
pub mod projects;
pub mod upload;
