// Files exchanged between stages, all relative to the workspace root

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::tools::presentation::DECK_FILE;
use crate::types::{AppError, AppResult};

pub const JIRA_TICKET: &str = "jira_ticket.txt";
pub const PROJECT_PLAN: &str = "project_plan.md";
pub const UPLOADED_DATA: &str = "uploaded_data.csv";
pub const CLEANED_DATA: &str = "cleaned_data.csv";
pub const PRESENTATION: &str = DECK_FILE;

/// Everything a run produces, in the order the stages produce it
pub const GENERATED: [&str; 4] = [JIRA_TICKET, PROJECT_PLAN, CLEANED_DATA, PRESENTATION];

#[derive(Debug, Clone)]
pub struct Artifacts {
    root: PathBuf,
}

impl Artifacts {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    pub fn exists(&self, name: &str) -> bool {
        self.path(name).is_file()
    }

    /// Path of an artifact a stage was expected to produce
    pub fn require(&self, name: &str) -> AppResult<PathBuf> {
        let path = self.path(name);
        if path.is_file() {
            Ok(path)
        } else {
            Err(AppError::MissingArtifact(name.to_string()))
        }
    }

    pub fn read_text(&self, name: &str) -> AppResult<String> {
        let path = self.require(name)?;
        Ok(std::fs::read_to_string(path)?)
    }

    /// Remove every generated artifact; returns the names that existed
    pub fn clear(&self) -> AppResult<Vec<&'static str>> {
        self.discard(&GENERATED)
    }

    /// Remove the named artifacts so a stage cannot pass on a previous run's output.
    /// Returns the names that existed.
    pub fn discard(&self, names: &[&'static str]) -> AppResult<Vec<&'static str>> {
        let mut removed = Vec::new();
        for &name in names {
            let path = self.path(name);
            if path.is_file() {
                std::fs::remove_file(&path)?;
                debug!(artifact = name, "Discarded previous output");
                removed.push(name);
            }
        }
        Ok(removed)
    }

    /// Artifacts present right now, in production order
    pub fn present(&self) -> Vec<&'static str> {
        GENERATED.into_iter().filter(|n| self.exists(n)).collect()
    }
}
