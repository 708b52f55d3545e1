//! Stage crews
//!
//! Each stage of the pipeline is one crew with a fixed cast:
//!
//! ```text
//! Intake            Project Intake Manager + Scrum Master  -> jira_ticket.txt, project_plan.md
//!      │
//!      ▼
//! Data Engineering  Data Engineer                          -> cleaned_data.csv
//!      │
//!      ▼
//! Analysis          Senior Data Scientist                  -> model summary
//!      │
//!      ▼
//! Reporting         Presentation Designer                  -> churn_presentation.pptx
//! ```
//!
//! A stage builds its crew, runs it, then checks that its artifact exists and
//! returns a typed outcome the next stage takes as input.

pub mod analysis;
pub mod data_engineering;
pub mod intake;
pub mod reporting;

pub use analysis::AnalysisOutcome;
pub use data_engineering::DataOutcome;
pub use intake::IntakeOutcome;
pub use reporting::ReportOutcome;

use crate::config::{Config, SandboxConfig};
use crate::llm::ModelTiers;
use crate::pipeline::artifacts::Artifacts;
use crate::tools::Workspace;

/// What every stage needs besides its own inputs
#[derive(Debug, Clone)]
pub struct StageContext {
    pub tiers: ModelTiers,
    pub workspace: Workspace,
    pub sandbox: SandboxConfig,
    pub max_iterations: usize,
}

impl StageContext {
    pub fn new(config: &Config, tiers: ModelTiers) -> Self {
        Self {
            tiers,
            workspace: Workspace::new(&config.pipeline.workspace_dir),
            sandbox: config.sandbox.clone(),
            max_iterations: config.pipeline.max_iterations,
        }
    }

    pub fn artifacts(&self) -> Artifacts {
        Artifacts::new(self.workspace.root())
    }
}
