use std::path::PathBuf;

use serde::Serialize;
use tracing::info;

use super::StageContext;
use crate::crew::{Agent, Crew, Task};
use crate::llm::LLMFactory;
use crate::pipeline::artifacts::PRESENTATION;
use crate::tools::{CreatePptxTool, ToolSet};
use crate::types::{AppError, AppResult};

pub const DECK_TITLE: &str = "Q4 Churn Analysis";

#[derive(Debug, Clone, Serialize)]
pub struct ReportOutcome {
    pub deck_path: PathBuf,
    pub summary: String,
}

pub fn crew(ctx: &StageContext, analysis_summary: &str) -> Crew {
    let designer = Agent::new(
        "Presentation Designer",
        "Create visual slide decks.",
        "You take technical results and turn them into PowerPoint files.",
        ctx.tiers.fast.clone(),
    )
    .with_tools(ToolSet::new().with(CreatePptxTool::new(ctx.workspace.clone())));

    let task = Task::new(
        "presentation",
        format!(
            "Create a PowerPoint with the create_pptx tool. Title: '{}'. Write a short executive \
             summary and the key model findings from this analysis, one point per line:\n\n{}",
            DECK_TITLE,
            analysis_summary.trim()
        ),
        "Confirmation that .pptx is saved.",
        0,
    );

    Crew::new(vec![designer], vec![task]).with_max_iterations(ctx.max_iterations)
}

pub async fn run(ctx: &StageContext, llm: &dyn LLMFactory, analysis_summary: &str) -> AppResult<ReportOutcome> {
    if analysis_summary.trim().is_empty() {
        return Err(AppError::MissingPrerequisite("analysis summary is empty".to_string()));
    }

    let artifacts = ctx.artifacts();
    artifacts.discard(&[PRESENTATION])?;

    let output = crew(ctx, analysis_summary).kickoff(llm).await?;
    let deck_path = artifacts.require(PRESENTATION)?;
    info!(deck = %deck_path.display(), "Reporting complete");

    Ok(ReportOutcome {
        deck_path,
        summary: output.raw,
    })
}
