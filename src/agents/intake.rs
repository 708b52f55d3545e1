use serde::Serialize;
use tracing::info;

use super::StageContext;
use crate::crew::{Agent, Crew, Task};
use crate::llm::LLMFactory;
use crate::pipeline::artifacts::{JIRA_TICKET, PROJECT_PLAN};
use crate::tools::{SaveFileTool, ToolSet};
use crate::types::{AppError, AppResult};

#[derive(Debug, Clone, Serialize)]
pub struct IntakeOutcome {
    /// The Intake Manager's decision text
    pub approval: String,
    pub ticket: String,
    pub plan: String,
    pub summary: String,
}

pub fn crew(ctx: &StageContext, request: &str) -> Crew {
    let intake = Agent::new(
        "Project Intake Manager",
        "Validate project requirements.",
        "You are a strict director who ensures projects have clear business value.",
        ctx.tiers.capable.clone(),
    );
    let scrum = Agent::new(
        "Scrum Master",
        "Manage project flow and Jira tickets.",
        "You keep the team organized. You create ticket files for tracking.",
        ctx.tiers.fast.clone(),
    )
    .with_tools(ToolSet::new().with(SaveFileTool::new(ctx.workspace.clone())));

    let review = Task::new(
        "review",
        format!(
            "Review request: '{}'. Approve if valid. State APPROVED or REJECTED first, then the reasons \
             and the business value you see.",
            request
        ),
        "Approval decision.",
        0,
    );
    let ticket = Task::new(
        "ticket",
        format!(
            "Create a '{}' file with the save_file tool containing the project scope and timeline \
             for this request: '{}'.",
            JIRA_TICKET, request
        ),
        "Confirmation of file creation.",
        1,
    );
    let plan = Task::new(
        "plan",
        format!(
            "Create a '{}' file with the save_file tool: a Markdown project plan with phases for \
             data engineering, analysis and reporting, owners, and milestones consistent with the ticket.",
            PROJECT_PLAN
        ),
        "Confirmation of file creation.",
        1,
    )
    .with_context(vec![0, 1]);

    Crew::new(vec![intake, scrum], vec![review, ticket, plan]).with_max_iterations(ctx.max_iterations)
}

pub async fn run(ctx: &StageContext, llm: &dyn LLMFactory, request: &str) -> AppResult<IntakeOutcome> {
    let request = request.trim();
    if request.is_empty() {
        return Err(AppError::InvalidRequest("project request is empty".to_string()));
    }

    let artifacts = ctx.artifacts();
    artifacts.discard(&[JIRA_TICKET, PROJECT_PLAN])?;

    let output = crew(ctx, request).kickoff(llm).await?;
    let ticket = artifacts.read_text(JIRA_TICKET)?;
    let plan = artifacts.read_text(PROJECT_PLAN)?;

    let approval = output.task("review").map(|t| t.raw.clone()).unwrap_or_default();
    info!(ticket_bytes = ticket.len(), plan_bytes = plan.len(), "Intake complete");

    Ok(IntakeOutcome {
        approval,
        ticket,
        plan,
        summary: output.raw,
    })
}
