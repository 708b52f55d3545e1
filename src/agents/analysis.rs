use serde::Serialize;
use tracing::info;

use super::StageContext;
use crate::crew::{Agent, Crew, Task};
use crate::llm::LLMFactory;
use crate::pipeline::artifacts::CLEANED_DATA;
use crate::tools::{ExecutePythonCodeTool, InspectCsvTool, ToolSet, TrainModelTool};
use crate::types::{AppError, AppResult};

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisOutcome {
    pub summary: String,
    /// Raw `train_model` result, when the tool was called successfully
    pub training: Option<String>,
}

pub fn crew(ctx: &StageContext, request: &str) -> Crew {
    let tools = ToolSet::new()
        .with(InspectCsvTool::new(ctx.workspace.clone()))
        .with(TrainModelTool::new(ctx.workspace.clone()))
        .with(ExecutePythonCodeTool::new(ctx.sandbox.clone(), ctx.workspace.clone()).stage_input(CLEANED_DATA));

    let scientist = Agent::new(
        "Senior Data Scientist",
        "Build predictive models.",
        "You are an expert in Scikit-Learn. You interpret model accuracy and feature importance.",
        ctx.tiers.capable.clone(),
    )
    .with_tools(tools);

    let task = Task::new(
        "analysis",
        format!(
            "Train a Random Forest on '{}' with the train_model tool. Report the Accuracy and which \
             feature is most important. Relate the findings to the project request: '{}'.",
            CLEANED_DATA, request
        ),
        "A summary of the model performance and key drivers.",
        0,
    );

    Crew::new(vec![scientist], vec![task]).with_max_iterations(ctx.max_iterations)
}

pub async fn run(ctx: &StageContext, llm: &dyn LLMFactory, request: &str) -> AppResult<AnalysisOutcome> {
    ctx.artifacts().require(CLEANED_DATA)?;

    let output = crew(ctx, request).kickoff(llm).await?;
    if output.raw.trim().is_empty() {
        return Err(AppError::MissingArtifact("analysis summary".to_string()));
    }

    let training = output
        .tasks
        .iter()
        .flat_map(|t| &t.tool_invocations)
        .filter(|i| i.tool == "train_model" && i.output.starts_with("Model Trained"))
        .map(|i| i.output.clone())
        .last();
    info!(trained = training.is_some(), "Analysis complete");

    Ok(AnalysisOutcome {
        summary: output.raw,
        training,
    })
}
