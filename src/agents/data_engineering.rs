use std::path::PathBuf;

use serde::Serialize;
use tracing::info;

use super::StageContext;
use crate::analysis::DataFrame;
use crate::crew::{Agent, Crew, Task};
use crate::llm::LLMFactory;
use crate::pipeline::artifacts::CLEANED_DATA;
use crate::tools::{CleanCsvTool, ExecutePythonCodeTool, InspectCsvTool, ToolSet};
use crate::types::{AppError, AppResult};

const PREVIEW_ROWS: usize = 5;

#[derive(Debug, Clone, Serialize)]
pub struct DataOutcome {
    pub cleaned_path: PathBuf,
    pub rows: usize,
    pub columns: Vec<String>,
    /// First rows of the cleaned data, rendered as text
    pub preview: String,
    pub summary: String,
}

/// `input` is the raw CSV's name inside the workspace
pub fn crew(ctx: &StageContext, input: &str, request: &str) -> Crew {
    let tools = ToolSet::new()
        .with(InspectCsvTool::new(ctx.workspace.clone()))
        .with(CleanCsvTool::new(ctx.workspace.clone()))
        .with(
            ExecutePythonCodeTool::new(ctx.sandbox.clone(), ctx.workspace.clone())
                .stage_input(input)
                .stage_input(CLEANED_DATA)
                .harvest_output(CLEANED_DATA),
        );

    let engineer = Agent::new(
        "Data Engineer",
        "Prepare clean datasets.",
        "You build robust pipelines. You create the CSV files for the team.",
        ctx.tiers.capable.clone(),
    )
    .with_tools(tools);

    let task = Task::new(
        "clean",
        format!(
            "Clean the dataset '{input}' for this project: '{request}'.\n\
             1. Inspect '{input}' with inspect_csv.\n\
             2. Clean it into '{out}' with clean_csv.\n\
             3. If columns still need work (text categories, a target that is not named 'Churn'), \
             fix '{out}' with execute_python_code, reading and writing files by bare name.\n\
             The final '{out}' must have a 'Churn' target column and only numeric feature columns. \
             Inspect '{out}' to confirm before you answer.",
            input = input,
            request = request,
            out = CLEANED_DATA,
        ),
        "Confirmation that data is ready, with the final columns and row count.",
        0,
    );

    Crew::new(vec![engineer], vec![task]).with_max_iterations(ctx.max_iterations)
}

pub async fn run(ctx: &StageContext, llm: &dyn LLMFactory, input: &str, request: &str) -> AppResult<DataOutcome> {
    let artifacts = ctx.artifacts();
    if !artifacts.exists(input) {
        return Err(AppError::InvalidRequest(format!("input dataset '{}' not found", input)));
    }
    artifacts.discard(&[CLEANED_DATA])?;

    let output = crew(ctx, input, request).kickoff(llm).await?;
    let cleaned_path = artifacts.require(CLEANED_DATA)?;

    let cleaned = DataFrame::from_path(&cleaned_path).map_err(|e| AppError::Csv(format!("{:#}", e)))?;
    let (rows, _) = cleaned.shape();
    info!(rows, columns = cleaned.columns.len(), "Data engineering complete");

    Ok(DataOutcome {
        cleaned_path,
        rows,
        preview: cleaned.head(PREVIEW_ROWS),
        columns: cleaned.columns,
        summary: output.raw,
    })
}
