use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{error, info};

use super::artifacts::{Artifacts, CLEANED_DATA, JIRA_TICKET, PRESENTATION, PROJECT_PLAN, UPLOADED_DATA};
use super::Stage;
use crate::agents::{self, StageContext};
use crate::config::Config;
use crate::llm::{LLMFactory, ModelTiers};
use crate::types::{AppError, AppResult};

pub const DEFAULT_REQUEST: &str = "Build a churn model to see why users leave";

#[derive(Debug, Clone, Serialize)]
pub struct StageReport {
    pub stage: Stage,
    pub ok: bool,
    pub detail: String,
    pub elapsed_ms: u128,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub stages: Vec<StageReport>,
    /// Artifacts in the workspace when the run ended
    pub artifacts: Vec<&'static str>,
    pub deck_path: Option<PathBuf>,
}

impl RunReport {
    pub fn succeeded(&self) -> bool {
        self.stages.len() == Stage::ALL.len() && self.stages.iter().all(|s| s.ok)
    }

    pub fn failed_stage(&self) -> Option<Stage> {
        self.stages.iter().find(|s| !s.ok).map(|s| s.stage)
    }
}

fn progress(stage: Stage, message: &str) {
    println!("[{}/{}] {}: {}", stage.number(), Stage::ALL.len(), stage.label(), message);
}

/// Run all four stages from `csv`, stopping at the first failure.
///
/// Configuration errors (no API key, unreadable input) are returned before
/// any stage starts; stage failures are recorded in the report.
pub async fn run_unattended(
    config: &Config,
    llm: &dyn LLMFactory,
    csv: &Path,
    request: &str,
    api_key: Option<&str>,
) -> AppResult<RunReport> {
    let tiers = ModelTiers::from_config(config, api_key)?;
    let ctx = StageContext::new(config, tiers);
    let artifacts = Artifacts::new(&config.pipeline.workspace_dir);

    std::fs::create_dir_all(artifacts.root())?;
    let removed = artifacts.clear()?;
    if !removed.is_empty() {
        info!(removed = ?removed, "Cleared artifacts from a previous run");
    }

    let input = artifacts.path(UPLOADED_DATA);
    if !csv.is_file() {
        return Err(AppError::InvalidRequest(format!("dataset {} not found", csv.display())));
    }
    let same_file = matches!(
        (csv.canonicalize(), input.canonicalize()),
        (Ok(a), Ok(b)) if a == b
    );
    if !same_file {
        std::fs::copy(csv, &input)?;
    }

    let mut report = RunReport {
        stages: Vec::new(),
        artifacts: Vec::new(),
        deck_path: None,
    };
    let mut summary = String::new();

    for stage in Stage::ALL {
        progress(stage, "running");
        let started = Instant::now();
        let result: AppResult<String> = match stage {
            Stage::Intake => agents::intake::run(&ctx, llm, request)
                .await
                .map(|o| format!("{} and {} created{}", JIRA_TICKET, PROJECT_PLAN, approval_line(&o.approval))),
            Stage::DataEngineering => agents::data_engineering::run(&ctx, llm, UPLOADED_DATA, request)
                .await
                .map(|o| format!("{} ready ({} rows, columns: {})", CLEANED_DATA, o.rows, o.columns.join(", "))),
            Stage::Analysis => agents::analysis::run(&ctx, llm, request).await.map(|o| {
                summary = o.summary;
                o.training.unwrap_or_else(|| "analysis summary produced".to_string())
            }),
            Stage::Reporting => agents::reporting::run(&ctx, llm, &summary).await.map(|o| {
                report.deck_path = Some(o.deck_path);
                format!("{} saved", PRESENTATION)
            }),
        };
        let elapsed = started.elapsed();

        match result {
            Ok(detail) => {
                progress(stage, &format!("done in {}", human(elapsed)));
                report.stages.push(StageReport {
                    stage,
                    ok: true,
                    detail,
                    elapsed_ms: elapsed.as_millis(),
                });
            }
            Err(e) => {
                error!(stage = %stage, error = %e, "Stage failed");
                progress(stage, &format!("FAILED: {}", e));
                report.stages.push(StageReport {
                    stage,
                    ok: false,
                    detail: e.to_string(),
                    elapsed_ms: elapsed.as_millis(),
                });
                break;
            }
        }
    }

    report.artifacts = artifacts.present();
    Ok(report)
}

fn approval_line(approval: &str) -> String {
    match approval.lines().find(|l| !l.trim().is_empty()) {
        Some(first) => format!(" (decision: {})", first.trim()),
        None => String::new(),
    }
}

fn human(elapsed: Duration) -> String {
    format!("{:.1}s", elapsed.as_secs_f64())
}
