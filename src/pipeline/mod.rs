//! Stage ordering, session state and the two ways of driving a run: one stage
//! at a time from the web UI, or all four unattended from the CLI.

pub mod artifacts;
pub mod driver;
pub mod unattended;

use serde::Serialize;

use crate::types::{AppError, AppResult};

pub use artifacts::Artifacts;
pub use driver::{PipelineDriver, Session, SharedSession};
pub use unattended::{run_unattended, RunReport};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Intake,
    DataEngineering,
    Analysis,
    Reporting,
}

impl Stage {
    pub const ALL: [Stage; 4] = [Stage::Intake, Stage::DataEngineering, Stage::Analysis, Stage::Reporting];

    /// 1-based position in the pipeline
    pub fn number(self) -> usize {
        match self {
            Stage::Intake => 1,
            Stage::DataEngineering => 2,
            Stage::Analysis => 3,
            Stage::Reporting => 4,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Stage::Intake => "Intake & Scope",
            Stage::DataEngineering => "Data Engineering",
            Stage::Analysis => "Analysis",
            Stage::Reporting => "Reporting",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// How far the current session has progressed
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    #[default]
    Idle,
    IntakeDone,
    DataReady,
    AnalysisReady,
    ReportReady,
}

impl PipelineState {
    /// Fail unless `stage` may run now. Stages may be re-run once unlocked.
    pub fn require(self, stage: Stage) -> AppResult<()> {
        let (needed, message) = match stage {
            Stage::Intake => return Ok(()),
            Stage::DataEngineering => (PipelineState::IntakeDone, "Please complete the Intake step first."),
            Stage::Analysis => (PipelineState::DataReady, "Please complete the Data Engineering step first."),
            Stage::Reporting => (PipelineState::AnalysisReady, "Please complete the Analysis step first."),
        };
        if self >= needed {
            Ok(())
        } else {
            Err(AppError::MissingPrerequisite(message.to_string()))
        }
    }

    /// State after `stage` completes
    pub fn after(stage: Stage) -> Self {
        match stage {
            Stage::Intake => PipelineState::IntakeDone,
            Stage::DataEngineering => PipelineState::DataReady,
            Stage::Analysis => PipelineState::AnalysisReady,
            Stage::Reporting => PipelineState::ReportReady,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_enforces_order() {
        let state = PipelineState::Idle;
        assert!(state.require(Stage::Intake).is_ok());
        for stage in [Stage::DataEngineering, Stage::Analysis, Stage::Reporting] {
            assert!(matches!(state.require(stage), Err(AppError::MissingPrerequisite(_))));
        }

        let state = PipelineState::DataReady;
        assert!(state.require(Stage::DataEngineering).is_ok());
        assert!(state.require(Stage::Analysis).is_ok());
        assert!(state.require(Stage::Reporting).is_err());
    }

    #[test]
    fn test_after_each_stage() {
        let states: Vec<PipelineState> = Stage::ALL.iter().map(|s| PipelineState::after(*s)).collect();
        assert!(states.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(states[3], PipelineState::ReportReady);
    }

    #[test]
    fn test_missing_prerequisite_message() {
        let err = PipelineState::Idle.require(Stage::Analysis).unwrap_err();
        assert_eq!(err.to_string(), "Missing prerequisite: Please complete the Data Engineering step first.");
    }
}
