use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use super::artifacts::{Artifacts, CLEANED_DATA, UPLOADED_DATA};
use super::{PipelineState, Stage};
use crate::agents::{self, AnalysisOutcome, DataOutcome, IntakeOutcome, ReportOutcome, StageContext};
use crate::analysis::DataFrame;
use crate::config::Config;
use crate::llm::{LLMFactory, ModelTiers};
use crate::types::{AppError, AppResult};

/// What the current session has produced so far
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub state: PipelineState,
    pub request: Option<String>,
    pub uploaded: Option<UploadSummary>,
    pub intake: Option<IntakeOutcome>,
    pub data: Option<DataOutcome>,
    pub analysis: Option<AnalysisOutcome>,
    pub report: Option<ReportOutcome>,
}

impl Session {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            state: PipelineState::Idle,
            request: None,
            uploaded: None,
            intake: None,
            data: None,
            analysis: None,
            report: None,
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

/// Latest session snapshot, readable while a stage holds the driver
pub type SharedSession = Arc<RwLock<Session>>;

#[derive(Debug, Clone, Serialize)]
pub struct UploadSummary {
    pub rows: usize,
    pub columns: Vec<String>,
    pub preview: String,
}

/// Runs one stage at a time, carrying typed outcomes forward.
/// A failed stage leaves the session untouched.
pub struct PipelineDriver {
    config: Config,
    llm: Arc<dyn LLMFactory>,
    session: Session,
    published: SharedSession,
}

impl PipelineDriver {
    pub fn new(config: Config, llm: Arc<dyn LLMFactory>) -> Self {
        let session = Session::new();
        Self {
            config,
            llm,
            published: Arc::new(RwLock::new(session.clone())),
            session,
        }
    }

    pub fn shared_session(&self) -> SharedSession {
        self.published.clone()
    }

    fn publish(&self) {
        let mut snapshot = self.published.write().unwrap_or_else(|e| e.into_inner());
        *snapshot = self.session.clone();
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn artifacts(&self) -> Artifacts {
        Artifacts::new(&self.config.pipeline.workspace_dir)
    }

    pub fn reset(&mut self) {
        self.session = Session::new();
        self.publish();
        info!(session = %self.session.id, "New session");
    }

    fn context(&self, api_key: Option<&str>) -> AppResult<StageContext> {
        let tiers = ModelTiers::from_config(&self.config, api_key)?;
        Ok(StageContext::new(&self.config, tiers))
    }

    fn complete(&mut self, stage: Stage) {
        self.session.state = PipelineState::after(stage);
        // outcomes past this stage were built from stale inputs
        if stage.number() < Stage::Reporting.number() {
            self.session.report = None;
        }
        if stage.number() < Stage::Analysis.number() {
            self.session.analysis = None;
        }
        if stage.number() < Stage::DataEngineering.number() {
            self.session.data = None;
        }
        self.publish();
        info!(stage = %stage, state = ?self.session.state, "Stage finished");
    }

    pub async fn intake(&mut self, api_key: Option<&str>, request: &str) -> AppResult<IntakeOutcome> {
        self.session.state.require(Stage::Intake)?;
        let ctx = self.context(api_key)?;

        let outcome = agents::intake::run(&ctx, self.llm.as_ref(), request).await?;
        self.session.request = Some(request.trim().to_string());
        self.session.intake = Some(outcome.clone());
        self.complete(Stage::Intake);
        Ok(outcome)
    }

    /// Store the raw dataset for the Data Engineering stage
    pub fn upload_data(&mut self, bytes: &[u8]) -> AppResult<UploadSummary> {
        self.session.state.require(Stage::DataEngineering)?;
        if bytes.is_empty() {
            return Err(AppError::InvalidRequest("uploaded file is empty".to_string()));
        }

        let artifacts = self.artifacts();
        let path = artifacts.path(UPLOADED_DATA);
        std::fs::write(&path, bytes)?;
        let frame = match DataFrame::from_path(&path) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "Rejected upload");
                std::fs::remove_file(&path)?;
                return Err(AppError::InvalidRequest(format!("not a readable CSV: {:#}", e)));
            }
        };

        let summary = UploadSummary {
            rows: frame.shape().0,
            preview: frame.head(5),
            columns: frame.columns,
        };
        info!(rows = summary.rows, columns = summary.columns.len(), "Dataset uploaded");

        // the cleaned file belongs to the previous dataset
        artifacts.discard(&[CLEANED_DATA])?;

        self.session.uploaded = Some(summary.clone());
        self.session.data = None;
        self.session.analysis = None;
        self.session.report = None;
        self.session.state = self.session.state.min(PipelineState::IntakeDone);
        self.publish();
        Ok(summary)
    }

    pub async fn clean_data(&mut self, api_key: Option<&str>) -> AppResult<DataOutcome> {
        self.session.state.require(Stage::DataEngineering)?;
        if self.session.uploaded.is_none() && !self.artifacts().exists(UPLOADED_DATA) {
            return Err(AppError::MissingPrerequisite("Please upload a CSV dataset first.".to_string()));
        }
        let ctx = self.context(api_key)?;
        let request = self.session.request.clone().unwrap_or_default();

        let outcome = agents::data_engineering::run(&ctx, self.llm.as_ref(), UPLOADED_DATA, &request).await?;
        self.session.data = Some(outcome.clone());
        self.complete(Stage::DataEngineering);
        Ok(outcome)
    }

    pub async fn analyze(&mut self, api_key: Option<&str>) -> AppResult<AnalysisOutcome> {
        self.session.state.require(Stage::Analysis)?;
        let ctx = self.context(api_key)?;
        let request = self.session.request.clone().unwrap_or_default();

        let outcome = agents::analysis::run(&ctx, self.llm.as_ref(), &request).await?;
        self.session.analysis = Some(outcome.clone());
        self.complete(Stage::Analysis);
        Ok(outcome)
    }

    pub async fn report(&mut self, api_key: Option<&str>) -> AppResult<ReportOutcome> {
        self.session.state.require(Stage::Reporting)?;
        let summary = self
            .session
            .analysis
            .as_ref()
            .map(|a| a.summary.clone())
            .ok_or_else(|| AppError::MissingPrerequisite("Please complete the Analysis step first.".to_string()))?;
        let ctx = self.context(api_key)?;

        let outcome = agents::reporting::run(&ctx, self.llm.as_ref(), &summary).await?;
        self.session.report = Some(outcome.clone());
        self.complete(Stage::Reporting);
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{LLMAdapter, ModelTier};
    use crate::pipeline::artifacts::{JIRA_TICKET, PRESENTATION, PROJECT_PLAN};
    use crate::types::{LLMRequest, LLMResponse, ToolCall};
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::collections::VecDeque;
    use std::path::{Path, PathBuf};
    use std::sync::Mutex;

    const RAW: &str = "customerID,Age,Support_Calls,Churn\n\
                       C1,25,1,Yes\nC2,30,0,No\nC3,45,0,No\nC4,23,5,Yes\nC5,50,0,No\nC6,22,4,Yes\n";

    /// Replays queued responses; `writes` land on disk before the next reply,
    /// standing in for files a model produced on its own
    #[derive(Default)]
    struct Replay {
        responses: Mutex<VecDeque<LLMResponse>>,
        writes: Mutex<Vec<(PathBuf, String)>>,
    }

    impl Replay {
        fn queue(&self, responses: Vec<LLMResponse>) {
            self.responses.lock().unwrap().extend(responses);
        }
    }

    #[async_trait]
    impl LLMAdapter for Replay {
        async fn create_chat_completion(&self, _request: &LLMRequest) -> AppResult<LLMResponse> {
            for (path, contents) in self.writes.lock().unwrap().drain(..) {
                std::fs::write(path, contents).unwrap();
            }
            Ok(self
                .responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| LLMResponse::text("done")))
        }
    }

    struct ReplayFactory(Arc<Replay>);

    impl LLMFactory for ReplayFactory {
        fn adapter_for(&self, _tier: &ModelTier) -> AppResult<Arc<dyn LLMAdapter>> {
            Ok(self.0.clone())
        }
    }

    fn setup(dir: &Path) -> (PipelineDriver, Arc<Replay>) {
        let mut config = Config::for_workspace(dir);
        config.llm.google_api_key = "test-key".to_string();
        let replay = Arc::new(Replay::default());
        let driver = PipelineDriver::new(config, Arc::new(ReplayFactory(replay.clone())));
        (driver, replay)
    }

    fn call(name: &str, arguments: Value) -> LLMResponse {
        LLMResponse::with_calls(vec![ToolCall {
            id: "call_0".to_string(),
            name: name.to_string(),
            arguments,
        }])
    }

    fn intake_script(ticket: &str) -> Vec<LLMResponse> {
        vec![
            LLMResponse::text("APPROVED"),
            call("save_file", json!({"filename": JIRA_TICKET, "content": ticket})),
            LLMResponse::text("Ticket created."),
            call("save_file", json!({"filename": PROJECT_PLAN, "content": "# Plan"})),
            LLMResponse::text("Plan created."),
        ]
    }

    fn data_script() -> Vec<LLMResponse> {
        vec![
            call("clean_csv", json!({"input_path": UPLOADED_DATA, "output_path": CLEANED_DATA})),
            LLMResponse::text("Data is ready."),
        ]
    }

    /// Intake, upload, clean and analyse
    async fn through_analysis(driver: &mut PipelineDriver, replay: &Replay) {
        replay.queue(intake_script("PROJ-1"));
        driver.intake(None, "Build a churn model").await.unwrap();
        driver.upload_data(RAW.as_bytes()).unwrap();
        replay.queue(data_script());
        driver.clean_data(None).await.unwrap();
        replay.queue(vec![LLMResponse::text("Support calls drive churn.")]);
        driver.analyze(None).await.unwrap();
        assert_eq!(driver.session().state, PipelineState::AnalysisReady);
    }

    #[tokio::test]
    async fn test_stages_run_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let (mut driver, _replay) = setup(dir.path());

        let err = driver.clean_data(None).await.unwrap_err();
        assert!(matches!(err, AppError::MissingPrerequisite(_)));
        let err = driver.report(None).await.unwrap_err();
        assert!(matches!(err, AppError::MissingPrerequisite(_)));
        assert!(matches!(driver.upload_data(RAW.as_bytes()), Err(AppError::MissingPrerequisite(_))));
        assert_eq!(driver.session().state, PipelineState::Idle);
    }

    #[tokio::test]
    async fn test_full_session_reaches_report() {
        let dir = tempfile::tempdir().unwrap();
        let (mut driver, replay) = setup(dir.path());
        through_analysis(&mut driver, &replay).await;

        replay.queue(vec![
            call("create_pptx", json!({"title": "Q4", "summary": "s", "findings": "f"})),
            LLMResponse::text("Saved."),
        ]);
        let outcome = driver.report(None).await.unwrap();
        assert_eq!(outcome.deck_path, dir.path().join(PRESENTATION));
        assert_eq!(driver.session().state, PipelineState::ReportReady);
        assert_eq!(driver.shared_session().read().unwrap().state, PipelineState::ReportReady);
    }

    #[tokio::test]
    async fn test_rerun_drops_later_outcomes() {
        let dir = tempfile::tempdir().unwrap();
        let (mut driver, replay) = setup(dir.path());
        through_analysis(&mut driver, &replay).await;

        replay.queue(data_script());
        driver.clean_data(None).await.unwrap();

        let session = driver.session();
        assert_eq!(session.state, PipelineState::DataReady);
        assert!(session.data.is_some());
        assert!(session.analysis.is_none());
        assert!(matches!(driver.report(None).await, Err(AppError::MissingPrerequisite(_))));
    }

    #[tokio::test]
    async fn test_new_upload_resets_to_intake_done() {
        let dir = tempfile::tempdir().unwrap();
        let (mut driver, replay) = setup(dir.path());
        through_analysis(&mut driver, &replay).await;

        driver.upload_data(RAW.as_bytes()).unwrap();

        let session = driver.session();
        assert_eq!(session.state, PipelineState::IntakeDone);
        assert!(session.intake.is_some());
        assert!(session.data.is_none());
        assert!(session.analysis.is_none());
        assert!(!dir.path().join(CLEANED_DATA).exists());
    }

    #[tokio::test]
    async fn test_rejected_upload_is_removed() {
        let dir = tempfile::tempdir().unwrap();
        let (mut driver, replay) = setup(dir.path());
        replay.queue(intake_script("PROJ-1"));
        driver.intake(None, "Build a churn model").await.unwrap();

        assert!(matches!(driver.upload_data(b""), Err(AppError::InvalidRequest(_))));
        let err = driver.upload_data(b"\xff\xfe,\xff\n1,2\n").unwrap_err();
        assert!(matches!(err, AppError::InvalidRequest(_)));
        assert!(!dir.path().join(UPLOADED_DATA).exists());
        assert!(driver.session().uploaded.is_none());
        assert_eq!(driver.session().state, PipelineState::IntakeDone);
    }

    #[tokio::test]
    async fn test_rerun_overwrites_artifact_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let (mut driver, replay) = setup(dir.path());

        replay.queue(intake_script("PROJ-1"));
        driver.intake(None, "Build a churn model").await.unwrap();
        replay.queue(intake_script("PROJ-2"));
        let outcome = driver.intake(None, "Build a churn model").await.unwrap();

        assert_eq!(outcome.ticket, "PROJ-2");
        assert_eq!(std::fs::read_to_string(dir.path().join(JIRA_TICKET)).unwrap(), "PROJ-2");
    }

    #[tokio::test]
    async fn test_previous_cleaned_data_does_not_count() {
        let dir = tempfile::tempdir().unwrap();
        let (mut driver, replay) = setup(dir.path());
        replay.queue(intake_script("PROJ-1"));
        driver.intake(None, "Build a churn model").await.unwrap();

        std::fs::write(dir.path().join(CLEANED_DATA), "Old,Churn\n1,0\n").unwrap();
        driver.upload_data(RAW.as_bytes()).unwrap();
        replay.queue(vec![LLMResponse::text("The data is fine.")]);

        let err = driver.clean_data(None).await.unwrap_err();
        assert!(matches!(err, AppError::MissingArtifact(ref name) if name == CLEANED_DATA));
        assert_eq!(driver.session().state, PipelineState::IntakeDone);
        assert!(!dir.path().join(CLEANED_DATA).exists());
    }

    #[tokio::test]
    async fn test_unreadable_cleaned_data_is_a_csv_error() {
        let dir = tempfile::tempdir().unwrap();
        let (mut driver, replay) = setup(dir.path());
        replay.queue(intake_script("PROJ-1"));
        driver.intake(None, "Build a churn model").await.unwrap();
        driver.upload_data(RAW.as_bytes()).unwrap();

        replay
            .writes
            .lock()
            .unwrap()
            .push((dir.path().join(CLEANED_DATA), String::new()));
        replay.queue(vec![LLMResponse::text("Wrote the file myself.")]);

        let err = driver.clean_data(None).await.unwrap_err();
        assert!(matches!(err, AppError::Csv(_)));
        assert_eq!(driver.session().state, PipelineState::IntakeDone);
    }

    #[test]
    fn test_reset_publishes_a_new_session() {
        let dir = tempfile::tempdir().unwrap();
        let (mut driver, _replay) = setup(dir.path());
        let shared = driver.shared_session();
        let before = shared.read().unwrap().id;

        driver.reset();
        assert_ne!(shared.read().unwrap().id, before);
        assert_eq!(shared.read().unwrap().id, driver.session().id);
    }
}
