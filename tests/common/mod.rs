#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};

use crew_pipeline::config::Config;
use crew_pipeline::llm::{LLMAdapter, LLMFactory, ModelTier};
use crew_pipeline::pipeline::Artifacts;
use crew_pipeline::types::{AppResult, LLMRequest, LLMResponse, ToolCall};

/// Raw export with an id column and yes/no labels
pub const RAW_CSV: &str = "customerID,Age,Annual_Spend,Support_Calls,Churn
C01,25,1200,1,Yes
C02,30,3000,0,No
C03,45,5000,0,No
C04,35,2500,1,No
C05,50,6000,0,No
C06,23,1000,5,Yes
C07,60,7000,0,No
C08,48,5500,0,No
C09,33,2800,1,Yes
C10,29,2900,0,No
C11,22,800,4,Yes
C12,55,6200,0,No
C13,41,,2,No
";

/// Plays back canned responses in order, whichever tier asks
pub struct Scripted {
    responses: Mutex<VecDeque<LLMResponse>>,
    pub requests: Mutex<Vec<LLMRequest>>,
    /// Generated artifacts present when each request arrived
    pub snapshots: Mutex<Vec<Vec<&'static str>>>,
    workspace: PathBuf,
}

impl Scripted {
    pub fn new(workspace: &Path, responses: Vec<LLMResponse>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
            snapshots: Mutex::new(Vec::new()),
            workspace: workspace.to_path_buf(),
        })
    }

    pub fn models(&self) -> Vec<String> {
        self.requests.lock().unwrap().iter().map(|r| r.model.clone()).collect()
    }

    pub fn remaining(&self) -> usize {
        self.responses.lock().unwrap().len()
    }
}

#[async_trait]
impl LLMAdapter for Scripted {
    async fn create_chat_completion(&self, request: &LLMRequest) -> AppResult<LLMResponse> {
        self.requests.lock().unwrap().push(request.clone());
        self.snapshots
            .lock()
            .unwrap()
            .push(Artifacts::new(&self.workspace).present());
        Ok(self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| LLMResponse::text("Nothing more to do.")))
    }
}

pub struct ScriptedFactory(pub Arc<Scripted>);

impl LLMFactory for ScriptedFactory {
    fn adapter_for(&self, _tier: &ModelTier) -> AppResult<Arc<dyn LLMAdapter>> {
        Ok(self.0.clone())
    }
}

pub fn config(workspace: &Path) -> Config {
    let mut config = Config::for_workspace(workspace);
    config.llm.google_api_key = "test-key".to_string();
    config
}

pub fn text(content: &str) -> LLMResponse {
    LLMResponse::text(content)
}

pub fn call(name: &str, arguments: Value) -> LLMResponse {
    LLMResponse::with_calls(vec![ToolCall {
        id: "call_0".to_string(),
        name: name.to_string(),
        arguments,
    }])
}

pub fn intake_script() -> Vec<LLMResponse> {
    vec![
        text("APPROVED. Reducing churn has clear business value."),
        call(
            "save_file",
            json!({"filename": "jira_ticket.txt", "content": "PROJ-101: Churn model\nScope: predict churn\nTimeline: 2 sprints"}),
        ),
        text("Ticket created."),
        call(
            "save_file",
            json!({"filename": "project_plan.md", "content": "# Project Plan\n1. Data engineering\n2. Analysis\n3. Reporting"}),
        ),
        text("Plan created."),
    ]
}

pub fn data_script() -> Vec<LLMResponse> {
    vec![
        call("inspect_csv", json!({"path": "uploaded_data.csv"})),
        call(
            "clean_csv",
            json!({"input_path": "uploaded_data.csv", "output_path": "cleaned_data.csv"}),
        ),
        text("Data is ready: Age, Annual_Spend, Support_Calls, Churn."),
    ]
}

pub fn analysis_script() -> Vec<LLMResponse> {
    vec![
        call("train_model", json!({"csv_path": "cleaned_data.csv"})),
        text("The model is accurate and Support_Calls is the most important feature."),
    ]
}

pub fn reporting_script() -> Vec<LLMResponse> {
    vec![
        call(
            "create_pptx",
            json!({
                "title": "Q4 Churn Analysis",
                "summary": "Churn concentrates in customers with many support calls",
                "findings": "Support_Calls is the top driver"
            }),
        ),
        text("Presentation saved."),
    ]
}

pub fn full_script() -> Vec<LLMResponse> {
    let mut script = intake_script();
    script.extend(data_script());
    script.extend(analysis_script());
    script.extend(reporting_script());
    script
}
