// Shared server state and the JSON bodies of the HTTP API

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::config::Config;
use crate::llm::LLMFactory;
use crate::pipeline::{PipelineDriver, PipelineState, SharedSession};

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    /// One session per server; stage calls queue on this lock
    pub driver: Arc<Mutex<PipelineDriver>>,
    /// Read side of the session, never blocked by a running stage
    pub session: SharedSession,
}

impl AppState {
    pub fn new(config: Config, llm: Arc<dyn LLMFactory>) -> Self {
        let driver = PipelineDriver::new(config.clone(), llm);
        Self {
            config,
            session: driver.shared_session(),
            driver: Arc::new(Mutex::new(driver)),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct IntakeRequest {
    pub request: String,
}

#[derive(Debug, Serialize)]
pub struct StageResponse<T> {
    pub status: String,
    pub state: PipelineState,
    pub result: T,
}

impl<T> StageResponse<T> {
    pub fn success(state: PipelineState, result: T) -> Self {
        Self {
            status: "success".to_string(),
            state,
            result,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    pub workspace: String,
    pub api_key_configured: bool,
}
