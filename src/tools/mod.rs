//! Invocable tools
//!
//! Every tool an agent may call implements [`Tool`]: a name, a description the
//! model reads when choosing tools, a JSON schema for its arguments, and an
//! async `invoke` from arguments to a result string or a [`ToolError`].
//! Errors never escape to the pipeline; [`ToolSet::dispatch`] renders them as
//! text so the model can correct itself and try again.

pub mod csv_tools;
pub mod files;
pub mod modeling;
pub mod presentation;
pub mod sandbox;
pub mod workspace;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use crate::types::{ToolCall, ToolSpec};

pub use csv_tools::{CleanCsvTool, InspectCsvTool};
pub use files::SaveFileTool;
pub use modeling::TrainModelTool;
pub use presentation::CreatePptxTool;
pub use sandbox::{ExecutePythonCodeTool, Sandbox};
pub use workspace::Workspace;

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("Error: invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("Error: path '{0}' is outside the workspace")]
    PathOutsideWorkspace(String),

    #[error("Error: {0}")]
    Io(String),

    #[error("Error reading CSV: {0}")]
    Csv(String),

    #[error("Error training model: {0}")]
    Training(String),

    #[error("Error executing code: {0}")]
    Execution(String),

    #[error("Error: code rejected by sandbox: {0}")]
    Sandbox(String),

    #[error("Error creating presentation: {0}")]
    Render(String),
}

/// Core trait for all tools
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique name the model calls the tool by
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON schema of the arguments object
    fn parameters(&self) -> Value;

    async fn invoke(&self, args: Value) -> Result<String, ToolError>;

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters(),
        }
    }
}

pub type BoxedTool = Arc<dyn Tool>;

/// The ordered tools granted to one agent
#[derive(Clone, Default)]
pub struct ToolSet {
    tools: Vec<BoxedTool>,
}

impl ToolSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, tool: impl Tool + 'static) -> Self {
        self.tools.push(Arc::new(tool));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    pub fn specs(&self) -> Vec<ToolSpec> {
        self.tools.iter().map(|t| t.spec()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&BoxedTool> {
        self.tools.iter().find(|t| t.name() == name)
    }

    /// Run a model-requested call; failures come back as text, never as `Err`
    pub async fn dispatch(&self, call: &ToolCall) -> String {
        let Some(tool) = self.get(&call.name) else {
            warn!(tool = %call.name, "Model requested an unknown tool");
            return format!(
                "Error: unknown tool '{}'. Available tools: {}",
                call.name,
                self.names().join(", ")
            );
        };

        debug!(tool = %call.name, args = %call.arguments, "Invoking tool");
        match tool.invoke(call.arguments.clone()).await {
            Ok(output) => output,
            Err(e) => {
                warn!(tool = %call.name, error = %e, "Tool returned an error");
                e.to_string()
            }
        }
    }
}

impl std::fmt::Debug for ToolSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

/// Required string argument
pub(crate) fn string_arg(args: &Value, key: &str) -> Result<String, ToolError> {
    match args.get(key) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(Value::Null) | None => Err(ToolError::InvalidArguments(format!("missing '{}'", key))),
        Some(other) => Ok(other.to_string()),
    }
}

/// Object schema whose properties are all required strings
pub(crate) fn string_params(props: &[(&str, &str)]) -> Value {
    let properties: serde_json::Map<String, Value> = props
        .iter()
        .map(|(name, description)| {
            (
                name.to_string(),
                serde_json::json!({ "type": "string", "description": description }),
            )
        })
        .collect();
    serde_json::json!({
        "type": "object",
        "properties": properties,
        "required": props.iter().map(|(name, _)| *name).collect::<Vec<_>>(),
    })
}
