use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

use super::{string_arg, string_params, Tool, ToolError, Workspace};

/// Create or overwrite a text file in the workspace
pub struct SaveFileTool {
    workspace: Workspace,
}

impl SaveFileTool {
    pub fn new(workspace: Workspace) -> Self {
        Self { workspace }
    }
}

#[async_trait]
impl Tool for SaveFileTool {
    fn name(&self) -> &str {
        "save_file"
    }

    fn description(&self) -> &str {
        "Save text content to a file in the project workspace, overwriting any existing file. \
         Use this to write deliverables such as tickets and plans."
    }

    fn parameters(&self) -> Value {
        string_params(&[
            ("filename", "Relative file name, e.g. jira_ticket.txt"),
            ("content", "Full text content of the file"),
        ])
    }

    async fn invoke(&self, args: Value) -> Result<String, ToolError> {
        let filename = string_arg(&args, "filename")?;
        let content = string_arg(&args, "content")?;
        let path = self.workspace.resolve(&filename)?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ToolError::Io(format!("cannot create {}: {}", parent.display(), e)))?;
        }
        tokio::fs::write(&path, content.as_bytes())
            .await
            .map_err(|e| ToolError::Io(format!("cannot write {}: {}", filename, e)))?;

        info!(file = %path.display(), bytes = content.len(), "Saved file");
        Ok(format!("File saved: {}", filename))
    }
}
