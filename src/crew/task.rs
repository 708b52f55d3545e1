use serde::Serialize;

/// A unit of work assigned to one agent of a crew
#[derive(Debug, Clone)]
pub struct Task {
    pub name: String,
    pub description: String,
    pub expected_output: String,
    /// Index into the crew's agents
    pub agent: usize,
    /// Earlier tasks whose output is added to this task's prompt
    pub context: Vec<usize>,
}

impl Task {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        expected_output: impl Into<String>,
        agent: usize,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            expected_output: expected_output.into(),
            agent,
            context: Vec::new(),
        }
    }

    pub fn with_context(mut self, context: Vec<usize>) -> Self {
        self.context = context;
        self
    }
}

/// One tool call made while a task ran
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolInvocation {
    pub tool: String,
    pub arguments: serde_json::Value,
    pub output: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskOutput {
    pub name: String,
    pub agent: String,
    pub raw: String,
    pub tool_invocations: Vec<ToolInvocation>,
    /// True when the iteration cap forced the final answer
    pub forced_final: bool,
}

impl TaskOutput {
    pub fn called(&self, tool: &str) -> bool {
        self.tool_invocations.iter().any(|t| t.tool == tool)
    }
}
