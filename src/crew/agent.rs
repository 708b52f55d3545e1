use crate::llm::ModelTier;
use crate::tools::ToolSet;

/// A persona bound to a model tier and the tools it may call
#[derive(Debug, Clone)]
pub struct Agent {
    pub role: String,
    pub goal: String,
    pub backstory: String,
    pub tier: ModelTier,
    pub tools: ToolSet,
}

impl Agent {
    pub fn new(
        role: impl Into<String>,
        goal: impl Into<String>,
        backstory: impl Into<String>,
        tier: ModelTier,
    ) -> Self {
        Self {
            role: role.into(),
            goal: goal.into(),
            backstory: backstory.into(),
            tier,
            tools: ToolSet::new(),
        }
    }

    pub fn with_tools(mut self, tools: ToolSet) -> Self {
        self.tools = tools;
        self
    }

    /// System instruction sent with every call this agent makes
    pub fn persona(&self) -> String {
        let mut persona = format!(
            "You are the {}.\nYour goal: {}\n\n{}",
            self.role,
            self.goal,
            self.backstory.trim()
        );
        if !self.tools.is_empty() {
            persona.push_str(&format!(
                "\n\nYou can call these tools: {}. Call them whenever the task needs real data \
                 or files; never invent tool results. When you are done, reply with your final \
                 answer as plain text.",
                self.tools.names().join(", ")
            ));
        }
        persona
    }
}
