//! Agent / task / crew runtime.
//!
//! A [`Crew`] runs its tasks strictly in order. Each task is a conversation
//! between the assigned agent's model and its tools: the model is called with
//! the tool declarations, any calls it requests are executed and answered, and
//! the loop ends when it replies without calling a tool. The iteration cap
//! forces a last call with no tools offered.

pub mod agent;
pub mod task;

use std::collections::BTreeSet;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::llm::{LLMFactory, LLM};
use crate::types::{AppError, AppResult, LLMMessage};

pub use agent::Agent;
pub use task::{Task, TaskOutput, ToolInvocation};

pub const DEFAULT_MAX_ITERATIONS: usize = 15;

const FINAL_ANSWER_PROMPT: &str = "You have used all the tool calls available for this task. \
     Do not call any more tools. Reply now with your final answer.";

#[derive(Debug, Clone, Serialize)]
pub struct CrewOutput {
    pub tasks: Vec<TaskOutput>,
    /// Output of the last task
    pub raw: String,
}

impl CrewOutput {
    pub fn task(&self, name: &str) -> Option<&TaskOutput> {
        self.tasks.iter().find(|t| t.name == name)
    }
}

#[derive(Debug, Clone)]
pub struct Crew {
    pub agents: Vec<Agent>,
    pub tasks: Vec<Task>,
    pub max_iterations: usize,
}

impl Crew {
    pub fn new(agents: Vec<Agent>, tasks: Vec<Task>) -> Self {
        Self {
            agents,
            tasks,
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations.max(1);
        self
    }

    fn validate(&self) -> AppResult<()> {
        if self.tasks.is_empty() {
            return Err(AppError::Internal("crew has no tasks".to_string()));
        }
        for (i, task) in self.tasks.iter().enumerate() {
            if task.agent >= self.agents.len() {
                return Err(AppError::Internal(format!(
                    "task '{}' is assigned to missing agent {}",
                    task.name, task.agent
                )));
            }
            if let Some(bad) = task.context.iter().find(|&&c| c >= i) {
                return Err(AppError::Internal(format!(
                    "task '{}' takes context from task {} which has not run yet",
                    task.name, bad
                )));
            }
        }
        Ok(())
    }

    /// Run every task in order and collect their outputs
    pub async fn kickoff(&self, llm: &dyn LLMFactory) -> AppResult<CrewOutput> {
        self.validate()?;

        let mut outputs: Vec<TaskOutput> = Vec::with_capacity(self.tasks.len());
        for (i, task) in self.tasks.iter().enumerate() {
            let agent = &self.agents[task.agent];
            info!(task = %task.name, agent = %agent.role, model = %agent.tier.model, "Starting task");

            let prompt = task_prompt(task, i, &self.tasks, &outputs);
            let output = self.run_task(task, agent, prompt, llm).await?;

            info!(
                task = %task.name,
                tool_calls = output.tool_invocations.len(),
                forced_final = output.forced_final,
                "Task complete"
            );
            outputs.push(output);
        }

        let raw = outputs.last().map(|o| o.raw.clone()).unwrap_or_default();
        Ok(CrewOutput { tasks: outputs, raw })
    }

    async fn run_task(
        &self,
        task: &Task,
        agent: &Agent,
        prompt: String,
        factory: &dyn LLMFactory,
    ) -> AppResult<TaskOutput> {
        let llm = LLM::new(factory.adapter_for(&agent.tier)?, agent.tier.clone());
        let persona = agent.persona();
        let mut messages = vec![LLMMessage::user(prompt)];
        let mut invocations = Vec::new();

        for iteration in 0..self.max_iterations {
            let response = llm.complete(Some(&persona), &messages, agent.tools.specs()).await?;
            if response.tool_calls.is_empty() {
                return Ok(TaskOutput {
                    name: task.name.clone(),
                    agent: agent.role.clone(),
                    raw: response.content.trim().to_string(),
                    tool_invocations: invocations,
                    forced_final: false,
                });
            }

            debug!(task = %task.name, iteration, calls = response.tool_calls.len(), "Model requested tools");
            let calls = response.tool_calls.clone();
            messages.push(LLMMessage::assistant_with_calls(response.content, response.tool_calls));
            for call in &calls {
                let output = agent.tools.dispatch(call).await;
                invocations.push(ToolInvocation {
                    tool: call.name.clone(),
                    arguments: call.arguments.clone(),
                    output: output.clone(),
                });
                messages.push(LLMMessage::tool_result(call, output));
            }
        }

        warn!(task = %task.name, max_iterations = self.max_iterations, "Iteration cap reached, forcing final answer");
        messages.push(LLMMessage::user(FINAL_ANSWER_PROMPT));
        let response = llm.complete(Some(&persona), &messages, Vec::new()).await?;

        Ok(TaskOutput {
            name: task.name.clone(),
            agent: agent.role.clone(),
            raw: response.content.trim().to_string(),
            tool_invocations: invocations,
            forced_final: true,
        })
    }
}

/// Task description, expected output, and the outputs it depends on: the
/// previous task plus any declared context tasks
fn task_prompt(task: &Task, index: usize, tasks: &[Task], done: &[TaskOutput]) -> String {
    let mut prompt = format!(
        "{}\n\nExpected output:\n{}",
        task.description.trim(),
        task.expected_output.trim()
    );

    let mut context: BTreeSet<usize> = task.context.iter().copied().collect();
    if index > 0 {
        context.insert(index - 1);
    }
    if !context.is_empty() {
        prompt.push_str("\n\nContext from earlier tasks:");
        for c in context {
            if let Some(output) = done.get(c) {
                prompt.push_str(&format!("\n\n--- {} ---\n{}", tasks[c].name, output.raw));
            }
        }
    }
    prompt
}
