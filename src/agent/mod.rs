pub mod parser;
pub mod prompt;
pub mod react;

pub use react::ReactAgent;

use crate::tools::ToolRegistry;

/// Outcome of one reasoning run. `error` is set when the loop stopped without
/// reaching a usable final answer; `output` then carries whatever it has.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentRun {
    pub output: String,
    pub error: Option<String>,
    pub steps: usize,
}

impl AgentRun {
    pub fn finished(output: impl Into<String>, steps: usize) -> Self {
        Self {
            output: output.into(),
            error: None,
            steps,
        }
    }

    pub fn stopped(output: impl Into<String>, error: impl Into<String>, steps: usize) -> Self {
        Self {
            output: output.into(),
            error: Some(error.into()),
            steps,
        }
    }
}

/// Think/act/observe driver: given an instruction and callable tools, produce
/// a final text answer.
#[async_trait::async_trait]
pub trait ReasoningLoop: Send + Sync {
    async fn run(&self, instruction: &str, tools: &ToolRegistry) -> anyhow::Result<AgentRun>;
}
