use std::sync::Arc;

use crate::config::Config;
use crate::llm::{GenerateRequest, LlmClient};
use crate::telemetry::metrics::AGENT_ITERATIONS;
use crate::tools::ToolRegistry;

use super::parser::{Step, parse_step};
use super::prompt::build_react_prompt;
use super::{AgentRun, ReasoningLoop};

pub const ITERATION_LIMIT_OUTPUT: &str = "Agent stopped due to iteration limit or time limit.";

/// Single-input ReAct loop: one completion per step, at most one tool call per
/// step, until the model gives a final answer or the step budget runs out.
///
/// A reply that is neither an action nor a final answer ends the run with an
/// error. Running out of steps is not an error: the run finishes with
/// `ITERATION_LIMIT_OUTPUT` as its answer.
pub struct ReactAgent {
    llm: Arc<LlmClient>,
    model: String,
    temperature: f32,
    max_tokens: u32,
    max_iterations: usize,
}

impl ReactAgent {
    pub fn new(llm: Arc<LlmClient>, config: &Config) -> Self {
        Self {
            llm,
            model: config.llm_model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            max_iterations: config.max_iterations,
        }
    }
}

#[async_trait::async_trait]
impl ReasoningLoop for ReactAgent {
    #[tracing::instrument(
        name = "agent.run",
        skip_all,
        fields(
            agent.model = %self.model,
            agent.max_iterations = self.max_iterations,
            agent.steps,
            agent.outcome,
        )
    )]
    async fn run(&self, instruction: &str, tools: &ToolRegistry) -> anyhow::Result<AgentRun> {
        let span = tracing::Span::current();
        let mut scratchpad = String::new();

        for step in 1..=self.max_iterations {
            let prompt = build_react_prompt(tools, instruction, &scratchpad);

            let resp = self
                .llm
                .generate(&GenerateRequest {
                    model: self.model.clone(),
                    system: String::new(),
                    prompt,
                    temperature: self.temperature,
                    max_tokens: self.max_tokens,
                    stage: "react_step".to_string(),
                })
                .await?;

            let parsed = parse_step(&resp.content).map_err(|e| {
                span.record("agent.steps", step);
                span.record("agent.outcome", "parse_error");
                tracing::warn!(step, error = %e, "Could not parse agent output");
                anyhow::anyhow!("Could not parse LLM output: {e}")
            })?;

            match parsed {
                Step::Finish { output } => {
                    span.record("agent.steps", step);
                    AGENT_ITERATIONS.record(step as f64, &[]);

                    if output.is_empty() {
                        span.record("agent.outcome", "empty_answer");
                        tracing::warn!(step, "Agent returned an empty final answer");
                        return Ok(AgentRun::stopped(output, "empty final answer", step));
                    }

                    span.record("agent.outcome", "finished");
                    tracing::info!(step, answer_len = output.len(), "Agent reached a final answer");
                    return Ok(AgentRun::finished(output, step));
                }
                Step::Action { tool, input, log } => {
                    tracing::debug!(step, tool = %tool, input = %input, "Agent chose an action");
                    let observation = tools.invoke(&tool, &input).await;
                    scratchpad.push_str(&format!("{log}\nObservation: {observation}\nThought:"));
                }
            }
        }

        span.record("agent.steps", self.max_iterations);
        span.record("agent.outcome", "iteration_limit");
        AGENT_ITERATIONS.record(self.max_iterations as f64, &[]);
        tracing::warn!(
            max_iterations = self.max_iterations,
            "Agent stopped without a final answer"
        );

        Ok(AgentRun::finished(ITERATION_LIMIT_OUTPUT, self.max_iterations))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::test_config;
    use crate::llm::client::tests::ScriptedProvider;
    use crate::tools::LogoLookup;
    use crate::tools::transport::stub::StubTransport;

    fn agent_with(replies: Vec<anyhow::Result<String>>) -> (ReactAgent, Arc<ScriptedProvider>) {
        agent_with_config(replies, &test_config())
    }

    fn agent_with_config(
        replies: Vec<anyhow::Result<String>>,
        config: &Config,
    ) -> (ReactAgent, Arc<ScriptedProvider>) {
        let provider = Arc::new(ScriptedProvider::new(replies));
        let llm = Arc::new(LlmClient::new(provider.clone(), "https://api.openai.com/v1"));
        (ReactAgent::new(llm, config), provider)
    }

    fn logo_tools(stub: StubTransport) -> (ToolRegistry, Arc<StubTransport>) {
        let transport = Arc::new(stub);
        let tools = ToolRegistry::new().with(LogoLookup::new(&test_config(), transport.clone()));
        (tools, transport)
    }

    #[tokio::test]
    async fn test_direct_final_answer() {
        let (agent, provider) = agent_with(vec![Ok(
            " I now know the final answer\nFinal Answer: No information found".to_string(),
        )]);
        let (tools, transport) = logo_tools(StubTransport::new());

        let run = agent.run("Research the company acme", &tools).await.unwrap();
        assert_eq!(run, AgentRun::finished("No information found", 1));
        assert_eq!(provider.calls(), 1);
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test]
    async fn test_tool_observation_feeds_next_step() {
        let (agent, provider) = agent_with(vec![
            Ok(" I need the logo.\nAction: get_company_logo\nAction Input: https://stripe.com".to_string()),
            Ok(" I now know the final answer\nFinal Answer: # Company Logo\n![stripe.com logo](https://img.logo.dev/stripe.com?token=TOKEN)".to_string()),
        ]);
        let (tools, transport) = logo_tools(StubTransport::new().respond(200, ""));

        let run = agent.run("Research the company stripe", &tools).await.unwrap();
        assert!(run.error.is_none());
        assert_eq!(run.steps, 2);
        assert!(run.output.starts_with("# Company Logo"));
        assert_eq!(transport.call_count(), 1);

        let prompts = provider.prompts.lock().unwrap();
        assert!(prompts[1].contains(
            "Action Input: https://stripe.com\nObservation: ![stripe.com logo](https://img.logo.dev/stripe.com?token=TOKEN)\nThought:"
        ));
    }

    #[tokio::test]
    async fn test_unknown_tool_is_observed() {
        let (agent, provider) = agent_with(vec![
            Ok("Action: search_web\nAction Input: stripe".to_string()),
            Ok("Final Answer: done".to_string()),
        ]);
        let (tools, _) = logo_tools(StubTransport::new());

        let run = agent.run("q", &tools).await.unwrap();
        assert_eq!(run, AgentRun::finished("done", 2));

        let prompts = provider.prompts.lock().unwrap();
        assert!(prompts[1].contains(
            "Observation: search_web is not a valid tool, try one of [get_company_logo]."
        ));
    }

    #[tokio::test]
    async fn test_malformed_reply_stops_the_run() {
        let (agent, provider) = agent_with(vec![
            Ok("hmm, not sure".to_string()),
            Ok("Final Answer: never reached".to_string()),
        ]);
        let (tools, transport) = logo_tools(StubTransport::new());

        let err = agent.run("q", &tools).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Could not parse LLM output: Invalid Format: Missing 'Action:' after 'Thought:'"
        );
        assert_eq!(provider.calls(), 1);
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test]
    async fn test_iteration_limit_is_a_normal_answer() {
        let reply = || Ok("Action: get_company_logo\nAction Input: stripe.com".to_string());
        let mut config = test_config();
        config.max_iterations = 2;
        let (agent, provider) = agent_with_config(vec![reply(), reply(), reply()], &config);
        let (tools, _) = logo_tools(StubTransport::new().respond(200, "").respond(200, ""));

        let run = agent.run("q", &tools).await.unwrap();
        assert_eq!(run, AgentRun::finished(ITERATION_LIMIT_OUTPUT, 2));
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test]
    async fn test_empty_final_answer_sets_error() {
        let (agent, _) = agent_with(vec![Ok("Final Answer:   ".to_string())]);
        let (tools, _) = logo_tools(StubTransport::new());

        let run = agent.run("q", &tools).await.unwrap();
        assert_eq!(run.error.as_deref(), Some("empty final answer"));
    }

    #[tokio::test]
    async fn test_llm_failure_propagates() {
        let (agent, _) = agent_with(vec![Err(anyhow::anyhow!("401 invalid api key"))]);
        let (tools, _) = logo_tools(StubTransport::new());

        let err = agent.run("q", &tools).await.unwrap_err();
        assert!(err.to_string().contains("401"));
    }
}
