use std::sync::Arc;
use std::time::Instant;

use opentelemetry::KeyValue;
use serde::Serialize;

use crate::agent::ReasoningLoop;
use crate::agent::prompt::research_instruction;
use crate::error::{AppError, get_trace_id};
use crate::telemetry::metrics::RESEARCH_DURATION;
use crate::tools::ToolRegistry;

pub const PARSE_FAILURE: &str = "Something went wrong parsing the response";
pub const RUN_FAILURE: &str = "Something went wrong";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ResearchResult {
    Report {
        company: String,
        agent_response: String,
    },
    Failed {
        reason: String,
        message: String,
    },
}

impl ResearchResult {
    fn failed(reason: &str, message: impl Into<String>) -> Self {
        ResearchResult::Failed {
            reason: reason.to_string(),
            message: message.into(),
        }
    }

    /// Turns a failure into an error for callers that need `?`.
    pub fn into_report(self) -> Result<(String, String), AppError> {
        match self {
            ResearchResult::Report {
                company,
                agent_response,
            } => Ok((company, agent_response)),
            ResearchResult::Failed { reason, message } => {
                Err(AppError::Research(format!("{reason}: {message}")))
            }
        }
    }
}

/// Hands the research brief and the lookup tools to the reasoning loop and
/// folds every outcome into a `ResearchResult`.
pub struct CompanyResearcher {
    agent: Arc<dyn ReasoningLoop>,
    tools: ToolRegistry,
}

impl CompanyResearcher {
    pub fn new(agent: Arc<dyn ReasoningLoop>, tools: ToolRegistry) -> Self {
        Self { agent, tools }
    }

    #[tracing::instrument(
        name = "research company",
        skip(self),
        fields(
            research.id = %uuid::Uuid::new_v4(),
            research.outcome,
            research.steps,
            research.duration_ms,
        )
    )]
    pub async fn research_company(&self, company: &str) -> ResearchResult {
        let start = Instant::now();
        let span = tracing::Span::current();

        tracing::info!(
            company = %company,
            tools = ?self.tools.names(),
            trace_id = get_trace_id().unwrap_or_default(),
            "Research started"
        );

        let instruction = research_instruction(company);
        let result = match self.agent.run(&instruction, &self.tools).await {
            Ok(run) => {
                span.record("research.steps", run.steps);
                match run.error {
                    Some(error) => {
                        tracing::warn!(error = %error, output = %run.output, "Agent run ended with an error");
                        ResearchResult::failed(PARSE_FAILURE, error)
                    }
                    None => ResearchResult::Report {
                        company: company.to_string(),
                        agent_response: run.output,
                    },
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "Agent run failed");
                ResearchResult::failed(RUN_FAILURE, e.to_string())
            }
        };

        let duration = start.elapsed();
        let outcome = match &result {
            ResearchResult::Report { .. } => "report",
            ResearchResult::Failed { .. } => "failed",
        };
        span.record("research.outcome", outcome);
        span.record("research.duration_ms", duration.as_millis() as u64);
        RESEARCH_DURATION.record(
            duration.as_secs_f64(),
            &[KeyValue::new("research.outcome", outcome)],
        );

        tracing::info!(
            company = %company,
            outcome,
            duration_ms = duration.as_millis() as u64,
            "Research finished"
        );

        result
    }
}
