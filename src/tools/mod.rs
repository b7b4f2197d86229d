pub mod logo;
pub mod news;
pub mod transport;

use std::sync::Arc;
use std::time::Instant;

use opentelemetry::KeyValue;
use tracing::Instrument;

use crate::config::Config;
use crate::telemetry::metrics::{AGENT_TOOL_CALLS, AGENT_TOOL_DURATION};

pub use logo::LogoLookup;
pub use news::NewsLookup;
pub use transport::{ReqwestTransport, Transport};

/// A named capability the reasoning loop can call with one text argument.
///
/// `call` returns text and has no error channel: every failure must be folded
/// into the returned observation.
#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    async fn call(&self, input: &str) -> String;
}

#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The logo and news lookups, wired to one shared transport.
    pub fn company_research(config: &Config, transport: Arc<dyn Transport>) -> Self {
        Self::new()
            .with(LogoLookup::new(config, transport.clone()))
            .with(NewsLookup::new(config, transport))
    }

    pub fn with(mut self, tool: impl Tool + 'static) -> Self {
        self.register(Arc::new(tool));
        self
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.retain(|t| t.name() != tool.name());
        self.tools.push(tool);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.name() == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    /// One `name: description` line per tool, in registration order.
    pub fn describe(&self) -> String {
        self.tools
            .iter()
            .map(|t| format!("{}: {}", t.name(), t.description()))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Runs the named tool inside a span. Unknown names produce an observation
    /// listing the valid tools rather than an error.
    pub async fn invoke(&self, name: &str, input: &str) -> String {
        let Some(tool) = self.get(name) else {
            AGENT_TOOL_CALLS.add(
                1,
                &[
                    KeyValue::new("tool.name", name.to_string()),
                    KeyValue::new("tool.outcome", "unknown_tool"),
                ],
            );
            tracing::warn!(tool = %name, "Agent requested an unknown tool");
            return format!(
                "{name} is not a valid tool, try one of [{}].",
                self.names().join(", ")
            );
        };

        let span = tracing::info_span!(
            "agent.tool",
            otel.name = %format!("tool {name}"),
            tool.name = %name,
            tool.input = %input,
            tool.output_len = tracing::field::Empty,
        );

        let start = Instant::now();
        let output = tool.call(input).instrument(span.clone()).await;
        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;

        span.record("tool.output_len", output.len());
        AGENT_TOOL_CALLS.add(
            1,
            &[
                KeyValue::new("tool.name", name.to_string()),
                KeyValue::new("tool.outcome", "called"),
            ],
        );
        AGENT_TOOL_DURATION.record(elapsed_ms, &[KeyValue::new("tool.name", name.to_string())]);

        tracing::info!(tool = %name, input = %input, latency_ms = elapsed_ms, "Tool call finished");

        output
    }
}
