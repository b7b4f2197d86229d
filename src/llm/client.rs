use std::sync::{Arc, LazyLock};
use std::time::Instant;

use opentelemetry::KeyValue;
use regex::Regex;
use tracing::Instrument;
use tracing_opentelemetry::OpenTelemetrySpanExt;

use super::{GenerateRequest, GenerateResponse, Provider};
use crate::telemetry::metrics::{GEN_AI_ERROR_COUNT, GEN_AI_OPERATION_DURATION, GEN_AI_TOKEN_USAGE};

static TOKEN_PARAM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)([?&](?:token|api_key|key)=)[^&\s)\]"'>]+"#).expect("valid token regex")
});

/// Instrumented front for a single chat backend. Calls are made once; there is
/// no retry or fallback provider.
pub struct LlmClient {
    provider: Arc<dyn Provider>,
    server_address: String,
    server_port: i64,
}

impl LlmClient {
    pub fn new(provider: Arc<dyn Provider>, base_url: &str) -> Self {
        let (server_address, server_port) = server_endpoint(base_url);
        Self {
            provider,
            server_address,
            server_port,
        }
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub async fn generate(&self, req: &GenerateRequest) -> anyhow::Result<GenerateResponse> {
        let provider_name = self.provider.name().to_string();
        let span_display_name = format!("gen_ai.chat {}", req.model);
        let start = Instant::now();

        let span = tracing::info_span!(
            "gen_ai.chat",
            otel.name = %span_display_name,
            gen_ai.operation.name = "chat",
            gen_ai.provider.name = %provider_name,
            gen_ai.request.model = %req.model,
            server.address = %self.server_address,
            server.port = self.server_port,
            gen_ai.request.temperature = req.temperature,
            gen_ai.request.max_tokens = req.max_tokens as i64,
            gen_ai.response.model = tracing::field::Empty,
            gen_ai.usage.input_tokens = tracing::field::Empty,
            gen_ai.usage.output_tokens = tracing::field::Empty,
            gen_ai.response.finish_reasons = tracing::field::Empty,
            agent.stage = %req.stage,
            otel.status_code = tracing::field::Empty,
            error.type = tracing::field::Empty,
        );

        {
            let mut user_event_attrs = vec![KeyValue::new(
                "gen_ai.prompt",
                truncate(&redact_secrets(&req.prompt), 1000),
            )];
            if !req.system.is_empty() {
                user_event_attrs.push(KeyValue::new(
                    "gen_ai.system_instructions",
                    truncate(&req.system, 500),
                ));
            }
            span.add_event("gen_ai.user.message", user_event_attrs);
        }

        let result = self.provider.generate(req).instrument(span.clone()).await;

        let duration = start.elapsed().as_secs_f64();

        match result {
            Ok(mut resp) => {
                resp.provider = provider_name.clone();

                span.record("gen_ai.response.model", resp.model.as_str());
                span.record("gen_ai.usage.input_tokens", resp.input_tokens as i64);
                span.record("gen_ai.usage.output_tokens", resp.output_tokens as i64);
                if !resp.finish_reason.is_empty() {
                    span.record(
                        "gen_ai.response.finish_reasons",
                        resp.finish_reason.as_str(),
                    );
                }

                span.add_event(
                    "gen_ai.assistant.message",
                    vec![KeyValue::new(
                        "gen_ai.completion",
                        truncate(&redact_secrets(&resp.content), 2000),
                    )],
                );

                let op_kv = KeyValue::new("gen_ai.operation.name", "chat");
                let provider_kv = KeyValue::new("gen_ai.provider.name", provider_name);
                let model_kv = KeyValue::new("gen_ai.request.model", resp.model.clone());

                GEN_AI_TOKEN_USAGE.record(
                    f64::from(resp.input_tokens),
                    &[
                        KeyValue::new("gen_ai.token.type", "input"),
                        op_kv.clone(),
                        provider_kv.clone(),
                        model_kv.clone(),
                    ],
                );
                GEN_AI_TOKEN_USAGE.record(
                    f64::from(resp.output_tokens),
                    &[
                        KeyValue::new("gen_ai.token.type", "output"),
                        op_kv.clone(),
                        provider_kv.clone(),
                        model_kv.clone(),
                    ],
                );
                GEN_AI_OPERATION_DURATION.record(duration, &[op_kv, provider_kv, model_kv]);

                tracing::debug!(
                    model = %resp.model,
                    input_tokens = resp.input_tokens,
                    output_tokens = resp.output_tokens,
                    duration_s = duration,
                    "LLM call completed"
                );

                Ok(resp)
            }
            Err(err) => {
                let error_type = classify_error(&err);
                span.record("otel.status_code", "ERROR");
                span.record("error.type", error_type);

                GEN_AI_ERROR_COUNT.add(
                    1,
                    &[
                        KeyValue::new("gen_ai.provider.name", provider_name.clone()),
                        KeyValue::new("gen_ai.request.model", req.model.clone()),
                        KeyValue::new("error.type", error_type),
                    ],
                );

                tracing::warn!(
                    provider = %provider_name,
                    model = %req.model,
                    error.type = error_type,
                    error = %err,
                    "LLM call failed"
                );

                Err(err)
            }
        }
    }
}

fn server_endpoint(base_url: &str) -> (String, i64) {
    match url::Url::parse(base_url) {
        Ok(parsed) => (
            parsed.host_str().unwrap_or("unknown").to_string(),
            parsed.port_or_known_default().map(i64::from).unwrap_or(443),
        ),
        Err(_) => ("unknown".to_string(), 443),
    }
}

pub(crate) fn classify_error(err: &anyhow::Error) -> &'static str {
    let msg = err.to_string().to_lowercase();
    if msg.contains("rate limit") || msg.contains("429") {
        "rate_limit"
    } else if msg.contains("timeout") || msg.contains("timed out") || msg.contains("deadline") {
        "timeout"
    } else if msg.contains("401")
        || msg.contains("403")
        || msg.contains("auth")
        || msg.contains("api key")
    {
        "auth_error"
    } else if msg.contains("400") || msg.contains("422") || msg.contains("invalid") {
        "invalid_request"
    } else if msg.contains("500")
        || msg.contains("502")
        || msg.contains("503")
        || msg.contains("server")
    {
        "server_error"
    } else if msg.contains("connect")
        || msg.contains("dns")
        || msg.contains("network")
        || msg.contains("reset")
    {
        "network_error"
    } else {
        "unknown_error"
    }
}

/// Masks credentials passed as URL query parameters, such as the logo token.
pub(crate) fn redact_secrets(s: &str) -> String {
    TOKEN_PARAM_RE.replace_all(s, "${1}[REDACTED]").into_owned()
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        s.char_indices()
            .take_while(|&(i, c)| i + c.len_utf8() <= max)
            .map(|(_, c)| c)
            .collect()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use super::*;

    /// Replays canned completions in order and records every prompt it saw.
    pub(crate) struct ScriptedProvider {
        replies: Mutex<VecDeque<anyhow::Result<String>>>,
        pub(crate) prompts: Mutex<Vec<String>>,
    }

    impl ScriptedProvider {
        pub(crate) fn new(replies: Vec<anyhow::Result<String>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                prompts: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn calls(&self) -> usize {
            self.prompts.lock().unwrap().len()
        }
    }

    #[async_trait::async_trait]
    impl Provider for ScriptedProvider {
        async fn generate(&self, req: &GenerateRequest) -> anyhow::Result<GenerateResponse> {
            self.prompts.lock().unwrap().push(req.prompt.clone());
            let reply = self
                .replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(anyhow::anyhow!("script exhausted")))?;
            Ok(GenerateResponse {
                content: reply,
                model: req.model.clone(),
                input_tokens: 10,
                output_tokens: 5,
                finish_reason: "stop".to_string(),
                provider: String::new(),
            })
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    fn request() -> GenerateRequest {
        GenerateRequest {
            model: "gpt-4.1-mini".to_string(),
            system: String::new(),
            prompt: "hello".to_string(),
            temperature: 0.0,
            max_tokens: 16,
            stage: "test".to_string(),
        }
    }

    #[tokio::test]
    async fn test_generate_tags_provider() {
        let provider = Arc::new(ScriptedProvider::new(vec![Ok("hi".to_string())]));
        let client = LlmClient::new(provider.clone(), "https://api.openai.com/v1");

        let resp = client.generate(&request()).await.unwrap();
        assert_eq!(resp.content, "hi");
        assert_eq!(resp.provider, "scripted");
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn test_generate_does_not_retry() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Err(anyhow::anyhow!("503 service unavailable")),
            Ok("never reached".to_string()),
        ]));
        let client = LlmClient::new(provider.clone(), "https://api.openai.com/v1");

        let err = client.generate(&request()).await.unwrap_err();
        assert!(err.to_string().contains("503"));
        assert_eq!(provider.calls(), 1);
    }

    #[test]
    fn test_server_endpoint() {
        assert_eq!(
            server_endpoint("https://api.openai.com/v1"),
            ("api.openai.com".to_string(), 443)
        );
        assert_eq!(
            server_endpoint("http://localhost:11434/v1"),
            ("localhost".to_string(), 11434)
        );
        assert_eq!(server_endpoint("not a url"), ("unknown".to_string(), 443));
    }

    #[test]
    fn test_classify_error_categories() {
        let cases = vec![
            ("rate limit exceeded", "rate_limit"),
            ("status 429: too many requests", "rate_limit"),
            ("context deadline exceeded: timeout", "timeout"),
            ("request timed out", "timeout"),
            ("401 unauthorized", "auth_error"),
            ("403 forbidden", "auth_error"),
            ("invalid api key", "auth_error"),
            ("400 bad request", "invalid_request"),
            ("invalid model name", "invalid_request"),
            ("500 internal server error", "server_error"),
            ("503 service unavailable", "server_error"),
            ("connection refused", "network_error"),
            ("dns resolution failed", "network_error"),
            ("something unexpected", "unknown_error"),
        ];

        for (msg, expected) in cases {
            let err = anyhow::anyhow!("{}", msg);
            assert_eq!(
                classify_error(&err),
                expected,
                "classify_error({msg:?}) should be {expected:?}"
            );
        }
    }

    #[test]
    fn test_redact_secrets_masks_logo_token() {
        let report = "# Company Logo\n![stripe.com logo](https://img.logo.dev/stripe.com?token=pk_live123)";
        let redacted = redact_secrets(report);
        assert_eq!(
            redacted,
            "# Company Logo\n![stripe.com logo](https://img.logo.dev/stripe.com?token=[REDACTED])"
        );
        assert!(!redacted.contains("pk_live123"));
    }

    #[test]
    fn test_redact_secrets_keeps_other_params() {
        assert_eq!(
            redact_secrets("https://a.dev/x?size=64&TOKEN=abc&format=png"),
            "https://a.dev/x?size=64&TOKEN=[REDACTED]&format=png"
        );
        assert_eq!(redact_secrets("no secrets here"), "no secrets here");
    }

    #[test]
    fn test_truncate_short() {
        assert_eq!(truncate("hello", 10), "hello");
    }

    #[test]
    fn test_truncate_long() {
        assert_eq!(truncate("hello world", 5), "hello");
    }

    #[test]
    fn test_truncate_multibyte_safe() {
        let result = truncate("hé世界!", 3);
        assert!(result.len() <= 3);
        assert_eq!(result, "hé");
    }
}
