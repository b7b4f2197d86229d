use std::process::ExitCode;

use opentelemetry::trace::TraceContextExt;
use thiserror::Error;
use tracing::Span;
use tracing_opentelemetry::OpenTelemetrySpanExt;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Telemetry error: {0}")]
    Telemetry(String),

    #[error("Research failed: {0}")]
    Research(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub(crate) fn get_trace_id() -> Option<String> {
    let span = Span::current();
    let context = span.context();
    let span_ref = context.span();
    let span_context = span_ref.span_context();

    if span_context.is_valid() {
        Some(span_context.trace_id().to_string())
    } else {
        None
    }
}

impl AppError {
    /// Logs the failure and maps it to the process exit status.
    pub fn report(&self) -> ExitCode {
        match self {
            AppError::Config(msg) => tracing::error!(error = %msg, "Configuration error"),
            AppError::Telemetry(msg) => tracing::error!(error = %msg, "Telemetry error"),
            AppError::Research(msg) => tracing::error!(
                error = %msg,
                trace_id = get_trace_id().unwrap_or_default(),
                "Research failed"
            ),
            AppError::Internal(msg) => tracing::error!(error = %msg, "Internal error"),
        }

        eprintln!("Error: {self}");
        ExitCode::from(self.exit_code())
    }

    pub fn exit_code(&self) -> u8 {
        1
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error() {
        let error = AppError::Config("OPENAI_API_KEY missing".to_string());
        assert_eq!(
            error.to_string(),
            "Configuration error: OPENAI_API_KEY missing"
        );
    }

    #[test]
    fn test_telemetry_error() {
        let error = AppError::Telemetry("exporter rejected endpoint".to_string());
        assert_eq!(error.to_string(), "Telemetry error: exporter rejected endpoint");
    }

    #[test]
    fn test_internal_error() {
        let error = AppError::Internal("stdin closed".to_string());
        assert_eq!(error.to_string(), "Internal error: stdin closed");
    }

    #[test]
    fn test_research_error() {
        let error = AppError::Research("Something went wrong: boom".to_string());
        assert_eq!(error.to_string(), "Research failed: Something went wrong: boom");
    }

    #[test]
    fn test_every_error_exits_with_one() {
        let errors = vec![
            AppError::Config("test".to_string()),
            AppError::Telemetry("test".to_string()),
            AppError::Research("test".to_string()),
            AppError::Internal("test".to_string()),
        ];

        for error in errors {
            assert_eq!(error.exit_code(), 1, "{error} should exit with 1");
        }
    }

    #[test]
    fn test_trace_id_absent_without_otel_span() {
        assert_eq!(get_trace_id(), None);
    }

    #[test]
    fn test_app_result_err() {
        fn returns_err() -> AppResult<i32> {
            Err(AppError::Config("test".to_string()))
        }
        let result = returns_err();
        assert!(result.is_err());
    }
}
