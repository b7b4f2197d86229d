use std::env;
use std::path::PathBuf;

use crate::error::{AppError, AppResult};

const REQUIRED_KEYS: [&str; 3] = ["OPENAI_API_KEY", "TAVILY_API_KEY", "LOGO_DEV_API_KEY"];

pub const DEFAULT_LOG_FILE: &str = "company_research.log";

pub const DEFAULT_EXCLUDED_DOMAINS: [&str; 8] = [
    "youtube.com",
    "facebook.com",
    "instagram.com",
    "tiktok.com",
    "twitter.com",
    "x.com",
    "reddit.com",
    "linkedin.com",
];

#[derive(Debug, Clone)]
pub struct Config {
    pub environment: String,
    pub openai_api_key: String,
    pub tavily_api_key: String,
    pub logo_dev_api_key: String,
    pub llm_model: String,
    pub llm_base_url: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub max_iterations: usize,
    pub logo_base_url: String,
    pub search_base_url: String,
    pub news_max_results: usize,
    pub news_exclude_domains: Vec<String>,
    pub log_file: PathBuf,
    pub otel_service_name: String,
    pub otel_exporter_endpoint: Option<String>,
    pub otel_exporter_token: Option<String>,
}

impl Config {
    pub fn from_env() -> AppResult<Self> {
        dotenvy::dotenv().ok();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds a config from any key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let missing: Vec<&str> = REQUIRED_KEYS
            .iter()
            .copied()
            .filter(|key| get(*key).is_none())
            .collect();
        if !missing.is_empty() {
            return Err(AppError::Config(format!(
                "Missing required API keys ({}). Please check your .env file.",
                missing.join(", ")
            )));
        }

        let required = |key: &str| get(key).unwrap_or_default();

        Ok(Self {
            environment: get("APP_ENVIRONMENT").unwrap_or_else(|| "development".to_string()),
            openai_api_key: required("OPENAI_API_KEY"),
            tavily_api_key: required("TAVILY_API_KEY"),
            logo_dev_api_key: required("LOGO_DEV_API_KEY"),
            llm_model: get("LLM_MODEL").unwrap_or_else(|| "gpt-4.1-mini".to_string()),
            llm_base_url: get("LLM_BASE_URL")
                .unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            temperature: parse_or(get("LLM_TEMPERATURE"), "LLM_TEMPERATURE", 0.0)?,
            max_tokens: parse_or(get("LLM_MAX_TOKENS"), "LLM_MAX_TOKENS", 1024)?,
            max_iterations: parse_or(get("AGENT_MAX_ITERATIONS"), "AGENT_MAX_ITERATIONS", 15)?,
            logo_base_url: get("LOGO_BASE_URL")
                .map(|v| v.trim_end_matches('/').to_string())
                .unwrap_or_else(|| "https://img.logo.dev".to_string()),
            search_base_url: get("SEARCH_BASE_URL")
                .map(|v| v.trim_end_matches('/').to_string())
                .unwrap_or_else(|| "https://api.tavily.com".to_string()),
            news_max_results: parse_or::<usize>(get("NEWS_MAX_RESULTS"), "NEWS_MAX_RESULTS", 5)?
                .clamp(1, 5),
            news_exclude_domains: get("NEWS_EXCLUDE_DOMAINS")
                .map(|v| parse_domain_list(&v))
                .unwrap_or_else(|| {
                    DEFAULT_EXCLUDED_DOMAINS
                        .iter()
                        .map(|d| d.to_string())
                        .collect()
                }),
            log_file: log_file_path(get("LOG_FILE")),
            otel_service_name: get("OTEL_SERVICE_NAME")
                .unwrap_or_else(|| "company-research".to_string()),
            otel_exporter_endpoint: get("OTEL_EXPORTER_OTLP_ENDPOINT"),
            otel_exporter_token: get("OTEL_EXPORTER_OTLP_TOKEN"),
        })
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// `LOG_FILE` as `from_env` would resolve it, for failures reported
    /// before a full config exists.
    pub fn log_file_from_env() -> PathBuf {
        log_file_path(env::var("LOG_FILE").ok().filter(|v| !v.trim().is_empty()))
    }
}

fn log_file_path(value: Option<String>) -> PathBuf {
    PathBuf::from(value.unwrap_or_else(|| DEFAULT_LOG_FILE.to_string()))
}

fn parse_or<T: std::str::FromStr>(value: Option<String>, key: &str, default: T) -> AppResult<T> {
    match value {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| AppError::Config(format!("{key} must be a number, got {raw:?}"))),
        None => Ok(default),
    }
}

fn parse_domain_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|d| d.trim().to_lowercase())
        .filter(|d| !d.is_empty())
        .collect()
}
