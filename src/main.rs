use std::io::{self, BufRead, Write};
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;

mod agent;
mod config;
mod error;
mod llm;
mod pipeline;
mod telemetry;
mod tools;

use agent::ReactAgent;
use config::Config;
use error::{AppError, AppResult};
use llm::{LlmClient, openai::OpenAIProvider};
use pipeline::CompanyResearcher;
use telemetry::{init_telemetry, startup_subscriber};
use tools::{ReqwestTransport, ToolRegistry, Transport};

/// Research a company with an LLM agent and print a markdown report.
#[derive(Parser, Debug)]
#[command(name = "company-research", version, about = "Company Research Tool")]
struct Args {
    /// Company name or domain (e.g., stripe.com)
    #[arg(long, env = "COMPANY", default_value = "globant")]
    company: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => return report_before_telemetry(&e, &Config::log_file_from_env()),
    };

    let telemetry_guard = match init_telemetry(&config) {
        Ok(guard) => guard,
        Err(e) => {
            return report_before_telemetry(&AppError::Telemetry(e.to_string()), &config.log_file);
        }
    };

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = %config.environment,
        model = %config.llm_model,
        "Starting company-research"
    );

    let code = match run(&config, args).await {
        Ok(()) => {
            tracing::info!("Research completed");
            ExitCode::SUCCESS
        }
        Err(e) => e.report(),
    };

    telemetry_guard.shutdown();
    code
}

async fn run(config: &Config, args: Args) -> AppResult<()> {
    let company = resolve_company(args.company, &mut io::stdin().lock(), &mut io::stdout())?;

    let transport: Arc<dyn Transport> = Arc::new(ReqwestTransport::new());
    let provider = Arc::new(OpenAIProvider::new(
        &config.openai_api_key,
        &config.llm_base_url,
    ));
    let llm_client = Arc::new(LlmClient::new(provider, &config.llm_base_url));

    tracing::info!(
        provider = llm_client.provider_name(),
        max_iterations = config.max_iterations,
        "LLM client initialized"
    );

    let researcher = CompanyResearcher::new(
        Arc::new(ReactAgent::new(llm_client, config)),
        ToolRegistry::company_research(config, transport),
    );

    println!("\nResearching {company}...");
    let (company, report) = researcher.research_company(&company).await.into_report()?;

    println!("Company: {company}");
    println!("{report}");
    Ok(())
}

/// Reports through a file-only subscriber so startup failures still reach the
/// log file.
fn report_before_telemetry(error: &AppError, log_file: &Path) -> ExitCode {
    match startup_subscriber(log_file) {
        Some(subscriber) => tracing::subscriber::with_default(subscriber, || error.report()),
        None => error.report(),
    }
}

/// Uses the flag value, or asks on the terminal when it is blank.
fn resolve_company(
    flag: String,
    input: &mut impl BufRead,
    prompt: &mut impl Write,
) -> AppResult<String> {
    let company = flag.trim();
    if !company.is_empty() {
        return Ok(company.to_string());
    }

    write!(prompt, "Enter company name or domain (e.g., stripe.com): ")
        .and_then(|_| prompt.flush())
        .map_err(|e| AppError::Internal(format!("failed to write prompt: {e}")))?;

    let mut line = String::new();
    input
        .read_line(&mut line)
        .map_err(|e| AppError::Internal(format!("failed to read company: {e}")))?;

    let company = line.trim();
    if company.is_empty() {
        return Err(AppError::Config("a company name or domain is required".into()));
    }
    Ok(company.to_string())
}
