use std::sync::Arc;

use reqwest::header::{ACCEPT, HeaderMap, HeaderValue, USER_AGENT};

use super::Tool;
use super::transport::Transport;
use crate::config::Config;

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// Resolves a company domain to a markdown image of its logo.
pub struct LogoLookup {
    transport: Arc<dyn Transport>,
    base_url: String,
    token: String,
}

impl LogoLookup {
    pub fn new(config: &Config, transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            base_url: config.logo_base_url.clone(),
            token: config.logo_dev_api_key.clone(),
        }
    }

    pub fn logo_url(&self, domain: &str) -> String {
        format!("{}/{}?token={}", self.base_url, domain, self.token)
    }

    /// Never fails: not-found and transport errors come back as text.
    #[tracing::instrument(name = "tool get_company_logo", skip(self), fields(logo.domain, logo.status))]
    pub async fn lookup(&self, domain: &str) -> String {
        let domain = normalize_domain(domain);
        let span = tracing::Span::current();
        span.record("logo.domain", domain.as_str());

        if domain.is_empty() {
            tracing::warn!("Logo lookup called without a domain");
            return "Error fetching logo: empty domain".to_string();
        }

        let logo_url = self.logo_url(&domain);
        match self.probe(&logo_url).await {
            Ok(200) => {
                span.record("logo.status", 200);
                tracing::info!(domain = %domain, "Logo found");
                format!("![{domain} logo]({logo_url})")
            }
            Ok(status) => {
                span.record("logo.status", status);
                tracing::info!(domain = %domain, status, "Logo not found");
                format!("Logo not found for {logo_url} response: {status}")
            }
            Err(e) => {
                tracing::warn!(domain = %domain, error = %e, "Logo request failed");
                format!("Error fetching logo: {e}")
            }
        }
    }

    /// HEAD first; a full GET only when HEAD does not answer 200.
    async fn probe(&self, logo_url: &str) -> anyhow::Result<u16> {
        let head = self.transport.head(logo_url, request_headers()).await?;
        if head.status == 200 {
            return Ok(head.status);
        }

        tracing::debug!(status = head.status, "HEAD did not return 200, retrying with GET");
        let get = self.transport.get(logo_url, request_headers()).await?;
        Ok(get.status)
    }
}

#[async_trait::async_trait]
impl Tool for LogoLookup {
    fn name(&self) -> &str {
        "get_company_logo"
    }

    fn description(&self) -> &str {
        "Get company logo from LogoDev. Input must be a company domain (e.g. 'google.com' or \
         'https://google.com'). The domain should be the company's website address, not just \
         the company name."
    }

    async fn call(&self, input: &str) -> String {
        self.lookup(input).await
    }
}

fn request_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("image/*"));
    headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
    headers
}

/// Strips surrounding quotes, the scheme, a leading `www.` and anything after
/// the host. Prefixes match case-insensitively; the host keeps its casing.
pub fn normalize_domain(raw: &str) -> String {
    let trimmed = raw.trim().trim_matches(|c| c == '"' || c == '\'' || c == '`');

    let without_scheme = ["https://", "http://"]
        .iter()
        .find_map(|scheme| strip_prefix_ignore_case(trimmed, scheme))
        .unwrap_or(trimmed);
    let without_www = strip_prefix_ignore_case(without_scheme, "www.").unwrap_or(without_scheme);

    without_www
        .split(['/', '?', '#'])
        .next()
        .unwrap_or_default()
        .trim()
        .to_string()
}

fn strip_prefix_ignore_case<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    let head = s.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix).then(|| &s[prefix.len()..])
}
