use std::sync::Arc;

use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::Tool;
use super::transport::Transport;
use crate::config::Config;

/// A search hit as the backend returned it. Fields outside the modelled ones
/// are carried through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_date: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// One entry of a news lookup: an article, or the single marker left when
/// the lookup itself failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NewsRecord {
    Error { error: String },
    Article(Article),
}

#[cfg(test)]
impl NewsRecord {
    pub fn is_error(&self) -> bool {
        matches!(self, NewsRecord::Error { .. })
    }
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<serde_json::Value>,
}

/// Recent-news search against a Tavily-compatible backend.
pub struct NewsLookup {
    transport: Arc<dyn Transport>,
    search_url: String,
    api_key: String,
    max_results: usize,
    exclude_domains: Vec<String>,
}

impl NewsLookup {
    pub fn new(config: &Config, transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            search_url: format!("{}/search", config.search_base_url),
            api_key: config.tavily_api_key.clone(),
            max_results: config.news_max_results,
            exclude_domains: config.news_exclude_domains.clone(),
        }
    }

    pub fn query_for(company: &str) -> String {
        format!("latest news about {}", company.trim())
    }

    fn request_body(&self, company: &str) -> serde_json::Value {
        json!({
            "query": Self::query_for(company),
            "search_depth": "advanced",
            "topic": "news",
            "max_results": self.max_results,
            "exclude_domains": self.exclude_domains,
            "include_answer": false,
        })
    }

    /// Never fails: an empty list means no news, a single error record means
    /// the search itself failed.
    #[tracing::instrument(name = "tool get_company_news", skip(self), fields(news.results))]
    pub async fn lookup(&self, company: &str) -> Vec<NewsRecord> {
        match self.search(company).await {
            Ok(articles) => {
                tracing::Span::current().record("news.results", articles.len());
                tracing::info!(company = %company, results = articles.len(), "News search finished");
                articles.into_iter().map(NewsRecord::Article).collect()
            }
            Err(e) => {
                tracing::warn!(company = %company, error = %e, "News search failed");
                vec![NewsRecord::Error {
                    error: format!("Error fetching news: {e}"),
                }]
            }
        }
    }

    async fn search(&self, company: &str) -> anyhow::Result<Vec<Article>> {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", self.api_key))
                .map_err(|e| anyhow::anyhow!("invalid search API key header: {e}"))?,
        );

        let response = self
            .transport
            .post_json(&self.search_url, headers, &self.request_body(company))
            .await?;

        if !response.is_success() {
            return Err(anyhow::anyhow!(
                "search backend returned {}: {}",
                response.status,
                response.body.trim()
            ));
        }

        let parsed: SearchResponse = serde_json::from_str(&response.body)
            .map_err(|e| anyhow::anyhow!("malformed search response: {e}"))?;

        let before = parsed.results.len();
        let articles: Vec<Article> = parsed
            .results
            .into_iter()
            .filter_map(|raw| match serde_json::from_value::<Article>(raw) {
                Ok(article) => Some(article),
                Err(e) => {
                    tracing::debug!(error = %e, "Skipping unreadable search result");
                    None
                }
            })
            .filter(|a| !is_excluded(&a.url, &self.exclude_domains))
            .take(self.max_results)
            .collect();

        if articles.len() < before {
            tracing::debug!(
                dropped = before - articles.len(),
                "Dropped unreadable, excluded or surplus search results"
            );
        }

        Ok(articles)
    }
}

#[async_trait::async_trait]
impl Tool for NewsLookup {
    fn name(&self) -> &str {
        "get_company_news"
    }

    fn description(&self) -> &str {
        "Get recent news articles about the company. Input is the company name."
    }

    async fn call(&self, input: &str) -> String {
        let records = self.lookup(input.trim().trim_matches(['"', '\''])).await;
        serde_json::to_string(&records).unwrap_or_else(|e| format!("Error fetching news: {e}"))
    }
}

/// True when the URL's host is an excluded domain or one of its subdomains.
pub fn is_excluded(article_url: &str, exclude_domains: &[String]) -> bool {
    let Ok(parsed) = url::Url::parse(article_url) else {
        return false;
    };
    let Some(host) = parsed.host_str() else {
        return false;
    };
    let host = host.to_ascii_lowercase();

    exclude_domains.iter().any(|domain| {
        let domain = domain.trim_start_matches("www.");
        host == domain || host.ends_with(&format!(".{domain}"))
    })
}
