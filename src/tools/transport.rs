//! Outbound HTTP seam shared by the lookup tools.
//!
//! Tools talk to `Transport` rather than to `reqwest` directly so their
//! request sequencing and error shaping can be exercised without a network.

use reqwest::header::HeaderMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    async fn head(&self, url: &str, headers: HeaderMap) -> anyhow::Result<HttpResponse>;
    async fn get(&self, url: &str, headers: HeaderMap) -> anyhow::Result<HttpResponse>;
    async fn post_json(
        &self,
        url: &str,
        headers: HeaderMap,
        body: &serde_json::Value,
    ) -> anyhow::Result<HttpResponse>;
}

/// `reqwest`-backed transport. Redirects are followed with the client defaults.
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    async fn into_response(response: reqwest::Response) -> anyhow::Result<HttpResponse> {
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok(HttpResponse { status, body })
    }
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Transport for ReqwestTransport {
    async fn head(&self, url: &str, headers: HeaderMap) -> anyhow::Result<HttpResponse> {
        let response = self.client.head(url).headers(headers).send().await?;
        Ok(HttpResponse {
            status: response.status().as_u16(),
            body: String::new(),
        })
    }

    async fn get(&self, url: &str, headers: HeaderMap) -> anyhow::Result<HttpResponse> {
        let response = self.client.get(url).headers(headers).send().await?;
        // image bodies are not needed, only the status
        Ok(HttpResponse {
            status: response.status().as_u16(),
            body: String::new(),
        })
    }

    async fn post_json(
        &self,
        url: &str,
        headers: HeaderMap,
        body: &serde_json::Value,
    ) -> anyhow::Result<HttpResponse> {
        let response = self
            .client
            .post(url)
            .headers(headers)
            .json(body)
            .send()
            .await?;
        Self::into_response(response).await
    }
}
