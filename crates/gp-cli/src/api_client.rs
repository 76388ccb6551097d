//! HTTP client for remote commands against a running server.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use uuid::Uuid;

/// Minimal API client for the CLI's remote subcommands.
pub struct ApiClient {
    base_url: String,
    token: Option<String>,
    client: reqwest::Client,
}

/// A queue token as returned by the API.
#[derive(Debug, Deserialize)]
pub struct QueueTokenDto {
    pub id: Uuid,
    pub number: i64,
    pub kind: String,
    pub status: String,
    pub created_at: String,
}

/// A contractor as returned by the API.
#[derive(Debug, Deserialize)]
pub struct ContractorDto {
    pub id: Uuid,
    pub full_name: String,
    pub passport_number: String,
    pub is_archived: bool,
}

/// Pagination envelope.
#[derive(Debug, Deserialize)]
pub struct PagedDto<T> {
    pub data: Vec<T>,
    pub pagination: PageInfoDto,
}

#[derive(Debug, Deserialize)]
pub struct PageInfoDto {
    pub page: u32,
    pub total_items: u64,
    pub total_pages: u32,
}

impl ApiClient {
    /// Creates a client. The token comes from `--token` or
    /// `GATEPASS_TOKEN`.
    pub fn new(base_url: &str, token: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(15))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.or_else(|| std::env::var("GATEPASS_TOKEN").ok()),
            client,
        })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut builder = self
            .client
            .request(method, format!("{}{}", self.base_url, path));
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token);
        }
        builder
    }

    async fn check<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("Server returned {status}: {body}");
        }
        response.json().await.context("Failed to parse response")
    }

    /// Lists queue tokens, optionally filtered by status.
    pub async fn list_queue_tokens(&self, status: Option<&str>) -> Result<Vec<QueueTokenDto>> {
        let mut path = "/api/v1/queue/tokens".to_string();
        if let Some(status) = status {
            path.push_str(&format!("?status={status}"));
        }

        let response = self
            .request(reqwest::Method::GET, &path)
            .send()
            .await
            .context("Request failed")?;
        Self::check(response).await
    }

    /// Closes a queue token.
    pub async fn close_queue_token(&self, id: Uuid) -> Result<QueueTokenDto> {
        let response = self
            .request(
                reqwest::Method::POST,
                &format!("/api/v1/queue/tokens/{id}/close"),
            )
            .send()
            .await
            .context("Request failed")?;
        Self::check(response).await
    }

    /// Lists contractors with an optional search term.
    pub async fn list_contractors(
        &self,
        search: Option<&str>,
        per_page: u32,
    ) -> Result<PagedDto<ContractorDto>> {
        let mut path = format!("/api/v1/contractors?per_page={per_page}");
        if let Some(search) = search {
            path.push_str(&format!("&search={search}"));
        }

        let response = self
            .request(reqwest::Method::GET, &path)
            .send()
            .await
            .context("Request failed")?;
        Self::check(response).await
    }
}
