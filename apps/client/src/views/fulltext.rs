//! Client for the optional full-text search service.

use std::sync::{Arc, PoisonError, RwLock};

use reqwest::{Client, RequestBuilder};
use tracing::debug;
use vocab_core::replication::{FulltextIndexDefinition, FulltextResponse};

use crate::error::{Result, StoreError};

#[derive(Clone)]
pub struct FulltextClient {
    client: Client,
    base_url: Option<String>,
    token: Arc<RwLock<Option<String>>>,
}

impl FulltextClient {
    /// A client for `base_url`; `None` means no service is configured.
    pub fn new(base_url: Option<&str>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url
                .map(|url| url.trim_end_matches('/').to_string())
                .filter(|url| !url.is_empty()),
            token: Arc::new(RwLock::new(None)),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.base_url.is_some()
    }

    pub fn set_token(&self, token: Option<String>) {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = token;
    }

    fn url(&self, index: &str) -> Result<String> {
        let base = self.base_url.as_deref().ok_or_else(|| {
            StoreError::ServiceUnavailable("no full-text service configured".into())
        })?;
        Ok(format!("{}/api/fulltext/{}", base, index))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        let token = self.token.read().unwrap_or_else(PoisonError::into_inner);
        match token.as_deref() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Create or replace the named index.
    pub async fn ensure_fulltext_index(
        &self,
        name: &str,
        definition: &FulltextIndexDefinition,
    ) -> Result<()> {
        let url = self.url(name)?;
        let resp = self
            .authorize(self.client.put(&url))
            .json(definition)
            .send()
            .await
            .map_err(unavailable)?;

        if !resp.status().is_success() {
            return Err(http_error(resp).await);
        }
        debug!(index = name, "full-text index ensured");
        Ok(())
    }

    /// Run `query` against the named index.
    pub async fn run_fulltext_query(
        &self,
        name: &str,
        query: &str,
        limit: usize,
    ) -> Result<FulltextResponse> {
        let url = self.url(name)?;
        let resp = self
            .authorize(self.client.get(&url))
            .query(&[("q", query.to_string()), ("limit", limit.to_string())])
            .send()
            .await
            .map_err(unavailable)?;

        if !resp.status().is_success() {
            return Err(http_error(resp).await);
        }
        resp.json()
            .await
            .map_err(|e| StoreError::Http(format!("invalid full-text response: {}", e)))
    }
}

fn unavailable(err: reqwest::Error) -> StoreError {
    if err.is_connect() || err.is_timeout() {
        StoreError::ServiceUnavailable(err.to_string())
    } else {
        StoreError::Http(err.to_string())
    }
}

async fn http_error(resp: reqwest::Response) -> StoreError {
    let status = resp.status();
    if status == reqwest::StatusCode::SERVICE_UNAVAILABLE {
        return StoreError::ServiceUnavailable(resp.text().await.unwrap_or_default());
    }
    StoreError::Http(format!(
        "{} - {}",
        status.as_u16(),
        resp.text().await.unwrap_or_default()
    ))
}
