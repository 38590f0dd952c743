// src/media/host.rs
//! Transport to the media host. Every call is bounded by a timeout and a fixed
//! number of attempts; failures come back as data, never as panics.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CACHE_CONTROL, PRAGMA};
use reqwest::Client;
use tracing::debug;

use crate::config::HttpCfg;
use crate::error::FetchError;

#[async_trait]
pub trait MediaTransport: Send + Sync {
    /// GET `url` as text. `bearer` adds an `Authorization: Bearer` header.
    async fn get_text(&self, url: &str, bearer: Option<&str>) -> Result<String, FetchError>;
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u8,
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn from_cfg(http: &HttpCfg) -> Self {
        Self {
            attempts: http.retry_attempts.max(1),
            backoff: Duration::from_millis(http.backoff_ms),
        }
    }

    /// Doubling delay before attempt `attempt + 1` (1-based).
    pub fn delay(&self, attempt: u8) -> Duration {
        let shift = u32::from(attempt.saturating_sub(1)).min(6);
        self.backoff * (1u32 << shift)
    }
}

pub struct HttpTransport {
    client: Client,
    retry: RetryPolicy,
}

impl HttpTransport {
    pub fn new(http: &HttpCfg) -> Result<Self> {
        // Listing pages sit behind an aggressive CDN.
        let mut headers = HeaderMap::new();
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));

        let client = Client::builder()
            .user_agent(http.user_agent.clone())
            .default_headers(headers)
            .connect_timeout(http.connect_timeout())
            .timeout(http.timeout())
            .build()
            .context("building media http client")?;
        Ok(Self {
            client,
            retry: RetryPolicy::from_cfg(http),
        })
    }

    async fn get_once(&self, url: &str, bearer: Option<&str>) -> Result<String, FetchError> {
        let mut req = self.client.get(url);
        if let Some(token) = bearer {
            req = req.bearer_auth(token);
        }
        let resp = req
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(url, &e))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        resp.text()
            .await
            .map_err(|e| FetchError::from_reqwest(url, &e))
    }
}

#[async_trait]
impl MediaTransport for HttpTransport {
    async fn get_text(&self, url: &str, bearer: Option<&str>) -> Result<String, FetchError> {
        let mut attempt: u8 = 0;
        loop {
            attempt += 1;
            match self.get_once(url, bearer).await {
                Ok(body) => return Ok(body),
                Err(e) if e.is_retryable() && attempt < self.retry.attempts => {
                    debug!(target: "media", %url, attempt, error = %e, "retrying");
                    tokio::time::sleep(self.retry.delay(attempt)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
