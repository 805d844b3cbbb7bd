//! HTTP plumbing and the structured-database collaborator for reelsync.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use async_trait::async_trait;
use reelsync_core::{AvailableFields, DataSourceId, FieldValues, LiveFieldSet, SchemaChange, TargetRecord};
use reqwest::RequestBuilder;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug_span, Instrument};

pub mod notion;

pub use notion::{database_id_from_url, NotionConfig, NotionStore};
pub use reqwest::Method;

pub const CRATE_NAME: &str = "reelsync-storage";

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub timeout: Duration,
    pub user_agent: Option<String>,
    pub token_bucket: Option<TokenBucketConfig>,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(20),
            user_agent: None,
            token_bucket: None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TokenBucketConfig {
    pub capacity: u32,
    pub refill_every: Duration,
}

#[derive(Debug)]
pub struct SimpleTokenBucket {
    capacity: u32,
    refill_every: Duration,
    state: Mutex<TokenBucketState>,
}

#[derive(Debug, Clone, Copy)]
struct TokenBucketState {
    tokens: u32,
    last_refill: Instant,
}

impl SimpleTokenBucket {
    pub fn new(capacity: u32, refill_every: Duration) -> Self {
        Self {
            capacity,
            refill_every,
            state: Mutex::new(TokenBucketState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    pub async fn take(&self) {
        loop {
            let mut state = self.state.lock().await;
            let elapsed = state.last_refill.elapsed();
            if elapsed >= self.refill_every && self.refill_every.as_millis() > 0 {
                let refills = (elapsed.as_millis() / self.refill_every.as_millis()) as u32;
                state.tokens = (state.tokens.saturating_add(refills)).min(self.capacity);
                state.last_refill = Instant::now();
            }

            if state.tokens > 0 {
                state.tokens -= 1;
                return;
            }

            let sleep_for = self.refill_every;
            drop(state);
            tokio::time::sleep(sleep_for).await;
        }
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("http status {status} for {url}: {body}")]
    HttpStatus {
        status: u16,
        url: String,
        body: String,
    },
    #[error("invalid json from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

impl FetchError {
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::HttpStatus { status, .. } => Some(*status),
            Self::Request(err) => err.status().map(|s| s.as_u16()),
            Self::Decode { .. } => None,
        }
    }
}

/// Thin JSON-over-HTTP client: one attempt per call, optional request pacing.
#[derive(Debug)]
pub struct HttpFetcher {
    client: reqwest::Client,
    token_bucket: Option<Arc<SimpleTokenBucket>>,
}

impl HttpFetcher {
    pub fn new(config: HttpClientConfig) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(config.timeout);

        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }

        let client = builder.build().context("building reqwest client")?;
        let token_bucket = config
            .token_bucket
            .map(|c| Arc::new(SimpleTokenBucket::new(c.capacity, c.refill_every)));

        Ok(Self {
            client,
            token_bucket,
        })
    }

    pub fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.client.request(method, url)
    }

    /// Send a prepared request and decode the body as JSON. Non-2xx statuses are errors.
    pub async fn send_json(&self, request: RequestBuilder) -> Result<JsonValue, FetchError> {
        if let Some(bucket) = &self.token_bucket {
            bucket.take().await;
        }

        let request = request.build()?;
        let span = debug_span!(
            "http_request",
            method = %request.method(),
            url = %redact_query(request.url().as_str())
        );

        async move {
            let resp = self.client.execute(request).await?;
            let status = resp.status();
            let final_url = redact_query(resp.url().as_str());
            let text = resp.text().await?;
            tracing::debug!(status = status.as_u16(), bytes = text.len(), "http response");

            if !status.is_success() {
                return Err(FetchError::HttpStatus {
                    status: status.as_u16(),
                    url: final_url,
                    body: truncate_body(&text),
                });
            }

            serde_json::from_str(&text).map_err(|source| FetchError::Decode {
                url: final_url,
                source,
            })
        }
        .instrument(span)
        .await
    }
}

/// Query strings can carry api keys; keep them out of logs and errors.
fn redact_query(url: &str) -> String {
    match url.split_once('?') {
        Some((base, _)) => format!("{base}?…"),
        None => url.to_string(),
    }
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 300;
    if body.chars().count() <= MAX {
        body.to_string()
    } else {
        let mut out: String = body.chars().take(MAX).collect();
        out.push('…');
        out
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database transport error: {0}")]
    Transport(#[from] FetchError),
    #[error("unexpected database payload: {0}")]
    Payload(String),
}

/// Field and record operations against the structured database.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn read_fields(&self, location: &DataSourceId) -> Result<LiveFieldSet, StoreError>;

    async fn write_fields(
        &self,
        location: &DataSourceId,
        changes: &[SchemaChange],
    ) -> Result<(), StoreError>;

    /// Records with a title or url that still miss synced data (and, when tracked, an empty status).
    async fn query_candidates(
        &self,
        location: &DataSourceId,
        available: &AvailableFields,
    ) -> Result<Vec<TargetRecord>, StoreError>;

    async fn write_record(&self, record_id: &str, values: &FieldValues) -> Result<(), StoreError>;
}
