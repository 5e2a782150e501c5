//! Report persistence + HTTP dispatch utilities for netoffer.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use netoffer_core::OffersRequest;
use reqwest::StatusCode;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Semaphore;
use tracing::{info_span, warn, Instrument};
use uuid::Uuid;

pub const CRATE_NAME: &str = "netoffer-storage";

pub const DEFAULT_ENDPOINT: &str = "https://gendevserver-production.up.railway.app/api/all/offers";

#[derive(Debug, Clone)]
pub struct StoredReport {
    pub content_hash: String,
    pub path: PathBuf,
    pub byte_size: usize,
}

/// Writes rendered reports into a single directory.
#[derive(Debug, Clone)]
pub struct ReportStore {
    root: PathBuf,
}

impl ReportStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The user's downloads directory, falling back to home, then the working directory.
    pub fn default_root() -> PathBuf {
        dirs::download_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn sha256_hex(bytes: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        hex::encode(hasher.finalize())
    }

    /// Store a report under `file_name` using a temp file and an atomic rename.
    ///
    /// An existing report with the same name is replaced.
    pub async fn save(&self, file_name: &str, content: &[u8]) -> anyhow::Result<StoredReport> {
        validate_file_name(file_name)?;
        fs::create_dir_all(&self.root)
            .await
            .with_context(|| format!("creating report directory {}", self.root.display()))?;

        let path = self.root.join(file_name);
        let temp_path = self
            .root
            .join(format!(".{}.{}.tmp", Uuid::new_v4(), content.len()));

        let mut file = fs::OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&temp_path)
            .await
            .with_context(|| format!("opening temp report file {}", temp_path.display()))?;
        file.write_all(content)
            .await
            .with_context(|| format!("writing temp report file {}", temp_path.display()))?;
        file.flush()
            .await
            .with_context(|| format!("flushing temp report file {}", temp_path.display()))?;
        drop(file);

        if let Err(err) = fs::rename(&temp_path, &path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(err).with_context(|| {
                format!(
                    "atomically renaming temp report {} -> {}",
                    temp_path.display(),
                    path.display()
                )
            });
        }

        Ok(StoredReport {
            content_hash: Self::sha256_hex(content),
            path,
            byte_size: content.len(),
        })
    }
}

fn validate_file_name(file_name: &str) -> anyhow::Result<()> {
    if file_name.is_empty()
        || file_name == "."
        || file_name == ".."
        || file_name.contains(['/', '\\'])
        || file_name.chars().any(char::is_control)
    {
        bail!("refusing to store report under unsafe file name {file_name:?}");
    }
    Ok(())
}

/// Retry schedule for the aggregation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: usize,
    pub first_delay: Duration,
    pub delay_cap: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            first_delay: Duration::from_millis(500),
            delay_cap: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Pause before retry number `retry` (zero-based): doubles each time, never above `delay_cap`.
    pub fn wait_before(&self, retry: usize) -> Duration {
        let shift = u32::try_from(retry).unwrap_or(u32::MAX).min(31);
        self.first_delay.saturating_mul(1 << shift).min(self.delay_cap)
    }
}

/// Throttling, server errors and timeouts/connection failures may succeed on a later attempt.
fn worth_retrying(failure: &FetchError) -> bool {
    match failure {
        FetchError::HttpStatus { status, .. } => *status == 429 || (500..600).contains(status),
        FetchError::Request(err) => err.is_timeout() || err.is_connect(),
        FetchError::LimiterClosed => false,
    }
}

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub endpoint: String,
    /// Whole-request timeout. The aggregation endpoint fans out to slow providers.
    pub timeout: Duration,
    pub connect_timeout: Duration,
    pub user_agent: Option<String>,
    pub max_in_flight: usize,
    pub retry: RetryPolicy,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            timeout: Duration::from_secs(600),
            connect_timeout: Duration::from_secs(30),
            user_agent: None,
            max_in_flight: 4,
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FetchedResponse {
    pub status: StatusCode,
    pub final_url: String,
    pub body: Vec<u8>,
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed after retries: {0}")]
    Request(#[from] reqwest::Error),
    #[error("http status {status} for {url}")]
    HttpStatus { status: u16, url: String },
    #[error("request limiter closed")]
    LimiterClosed,
}

/// Client for the offer aggregation endpoint. Construct one and pass it to whoever dispatches searches.
#[derive(Debug)]
pub struct OffersClient {
    client: reqwest::Client,
    endpoint: String,
    in_flight: Arc<Semaphore>,
    retry: RetryPolicy,
}

impl OffersClient {
    pub fn new(config: HttpClientConfig) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout);

        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }

        let client = builder.build().context("building reqwest client")?;

        Ok(Self {
            client,
            endpoint: config.endpoint,
            in_flight: Arc::new(Semaphore::new(config.max_in_flight.max(1))),
            retry: config.retry,
        })
    }

    /// POST the search request and return the raw response body.
    pub async fn fetch_offers(
        &self,
        search_id: Uuid,
        request: &OffersRequest,
    ) -> Result<FetchedResponse, FetchError> {
        let _permit = self
            .in_flight
            .acquire()
            .await
            .map_err(|_| FetchError::LimiterClosed)?;

        let span = info_span!("offers_fetch", %search_id, endpoint = %self.endpoint);
        self.post_with_retries(request).instrument(span).await
    }

    async fn post_with_retries(&self, request: &OffersRequest) -> Result<FetchedResponse, FetchError> {
        let mut retry = 0;
        loop {
            let failure = match self.post_once(request).await {
                Ok(response) => return Ok(response),
                Err(failure) => failure,
            };
            if retry >= self.retry.max_retries || !worth_retrying(&failure) {
                return Err(failure);
            }
            warn!(error = %failure, retry, "aggregation request failed, retrying");
            tokio::time::sleep(self.retry.wait_before(retry)).await;
            retry += 1;
        }
    }

    async fn post_once(&self, request: &OffersRequest) -> Result<FetchedResponse, FetchError> {
        let response = self.client.post(&self.endpoint).json(request).send().await?;
        let status = response.status();
        let final_url = response.url().to_string();
        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                status: status.as_u16(),
                url: final_url,
            });
        }
        let body = response.bytes().await?.to_vec();
        Ok(FetchedResponse {
            status,
            final_url,
            body,
        })
    }
}
