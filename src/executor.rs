//! Request executor with bounded timeouts and transient-failure retries.
//!
//! One call to [`RequestExecutor::get`] walks `Idle → Running → {Success, Retrying, Failed}`.
//! Any HTTP response other than a transient gateway status is a transport success, so
//! assertion failures are never retried here.

use bytes::Bytes;
use reqwest::StatusCode;
use reqwest::header::{CONTENT_TYPE, HeaderMap};
use std::error::Error as _;
use std::io::{Cursor, ErrorKind};
use std::time::{Duration, Instant};
use thiserror::Error;
use url::Url;

use crate::config::{BasicAuth, Config, RetryConfig};
use crate::error::ProbeResult;

const USER_AGENT: &str = concat!("spatialprobe/", env!("CARGO_PKG_VERSION"));

/// Why a single attempt failed at the transport level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    /// The exchange did not complete within the timeout.
    Timeout,
    /// Connection reset or aborted mid-exchange.
    Aborted,
    /// Gateway status (502, 503, 504).
    Unavailable(u16),
    /// Connection refused, DNS failure and similar.
    Connect,
    Other,
}

impl FailureKind {
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            FailureKind::Timeout | FailureKind::Aborted | FailureKind::Unavailable(_)
        )
    }
}

fn default_is_transient(kind: &FailureKind) -> bool {
    kind.is_transient()
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub timeout: Duration,
    pub is_transient: fn(&FailureKind) -> bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            retry_delay: Duration::from_millis(config.retry_delay_ms),
            timeout: Duration::from_millis(config.timeout_ms),
            is_transient: default_is_transient,
        }
    }

    /// Whether another attempt is allowed after `attempts` have failed with `kind`.
    pub fn should_retry(&self, kind: &FailureKind, attempts: u32) -> bool {
        (self.is_transient)(kind) && attempts <= self.max_retries
    }
}

/// A completed HTTP exchange.
#[derive(Debug, Clone)]
pub struct Exchange {
    pub url: Url,
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub attempts: u32,
    pub elapsed: Duration,
}

impl Exchange {
    pub fn content_type(&self) -> Option<&str> {
        self.headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok())
    }

    /// Case-insensitive prefix match on the Content-Type header.
    pub fn has_content_type(&self, prefix: &str) -> bool {
        self.content_type()
            .map(|ct| ct.to_ascii_lowercase().starts_with(&prefix.to_ascii_lowercase()))
            .unwrap_or(false)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).to_string()
    }

    pub fn json(&self) -> Option<serde_json::Value> {
        serde_json::from_slice(&self.body).ok()
    }

    /// Pixel size of an image body, read from its header only.
    pub fn image_dimensions(&self) -> Option<(u32, u32)> {
        image::ImageReader::new(Cursor::new(self.body.as_ref()))
            .with_guessed_format()
            .ok()?
            .into_dimensions()
            .ok()
    }

    pub fn image(&self) -> Option<image::DynamicImage> {
        image::load_from_memory(&self.body).ok()
    }
}

/// Transport-level failure after retries were exhausted or a fatal error occurred.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct TransportFailure {
    pub kind: FailureKind,
    pub message: String,
    pub url: Url,
    pub attempts: u32,
    pub elapsed: Duration,
}

struct RawResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

pub struct RequestExecutor {
    client: reqwest::Client,
    policy: RetryPolicy,
    auth: Option<BasicAuth>,
}

impl RequestExecutor {
    pub fn new(config: &Config) -> ProbeResult<Self> {
        Self::with_policy(RetryPolicy::from_config(&config.retry), config.auth.clone())
    }

    pub fn with_policy(policy: RetryPolicy, auth: Option<BasicAuth>) -> ProbeResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(policy.timeout)
            .build()?;

        Ok(Self {
            client,
            policy,
            auth,
        })
    }

    /// Issue a GET, retrying transient failures with the same URL.
    pub async fn get(&self, url: &Url) -> Result<Exchange, TransportFailure> {
        let started = Instant::now();
        let mut attempts = 0;

        loop {
            attempts += 1;
            tracing::debug!(url = %url, attempt = attempts, "Issuing request");

            let failure = match self.attempt(url).await {
                Ok(raw) => {
                    let code = raw.status.as_u16();
                    let gateway = FailureKind::Unavailable(code);
                    if matches!(code, 502..=504) && (self.policy.is_transient)(&gateway) {
                        (gateway, format!("HTTP {} from {}", raw.status, url))
                    } else {
                        return Ok(Exchange {
                            url: url.clone(),
                            status: raw.status,
                            headers: raw.headers,
                            body: raw.body,
                            attempts,
                            elapsed: started.elapsed(),
                        });
                    }
                }
                Err(failure) => failure,
            };

            let (kind, message) = failure;
            if self.policy.should_retry(&kind, attempts) {
                tracing::warn!(
                    url = %url,
                    attempt = attempts,
                    delay_ms = self.policy.retry_delay.as_millis() as u64,
                    error = %message,
                    "Transient failure, retrying"
                );
                tokio::time::sleep(self.policy.retry_delay).await;
                continue;
            }

            let message = if (self.policy.is_transient)(&kind) {
                format!("{} (gave up after {} attempts)", message, attempts)
            } else {
                message
            };
            tracing::debug!(url = %url, attempts, error = %message, "Request failed");

            return Err(TransportFailure {
                kind,
                message,
                url: url.clone(),
                attempts,
                elapsed: started.elapsed(),
            });
        }
    }

    async fn attempt(&self, url: &Url) -> Result<RawResponse, (FailureKind, String)> {
        let mut request = self.client.get(url.clone());
        if let Some(auth) = &self.auth {
            request = request.basic_auth(&auth.username, auth.password.as_deref());
        }

        let exchange = async {
            let response = request.send().await?;
            let status = response.status();
            let headers = response.headers().clone();
            let body = response.bytes().await?;
            Ok::<_, reqwest::Error>(RawResponse {
                status,
                headers,
                body,
            })
        };

        match tokio::time::timeout(self.policy.timeout, exchange).await {
            Ok(Ok(raw)) => Ok(raw),
            Ok(Err(e)) => Err((classify(&e), format!("Request to {} failed: {}", url, e))),
            Err(_) => Err((
                FailureKind::Timeout,
                format!(
                    "Request to {} timed out after {} ms",
                    url,
                    self.policy.timeout.as_millis()
                ),
            )),
        }
    }
}

fn io_error_kind(e: &reqwest::Error) -> Option<ErrorKind> {
    let mut source = e.source();
    while let Some(err) = source {
        if let Some(io) = err.downcast_ref::<std::io::Error>() {
            return Some(io.kind());
        }
        source = err.source();
    }
    None
}

/// Classify a reqwest error into a failure kind.
pub fn classify(e: &reqwest::Error) -> FailureKind {
    if e.is_timeout() {
        return FailureKind::Timeout;
    }
    if let Some(
        ErrorKind::ConnectionReset
        | ErrorKind::ConnectionAborted
        | ErrorKind::BrokenPipe
        | ErrorKind::UnexpectedEof,
    ) = io_error_kind(e)
    {
        return FailureKind::Aborted;
    }
    if e.is_connect() {
        return FailureKind::Connect;
    }
    if e.is_body() || e.is_decode() {
        return FailureKind::Aborted;
    }
    let mut source = e.source();
    while let Some(err) = source {
        if err.to_string().contains("connection closed") {
            return FailureKind::Aborted;
        }
        source = err.source();
    }
    FailureKind::Other
}
