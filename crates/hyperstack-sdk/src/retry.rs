//! Retrying HTTP transport with exponential backoff and method-aware deadlines.
//!
//! Transient failures (network errors and a configurable set of status codes)
//! are retried with jittered exponential backoff. Every call is bounded by a
//! deadline derived from the HTTP method: short for reads, longer for writes.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use reqwest::{Method, Request, Response, StatusCode};
use thiserror::Error;
use tokio::time::{sleep_until, timeout_at, Instant};
use tracing::{debug, warn};

/// Failure reported by the underlying transport before a response was read.
///
/// Boxed so tests can inject failures without having to manufacture a
/// `reqwest::Error`.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct TransportError(Box<dyn std::error::Error + Send + Sync>);

impl TransportError {
    pub fn new<E>(source: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self(source.into())
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        Self(Box::new(err))
    }
}

#[derive(Debug, Error)]
pub enum HttpClientError {
    /// The method-aware deadline elapsed, either before an attempt could be
    /// issued or while one was in flight.
    #[error("request deadline exceeded")]
    DeadlineExceeded,
    /// The request body cannot be replayed, so the call cannot be retried.
    #[error("request body cannot be replayed for retry")]
    UnreplayableBody,
    /// Every attempt failed at the transport level.
    #[error("max retries exceeded: {0}")]
    RetriesExhausted(#[source] TransportError),
}

/// Retry behavior for a client. Immutable once the client is built.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Retries after the initial attempt.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Status codes treated as transient.
    pub retryable_statuses: Vec<StatusCode>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            retryable_statuses: vec![
                StatusCode::TOO_MANY_REQUESTS,
                StatusCode::INTERNAL_SERVER_ERROR,
                StatusCode::BAD_GATEWAY,
                StatusCode::SERVICE_UNAVAILABLE,
                StatusCode::GATEWAY_TIMEOUT,
            ],
        }
    }
}

impl RetryConfig {
    pub fn is_retryable(&self, status: StatusCode) -> bool {
        self.retryable_statuses.contains(&status)
    }

    /// Jittered delay before retrying `attempt` (0-indexed).
    ///
    /// The jitter factor lands the delay in `[0.25·base, 0.5·base)`, below
    /// the nominal exponential value. Callers depend on this shape.
    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponential = self.base_delay.as_secs_f64() * 2f64.powi(attempt as i32);
        let base = exponential.min(self.max_delay.as_secs_f64());
        let jittered = base * (0.5 + rand::thread_rng().gen::<f64>()) * 0.5;
        Duration::from_secs_f64(jittered)
    }
}

/// Per-call deadlines keyed on the HTTP method. Immutable once built.
#[derive(Debug, Clone)]
pub struct TimeoutConfig {
    /// Applied to GET, HEAD and OPTIONS.
    pub read_timeout: Duration,
    /// Applied to every other method.
    pub write_timeout: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_secs(3),
            write_timeout: Duration::from_secs(15),
        }
    }
}

impl TimeoutConfig {
    pub fn timeout_for(&self, method: &Method) -> Duration {
        if *method == Method::GET || *method == Method::HEAD || *method == Method::OPTIONS {
            self.read_timeout
        } else {
            self.write_timeout
        }
    }

    /// Deadline bounding the whole retry envelope for a call using `method`.
    pub fn deadline_for(&self, method: &Method) -> Instant {
        Instant::now() + self.timeout_for(method)
    }
}

/// Transport seam under the retrying client.
///
/// Lets tests script response sequences while production wires in a
/// `reqwest::Client`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn execute(&self, request: Request) -> Result<Response, TransportError>;
}

#[async_trait]
impl HttpTransport for reqwest::Client {
    async fn execute(&self, request: Request) -> Result<Response, TransportError> {
        reqwest::Client::execute(self, request)
            .await
            .map_err(TransportError::from)
    }
}

/// HTTP client that retries transient failures.
///
/// Transport-level errors are always considered transient. Responses whose
/// status is in [`RetryConfig::retryable_statuses`] are retried while
/// attempts remain; once attempts are exhausted the last response is handed
/// back as-is so callers can still inspect the status.
#[derive(Clone)]
pub struct RetryingHttpClient {
    transport: Arc<dyn HttpTransport>,
    retry: RetryConfig,
    timeouts: TimeoutConfig,
}

impl RetryingHttpClient {
    pub fn new(transport: Arc<dyn HttpTransport>, retry: RetryConfig, timeouts: TimeoutConfig) -> Self {
        Self {
            transport,
            retry,
            timeouts,
        }
    }

    pub async fn execute(&self, request: Request) -> Result<Response, HttpClientError> {
        let deadline = self.timeouts.deadline_for(request.method());
        let mut attempt = 0u32;
        loop {
            if Instant::now() >= deadline {
                return Err(HttpClientError::DeadlineExceeded);
            }
            let attempt_request = request
                .try_clone()
                .ok_or(HttpClientError::UnreplayableBody)?;
            match timeout_at(deadline, self.transport.execute(attempt_request)).await {
                Err(_elapsed) => return Err(HttpClientError::DeadlineExceeded),
                Ok(Err(err)) => {
                    if attempt >= self.retry.max_retries {
                        return Err(HttpClientError::RetriesExhausted(err));
                    }
                    warn!(attempt, error = %err, "transport failure, retrying");
                    self.backoff(attempt, deadline).await;
                }
                Ok(Ok(response)) => {
                    let status = response.status();
                    if !self.retry.is_retryable(status) || attempt >= self.retry.max_retries {
                        return Ok(response);
                    }
                    debug!(attempt, status = %status, "retryable status, backing off");
                    drop(response);
                    self.backoff(attempt, deadline).await;
                }
            }
            attempt += 1;
        }
    }

    /// Sleeps the jittered delay, clamped so the deadline check at the top of
    /// the loop observes cancellation instead of starting a new attempt.
    async fn backoff(&self, attempt: u32, deadline: Instant) {
        let wake = Instant::now() + self.retry.delay_for_attempt(attempt);
        sleep_until(wake.min(deadline)).await;
    }
}
