//! Product catalog client for the remote HTTP source.

use std::time::Duration;

use polars::prelude::DataFrame;
use reqwest::StatusCode;
use reviewlens_parser::{parse_product_array, records_to_frame};
use tracing::{debug, info, warn};

use crate::config::{ConfigError, ProductSourceConfig, RetryConfig};
use crate::error::{PipelineError, Result};

const USER_AGENT: &str = concat!("reviewlens/", env!("CARGO_PKG_VERSION"));

/// Longest wait between two attempts.
pub const MAX_BACKOFF: Duration = Duration::from_secs(60);
/// Largest `max_attempts` a configuration may ask for.
pub const MAX_ATTEMPTS: u32 = 10;

/// How many times to call the product endpoint and how long to wait in between.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub backoff_multiplier: f64,
}

impl RetryPolicy {
    /// A single attempt, no retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::ZERO,
            backoff_multiplier: 1.0,
        }
    }

    /// Delay before the attempt following `failed_attempts` failures, capped at [`MAX_BACKOFF`].
    pub fn backoff_after(&self, failed_attempts: u32) -> Duration {
        if self.initial_backoff.is_zero() {
            return Duration::ZERO;
        }
        let exponent = failed_attempts.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs =
            self.initial_backoff.as_secs_f64() * self.backoff_multiplier.max(1.0).powi(exponent);
        Duration::try_from_secs_f64(secs).map_or(MAX_BACKOFF, |delay| delay.min(MAX_BACKOFF))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::none()
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            backoff_multiplier: config.backoff_multiplier,
        }
    }
}

enum AttemptError {
    Retryable(String),
    Fatal(String),
}

pub struct CatalogClient {
    http: reqwest::Client,
    url: String,
    retry: RetryPolicy,
}

impl CatalogClient {
    pub fn new(url: impl Into<String>, timeout: Duration, retry: RetryPolicy) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| ConfigError::Invalid(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            url: url.into(),
            retry,
        })
    }

    pub fn from_config(config: &ProductSourceConfig) -> Result<Self> {
        Self::new(
            config.url.clone(),
            config.timeout(),
            RetryPolicy::from(&config.retry),
        )
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Fetches the catalog and returns it as a table, one row per product object.
    pub async fn fetch_products(&self) -> Result<DataFrame> {
        let (body, attempts) = self.fetch_body().await?;

        let records = parse_product_array(&body).map_err(|e| PipelineError::UpstreamUnavailable {
            url: self.url.clone(),
            attempts,
            reason: format!("unexpected payload: {e}"),
        })?;
        let frame = records_to_frame(&records)?;

        info!(url = %self.url, products = frame.height(), "Fetched product catalog");
        Ok(frame)
    }

    async fn fetch_body(&self) -> Result<(String, u32)> {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            debug!(url = %self.url, attempt, "Requesting product catalog");

            let failure = match self.attempt().await {
                Ok(body) => return Ok((body, attempt)),
                Err(AttemptError::Fatal(reason)) => {
                    return Err(self.unavailable(attempt, reason));
                }
                Err(AttemptError::Retryable(reason)) => reason,
            };

            if attempt >= max_attempts {
                return Err(self.unavailable(attempt, failure));
            }

            let delay = self.retry.backoff_after(attempt);
            warn!(
                url = %self.url,
                attempt,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                reason = %failure,
                "Product catalog request failed; retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }

    async fn attempt(&self) -> std::result::Result<String, AttemptError> {
        let response = self
            .http
            .get(&self.url)
            .send()
            .await
            .map_err(|e| AttemptError::Retryable(describe_transport_error(&e)))?;

        let status = response.status();
        if !status.is_success() {
            let reason = format!("HTTP {}", status.as_u16());
            return Err(if is_retryable_status(status) {
                AttemptError::Retryable(reason)
            } else {
                AttemptError::Fatal(reason)
            });
        }

        response
            .text()
            .await
            .map_err(|e| AttemptError::Retryable(describe_transport_error(&e)))
    }

    fn unavailable(&self, attempts: u32, reason: String) -> PipelineError {
        PipelineError::UpstreamUnavailable {
            url: self.url.clone(),
            attempts,
            reason,
        }
    }
}

fn is_retryable_status(status: StatusCode) -> bool {
    status.is_server_error()
        || status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
}

fn describe_transport_error(err: &reqwest::Error) -> String {
    if err.is_timeout() {
        format!("request timed out: {err}")
    } else if err.is_connect() {
        format!("connection failed: {err}")
    } else {
        err.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_exponentially() {
        let policy = RetryPolicy {
            max_attempts: 4,
            initial_backoff: Duration::from_millis(100),
            backoff_multiplier: 2.0,
        };
        assert_eq!(policy.backoff_after(1), Duration::from_millis(100));
        assert_eq!(policy.backoff_after(2), Duration::from_millis(200));
        assert_eq!(policy.backoff_after(3), Duration::from_millis(400));
    }

    #[test]
    fn backoff_saturates_instead_of_overflowing() {
        let policy = RetryPolicy {
            max_attempts: 100,
            initial_backoff: Duration::from_millis(500),
            backoff_multiplier: 2.0,
        };
        assert_eq!(policy.backoff_after(70), MAX_BACKOFF);
        assert_eq!(policy.backoff_after(u32::MAX), MAX_BACKOFF);
        assert_eq!(policy.backoff_after(2), Duration::from_secs(1));
    }

    #[test]
    fn infinite_multiplier_is_capped() {
        let policy = RetryPolicy {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
            backoff_multiplier: f64::INFINITY,
        };
        assert_eq!(policy.backoff_after(1), Duration::from_millis(500));
        assert_eq!(policy.backoff_after(2), MAX_BACKOFF);

        let nan = RetryPolicy {
            backoff_multiplier: f64::NAN,
            ..policy
        };
        assert_eq!(nan.backoff_after(3), Duration::from_millis(500));
    }

    #[test]
    fn retry_config_never_allows_zero_attempts() {
        let config = RetryConfig {
            max_attempts: 0,
            initial_backoff_ms: 10,
            backoff_multiplier: 1.5,
        };
        assert_eq!(RetryPolicy::from(&config).max_attempts, 1);
    }

    #[test]
    fn server_errors_are_retryable() {
        assert!(is_retryable_status(StatusCode::SERVICE_UNAVAILABLE));
        assert!(is_retryable_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(!is_retryable_status(StatusCode::NOT_FOUND));
    }
}
