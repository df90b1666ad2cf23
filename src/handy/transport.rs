// src/handy/transport.rs

//! The one place where HTTP timeouts, retries and backoff are decided.
//!
//! Idempotent verbs (GET/PUT) are retried on connectivity failures and on
//! the statuses in [`RETRY_STATUSES`]. POST is sent exactly once; callers that
//! upload fail over to another endpoint instead.

use log::{debug, warn};
use reqwest::{header::HeaderMap, Client, Method, RequestBuilder, Response};
use std::time::Duration;
use crate::error::{HandyError, Result};

pub const RETRY_STATUSES: [u16; 5] = [429, 500, 502, 503, 504];

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(3),
            read_timeout: Duration::from_secs(10),
            max_retries: 3,
            initial_backoff: Duration::from_millis(250),
            max_backoff: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based), doubling each time.
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 1u32.checked_shl(retry.saturating_sub(1)).unwrap_or(u32::MAX);
        self.initial_backoff
            .checked_mul(factor)
            .map_or(self.max_backoff, |d| d.min(self.max_backoff))
    }
}

pub struct HttpTransport {
    client: Client,
    policy: RetryPolicy,
}

impl HttpTransport {
    pub fn new(default_headers: HeaderMap, policy: RetryPolicy) -> Result<Self> {
        let client = Client::builder()
            .default_headers(default_headers)
            .connect_timeout(policy.connect_timeout)
            .timeout(policy.read_timeout)
            .build()?;
        Ok(Self { client, policy })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Sends a GET or PUT, retrying transient failures with exponential backoff.
    ///
    /// `build` is called once per attempt because a `RequestBuilder` is consumed on send.
    pub async fn send_idempotent<F>(&self, method: Method, url: &str, build: F) -> Result<Response>
    where
        F: Fn(RequestBuilder) -> RequestBuilder,
    {
        let mut retry = 0;
        loop {
            let request = build(self.client.request(method.clone(), url));
            let outcome = match request.send().await {
                Ok(response) => check_status(response),
                Err(e) => Err(HandyError::Http(e)),
            };

            match outcome {
                Ok(response) => {
                    if retry > 0 {
                        debug!("{} {} succeeded after {} retries", method, url, retry);
                    }
                    return Ok(response);
                }
                Err(e) if e.is_transient() && retry < self.policy.max_retries => {
                    retry += 1;
                    let delay = self.policy.backoff(retry);
                    warn!("{} {} failed ({}), retry {} in {:?}", method, url, e, retry, delay);
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Sends a single request with no retry.
    pub async fn send_once(&self, request: RequestBuilder) -> Result<Response> {
        let response = request.send().await?;
        check_status(response)
    }
}

/// Turns any non-2xx response into `HandyError::Status`.
fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(HandyError::Status {
            status: status.as_u16(),
            url: response.url().to_string(),
        })
    }
}
