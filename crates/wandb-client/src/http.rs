//! HTTP transport shared by every API surface.
//!
//! Wraps one `reqwest::Client` with W&B basic auth (`api:<key>`) and a
//! bounded retry loop with exponential backoff for recoverable failures
//! (connect errors, timeouts, 5xx).

use std::time::Duration;

use reqwest::{RequestBuilder, Response};
use secrecy::ExposeSecret;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};
use url::Url;

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};

const BASIC_AUTH_USER: &str = "api";
const ERROR_BODY_LIMIT: usize = 512;
const MAX_RETRY_DELAY: Duration = Duration::from_secs(30);

/// Exponential backoff for retry `attempt` (1-based), capped at 30 s.
fn backoff_delay(base_ms: u64, attempt: u8) -> Duration {
    let factor = 2u64
        .checked_pow(u32::from(attempt.saturating_sub(1)))
        .unwrap_or(u64::MAX);
    Duration::from_millis(base_ms.saturating_mul(factor)).min(MAX_RETRY_DELAY)
}

#[derive(Debug, Clone)]
pub(crate) struct HttpTransport {
    client: reqwest::Client,
    config: ClientConfig,
}

impl HttpTransport {
    pub(crate) fn new(config: ClientConfig) -> ClientResult<Self> {
        let mut builder = reqwest::Client::builder()
            .user_agent(concat!("wandb-mcp/", env!("CARGO_PKG_VERSION")));
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build()?;
        Ok(Self { client, config })
    }

    pub(crate) fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// POST a JSON body and deserialize a JSON response.
    pub(crate) async fn post_json<B, T>(&self, url: &Url, body: &B) -> ClientResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self.send_with_retry(url, || self.post(url).json(body)).await?;
        Ok(response.json::<T>().await?)
    }

    /// POST a JSON body and return the raw response text (used for JSONL streams).
    pub(crate) async fn post_text<B>(&self, url: &Url, body: &B) -> ClientResult<String>
    where
        B: Serialize + ?Sized,
    {
        let response = self.send_with_retry(url, || self.post(url).json(body)).await?;
        Ok(response.text().await?)
    }

    fn post(&self, url: &Url) -> RequestBuilder {
        self.client.post(url.as_str()).basic_auth(
            BASIC_AUTH_USER,
            Some(self.config.api_key.expose_secret()),
        )
    }

    /// Send a request, retrying recoverable failures up to `max_retries` times.
    async fn send_with_retry<F>(&self, url: &Url, build: F) -> ClientResult<Response>
    where
        F: Fn() -> RequestBuilder,
    {
        let max_retries = self.config.max_retries;
        let mut attempt: u8 = 0;

        loop {
            if attempt > 0 {
                tokio::time::sleep(backoff_delay(self.config.retry_base_delay_ms, attempt)).await;
            }

            debug!(url = %url, attempt, "POST");
            let result = match build().send().await {
                Ok(response) => check_status(response).await,
                Err(e) if e.is_timeout() => Err(ClientError::Timeout {
                    operation: url.path().to_string(),
                }),
                Err(e) => Err(e.into()),
            };

            match result {
                Ok(response) => return Ok(response),
                Err(e) if e.is_recoverable() && attempt < max_retries => {
                    warn!(url = %url, attempt, error = %e, "Recoverable request failure, retrying");
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

async fn check_status(response: Response) -> ClientResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = if body.trim().is_empty() {
        status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string()
    } else {
        truncate_chars(body.trim(), ERROR_BODY_LIMIT)
    };

    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        return Err(ClientError::Auth(format!("{} - {}", status.as_u16(), message)));
    }
    Err(ClientError::api_error(status.as_u16(), message))
}

fn truncate_chars(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
