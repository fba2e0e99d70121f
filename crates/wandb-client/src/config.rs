//! Client configuration: API key, service endpoints and HTTP policy.

use std::time::Duration;

use secrecy::SecretString;
use url::Url;

use crate::error::{ClientError, ClientResult};

/// Default W&B API endpoint (GraphQL lives at `{base_url}/graphql`).
pub const DEFAULT_BASE_URL: &str = "https://api.wandb.ai";
/// Default W&B web app, used to build report URLs.
pub const DEFAULT_APP_URL: &str = "https://wandb.ai";
/// Default Weave trace server.
pub const DEFAULT_TRACE_SERVER_URL: &str = "https://trace.wandb.ai";
/// Default wandbot support-bot API.
pub const DEFAULT_WANDBOT_URL: &str = "https://wandbot.replit.app";

/// Resolved configuration for [`crate::WandbClient`].
///
/// `timeout` is `None` unless configured: requests then wait as long as the
/// underlying HTTP client does. `max_retries = 0` sends every request once.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub api_key: SecretString,
    pub base_url: Url,
    pub app_url: Url,
    pub trace_server_url: Url,
    pub wandbot_url: Url,
    pub timeout: Option<Duration>,
    pub max_retries: u8,
    pub retry_base_delay_ms: u64,
    /// Suppress informational client chatter (login banners and the like).
    pub silent: bool,
}

impl ClientConfig {
    /// Default delay before the first retry; doubles on every further attempt.
    pub const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 500;

    /// Build a configuration against the public W&B endpoints.
    pub fn new(api_key: SecretString) -> Self {
        Self {
            api_key,
            base_url: parse_static(DEFAULT_BASE_URL),
            app_url: parse_static(DEFAULT_APP_URL),
            trace_server_url: parse_static(DEFAULT_TRACE_SERVER_URL),
            wandbot_url: parse_static(DEFAULT_WANDBOT_URL),
            timeout: None,
            max_retries: 0,
            retry_base_delay_ms: Self::DEFAULT_RETRY_BASE_DELAY_MS,
            silent: false,
        }
    }

    pub fn with_base_url(mut self, url: &str) -> ClientResult<Self> {
        self.base_url = parse_url("base_url", url)?;
        Ok(self)
    }

    pub fn with_app_url(mut self, url: &str) -> ClientResult<Self> {
        self.app_url = parse_url("app_url", url)?;
        Ok(self)
    }

    pub fn with_trace_server_url(mut self, url: &str) -> ClientResult<Self> {
        self.trace_server_url = parse_url("trace_server_url", url)?;
        Ok(self)
    }

    pub fn with_wandbot_url(mut self, url: &str) -> ClientResult<Self> {
        self.wandbot_url = parse_url("wandbot_url", url)?;
        Ok(self)
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retries(mut self, max_retries: u8, base_delay_ms: u64) -> Self {
        self.max_retries = max_retries;
        self.retry_base_delay_ms = base_delay_ms;
        self
    }

    pub fn with_silent(mut self, silent: bool) -> Self {
        self.silent = silent;
        self
    }

    /// `{base_url}/graphql`
    pub fn graphql_endpoint(&self) -> ClientResult<Url> {
        join(&self.base_url, "graphql")
    }

    /// `{trace_server_url}/{path}`
    pub fn trace_endpoint(&self, path: &str) -> ClientResult<Url> {
        join(&self.trace_server_url, path)
    }

    /// `{wandbot_url}/{path}`
    pub fn wandbot_endpoint(&self, path: &str) -> ClientResult<Url> {
        join(&self.wandbot_url, path)
    }
}

fn parse_url(field: &str, raw: &str) -> ClientResult<Url> {
    Url::parse(raw.trim()).map_err(|e| ClientError::config_error(format!("{field}: {e}")))
}

fn parse_static(raw: &'static str) -> Url {
    // Compile-time constants above are valid absolute URLs.
    Url::parse(raw).unwrap_or_else(|_| unreachable!("invalid built-in URL {raw}"))
}

/// Join a relative path onto a base URL, keeping any path prefix the base carries.
fn join(base: &Url, path: &str) -> ClientResult<Url> {
    let mut base = base.clone();
    if !base.path().ends_with('/') {
        let with_slash = format!("{}/", base.path());
        base.set_path(&with_slash);
    }
    base.join(path.trim_start_matches('/'))
        .map_err(|e| ClientError::config_error(format!("cannot join '{path}': {e}")))
}
