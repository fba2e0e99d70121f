//! Startup configuration: dotenv loading, CLI/env arguments and API key
//! resolution.
//!
//! Everything here runs once from the entry point, before the async
//! runtime starts. The resolved [`ServerConfig`] is immutable afterwards.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use clap::Parser;
use secrecy::SecretString;
use thiserror::Error;

use wandb_client::config::{
    DEFAULT_APP_URL, DEFAULT_BASE_URL, DEFAULT_TRACE_SERVER_URL, DEFAULT_WANDBOT_URL,
};
use wandb_client::{ClientConfig, ClientError};

pub const API_KEY_ENV: &str = "WANDB_API_KEY";
/// Overrides the dotenv file location (default `.env` in the working directory).
pub const ENV_FILE_ENV: &str = "WANDB_MCP_ENV_FILE";
pub const DEFAULT_ENV_FILE: &str = ".env";
pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_HTTP_PORT: u16 = 8080;

/// Variables forced on so the W&B tooling stays quiet.
pub const SILENT_ENV_VARS: [&str; 2] = ["WANDB_SILENT", "WEAVE_SILENT"];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(
        "WANDB_API_KEY must be set either as an environment variable, in .env file, or as a command-line argument"
    )]
    MissingApiKey,

    #[error("Invalid transport type: {0}. Must be 'stdio' or 'http'")]
    InvalidTransport(String),

    #[error("Invalid log level '{0}'. Expected one of: trace, debug, info, warning, error, critical")]
    InvalidLogLevel(String),

    #[error("Invalid HTTP bind address '{host}:{port}'")]
    InvalidAddress { host: String, port: u16 },

    #[error("Failed to read dotenv file {}: {source}", path.display())]
    DotEnv {
        path: PathBuf,
        #[source]
        source: dotenvy::Error,
    },

    #[error("Invalid client configuration: {0}")]
    Client(#[from] ClientError),
}

/// Command-line arguments. Flags other than the API key, transport, host
/// and port also read their environment variable.
#[derive(Parser)]
#[command(
    name = "wandb-mcp",
    version,
    about = "MCP server for querying Weights & Biases runs, Weave traces and reports"
)]
pub struct ServerArgs {
    /// W&B API key (falls back to WANDB_API_KEY, then the dotenv file).
    #[arg(long)]
    pub wandb_api_key: Option<String>,

    /// Transport to serve on: stdio or http.
    #[arg(long, default_value = "stdio")]
    pub transport: String,

    /// Host to bind when serving over HTTP.
    #[arg(long, default_value = DEFAULT_HOST)]
    pub host: String,

    /// Port to bind when serving over HTTP (default 8080).
    #[arg(long)]
    pub port: Option<u16>,

    /// W&B API base URL.
    #[arg(long, env = "WANDB_BASE_URL", default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    /// W&B web app URL, used to build report links.
    #[arg(long, env = "WANDB_APP_URL", default_value = DEFAULT_APP_URL)]
    pub app_url: String,

    /// Weave trace server URL.
    #[arg(long, env = "WF_TRACE_SERVER_URL", default_value = DEFAULT_TRACE_SERVER_URL)]
    pub trace_server_url: String,

    /// wandbot support-bot URL.
    #[arg(long, env = "WANDBOT_BASE_URL", default_value = DEFAULT_WANDBOT_URL)]
    pub wandbot_url: String,

    /// Per-request timeout in seconds. Unset means no client-side timeout.
    #[arg(long, env = "WANDB_MCP_REQUEST_TIMEOUT_SECS")]
    pub request_timeout_secs: Option<u64>,

    /// Retries for connect errors, timeouts and 5xx responses.
    #[arg(long, env = "WANDB_MCP_MAX_RETRIES", default_value_t = 0)]
    pub max_retries: u8,

    /// Log level for this server's own logger.
    #[arg(long, env = "MCP_SERVER_LOG_LEVEL", default_value = "warning")]
    pub log_level: String,
}

impl fmt::Debug for ServerArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerArgs")
            .field("wandb_api_key", &self.wandb_api_key.as_ref().map(|_| "[REDACTED]"))
            .field("transport", &self.transport)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("base_url", &self.base_url)
            .field("app_url", &self.app_url)
            .field("trace_server_url", &self.trace_server_url)
            .field("wandbot_url", &self.wandbot_url)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("max_retries", &self.max_retries)
            .field("log_level", &self.log_level)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Stdio,
    Http,
}

impl FromStr for TransportKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stdio" => Ok(Self::Stdio),
            "http" => Ok(Self::Http),
            other => Err(ConfigError::InvalidTransport(other.to_string())),
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stdio => write!(f, "stdio"),
            Self::Http => write!(f, "http"),
        }
    }
}

/// Where the API key came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiKeySource {
    Cli,
    Environment,
    DotEnv,
}

impl fmt::Display for ApiKeySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cli => write!(f, "command line"),
            Self::Environment => write!(f, "environment"),
            Self::DotEnv => write!(f, "dotenv file"),
        }
    }
}

/// First non-empty key of CLI flag, process environment, dotenv file.
pub fn resolve_api_key(
    cli: Option<&str>,
    env: Option<&str>,
    dotenv: Option<&str>,
) -> Option<(SecretString, ApiKeySource)> {
    [
        (cli, ApiKeySource::Cli),
        (env, ApiKeySource::Environment),
        (dotenv, ApiKeySource::DotEnv),
    ]
    .into_iter()
    .find_map(|(value, source)| {
        value
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|v| (SecretString::from(v.to_string()), source))
    })
}

/// Values read from the dotenv file, and which of them were exported into
/// the process environment.
#[derive(Default)]
pub struct DotenvValues {
    path: Option<PathBuf>,
    values: BTreeMap<String, String>,
    applied: BTreeSet<String>,
}

impl fmt::Debug for DotenvValues {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DotenvValues")
            .field("path", &self.path)
            .field("keys", &self.values.keys().collect::<Vec<_>>())
            .field("applied", &self.applied)
            .finish()
    }
}

impl DotenvValues {
    /// Read `$WANDB_MCP_ENV_FILE` or `./.env`. A missing file is not an error.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var_os(ENV_FILE_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_ENV_FILE));
        Self::from_path(&path)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let dotenv_error = |source| ConfigError::DotEnv {
            path: path.to_path_buf(),
            source,
        };

        let iter = match dotenvy::from_path_iter(path) {
            Ok(iter) => iter,
            Err(e) if e.not_found() => return Ok(Self::default()),
            Err(e) => return Err(dotenv_error(e)),
        };

        let mut values = BTreeMap::new();
        for item in iter {
            let (key, value) = item.map_err(dotenv_error)?;
            values.insert(key, value);
        }

        Ok(Self {
            path: Some(path.to_path_buf()),
            values,
            applied: BTreeSet::new(),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Export values whose variable is not already set. Existing process
    /// environment always wins.
    pub fn apply_to_env(&mut self) {
        for (key, value) in &self.values {
            if std::env::var_os(key).is_none() {
                std::env::set_var(key, value);
                self.applied.insert(key.clone());
            }
        }
    }

    /// True when `key` is in the environment only because of this file.
    pub fn supplied(&self, key: &str) -> bool {
        self.applied.contains(key)
    }
}

/// Force the W&B tooling into silent mode for the rest of the process.
pub fn silence_wandb() {
    for var in SILENT_ENV_VARS {
        std::env::set_var(var, "True");
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpSettings {
    pub host: String,
    pub port: u16,
}

impl HttpSettings {
    pub fn new(host: impl Into<String>, port: Option<u16>) -> Result<Self, ConfigError> {
        let host = host.into();
        let port = port.unwrap_or(DEFAULT_HTTP_PORT);
        if host.trim().is_empty() || host.contains(char::is_whitespace) {
            return Err(ConfigError::InvalidAddress { host, port });
        }
        Ok(Self { host, port })
    }
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_HTTP_PORT,
        }
    }
}

/// Fully resolved server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub api_key_source: ApiKeySource,
    pub transport: TransportKind,
    pub http: HttpSettings,
    pub client: ClientConfig,
}

impl ServerConfig {
    /// Resolve arguments into a runnable configuration.
    ///
    /// Fails on a missing API key or an unknown transport, before anything
    /// is bound.
    pub fn resolve(args: &ServerArgs, dotenv: &DotenvValues) -> Result<Self, ConfigError> {
        let env_key = if dotenv.supplied(API_KEY_ENV) {
            None
        } else {
            std::env::var(API_KEY_ENV).ok()
        };
        Self::resolve_with_env_key(args, env_key.as_deref(), dotenv)
    }

    fn resolve_with_env_key(
        args: &ServerArgs,
        env_key: Option<&str>,
        dotenv: &DotenvValues,
    ) -> Result<Self, ConfigError> {
        let (api_key, api_key_source) = resolve_api_key(
            args.wandb_api_key.as_deref(),
            env_key,
            dotenv.get(API_KEY_ENV),
        )
        .ok_or(ConfigError::MissingApiKey)?;

        let transport: TransportKind = args.transport.parse()?;
        let http = HttpSettings::new(args.host.clone(), args.port)?;

        let client = ClientConfig::new(api_key)
            .with_base_url(&args.base_url)?
            .with_app_url(&args.app_url)?
            .with_trace_server_url(&args.trace_server_url)?
            .with_wandbot_url(&args.wandbot_url)?
            .with_timeout(args.request_timeout_secs.map(Duration::from_secs))
            .with_retries(args.max_retries, ClientConfig::DEFAULT_RETRY_BASE_DELAY_MS)
            .with_silent(true);

        Ok(Self {
            api_key_source,
            transport,
            http,
            client,
        })
    }
}
