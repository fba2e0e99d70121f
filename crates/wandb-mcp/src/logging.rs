//! Logging setup. All output goes to stderr; stdout belongs to the stdio
//! transport.

use tracing::Level;
use tracing_subscriber::EnvFilter;

use crate::config::ConfigError;

/// Crates whose chatter is held at `error` unless `RUST_LOG` says otherwise.
const QUIET_TARGETS: [&str; 4] = ["wandb_client", "reqwest", "hyper", "hyper_util"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogSettings {
    pub level: Level,
}

impl LogSettings {
    pub fn from_name(name: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            level: parse_level(name)?,
        })
    }
}

impl Default for LogSettings {
    fn default() -> Self {
        Self { level: Level::WARN }
    }
}

/// Accepts tracing level names as well as the `WARNING`/`CRITICAL` spellings
/// common in W&B tooling configs.
pub fn parse_level(name: &str) -> Result<Level, ConfigError> {
    match name.trim().to_ascii_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" | "warning" => Ok(Level::WARN),
        "error" | "critical" | "fatal" => Ok(Level::ERROR),
        _ => Err(ConfigError::InvalidLogLevel(name.to_string())),
    }
}

fn directive_level(level: Level) -> &'static str {
    match level {
        Level::TRACE => "trace",
        Level::DEBUG => "debug",
        Level::INFO => "info",
        Level::WARN => "warn",
        Level::ERROR => "error",
    }
}

/// Filter directives used when `RUST_LOG` is not set.
pub fn default_directives(settings: &LogSettings) -> String {
    let mut directives = vec![
        "warn".to_string(),
        format!("wandb_mcp={}", directive_level(settings.level)),
    ];
    directives.extend(QUIET_TARGETS.iter().map(|t| format!("{t}=error")));
    directives.join(",")
}

pub fn init_logging(settings: &LogSettings) -> anyhow::Result<()> {
    let filter = match std::env::var(EnvFilter::DEFAULT_ENV) {
        Ok(_) => EnvFilter::from_default_env(),
        Err(_) => EnvFilter::try_new(default_directives(settings))?,
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {e}"))
}
