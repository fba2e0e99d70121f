//! Weights & Biases MCP Server library.
//!
//! Provides the [`WandbMcpServer`] MCP server handler, startup configuration,
//! and the stdio/HTTP transports. Used by the `wandb-mcp` binary and
//! available for integration testing.

pub mod capture;
pub mod config;
pub mod logging;
pub mod server;
pub mod tools;
pub mod transport;

pub use config::{ConfigError, ServerArgs, ServerConfig, TransportKind};
pub use server::WandbMcpServer;
pub use transport::{serve_http, serve_stdio, HttpServerHandle};
