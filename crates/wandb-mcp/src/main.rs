//! Weights & Biases MCP Server
//!
//! Model Context Protocol server exposing W&B run data, Weave traces,
//! report creation and the wandbot support bot to LLM agents.

use std::sync::Arc;

use clap::Parser;
use tracing::info;

use wandb_client::WandbClient;
use wandb_mcp::capture;
use wandb_mcp::config::{self, DotenvValues, ServerArgs, ServerConfig, TransportKind};
use wandb_mcp::logging::{self, LogSettings};
use wandb_mcp::{serve_http, serve_stdio, WandbMcpServer};

fn main() -> anyhow::Result<()> {
    // Environment is settled before any thread exists.
    let mut dotenv = DotenvValues::load()?;
    dotenv.apply_to_env();
    config::silence_wandb();

    let args = ServerArgs::parse();
    logging::init_logging(&LogSettings::from_name(&args.log_level)?)?;
    if let Some(path) = dotenv.path() {
        info!(path = %path.display(), "Loaded dotenv file");
    }

    let config = ServerConfig::resolve(&args, &dotenv)?;
    info!(
        source = %config.api_key_source,
        transport = %config.transport,
        "API key configured"
    );

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(run(config))
}

async fn run(config: ServerConfig) -> anyhow::Result<()> {
    let client = WandbClient::new(config.client.clone())?;
    capture::login(&client).await;

    info!("Starting Weights & Biases MCP Server");
    let server = WandbMcpServer::new(Arc::new(client));
    match config.transport {
        TransportKind::Stdio => serve_stdio(server).await,
        TransportKind::Http => serve_http(server, &config.http).await,
    }
}
