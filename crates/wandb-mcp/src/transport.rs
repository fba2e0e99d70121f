//! Transport selector: stdio or stateless streamable HTTP.
//!
//! Both serve the same [`WandbMcpServer`] value; HTTP hands each request a
//! clone of it.

use std::net::SocketAddr;

use anyhow::Context;
use rmcp::transport::streamable_http_server::session::local::LocalSessionManager;
use rmcp::transport::streamable_http_server::{StreamableHttpServerConfig, StreamableHttpService};
use rmcp::ServiceExt;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::HttpSettings;
use crate::server::WandbMcpServer;

/// Path the MCP endpoint is mounted at.
pub const MCP_PATH: &str = "/mcp";

/// Serve one session over stdin/stdout until the client disconnects.
pub async fn serve_stdio(server: WandbMcpServer) -> anyhow::Result<()> {
    info!("Starting server with stdio transport");
    let service = server.serve(rmcp::transport::io::stdio()).await?;
    service.waiting().await?;
    Ok(())
}

/// Handle for a running streamable HTTP server.
#[derive(Debug)]
pub struct HttpServerHandle {
    local_addr: SocketAddr,
    cancel_token: CancellationToken,
    handle: JoinHandle<std::io::Result<()>>,
}

impl HttpServerHandle {
    /// Bind `settings.host:settings.port` and start serving in the background.
    pub async fn bind(server: WandbMcpServer, settings: &HttpSettings) -> anyhow::Result<Self> {
        let listener = TcpListener::bind((settings.host.as_str(), settings.port))
            .await
            .with_context(|| format!("Failed to bind {}:{}", settings.host, settings.port))?;
        let local_addr = listener.local_addr()?;

        let service = StreamableHttpService::new(
            move || Ok(server.clone()),
            LocalSessionManager::default().into(),
            StreamableHttpServerConfig {
                stateful_mode: false,
                ..Default::default()
            },
        );
        let router = axum::Router::new().nest_service(MCP_PATH, service);

        let cancel_token = CancellationToken::new();
        let shutdown = cancel_token.clone();
        let handle = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async move { shutdown.cancelled().await })
                .await
        });

        info!(address = %local_addr, path = MCP_PATH, "MCP HTTP server listening");
        Ok(Self {
            local_addr,
            cancel_token,
            handle,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// `http://{addr}/mcp`
    pub fn endpoint(&self) -> String {
        format!("http://{}{}", self.local_addr, MCP_PATH)
    }

    /// Check if the server is still running
    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Stop accepting connections and wait for in-flight requests to drain.
    pub async fn stop(self) -> anyhow::Result<()> {
        self.cancel_token.cancel();
        self.handle.await.context("HTTP server task panicked")??;
        info!("MCP HTTP server stopped");
        Ok(())
    }
}

/// Serve over HTTP until Ctrl-C.
pub async fn serve_http(server: WandbMcpServer, settings: &HttpSettings) -> anyhow::Result<()> {
    info!(host = %settings.host, port = settings.port, "Starting HTTP server");
    let handle = HttpServerHandle::bind(server, settings).await?;

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
    }
    handle.stop().await
}
