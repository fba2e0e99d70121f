//! Streamable HTTP transport test.
//!
//! Binds the server on an ephemeral port, performs a raw `initialize`
//! exchange against `/mcp`, then shuts it down.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use wandb_client::projects::{EntityProjects, Viewer};
use wandb_client::{
    ClientError, ClientResult, GqlQuery, QueryResult, ReportOutcome, ReportRequest, TraceFilters,
    TraceQuery, WandbApi,
};
use wandb_mcp::config::HttpSettings;
use wandb_mcp::server::TOOL_NAMES;
use wandb_mcp::{HttpServerHandle, WandbMcpServer};

/// Every call fails; these tests never reach a tool.
#[derive(Debug)]
struct OfflineApi;

fn offline<T>() -> ClientResult<T> {
    Err(ClientError::Config("offline".to_string()))
}

#[async_trait]
impl WandbApi for OfflineApi {
    async fn query_paginated_weave_traces(&self, _query: &TraceQuery) -> ClientResult<QueryResult> {
        offline()
    }

    async fn count_traces(&self, _e: &str, _p: &str, _f: &TraceFilters) -> ClientResult<u64> {
        offline()
    }

    async fn query_paginated_wandb_gql(&self, _query: &GqlQuery) -> ClientResult<Value> {
        offline()
    }

    async fn create_report(&self, _request: &ReportRequest) -> ClientResult<ReportOutcome> {
        offline()
    }

    async fn list_entity_projects(&self, _entity: Option<&str>) -> ClientResult<EntityProjects> {
        offline()
    }

    async fn query_wandbot_api(&self, _question: &str) -> ClientResult<Value> {
        offline()
    }

    async fn viewer(&self) -> ClientResult<Viewer> {
        offline()
    }
}

async fn start() -> anyhow::Result<HttpServerHandle> {
    let settings = HttpSettings::new("127.0.0.1", Some(0))?;
    HttpServerHandle::bind(WandbMcpServer::new(Arc::new(OfflineApi)), &settings).await
}

#[tokio::test]
async fn test_http_server_binds_and_stops() -> anyhow::Result<()> {
    let handle = start().await?;
    assert_ne!(handle.local_addr().port(), 0);
    assert!(handle.is_running());
    assert!(handle.endpoint().ends_with("/mcp"));

    handle.stop().await?;
    Ok(())
}

#[tokio::test]
async fn test_http_initialize_round_trip() -> anyhow::Result<()> {
    let handle = start().await?;

    let response = reqwest::Client::new()
        .post(handle.endpoint())
        .header("accept", "application/json, text/event-stream")
        .json(&json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "initialize",
            "params": {
                "protocolVersion": "2025-03-26",
                "capabilities": {},
                "clientInfo": {"name": "http-transport-test", "version": "0.0.0"}
            }
        }))
        .send()
        .await?;
    assert!(response.status().is_success(), "status: {}", response.status());

    let body = tokio::time::timeout(Duration::from_secs(10), response.text()).await??;
    assert!(body.contains("\"wandb-mcp\""), "body: {body}");

    handle.stop().await?;
    Ok(())
}

/// POST one JSON-RPC request and return its response message.
///
/// The endpoint may answer with plain JSON or a single-event SSE stream.
async fn rpc(handle: &HttpServerHandle, method: &str, params: Value) -> anyhow::Result<Value> {
    let response = reqwest::Client::new()
        .post(handle.endpoint())
        .header("accept", "application/json, text/event-stream")
        .json(&json!({"jsonrpc": "2.0", "id": 7, "method": method, "params": params}))
        .send()
        .await?;
    assert!(response.status().is_success(), "status: {}", response.status());

    let body = tokio::time::timeout(Duration::from_secs(10), response.text()).await??;
    let payload = body
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(str::trim)
        .find(|data| !data.is_empty())
        .unwrap_or(body.trim());
    Ok(serde_json::from_str(payload)?)
}

#[tokio::test]
async fn test_http_lists_same_tools_as_server() -> anyhow::Result<()> {
    let handle = start().await?;
    let expected = WandbMcpServer::new(Arc::new(OfflineApi)).tools();

    let message = rpc(&handle, "tools/list", json!({})).await?;
    let listed = message["result"]["tools"]
        .as_array()
        .cloned()
        .unwrap_or_default();
    assert_eq!(listed.len(), TOOL_NAMES.len(), "message: {message}");

    for tool in &expected {
        let want = serde_json::to_value(tool)?;
        let got = listed
            .iter()
            .find(|t| t["name"] == want["name"])
            .unwrap_or_else(|| panic!("{} missing over HTTP", tool.name));
        assert!(TOOL_NAMES.iter().any(|n| tool.name == *n));
        assert_eq!(got["description"], want["description"]);
        assert_eq!(got["inputSchema"], want["inputSchema"]);
    }

    handle.stop().await?;
    Ok(())
}

#[tokio::test]
async fn test_http_tool_failure_sets_is_error() -> anyhow::Result<()> {
    let handle = start().await?;

    let message = rpc(
        &handle,
        "tools/call",
        json!({
            "name": "count_weave_traces_tool",
            "arguments": {"entity_name": "acme", "project_name": "demo"}
        }),
    )
    .await?;

    let result = &message["result"];
    assert_eq!(result["isError"], true, "message: {message}");
    let text = result["content"][0]["text"].as_str().unwrap_or_default();
    assert!(text.starts_with("Error counting traces: "), "text: {text}");

    handle.stop().await?;
    Ok(())
}

#[tokio::test]
async fn test_http_bind_conflict_is_an_error() -> anyhow::Result<()> {
    let first = start().await?;
    let taken = HttpSettings::new("127.0.0.1", Some(first.local_addr().port()))?;

    let second = HttpServerHandle::bind(WandbMcpServer::new(Arc::new(OfflineApi)), &taken).await;
    assert!(second.is_err());

    first.stop().await?;
    Ok(())
}
