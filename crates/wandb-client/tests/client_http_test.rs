//! HTTP integration tests for `WandbClient`.
//!
//! A local axum router stands in for the GraphQL API, the Weave trace server
//! and wandbot, so pagination, shaping and error mapping are exercised over
//! real HTTP round trips.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use secrecy::SecretString;
use serde_json::{json, Value};

use wandb_client::{
    ClientConfig, ClientError, GqlQuery, PlotsHtml, ReportRequest, TraceQuery, WandbApi,
    WandbClient,
};

const TOTAL_CALLS: usize = 120;
const ROOT_CALLS: u64 = 40;
const TOTAL_RUNS: usize = 45;

#[derive(Debug, Default)]
struct MockState {
    graphql_hits: AtomicUsize,
    stream_hits: AtomicUsize,
    /// Respond 503 to this many GraphQL requests before succeeding.
    fail_first: usize,
    /// Reject every request with 401.
    reject_auth: bool,
}

fn call(i: usize) -> Value {
    json!({
        "id": format!("call-{i}"),
        "trace_id": format!("trace-{}", i / 3),
        "op_name": format!("weave:///acme/demo/op/{}:v1", if i % 2 == 0 { "predict" } else { "score" }),
        "started_at": format!("2024-05-01T10:{:02}:00Z", i % 60),
        "ended_at": format!("2024-05-01T10:{:02}:01Z", i % 60),
        "exception": if i % 10 == 0 { json!("boom") } else { Value::Null },
        "inputs": {"prompt": "p".repeat(500)},
        "output": "ok"
    })
}

fn unauthorized() -> Response {
    (StatusCode::UNAUTHORIZED, "invalid api key").into_response()
}

async fn graphql(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if state.reject_auth {
        return unauthorized();
    }
    assert!(headers
        .get("authorization")
        .and_then(|h| h.to_str().ok())
        .is_some_and(|h| h.starts_with("Basic ")));

    let hit = state.graphql_hits.fetch_add(1, Ordering::SeqCst);
    if hit < state.fail_first {
        return (StatusCode::SERVICE_UNAVAILABLE, "try again").into_response();
    }

    let query = body["query"].as_str().unwrap_or_default();
    let variables = &body["variables"];

    if query.contains("query Viewer") {
        return Json(json!({"data": {"viewer": {
            "id": "u1", "username": "ada", "entity": "ada",
            "teams": {"edges": [{"node": {"name": "acme"}}]}
        }}}))
        .into_response();
    }

    if query.contains("upsertView") {
        assert!(variables["spec"].as_str().unwrap().contains("markdown-block"));
        return Json(json!({"data": {"upsertView": {
            "view": {"id": "VmlldzoxMjM=", "name": "n", "displayName": variables["displayName"]},
            "inserted": true
        }}}))
        .into_response();
    }

    if query.contains("EntityProjects") {
        let entity = variables["entity"].as_str().unwrap_or_default();
        return Json(json!({"data": {"models": {
            "edges": [{"node": {"name": format!("{entity}-project"), "entityName": entity,
                                 "description": null, "createdAt": "2024-01-01", "updatedAt": null}}],
            "pageInfo": {"endCursor": null, "hasNextPage": false}
        }}}))
        .into_response();
    }

    if query.contains("brokenField") {
        return Json(json!({"data": null, "errors": [{"message": "Cannot query field 'brokenField'"}]}))
            .into_response();
    }

    // Runs connection paged by numeric cursor.
    let first = variables["first"].as_u64().unwrap_or(10) as usize;
    let start: usize = variables["after"]
        .as_str()
        .and_then(|c| c.parse().ok())
        .unwrap_or(0);
    let end = (start + first).min(TOTAL_RUNS);
    let edges: Vec<Value> = (start..end)
        .map(|i| json!({"cursor": (i + 1).to_string(), "node": {"name": format!("run-{i}")}}))
        .collect();
    Json(json!({"data": {"project": {"runs": {
        "edges": edges,
        "pageInfo": {"endCursor": end.to_string(), "hasNextPage": end < TOTAL_RUNS}
    }}}}))
    .into_response()
}

async fn stream_query(State(state): State<Arc<MockState>>, Json(body): Json<Value>) -> Response {
    if state.reject_auth {
        return unauthorized();
    }
    state.stream_hits.fetch_add(1, Ordering::SeqCst);
    assert_eq!(body["project_id"], "acme/demo");
    assert_eq!(body["sort_by"][0]["field"], "started_at");

    let offset = body["offset"].as_u64().unwrap() as usize;
    let limit = body["limit"].as_u64().unwrap() as usize;
    let lines: Vec<String> = (offset..(offset + limit).min(TOTAL_CALLS))
        .map(|i| call(i).to_string())
        .collect();
    (StatusCode::OK, lines.join("\n")).into_response()
}

async fn query_stats(Json(body): Json<Value>) -> Json<Value> {
    let roots_only = body["filter"]["trace_roots_only"].as_bool().unwrap_or(false);
    Json(json!({"count": if roots_only { ROOT_CALLS } else { TOTAL_CALLS as u64 }}))
}

async fn chat_query(Json(body): Json<Value>) -> Json<Value> {
    assert_eq!(body["application"], "wandb-mcp-server");
    Json(json!({
        "answer": format!("You asked: {}", body["question"].as_str().unwrap()),
        "sources": ["https://docs.wandb.ai/guides/track"]
    }))
}

async fn spawn_mock(state: MockState) -> anyhow::Result<(String, Arc<MockState>)> {
    let state = Arc::new(state);
    let app = Router::new()
        .route("/graphql", post(graphql))
        .route("/calls/stream_query", post(stream_query))
        .route("/calls/query_stats", post(query_stats))
        .route("/chat/query", post(chat_query))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok((format!("http://{addr}"), state))
}

fn client_for(base: &str) -> anyhow::Result<WandbClient> {
    let config = ClientConfig::new(SecretString::from("k".repeat(40)))
        .with_base_url(base)?
        .with_trace_server_url(base)?
        .with_wandbot_url(base)?
        .with_retries(0, 1)
        .with_silent(true);
    Ok(WandbClient::new(config)?)
}

#[tokio::test]
async fn test_trace_query_pages_until_target_limit() -> anyhow::Result<()> {
    let (base, state) = spawn_mock(MockState::default()).await?;
    let client = client_for(&base)?;

    let mut query = TraceQuery::new("acme", "demo");
    query.target_limit = 75;
    let result = client.query_paginated_weave_traces(&query).await?;

    assert_eq!(result.traces.len(), 75);
    assert_eq!(result.metadata.total_traces, 75);
    // 50 + 25
    assert_eq!(state.stream_hits.load(Ordering::SeqCst), 2);
    let prompt = result.traces[0]["inputs"]["prompt"].as_str().unwrap();
    assert_eq!(prompt.chars().count(), 203);
    Ok(())
}

#[tokio::test]
async fn test_trace_query_stops_on_short_page() -> anyhow::Result<()> {
    let (base, state) = spawn_mock(MockState::default()).await?;
    let client = client_for(&base)?;

    let query = TraceQuery::new("acme", "demo");
    let result = client.query_paginated_weave_traces(&query).await?;

    assert_eq!(result.metadata.total_traces, TOTAL_CALLS);
    assert_eq!(result.metadata.status_summary.error, TOTAL_CALLS / 10);
    assert_eq!(result.metadata.op_distribution["predict"], TOTAL_CALLS / 2);
    // 50 + 50 + 20 (short page ends the loop)
    assert_eq!(state.stream_hits.load(Ordering::SeqCst), 3);
    Ok(())
}

#[tokio::test]
async fn test_count_traces_total_and_roots() -> anyhow::Result<()> {
    let (base, _) = spawn_mock(MockState::default()).await?;
    let client = client_for(&base)?;

    let mut filters = wandb_client::TraceFilters::new();
    assert_eq!(client.count_traces("acme", "demo", &filters).await?, 120);
    filters.insert("trace_roots_only".to_string(), json!(true));
    assert_eq!(client.count_traces("acme", "demo", &filters).await?, ROOT_CALLS);
    Ok(())
}

#[tokio::test]
async fn test_graphql_pagination_merges_edges_up_to_max_items() -> anyhow::Result<()> {
    let (base, state) = spawn_mock(MockState::default()).await?;
    let client = client_for(&base)?;

    let query = GqlQuery::new(
        "query Runs($project: String!, $first: Int, $after: String) { project(name: $project) { runs(first: $first, after: $after) { edges { node { name } } pageInfo { endCursor hasNextPage } } } }",
    )
    .with_limits(30, 10);
    let data = client.query_paginated_wandb_gql(&query).await?;

    let edges = data["project"]["runs"]["edges"].as_array().unwrap();
    assert_eq!(edges.len(), 30);
    assert_eq!(edges[29]["node"]["name"], "run-29");
    assert_eq!(state.graphql_hits.load(Ordering::SeqCst), 3);
    Ok(())
}

const RUNS_QUERY: &str = "query Runs($first: Int, $after: String) { project { runs(first: $first, after: $after) { edges { cursor node { name } } pageInfo { endCursor hasNextPage } } } }";

#[tokio::test]
async fn test_graphql_end_cursor_resumes_after_last_returned_edge() -> anyhow::Result<()> {
    let (base, state) = spawn_mock(MockState::default()).await?;
    let client = client_for(&base)?;

    let data = client
        .query_paginated_wandb_gql(&GqlQuery::new(RUNS_QUERY).with_limits(30, 20))
        .await?;
    let runs = &data["project"]["runs"];
    assert_eq!(runs["edges"].as_array().unwrap().len(), 30);
    assert_eq!(runs["edges"][29]["node"]["name"], "run-29");
    assert_eq!(runs["pageInfo"]["endCursor"], "30");
    assert_eq!(runs["pageInfo"]["hasNextPage"], true);
    // 20 + 10, the last page is sized to the remaining budget
    assert_eq!(state.graphql_hits.load(Ordering::SeqCst), 2);

    let mut variables = serde_json::Map::new();
    variables.insert("after".to_string(), runs["pageInfo"]["endCursor"].clone());
    let resumed = client
        .query_paginated_wandb_gql(
            &GqlQuery::new(RUNS_QUERY)
                .with_variables(variables)
                .with_limits(5, 5),
        )
        .await?;
    assert_eq!(resumed["project"]["runs"]["edges"][0]["node"]["name"], "run-30");
    Ok(())
}

#[tokio::test]
async fn test_graphql_caller_page_size_truncation_rewrites_cursor() -> anyhow::Result<()> {
    let (base, _) = spawn_mock(MockState::default()).await?;
    let client = client_for(&base)?;

    let mut variables = serde_json::Map::new();
    variables.insert("first".to_string(), json!(20));
    let data = client
        .query_paginated_wandb_gql(
            &GqlQuery::new(RUNS_QUERY)
                .with_variables(variables)
                .with_limits(30, 20),
        )
        .await?;

    let runs = &data["project"]["runs"];
    assert_eq!(runs["edges"].as_array().unwrap().len(), 30);
    assert_eq!(runs["pageInfo"]["endCursor"], "30");
    assert_eq!(runs["pageInfo"]["hasNextPage"], true);
    Ok(())
}

#[tokio::test]
async fn test_graphql_pagination_exhausts_server() -> anyhow::Result<()> {
    let (base, _) = spawn_mock(MockState::default()).await?;
    let client = client_for(&base)?;

    let query = GqlQuery::new(
        "query Runs($first: Int, $after: String) { project { runs(first: $first, after: $after) { edges { node { name } } pageInfo { endCursor hasNextPage } } } }",
    )
    .with_limits(1000, 20);
    let data = client.query_paginated_wandb_gql(&query).await?;

    assert_eq!(data["project"]["runs"]["edges"].as_array().unwrap().len(), TOTAL_RUNS);
    assert_eq!(data["project"]["runs"]["pageInfo"]["hasNextPage"], false);
    Ok(())
}

#[tokio::test]
async fn test_graphql_errors_are_surfaced() -> anyhow::Result<()> {
    let (base, _) = spawn_mock(MockState::default()).await?;
    let client = client_for(&base)?;

    let err = client
        .query_paginated_wandb_gql(&GqlQuery::new("query { brokenField }"))
        .await
        .unwrap_err();
    match err {
        ClientError::GraphQl { messages } => {
            assert_eq!(messages, vec!["Cannot query field 'brokenField'"]);
        }
        other => panic!("Expected GraphQl error, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn test_list_entity_projects_defaults_to_viewer_entities() -> anyhow::Result<()> {
    let (base, _) = spawn_mock(MockState::default()).await?;
    let client = client_for(&base)?;

    let projects = client.list_entity_projects(None).await?;
    let entities: Vec<&String> = projects.keys().collect();
    assert_eq!(entities, vec!["acme", "ada"]);
    assert_eq!(projects["acme"][0].name, "acme-project");

    let single = client.list_entity_projects(Some("acme")).await?;
    assert_eq!(single.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_create_report_returns_url_and_details() -> anyhow::Result<()> {
    let (base, _) = spawn_mock(MockState::default()).await?;
    let client = client_for(&base)?;

    let mut plots = BTreeMap::new();
    plots.insert("latency".to_string(), "<svg/>".to_string());
    let outcome = client
        .create_report(&ReportRequest {
            entity_name: "acme".to_string(),
            project_name: "demo".to_string(),
            title: "Latency Review".to_string(),
            description: None,
            markdown_report_text: "# Latency\n<!-- plot:latency -->".to_string(),
            plots_html: Some(PlotsHtml::Named(plots)),
        })
        .await?;

    assert_eq!(
        outcome.url,
        "https://wandb.ai/acme/demo/reports/Latency-Review--VmlldzoxMjM="
    );
    assert_eq!(outcome.processing_details, vec!["Embedded plot 'latency' at its marker"]);
    Ok(())
}

#[tokio::test]
async fn test_wandbot_answer() -> anyhow::Result<()> {
    let (base, _) = spawn_mock(MockState::default()).await?;
    let client = client_for(&base)?;

    let answer = client.query_wandbot_api("How do I log a table?").await?;
    assert_eq!(answer["answer"], "You asked: How do I log a table?");

    let err = client.query_wandbot_api("   ").await.unwrap_err();
    assert!(matches!(err, ClientError::InvalidInput(_)));
    Ok(())
}

#[tokio::test]
async fn test_retry_recovers_from_transient_5xx() -> anyhow::Result<()> {
    let (base, state) = spawn_mock(MockState {
        fail_first: 2,
        ..MockState::default()
    })
    .await?;
    let config = ClientConfig::new(SecretString::from("k".repeat(40)))
        .with_base_url(&base)?
        .with_retries(2, 1);
    let client = WandbClient::new(config)?;

    let viewer = client.viewer().await?;
    assert_eq!(viewer.username.as_deref(), Some("ada"));
    assert_eq!(state.graphql_hits.load(Ordering::SeqCst), 3);
    Ok(())
}

#[tokio::test]
async fn test_no_retry_by_default() -> anyhow::Result<()> {
    let (base, state) = spawn_mock(MockState {
        fail_first: 1,
        ..MockState::default()
    })
    .await?;
    let client = client_for(&base)?;

    let err = client.viewer().await.unwrap_err();
    assert!(matches!(err, ClientError::Api { status: 503, .. }));
    assert_eq!(state.graphql_hits.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn test_unauthorized_maps_to_auth_error() -> anyhow::Result<()> {
    let (base, _) = spawn_mock(MockState {
        reject_auth: true,
        ..MockState::default()
    })
    .await?;
    let client = client_for(&base)?;

    let err = client.viewer().await.unwrap_err();
    assert!(matches!(err, ClientError::Auth(ref m) if m.contains("invalid api key")));
    Ok(())
}
