//! Calls queries against the Weave trace server.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::filter::{translate, CallsFilter, TraceFilters};
use super::{project_id, shape, QueryResult, SortDirection, TraceQuery};
use crate::error::{ClientError, ClientResult};
use crate::http::HttpTransport;

const STREAM_QUERY_PATH: &str = "calls/stream_query";
const QUERY_STATS_PATH: &str = "calls/query_stats";

/// Fields the metadata summary needs even when the caller projects columns.
const SUMMARY_COLUMNS: &[&str] = &[
    "id",
    "trace_id",
    "parent_id",
    "op_name",
    "started_at",
    "ended_at",
    "exception",
    "summary",
];

#[derive(Debug, Serialize)]
struct SortBy<'a> {
    field: &'a str,
    direction: SortDirection,
}

#[derive(Debug, Serialize)]
struct CallsQueryRequest<'a> {
    project_id: String,
    filter: &'a CallsFilter,
    #[serde(skip_serializing_if = "Option::is_none")]
    query: Option<&'a Value>,
    sort_by: Vec<SortBy<'a>>,
    limit: u64,
    offset: u64,
    include_costs: bool,
    include_feedback: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    columns: Option<Vec<String>>,
    #[serde(skip_serializing_if = "no_columns")]
    expand_columns: &'a [String],
}

#[derive(Debug, Serialize)]
struct CallsQueryStatsRequest<'a> {
    project_id: String,
    filter: &'a CallsFilter,
    #[serde(skip_serializing_if = "Option::is_none")]
    query: Option<&'a Value>,
}

#[derive(Debug, Deserialize)]
struct CallsQueryStatsResponse {
    count: u64,
}

/// Page through matching calls `chunk_size` at a time, then shape the result.
pub(crate) async fn query_paginated_traces(
    transport: &HttpTransport,
    query: &TraceQuery,
) -> ClientResult<QueryResult> {
    if query.chunk_size == 0 {
        return Err(ClientError::InvalidInput(
            "chunk_size must be at least 1".to_string(),
        ));
    }

    let translated = translate(&query.entity_name, &query.project_name, &query.filters)?;
    let url = transport.config().trace_endpoint(STREAM_QUERY_PATH)?;
    let columns = server_columns(&query.columns);

    let mut calls: Vec<Value> = Vec::new();
    let mut offset: u64 = 0;
    let chunk = query.chunk_size as u64;

    while (calls.len() as u64) < query.target_limit {
        let remaining = query.target_limit - calls.len() as u64;
        let page_size = chunk.min(remaining);

        let request = CallsQueryRequest {
            project_id: query.project_id(),
            filter: &translated.filter,
            query: translated.query.as_ref(),
            sort_by: vec![SortBy {
                field: &query.sort_by,
                direction: query.sort_direction,
            }],
            limit: page_size,
            offset,
            include_costs: query.include_costs,
            include_feedback: query.include_feedback,
            columns: columns.clone(),
            expand_columns: &query.expand_columns,
        };

        let body = transport.post_text(&url, &request).await?;
        let page = parse_jsonl(&body)?;
        let received = page.len() as u64;
        debug!(
            project = %query.project_id(),
            offset,
            received,
            "Fetched calls page"
        );

        calls.extend(page);
        offset += received;
        if received < page_size {
            break;
        }
    }

    Ok(shape::build_result(calls, query))
}

/// Count calls matching `filters`.
pub(crate) async fn count_traces(
    transport: &HttpTransport,
    entity: &str,
    project: &str,
    filters: &TraceFilters,
) -> ClientResult<u64> {
    let translated = translate(entity, project, filters)?;
    let url = transport.config().trace_endpoint(QUERY_STATS_PATH)?;
    let request = CallsQueryStatsRequest {
        project_id: project_id(entity, project),
        filter: &translated.filter,
        query: translated.query.as_ref(),
    };
    let response: CallsQueryStatsResponse = transport.post_json(&url, &request).await?;
    Ok(response.count)
}

fn no_columns(columns: &&[String]) -> bool {
    columns.is_empty()
}

/// Requested columns plus the ones the metadata summary reads.
fn server_columns(requested: &[String]) -> Option<Vec<String>> {
    if requested.is_empty() {
        return None;
    }
    let mut columns: Vec<String> = requested.to_vec();
    for required in SUMMARY_COLUMNS {
        if !columns.iter().any(|c| c == required) {
            columns.push((*required).to_string());
        }
    }
    Some(columns)
}

/// Parse a newline-delimited JSON body, skipping blank lines.
fn parse_jsonl(body: &str) -> ClientResult<Vec<Value>> {
    body.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| serde_json::from_str(line).map_err(ClientError::from))
        .collect()
}
