//! GraphQL execution and cursor pagination against the W&B API.
//!
//! A query opts into pagination by declaring an `$after` variable. The
//! engine then walks the first Relay-style connection (`edges` + `pageInfo`)
//! it finds in `data`, following `pageInfo.endCursor` until the server runs
//! out of pages or `max_items` edges have been gathered, and merges every
//! page's edges into the first response.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::error::{ClientError, ClientResult};
use crate::http::HttpTransport;

/// A GraphQL query with pagination limits.
#[derive(Debug, Clone, PartialEq)]
pub struct GqlQuery {
    pub query: String,
    pub variables: Map<String, Value>,
    pub max_items: usize,
    pub items_per_page: usize,
}

impl GqlQuery {
    pub const DEFAULT_MAX_ITEMS: usize = 100;
    pub const DEFAULT_ITEMS_PER_PAGE: usize = 20;

    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            variables: Map::new(),
            max_items: Self::DEFAULT_MAX_ITEMS,
            items_per_page: Self::DEFAULT_ITEMS_PER_PAGE,
        }
    }

    pub fn with_variables(mut self, variables: Map<String, Value>) -> Self {
        self.variables = variables;
        self
    }

    pub fn with_limits(mut self, max_items: usize, items_per_page: usize) -> Self {
        self.max_items = max_items;
        self.items_per_page = items_per_page;
        self
    }
}

#[derive(Debug, Serialize)]
struct GraphQlRequest<'a> {
    query: &'a str,
    variables: &'a Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse {
    data: Option<Value>,
    #[serde(default)]
    errors: Vec<GraphQlErrorEntry>,
}

#[derive(Debug, Deserialize)]
struct GraphQlErrorEntry {
    message: String,
}

/// Execute a single GraphQL round trip, returning the `data` member.
pub(crate) async fn execute(
    transport: &HttpTransport,
    query: &str,
    variables: &Map<String, Value>,
) -> ClientResult<Value> {
    let url = transport.config().graphql_endpoint()?;
    let response: GraphQlResponse = transport
        .post_json(&url, &GraphQlRequest { query, variables })
        .await?;

    if !response.errors.is_empty() {
        return Err(ClientError::GraphQl {
            messages: response.errors.into_iter().map(|e| e.message).collect(),
        });
    }
    response
        .data
        .ok_or_else(|| ClientError::invalid_response("data", "GraphQL response carried no data"))
}

/// Execute a query, following cursor pagination when the query declares `$after`.
pub(crate) async fn query_paginated(
    transport: &HttpTransport,
    request: &GqlQuery,
) -> ClientResult<Value> {
    if request.items_per_page == 0 {
        return Err(ClientError::InvalidInput(
            "items_per_page must be at least 1".to_string(),
        ));
    }

    if !declares_variable(&request.query, "after") {
        return execute(transport, &request.query, &request.variables).await;
    }

    let mut variables = request.variables.clone();
    let owns_first =
        declares_variable(&request.query, "first") && !variables.contains_key("first");
    if owns_first {
        variables.insert("first".to_string(), json!(page_size(request, 0)));
    }

    let mut merged = execute(transport, &request.query, &variables).await?;
    let Some(path) = find_connection_path(&merged) else {
        return Ok(merged);
    };

    let mut page_info = connection_at(&merged, &path)
        .and_then(|c| c.get("pageInfo"))
        .cloned()
        .unwrap_or(Value::Null);
    let mut gathered = edge_count(&merged, &path);
    let mut pages = 1usize;

    while gathered < request.max_items && has_next_page(&page_info) {
        let Some(cursor) = page_info.get("endCursor").filter(|c| !c.is_null()).cloned() else {
            break;
        };
        variables.insert("after".to_string(), cursor);
        if owns_first {
            variables.insert("first".to_string(), json!(page_size(request, gathered)));
        }

        let page = execute(transport, &request.query, &variables).await?;
        let connection = connection_at(&page, &path).ok_or_else(|| {
            ClientError::invalid_response(path.join("."), "connection missing from later page")
        })?;
        let new_edges = connection
            .get("edges")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        page_info = connection.get("pageInfo").cloned().unwrap_or(Value::Null);
        pages += 1;

        if new_edges.is_empty() {
            break;
        }
        gathered += new_edges.len();
        if let Some(edges) = edges_mut(&mut merged, &path) {
            edges.extend(new_edges);
        }
    }

    // A caller-fixed `first` can overshoot; resume from the last kept edge.
    if let Some(edges) = edges_mut(&mut merged, &path) {
        if edges.len() > request.max_items {
            edges.truncate(request.max_items);
            page_info = resume_page_info(page_info, edges.last());
        }
    }
    if let Some(Value::Object(connection)) = connection_at_mut(&mut merged, &path) {
        connection.insert("pageInfo".to_string(), page_info);
    }

    debug!(
        connection = %path.join("."),
        pages,
        items = edge_count(&merged, &path),
        "Paginated GraphQL query complete"
    );
    Ok(merged)
}

/// Page size for the next request, never asking past `max_items`.
fn page_size(request: &GqlQuery, gathered: usize) -> usize {
    request
        .items_per_page
        .min(request.max_items.saturating_sub(gathered))
        .max(1)
}

/// Point `pageInfo` at the last kept edge after truncation.
fn resume_page_info(page_info: Value, last_kept: Option<&Value>) -> Value {
    let mut info = match page_info {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    let cursor = last_kept
        .and_then(|edge| edge.get("cursor"))
        .cloned()
        .unwrap_or(Value::Null);
    info.insert("endCursor".to_string(), cursor);
    info.insert("hasNextPage".to_string(), Value::Bool(true));
    Value::Object(info)
}

/// Whether the operation declares `$<name>` as a variable.
fn declares_variable(query: &str, name: &str) -> bool {
    let needle = format!("${name}");
    query.match_indices(&needle).any(|(idx, _)| {
        query[idx + needle.len()..]
            .chars()
            .next()
            .map_or(true, |c| !(c.is_alphanumeric() || c == '_'))
    })
}

/// Depth-first search (object members only) for the first connection object.
fn find_connection_path(value: &Value) -> Option<Vec<String>> {
    let Value::Object(map) = value else {
        return None;
    };
    for (key, child) in map {
        if let Value::Object(inner) = child {
            if inner.get("edges").is_some_and(Value::is_array) {
                return Some(vec![key.clone()]);
            }
            if let Some(mut rest) = find_connection_path(child) {
                rest.insert(0, key.clone());
                return Some(rest);
            }
        }
    }
    None
}

fn connection_at<'a>(value: &'a Value, path: &[String]) -> Option<&'a Value> {
    path.iter().try_fold(value, |v, key| v.get(key))
}

fn connection_at_mut<'a>(value: &'a mut Value, path: &[String]) -> Option<&'a mut Value> {
    path.iter().try_fold(value, |v, key| v.get_mut(key))
}

fn edges_mut<'a>(value: &'a mut Value, path: &[String]) -> Option<&'a mut Vec<Value>> {
    connection_at_mut(value, path)?
        .get_mut("edges")
        .and_then(Value::as_array_mut)
}

fn edge_count(value: &Value, path: &[String]) -> usize {
    connection_at(value, path)
        .and_then(|c| c.get("edges"))
        .and_then(Value::as_array)
        .map_or(0, Vec::len)
}

fn has_next_page(page_info: &Value) -> bool {
    page_info
        .get("hasNextPage")
        .and_then(Value::as_bool)
        .unwrap_or(false)
}
