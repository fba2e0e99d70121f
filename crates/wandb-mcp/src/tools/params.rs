//! Parameter and response structs for all MCP tools.

use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use wandb_client::{ClientError, GqlQuery, PlotsHtml, ReportRequest, SortDirection, TraceQuery};

// ── query_weave_traces_tool ──

/// Parameters for the `query_weave_traces_tool` tool.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct QueryWeaveTracesParams {
    /// W&B entity (team or username) that owns the project.
    #[schemars(description = "W&B entity (team or username) that owns the project")]
    pub entity_name: String,
    /// Project containing the Weave traces.
    #[schemars(description = "W&B project containing the Weave traces")]
    pub project_name: String,
    /// Trace filters.
    #[schemars(
        description = "Filters: op_name, op_name_contains, trace_id, status (success|error|running), \
                       time_range {start, end}, has_exception, trace_roots_only, or native Weave \
                       keys such as op_names, trace_ids, call_ids, parent_ids"
    )]
    #[serde(default)]
    pub filters: BTreeMap<String, Value>,
    /// Field to sort by (defaults to "started_at").
    #[schemars(description = "Field to sort by (defaults to 'started_at')")]
    #[serde(default = "default_sort_by")]
    pub sort_by: String,
    /// "asc" or "desc" (defaults to "desc").
    #[schemars(description = "Sort direction: 'asc' or 'desc' (defaults to 'desc')")]
    #[serde(default = "default_sort_direction")]
    pub sort_direction: String,
    /// Maximum number of traces to return.
    #[schemars(description = "Maximum number of traces to return (defaults to effectively unlimited)")]
    #[serde(default = "default_limit")]
    pub limit: u64,
    #[schemars(description = "Include token cost data (defaults to true)")]
    #[serde(default = "default_true")]
    pub include_costs: bool,
    #[schemars(description = "Include feedback attached to traces (defaults to true)")]
    #[serde(default = "default_true")]
    pub include_feedback: bool,
    /// Top-level fields to keep on each trace.
    #[schemars(description = "Top-level trace fields to return; empty returns all fields")]
    #[serde(default)]
    pub columns: Vec<String>,
    #[schemars(description = "Reference columns the server should expand inline")]
    #[serde(default)]
    pub expand_columns: Vec<String>,
    /// Characters kept in long string values.
    #[schemars(
        description = "Maximum characters kept in string values of inputs/output/attributes/summary \
                       (defaults to 200; 0 empties them)"
    )]
    #[serde(default = "default_truncate_length")]
    pub truncate_length: usize,
    #[schemars(description = "Return untruncated trace payloads (defaults to false)")]
    #[serde(default)]
    pub return_full_data: bool,
    #[schemars(description = "Return only aggregate metadata, no individual traces (defaults to false)")]
    #[serde(default)]
    pub metadata_only: bool,
}

fn default_sort_by() -> String {
    TraceQuery::DEFAULT_SORT_BY.to_string()
}

fn default_sort_direction() -> String {
    SortDirection::Desc.to_string()
}

fn default_limit() -> u64 {
    TraceQuery::DEFAULT_TARGET_LIMIT
}

fn default_truncate_length() -> usize {
    TraceQuery::DEFAULT_TRUNCATE_LENGTH
}

fn default_true() -> bool {
    true
}

impl TryFrom<QueryWeaveTracesParams> for TraceQuery {
    type Error = ClientError;

    /// Chunk size is fixed server-side; callers only choose the total limit.
    fn try_from(p: QueryWeaveTracesParams) -> Result<Self, Self::Error> {
        let sort_direction: SortDirection = p.sort_direction.parse()?;
        let mut query = TraceQuery::new(p.entity_name, p.project_name);
        query.chunk_size = TraceQuery::DEFAULT_CHUNK_SIZE;
        query.filters = p.filters.into_iter().collect();
        query.sort_by = p.sort_by;
        query.sort_direction = sort_direction;
        query.target_limit = p.limit;
        query.include_costs = p.include_costs;
        query.include_feedback = p.include_feedback;
        query.columns = p.columns;
        query.expand_columns = p.expand_columns;
        query.truncate_length = p.truncate_length;
        query.return_full_data = p.return_full_data;
        query.metadata_only = p.metadata_only;
        Ok(query)
    }
}

// ── count_weave_traces_tool ──

/// Parameters for the `count_weave_traces_tool` tool.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct CountWeaveTracesParams {
    #[schemars(description = "W&B entity (team or username) that owns the project")]
    pub entity_name: String,
    #[schemars(description = "W&B project containing the Weave traces")]
    pub project_name: String,
    /// Same filter keys as `query_weave_traces_tool`.
    #[schemars(description = "Filters, using the same keys as query_weave_traces_tool")]
    #[serde(default)]
    pub filters: Option<BTreeMap<String, Value>>,
}

/// Response for the `count_weave_traces_tool` tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceCountResponse {
    pub total_count: u64,
    /// Same filters with `trace_roots_only` forced on.
    pub root_traces_count: u64,
}

// ── query_wandb_tool ──

/// Parameters for the `query_wandb_tool` tool.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct QueryWandbParams {
    /// GraphQL query text.
    #[schemars(description = "GraphQL query; declare $first and $after to enable cursor pagination")]
    pub query: String,
    #[schemars(description = "Variables for the query")]
    #[serde(default)]
    pub variables: Option<BTreeMap<String, Value>>,
    #[schemars(description = "Maximum number of connection edges to collect (defaults to 100)")]
    #[serde(default = "default_max_items")]
    pub max_items: usize,
    #[schemars(description = "Edges fetched per page (defaults to 20)")]
    #[serde(default = "default_items_per_page")]
    pub items_per_page: usize,
}

fn default_max_items() -> usize {
    GqlQuery::DEFAULT_MAX_ITEMS
}

fn default_items_per_page() -> usize {
    GqlQuery::DEFAULT_ITEMS_PER_PAGE
}

impl From<QueryWandbParams> for GqlQuery {
    fn from(p: QueryWandbParams) -> Self {
        GqlQuery::new(p.query)
            .with_variables(p.variables.unwrap_or_default().into_iter().collect())
            .with_limits(p.max_items, p.items_per_page)
    }
}

// ── create_wandb_report_tool ──

/// HTML plots: one fragment, or fragments keyed by marker name.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum PlotsHtmlParam {
    Single(String),
    Named(BTreeMap<String, String>),
}

impl From<PlotsHtmlParam> for PlotsHtml {
    fn from(p: PlotsHtmlParam) -> Self {
        match p {
            PlotsHtmlParam::Single(html) => PlotsHtml::Single(html),
            PlotsHtmlParam::Named(named) => PlotsHtml::Named(named),
        }
    }
}

/// Parameters for the `create_wandb_report_tool` tool.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct CreateReportParams {
    #[schemars(description = "W&B entity that will own the report")]
    pub entity_name: String,
    #[schemars(description = "W&B project the report belongs to")]
    pub project_name: String,
    #[schemars(description = "Report title")]
    pub title: String,
    #[schemars(description = "Short description shown under the title")]
    pub description: Option<String>,
    /// Markdown body.
    #[schemars(
        description = "Markdown body of the report. Place <!-- plot:NAME --> where a named plot should go"
    )]
    #[serde(default)]
    pub markdown_report_text: String,
    #[schemars(
        description = "HTML plots: a single HTML string appended to the report, or an object mapping \
                       plot names to HTML"
    )]
    pub plots_html: Option<PlotsHtmlParam>,
}

impl From<CreateReportParams> for ReportRequest {
    fn from(p: CreateReportParams) -> Self {
        ReportRequest {
            entity_name: p.entity_name,
            project_name: p.project_name,
            title: p.title,
            description: p.description,
            markdown_report_text: p.markdown_report_text,
            plots_html: p.plots_html.map(Into::into),
        }
    }
}

// ── query_wandb_entity_projects ──

/// Parameters for the `query_wandb_entity_projects` tool.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct EntityProjectsParams {
    /// Entity to list; defaults to the caller's own entity and teams.
    #[schemars(description = "Entity to list projects for; omit for your own entity and teams")]
    pub entity: Option<String>,
}

// ── query_wandb_support_bot ──

/// Parameters for the `query_wandb_support_bot` tool.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct SupportBotParams {
    #[schemars(description = "Question about W&B or Weave features, APIs or usage")]
    pub question: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_query_params_defaults() {
        let params: QueryWeaveTracesParams =
            serde_json::from_value(json!({"entity_name": "acme", "project_name": "demo"})).unwrap();
        let query = TraceQuery::try_from(params).unwrap();

        assert_eq!(query.chunk_size, 50);
        assert_eq!(query.sort_by, "started_at");
        assert_eq!(query.sort_direction, SortDirection::Desc);
        assert_eq!(query.target_limit, 10_000_000);
        assert_eq!(query.truncate_length, 200);
        assert!(query.include_costs);
        assert!(query.include_feedback);
        assert!(!query.return_full_data);
        assert!(!query.metadata_only);
        assert!(query.filters.is_empty());
    }

    #[test]
    fn test_query_params_invalid_direction() {
        let params: QueryWeaveTracesParams = serde_json::from_value(json!({
            "entity_name": "acme", "project_name": "demo", "sort_direction": "sideways"
        }))
        .unwrap();
        assert!(TraceQuery::try_from(params).is_err());
    }

    #[test]
    fn test_plots_html_untagged() {
        let single: PlotsHtmlParam = serde_json::from_value(json!("<div/>")).unwrap();
        assert_eq!(PlotsHtml::from(single), PlotsHtml::Single("<div/>".to_string()));

        let named: PlotsHtmlParam = serde_json::from_value(json!({"loss": "<svg/>"})).unwrap();
        match PlotsHtml::from(named) {
            PlotsHtml::Named(map) => assert_eq!(map["loss"], "<svg/>"),
            other => panic!("Expected named plots, got {other:?}"),
        }
    }

    #[test]
    fn test_gql_params_defaults() {
        let params: QueryWandbParams =
            serde_json::from_value(json!({"query": "query { viewer { id } }"})).unwrap();
        let query = GqlQuery::from(params);
        assert_eq!(query.max_items, 100);
        assert_eq!(query.items_per_page, 20);
        assert!(query.variables.is_empty());
    }
}
