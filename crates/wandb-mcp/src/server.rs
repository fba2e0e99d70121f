//! MCP ServerHandler implementation for Weights & Biases.
//!
//! One [`WandbMcpServer`] value backs both transports. Tools:
//!
//! - `query_weave_traces_tool`: paginated Weave trace query with metadata and truncation
//! - `count_weave_traces_tool`: total and root-only trace counts
//! - `query_wandb_tool`: raw W&B GraphQL with cursor pagination
//! - `create_wandb_report_tool`: save a markdown/HTML report
//! - `query_wandb_entity_projects`: projects per entity
//! - `query_wandb_support_bot`: ask wandbot
//!
//! Collaborator failures are logged and returned as tool results flagged
//! `is_error`, with text `Error <action>: <message>`. Only malformed
//! arguments become protocol errors.

use std::sync::Arc;

use rmcp::handler::server::router::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::{
    CallToolResult, Content, Implementation, ProtocolVersion, ServerCapabilities, ServerInfo, Tool,
};
use rmcp::{tool, tool_handler, tool_router, ErrorData as McpError, ServerHandler};
use serde_json::Value;
use tracing::debug;

use wandb_client::weave::TRACE_ROOTS_ONLY;
use wandb_client::{GqlQuery, ReportRequest, TraceFilters, TraceQuery, WandbApi};

use crate::tools::*;

/// Every tool name, in registration order.
pub const TOOL_NAMES: [&str; 6] = [
    "query_weave_traces_tool",
    "count_weave_traces_tool",
    "query_wandb_tool",
    "create_wandb_report_tool",
    "query_wandb_entity_projects",
    "query_wandb_support_bot",
];

/// W&B MCP server handler.
#[derive(Debug, Clone)]
pub struct WandbMcpServer {
    tool_router: ToolRouter<Self>,
    api: Arc<dyn WandbApi>,
}

impl WandbMcpServer {
    pub fn new(api: Arc<dyn WandbApi>) -> Self {
        Self {
            tool_router: Self::tool_router(),
            api,
        }
    }

    /// Registered tool definitions (name, description, input schema).
    pub fn tools(&self) -> Vec<Tool> {
        self.tool_router.list_all()
    }
}

#[tool_handler(router = self.tool_router)]
impl ServerHandler for WandbMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2025_03_26,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "wandb-mcp".to_string(),
                title: Some("Weights & Biases MCP Server".to_string()),
                version: env!("CARGO_PKG_VERSION").to_string(),
                description: Some(
                    "Query W&B runs and Weave traces, create reports, and ask the W&B support bot"
                        .to_string(),
                ),
                icons: None,
                website_url: Some("https://wandb.ai".to_string()),
            },
            instructions: Some(
                "Tools for Weights & Biases (W&B) experiment tracking and Weave LLM tracing.\n\
                 Start with query_wandb_entity_projects to discover entities and projects.\n\
                 For Weave traces: count_weave_traces_tool first to size the result, then \
                 query_weave_traces_tool with filters, a limit, and metadata_only=true for overviews.\n\
                 For runs, sweeps, artifacts and metrics: query_wandb_tool with GraphQL; declare \
                 $first and $after to page through connections.\n\
                 To share findings: create_wandb_report_tool with markdown and optional HTML plots.\n\
                 For questions about W&B or Weave features: query_wandb_support_bot.\n\
                 Failed calls return a result flagged as an error whose text starts with 'Error '."
                    .to_string(),
            ),
        }
    }
}

#[tool_router(router = tool_router)]
impl WandbMcpServer {
    /// Query Weave traces with pagination, filtering and payload shaping.
    #[tool(
        name = "query_weave_traces_tool",
        description = "Query Weave traces (LLM calls, evaluations, agent steps) in a W&B project. \
Returns JSON with `metadata` (total_traces, status_summary, op_distribution, token_counts, \
time_range) and `traces`. Filter with op_name, op_name_contains, trace_id, status \
(success|error|running), time_range {start, end}, has_exception or trace_roots_only. \
Long string values are truncated to truncate_length characters unless return_full_data is true. \
Use metadata_only=true and a small limit for an overview before pulling full traces; call \
count_weave_traces_tool first when the project may be large."
    )]
    pub async fn query_weave_traces_tool(
        &self,
        Parameters(params): Parameters<QueryWeaveTracesParams>,
    ) -> Result<CallToolResult, McpError> {
        const TOOL: &str = "query_weave_traces_tool";
        let query =
            TraceQuery::try_from(params).map_err(|e| McpError::invalid_params(e.to_string(), None))?;
        debug!(
            tool = TOOL,
            entity = %query.entity_name,
            project = %query.project_name,
            limit = query.target_limit,
            "Querying Weave traces"
        );

        match self.api.query_paginated_weave_traces(&query).await {
            Ok(result) => Ok(json_result(TOOL, &result)),
            Err(e) => Ok(tool_failure(TOOL, "querying traces", &e)),
        }
    }

    /// Count traces, both overall and root-only, under one filter set.
    #[tool(
        name = "count_weave_traces_tool",
        description = "Count Weave traces in a W&B project. Returns JSON {\"total_count\", \
\"root_traces_count\"}: the number of calls matching the filters, and how many of those are \
trace roots (top-level calls). Accepts the same filters as query_weave_traces_tool. Cheap; use \
it before querying to pick a sensible limit."
    )]
    pub async fn count_weave_traces_tool(
        &self,
        Parameters(params): Parameters<CountWeaveTracesParams>,
    ) -> Result<CallToolResult, McpError> {
        const TOOL: &str = "count_weave_traces_tool";
        let filters: TraceFilters = params.filters.unwrap_or_default().into_iter().collect();

        let total_count = match self
            .api
            .count_traces(&params.entity_name, &params.project_name, &filters)
            .await
        {
            Ok(count) => count,
            Err(e) => return Ok(tool_failure(TOOL, "counting traces", &e)),
        };

        let mut root_filters = filters;
        root_filters.insert(TRACE_ROOTS_ONLY.to_string(), Value::Bool(true));
        let root_traces_count = match self
            .api
            .count_traces(&params.entity_name, &params.project_name, &root_filters)
            .await
        {
            Ok(count) => count,
            Err(e) => return Ok(tool_failure(TOOL, "counting traces", &e)),
        };

        Ok(json_result(
            TOOL,
            &TraceCountResponse {
                total_count,
                root_traces_count,
            },
        ))
    }

    /// Run a W&B GraphQL query, following cursors when the query asks for it.
    #[tool(
        name = "query_wandb_tool",
        description = "Run a GraphQL query against the W&B API (projects, runs, sweeps, artifacts, \
reports, run history and summary metrics). To page through a connection, declare `$first: Int` \
and `$after: String` variables and select `edges { node { ... } }` plus \
`pageInfo { endCursor hasNextPage }`; pages are fetched items_per_page at a time and merged until \
max_items edges are collected. Returns the merged `data` object as JSON."
    )]
    pub async fn query_wandb_tool(
        &self,
        Parameters(params): Parameters<QueryWandbParams>,
    ) -> Result<CallToolResult, McpError> {
        const TOOL: &str = "query_wandb_tool";
        let query = GqlQuery::from(params);
        debug!(
            tool = TOOL,
            max_items = query.max_items,
            items_per_page = query.items_per_page,
            "Running W&B GraphQL query"
        );

        match self.api.query_paginated_wandb_gql(&query).await {
            Ok(data) => Ok(json_result(TOOL, &data)),
            Err(e) => Ok(tool_failure(TOOL, "querying W&B", &e)),
        }
    }

    /// Save a report and return its URL.
    #[tool(
        name = "create_wandb_report_tool",
        description = "Create a W&B report from markdown. plots_html may be a single HTML string \
(appended at the end) or an object mapping plot names to HTML; each named plot replaces a \
`<!-- plot:NAME -->` marker in the markdown, and plots without a marker are appended. Returns the \
report URL followed by any processing notes about how the content was laid out."
    )]
    pub async fn create_wandb_report_tool(
        &self,
        Parameters(params): Parameters<CreateReportParams>,
    ) -> Result<CallToolResult, McpError> {
        const TOOL: &str = "create_wandb_report_tool";
        let request = ReportRequest::from(params);
        debug!(
            tool = TOOL,
            entity = %request.entity_name,
            project = %request.project_name,
            "Creating report"
        );

        match self.api.create_report(&request).await {
            Ok(outcome) => Ok(CallToolResult::success(vec![Content::text(report_message(
                &outcome,
            ))])),
            Err(e) => Ok(tool_failure(TOOL, "creating report", &e)),
        }
    }

    /// List projects for an entity, or for the caller's own entity and teams.
    #[tool(
        name = "query_wandb_entity_projects",
        description = "List W&B projects grouped by entity. With no entity, lists the projects of \
your own entity and every team you belong to. Returns JSON mapping each entity name to its \
projects (name, entity, description, created_at, updated_at). Use it to find the right \
entity_name/project_name before calling other tools."
    )]
    pub async fn query_wandb_entity_projects(
        &self,
        Parameters(params): Parameters<EntityProjectsParams>,
    ) -> Result<CallToolResult, McpError> {
        const TOOL: &str = "query_wandb_entity_projects";
        match self.api.list_entity_projects(params.entity.as_deref()).await {
            Ok(projects) => Ok(json_result(TOOL, &projects)),
            Err(e) => Ok(tool_failure(TOOL, "listing entity projects", &e)),
        }
    }

    /// Ask wandbot, the W&B documentation support bot.
    #[tool(
        name = "query_wandb_support_bot",
        description = "Ask wandbot, the W&B support bot, a question about Weights & Biases, Weave, \
or their SDKs and integrations. Returns the bot's JSON answer, including source links when \
available. Use it for how-to and API questions, not for querying your own data."
    )]
    pub async fn query_wandb_support_bot(
        &self,
        Parameters(params): Parameters<SupportBotParams>,
    ) -> Result<CallToolResult, McpError> {
        const TOOL: &str = "query_wandb_support_bot";
        match self.api.query_wandbot_api(&params.question).await {
            Ok(answer) => Ok(json_result(TOOL, &answer)),
            Err(e) => Ok(tool_failure(TOOL, "querying wandbot", &e)),
        }
    }
}
