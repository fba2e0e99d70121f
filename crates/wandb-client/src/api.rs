//! The collaborator seam between tool handlers and the remote services.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::ClientResult;
use crate::graphql::GqlQuery;
use crate::projects::{EntityProjects, Viewer};
use crate::reports::{ReportOutcome, ReportRequest};
use crate::weave::{QueryResult, TraceFilters, TraceQuery};

/// Every remote operation the MCP tools depend on.
///
/// Each call is one independent request/response exchange (or a sequence
/// of read-only page fetches); no local state is staged between calls.
#[async_trait]
pub trait WandbApi: Send + Sync + std::fmt::Debug {
    /// Paginated, optionally shaped query over a project's Weave calls.
    async fn query_paginated_weave_traces(&self, query: &TraceQuery) -> ClientResult<QueryResult>;

    /// Number of calls matching `filters`.
    async fn count_traces(
        &self,
        entity_name: &str,
        project_name: &str,
        filters: &TraceFilters,
    ) -> ClientResult<u64>;

    /// GraphQL query with cursor pagination; returns the merged `data` object.
    async fn query_paginated_wandb_gql(&self, query: &GqlQuery) -> ClientResult<Value>;

    async fn create_report(&self, request: &ReportRequest) -> ClientResult<ReportOutcome>;

    /// Projects per entity; `None` lists the viewer's own entity and teams.
    async fn list_entity_projects(&self, entity: Option<&str>) -> ClientResult<EntityProjects>;

    async fn query_wandbot_api(&self, question: &str) -> ClientResult<Value>;

    /// The user the API key authenticates as.
    async fn viewer(&self) -> ClientResult<Viewer>;
}
