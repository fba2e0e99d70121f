//! Production [`WandbApi`] implementation over HTTP.

use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

use crate::api::WandbApi;
use crate::config::ClientConfig;
use crate::error::ClientResult;
use crate::graphql::{self, GqlQuery};
use crate::http::HttpTransport;
use crate::projects::{self, EntityProjects, Viewer};
use crate::reports::{self, ReportOutcome, ReportRequest};
use crate::wandbot;
use crate::weave::{self, QueryResult, TraceFilters, TraceQuery};

/// Client for the W&B GraphQL, Weave trace server and wandbot APIs.
///
/// Cheap to clone; clones share the underlying connection pool.
#[derive(Debug, Clone)]
pub struct WandbClient {
    transport: HttpTransport,
}

impl WandbClient {
    pub fn new(config: ClientConfig) -> ClientResult<Self> {
        Ok(Self {
            transport: HttpTransport::new(config)?,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        self.transport.config()
    }

    /// Verify the API key by resolving the viewer.
    pub async fn login(&self) -> ClientResult<Viewer> {
        let viewer = projects::viewer(&self.transport).await?;
        if !self.config().silent {
            info!(
                username = viewer.username.as_deref().unwrap_or("unknown"),
                entity = viewer.entity.as_deref().unwrap_or("unknown"),
                "Currently logged in to W&B"
            );
        }
        Ok(viewer)
    }
}

#[async_trait]
impl WandbApi for WandbClient {
    async fn query_paginated_weave_traces(&self, query: &TraceQuery) -> ClientResult<QueryResult> {
        weave::query_paginated_traces(&self.transport, query).await
    }

    async fn count_traces(
        &self,
        entity_name: &str,
        project_name: &str,
        filters: &TraceFilters,
    ) -> ClientResult<u64> {
        weave::count_traces(&self.transport, entity_name, project_name, filters).await
    }

    async fn query_paginated_wandb_gql(&self, query: &GqlQuery) -> ClientResult<Value> {
        graphql::query_paginated(&self.transport, query).await
    }

    async fn create_report(&self, request: &ReportRequest) -> ClientResult<ReportOutcome> {
        reports::create_report(&self.transport, request).await
    }

    async fn list_entity_projects(&self, entity: Option<&str>) -> ClientResult<EntityProjects> {
        projects::list_entity_projects(&self.transport, entity).await
    }

    async fn query_wandbot_api(&self, question: &str) -> ClientResult<Value> {
        wandbot::query_wandbot(&self.transport, question).await
    }

    async fn viewer(&self) -> ClientResult<Viewer> {
        self.login().await
    }
}
