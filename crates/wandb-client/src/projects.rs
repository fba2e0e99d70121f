//! Viewer lookup and entity/project listing over GraphQL.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::error::{ClientError, ClientResult};
use crate::graphql::{self, GqlQuery};
use crate::http::HttpTransport;

const VIEWER_QUERY: &str = r#"query Viewer {
  viewer {
    id
    username
    entity
    teams { edges { node { name } } }
  }
}"#;

const PROJECTS_QUERY: &str = r#"query EntityProjects($entity: String!, $first: Int, $after: String) {
  models(entityName: $entity, first: $first, after: $after) {
    edges { node { name entityName description createdAt updatedAt } }
    pageInfo { endCursor hasNextPage }
  }
}"#;

const PROJECTS_PAGE_SIZE: usize = 100;
const PROJECTS_MAX: usize = 10_000;

/// The authenticated user behind the API key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Viewer {
    pub id: String,
    pub username: Option<String>,
    /// The viewer's personal entity.
    pub entity: Option<String>,
    /// Team entities the viewer belongs to.
    pub teams: Vec<String>,
}

impl Viewer {
    /// Personal entity first, then teams, without duplicates.
    pub fn entities(&self) -> Vec<String> {
        let mut entities: Vec<String> = self.entity.iter().cloned().collect();
        for team in &self.teams {
            if !entities.contains(team) {
                entities.push(team.clone());
            }
        }
        entities
    }
}

/// One project as reported by the entity listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectSummary {
    pub name: String,
    pub entity: String,
    pub description: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

/// Entity name → its projects.
pub type EntityProjects = BTreeMap<String, Vec<ProjectSummary>>;

#[derive(Debug, Deserialize)]
struct ViewerData {
    viewer: Option<ViewerNode>,
}

#[derive(Debug, Deserialize)]
struct ViewerNode {
    id: String,
    username: Option<String>,
    entity: Option<String>,
    teams: Option<Connection<TeamNode>>,
}

#[derive(Debug, Deserialize)]
struct TeamNode {
    name: String,
}

#[derive(Debug, Deserialize)]
struct Connection<T> {
    #[serde(default = "Vec::new")]
    edges: Vec<Edge<T>>,
}

#[derive(Debug, Deserialize)]
struct Edge<T> {
    node: T,
}

#[derive(Debug, Deserialize)]
struct ProjectsData {
    models: Option<Connection<ProjectNode>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProjectNode {
    name: String,
    entity_name: Option<String>,
    description: Option<String>,
    created_at: Option<String>,
    updated_at: Option<String>,
}

pub(crate) async fn viewer(transport: &HttpTransport) -> ClientResult<Viewer> {
    let data = graphql::execute(transport, VIEWER_QUERY, &Map::new()).await?;
    let data: ViewerData = serde_json::from_value(data)?;
    let node = data.viewer.ok_or_else(|| {
        ClientError::Auth("API key was not accepted: viewer is null".to_string())
    })?;

    Ok(Viewer {
        id: node.id,
        username: node.username,
        entity: node.entity,
        teams: node
            .teams
            .map(|t| t.edges.into_iter().map(|e| e.node.name).collect())
            .unwrap_or_default(),
    })
}

pub(crate) async fn list_entity_projects(
    transport: &HttpTransport,
    entity: Option<&str>,
) -> ClientResult<EntityProjects> {
    let entities = match entity.map(str::trim).filter(|e| !e.is_empty()) {
        Some(entity) => vec![entity.to_string()],
        None => {
            let viewer = viewer(transport).await?;
            let entities = viewer.entities();
            if entities.is_empty() {
                return Err(ClientError::invalid_response(
                    "viewer.entity",
                    "the authenticated user has no default entity",
                ));
            }
            entities
        }
    };

    let mut result = EntityProjects::new();
    for entity in entities {
        let projects = projects_for(transport, &entity).await?;
        debug!(entity = %entity, count = projects.len(), "Listed projects");
        result.insert(entity, projects);
    }
    Ok(result)
}

async fn projects_for(transport: &HttpTransport, entity: &str) -> ClientResult<Vec<ProjectSummary>> {
    let mut variables = Map::new();
    variables.insert("entity".to_string(), json!(entity));
    let request = GqlQuery::new(PROJECTS_QUERY)
        .with_variables(variables)
        .with_limits(PROJECTS_MAX, PROJECTS_PAGE_SIZE);

    let data = graphql::query_paginated(transport, &request).await?;
    parse_projects(entity, data)
}

fn parse_projects(entity: &str, data: Value) -> ClientResult<Vec<ProjectSummary>> {
    let data: ProjectsData = serde_json::from_value(data)?;
    Ok(data
        .models
        .map(|c| c.edges)
        .unwrap_or_default()
        .into_iter()
        .map(|edge| ProjectSummary {
            name: edge.node.name,
            entity: edge.node.entity_name.unwrap_or_else(|| entity.to_string()),
            description: edge.node.description,
            created_at: edge.node.created_at,
            updated_at: edge.node.updated_at,
        })
        .collect())
}
