//! # wandb-client
//!
//! Async client for the Weights & Biases services the MCP server exposes:
//!
//! - the W&B GraphQL API (raw paginated queries, entity/project listing,
//!   report creation)
//! - the Weave trace server (paginated call queries with shaping, counts)
//! - the wandbot support-bot API
//!
//! [`WandbApi`] is the seam consumers program against; [`WandbClient`] is
//! the HTTP implementation.

mod api;
mod client;
pub mod config;
pub mod error;
mod graphql;
mod http;
pub mod projects;
pub mod reports;
mod wandbot;
pub mod weave;

pub use api::WandbApi;
pub use client::WandbClient;
pub use config::ClientConfig;
pub use error::{ClientError, ClientResult};
pub use graphql::GqlQuery;
pub use projects::{EntityProjects, ProjectSummary, Viewer};
pub use reports::{PlotsHtml, ReportOutcome, ReportRequest};
pub use weave::{QueryResult, SortDirection, TraceFilters, TraceMetadata, TraceQuery};
