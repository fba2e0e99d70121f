//! Weave trace server access: paginated call queries, shaping and counts.

mod filter;
mod query;
mod shape;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ClientError;

pub use filter::{TraceFilters, TRACE_ROOTS_ONLY};
pub(crate) use query::{count_traces, query_paginated_traces};

/// Sort order for trace queries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Asc => write!(f, "asc"),
            Self::Desc => write!(f, "desc"),
        }
    }
}

impl FromStr for SortDirection {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "asc" => Ok(Self::Asc),
            "desc" => Ok(Self::Desc),
            other => Err(ClientError::InvalidInput(format!(
                "sort_direction must be 'asc' or 'desc' (got '{other}')"
            ))),
        }
    }
}

/// A paginated, optionally shaped query over a project's calls.
#[derive(Debug, Clone, PartialEq)]
pub struct TraceQuery {
    pub entity_name: String,
    pub project_name: String,
    /// Calls fetched per round trip.
    pub chunk_size: usize,
    pub filters: TraceFilters,
    pub sort_by: String,
    pub sort_direction: SortDirection,
    /// Stop once this many calls have been gathered.
    pub target_limit: u64,
    pub include_costs: bool,
    pub include_feedback: bool,
    /// Keep only these top-level fields on each trace (empty keeps all).
    pub columns: Vec<String>,
    /// Ref-valued columns the server should expand inline.
    pub expand_columns: Vec<String>,
    /// Maximum characters kept in string values unless `return_full_data`.
    pub truncate_length: usize,
    pub return_full_data: bool,
    pub metadata_only: bool,
}

impl TraceQuery {
    pub const DEFAULT_SORT_BY: &'static str = "started_at";
    pub const DEFAULT_TARGET_LIMIT: u64 = 10_000_000;
    pub const DEFAULT_TRUNCATE_LENGTH: usize = 200;
    pub const DEFAULT_CHUNK_SIZE: usize = 50;

    pub fn new(entity_name: impl Into<String>, project_name: impl Into<String>) -> Self {
        Self {
            entity_name: entity_name.into(),
            project_name: project_name.into(),
            chunk_size: Self::DEFAULT_CHUNK_SIZE,
            filters: TraceFilters::new(),
            sort_by: Self::DEFAULT_SORT_BY.to_string(),
            sort_direction: SortDirection::Desc,
            target_limit: Self::DEFAULT_TARGET_LIMIT,
            include_costs: true,
            include_feedback: true,
            columns: Vec::new(),
            expand_columns: Vec::new(),
            truncate_length: Self::DEFAULT_TRUNCATE_LENGTH,
            return_full_data: false,
            metadata_only: false,
        }
    }

    /// Weave project id (`entity/project`).
    pub fn project_id(&self) -> String {
        project_id(&self.entity_name, &self.project_name)
    }
}

pub(crate) fn project_id(entity: &str, project: &str) -> String {
    format!("{entity}/{project}")
}

/// Shaped result of a trace query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub metadata: TraceMetadata,
    pub traces: Vec<Value>,
}

/// Aggregates computed over every gathered call, before any shaping.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TraceMetadata {
    pub total_traces: usize,
    pub status_summary: StatusSummary,
    pub op_distribution: BTreeMap<String, usize>,
    pub token_counts: TokenCounts,
    pub time_range: TimeRange,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSummary {
    pub success: usize,
    pub error: usize,
    pub running: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenCounts {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub earliest: Option<String>,
    pub latest: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trace_query_defaults() {
        let query = TraceQuery::new("acme", "demo");
        assert_eq!(query.chunk_size, 50);
        assert_eq!(query.sort_by, "started_at");
        assert_eq!(query.sort_direction, SortDirection::Desc);
        assert_eq!(query.target_limit, 10_000_000);
        assert_eq!(query.truncate_length, 200);
        assert!(query.include_costs && query.include_feedback);
        assert!(!query.return_full_data && !query.metadata_only);
        assert_eq!(query.project_id(), "acme/demo");
    }

    #[test]
    fn test_sort_direction_parse() {
        assert_eq!("ASC".parse::<SortDirection>().unwrap(), SortDirection::Asc);
        assert_eq!(" desc ".parse::<SortDirection>().unwrap(), SortDirection::Desc);
        assert!("sideways".parse::<SortDirection>().is_err());
        assert_eq!(SortDirection::Asc.to_string(), "asc");
    }

    #[test]
    fn test_query_result_serializes_metadata_first() {
        let json = serde_json::to_string(&QueryResult::default()).unwrap();
        assert!(json.starts_with(r#"{"metadata":{"total_traces":0"#));
        assert!(json.ends_with(r#""traces":[]}"#));
    }
}
