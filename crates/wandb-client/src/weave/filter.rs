//! Translation of tool-level trace filters into the Weave calls filter and
//! query-expression shapes.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::error::{ClientError, ClientResult};

/// Caller-supplied trace filters, keyed by filter name.
pub type TraceFilters = Map<String, Value>;

/// Filter key that restricts results to root calls (no parent).
pub const TRACE_ROOTS_ONLY: &str = "trace_roots_only";

const LIST_KEYS: &[&str] = &[
    "op_names",
    "input_refs",
    "output_refs",
    "parent_ids",
    "trace_ids",
    "call_ids",
    "wb_user_ids",
    "wb_run_ids",
];

const CONVENIENCE_KEYS: &[&str] = &[
    "op_name",
    "trace_id",
    "op_name_contains",
    "status",
    "time_range",
    "has_exception",
    TRACE_ROOTS_ONLY,
];

/// The native `filter` object of a calls query.
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub(crate) struct CallsFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub op_names: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_refs: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_refs: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_ids: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_ids: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_ids: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_roots_only: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wb_user_ids: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wb_run_ids: Option<Vec<String>>,
}

impl CallsFilter {
    fn list_mut(&mut self, key: &str) -> Option<&mut Option<Vec<String>>> {
        match key {
            "op_names" => Some(&mut self.op_names),
            "input_refs" => Some(&mut self.input_refs),
            "output_refs" => Some(&mut self.output_refs),
            "parent_ids" => Some(&mut self.parent_ids),
            "trace_ids" => Some(&mut self.trace_ids),
            "call_ids" => Some(&mut self.call_ids),
            "wb_user_ids" => Some(&mut self.wb_user_ids),
            "wb_run_ids" => Some(&mut self.wb_run_ids),
            _ => None,
        }
    }

    fn push(&mut self, key: &str, values: Vec<String>) {
        if let Some(slot) = self.list_mut(key) {
            slot.get_or_insert_with(Vec::new).extend(values);
        }
    }
}

/// Filters split into the native filter and an optional `query` expression.
#[derive(Debug, Default, Clone, PartialEq)]
pub(crate) struct TranslatedFilters {
    pub filter: CallsFilter,
    pub query: Option<Value>,
}

pub(crate) fn translate(
    entity: &str,
    project: &str,
    filters: &TraceFilters,
) -> ClientResult<TranslatedFilters> {
    let mut filter = CallsFilter::default();
    let mut conditions: Vec<Value> = Vec::new();

    for (key, value) in filters {
        match key.as_str() {
            k if LIST_KEYS.contains(&k) => {
                let mut values = string_list(k, value)?;
                if k == "op_names" {
                    values = values
                        .into_iter()
                        .map(|name| op_ref(entity, project, &name))
                        .collect();
                }
                filter.push(k, values);
            }
            "op_name" => {
                let name = string_value(key, value)?;
                filter.push("op_names", vec![op_ref(entity, project, &name)]);
            }
            "trace_id" => {
                let id = string_value(key, value)?;
                filter.push("trace_ids", vec![id]);
            }
            TRACE_ROOTS_ONLY => {
                filter.trace_roots_only = Some(bool_value(key, value)?);
            }
            "op_name_contains" => {
                let substr = string_value(key, value)?;
                conditions.push(json!({
                    "$contains": {
                        "input": {"$getField": "op_name"},
                        "substr": {"$literal": substr},
                        "case_insensitive": true
                    }
                }));
            }
            "status" => conditions.push(status_condition(value)?),
            "time_range" => conditions.extend(time_range_conditions(value)?),
            "has_exception" => {
                let is_null = json!({
                    "$eq": [{"$getField": "exception"}, {"$literal": null}]
                });
                conditions.push(if bool_value(key, value)? {
                    json!({"$not": [is_null]})
                } else {
                    is_null
                });
            }
            other => {
                let mut known: Vec<&str> = LIST_KEYS.to_vec();
                known.extend_from_slice(CONVENIENCE_KEYS);
                known.sort_unstable();
                known.dedup();
                return Err(ClientError::InvalidInput(format!(
                    "unknown trace filter '{other}'. Supported filters: {}",
                    known.join(", ")
                )));
            }
        }
    }

    let query = match conditions.len() {
        0 => None,
        1 => conditions.pop().map(|c| json!({"$expr": c})),
        _ => Some(json!({"$expr": {"$and": conditions}})),
    };
    Ok(TranslatedFilters { filter, query })
}

/// Expand a bare op name into a Weave op ref matching every version.
fn op_ref(entity: &str, project: &str, name: &str) -> String {
    if name.starts_with("weave:///") {
        name.to_string()
    } else {
        format!("weave:///{entity}/{project}/op/{name}:*")
    }
}

fn status_condition(value: &Value) -> ClientResult<Value> {
    let status = string_value("status", value)?.to_ascii_lowercase();
    match status.as_str() {
        "success" | "error" | "running" => Ok(json!({
            "$eq": [{"$getField": "summary.weave.status"}, {"$literal": status}]
        })),
        other => Err(ClientError::InvalidInput(format!(
            "status must be one of success, error, running (got '{other}')"
        ))),
    }
}

fn time_range_conditions(value: &Value) -> ClientResult<Vec<Value>> {
    let Value::Object(range) = value else {
        return Err(ClientError::InvalidInput(
            "time_range must be an object with 'start' and/or 'end'".to_string(),
        ));
    };

    let started_at = json!({
        "$convert": {"input": {"$getField": "started_at"}, "to": "double"}
    });
    let mut conditions = Vec::new();
    if let Some(start) = range.get("start").filter(|v| !v.is_null()) {
        let ts = parse_timestamp("time_range.start", start)?;
        conditions.push(json!({"$gte": [started_at.clone(), {"$literal": ts}]}));
    }
    if let Some(end) = range.get("end").filter(|v| !v.is_null()) {
        let ts = parse_timestamp("time_range.end", end)?;
        conditions.push(json!({"$not": [{"$gt": [started_at, {"$literal": ts}]}]}));
    }
    if conditions.is_empty() {
        return Err(ClientError::InvalidInput(
            "time_range needs at least one of 'start' or 'end'".to_string(),
        ));
    }
    Ok(conditions)
}

/// Parse an RFC 3339 timestamp or a bare `YYYY-MM-DD` date into epoch seconds.
fn parse_timestamp(field: &str, value: &Value) -> ClientResult<f64> {
    let raw = string_value(field, value)?;
    if let Ok(dt) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(dt.with_timezone(&Utc).timestamp_millis() as f64 / 1000.0);
    }
    if let Ok(date) = NaiveDate::parse_from_str(&raw, "%Y-%m-%d") {
        if let Some(dt) = date.and_hms_opt(0, 0, 0) {
            return Ok(dt.and_utc().timestamp() as f64);
        }
    }
    Err(ClientError::InvalidInput(format!(
        "{field} must be an RFC 3339 timestamp or YYYY-MM-DD date (got '{raw}')"
    )))
}

fn string_value(key: &str, value: &Value) -> ClientResult<String> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| ClientError::InvalidInput(format!("{key} must be a string")))
}

fn bool_value(key: &str, value: &Value) -> ClientResult<bool> {
    value
        .as_bool()
        .ok_or_else(|| ClientError::InvalidInput(format!("{key} must be a boolean")))
}

fn string_list(key: &str, value: &Value) -> ClientResult<Vec<String>> {
    match value {
        Value::String(s) => Ok(vec![s.clone()]),
        Value::Array(items) => items
            .iter()
            .map(|item| string_value(key, item))
            .collect(),
        _ => Err(ClientError::InvalidInput(format!(
            "{key} must be a string or a list of strings"
        ))),
    }
}
