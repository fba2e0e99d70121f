//! Metadata aggregation and payload shaping for gathered calls.

use serde_json::{Map, Value};

use super::{QueryResult, TraceMetadata, TraceQuery};

/// Fields whose string values are subject to truncation.
const TRUNCATED_FIELDS: &[&str] = &["inputs", "output", "attributes", "summary"];
const TRUNCATION_MARKER: &str = "...";

/// Build the shaped result for `calls` as requested by `query`.
pub(crate) fn build_result(calls: Vec<Value>, query: &TraceQuery) -> QueryResult {
    let metadata = summarize(&calls);
    if query.metadata_only {
        return QueryResult {
            metadata,
            traces: Vec::new(),
        };
    }

    let traces = calls
        .into_iter()
        .map(|call| {
            let call = project_columns(call, &query.columns);
            if query.return_full_data {
                call
            } else {
                truncate_call(call, query.truncate_length)
            }
        })
        .collect();

    QueryResult { metadata, traces }
}

pub(crate) fn summarize(calls: &[Value]) -> TraceMetadata {
    let mut metadata = TraceMetadata {
        total_traces: calls.len(),
        ..TraceMetadata::default()
    };

    for call in calls {
        match call_status(call) {
            "error" => metadata.status_summary.error += 1,
            "running" => metadata.status_summary.running += 1,
            _ => metadata.status_summary.success += 1,
        }

        if let Some(op) = call.get("op_name").and_then(Value::as_str) {
            *metadata
                .op_distribution
                .entry(short_op_name(op).to_string())
                .or_insert(0) += 1;
        }

        if let Some(usage) = call.pointer("/summary/usage").and_then(Value::as_object) {
            for model_usage in usage.values() {
                let input = first_u64(model_usage, &["input_tokens", "prompt_tokens"]);
                let output = first_u64(model_usage, &["output_tokens", "completion_tokens"]);
                let total = first_u64(model_usage, &["total_tokens"]).max(input + output);
                metadata.token_counts.input_tokens += input;
                metadata.token_counts.output_tokens += output;
                metadata.token_counts.total_tokens += total;
            }
        }

        if let Some(started) = call.get("started_at").and_then(Value::as_str) {
            let range = &mut metadata.time_range;
            if range.earliest.as_deref().map_or(true, |e| started < e) {
                range.earliest = Some(started.to_string());
            }
            if range.latest.as_deref().map_or(true, |l| started > l) {
                range.latest = Some(started.to_string());
            }
        }
    }

    metadata
}

/// `summary.weave.status` when the server computed it, otherwise derived.
fn call_status(call: &Value) -> &str {
    if let Some(status) = call.pointer("/summary/weave/status").and_then(Value::as_str) {
        return status;
    }
    if call.get("exception").is_some_and(|e| !e.is_null()) {
        "error"
    } else if call.get("ended_at").map_or(true, Value::is_null) {
        "running"
    } else {
        "success"
    }
}

/// `weave:///acme/demo/op/predict:abc` -> `predict`
fn short_op_name(op: &str) -> &str {
    let tail = op.rsplit('/').next().unwrap_or(op);
    tail.split(':').next().unwrap_or(tail)
}

fn first_u64(value: &Value, keys: &[&str]) -> u64 {
    keys.iter()
        .find_map(|k| value.get(*k).and_then(Value::as_u64))
        .unwrap_or(0)
}

fn project_columns(call: Value, columns: &[String]) -> Value {
    if columns.is_empty() {
        return call;
    }
    match call {
        Value::Object(map) => {
            let kept: Map<String, Value> = map
                .into_iter()
                .filter(|(k, _)| columns.iter().any(|c| c == k))
                .collect();
            Value::Object(kept)
        }
        other => other,
    }
}

fn truncate_call(call: Value, max_len: usize) -> Value {
    match call {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| {
                    let v = if TRUNCATED_FIELDS.contains(&k.as_str()) {
                        truncate_value(v, max_len)
                    } else {
                        v
                    };
                    (k, v)
                })
                .collect(),
        ),
        other => other,
    }
}

/// Recursively cut string values longer than `max_len` characters.
///
/// `max_len == 0` empties every string.
pub(crate) fn truncate_value(value: Value, max_len: usize) -> Value {
    match value {
        Value::String(s) => Value::String(truncate_str(&s, max_len)),
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|v| truncate_value(v, max_len))
                .collect(),
        ),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, truncate_value(v, max_len)))
                .collect(),
        ),
        other => other,
    }
}

fn truncate_str(s: &str, max_len: usize) -> String {
    if max_len == 0 {
        return String::new();
    }
    match s.char_indices().nth(max_len) {
        Some((idx, _)) => format!("{}{}", &s[..idx], TRUNCATION_MARKER),
        None => s.to_string(),
    }
}
