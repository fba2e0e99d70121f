//! Shared helper functions for MCP tool implementations.

use std::error::Error;

use rmcp::model::{CallToolResult, Content};
use serde::Serialize;
use tracing::error;

use wandb_client::ReportOutcome;

/// `err` followed by each distinct message in its source chain.
pub fn error_chain(err: &dyn Error) -> String {
    let mut messages = vec![err.to_string()];
    let mut source = err.source();
    while let Some(cause) = source {
        let message = cause.to_string();
        if !messages.iter().any(|m| m.contains(&message)) {
            messages.push(message);
        }
        source = cause.source();
    }
    messages.join(": caused by: ")
}

/// Log a collaborator failure and turn it into an `is_error` tool result
/// reading `Error <action>: <message>`.
pub fn tool_failure(tool: &str, action: &str, err: &dyn Error) -> CallToolResult {
    error!(tool, error = %err, chain = %error_chain(err), "Error calling tool");
    CallToolResult::error(vec![Content::text(format!("Error {action}: {err}"))])
}

/// Serialize `value` as the tool's text result.
pub fn json_result<T: Serialize>(tool: &str, value: &T) -> CallToolResult {
    match serde_json::to_string(value) {
        Ok(json) => CallToolResult::success(vec![Content::text(json)]),
        Err(e) => tool_failure(tool, "serializing result", &e),
    }
}

pub fn report_message(outcome: &ReportOutcome) -> String {
    let mut message = format!("The report was saved here: {}", outcome.url);
    if !outcome.processing_details.is_empty() {
        let details: Vec<String> = outcome
            .processing_details
            .iter()
            .map(|d| format!("- {d}"))
            .collect();
        message.push_str("\n\nReport processing details:\n");
        message.push_str(&details.join("\n"));
    }
    message
}
