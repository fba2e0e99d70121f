//! wandbot support-bot API.

use serde::Serialize;
use serde_json::Value;

use crate::error::{ClientError, ClientResult};
use crate::http::HttpTransport;

const CHAT_QUERY_PATH: &str = "chat/query";
const APPLICATION: &str = "wandb-mcp-server";
const LANGUAGE: &str = "en";

#[derive(Debug, Serialize)]
struct ChatQuery<'a> {
    question: &'a str,
    application: &'a str,
    language: &'a str,
}

pub(crate) async fn query_wandbot(transport: &HttpTransport, question: &str) -> ClientResult<Value> {
    let question = question.trim();
    if question.is_empty() {
        return Err(ClientError::InvalidInput(
            "question must not be empty".to_string(),
        ));
    }

    let url = transport.config().wandbot_endpoint(CHAT_QUERY_PATH)?;
    let answer: Value = transport
        .post_json(
            &url,
            &ChatQuery {
                question,
                application: APPLICATION,
                language: LANGUAGE,
            },
        )
        .await?;

    if !answer.is_object() {
        return Err(ClientError::invalid_response(
            "chat/query",
            "expected a JSON object answer",
        ));
    }
    Ok(answer)
}
