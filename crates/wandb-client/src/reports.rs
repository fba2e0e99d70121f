//! Report creation: markdown and HTML plots become report blocks, saved
//! through the GraphQL `upsertView` mutation.

use std::collections::BTreeMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::error::{ClientError, ClientResult};
use crate::graphql;
use crate::http::HttpTransport;

const UPSERT_VIEW_MUTATION: &str = r#"mutation UpsertReport(
  $entityName: String, $projectName: String, $name: String, $displayName: String,
  $description: String, $spec: String!, $type: String
) {
  upsertView(input: {
    entityName: $entityName, projectName: $projectName, name: $name,
    displayName: $displayName, description: $description, spec: $spec, type: $type
  }) {
    view { id name displayName }
    inserted
  }
}"#;

const REPORT_VIEW_TYPE: &str = "runs";
const REPORT_SPEC_VERSION: u32 = 5;

/// HTML plot content for a report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlotsHtml {
    /// One HTML fragment, appended after the markdown.
    Single(String),
    /// Named fragments placed at `<!-- plot:NAME -->` markers.
    Named(BTreeMap<String, String>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportRequest {
    pub entity_name: String,
    pub project_name: String,
    pub title: String,
    pub description: Option<String>,
    pub markdown_report_text: String,
    pub plots_html: Option<PlotsHtml>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportOutcome {
    pub url: String,
    pub processing_details: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct UpsertViewData {
    #[serde(rename = "upsertView")]
    upsert_view: Option<UpsertViewPayload>,
}

#[derive(Debug, Deserialize)]
struct UpsertViewPayload {
    view: Option<ViewNode>,
}

#[derive(Debug, Deserialize)]
struct ViewNode {
    id: String,
}

pub(crate) async fn create_report(
    transport: &HttpTransport,
    request: &ReportRequest,
) -> ClientResult<ReportOutcome> {
    let title = request.title.trim();
    if title.is_empty() {
        return Err(ClientError::report("Report title must not be empty", Vec::new()));
    }

    let (blocks, processing_details) =
        build_blocks(&request.markdown_report_text, request.plots_html.as_ref());
    let spec = json!({
        "version": REPORT_SPEC_VERSION,
        "panelSettings": {},
        "blocks": blocks,
        "width": "readable",
        "authors": [],
        "discussionThreads": [],
        "ref": {}
    });

    let mut variables = Map::new();
    variables.insert("entityName".to_string(), json!(request.entity_name));
    variables.insert("projectName".to_string(), json!(request.project_name));
    variables.insert(
        "name".to_string(),
        json!(format!("{}-{}", slugify(title).to_lowercase(), Utc::now().timestamp_millis())),
    );
    variables.insert("displayName".to_string(), json!(title));
    variables.insert(
        "description".to_string(),
        json!(request.description.clone().unwrap_or_default()),
    );
    variables.insert("spec".to_string(), json!(spec.to_string()));
    variables.insert("type".to_string(), json!(REPORT_VIEW_TYPE));

    let with_details = |e: ClientError| {
        ClientError::report(format!("Failed to save report: {e}"), processing_details.clone())
    };

    let data = graphql::execute(transport, UPSERT_VIEW_MUTATION, &variables)
        .await
        .map_err(with_details)?;
    let data: UpsertViewData = serde_json::from_value(data).map_err(|e| with_details(e.into()))?;
    let view = data
        .upsert_view
        .and_then(|p| p.view)
        .ok_or_else(|| {
            with_details(ClientError::invalid_response(
                "upsertView.view",
                "mutation returned no view",
            ))
        })?;

    let url = report_url(
        transport.config().app_url.as_str(),
        &request.entity_name,
        &request.project_name,
        title,
        &view.id,
    );
    debug!(url = %url, blocks = blocks_len(&spec), "Report saved");

    Ok(ReportOutcome {
        url,
        processing_details,
    })
}

fn blocks_len(spec: &Value) -> usize {
    spec["blocks"].as_array().map_or(0, Vec::len)
}

fn plot_marker(name: &str) -> String {
    format!("<!-- plot:{name} -->")
}

/// Report blocks for both prose and plots; W&B renders raw HTML inside markdown blocks.
fn markdown_block(content: &str) -> Value {
    json!({
        "type": "markdown-block",
        "children": [{"text": ""}],
        "content": content
    })
}

/// Split markdown at plot markers and interleave HTML blocks.
///
/// Returns the blocks plus one processing note per placement decision.
pub(crate) fn build_blocks(markdown: &str, plots: Option<&PlotsHtml>) -> (Vec<Value>, Vec<String>) {
    let mut blocks = Vec::new();
    let mut details = Vec::new();

    match plots {
        None => push_markdown(&mut blocks, markdown),
        Some(PlotsHtml::Single(html)) => {
            push_markdown(&mut blocks, markdown);
            if html.trim().is_empty() {
                details.push("Skipped empty HTML plot".to_string());
            } else {
                blocks.push(markdown_block(html));
                details.push("Appended HTML plot at the end of the report".to_string());
            }
        }
        Some(PlotsHtml::Named(named)) => {
            let usable: BTreeMap<&str, &str> = named
                .iter()
                .filter_map(|(name, html)| {
                    if html.trim().is_empty() {
                        details.push(format!("Skipped empty plot '{name}'"));
                        None
                    } else {
                        Some((name.as_str(), html.as_str()))
                    }
                })
                .collect();

            let mut placed: Vec<&str> = Vec::new();
            let mut rest = markdown;
            loop {
                let next = usable
                    .keys()
                    .filter_map(|name| {
                        let marker = plot_marker(name);
                        rest.find(&marker).map(|idx| (idx, *name, marker.len()))
                    })
                    .min_by_key(|(idx, _, _)| *idx);

                let Some((idx, name, marker_len)) = next else {
                    break;
                };
                push_markdown(&mut blocks, &rest[..idx]);
                blocks.push(markdown_block(usable[name]));
                if !placed.contains(&name) {
                    placed.push(name);
                    details.push(format!("Embedded plot '{name}' at its marker"));
                }
                rest = &rest[idx + marker_len..];
            }
            push_markdown(&mut blocks, rest);

            for (name, html) in &usable {
                if !placed.contains(name) {
                    blocks.push(markdown_block(html));
                    details.push(format!(
                        "Plot '{name}' had no {} marker; appended at the end of the report",
                        plot_marker(name)
                    ));
                }
            }
        }
    }

    if blocks.is_empty() {
        details.push("Report body is empty".to_string());
    }
    (blocks, details)
}

fn push_markdown(blocks: &mut Vec<Value>, text: &str) {
    let text = text.trim();
    if !text.is_empty() {
        blocks.push(markdown_block(text));
    }
}

/// `Quarterly Eval: GPT vs. Claude` -> `Quarterly-Eval-GPT-vs-Claude`
pub(crate) fn slugify(title: &str) -> String {
    title
        .split(|c: char| !c.is_alphanumeric())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

pub(crate) fn report_url(app_url: &str, entity: &str, project: &str, title: &str, id: &str) -> String {
    format!(
        "{}/{entity}/{project}/reports/{}--{id}",
        app_url.trim_end_matches('/'),
        slugify(title)
    )
}
