use colored::*;
use reqwest::StatusCode;
use serde::Serialize;
use serde_json::Value;
use std::fmt;

use crate::http::RawResponse;
use crate::types::{OutputFormat, RunConfig};

/// Response body ready for display
#[derive(Debug, Clone, PartialEq)]
pub enum RenderedBody {
    Json(Value),
    Text(String),
}

impl RenderedBody {
    fn to_value(&self) -> Value {
        match self {
            RenderedBody::Json(value) => value.clone(),
            RenderedBody::Text(text) => Value::String(text.clone()),
        }
    }
}

impl fmt::Display for RenderedBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderedBody::Json(value) => {
                let pretty = serde_json::to_string_pretty(value).map_err(|_| fmt::Error)?;
                f.write_str(&pretty)
            }
            RenderedBody::Text(text) => f.write_str(text),
        }
    }
}

/// Decode `raw` as JSON, keeping at most `limit` elements of a top-level
/// array. Anything that is not JSON is kept as text.
pub fn render_body(raw: &[u8], limit: usize) -> RenderedBody {
    match serde_json::from_slice::<Value>(raw) {
        Ok(Value::Array(mut items)) => {
            if limit > 0 {
                items.truncate(limit);
            }
            RenderedBody::Json(Value::Array(items))
        }
        Ok(value) => RenderedBody::Json(value),
        Err(_) => RenderedBody::Text(String::from_utf8_lossy(raw).into_owned()),
    }
}

fn compose(header: String, body: Option<&RenderedBody>) -> String {
    match body {
        Some(body) => format!("{}\n{}", header, body),
        None => header,
    }
}

fn plain_text(url: &str, status: &dyn fmt::Display, body: Option<&RenderedBody>) -> String {
    compose(format!("{} | {}", url, status), body)
}

/// Format a response as `URL | status`, followed by the body when shown
pub fn format_response(
    url: &str,
    status: &str,
    body: &[u8],
    show_body: bool,
    limit: usize,
) -> String {
    let rendered = show_body.then(|| render_body(body, limit));
    plain_text(url, &status, rendered.as_ref())
}

/// One successful request, as printed and logged
#[derive(Debug, Clone, PartialEq)]
pub struct RequestResult {
    pub url: String,
    pub status: StatusCode,
    pub body: Option<RenderedBody>,
}

impl RequestResult {
    pub fn from_response(resp: RawResponse, config: &RunConfig) -> Self {
        let body = config
            .show_body
            .then(|| render_body(resp.body.as_deref().unwrap_or_default(), config.body_limit));

        Self {
            url: resp.url,
            status: resp.status,
            body,
        }
    }
}

#[derive(Serialize)]
struct JsonRecord<'a> {
    url: &'a str,
    status_code: String,
    body: Value,
}

/// Format a result as a log record, newline terminated
pub fn format_record(result: &RequestResult, format: OutputFormat) -> String {
    match format {
        OutputFormat::Plain => {
            plain_text(&result.url, &result.status, result.body.as_ref()) + "\n"
        }
        OutputFormat::Json => {
            let record = JsonRecord {
                url: &result.url,
                status_code: result.status.to_string(),
                body: result
                    .body
                    .as_ref()
                    .map(RenderedBody::to_value)
                    .unwrap_or(Value::Null),
            };
            serde_json::to_string_pretty(&record).unwrap_or_default() + "\n"
        }
    }
}

/// Format a result for the terminal
pub fn format_console(result: &RequestResult, colored: bool) -> String {
    if !colored {
        return plain_text(&result.url, &result.status, result.body.as_ref());
    }

    let status_str = result.status.to_string();
    let colored_status = if result.status.is_success() {
        status_str.green()
    } else if result.status.is_redirection() {
        status_str.yellow()
    } else {
        status_str.red()
    };
    let header = format!("{} | {}", result.url.as_str().cyan(), colored_status);
    compose(header, result.body.as_ref())
}
