use crate::runtime::response::{CacheableMetadata, SubResponse};
use http::{HeaderMap, HeaderValue, StatusCode, header};
use serde_json::{Map, Value, json};
use std::str::FromStr;
use uuid::Uuid;

/// The wire format of the combined payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    MultipartRelated,
    Json,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "multipart-related" | "multipart" => Ok(OutputFormat::MultipartRelated),
            "json" => Ok(OutputFormat::Json),
            other => Err(format!("unknown output format {other}")),
        }
    }
}

/// The single response combining the whole pool. Always a 207.
#[derive(Debug, Clone)]
pub struct AggregateResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub content: String,
    pub cacheability: Option<CacheableMetadata>,
}

/// Combines the ordered response pool into one payload.
pub fn combine(responses: &[SubResponse], format: OutputFormat) -> AggregateResponse {
    let sub_content_type = negotiate_sub_content_type(responses);
    let (content, headers) = match format {
        OutputFormat::MultipartRelated => normalize_multipart(responses, &sub_content_type),
        OutputFormat::Json => normalize_json(responses, &sub_content_type),
    };
    AggregateResponse {
        status: StatusCode::MULTI_STATUS,
        headers,
        content,
        cacheability: merge_cacheability(responses),
    }
}

/// Checks if all responses share the same Content-Type header. If they do,
/// that one wins; otherwise 'application/json'.
///
/// A missing Content-Type counts as a value of its own, so a pool mixing
/// typed and untyped parts falls back like any other mismatch.
fn negotiate_sub_content_type(responses: &[SubResponse]) -> String {
    let mut carry: Option<Option<&str>> = None;
    for response in responses {
        let content_type = response
            .headers
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok());
        carry = match carry {
            None => Some(content_type),
            Some(previous) if previous == content_type => Some(previous),
            Some(_) => Some(Some("application/json")),
        };
    }
    carry
        .flatten()
        .unwrap_or("application/json")
        .to_string()
}

/// One multipart/related body with a random boundary, one part per response.
fn normalize_multipart(responses: &[SubResponse], sub_content_type: &str) -> (String, HeaderMap) {
    let delimiter = Uuid::new_v4().simple().to_string();
    let mut headers = HeaderMap::new();
    if let Ok(value) = HeaderValue::from_str(&format!(
        "multipart/related; boundary=\"{delimiter}\"; type={sub_content_type}"
    )) {
        headers.insert(header::CONTENT_TYPE, value);
    }

    let separator = format!("\r\n--{delimiter}\r\n");
    let content_items: Vec<String> = responses
        .iter()
        .map(|response| format!("{}\r\n{}", header_block(response), response.body))
        .collect();
    let content = format!(
        "--{delimiter}\r\n{}\r\n--{delimiter}--",
        content_items.join(&separator)
    );
    (content, headers)
}

/// A JSON object keyed by Content-ID, each value carrying the part's
/// headers and raw body.
fn normalize_json(responses: &[SubResponse], sub_content_type: &str) -> (String, HeaderMap) {
    let mut headers = HeaderMap::new();
    if let Ok(value) = HeaderValue::from_str(&format!("application/json; type={sub_content_type}"))
    {
        headers.insert(header::CONTENT_TYPE, value);
    }

    let mut output = Map::new();
    for response in responses {
        let mut part_headers = Map::new();
        for (name, value) in sorted_headers(response) {
            part_headers.insert(name, Value::String(value));
        }
        output.insert(
            response.content_id().to_string(),
            json!({ "headers": part_headers, "body": response.body.clone() }),
        );
    }
    let content = Value::Object(output).to_string();
    (content, headers)
}

/// Renders the header block of one part, including the synthesized Status
/// header. Lines are sorted by name for deterministic output.
fn header_block(response: &SubResponse) -> String {
    sorted_headers(response)
        .into_iter()
        .map(|(name, value)| format!("{name}: {value}\r\n"))
        .collect()
}

fn sorted_headers(response: &SubResponse) -> Vec<(String, String)> {
    let mut entries: Vec<(String, String)> = response
        .headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|value| (wire_case(name.as_str()), value.to_string()))
        })
        .collect();
    entries.push(("Status".to_string(), response.status.as_u16().to_string()));
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    entries
}

/// Canonical wire casing for a lowercased header name.
fn wire_case(name: &str) -> String {
    if name == "content-id" {
        return "Content-ID".to_string();
    }
    name.split('-')
        .map(|segment| {
            let mut chars = segment.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join("-")
}

/// The union of every part's cache metadata. A part that is not
/// independently cacheable (or has a zero max-age) poisons the aggregate.
fn merge_cacheability(responses: &[SubResponse]) -> Option<CacheableMetadata> {
    let mut merged = CacheableMetadata::default();
    for response in responses {
        match &response.cacheability {
            Some(metadata) if metadata.max_age != Some(0) => merged.merge(metadata),
            _ => return None,
        }
    }
    Some(merged)
}
