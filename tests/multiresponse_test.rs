use http::{HeaderValue, StatusCode, header};
use serde_json::Value;
use std::collections::BTreeSet;
use subrequests::multiresponse::{OutputFormat, combine};
use subrequests::runtime::response::{CacheableMetadata, SubResponse};

fn response(content_id: &str, body: &str, content_type: &str) -> SubResponse {
    let mut response = SubResponse::new(StatusCode::OK, body);
    response.headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(content_type).expect("Invalid content type"),
    );
    response
        .set_content_id(content_id)
        .expect("Invalid content ID");
    response
}

fn cacheable(tags: &[&str], max_age: u32) -> Option<CacheableMetadata> {
    Some(CacheableMetadata {
        tags: tags.iter().map(|tag| tag.to_string()).collect(),
        max_age: Some(max_age),
    })
}

#[test]
fn test_combined_status_is_207() {
    let combined = combine(
        &[response("a", "Foo!", "text/plain")],
        OutputFormat::MultipartRelated,
    );
    assert_eq!(combined.status, StatusCode::MULTI_STATUS);
}

#[test]
fn test_sub_content_type_negotiation() {
    // Identical Content-Type values are preserved.
    let pool = vec![
        response("a", "Foo!", "sparrow"),
        response("b", "Bar", "sparrow"),
    ];
    let combined = combine(&pool, OutputFormat::MultipartRelated);
    let content_type = combined
        .headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .expect("Missing Content-Type");
    assert!(content_type.ends_with("; type=sparrow"));

    // Diverging values fall back to application/json.
    let pool = vec![
        response("a", "Foo!", "sparrow"),
        response("b", "Bar", "eagle"),
    ];
    let combined = combine(&pool, OutputFormat::MultipartRelated);
    let content_type = combined
        .headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .expect("Missing Content-Type");
    assert!(content_type.ends_with("; type=application/json"));

    // A part without a Content-Type breaks the agreement as well.
    let mut untyped = SubResponse::new(StatusCode::OK, "Foo!");
    untyped.set_content_id("a").expect("Invalid content ID");
    let pool = vec![untyped, response("b", "Bar", "sparrow")];
    let combined = combine(&pool, OutputFormat::MultipartRelated);
    let content_type = combined
        .headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .expect("Missing Content-Type");
    assert!(content_type.ends_with("; type=application/json"));
}

#[test]
fn test_multipart_framing() {
    let pool = vec![
        response("a", "Foo!", "text/plain"),
        response("b", "Bar", "text/plain"),
    ];
    let combined = combine(&pool, OutputFormat::MultipartRelated);

    // Recover the boundary from the outer Content-Type.
    let content_type = combined
        .headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .expect("Missing Content-Type")
        .to_string();
    let boundary = content_type
        .split("boundary=\"")
        .nth(1)
        .and_then(|rest| rest.split('"').next())
        .expect("Missing boundary");

    assert!(content_type.starts_with("multipart/related; boundary=\""));
    assert!(combined.content.starts_with(&format!("--{boundary}\r\n")));
    assert!(combined.content.ends_with(&format!("\r\n--{boundary}--")));
    // Each part carries its headers, a synthesized Status and its body.
    assert!(combined.content.contains("Content-ID: <a>\r\n"));
    assert!(combined.content.contains("Content-ID: <b>\r\n"));
    assert!(combined.content.contains("Status: 200\r\n"));
    assert!(combined.content.contains("\r\nFoo!\r\n"));
    assert!(combined.content.contains("\r\nBar\r\n"));
}

#[test]
fn test_json_aggregate_keyed_by_content_id() {
    let pool = vec![
        response("a", "Foo!", "text/plain"),
        response("b", "Bar", "text/plain"),
    ];
    let combined = combine(&pool, OutputFormat::Json);

    let content_type = combined
        .headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .expect("Missing Content-Type");
    assert_eq!(content_type, "application/json; type=text/plain");

    let decoded: Value =
        serde_json::from_str(&combined.content).expect("Aggregate is not valid JSON");
    assert_eq!(decoded["a"]["body"], "Foo!");
    assert_eq!(decoded["b"]["body"], "Bar");
    assert_eq!(decoded["a"]["headers"]["Status"], "200");
    assert_eq!(decoded["a"]["headers"]["Content-Type"], "text/plain");
    assert_eq!(decoded["b"]["headers"]["Content-ID"], "<b>");
}

#[test]
fn test_cacheability_union() {
    let mut first = response("a", "Foo!", "text/plain");
    first.cacheability = cacheable(&["node:1"], 600);
    let mut second = response("b", "Bar", "text/plain");
    second.cacheability = cacheable(&["node:2"], 60);

    let combined = combine(&[first, second], OutputFormat::MultipartRelated);
    let metadata = combined.cacheability.expect("Aggregate must stay cacheable");
    let expected: BTreeSet<String> = ["node:1", "node:2"]
        .iter()
        .map(|tag| tag.to_string())
        .collect();
    assert_eq!(metadata.tags, expected);
    // The strictest max-age wins.
    assert_eq!(metadata.max_age, Some(60));
}

#[test]
fn test_uncacheable_part_poisons_the_aggregate() {
    let mut first = response("a", "Foo!", "text/plain");
    first.cacheability = cacheable(&["node:1"], 600);
    let second = response("b", "Bar", "text/plain");
    assert!(second.cacheability.is_none());

    let combined = combine(&[first, second], OutputFormat::MultipartRelated);
    assert!(combined.cacheability.is_none());
}
