use anyhow::anyhow;
use async_trait::async_trait;
use http::{HeaderValue, StatusCode, header};
use serde_json::Value;
use std::sync::Arc;
use subrequests::blueprint::manager::BlueprintManager;
use subrequests::error::SubrequestsError;
use subrequests::multiresponse::OutputFormat;
use subrequests::runtime::executor::RequestExecutor;
use subrequests::runtime::manager::SubrequestsManager;
use subrequests::runtime::request::{MasterContext, PreparedRequest};
use subrequests::runtime::response::SubResponse;

/// Echoes the request path back as the response body. `/things` returns a
/// canned catalog so token replacement has something to chew on.
struct StubExecutor;

#[async_trait]
impl RequestExecutor for StubExecutor {
    async fn handle(&self, request: PreparedRequest) -> anyhow::Result<SubResponse> {
        match request.path.as_str() {
            "/fail" => Err(anyhow!("the executor went away")),
            "/things" => Ok(SubResponse::new(
                StatusCode::OK,
                r#"{"things":["what","keep","talking"],"stuff":42}"#,
            )),
            path => Ok(SubResponse::new(StatusCode::OK, path)),
        }
    }
}

fn manager() -> SubrequestsManager {
    SubrequestsManager::new(Arc::new(StubExecutor))
}

#[tokio::test]
async fn test_request_tags_responses_in_order() {
    // 1. Parse a blueprint with two waves.
    let blueprint = r#"[
        {"requestId": "foo", "uri": "/lorem"},
        {"requestId": "oop", "uri": "/ipsum", "waitFor": ["foo"]},
        {"requestId": "oof", "uri": "/dolor", "action": "create", "waitFor": ["foo"]}
    ]"#;
    let master = MasterContext::default();
    let tree = BlueprintManager::new()
        .parse(blueprint, &master)
        .expect("Parsing failed");
    assert_eq!(tree.num_levels(), 2);

    // 2. Execute it.
    let responses = manager()
        .request(&tree, &master)
        .await
        .expect("Execution failed");

    // 3. Responses arrive in wave order, tagged with their Content-ID.
    assert_eq!(responses.len(), 3);
    assert_eq!(responses[0].content_id(), "foo");
    assert_eq!(responses[1].content_id(), "oop");
    assert_eq!(responses[2].content_id(), "oof");
    assert_eq!(responses[0].body, "/lorem");
    assert_eq!(responses[1].body, "/ipsum");
    assert_eq!(responses[2].body, "/dolor");
}

#[tokio::test]
async fn test_token_replacement_fans_out_across_waves() {
    let blueprint = r#"[
        {"requestId": "foo", "uri": "/things"},
        {
            "requestId": "oop",
            "uri": "/ipsum/{{foo.body@$.things[*]}}/{{foo.body@$.stuff}}",
            "waitFor": ["foo"]
        }
    ]"#;
    let master = MasterContext::default();
    let tree = BlueprintManager::new()
        .parse(blueprint, &master)
        .expect("Parsing failed");

    let responses = manager()
        .request(&tree, &master)
        .await
        .expect("Execution failed");

    assert_eq!(responses.len(), 4);
    let bodies: Vec<&str> = responses.iter().map(|r| r.body.as_str()).collect();
    assert_eq!(
        bodies[1..],
        ["/ipsum/what/42", "/ipsum/keep/42", "/ipsum/talking/42"]
    );
    let ids: Vec<&str> = responses.iter().map(|r| r.content_id()).collect();
    assert_eq!(ids, ["foo", "oop#uri{0}", "oop#uri{1}", "oop#uri{2}"]);
}

#[tokio::test]
async fn test_end_to_end_combines_into_207() {
    let blueprint = r#"[
        {"uri": "/a", "action": "view"},
        {"uri": "/b", "requestId": "b", "waitFor": ["<ROOT>"]}
    ]"#;
    let master = MasterContext::default();
    let blueprint_manager = BlueprintManager::new();
    let tree = blueprint_manager
        .parse(blueprint, &master)
        .expect("Parsing failed");

    let responses = manager()
        .request(&tree, &master)
        .await
        .expect("Execution failed");
    assert_eq!(responses.len(), 2);
    // The first ID was generated, the second is explicit.
    assert!(!responses[0].content_id().is_empty());
    assert_eq!(responses[1].content_id(), "b");

    let combined = blueprint_manager.combine_responses(&responses, OutputFormat::Json);
    assert_eq!(combined.status, StatusCode::MULTI_STATUS);
    let decoded: Value =
        serde_json::from_str(&combined.content).expect("Aggregate is not valid JSON");
    assert_eq!(decoded[responses[0].content_id()]["body"], "/a");
    assert_eq!(decoded["b"]["body"], "/b");
}

#[tokio::test]
async fn test_executor_failure_aborts_the_batch() {
    let blueprint = r#"[
        {"requestId": "foo", "uri": "/lorem"},
        {"requestId": "boom", "uri": "/fail", "waitFor": ["foo"]}
    ]"#;
    let master = MasterContext::default();
    let tree = BlueprintManager::new()
        .parse(blueprint, &master)
        .expect("Parsing failed");

    let error = manager()
        .request(&tree, &master)
        .await
        .expect_err("The failing wave must abort the batch");
    assert!(matches!(error, SubrequestsError::Executor(_)));
    assert!(!error.is_client_error());
}

#[tokio::test]
async fn test_unresolvable_token_fails_before_dispatch() {
    let blueprint = r#"[
        {"requestId": "foo", "uri": "/lorem"},
        {"requestId": "oop", "uri": "/ipsum/{{nope.body@$.id}}", "waitFor": ["foo"]}
    ]"#;
    let master = MasterContext::default();
    let tree = BlueprintManager::new()
        .parse(blueprint, &master)
        .expect("Parsing failed");

    let error = manager()
        .request(&tree, &master)
        .await
        .expect_err("Dangling tokens must be rejected");
    let SubrequestsError::UnresolvableToken { id, candidates } = error else {
        panic!("Wrong error variant");
    };
    assert_eq!(id, "nope");
    assert_eq!(candidates, vec!["foo".to_string()]);
}

#[test]
fn test_host_header_is_forwarded() {
    let blueprint = r#"[
        {"requestId": "plain", "uri": "/a"},
        {"requestId": "pinned", "uri": "/b", "headers": {"Host": "pinned.example.org"}}
    ]"#;
    let mut master = MasterContext::default();
    master.headers.insert(
        header::HOST,
        HeaderValue::from_static("api.example.org"),
    );
    let tree = BlueprintManager::new()
        .parse(blueprint, &master)
        .expect("Parsing failed");

    let level = tree.level(0).expect("Missing wave");
    // The master Host lands on subrequests that did not set one.
    assert_eq!(
        level[0].headers.get("host").map(String::as_str),
        Some("api.example.org")
    );
    // Explicit subrequest headers always win.
    assert_eq!(
        level[1].headers.get("Host").map(String::as_str),
        Some("pinned.example.org")
    );
    assert!(level[1].headers.get("host").is_none());
}
