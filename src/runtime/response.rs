use crate::error::{Result, SubrequestsError};
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use std::collections::BTreeSet;

/// Correlates a response back to the subrequest that produced it. The value
/// is wrapped in angle brackets on the wire: `<requestId>`.
pub const CONTENT_ID: HeaderName = HeaderName::from_static("content-id");

/// Cache metadata attached to an individual response.
///
/// The aggregate response merges the metadata of every part; a part without
/// metadata poisons the whole aggregate.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheableMetadata {
    pub tags: BTreeSet<String>,
    /// `None` means no max-age constraint.
    pub max_age: Option<u32>,
}

impl CacheableMetadata {
    pub fn merge(&mut self, other: &CacheableMetadata) {
        self.tags.extend(other.tags.iter().cloned());
        self.max_age = match (self.max_age, other.max_age) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
    }
}

/// A response produced by the external executor. Immutable once pooled.
#[derive(Debug, Clone)]
pub struct SubResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
    /// `None` when the response must not be cached.
    pub cacheability: Option<CacheableMetadata>,
}

impl SubResponse {
    pub fn new(status: StatusCode, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
            cacheability: None,
        }
    }

    /// The Content-ID without the surrounding angle brackets.
    pub fn content_id(&self) -> &str {
        self.headers
            .get(&CONTENT_ID)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.trim_start_matches('<').trim_end_matches('>'))
            .unwrap_or("")
    }

    /// The Content-ID with any `#...` fan-out suffix stripped as well.
    pub fn base_content_id(&self) -> &str {
        let content_id = self.content_id();
        content_id
            .split_once('#')
            .map(|(base, _)| base)
            .unwrap_or(content_id)
    }

    /// Tags the response with the ID of the subrequest that produced it.
    pub fn set_content_id(&mut self, request_id: &str) -> Result<()> {
        let value = HeaderValue::from_str(&format!("<{request_id}>")).map_err(|_| {
            SubrequestsError::MalformedBlueprint(format!(
                "request id {request_id} cannot be used as a Content-ID"
            ))
        })?;
        self.headers.insert(CONTENT_ID, value);
        Ok(())
    }
}
