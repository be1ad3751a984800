use crate::runtime::request::PreparedRequest;
use crate::runtime::response::{CacheableMetadata, SubResponse};
use anyhow::{Context as AnyhowContext, Result};
use async_trait::async_trait;
use http::{HeaderMap, header};
use reqwest::Client;
use url::Url;

/// The collaborator that actually dispatches a prepared request.
///
/// Stands in for the host framework's HTTP kernel. Failures here are opaque
/// to the orchestrator and abort the whole blueprint.
#[async_trait]
pub trait RequestExecutor: Send + Sync {
    async fn handle(&self, request: PreparedRequest) -> Result<SubResponse>;
}

/// Executor that dispatches subrequests as real HTTP requests against a
/// base URL.
pub struct ReqwestExecutor {
    client: Client,
    base_url: Url,
}

impl ReqwestExecutor {
    pub fn new(base_url: Url) -> Self {
        Self {
            client: Client::new(),
            base_url,
        }
    }
}

#[async_trait]
impl RequestExecutor for ReqwestExecutor {
    async fn handle(&self, request: PreparedRequest) -> Result<SubResponse> {
        let mut url = self
            .base_url
            .join(&request.path)
            .with_context(|| format!("Invalid subrequest path {}", request.path))?;
        if !request.query.is_empty() {
            url.query_pairs_mut().extend_pairs(&request.query);
        }

        let mut builder = self
            .client
            .request(request.method.clone(), url)
            .headers(request.headers.clone());
        if !request.cookies.is_empty() && !request.headers.contains_key(header::COOKIE) {
            let cookie = request
                .cookies
                .iter()
                .map(|(name, value)| format!("{name}={value}"))
                .collect::<Vec<_>>()
                .join("; ");
            builder = builder.header(header::COOKIE, cookie);
        }
        if let Some(auth) = &request.authorization {
            builder = builder.basic_auth(&auth.user, Some(&auth.password));
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.text().await?;
        Ok(SubResponse {
            status,
            cacheability: cacheability_from_headers(&headers),
            headers,
            body,
        })
    }
}

/// Derives cache metadata from the Cache-Control header. Responses without
/// a positive max-age are treated as not independently cacheable.
fn cacheability_from_headers(headers: &HeaderMap) -> Option<CacheableMetadata> {
    let value = headers.get(header::CACHE_CONTROL)?.to_str().ok()?;
    let mut max_age = None;
    for directive in value.split(',') {
        let directive = directive.trim();
        if directive.eq_ignore_ascii_case("no-store") || directive.eq_ignore_ascii_case("private")
        {
            return None;
        }
        if let Some(age) = directive.strip_prefix("max-age=") {
            max_age = age.trim().parse::<u32>().ok();
        }
    }
    match max_age {
        Some(age) if age > 0 => Some(CacheableMetadata {
            tags: Default::default(),
            max_age: Some(age),
        }),
        _ => None,
    }
}
