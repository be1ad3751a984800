use crate::blueprint::Subrequest;
use crate::error::{Result, SubrequestsError};
use crate::runtime::response::CONTENT_ID;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use http::{HeaderMap, HeaderName, HeaderValue, Method, header};
use serde_json::Value;

/// State of the outer request that carries into every subrequest: headers
/// worth forwarding and the cookies holding the session.
#[derive(Debug, Clone, Default)]
pub struct MasterContext {
    pub headers: HeaderMap,
    pub cookies: Vec<(String, String)>,
}

impl MasterContext {
    pub fn header(&self, name: &str) -> Option<String> {
        self.headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
    }
}

/// Credentials decoded out of a `Basic` Authorization header, so the
/// executor can authenticate the simulated request like a real inbound one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicAuth {
    pub user: String,
    pub password: String,
}

/// A fully resolved subrequest, ready to hand to the executor.
#[derive(Debug, Clone)]
pub struct PreparedRequest {
    pub method: Method,
    pub path: String,
    /// Parsed query pairs. Only populated when the subrequest has no body;
    /// with a body the query string stays verbatim on the path.
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
    pub headers: HeaderMap,
    /// Cookies inherited from the master request.
    pub cookies: Vec<(String, String)>,
    pub authorization: Option<BasicAuth>,
}

impl PreparedRequest {
    /// Builds the request for one resolved subrequest.
    pub fn from_subrequest(subrequest: &Subrequest, master: &MasterContext) -> Result<Self> {
        let (path, query) = if subrequest.body.is_some() {
            (subrequest.uri.clone(), Vec::new())
        } else {
            match subrequest.uri.split_once('?') {
                Some((path, query_string)) => (
                    path.to_string(),
                    url::form_urlencoded::parse(query_string.as_bytes())
                        .into_owned()
                        .collect(),
                ),
                None => (subrequest.uri.clone(), Vec::new()),
            }
        };

        let mut headers = HeaderMap::new();
        for (name, value) in &subrequest.headers {
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| {
                SubrequestsError::MalformedBlueprint(format!(
                    "{name} is not a valid header name on {}",
                    subrequest.request_id
                ))
            })?;
            let value = HeaderValue::from_str(value).map_err(|_| {
                SubrequestsError::MalformedBlueprint(format!(
                    "the {name} header of {} has an invalid value",
                    subrequest.request_id
                ))
            })?;
            headers.append(name, value);
        }

        let content_id = HeaderValue::from_str(&format!("<{}>", subrequest.request_id))
            .map_err(|_| {
                SubrequestsError::MalformedBlueprint(format!(
                    "request id {} cannot be used as a Content-ID",
                    subrequest.request_id
                ))
            })?;
        headers.insert(CONTENT_ID, content_id);

        Ok(Self {
            method: subrequest.action.method(),
            path,
            query,
            body: subrequest.body.clone(),
            authorization: decode_basic_auth(&headers),
            headers,
            cookies: master.cookies.clone(),
        })
    }
}

/// Pulls user and password out of a `Basic` Authorization header, if there
/// is one. Malformed headers are left for the executor to reject.
fn decode_basic_auth(headers: &HeaderMap) -> Option<BasicAuth> {
    let header = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let encoded = header.strip_prefix("Basic ")?;
    let decoded = String::from_utf8(STANDARD.decode(encoded).ok()?).ok()?;
    let (user, password) = decoded.split_once(':')?;
    Some(BasicAuth {
        user: user.to_string(),
        password: password.to_string(),
    })
}
