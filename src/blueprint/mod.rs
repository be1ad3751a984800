pub mod loader;
pub mod manager;
pub mod parser;
pub mod sequencer;

use http::Method;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// Dependency anchor for subrequests that can run in the first wave.
pub const ROOT_ID: &str = "<ROOT>";

/// The action to perform, mapping 1:1 to an HTTP method.
///
/// Unknown actions are rejected while parsing the blueprint, not when the
/// request is dispatched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    #[default]
    View,
    Create,
    Update,
    Replace,
    Delete,
    Exists,
    Discover,
}

impl Action {
    pub fn method(self) -> Method {
        match self {
            Action::View => Method::GET,
            Action::Create => Method::POST,
            Action::Update => Method::PATCH,
            Action::Replace => Method::PUT,
            Action::Delete => Method::DELETE,
            Action::Exists => Method::HEAD,
            Action::Discover => Method::OPTIONS,
        }
    }
}

/// Value object containing a single subrequest.
///
/// Instances are never mutated once sequenced; token replacement produces
/// clones instead (see `replacer`).
#[derive(Debug, Clone, PartialEq)]
pub struct Subrequest {
    /// Unique ID within one blueprint. Fan-out clones derive theirs from it.
    pub request_id: String,
    /// The URI to request. May contain `{{id.body@$.path}}` tokens.
    pub uri: String,
    pub action: Action,
    /// The parsed JSON body, if any. May contain tokens once serialized.
    pub body: Option<Value>,
    pub headers: BTreeMap<String, String>,
    /// IDs of the subrequests this one depends on, or `<ROOT>`.
    pub wait_for: Vec<String>,
    /// True once every token has been substituted with a concrete value.
    pub resolved: bool,
}

impl Subrequest {
    pub fn is_rooted(&self) -> bool {
        self.wait_for.len() == 1 && self.wait_for[0] == ROOT_ID
    }
}

/// The execution tree: subrequests grouped into waves.
///
/// All members of one wave only depend on previous waves, so they are free
/// to run concurrently. Built once by the sequencer, read-only afterwards.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubrequestsTree {
    levels: Vec<Vec<Subrequest>>,
}

impl SubrequestsTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pushes a wave of subrequests onto the stack.
    pub fn stack(&mut self, subrequests: Vec<Subrequest>) {
        self.levels.push(subrequests);
    }

    pub fn num_levels(&self) -> usize {
        self.levels.len()
    }

    pub fn level(&self, index: usize) -> Option<&[Subrequest]> {
        self.levels.get(index).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Vec<Subrequest>> {
        self.levels.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Vec<Subrequest>> {
        self.levels.iter_mut()
    }

    /// All request IDs placed so far, `<ROOT>` first, deduplicated.
    pub fn all_ids(&self) -> Vec<String> {
        let mut ids = vec![ROOT_ID.to_string()];
        for level in &self.levels {
            for subrequest in level {
                if !ids.contains(&subrequest.request_id) {
                    ids.push(subrequest.request_id.clone());
                }
            }
        }
        ids
    }
}
