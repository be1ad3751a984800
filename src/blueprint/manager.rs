use crate::blueprint::SubrequestsTree;
use crate::blueprint::parser::BlueprintParser;
use crate::blueprint::sequencer::build_execution_sequence;
use crate::error::Result;
use crate::multiresponse::{self, AggregateResponse, OutputFormat};
use crate::runtime::request::MasterContext;
use crate::runtime::response::SubResponse;

/// Front door of the orchestrator: turns user input into an execution tree
/// and the finished response pool into a single payload.
pub struct BlueprintManager {
    parser: BlueprintParser,
}

impl BlueprintManager {
    pub fn new() -> Self {
        Self {
            parser: BlueprintParser::new(),
        }
    }

    /// Takes the user input and returns a subrequest tree ready for
    /// execution.
    pub fn parse(&self, input: &str, master: &MasterContext) -> Result<SubrequestsTree> {
        let parsed = self.parser.parse_str(input)?;
        let mut tree = build_execution_sequence(parsed)?;
        // Forward the Host header to play nice with decoupled routers.
        forward_header("host", master, &mut tree);
        Ok(tree)
    }

    /// Combines the responses into a single 207 response in the requested
    /// format, with merged cacheability.
    pub fn combine_responses(
        &self,
        responses: &[SubResponse],
        format: OutputFormat,
    ) -> AggregateResponse {
        multiresponse::combine(responses, format)
    }
}

impl Default for BlueprintManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Copies one master request header onto every subrequest that did not set
/// that header itself. Explicit subrequest headers always win.
fn forward_header(name: &str, master: &MasterContext, tree: &mut SubrequestsTree) {
    let Some(value) = master.header(name) else {
        return;
    };
    for level in tree.iter_mut() {
        for subrequest in level {
            let already_set = subrequest
                .headers
                .keys()
                .any(|key| key.eq_ignore_ascii_case(name));
            if !already_set {
                subrequest.headers.insert(name.to_string(), value.clone());
            }
        }
    }
}
