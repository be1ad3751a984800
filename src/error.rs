use thiserror::Error;

/// Everything that can go wrong while running a blueprint.
///
/// All variants except `Executor` are detected before any subrequest is
/// dispatched and map to a 400-class response. Executor failures happen
/// mid-execution, abort the remaining waves and surface as-is.
#[derive(Debug, Error)]
pub enum SubrequestsError {
    #[error("Blueprint must be a list of subrequests. Got: {0}")]
    MalformedBlueprint(String),

    #[error("Waiting for unresolvable request {}. Abort.", pending.join(", "))]
    UnresolvableDependency { pending: Vec<String> },

    #[error(
        "Unable to find specified request for a replacement {id}. Candidates are [{}].",
        candidates.join(", ")
    )]
    UnresolvableToken { id: String, candidates: Vec<String> },

    #[error("The replacement token did not find a list of strings. Instead it found {0}.")]
    InvalidReplacementValue(String),

    #[error(transparent)]
    Executor(#[from] anyhow::Error),
}

impl SubrequestsError {
    /// True for errors caused by the submitted blueprint rather than by the
    /// executor. Callers should answer these with a 400, not a 500.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, SubrequestsError::Executor(_))
    }
}

pub type Result<T> = std::result::Result<T, SubrequestsError>;
