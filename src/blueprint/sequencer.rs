use crate::blueprint::{Subrequest, SubrequestsTree};
use crate::error::{Result, SubrequestsError};

/// Builds the execution tree out of the parsed subrequests.
///
/// Kahn-style layering: wave 0 holds everything anchored to `<ROOT>`, each
/// following wave holds the subrequests whose dependencies are all satisfied
/// by earlier waves. Declaration order is preserved inside a wave so the
/// final response ordering is deterministic.
pub fn build_execution_sequence(parsed: Vec<Subrequest>) -> Result<SubrequestsTree> {
    let mut sequence = SubrequestsTree::new();
    let (rooted, mut pending): (Vec<_>, Vec<_>) =
        parsed.into_iter().partition(Subrequest::is_rooted);
    sequence.stack(rooted);

    while !pending.is_empty() {
        let satisfied = sequence.all_ids();
        let (placeable, rest): (Vec<_>, Vec<_>) = pending
            .into_iter()
            .partition(|item| item.wait_for.iter().all(|id| satisfied.contains(id)));
        if placeable.is_empty() {
            // A cycle or a reference to an ID that does not exist.
            return Err(SubrequestsError::UnresolvableDependency {
                pending: rest.into_iter().map(|item| item.request_id).collect(),
            });
        }
        sequence.stack(placeable);
        pending = rest;
    }

    Ok(sequence)
}
