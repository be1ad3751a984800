//! Batch-request orchestrator: parses a declarative blueprint of
//! subrequests, sequences them by dependency into waves, resolves JSONPath
//! tokens against earlier responses, dispatches every wave through an
//! executor and merges the responses into one 207 payload.

pub mod blueprint;
pub mod error;
pub mod multiresponse;
pub mod replacer;
pub mod runtime;
