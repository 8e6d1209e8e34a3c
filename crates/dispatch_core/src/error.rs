use std::error;
use std::fmt;

use model::ids::{EventId, TargetId};

/// Errors that indicate the engine's own invariants were violated — never
/// raised by bad simulator data, only by a bug in the engine itself. Callers
/// should log these at `error` level, not swallow them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    MissingNode(EventId),
    MissingTarget(TargetId),
}

impl error::Error for CoreError {}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoreError::MissingNode(id) => write!(f, "event graph has no node {id}"),
            CoreError::MissingTarget(id) => write!(f, "target graph has no node {id}"),
        }
    }
}

/// The public failure surface of the dispatcher-intent API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntentError {
    CycleIntroduced,
    UnknownTarget(TargetId),
    UnknownEvent(EventId),
}

impl error::Error for IntentError {}

impl fmt::Display for IntentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntentError::CycleIntroduced => {
                write!(f, "operation would introduce a cycle, rejected")
            }
            IntentError::UnknownTarget(id) => write!(f, "unknown target: {id}"),
            IntentError::UnknownEvent(id) => write!(f, "unknown event: {id}"),
        }
    }
}

impl From<CoreError> for IntentError {
    fn from(value: CoreError) -> Self {
        match value {
            CoreError::MissingNode(id) => IntentError::UnknownEvent(id),
            CoreError::MissingTarget(id) => IntentError::UnknownTarget(id),
        }
    }
}
