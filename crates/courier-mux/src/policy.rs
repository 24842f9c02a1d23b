//! Reaction policy for runtime loop errors

use serde::{Deserialize, Serialize};

/// How the send and receive loops react to a transport or timeout error
/// raised while the multiplexer is running.
///
/// Orchestration errors (connect/disconnect) are not subject to this policy;
/// they always surface to the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExceptionPolicy {
    /// Re-raise: the loop terminates in an error state.
    #[default]
    Propagate,
    /// Log the error and keep the loop running.
    LogAndContinue,
    /// Log the error and schedule a full multiplexer disconnection.
    StopAndExit,
}
