//! Error types for the connection layer

use thiserror::Error;

/// Errors raised by connection implementations.
///
/// `Timeout` is kept distinct from `Transport` so callers can tell a bounded
/// operation that ran out of time apart from a transport-raised failure.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("operation timed out: {0}")]
    Timeout(String),

    #[error("connection closed")]
    Closed,
}
