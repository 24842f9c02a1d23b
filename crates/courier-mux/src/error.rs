//! Error types for the multiplexing engine

use courier_connection::ConnectionError;
use courier_types::{ComponentId, EnvelopeError};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// One connection's failure inside an aggregate orchestration error.
#[derive(Debug)]
pub struct ConnectionFailure {
    pub connection_id: ComponentId,
    pub error: ConnectionError,
}

impl fmt::Display for ConnectionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.connection_id, self.error)
    }
}

fn join_failures(failures: &[ConnectionFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors raised by the multiplexer and its facades.
#[derive(Debug, Error)]
pub enum MuxError {
    #[error("invalid multiplexer configuration: {0}")]
    Config(String),

    #[error("failed to connect the multiplexer: {}", join_failures(.0))]
    ConnectFailed(Vec<ConnectionFailure>),

    #[error("multiplexer teardown left connections up: {}", join_failures(.0))]
    TeardownFailed(Vec<ConnectionFailure>),

    #[error("connection {connection_id} failed: {source}")]
    Connection {
        connection_id: ComponentId,
        #[source]
        source: ConnectionError,
    },

    #[error("{operation} timed out after {timeout:?} on connection {connection_id}")]
    ConnectionTimeout {
        connection_id: ComponentId,
        operation: &'static str,
        timeout: Duration,
    },

    #[error("multiplexer is not connected")]
    NotConnected,

    #[error("invalid envelope: {0}")]
    InvalidEnvelope(#[from] EnvelopeError),

    #[error("no envelope available")]
    Empty,

    #[error("facade call timed out after {0:?}")]
    FacadeTimeout(Duration),

    #[error("runtime error: {0}")]
    Runtime(String),
}
