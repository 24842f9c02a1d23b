//! Multiplexer configuration

use crate::error::MuxError;
use crate::policy::ExceptionPolicy;
use courier_connection::Connection;
use courier_types::ComponentId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Maps a protocol specification id back to the concrete protocol id that
/// routing and the connection filters speak.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolDescriptor {
    pub protocol_id: ComponentId,
    pub specification_id: ComponentId,
}

/// Per-operation time bounds. Each bound covers one connection's operation,
/// not the whole orchestration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MuxTimeouts {
    pub connect: Duration,
    pub disconnect: Duration,
    pub send: Duration,
}

impl Default for MuxTimeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(60),
            disconnect: Duration::from_secs(60),
            send: Duration::from_secs(10),
        }
    }
}

/// Configuration for [`AsyncMultiplexer`](crate::AsyncMultiplexer) and the
/// threaded [`Multiplexer`](crate::Multiplexer) facade.
///
/// Validation happens at engine construction: duplicate connection ids, an
/// out-of-range default index or an unknown default connection id are fatal.
#[derive(Default)]
pub struct MultiplexerConfig {
    /// Registered connections, in registration order.
    pub connections: Vec<Arc<dyn Connection>>,
    /// Default connection by id. Mutually exclusive with
    /// `default_connection_index`.
    pub default_connection: Option<ComponentId>,
    /// Default connection by position in `connections`.
    pub default_connection_index: Option<usize>,
    /// Per-protocol default routing: protocol id to connection id.
    pub default_routing: HashMap<ComponentId, ComponentId>,
    pub exception_policy: ExceptionPolicy,
    /// Known protocols, for specification-id to protocol-id resolution.
    pub protocols: Vec<ProtocolDescriptor>,
    pub timeouts: MuxTimeouts,
}

impl MultiplexerConfig {
    pub fn new(connections: Vec<Arc<dyn Connection>>) -> Self {
        Self {
            connections,
            ..Default::default()
        }
    }

    /// Resolve the effective default connection id: explicit id, then index,
    /// then the first registered connection.
    pub(crate) fn resolve_default_connection(&self) -> Result<Option<ComponentId>, MuxError> {
        match (&self.default_connection, self.default_connection_index) {
            (Some(_), Some(_)) => Err(MuxError::Config(
                "specify default_connection or default_connection_index, not both".to_string(),
            )),
            (Some(id), None) => {
                if !self.connections.iter().any(|c| c.id() == id) {
                    return Err(MuxError::Config(format!(
                        "default connection {id} is not registered"
                    )));
                }
                Ok(Some(id.clone()))
            }
            (None, Some(index)) => match self.connections.get(index) {
                Some(connection) => Ok(Some(connection.id().clone())),
                None => Err(MuxError::Config(format!(
                    "default connection index {index} out of range for {} connections",
                    self.connections.len()
                ))),
            },
            (None, None) => Ok(self.connections.first().map(|c| c.id().clone())),
        }
    }
}
