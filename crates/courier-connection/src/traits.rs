//! The connection contract
//!
//! A connection is the bridge between the multiplexer and one transport. The
//! multiplexer only ever talks to this trait; protocol filters are declared
//! here and enforced by the routing layer, not by implementations.

use crate::error::ConnectionError;
use crate::state::ConnectionState;
use async_trait::async_trait;
use courier_types::{ComponentId, Envelope};
use std::collections::HashSet;
use std::sync::OnceLock;

fn empty_protocol_set() -> &'static HashSet<ComponentId> {
    static EMPTY: OnceLock<HashSet<ComponentId>> = OnceLock::new();
    EMPTY.get_or_init(HashSet::new)
}

/// One transport as seen by the multiplexer.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Stable identifier of this connection.
    fn id(&self) -> &ComponentId;

    /// Current lifecycle state.
    fn state(&self) -> ConnectionState;

    /// Establish the underlying transport. Idempotent: connecting an already
    /// connected connection is a no-op.
    async fn connect(&self) -> Result<(), ConnectionError>;

    /// Tear down the underlying transport. Idempotent like `connect`.
    async fn disconnect(&self) -> Result<(), ConnectionError>;

    /// Deliver one envelope outward. Valid only while connected; fails fast
    /// otherwise.
    async fn send(&self, envelope: Envelope) -> Result<(), ConnectionError>;

    /// Await the next inbound envelope. `Ok(None)` means the connection has
    /// been torn down; "nothing available yet" blocks, it is never an error.
    async fn receive(&self) -> Result<Option<Envelope>, ConnectionError>;

    /// If non-empty, the only protocols this connection will carry.
    fn restricted_to_protocols(&self) -> &HashSet<ComponentId> {
        empty_protocol_set()
    }

    /// Protocols this connection refuses to carry.
    fn excluded_protocols(&self) -> &HashSet<ComponentId> {
        empty_protocol_set()
    }

    fn is_connected(&self) -> bool {
        self.state().is_connected()
    }
}
