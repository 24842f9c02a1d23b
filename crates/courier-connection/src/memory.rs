//! In-memory transport for development and tests
//!
//! A `MemoryConnection` is either a loopback (envelopes sent on it come
//! straight back) or one half of a cross-linked pair. It honours the full
//! connection state machine, which makes it the reference implementation of
//! the contract for the engine's tests.

use crate::error::ConnectionError;
use crate::state::{ConnectionState, StateCell};
use crate::traits::Connection;
use async_trait::async_trait;
use courier_types::{ComponentId, Envelope};
use std::collections::HashSet;
use tokio::sync::mpsc;
use tokio::sync::{Mutex, Notify};
use tracing::debug;

/// Loopback or paired in-memory connection.
pub struct MemoryConnection {
    id: ComponentId,
    state: StateCell<ConnectionState>,
    restricted: HashSet<ComponentId>,
    excluded: HashSet<ComponentId>,
    outbound: mpsc::UnboundedSender<Envelope>,
    inbound: Mutex<mpsc::UnboundedReceiver<Envelope>>,
    shutdown: Notify,
}

impl MemoryConnection {
    /// Loopback connection: everything sent is received back on the same
    /// connection.
    pub fn loopback(id: ComponentId) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self::from_channels(id, tx, rx)
    }

    /// Cross-linked pair: envelopes sent on one side are received on the
    /// other.
    pub fn pair(id_a: ComponentId, id_b: ComponentId) -> (Self, Self) {
        let (tx_a, rx_a) = mpsc::unbounded_channel();
        let (tx_b, rx_b) = mpsc::unbounded_channel();
        (
            Self::from_channels(id_a, tx_b, rx_a),
            Self::from_channels(id_b, tx_a, rx_b),
        )
    }

    fn from_channels(
        id: ComponentId,
        outbound: mpsc::UnboundedSender<Envelope>,
        inbound: mpsc::UnboundedReceiver<Envelope>,
    ) -> Self {
        Self {
            id,
            state: StateCell::new(ConnectionState::Disconnected),
            restricted: HashSet::new(),
            excluded: HashSet::new(),
            outbound,
            inbound: Mutex::new(inbound),
            shutdown: Notify::new(),
        }
    }

    pub fn with_restricted_protocols(mut self, protocols: HashSet<ComponentId>) -> Self {
        self.restricted = protocols;
        self
    }

    pub fn with_excluded_protocols(mut self, protocols: HashSet<ComponentId>) -> Self {
        self.excluded = protocols;
        self
    }

    fn ensure_connected(&self) -> Result<(), ConnectionError> {
        let state = self.state.get();
        if !state.is_connected() {
            return Err(ConnectionError::InvalidState(format!(
                "connection {} is {state}",
                self.id
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl Connection for MemoryConnection {
    fn id(&self) -> &ComponentId {
        &self.id
    }

    fn state(&self) -> ConnectionState {
        self.state.get()
    }

    async fn connect(&self) -> Result<(), ConnectionError> {
        if self.state.get().is_connected() {
            return Ok(());
        }
        self.state
            .transit(
                ConnectionState::Connecting,
                ConnectionState::Connected,
                ConnectionState::Disconnected,
                async { Ok::<(), ConnectionError>(()) },
            )
            .await?;
        debug!(connection_id = %self.id, "memory connection established");
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), ConnectionError> {
        if self.state.get().is_disconnected() {
            return Ok(());
        }
        self.state
            .transit(
                ConnectionState::Disconnecting,
                ConnectionState::Disconnected,
                ConnectionState::Disconnected,
                async {
                    self.shutdown.notify_waiters();
                    Ok::<(), ConnectionError>(())
                },
            )
            .await?;
        debug!(connection_id = %self.id, "memory connection torn down");
        Ok(())
    }

    async fn send(&self, envelope: Envelope) -> Result<(), ConnectionError> {
        self.ensure_connected()?;
        self.outbound
            .send(envelope)
            .map_err(|_| ConnectionError::Closed)
    }

    async fn receive(&self) -> Result<Option<Envelope>, ConnectionError> {
        self.ensure_connected()?;
        let mut inbound = self.inbound.lock().await;
        tokio::select! {
            _ = self.shutdown.notified() => Ok(None),
            maybe = inbound.recv() => Ok(maybe),
        }
    }

    fn restricted_to_protocols(&self) -> &HashSet<ComponentId> {
        &self.restricted
    }

    fn excluded_protocols(&self) -> &HashSet<ComponentId> {
        &self.excluded
    }
}
