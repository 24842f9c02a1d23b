//! Connection lifecycle states and the awaitable state cell

use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;

/// Lifecycle state of a connection (and, aggregated, of the multiplexer).
///
/// Legal transitions: disconnected -> connecting -> connected ->
/// disconnecting -> disconnected, plus connecting -> disconnected on a
/// failed connect.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }

    pub fn is_disconnected(&self) -> bool {
        matches!(self, ConnectionState::Disconnected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Disconnecting => "disconnecting",
        };
        write!(f, "{s}")
    }
}

/// A shared, awaitable cell holding a single value.
///
/// Readers can poll the current value with [`get`](StateCell::get) or await a
/// specific value with [`wait_for`](StateCell::wait_for). The cell stays
/// alive for as long as any clone of it does.
#[derive(Debug, Clone)]
pub struct StateCell<T> {
    tx: Arc<watch::Sender<T>>,
}

impl<T> StateCell<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    pub fn new(initial: T) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx: Arc::new(tx) }
    }

    pub fn get(&self) -> T {
        self.tx.borrow().clone()
    }

    pub fn set(&self, value: T) {
        self.tx.send_replace(value);
    }

    /// Wait until the cell holds `target`. Returns immediately if it already
    /// does.
    pub async fn wait_for(&self, target: T) {
        let mut rx = self.tx.subscribe();
        // The sender lives inside self, so the channel cannot close here.
        let _ = rx.wait_for(|value| *value == target).await;
    }

    /// Run a fallible future inside a state transition: enter `initial`,
    /// land on `success` if the future succeeds and on `fail` if it errors.
    pub async fn transit<F, E>(&self, initial: T, success: T, fail: T, fut: F) -> Result<(), E>
    where
        F: Future<Output = Result<(), E>>,
    {
        self.set(initial);
        match fut.await {
            Ok(()) => {
                self.set(success);
                Ok(())
            }
            Err(e) => {
                self.set(fail);
                Err(e)
            }
        }
    }
}

impl<T> Default for StateCell<T>
where
    T: Clone + Default + PartialEq + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new(T::default())
    }
}
