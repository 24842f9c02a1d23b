//! Scriptable connection for engine tests

use courier_connection::{Connection, ConnectionError, ConnectionState, StateCell};
use courier_types::{ComponentId, Envelope};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex as StdMutex;
use tokio::sync::{mpsc, Mutex as TokioMutex};

type InboundItem = Result<Envelope, ConnectionError>;

/// In-memory connection with failure injection and call counters.
pub(crate) struct MockConnection {
    id: ComponentId,
    state: StateCell<ConnectionState>,
    restricted: HashSet<ComponentId>,
    excluded: HashSet<ComponentId>,
    connect_calls: AtomicUsize,
    disconnect_calls: AtomicUsize,
    receive_calls: AtomicUsize,
    fail_connect: AtomicBool,
    fail_send: AtomicBool,
    hang_connect: AtomicBool,
    hang_send: AtomicBool,
    hang_disconnect: AtomicBool,
    sent: StdMutex<Vec<Envelope>>,
    inbound_tx: StdMutex<Option<mpsc::UnboundedSender<InboundItem>>>,
    inbound: TokioMutex<mpsc::UnboundedReceiver<InboundItem>>,
    active_receives: AtomicUsize,
}

struct ReceiveGuard<'a>(&'a AtomicUsize);

impl<'a> ReceiveGuard<'a> {
    fn new(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for ReceiveGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MockConnection {
    pub(crate) fn new(name: &str) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        Self {
            id: ComponentId::new("courier", name, "0.1.0").unwrap(),
            state: StateCell::new(ConnectionState::Disconnected),
            restricted: HashSet::new(),
            excluded: HashSet::new(),
            connect_calls: AtomicUsize::new(0),
            disconnect_calls: AtomicUsize::new(0),
            receive_calls: AtomicUsize::new(0),
            fail_connect: AtomicBool::new(false),
            fail_send: AtomicBool::new(false),
            hang_connect: AtomicBool::new(false),
            hang_send: AtomicBool::new(false),
            hang_disconnect: AtomicBool::new(false),
            sent: StdMutex::new(Vec::new()),
            inbound_tx: StdMutex::new(Some(inbound_tx)),
            inbound: TokioMutex::new(inbound_rx),
            active_receives: AtomicUsize::new(0),
        }
    }

    pub(crate) fn restricted_to(mut self, protocols: HashSet<ComponentId>) -> Self {
        self.restricted = protocols;
        self
    }

    pub(crate) fn excluding(mut self, protocols: HashSet<ComponentId>) -> Self {
        self.excluded = protocols;
        self
    }

    pub(crate) fn fail_next_connect(&self) {
        self.fail_connect.store(true, Ordering::SeqCst);
    }

    pub(crate) fn fail_next_send(&self) {
        self.fail_send.store(true, Ordering::SeqCst);
    }

    /// Make the next connect never resolve.
    pub(crate) fn hang_next_connect(&self) {
        self.hang_connect.store(true, Ordering::SeqCst);
    }

    /// Make the next send never resolve.
    pub(crate) fn hang_next_send(&self) {
        self.hang_send.store(true, Ordering::SeqCst);
    }

    /// Make the next disconnect never resolve, leaving the state as is.
    pub(crate) fn hang_next_disconnect(&self) {
        self.hang_disconnect.store(true, Ordering::SeqCst);
    }

    /// Queue an envelope for the engine to receive.
    pub(crate) fn push_inbound(&self, envelope: Envelope) {
        self.inbound_tx
            .lock()
            .unwrap()
            .as_ref()
            .unwrap()
            .send(Ok(envelope))
            .unwrap();
    }

    /// Make the pending receive resolve with a transport error.
    pub(crate) fn push_inbound_failure(&self) {
        self.inbound_tx
            .lock()
            .unwrap()
            .as_ref()
            .unwrap()
            .send(Err(ConnectionError::Transport("injected".to_string())))
            .unwrap();
    }

    /// Close the receive side: every receive from now on resolves `Ok(None)`
    /// while the lifecycle state stays untouched.
    pub(crate) fn close_inbound(&self) {
        self.inbound_tx.lock().unwrap().take();
    }

    pub(crate) fn connect_calls(&self) -> usize {
        self.connect_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn disconnect_calls(&self) -> usize {
        self.disconnect_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn receive_calls(&self) -> usize {
        self.receive_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn sent(&self) -> Vec<Envelope> {
        self.sent.lock().unwrap().clone()
    }

    /// Number of receive calls currently parked on this connection.
    pub(crate) fn active_receives(&self) -> usize {
        self.active_receives.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connection for MockConnection {
    fn id(&self) -> &ComponentId {
        &self.id
    }

    fn state(&self) -> ConnectionState {
        self.state.get()
    }

    async fn connect(&self) -> Result<(), ConnectionError> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        if self.hang_connect.swap(false, Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.fail_connect.swap(false, Ordering::SeqCst) {
            return Err(ConnectionError::Transport(
                "injected connect failure".to_string(),
            ));
        }
        self.state.set(ConnectionState::Connected);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), ConnectionError> {
        self.disconnect_calls.fetch_add(1, Ordering::SeqCst);
        if self.hang_disconnect.swap(false, Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        self.state.set(ConnectionState::Disconnected);
        Ok(())
    }

    async fn send(&self, envelope: Envelope) -> Result<(), ConnectionError> {
        if !self.state.get().is_connected() {
            return Err(ConnectionError::InvalidState(format!(
                "connection {} is not connected",
                self.id
            )));
        }
        if self.hang_send.swap(false, Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.fail_send.swap(false, Ordering::SeqCst) {
            return Err(ConnectionError::Transport(
                "injected send failure".to_string(),
            ));
        }
        self.sent.lock().unwrap().push(envelope);
        Ok(())
    }

    async fn receive(&self) -> Result<Option<Envelope>, ConnectionError> {
        self.receive_calls.fetch_add(1, Ordering::SeqCst);
        let _guard = ReceiveGuard::new(&self.active_receives);
        let mut inbound = self.inbound.lock().await;
        match inbound.recv().await {
            Some(Ok(envelope)) => Ok(Some(envelope)),
            Some(Err(error)) => Err(error),
            None => Ok(None),
        }
    }

    fn restricted_to_protocols(&self) -> &HashSet<ComponentId> {
        &self.restricted
    }

    fn excluded_protocols(&self) -> &HashSet<ComponentId> {
        &self.excluded
    }
}
