//! The asynchronous multiplexing engine
//!
//! One send loop fans envelopes out to connections, one receive loop fans
//! inbound envelopes in from all connections into a single queue. The engine
//! aggregates the lifecycle state of its connections and orchestrates their
//! connect and disconnect as a unit.

use crate::config::{MultiplexerConfig, MuxTimeouts};
use crate::error::{ConnectionFailure, MuxError};
use crate::policy::ExceptionPolicy;
use crate::queue::InboundQueue;
use crate::routing::RoutingTable;
use courier_connection::{Connection, ConnectionError, ConnectionState, StateCell};
use courier_types::{ComponentId, Envelope};
use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch, Mutex as TokioMutex};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

/// Items travelling down the send loop's channel. The sentinel terminates
/// the loop; the channel is recreated on every connect so a stale sentinel
/// can never leak into a later session.
enum Outbound {
    Envelope(Envelope),
    Stop,
}

#[derive(Default)]
struct LoopHandles {
    send: Option<JoinHandle<Result<(), MuxError>>>,
    recv: Option<JoinHandle<Result<(), MuxError>>>,
}

struct Inner {
    connections: Vec<Arc<dyn Connection>>,
    by_id: HashMap<ComponentId, Arc<dyn Connection>>,
    routing: RoutingTable,
    spec_to_protocol: HashMap<ComponentId, ComponentId>,
    policy: ExceptionPolicy,
    timeouts: MuxTimeouts,
    handle: Handle,
    status: StateCell<ConnectionState>,
    queue: InboundQueue,
    out_tx: StdMutex<Option<mpsc::UnboundedSender<Outbound>>>,
    shutdown_tx: StdMutex<Option<watch::Sender<bool>>>,
    loops: TokioMutex<LoopHandles>,
    // Serializes connect/disconnect orchestration.
    op_lock: TokioMutex<()>,
    last_loop_error: StdMutex<Option<MuxError>>,
}

/// Cheap-to-clone handle over the shared engine.
#[derive(Clone)]
pub struct AsyncMultiplexer {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for AsyncMultiplexer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncMultiplexer").finish_non_exhaustive()
    }
}

impl AsyncMultiplexer {
    /// Build the engine. Loops and scheduled disconnections are spawned on
    /// `handle`; the engine never queries an ambient runtime.
    pub fn new(config: MultiplexerConfig, handle: Handle) -> Result<Self, MuxError> {
        let default_connection = config.resolve_default_connection()?;

        let mut by_id: HashMap<ComponentId, Arc<dyn Connection>> = HashMap::new();
        for connection in &config.connections {
            if by_id
                .insert(connection.id().clone(), connection.clone())
                .is_some()
            {
                return Err(MuxError::Config(format!(
                    "duplicate connection id {}",
                    connection.id()
                )));
            }
        }

        let mut spec_to_protocol = HashMap::new();
        for descriptor in &config.protocols {
            if spec_to_protocol
                .insert(
                    descriptor.specification_id.clone(),
                    descriptor.protocol_id.clone(),
                )
                .is_some()
            {
                return Err(MuxError::Config(format!(
                    "duplicate protocol specification id {}",
                    descriptor.specification_id
                )));
            }
        }

        Ok(Self {
            inner: Arc::new(Inner {
                connections: config.connections,
                by_id,
                routing: RoutingTable::new(config.default_routing, default_connection),
                spec_to_protocol,
                policy: config.exception_policy,
                timeouts: config.timeouts,
                handle,
                status: StateCell::new(ConnectionState::Disconnected),
                queue: InboundQueue::new(),
                out_tx: StdMutex::new(None),
                shutdown_tx: StdMutex::new(None),
                loops: TokioMutex::new(LoopHandles::default()),
                op_lock: TokioMutex::new(()),
                last_loop_error: StdMutex::new(None),
            }),
        })
    }

    /// Aggregate lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.inner.status.get()
    }

    /// Awaitable view of the aggregate state.
    pub fn status(&self) -> StateCell<ConnectionState> {
        self.inner.status.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Bring every registered connection up and start the loops. Idempotent.
    /// On any failure, partial progress is rolled back and one aggregate
    /// error naming every failed connection is returned.
    pub async fn connect(&self) -> Result<(), MuxError> {
        let _guard = self.inner.op_lock.lock().await;
        if self.inner.status.get().is_connected() {
            debug!("multiplexer already connected");
            return Ok(());
        }
        if self.inner.connections.is_empty() {
            return Err(MuxError::Config(
                "at least one connection is required".to_string(),
            ));
        }
        self.inner.status.set(ConnectionState::Connecting);

        let mut newly_connected: Vec<Arc<dyn Connection>> = Vec::new();
        let mut failures = Vec::new();
        for connection in &self.inner.connections {
            if connection.is_connected() {
                debug!(connection_id = %connection.id(), "connection already established");
                continue;
            }
            match timeout(self.inner.timeouts.connect, connection.connect()).await {
                Ok(Ok(())) => {
                    debug!(connection_id = %connection.id(), "connection established");
                    newly_connected.push(connection.clone());
                }
                Ok(Err(error)) => {
                    failures.push(ConnectionFailure {
                        connection_id: connection.id().clone(),
                        error,
                    });
                    break;
                }
                Err(_) => {
                    failures.push(ConnectionFailure {
                        connection_id: connection.id().clone(),
                        error: ConnectionError::Timeout(format!(
                            "connect exceeded {:?}",
                            self.inner.timeouts.connect
                        )),
                    });
                    break;
                }
            }
        }

        if failures.is_empty() {
            for connection in &self.inner.connections {
                if !connection.is_connected() {
                    failures.push(ConnectionFailure {
                        connection_id: connection.id().clone(),
                        error: ConnectionError::InvalidState(format!(
                            "still {} after connect",
                            connection.state()
                        )),
                    });
                }
            }
        }

        if !failures.is_empty() {
            warn!(
                failed = failures.len(),
                "multiplexer connection failed, rolling back"
            );
            for connection in newly_connected.iter().rev() {
                match timeout(self.inner.timeouts.disconnect, connection.disconnect()).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        warn!(connection_id = %connection.id(), error = %e, "rollback disconnect failed")
                    }
                    Err(_) => {
                        warn!(connection_id = %connection.id(), "rollback disconnect timed out")
                    }
                }
            }
            self.inner.status.set(ConnectionState::Disconnected);
            return Err(MuxError::ConnectFailed(failures));
        }

        self.start_loops().await;
        self.inner.status.set(ConnectionState::Connected);
        info!(
            connections = self.inner.connections.len(),
            "multiplexer connected"
        );
        Ok(())
    }

    /// Stop the loops and tear every connection down. Idempotent. Individual
    /// disconnect failures are logged; a connection still up afterwards
    /// produces one aggregate error.
    pub async fn disconnect(&self) -> Result<(), MuxError> {
        let _guard = self.inner.op_lock.lock().await;
        if self.inner.status.get().is_disconnected() && !self.loops_running().await {
            debug!("multiplexer already disconnected");
            return Ok(());
        }
        self.inner.status.set(ConnectionState::Disconnecting);
        self.stop_loops().await;

        for connection in &self.inner.connections {
            match connection.state() {
                ConnectionState::Connecting | ConnectionState::Connected => {
                    match timeout(self.inner.timeouts.disconnect, connection.disconnect()).await {
                        Ok(Ok(())) => {
                            debug!(connection_id = %connection.id(), "connection torn down")
                        }
                        Ok(Err(e)) => {
                            warn!(connection_id = %connection.id(), error = %e, "disconnect failed")
                        }
                        Err(_) => {
                            warn!(connection_id = %connection.id(), "disconnect timed out")
                        }
                    }
                }
                _ => {}
            }
        }

        let stuck: Vec<ConnectionFailure> = self
            .inner
            .connections
            .iter()
            .filter(|connection| !connection.state().is_disconnected())
            .map(|connection| ConnectionFailure {
                connection_id: connection.id().clone(),
                error: ConnectionError::InvalidState(format!(
                    "still {} after teardown",
                    connection.state()
                )),
            })
            .collect();
        if !stuck.is_empty() {
            return Err(MuxError::TeardownFailed(stuck));
        }

        self.inner.status.set(ConnectionState::Disconnected);
        info!("multiplexer disconnected");
        Ok(())
    }

    /// Enqueue an envelope for routing and delivery. Non-blocking.
    pub fn put(&self, envelope: Envelope) -> Result<(), MuxError> {
        let guard = self
            .inner
            .out_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        match guard.as_ref() {
            Some(tx) => tx
                .send(Outbound::Envelope(envelope))
                .map_err(|_| MuxError::NotConnected),
            None => Err(MuxError::NotConnected),
        }
    }

    pub fn try_get(&self) -> Option<Envelope> {
        self.inner.queue.try_get()
    }

    /// Blocking get with an optional timeout. Must not be called from async
    /// context; use [`async_get`](Self::async_get) there.
    pub fn get(&self, timeout: Option<Duration>) -> Option<Envelope> {
        self.inner.queue.get(timeout)
    }

    pub async fn async_get(&self) -> Envelope {
        self.inner.queue.async_get().await
    }

    /// Await a non-empty inbound queue without consuming.
    pub async fn async_wait(&self) {
        self.inner.queue.async_wait().await
    }

    pub fn pending_envelopes(&self) -> usize {
        self.inner.queue.len()
    }

    /// Last error a loop terminated with, if any.
    pub fn last_loop_error(&self) -> Option<String> {
        self.inner
            .last_loop_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(ToString::to_string)
    }

    async fn loops_running(&self) -> bool {
        let loops = self.inner.loops.lock().await;
        loops.send.is_some() || loops.recv.is_some()
    }

    async fn start_loops(&self) {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        *self
            .inner
            .out_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(out_tx);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        *self
            .inner
            .shutdown_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(shutdown_tx);

        let mut loops = self.inner.loops.lock().await;
        loops.send = Some(
            self.inner
                .handle
                .spawn(Self::send_loop(self.clone(), out_rx)),
        );
        loops.recv = Some(
            self.inner
                .handle
                .spawn(Self::receive_loop(self.clone(), shutdown_rx)),
        );
    }

    async fn stop_loops(&self) {
        if let Some(out_tx) = self
            .inner
            .out_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            let _ = out_tx.send(Outbound::Stop);
        }
        if let Some(shutdown_tx) = self
            .inner
            .shutdown_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            let _ = shutdown_tx.send(true);
        }

        let mut loops = self.inner.loops.lock().await;
        if let Some(handle) = loops.send.take() {
            self.reap("send", handle).await;
        }
        if let Some(handle) = loops.recv.take() {
            self.reap("receive", handle).await;
        }
    }

    async fn reap(&self, name: &'static str, handle: JoinHandle<Result<(), MuxError>>) {
        match handle.await {
            Ok(Ok(())) => {}
            Ok(Err(error)) => {
                error!(loop_name = name, error = %error, "loop terminated with error");
                *self
                    .inner
                    .last_loop_error
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner) = Some(error);
            }
            Err(join_error) => {
                error!(loop_name = name, error = %join_error, "loop task failed");
            }
        }
    }

    /// With stop-and-exit, the first runtime error schedules exactly one
    /// disconnection; the scheduling loop then exits, so a racing error on
    /// the other loop only gets logged before that loop stops too.
    fn schedule_disconnect(&self) {
        let mux = self.clone();
        self.inner.handle.spawn(async move {
            if let Err(e) = mux.disconnect().await {
                error!(error = %e, "scheduled disconnect failed");
            }
        });
    }

    /// Resolve and deliver one outgoing envelope. Routing failures drop the
    /// envelope with a warning and are not errors; transport failures and
    /// timeouts are.
    async fn route_and_send(&self, envelope: Envelope) -> Result<(), MuxError> {
        let inner = &self.inner;
        let protocol_id = inner
            .spec_to_protocol
            .get(envelope.protocol_specification_id())
            .cloned()
            .unwrap_or_else(|| envelope.protocol_specification_id().clone());

        let Some((connection_id, source)) = inner.routing.resolve(&envelope, &protocol_id) else {
            warn!(to = %envelope.to(), "no route for envelope, dropping");
            return Ok(());
        };
        debug!(connection_id = %connection_id, source = ?source, to = %envelope.to(), "routed envelope");

        let Some(connection) = inner.by_id.get(&connection_id) else {
            warn!(connection_id = %connection_id, "envelope routed to unregistered connection, dropping");
            return Ok(());
        };

        let restricted = connection.restricted_to_protocols();
        if !restricted.is_empty() && !restricted.contains(&protocol_id) {
            warn!(connection_id = %connection_id, protocol_id = %protocol_id, "connection does not carry protocol, dropping envelope");
            return Ok(());
        }
        if connection.excluded_protocols().contains(&protocol_id) {
            warn!(connection_id = %connection_id, protocol_id = %protocol_id, "protocol excluded on connection, dropping envelope");
            return Ok(());
        }

        match timeout(inner.timeouts.send, connection.send(envelope)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(source)) => Err(MuxError::Connection {
                connection_id,
                source,
            }),
            Err(_) => Err(MuxError::ConnectionTimeout {
                connection_id,
                operation: "send",
                timeout: inner.timeouts.send,
            }),
        }
    }

    async fn send_loop(
        mux: AsyncMultiplexer,
        mut out_rx: mpsc::UnboundedReceiver<Outbound>,
    ) -> Result<(), MuxError> {
        debug!("send loop started");
        while let Some(item) = out_rx.recv().await {
            let envelope = match item {
                Outbound::Stop => {
                    debug!("send loop received stop sentinel");
                    break;
                }
                Outbound::Envelope(envelope) => envelope,
            };
            if let Err(error) = mux.route_and_send(envelope).await {
                match mux.inner.policy {
                    ExceptionPolicy::Propagate => {
                        error!(error = %error, "send failed, terminating send loop");
                        return Err(error);
                    }
                    ExceptionPolicy::LogAndContinue => {
                        error!(error = %error, "send failed, continuing");
                    }
                    ExceptionPolicy::StopAndExit => {
                        error!(error = %error, "send failed, stopping multiplexer");
                        mux.schedule_disconnect();
                        break;
                    }
                }
            }
        }
        debug!("send loop terminated");
        Ok(())
    }

    async fn receive_once(
        connection: Arc<dyn Connection>,
    ) -> (
        Arc<dyn Connection>,
        Result<Option<Envelope>, ConnectionError>,
    ) {
        let result = connection.receive().await;
        (connection, result)
    }

    async fn receive_loop(
        mux: AsyncMultiplexer,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), MuxError> {
        debug!("receive loop started");
        let mut pending = FuturesUnordered::new();
        for connection in &mux.inner.connections {
            pending.push(Self::receive_once(connection.clone()));
        }

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        debug!("receive loop shutting down");
                        break;
                    }
                }
                next = pending.next() => {
                    let Some((connection, result)) = next else {
                        debug!("no receive sources left, receive loop ending");
                        break;
                    };
                    let mut failure = None;
                    let mut reissue = true;
                    match result {
                        Ok(Some(envelope)) => {
                            if envelope.is_agent_to_agent() {
                                mux.inner
                                    .routing
                                    .learn(envelope.sender().clone(), connection.id().clone());
                            }
                            debug!(connection_id = %connection.id(), "envelope received");
                            mux.inner.queue.put(envelope);
                        }
                        Ok(None) => {
                            // Torn-down source: drop it from the fan-in set
                            // for the rest of this session, whatever state
                            // the connection still reports.
                            debug!(connection_id = %connection.id(), "connection receive side closed");
                            reissue = false;
                        }
                        Err(source) => {
                            failure = Some(MuxError::Connection {
                                connection_id: connection.id().clone(),
                                source,
                            });
                        }
                    }
                    if let Some(error) = failure {
                        match mux.inner.policy {
                            ExceptionPolicy::Propagate => {
                                error!(error = %error, "receive failed, terminating receive loop");
                                return Err(error);
                            }
                            ExceptionPolicy::LogAndContinue => {
                                error!(error = %error, "receive failed, continuing");
                            }
                            ExceptionPolicy::StopAndExit => {
                                error!(error = %error, "receive failed, stopping multiplexer");
                                mux.schedule_disconnect();
                                break;
                            }
                        }
                    }
                    // One outstanding receive per connection: replace the
                    // completed future only while the connection is up and
                    // still has a receive side.
                    if reissue && connection.is_connected() {
                        pending.push(Self::receive_once(connection));
                    }
                }
            }
        }
        debug!("receive loop terminated");
        Ok(())
    }
}
