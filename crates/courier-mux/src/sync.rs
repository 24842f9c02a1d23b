//! Threaded synchronous facade over the async engine
//!
//! Owns a dedicated single-worker runtime on which the engine's loops run.
//! Every orchestration call is submitted to that runtime as one unit of work
//! and awaited with a generous bound, so a wedged transport cannot hang the
//! caller forever. Must be driven from synchronous code; inside a runtime,
//! use [`AsyncMultiplexer`] directly.

use crate::config::MultiplexerConfig;
use crate::error::MuxError;
use crate::mux::AsyncMultiplexer;
use courier_types::Envelope;
use std::future::Future;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, error};

const SUBMIT_TIMEOUT: Duration = Duration::from_secs(240);

pub struct Multiplexer {
    engine: AsyncMultiplexer,
    runtime: tokio::runtime::Runtime,
    connected: Mutex<bool>,
}

impl Multiplexer {
    pub fn new(config: MultiplexerConfig) -> Result<Self, MuxError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("courier-mux")
            .enable_all()
            .build()
            .map_err(|e| MuxError::Runtime(e.to_string()))?;
        let engine = AsyncMultiplexer::new(config, runtime.handle().clone())?;
        Ok(Self {
            engine,
            runtime,
            connected: Mutex::new(false),
        })
    }

    /// The underlying engine, for async consumers and the in/out boxes.
    pub fn engine(&self) -> &AsyncMultiplexer {
        &self.engine
    }

    pub fn is_connected(&self) -> bool {
        *self.connected.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Connect the engine. Idempotent and safe to call from several threads;
    /// the facade lock makes concurrent callers take turns.
    pub fn connect(&self) -> Result<(), MuxError> {
        let mut connected = self.connected.lock().unwrap_or_else(PoisonError::into_inner);
        if *connected {
            debug!("multiplexer facade already connected");
            return Ok(());
        }
        let engine = self.engine.clone();
        self.submit(async move { engine.connect().await })??;
        *connected = true;
        Ok(())
    }

    pub fn disconnect(&self) -> Result<(), MuxError> {
        let mut connected = self.connected.lock().unwrap_or_else(PoisonError::into_inner);
        if !*connected {
            debug!("multiplexer facade already disconnected");
            return Ok(());
        }
        let engine = self.engine.clone();
        self.submit(async move { engine.disconnect().await })??;
        *connected = false;
        Ok(())
    }

    /// Enqueue an envelope without blocking.
    pub fn put(&self, envelope: Envelope) -> Result<(), MuxError> {
        self.engine.put(envelope)
    }

    pub fn try_get(&self) -> Option<Envelope> {
        self.engine.try_get()
    }

    /// Blocking get with an optional timeout.
    pub fn get(&self, timeout: Option<Duration>) -> Option<Envelope> {
        self.engine.get(timeout)
    }

    fn submit<F>(&self, fut: F) -> Result<F::Output, MuxError>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let task = self
            .runtime
            .spawn(async move { tokio::time::timeout(SUBMIT_TIMEOUT, fut).await });
        match self.runtime.block_on(task) {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(_)) => Err(MuxError::FacadeTimeout(SUBMIT_TIMEOUT)),
            Err(join_error) => Err(MuxError::Runtime(format!(
                "facade task failed: {join_error}"
            ))),
        }
    }
}

impl Drop for Multiplexer {
    fn drop(&mut self) {
        if self.is_connected() {
            if let Err(e) = self.disconnect() {
                error!(error = %e, "disconnect on drop failed");
            }
        }
    }
}
