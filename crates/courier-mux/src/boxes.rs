//! One-directional facades over the engine's queues
//!
//! Skills and behaviours see an `InBox` to consume from and an `OutBox` to
//! produce into; neither exposes the other direction.

use crate::error::MuxError;
use crate::mux::AsyncMultiplexer;
use courier_types::{Envelope, EnvelopeContext, Message};
use std::time::Duration;

/// Read side: the envelopes the multiplexer received for the agent.
pub struct InBox {
    mux: AsyncMultiplexer,
}

impl InBox {
    pub fn new(mux: AsyncMultiplexer) -> Self {
        Self { mux }
    }

    pub fn empty(&self) -> bool {
        self.mux.pending_envelopes() == 0
    }

    /// Blocking get. `Err(Empty)` once the timeout elapses.
    pub fn get(&self, timeout: Option<Duration>) -> Result<Envelope, MuxError> {
        self.mux.get(timeout).ok_or(MuxError::Empty)
    }

    pub fn get_nowait(&self) -> Option<Envelope> {
        self.mux.try_get()
    }

    pub async fn async_get(&self) -> Envelope {
        self.mux.async_get().await
    }

    /// Await a non-empty inbox without consuming.
    pub async fn async_wait(&self) {
        self.mux.async_wait().await
    }
}

/// Write side: hand envelopes (or bare messages) to the multiplexer.
pub struct OutBox {
    mux: AsyncMultiplexer,
}

impl OutBox {
    pub fn new(mux: AsyncMultiplexer) -> Self {
        Self { mux }
    }

    pub fn put(&self, envelope: Envelope) -> Result<(), MuxError> {
        if envelope.to().is_empty() {
            return Err(MuxError::InvalidEnvelope(
                courier_types::EnvelopeError::MissingRecipient,
            ));
        }
        if envelope.sender().is_empty() {
            return Err(MuxError::InvalidEnvelope(
                courier_types::EnvelopeError::MissingSender,
            ));
        }
        self.mux.put(envelope)
    }

    /// Wrap a bare message into an envelope and enqueue it. Rejecting a
    /// missing `to` or `sender` is the only structural validation applied.
    pub fn put_message(
        &self,
        message: Message,
        context: Option<EnvelopeContext>,
    ) -> Result<(), MuxError> {
        let envelope = message.into_envelope()?;
        let envelope = match context {
            Some(context) => envelope.with_context(context)?,
            None => envelope,
        };
        self.mux.put(envelope)
    }
}
