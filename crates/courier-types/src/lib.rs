//! Core data model for the Courier multiplexer
//!
//! Leaf crate with no async machinery: identifiers, envelopes and the bare
//! message type the outbox accepts.

pub mod envelope;
pub mod ids;

pub use envelope::{Envelope, EnvelopeContext, EnvelopeError, Message};
pub use ids::{Address, ComponentId, IdError};
