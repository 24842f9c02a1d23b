//! Envelope routing and transport multiplexing for Courier agents
//!
//! The engine drives any number of [`Connection`](courier_connection::Connection)s
//! behind a single pair of queues: one send loop fans envelopes out to the
//! connection the routing table resolves, one receive loop fans envelopes in
//! from every connection. [`AsyncMultiplexer`] is the async engine;
//! [`Multiplexer`] wraps it for synchronous callers with its own runtime.

pub mod boxes;
pub mod config;
pub mod error;
pub mod mux;
pub mod policy;
pub mod queue;
pub mod routing;
pub mod sync;

#[cfg(test)]
pub(crate) mod test_support;

pub use boxes::{InBox, OutBox};
pub use config::{MultiplexerConfig, MuxTimeouts, ProtocolDescriptor};
pub use error::{ConnectionFailure, MuxError};
pub use mux::AsyncMultiplexer;
pub use policy::ExceptionPolicy;
pub use queue::InboundQueue;
pub use routing::{RouteSource, RoutingTable};
pub use sync::Multiplexer;
