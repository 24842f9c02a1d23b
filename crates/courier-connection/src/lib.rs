//! Connection contract for the Courier multiplexer
//!
//! Defines the four-operation connection trait the multiplexer drives, the
//! lifecycle state machine, and an in-memory transport used in development
//! and tests.

pub mod error;
pub mod memory;
pub mod state;
pub mod traits;

pub use error::ConnectionError;
pub use memory::MemoryConnection;
pub use state::{ConnectionState, StateCell};
pub use traits::Connection;
