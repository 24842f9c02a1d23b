//! Two agents talking over paired in-memory connections through the
//! threaded facade.
//!
//! Run with: cargo run -p courier-mux --example memory_roundtrip

use anyhow::Result;
use courier_connection::{Connection, MemoryConnection};
use courier_mux::{Multiplexer, MultiplexerConfig};
use courier_types::{Address, ComponentId, Envelope};
use std::sync::Arc;
use std::time::Duration;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,courier_mux=debug".into()),
        )
        .init();

    let (alice_side, bob_side) = MemoryConnection::pair(
        ComponentId::new("courier", "memory-alice", "0.1.0")?,
        ComponentId::new("courier", "memory-bob", "0.1.0")?,
    );

    let alice = Multiplexer::new(MultiplexerConfig::new(vec![
        Arc::new(alice_side) as Arc<dyn Connection>
    ]))?;
    let bob = Multiplexer::new(MultiplexerConfig::new(vec![
        Arc::new(bob_side) as Arc<dyn Connection>
    ]))?;
    alice.connect()?;
    bob.connect()?;

    let protocol = ComponentId::new("courier", "chat", "1.0.0")?;
    alice.put(Envelope::new(
        Address::new("bob"),
        Address::new("alice"),
        protocol.clone(),
        b"hello bob".to_vec(),
    ))?;

    let received = bob
        .get(Some(Duration::from_secs(5)))
        .expect("bob never heard from alice");
    println!(
        "bob received {:?} from {}",
        String::from_utf8_lossy(received.message()),
        received.sender()
    );

    bob.put(Envelope::new(
        Address::new("alice"),
        Address::new("bob"),
        protocol,
        b"hello alice".to_vec(),
    ))?;
    let reply = alice
        .get(Some(Duration::from_secs(5)))
        .expect("alice never heard back");
    println!(
        "alice received {:?} from {}",
        String::from_utf8_lossy(reply.message()),
        reply.sender()
    );

    alice.disconnect()?;
    bob.disconnect()?;
    Ok(())
}
