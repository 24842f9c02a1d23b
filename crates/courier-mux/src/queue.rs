//! Inbound envelope queue with blocking and async consumers
//!
//! The receive loop produces from async context; the agent consumes either
//! synchronously (Condvar) or asynchronously (Notify). One logical consumer
//! at a time; producers may be many.

use courier_types::Envelope;
use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::Notify;

#[derive(Debug, Default)]
pub struct InboundQueue {
    inner: Mutex<VecDeque<Envelope>>,
    condvar: Condvar,
    notify: Notify,
}

impl InboundQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Envelope>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn put(&self, envelope: Envelope) {
        self.lock().push_back(envelope);
        self.condvar.notify_one();
        self.notify.notify_one();
    }

    pub fn try_get(&self) -> Option<Envelope> {
        self.lock().pop_front()
    }

    /// Blocking get. `None` timeout waits indefinitely; otherwise returns
    /// `None` once the timeout elapses with the queue still empty.
    pub fn get(&self, timeout: Option<Duration>) -> Option<Envelope> {
        let mut guard = self.lock();
        match timeout {
            None => loop {
                if let Some(envelope) = guard.pop_front() {
                    return Some(envelope);
                }
                guard = self
                    .condvar
                    .wait(guard)
                    .unwrap_or_else(PoisonError::into_inner);
            },
            Some(timeout) => {
                let deadline = Instant::now() + timeout;
                loop {
                    if let Some(envelope) = guard.pop_front() {
                        return Some(envelope);
                    }
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        return None;
                    }
                    let (next, result) = self
                        .condvar
                        .wait_timeout(guard, remaining)
                        .unwrap_or_else(PoisonError::into_inner);
                    guard = next;
                    if result.timed_out() {
                        return guard.pop_front();
                    }
                }
            }
        }
    }

    /// Async get, awaiting until an envelope is available.
    pub async fn async_get(&self) -> Envelope {
        loop {
            if let Some(envelope) = self.try_get() {
                return envelope;
            }
            self.notify.notified().await;
        }
    }

    /// Await a non-empty queue without consuming anything.
    pub async fn async_wait(&self) {
        loop {
            if !self.is_empty() {
                return;
            }
            self.notify.notified().await;
            if !self.is_empty() {
                // Pass the permit on: async_wait must not starve a consumer.
                self.notify.notify_one();
                return;
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }
}
