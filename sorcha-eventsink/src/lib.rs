// This file is part of Sorcha.
//
// Sorcha is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// Sorcha is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with Sorcha.  If not, see <http://www.gnu.org/licenses/>.

//! The Event Sink Adapter (§4.10, ambient expansion of the §2 component
//! table): an outbound sink for domain events with at-least-once
//! delivery semantics. The distilled spec only fixes the wire contract
//! (§6) and lists the component in the table; the retry/backoff and
//! development-default behaviour here is this crate's own addition.

pub mod event;

pub use event::DomainEvent;

use async_trait::async_trait;
use sorcha_subsystem_util::{Backoff, BackoffConfig};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

const LOG_TARGET: &str = "event_sink";

/// Attempts the background drain loop makes against the inner sink
/// before logging the event as dropped and moving on. At-least-once
/// delivery is a best-effort promise bounded by this retry budget, not
/// an unconditional guarantee against a permanently dead backplane.
const MAX_DRAIN_ATTEMPTS: u32 = 8;

#[derive(Debug, Error)]
pub enum EventSinkError {
    #[error("event sink is at capacity")]
    Busy,
    #[error("event sink has been shut down")]
    Closed,
    #[error("downstream sink rejected the event: {0}")]
    Rejected(String),
}

/// Everything a domain event producer needs: push an event and move on.
/// Implementations decide delivery semantics; the at-least-once
/// in-process implementation below is the one every core component is
/// composed against by default (§6.1-style consumed-interface pattern).
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn emit(&self, event: DomainEvent) -> Result<(), EventSinkError>;
}

/// Discards every event. Used by components under test that don't
/// observe the event stream.
pub struct NullEventSink;

#[async_trait]
impl EventSink for NullEventSink {
    async fn emit(&self, _event: DomainEvent) -> Result<(), EventSinkError> {
        Ok(())
    }
}

/// Writes every event as a structured `tracing` record at `info` level.
/// Useful as a development default and as the audit trail of last resort
/// when the real backplane adapter is unreachable.
pub struct LoggingEventSink;

#[async_trait]
impl EventSink for LoggingEventSink {
    async fn emit(&self, event: DomainEvent) -> Result<(), EventSinkError> {
        let (kind, primary_id) = event.idempotency_key();
        info!(target: LOG_TARGET, event_kind = kind, %primary_id, ?event, "domain event");
        Ok(())
    }
}

/// At-least-once in-process sink: `emit` enqueues onto a bounded
/// `tokio::sync::mpsc` channel and returns immediately; a background
/// drain task forwards each event to `inner`, retrying with exponential
/// backoff on failure, mirroring the offline-durability pattern the
/// Replication Engine uses for its outbound notification queue (§4.6).
#[derive(Clone)]
pub struct InProcessEventSink {
    tx: mpsc::Sender<DomainEvent>,
}

impl InProcessEventSink {
    /// Spawns the drain task and returns the sink handle alongside its
    /// `JoinHandle`, so the node's shutdown sequence can await it
    /// draining during the two-phase shutdown window (§5).
    pub fn spawn(
        inner: Arc<dyn EventSink>,
        capacity: usize,
        backoff_config: BackoffConfig,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(capacity);
        let handle = tokio::spawn(drain_loop(rx, inner, backoff_config));
        (Self { tx }, handle)
    }
}

#[async_trait]
impl EventSink for InProcessEventSink {
    async fn emit(&self, event: DomainEvent) -> Result<(), EventSinkError> {
        self.tx.try_send(event).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => EventSinkError::Busy,
            mpsc::error::TrySendError::Closed(_) => EventSinkError::Closed,
        })
    }
}

async fn drain_loop(
    mut rx: mpsc::Receiver<DomainEvent>,
    inner: Arc<dyn EventSink>,
    backoff_config: BackoffConfig,
) {
    while let Some(event) = rx.recv().await {
        let (kind, primary_id) = event.idempotency_key();
        let mut backoff = Backoff::new(backoff_config);
        loop {
            match inner.emit(event.clone()).await {
                Ok(()) => break,
                Err(e) => {
                    if backoff.attempt() + 1 >= MAX_DRAIN_ATTEMPTS {
                        error!(target: LOG_TARGET, event_kind = kind, %primary_id, error = %e, "dropping event after exhausting retry budget");
                        break;
                    }
                    warn!(target: LOG_TARGET, event_kind = kind, %primary_id, error = %e, attempt = backoff.attempt(), "retrying event delivery");
                    backoff.wait().await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sorcha_primitives::{RegisterId, TxId};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct CountingSink {
        count: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl EventSink for CountingSink {
        async fn emit(&self, _event: DomainEvent) -> Result<(), EventSinkError> {
            self.count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FlakySink {
        failures_remaining: std::sync::atomic::AtomicU32,
        count: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl EventSink for FlakySink {
        async fn emit(&self, _event: DomainEvent) -> Result<(), EventSinkError> {
            if self.failures_remaining.load(Ordering::SeqCst) > 0 {
                self.failures_remaining.fetch_sub(1, Ordering::SeqCst);
                return Err(EventSinkError::Rejected("simulated".into()));
            }
            self.count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn sample_event() -> DomainEvent {
        DomainEvent::TransactionConfirmed {
            tx_id: TxId::from("tx1"),
            register_id: RegisterId::from("r1"),
            docket_id: sorcha_primitives::DocketId::from("d1"),
            docket_version: 1,
        }
    }

    #[tokio::test]
    async fn null_sink_always_succeeds() {
        assert!(NullEventSink.emit(sample_event()).await.is_ok());
    }

    #[tokio::test]
    async fn logging_sink_always_succeeds() {
        assert!(LoggingEventSink.emit(sample_event()).await.is_ok());
    }

    #[tokio::test]
    async fn in_process_sink_delivers_enqueued_events() {
        let count = Arc::new(AtomicUsize::new(0));
        let inner = Arc::new(CountingSink { count: count.clone() });
        let (sink, handle) = InProcessEventSink::spawn(inner, 16, BackoffConfig::default());

        sink.emit(sample_event()).await.unwrap();
        sink.emit(sample_event()).await.unwrap();
        drop(sink);
        handle.await.unwrap();

        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn in_process_sink_retries_on_failure() {
        let count = Arc::new(AtomicUsize::new(0));
        let inner = Arc::new(FlakySink {
            failures_remaining: std::sync::atomic::AtomicU32::new(2),
            count: count.clone(),
        });
        let backoff = BackoffConfig {
            initial: Duration::from_millis(1),
            max: Duration::from_millis(5),
            multiplier: 2.0,
            jitter: 0.0,
        };
        let (sink, handle) = InProcessEventSink::spawn(inner, 16, backoff);

        sink.emit(sample_event()).await.unwrap();
        drop(sink);
        handle.await.unwrap();

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

}
