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

//! The Connection Pool (§4.3): one logical session per remote peer, a
//! heartbeat liveness check, reconnect, and a circuit breaker. Timing is
//! driven entirely by `on_tick`, called from the overseer's `Tick`
//! signal (§2.1) rather than a private timer — the same "single
//! wall-clock entry point" discipline `sorcha-subsystem`'s module docs
//! describe for the docket builder and checkpoint sweep. This keeps the
//! pool's heartbeat/circuit-breaker state machine a pure, deterministic
//! function of `(now, events)` and fully unit-testable without a real
//! clock.
//!
//! Incoming frames are delivered via `dispatch_incoming`, called by
//! whatever task drains the transport's inbound stream; outbound
//! delivery is keyed by message kind through `register_stream_handler`,
//! mirroring the teacher's pub-sub dispatch in `network/bridge` (§5
//! "reads delivered via a pub-sub dispatch keyed by message kind").

use crate::circuit::CircuitBreaker;
use crate::config::ConnectionPoolConfig;
use crate::envelope::{HeartbeatPayload, MessageEnvelope, MessageKind};
use crate::status::{NodeConnectionStatus, PeerConnectionStatus};
use crate::transport::{Transport, TransportError};
use async_trait::async_trait;
use parking_lot::Mutex;
use sorcha_primitives::{Peer, PeerId};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

const LOG_TARGET: &str = "connection_pool";

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("circuit breaker open for peer {0}")]
    CircuitOpen(PeerId),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

struct SessionState {
    status: PeerConnectionStatus,
    circuit: CircuitBreaker,
    last_heartbeat_sent: i64,
    heartbeat_outstanding: bool,
    missed_heartbeats: u32,
    sequence: u64,
}

impl SessionState {
    fn new(circuit: CircuitBreaker) -> Self {
        Self {
            status: PeerConnectionStatus::Disconnected,
            circuit,
            last_heartbeat_sent: 0,
            heartbeat_outstanding: false,
            missed_heartbeats: 0,
            sequence: 0,
        }
    }
}

/// Every subsystem above the pool that only needs to send/broadcast
/// frames programs against this trait rather than the concrete pool, the
/// same seam the teacher's `Network` trait provides over `sc_network`.
#[async_trait]
pub trait PeerSender: Send + Sync {
    async fn send(&self, peer_id: &PeerId, envelope: MessageEnvelope) -> Result<(), ConnectionError>;
    async fn broadcast(&self, peers: &[PeerId], envelope: MessageEnvelope);
}

pub struct ConnectionPool<T: Transport> {
    config: ConnectionPoolConfig,
    transport: Arc<T>,
    sessions: Mutex<HashMap<PeerId, SessionState>>,
    handlers: Mutex<HashMap<MessageKind, Vec<mpsc::Sender<(PeerId, MessageEnvelope)>>>>,
}

impl<T: Transport> ConnectionPool<T> {
    pub fn new(config: ConnectionPoolConfig, transport: Arc<T>) -> Self {
        Self {
            config,
            transport,
            sessions: Mutex::new(HashMap::new()),
            handlers: Mutex::new(HashMap::new()),
        }
    }

    /// Idempotent per `peer_id` (§4.3): a peer already `Connected` or
    /// `Connecting` is left alone.
    pub async fn connect(&self, peer: &Peer, now: i64) -> Result<(), ConnectionError> {
        {
            let sessions = self.sessions.lock();
            if let Some(state) = sessions.get(&peer.peer_id) {
                if matches!(state.status, PeerConnectionStatus::Connected | PeerConnectionStatus::Connecting) {
                    return Ok(());
                }
            }
        }

        let circuit_open = {
            let mut sessions = self.sessions.lock();
            let state = sessions
                .entry(peer.peer_id.clone())
                .or_insert_with(|| SessionState::new(CircuitBreaker::new(self.config.circuit_breaker_config())));
            !state.circuit.allow_attempt(now)
        };
        if circuit_open {
            return Err(ConnectionError::CircuitOpen(peer.peer_id.clone()));
        }

        {
            let mut sessions = self.sessions.lock();
            if let Some(state) = sessions.get_mut(&peer.peer_id) {
                state.status = PeerConnectionStatus::Connecting;
            }
        }

        match self.transport.connect(peer).await {
            Ok(()) => {
                let mut sessions = self.sessions.lock();
                if let Some(state) = sessions.get_mut(&peer.peer_id) {
                    state.status = PeerConnectionStatus::Connected;
                    state.circuit.record_success();
                    state.heartbeat_outstanding = false;
                    state.missed_heartbeats = 0;
                    state.last_heartbeat_sent = now;
                }
                info!(target: LOG_TARGET, peer_id = %peer.peer_id, "session connected");
                Ok(())
            }
            Err(e) => {
                let mut sessions = self.sessions.lock();
                if let Some(state) = sessions.get_mut(&peer.peer_id) {
                    state.status = PeerConnectionStatus::Disconnected;
                    state.circuit.record_failure(now);
                }
                warn!(target: LOG_TARGET, peer_id = %peer.peer_id, error = %e, "connect failed");
                Err(ConnectionError::Transport(e))
            }
        }
    }

    pub async fn disconnect(&self, peer_id: &PeerId) {
        self.transport.disconnect(peer_id).await;
        let mut sessions = self.sessions.lock();
        if let Some(state) = sessions.get_mut(peer_id) {
            state.status = PeerConnectionStatus::Disconnected;
        }
        info!(target: LOG_TARGET, %peer_id, "session disconnected");
    }

    pub async fn send(&self, peer_id: &PeerId, envelope: MessageEnvelope) -> Result<(), ConnectionError> {
        Ok(self.transport.send(peer_id, envelope).await?)
    }

    pub async fn broadcast(&self, peers: &[PeerId], envelope: MessageEnvelope) {
        for peer_id in peers {
            if let Err(e) = self.transport.send(peer_id, envelope.clone()).await {
                debug!(target: LOG_TARGET, %peer_id, error = %e, "broadcast send failed for one peer");
            }
        }
    }

    /// Registers a channel that receives every inbound frame of `kind`
    /// (§4.3, §5 pub-sub dispatch). Multiple subscribers per kind are
    /// supported since more than one subsystem may care about the same
    /// kind (e.g. both discovery and the subscription manager observe
    /// `register_advertise`).
    pub fn register_stream_handler(&self, kind: MessageKind, sender: mpsc::Sender<(PeerId, MessageEnvelope)>) {
        self.handlers.lock().entry(kind).or_default().push(sender);
    }

    /// Feeds one inbound frame from `peer_id` into the pool: heartbeat
    /// frames are consumed as liveness acks, every frame (heartbeats
    /// included) is then fanned out to registered handlers for that
    /// kind.
    pub async fn dispatch_incoming(&self, peer_id: PeerId, envelope: MessageEnvelope) {
        if matches!(envelope.kind, MessageKind::Heartbeat) {
            let mut sessions = self.sessions.lock();
            if let Some(state) = sessions.get_mut(&peer_id) {
                state.heartbeat_outstanding = false;
                state.missed_heartbeats = 0;
                if matches!(state.status, PeerConnectionStatus::HeartbeatTimeout) {
                    state.status = PeerConnectionStatus::Connected;
                    info!(target: LOG_TARGET, %peer_id, "heartbeat resumed, session reconnected");
                }
            }
        }

        let senders: Vec<_> = self
            .handlers
            .lock()
            .get(&envelope.kind)
            .cloned()
            .unwrap_or_default();
        for sender in senders {
            if sender.send((peer_id.clone(), envelope.clone())).await.is_err() {
                warn!(target: LOG_TARGET, kind = ?envelope.kind, "stream handler channel closed, dropping delivery");
            }
        }
    }

    /// Drives heartbeat sends and timeout detection for every session
    /// due at `now` (§4.3). Sessions past `max_missed_heartbeats`
    /// consecutive unacknowledged heartbeats transition to
    /// `HeartbeatTimeout`.
    pub async fn on_tick(&self, now: i64) {
        let due: Vec<PeerId> = {
            let sessions = self.sessions.lock();
            sessions
                .iter()
                .filter(|(_, s)| {
                    matches!(s.status, PeerConnectionStatus::Connected | PeerConnectionStatus::HeartbeatTimeout)
                        && now - s.last_heartbeat_sent >= self.config.heartbeat_interval_micros
                })
                .map(|(id, _)| id.clone())
                .collect()
        };

        for peer_id in due {
            let sequence = {
                let mut sessions = self.sessions.lock();
                let state = sessions.get_mut(&peer_id).expect("peer present in due set");
                if state.heartbeat_outstanding {
                    state.missed_heartbeats += 1;
                    if state.missed_heartbeats >= self.config.max_missed_heartbeats
                        && !matches!(state.status, PeerConnectionStatus::HeartbeatTimeout)
                    {
                        state.status = PeerConnectionStatus::HeartbeatTimeout;
                        warn!(target: LOG_TARGET, %peer_id, missed = state.missed_heartbeats, "heartbeat timeout");
                    }
                }
                state.last_heartbeat_sent = now;
                state.heartbeat_outstanding = true;
                state.sequence += 1;
                state.sequence
            };

            let payload = sorcha_subsystem_util::Storage::encode(&HeartbeatPayload { sent_at: now, sequence })
                .unwrap_or_default();
            let envelope = MessageEnvelope::new(MessageKind::Heartbeat, format!("hb-{peer_id}-{sequence}"), payload);
            if let Err(e) = self.transport.send(&peer_id, envelope).await {
                debug!(target: LOG_TARGET, %peer_id, error = %e, "heartbeat send failed");
            }
        }
    }

    pub fn peer_status(&self, peer_id: &PeerId) -> Option<PeerConnectionStatus> {
        self.sessions.lock().get(peer_id).map(|s| s.status)
    }

    /// Peers currently in the `Connected` state, for subsystems that need
    /// to diff connection membership across ticks (`ConnectionDriverSubsystem`,
    /// which raises `NodeMessage::PeerConnected`/`PeerDisconnected` off
    /// exactly this transition).
    pub fn connected_peer_ids(&self) -> Vec<PeerId> {
        self.sessions
            .lock()
            .iter()
            .filter(|(_, s)| matches!(s.status, PeerConnectionStatus::Connected))
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Node-wide status, derived from the current snapshot of every
    /// session's status (§4.3).
    pub fn node_status(&self) -> NodeConnectionStatus {
        let statuses: Vec<PeerConnectionStatus> = self.sessions.lock().values().map(|s| s.status).collect();
        NodeConnectionStatus::derive(&statuses)
    }
}

#[async_trait]
impl<T: Transport> PeerSender for ConnectionPool<T> {
    async fn send(&self, peer_id: &PeerId, envelope: MessageEnvelope) -> Result<(), ConnectionError> {
        ConnectionPool::send(self, peer_id, envelope).await
    }

    async fn broadcast(&self, peers: &[PeerId], envelope: MessageEnvelope) {
        ConnectionPool::broadcast(self, peers, envelope).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::fake::FakeTransport;
    use sorcha_primitives::now_micros;

    fn peer(id: &str) -> Peer {
        Peer::new(PeerId::from(id), "127.0.0.1".into(), 9000, false, now_micros())
    }

    #[tokio::test]
    async fn connect_is_idempotent_and_reports_connected_status() {
        let transport = Arc::new(FakeTransport::new());
        let pool = ConnectionPool::new(ConnectionPoolConfig::default(), transport);
        let p = peer("p1");
        pool.connect(&p, 0).await.unwrap();
        pool.connect(&p, 0).await.unwrap();
        assert_eq!(pool.peer_status(&p.peer_id), Some(PeerConnectionStatus::Connected));
    }

    #[tokio::test]
    async fn unreachable_peer_opens_circuit_after_threshold_failures() {
        let transport = Arc::new(FakeTransport::new());
        transport.mark_unreachable(PeerId::from("p1"));
        let config = ConnectionPoolConfig {
            circuit_breaker_threshold: 2,
            ..Default::default()
        };
        let pool = ConnectionPool::new(config, transport);
        let p = peer("p1");

        assert!(pool.connect(&p, 0).await.is_err());
        assert!(pool.connect(&p, 0).await.is_err());
        let err = pool.connect(&p, 0).await.unwrap_err();
        assert!(matches!(err, ConnectionError::CircuitOpen(_)));
    }

    #[tokio::test]
    async fn missed_heartbeats_trigger_timeout_then_ack_recovers() {
        let transport = Arc::new(FakeTransport::new());
        let config = ConnectionPoolConfig {
            heartbeat_interval_micros: 1000,
            max_missed_heartbeats: 2,
            ..Default::default()
        };
        let pool = ConnectionPool::new(config, transport);
        let p = peer("p1");
        pool.connect(&p, 0).await.unwrap();

        pool.on_tick(1000).await; // first heartbeat sent, outstanding
        assert_eq!(pool.peer_status(&p.peer_id), Some(PeerConnectionStatus::Connected));

        pool.on_tick(2000).await; // 1 missed
        assert_eq!(pool.peer_status(&p.peer_id), Some(PeerConnectionStatus::Connected));

        pool.on_tick(3000).await; // 2 missed -> timeout
        assert_eq!(pool.peer_status(&p.peer_id), Some(PeerConnectionStatus::HeartbeatTimeout));

        pool.dispatch_incoming(p.peer_id.clone(), MessageEnvelope::new(MessageKind::Heartbeat, "hb-ack", vec![]))
            .await;
        assert_eq!(pool.peer_status(&p.peer_id), Some(PeerConnectionStatus::Connected));
    }

    #[tokio::test]
    async fn node_status_is_isolated_with_no_connected_peers() {
        let transport = Arc::new(FakeTransport::new());
        let pool = ConnectionPool::new(ConnectionPoolConfig::default(), transport);
        assert_eq!(pool.node_status(), NodeConnectionStatus::Isolated);
    }

    #[tokio::test]
    async fn registered_handler_receives_dispatched_frames() {
        let transport = Arc::new(FakeTransport::new());
        let pool = ConnectionPool::new(ConnectionPoolConfig::default(), transport);
        let (tx, mut rx) = mpsc::channel(4);
        pool.register_stream_handler(MessageKind::TransactionNotify, tx);

        pool.dispatch_incoming(
            PeerId::from("p1"),
            MessageEnvelope::new(MessageKind::TransactionNotify, "c1", vec![1, 2, 3]),
        )
        .await;

        let (from, envelope) = rx.recv().await.unwrap();
        assert_eq!(from, PeerId::from("p1"));
        assert_eq!(envelope.payload, vec![1, 2, 3]);
    }
}
