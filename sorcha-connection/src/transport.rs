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

//! An abstraction over the wire transport, mirroring the teacher's own
//! pattern of hiding a concrete network service behind a local `Network`
//! trait (`node/network/bridge`) so the pool under test never talks to a
//! real socket. A production adapter (QUIC/TCP + length-prefixed
//! `rmp-serde` framing, §6) lives outside this crate's test surface; a
//! loopback fake is used here and in every dependent crate's tests.

use crate::envelope::MessageEnvelope;
use async_trait::async_trait;
use sorcha_primitives::{Peer, PeerId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connect to peer {0} failed: {1}")]
    ConnectFailed(PeerId, String),
    #[error("peer {0} is not connected")]
    NotConnected(PeerId),
    #[error("send to peer {0} failed: {1}")]
    SendFailed(PeerId, String),
}

/// What the Connection Pool needs from a transport: open a session,
/// send a frame on it, and close it. Incoming frames are delivered out
/// of band via whatever mechanism the transport uses to feed
/// `ConnectionPool::dispatch_incoming` (a channel drain task in
/// production; direct calls in tests).
#[async_trait]
pub trait Transport: Send + Sync {
    async fn connect(&self, peer: &Peer) -> Result<(), TransportError>;
    async fn send(&self, peer_id: &PeerId, envelope: MessageEnvelope) -> Result<(), TransportError>;
    async fn disconnect(&self, peer_id: &PeerId);
}

#[cfg(any(test, feature = "test-support"))]
pub mod fake {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashSet;

    /// An in-memory transport whose `connect` outcome and reachability
    /// per peer are controlled by the test, and whose sent frames are
    /// recorded for assertion.
    #[derive(Default)]
    pub struct FakeTransport {
        unreachable: Mutex<HashSet<PeerId>>,
        connected: Mutex<HashSet<PeerId>>,
        sent: Mutex<Vec<(PeerId, MessageEnvelope)>>,
    }

    impl FakeTransport {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn mark_unreachable(&self, peer_id: PeerId) {
            self.unreachable.lock().insert(peer_id);
        }

        pub fn mark_reachable(&self, peer_id: &PeerId) {
            self.unreachable.lock().remove(peer_id);
        }

        pub fn sent_messages(&self) -> Vec<(PeerId, MessageEnvelope)> {
            self.sent.lock().clone()
        }

        pub fn is_connected(&self, peer_id: &PeerId) -> bool {
            self.connected.lock().contains(peer_id)
        }
    }

    #[async_trait]
    impl Transport for FakeTransport {
        async fn connect(&self, peer: &Peer) -> Result<(), TransportError> {
            if self.unreachable.lock().contains(&peer.peer_id) {
                return Err(TransportError::ConnectFailed(
                    peer.peer_id.clone(),
                    "simulated unreachable".into(),
                ));
            }
            self.connected.lock().insert(peer.peer_id.clone());
            Ok(())
        }

        async fn send(&self, peer_id: &PeerId, envelope: MessageEnvelope) -> Result<(), TransportError> {
            if !self.connected.lock().contains(peer_id) {
                return Err(TransportError::NotConnected(peer_id.clone()));
            }
            self.sent.lock().push((peer_id.clone(), envelope));
            Ok(())
        }

        async fn disconnect(&self, peer_id: &PeerId) {
            self.connected.lock().remove(peer_id);
        }
    }
}
