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

//! Peer and advertised-register records (§3 Peer, AdvertisedRegister).

use crate::ids::{PeerId, RegisterId};
use serde::{Deserialize, Serialize};

/// Replication state of a register as advertised by a remote peer.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum SyncState {
    Subscribing,
    Syncing,
    FullyReplicated,
    Active,
    Error,
}

/// A register a peer claims to host, with enough metadata for the
/// Subscription Manager and Replication Engine to decide whether to pull
/// from it (§3 AdvertisedRegister).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AdvertisedRegister {
    pub register_id: RegisterId,
    pub sync_state: SyncState,
    pub latest_docket_version: u64,
    pub latest_transaction_version: u64,
    pub is_public: bool,
}

impl AdvertisedRegister {
    /// Only `FullyReplicated` peers may serve full replica pulls (§4.1).
    pub fn can_serve_full_replica(&self) -> bool {
        matches!(self.sync_state, SyncState::FullyReplicated)
    }
}

/// Health counters tracked per peer by the Peer List Store (§3 Peer).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PeerHealth {
    pub first_seen: i64,
    pub last_seen: i64,
    pub failure_count: u32,
    pub avg_latency_ms: f64,
    pub is_seed: bool,
}

impl PeerHealth {
    pub fn new(now: i64, is_seed: bool) -> Self {
        Self {
            first_seen: now,
            last_seen: now,
            failure_count: 0,
            avg_latency_ms: 0.0,
            is_seed,
        }
    }

    /// `failure_count >= 6` evicts non-seed peers (§3 Peer invariants).
    /// Seeds are never evicted regardless of `failure_count`.
    pub fn should_evict(&self) -> bool {
        !self.is_seed && self.failure_count >= 6
    }

    /// Exponential moving average, alpha chosen to weight the last few
    /// samples without letting one outlier dominate.
    pub fn record_latency(&mut self, sample_ms: f64) {
        const ALPHA: f64 = 0.3;
        if self.avg_latency_ms == 0.0 {
            self.avg_latency_ms = sample_ms;
        } else {
            self.avg_latency_ms = ALPHA * sample_ms + (1.0 - ALPHA) * self.avg_latency_ms;
        }
    }
}

/// A known peer: address, transports, advertised registers, and health
/// (§3 Peer).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Peer {
    pub peer_id: PeerId,
    pub address: String,
    pub port: u16,
    pub transports: Vec<String>,
    pub advertised_registers: Vec<AdvertisedRegister>,
    pub health: PeerHealth,
}

impl Peer {
    pub fn new(peer_id: PeerId, address: String, port: u16, is_seed: bool, now: i64) -> Self {
        Self {
            peer_id,
            address,
            port,
            transports: Vec::new(),
            advertised_registers: Vec::new(),
            health: PeerHealth::new(now, is_seed),
        }
    }

    /// A peer is healthy when it has been seen within the freshness
    /// window and its failure count is below the eviction threshold
    /// (§4.1 `get_healthy`).
    pub fn is_healthy(&self, now: i64, freshness_window_micros: i64, failure_threshold: u32) -> bool {
        (now - self.health.last_seen) <= freshness_window_micros
            && self.health.failure_count < failure_threshold
    }

    pub fn advertises(&self, register_id: &RegisterId) -> Option<&AdvertisedRegister> {
        self.advertised_registers
            .iter()
            .find(|r| &r.register_id == register_id)
    }
}

/// Local-node view of whichever peer is currently serving as its primary
/// connected hub, tracked by `update_local_peer_status` (§4.1).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActivePeerInfo {
    pub connected_peer_id: Option<PeerId>,
    pub status: String,
    pub last_heartbeat: i64,
}

impl ActivePeerInfo {
    pub fn new(connected_peer_id: Option<PeerId>, status: String, now: i64) -> Self {
        Self {
            connected_peer_id,
            status,
            last_heartbeat: now,
        }
    }
}
