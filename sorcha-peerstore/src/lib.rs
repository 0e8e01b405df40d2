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

//! The Peer List Store (§4.1): a bounded, health-aware set of known
//! peers keyed by `peer_id`, plus the local node's view of its currently
//! connected hub.
//!
//! Reads take a lock-free copy-on-write snapshot of the peer map (§5
//! "reads lock-free via a copy-on-write snapshot"); writes serialise
//! through a single mutex guarding the snapshot pointer, mirroring the
//! read/write split the teacher's network bridge keeps between its
//! `ProtocolState` and the peer-set it hands out to gossip jobs.

mod config;
pub mod persist;

pub use config::PeerStoreConfig;

use parking_lot::Mutex;
use rand::seq::SliceRandom;
use sorcha_primitives::{now_micros, ActivePeerInfo, Peer, PeerId, RegisterId};
use sorcha_subsystem_util::{Storage, StorageResult};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

const LOG_TARGET: &str = "peerstore";

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AddResult {
    Added,
    Updated,
    Rejected,
}

type PeerMap = HashMap<PeerId, Peer>;

pub struct PeerListStore {
    config: PeerStoreConfig,
    peers: Mutex<Arc<PeerMap>>,
    active: Mutex<Option<ActivePeerInfo>>,
    storage: Option<Storage>,
}

impl PeerListStore {
    pub fn new(config: PeerStoreConfig) -> Self {
        Self {
            config,
            peers: Mutex::new(Arc::new(HashMap::new())),
            active: Mutex::new(None),
            storage: None,
        }
    }

    /// Rebuilds the in-memory snapshot from durable state on restart (§3
    /// Ownership & lifecycle) and keeps writing through to `storage` on
    /// every subsequent mutation.
    pub fn load(config: PeerStoreConfig, storage: Storage) -> StorageResult<Self> {
        let peers = persist::load_all(&storage)?;
        let mut map = HashMap::new();
        for peer in peers {
            map.insert(peer.peer_id.clone(), peer);
        }
        Ok(Self {
            config,
            peers: Mutex::new(Arc::new(map)),
            active: Mutex::new(None),
            storage: Some(storage),
        })
    }

    fn write_through(&self, peer: &Peer) {
        if let Some(storage) = &self.storage {
            if let Err(e) = persist::persist(storage, peer) {
                warn!(target: LOG_TARGET, peer_id = %peer.peer_id, error = %e, "failed to persist peer update");
            }
        }
    }

    fn delete_through(&self, peer_id: &PeerId) {
        if let Some(storage) = &self.storage {
            if let Err(e) = persist::delete(storage, peer_id) {
                warn!(target: LOG_TARGET, %peer_id, error = %e, "failed to persist peer removal");
            }
        }
    }

    fn snapshot(&self) -> Arc<PeerMap> {
        self.peers.lock().clone()
    }

    /// Updates of existing entries always succeed; new entries are
    /// rejected once the store is at capacity (§4.1, §3 Peer invariants).
    pub fn add_or_update(&self, peer: Peer) -> AddResult {
        let mut guard = self.peers.lock();
        if guard.contains_key(&peer.peer_id) {
            let mut updated = (**guard).clone();
            updated.insert(peer.peer_id.clone(), peer.clone());
            *guard = Arc::new(updated);
            drop(guard);
            self.write_through(&peer);
            return AddResult::Updated;
        }
        if guard.len() >= self.config.max_peers {
            warn!(target: LOG_TARGET, max_peers = self.config.max_peers, "peer store at capacity, rejecting new peer");
            return AddResult::Rejected;
        }
        let mut updated = (**guard).clone();
        updated.insert(peer.peer_id.clone(), peer.clone());
        *guard = Arc::new(updated);
        drop(guard);
        self.write_through(&peer);
        AddResult::Added
    }

    pub fn remove(&self, peer_id: &PeerId) -> bool {
        let mut guard = self.peers.lock();
        if !guard.contains_key(peer_id) {
            return false;
        }
        let mut updated = (**guard).clone();
        updated.remove(peer_id);
        *guard = Arc::new(updated);
        drop(guard);
        self.delete_through(peer_id);
        true
    }

    pub fn get(&self, peer_id: &PeerId) -> Option<Peer> {
        self.snapshot().get(peer_id).cloned()
    }

    pub fn get_all(&self) -> Vec<Peer> {
        self.snapshot().values().cloned().collect()
    }

    pub fn get_healthy(&self) -> Vec<Peer> {
        let now = now_micros();
        self.snapshot()
            .values()
            .filter(|p| p.is_healthy(now, self.config.freshness_window_micros, self.config.failure_threshold))
            .cloned()
            .collect()
    }

    pub fn get_random(&self, n: usize) -> Vec<Peer> {
        let mut healthy = self.get_healthy();
        healthy.shuffle(&mut rand::thread_rng());
        healthy.truncate(n);
        healthy
    }

    pub fn update_last_seen(&self, peer_id: &PeerId) {
        let mut guard = self.peers.lock();
        if !guard.contains_key(peer_id) {
            return;
        }
        let mut updated = (**guard).clone();
        if let Some(p) = updated.get_mut(peer_id) {
            p.health.last_seen = now_micros();
            p.health.failure_count = 0;
        }
        let persisted = updated.get(peer_id).cloned();
        *guard = Arc::new(updated);
        drop(guard);
        if let Some(p) = persisted {
            self.write_through(&p);
        }
    }

    /// Increments the peer's failure count; past the threshold a
    /// non-seed peer is evicted outright (§4.1, §3 invariant
    /// `failure_count >= 6`).
    pub fn increment_failures(&self, peer_id: &PeerId) {
        let mut guard = self.peers.lock();
        if !guard.contains_key(peer_id) {
            return;
        }
        let mut evict = false;
        let mut updated = (**guard).clone();
        if let Some(p) = updated.get_mut(peer_id) {
            p.health.failure_count += 1;
            evict = p.health.should_evict();
        }
        let persisted = updated.get(peer_id).cloned();
        if evict {
            debug!(target: LOG_TARGET, %peer_id, "evicting peer past failure threshold");
            updated.remove(peer_id);
        }
        *guard = Arc::new(updated);
        drop(guard);
        if evict {
            self.delete_through(peer_id);
        } else if let Some(p) = persisted {
            self.write_through(&p);
        }
    }

    /// Peers advertising `register_id`, ordered by `(failure_count ASC,
    /// last_seen DESC)` (§4.1).
    pub fn peers_advertising(&self, register_id: &RegisterId) -> Vec<Peer> {
        let mut matching: Vec<Peer> = self
            .snapshot()
            .values()
            .filter(|p| p.advertises(register_id).is_some())
            .cloned()
            .collect();
        matching.sort_by(|a, b| {
            a.health
                .failure_count
                .cmp(&b.health.failure_count)
                .then(b.health.last_seen.cmp(&a.health.last_seen))
        });
        matching
    }

    /// Peers able to serve a full-replica pull for `register_id`, ordered
    /// by `avg_latency_ms ASC` (§4.1).
    pub fn full_replica_peers(&self, register_id: &RegisterId) -> Vec<Peer> {
        let mut matching: Vec<Peer> = self
            .snapshot()
            .values()
            .filter(|p| {
                p.advertises(register_id)
                    .map(|r| r.can_serve_full_replica())
                    .unwrap_or(false)
            })
            .cloned()
            .collect();
        matching.sort_by(|a, b| {
            a.health
                .avg_latency_ms
                .partial_cmp(&b.health.avg_latency_ms)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        matching
    }

    /// Tracks which peer is currently the local node's connected hub.
    /// Initialises an `ActivePeerInfo` record on first call.
    pub fn update_local_peer_status(&self, connected_peer_id: Option<PeerId>, status: impl Into<String>) {
        let now = now_micros();
        let mut guard = self.active.lock();
        let status = status.into();
        match guard.as_mut() {
            Some(info) => {
                info.connected_peer_id = connected_peer_id;
                info.status = status;
                info.last_heartbeat = now;
            }
            None => {
                *guard = Some(ActivePeerInfo::new(connected_peer_id, status, now));
            }
        }
    }

    pub fn local_peer_status(&self) -> Option<ActivePeerInfo> {
        self.active.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.peers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sorcha_primitives::AdvertisedRegister;
    use sorcha_primitives::PeerSyncState;

    fn peer(id: &str, is_seed: bool) -> Peer {
        Peer::new(PeerId::from(id), "127.0.0.1".into(), 9000, is_seed, now_micros())
    }

    #[test]
    fn rejects_new_peers_once_at_capacity_but_updates_still_succeed() {
        let store = PeerListStore::new(PeerStoreConfig {
            max_peers: 2,
            ..Default::default()
        });
        assert_eq!(store.add_or_update(peer("p1", false)), AddResult::Added);
        assert_eq!(store.add_or_update(peer("p2", false)), AddResult::Added);
        assert_eq!(store.add_or_update(peer("p3", false)), AddResult::Rejected);
        assert_eq!(store.add_or_update(peer("p1", false)), AddResult::Updated);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn seed_peers_are_never_evicted_on_failures() {
        let store = PeerListStore::new(PeerStoreConfig::default());
        store.add_or_update(peer("seed", true));
        for _ in 0..20 {
            store.increment_failures(&PeerId::from("seed"));
        }
        assert!(store.get(&PeerId::from("seed")).is_some());
    }

    #[test]
    fn non_seed_peer_is_evicted_past_failure_threshold() {
        let store = PeerListStore::new(PeerStoreConfig::default());
        store.add_or_update(peer("p1", false));
        for _ in 0..6 {
            store.increment_failures(&PeerId::from("p1"));
        }
        assert!(store.get(&PeerId::from("p1")).is_none());
    }

    #[test]
    fn update_last_seen_resets_failure_count() {
        let store = PeerListStore::new(PeerStoreConfig::default());
        store.add_or_update(peer("p1", false));
        store.increment_failures(&PeerId::from("p1"));
        store.increment_failures(&PeerId::from("p1"));
        store.update_last_seen(&PeerId::from("p1"));
        assert_eq!(store.get(&PeerId::from("p1")).unwrap().health.failure_count, 0);
    }

    #[test]
    fn peers_advertising_register_sorted_by_failures_then_recency() {
        let store = PeerListStore::new(PeerStoreConfig::default());
        let register_id = sorcha_primitives::RegisterId::from("r1");
        let mut a = peer("a", false);
        a.advertised_registers.push(AdvertisedRegister {
            register_id: register_id.clone(),
            sync_state: PeerSyncState::Active,
            latest_docket_version: 1,
            latest_transaction_version: 1,
            is_public: true,
        });
        let mut b = peer("b", false);
        b.advertised_registers.push(AdvertisedRegister {
            register_id: register_id.clone(),
            sync_state: PeerSyncState::Active,
            latest_docket_version: 1,
            latest_transaction_version: 1,
            is_public: true,
        });
        store.add_or_update(a);
        store.add_or_update(b);
        store.increment_failures(&PeerId::from("a"));

        let results = store.peers_advertising(&register_id);
        assert_eq!(results[0].peer_id, PeerId::from("b"));
    }

    #[test]
    fn local_peer_status_initialises_on_first_call() {
        let store = PeerListStore::new(PeerStoreConfig::default());
        assert!(store.local_peer_status().is_none());
        store.update_local_peer_status(Some(PeerId::from("hub")), "Connected");
        let info = store.local_peer_status().unwrap();
        assert_eq!(info.connected_peer_id, Some(PeerId::from("hub")));
        assert_eq!(info.status, "Connected");
    }
}
