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

//! Subscription Manager (§4.5): at most one `Subscription` per
//! `register_id`, driving the `Subscribing → Syncing/Active →
//! FullyReplicated` state machine already encoded on
//! `sorcha_primitives::Subscription`, plus the two things that live
//! outside that pure record: hedged preferred-peer failover between sync
//! attempts, and applying a batch of pulled dockets to the local
//! `RegisterStore`.
//!
//! Source-peer selection is resolved as hedged preferred-peer retry: the
//! best-ranked `FullyReplicated` advertiser (lowest `avg_latency_ms`) is
//! tried first; a failed attempt excludes that peer for the
//! subscription's next attempt, cycling back to the full candidate set
//! once every known peer has been excluded. Only the ten-consecutive-
//! failure latch of §4.5 ends automatic retry.

mod config;
mod payload;

pub use config::SubscriptionConfig;
pub use payload::{DocketDataPayload, DocketRequestPayload, PulledDocket};

use parking_lot::Mutex;
use sorcha_peerstore::PeerListStore;
use sorcha_primitives::{Peer, PeerId, RegisterId, Subscription, SubscriptionMode};
use sorcha_register::{RegisterStore, RegisterStoreError};
use std::collections::{HashMap, HashSet};
use thiserror::Error;
use tracing::{info, warn};

const LOG_TARGET: &str = "subscription";

#[derive(Debug, Error)]
pub enum SubscriptionError {
    #[error("subscription for register {0} already exists")]
    AlreadyExists(RegisterId),
    #[error("no subscription for register {0}")]
    NotFound(RegisterId),
    #[error("max_concurrent_docket_pulls reached for register {0}")]
    TooManyConcurrentPulls(RegisterId),
    #[error("pulled docket merkle root does not verify")]
    DocketMerkleInvalid,
    #[error(transparent)]
    RegisterStore(#[from] RegisterStoreError),
}

pub type SubscriptionResult<T> = Result<T, SubscriptionError>;

struct Entry {
    subscription: Subscription,
    excluded_peers: HashSet<PeerId>,
    in_flight_pulls: usize,
}

pub struct SubscriptionManager {
    config: SubscriptionConfig,
    entries: Mutex<HashMap<RegisterId, Entry>>,
}

impl SubscriptionManager {
    pub fn new(config: SubscriptionConfig) -> Self {
        Self {
            config,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// At most one subscription per `(local_node, register_id)` (§4.5).
    pub fn subscribe(&self, register_id: RegisterId, mode: SubscriptionMode) -> SubscriptionResult<()> {
        let mut entries = self.entries.lock();
        if entries.contains_key(&register_id) {
            return Err(SubscriptionError::AlreadyExists(register_id));
        }
        let id = format!("sub-{register_id}");
        entries.insert(
            register_id.clone(),
            Entry {
                subscription: Subscription::new(id, register_id.clone(), mode),
                excluded_peers: HashSet::new(),
                in_flight_pulls: 0,
            },
        );
        info!(target: LOG_TARGET, %register_id, ?mode, "subscription created");
        Ok(())
    }

    pub fn get(&self, register_id: &RegisterId) -> Option<Subscription> {
        self.entries.lock().get(register_id).map(|e| e.subscription.clone())
    }

    pub fn list(&self) -> Vec<Subscription> {
        self.entries.lock().values().map(|e| e.subscription.clone()).collect()
    }

    /// Picks the best remaining candidate source peer for `register_id`
    /// (lowest `avg_latency_ms` among `FullyReplicated` advertisers, per
    /// `sorcha_peerstore::PeerListStore::full_replica_peers`), skipping
    /// peers already excluded by a prior failed attempt. Cycles back to
    /// the full candidate set once every known peer has been excluded.
    pub fn pick_source_peer(&self, peers: &PeerListStore, register_id: &RegisterId) -> Option<Peer> {
        let candidates = peers.full_replica_peers(register_id);
        if candidates.is_empty() {
            return None;
        }
        let mut entries = self.entries.lock();
        let entry = entries.get_mut(register_id)?;
        if let Some(pick) = candidates.iter().find(|p| !entry.excluded_peers.contains(&p.peer_id)) {
            return Some(pick.clone());
        }
        entry.excluded_peers.clear();
        candidates.into_iter().next()
    }

    /// Reserves one of the subscription's `max_concurrent_docket_pulls`
    /// slots; the caller releases it via `finish_docket_pull` regardless
    /// of outcome.
    pub fn begin_docket_pull(&self, register_id: &RegisterId) -> SubscriptionResult<()> {
        let mut entries = self.entries.lock();
        let entry = entries
            .get_mut(register_id)
            .ok_or_else(|| SubscriptionError::NotFound(register_id.clone()))?;
        if entry.in_flight_pulls >= self.config.max_concurrent_docket_pulls {
            return Err(SubscriptionError::TooManyConcurrentPulls(register_id.clone()));
        }
        entry.in_flight_pulls += 1;
        Ok(())
    }

    pub fn finish_docket_pull(&self, register_id: &RegisterId) {
        if let Some(entry) = self.entries.lock().get_mut(register_id) {
            entry.in_flight_pulls = entry.in_flight_pulls.saturating_sub(1);
        }
    }

    pub fn request_payload(&self, register_id: &RegisterId) -> Option<DocketRequestPayload> {
        let entries = self.entries.lock();
        let entry = entries.get(register_id)?;
        Some(DocketRequestPayload {
            register_id: register_id.clone(),
            from_version: entry.subscription.last_synced_docket_version,
            batch_size: self.config.docket_pull_batch_size,
        })
    }

    /// Records a failed sync attempt against `peer_id`: excludes it from
    /// the next pick and advances the subscription's failure counter,
    /// latching `Error` after ten consecutive failures (§4.5).
    pub fn record_failure(&self, register_id: &RegisterId, peer_id: PeerId, error_message: impl Into<String>) {
        let mut entries = self.entries.lock();
        if let Some(entry) = entries.get_mut(register_id) {
            entry.excluded_peers.insert(peer_id);
            entry.subscription.on_sync_failure(error_message);
        }
    }

    /// Validates, commits, and records successful application of a batch
    /// of pulled dockets (§4.5: "Each pulled docket is committed to the
    /// local Register Store only after all its transactions are resolved
    /// and the docket's merkle root verifies against its contents.").
    /// Dockets are applied strictly in ascending version order; the first
    /// failure stops the batch without discarding prior progress.
    pub fn apply_pulled_dockets(
        &self,
        register_id: &RegisterId,
        register_store: &RegisterStore,
        mut dockets: Vec<PulledDocket>,
        total_dockets_in_chain: u64,
    ) -> SubscriptionResult<()> {
        dockets.sort_by_key(|d| d.docket.docket_version);

        for pulled in dockets {
            if !pulled.docket.merkle_root_is_valid() {
                warn!(target: LOG_TARGET, %register_id, version = pulled.docket.docket_version, "pulled docket failed merkle verification");
                return Err(SubscriptionError::DocketMerkleInvalid);
            }
            for tx in &pulled.transactions {
                register_store.store_transaction(tx)?;
            }
            let version = pulled.docket.docket_version;
            register_store.append_docket(pulled.docket)?;

            let mut entries = self.entries.lock();
            if let Some(entry) = entries.get_mut(register_id) {
                let caught_up = version + 1 >= total_dockets_in_chain;
                entry.subscription.total_dockets_in_chain = total_dockets_in_chain;
                entry.subscription.on_sync_success(version, caught_up);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sorcha_primitives::{now_micros, AdvertisedRegister, PeerSyncState, RegisterId, SubscriptionState};
    use sorcha_register::RegisterStoreConfig;
    use sorcha_subsystem_util::Storage;

    fn peer_with_register(id: &str, register_id: &RegisterId, avg_latency_ms: f64) -> Peer {
        let mut p = Peer::new(PeerId::from(id), "127.0.0.1".into(), 9000, false, 0);
        p.health.avg_latency_ms = avg_latency_ms;
        p.advertised_registers.push(AdvertisedRegister {
            register_id: register_id.clone(),
            sync_state: PeerSyncState::FullyReplicated,
            latest_docket_version: 10,
            latest_transaction_version: 10,
            is_public: true,
        });
        p
    }

    #[test]
    fn subscribe_is_single_per_register() {
        let manager = SubscriptionManager::new(SubscriptionConfig::default());
        let register_id = RegisterId::from("r1");
        manager.subscribe(register_id.clone(), SubscriptionMode::FullReplica).unwrap();
        let err = manager.subscribe(register_id, SubscriptionMode::FullReplica).unwrap_err();
        assert!(matches!(err, SubscriptionError::AlreadyExists(_)));
    }

    #[test]
    fn picks_lowest_latency_peer_first_then_excludes_on_failure() {
        let manager = SubscriptionManager::new(SubscriptionConfig::default());
        let register_id = RegisterId::from("r1");
        manager.subscribe(register_id.clone(), SubscriptionMode::FullReplica).unwrap();

        let peers = PeerListStore::new(sorcha_peerstore::PeerStoreConfig::default());
        peers.add_or_update(peer_with_register("fast", &register_id, 5.0));
        peers.add_or_update(peer_with_register("slow", &register_id, 50.0));

        let first = manager.pick_source_peer(&peers, &register_id).unwrap();
        assert_eq!(first.peer_id, PeerId::from("fast"));

        manager.record_failure(&register_id, PeerId::from("fast"), "timeout");
        let second = manager.pick_source_peer(&peers, &register_id).unwrap();
        assert_eq!(second.peer_id, PeerId::from("slow"));

        manager.record_failure(&register_id, PeerId::from("slow"), "timeout");
        let cycled = manager.pick_source_peer(&peers, &register_id).unwrap();
        assert_eq!(cycled.peer_id, PeerId::from("fast"));
    }

    #[test]
    fn ten_failures_latch_subscription_into_error() {
        let manager = SubscriptionManager::new(SubscriptionConfig::default());
        let register_id = RegisterId::from("r1");
        manager.subscribe(register_id.clone(), SubscriptionMode::FullReplica).unwrap();
        for _ in 0..10 {
            manager.record_failure(&register_id, PeerId::from("p1"), "down");
        }
        assert_eq!(manager.get(&register_id).unwrap().state, SubscriptionState::Error);
    }

    #[test]
    fn concurrent_pull_slots_are_bounded() {
        let manager = SubscriptionManager::new(SubscriptionConfig {
            max_concurrent_docket_pulls: 1,
            ..Default::default()
        });
        let register_id = RegisterId::from("r1");
        manager.subscribe(register_id.clone(), SubscriptionMode::FullReplica).unwrap();
        manager.begin_docket_pull(&register_id).unwrap();
        let err = manager.begin_docket_pull(&register_id).unwrap_err();
        assert!(matches!(err, SubscriptionError::TooManyConcurrentPulls(_)));
        manager.finish_docket_pull(&register_id);
        manager.begin_docket_pull(&register_id).unwrap();
    }

    #[test]
    fn apply_pulled_dockets_commits_and_advances_subscription() {
        use sorcha_eventsink::NullEventSink;
        use sorcha_primitives::{Algorithm, Docket, Payloads, TxId, GENESIS_BLUEPRINT_ID};
        use std::sync::Arc;

        let manager = SubscriptionManager::new(SubscriptionConfig::default());
        let register_store = RegisterStore::new(
            RegisterStoreConfig::default(),
            Storage::open_memory(sorcha_register::keys::NUM_COLUMNS),
            Arc::new(NullEventSink),
        );
        let register_id = RegisterId::from("00112233445566778899aabbccddeeff");

        let register = sorcha_primitives::Register::new(
            register_id.clone(),
            "n".into(),
            sorcha_primitives::TenantId::from("t1"),
            false,
            now_micros(),
        )
        .unwrap();
        let genesis_tx = sorcha_primitives::Transaction {
            tx_id: TxId::from("genesis"),
            register_id: register_id.clone(),
            blueprint_id: GENESIS_BLUEPRINT_ID.into(),
            previous_transaction_id: None,
            payload_hash: "h".into(),
            payloads: Payloads::new(),
            sender_wallet: "owner".into(),
            signature: vec![],
            public_key: vec![],
            algorithm: Algorithm::Ed25519,
            submitted_at: now_micros(),
        };
        register_store.create(register, genesis_tx).unwrap();
        manager.subscribe(register_id.clone(), SubscriptionMode::FullReplica).unwrap();

        let genesis_docket = Docket::build(register_id.clone(), 0, vec![], None, now_micros()).unwrap();
        manager
            .apply_pulled_dockets(
                &register_id,
                &register_store,
                vec![PulledDocket {
                    docket: genesis_docket.clone(),
                    transactions: vec![],
                }],
                2,
            )
            .unwrap();
        // First applied docket moves Subscribing -> Syncing regardless of
        // how close to caught-up it is (§4.5 state diagram).
        assert_eq!(manager.get(&register_id).unwrap().state, SubscriptionState::Syncing);

        let next_docket = Docket::build(
            register_id.clone(),
            1,
            vec![],
            Some(genesis_docket.docket_id.clone()),
            now_micros(),
        )
        .unwrap();
        manager
            .apply_pulled_dockets(
                &register_id,
                &register_store,
                vec![PulledDocket {
                    docket: next_docket,
                    transactions: vec![],
                }],
                2,
            )
            .unwrap();

        let sub = manager.get(&register_id).unwrap();
        assert_eq!(sub.last_synced_docket_version, 1);
        assert_eq!(sub.state, SubscriptionState::FullyReplicated);
        assert_eq!(register_store.get_register(&register_id).unwrap().unwrap().height, 2);
    }
}
