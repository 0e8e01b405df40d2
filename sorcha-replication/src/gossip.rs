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

//! Live gossip notify (§4.6): a freshly verified transaction is announced
//! to a fanout of peers for a bounded number of rounds; recipients
//! de-duplicate by `tx_id` within a TTL window and relay onward until the
//! hop budget is spent.

use crate::config::GossipConfig;
use lru::LruCache;
use parking_lot::Mutex;
use sorcha_connection::{ConnectionPool, MessageEnvelope, MessageKind, Transport};
use sorcha_primitives::{sha256_hex, PeerId, TxId, VerifiedTransaction};
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::sync::Arc;
use tracing::debug;

const LOG_TARGET: &str = "replication_gossip";
const DEDUP_CACHE_CAPACITY: usize = 65_536;

/// Wire payload for `MessageKind::TransactionNotify` (§4.6).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NotificationPayload {
    pub tx_id: TxId,
    pub origin_peer: PeerId,
    pub timestamp: i64,
    pub data_hash: String,
    pub data_size: u64,
    pub gossip_round: u32,
    pub hop_count: u32,
    pub ttl: u32,
    /// The full payload if under `streaming_threshold_bytes`; otherwise a
    /// hash-only teaser that recipients must pull by `tx_id` (§4.6).
    pub payload: Option<Vec<u8>>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum GossipOutcome {
    /// Already seen within the dedup TTL; drop silently.
    Duplicate,
    /// Hop budget already exhausted by the sender; drop without relay.
    Dropped,
    /// First sighting; `needs_payload` is set when only a hash teaser was
    /// carried and the recipient must request the body by `tx_id`.
    Fresh { needs_payload: bool },
}

pub struct GossipEngine<T: Transport> {
    config: GossipConfig,
    dedup: Mutex<LruCache<TxId, i64>>,
    pool: Arc<ConnectionPool<T>>,
}

impl<T: Transport> GossipEngine<T> {
    pub fn new(config: GossipConfig, pool: Arc<ConnectionPool<T>>) -> Self {
        Self {
            config,
            dedup: Mutex::new(LruCache::new(NonZeroUsize::new(DEDUP_CACHE_CAPACITY).unwrap())),
            pool,
        }
    }

    /// `false` if `tx_id` was already recorded within `tx_cache_ttl_micros`
    /// of `now`; records the sighting either way.
    fn mark_seen(&self, tx_id: &TxId, now: i64) -> bool {
        let mut cache = self.dedup.lock();
        if let Some(seen_at) = cache.get(tx_id) {
            if now - *seen_at < self.config.tx_cache_ttl_micros {
                return false;
            }
        }
        cache.put(tx_id.clone(), now);
        true
    }

    /// Announces a freshly verified local transaction to up to
    /// `fanout_factor` candidate peers (§4.6 "Gossip notify (live)").
    /// Takes a bare `tx_id` rather than a `VerifiedTransaction` since the
    /// notification envelope never carries more than the id, the origin,
    /// and the teaser/payload bytes the caller already has in hand.
    pub async fn notify(
        &self,
        tx_id: &TxId,
        origin_peer: PeerId,
        payload_bytes: &[u8],
        candidate_peers: &[PeerId],
        now: i64,
    ) {
        self.mark_seen(tx_id, now);
        let notification = NotificationPayload {
            tx_id: tx_id.clone(),
            origin_peer,
            timestamp: now,
            data_hash: sha256_hex(payload_bytes),
            data_size: payload_bytes.len() as u64,
            gossip_round: 0,
            hop_count: 0,
            ttl: self.config.gossip_rounds,
            payload: if payload_bytes.len() <= self.config.streaming_threshold_bytes {
                Some(payload_bytes.to_vec())
            } else {
                None
            },
        };
        self.fanout(&notification, candidate_peers, None, now).await;
    }

    /// Processes an inbound notification against the dedup cache and hop
    /// budget. The caller is responsible for relaying (`relay`) and for
    /// requesting the transaction body when `needs_payload` is set.
    pub fn receive(&self, notification: &NotificationPayload, now: i64) -> GossipOutcome {
        if !self.mark_seen(&notification.tx_id, now) {
            return GossipOutcome::Duplicate;
        }
        if notification.ttl == 0 {
            return GossipOutcome::Dropped;
        }
        GossipOutcome::Fresh {
            needs_payload: notification.payload.is_none(),
        }
    }

    /// Relays a freshly received notification onward, decrementing its
    /// hop budget and excluding the peer it arrived from (§4.6, §5
    /// "Gossip delivery is unordered").
    pub async fn relay(&self, notification: NotificationPayload, from: &PeerId, candidate_peers: &[PeerId], now: i64) {
        if notification.ttl == 0 {
            return;
        }
        let mut relayed = notification;
        relayed.hop_count += 1;
        relayed.ttl -= 1;
        relayed.gossip_round += 1;
        self.fanout(&relayed, candidate_peers, Some(from), now).await;
    }

    async fn fanout(&self, notification: &NotificationPayload, candidate_peers: &[PeerId], exclude: Option<&PeerId>, now: i64) {
        let targets: Vec<PeerId> = candidate_peers
            .iter()
            .filter(|p| exclude != Some(p))
            .take(self.config.fanout_factor)
            .cloned()
            .collect();
        if targets.is_empty() {
            debug!(target: LOG_TARGET, tx_id = %notification.tx_id, "no candidate peers to fan out to");
            return;
        }
        let payload = match sorcha_subsystem_util::Storage::encode(notification) {
            Ok(bytes) => bytes,
            Err(e) => {
                debug!(target: LOG_TARGET, tx_id = %notification.tx_id, error = %e, "failed to encode notification");
                return;
            }
        };
        let envelope = MessageEnvelope::new(MessageKind::TransactionNotify, format!("gossip-{}-{now}", notification.tx_id), payload);
        self.pool.broadcast(&targets, envelope).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sorcha_connection::{ConnectionPoolConfig, FakeTransport};
    use sorcha_primitives::{Algorithm, Payloads, RegisterId, Transaction, GENESIS_BLUEPRINT_ID};

    fn verified() -> VerifiedTransaction {
        VerifiedTransaction {
            transaction: Transaction {
                tx_id: TxId::from("tx1"),
                register_id: RegisterId::from("r1"),
                blueprint_id: GENESIS_BLUEPRINT_ID.into(),
                previous_transaction_id: None,
                payload_hash: "h".into(),
                payloads: Payloads::new(),
                sender_wallet: "w".into(),
                signature: vec![],
                public_key: vec![],
                algorithm: Algorithm::Ed25519,
                submitted_at: 0,
            },
            verified_at: 0,
            blueprint_snapshot_id: "genesis".into(),
        }
    }

    fn engine() -> GossipEngine<FakeTransport> {
        let transport = Arc::new(FakeTransport::new());
        let pool = Arc::new(ConnectionPool::new(ConnectionPoolConfig::default(), transport));
        GossipEngine::new(GossipConfig::default(), pool)
    }

    #[test]
    fn duplicate_notification_within_ttl_is_dropped() {
        let engine = engine();
        let notification = NotificationPayload {
            tx_id: TxId::from("tx1"),
            origin_peer: PeerId::from("origin"),
            timestamp: 0,
            data_hash: "h".into(),
            data_size: 0,
            gossip_round: 0,
            hop_count: 0,
            ttl: 3,
            payload: None,
        };
        assert!(matches!(
            engine.receive(&notification, 0),
            GossipOutcome::Fresh { needs_payload: true }
        ));
        assert_eq!(engine.receive(&notification, 10), GossipOutcome::Duplicate);
    }

    #[test]
    fn notification_past_ttl_window_is_treated_as_fresh_again() {
        let engine = engine();
        let notification = NotificationPayload {
            tx_id: TxId::from("tx1"),
            origin_peer: PeerId::from("origin"),
            timestamp: 0,
            data_hash: "h".into(),
            data_size: 0,
            gossip_round: 0,
            hop_count: 0,
            ttl: 3,
            payload: None,
        };
        engine.receive(&notification, 0);
        let far_future = GossipConfig::default().tx_cache_ttl_micros + 1;
        assert!(matches!(engine.receive(&notification, far_future), GossipOutcome::Fresh { .. }));
    }

    #[test]
    fn zero_ttl_notification_is_dropped_without_relay() {
        let engine = engine();
        let notification = NotificationPayload {
            tx_id: TxId::from("tx2"),
            origin_peer: PeerId::from("origin"),
            timestamp: 0,
            data_hash: "h".into(),
            data_size: 0,
            gossip_round: 2,
            hop_count: 3,
            ttl: 0,
            payload: None,
        };
        assert_eq!(engine.receive(&notification, 0), GossipOutcome::Dropped);
    }

    #[tokio::test]
    async fn notify_marks_own_transaction_as_seen() {
        let engine = engine();
        let tx = verified();
        engine.notify(tx.tx_id(), PeerId::from("self"), b"data", &[], 0).await;
        let re_notification = NotificationPayload {
            tx_id: TxId::from("tx1"),
            origin_peer: PeerId::from("self"),
            timestamp: 0,
            data_hash: "h".into(),
            data_size: 4,
            gossip_round: 0,
            hop_count: 0,
            ttl: 3,
            payload: None,
        };
        assert_eq!(engine.receive(&re_notification, 0), GossipOutcome::Duplicate);
    }
}
