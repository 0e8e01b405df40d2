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

//! Peer Exchange / Discovery (§4.4): seeds are dialled first on startup
//! and prime the peer list; on a `peer_refresh_micros` interval the node
//! picks a random healthy peer and exchanges peer-list digests with it;
//! peer lists are also eagerly exchanged on new connection
//! establishment; and a separate advertisement message broadcasts the
//! local set of public `AdvertisedRegister`s. Like the Peer List Store
//! this engine depends on, all timing is driven by `on_tick`, never a
//! private timer.

mod config;
mod payload;

pub use config::DiscoveryConfig;
pub use payload::{PeerDigest, PeerExchangeRequestPayload, PeerExchangeResponsePayload, RegisterAdvertisePayload};

use parking_lot::Mutex;
use sorcha_connection::{ConnectionError, ConnectionPool, MessageEnvelope, MessageKind, Transport};
use sorcha_peerstore::PeerListStore;
use sorcha_primitives::{AdvertisedRegister, Peer, PeerId};
use sorcha_subsystem_util::{Storage, StorageError};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

const LOG_TARGET: &str = "discovery";

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error(transparent)]
    Encoding(#[from] StorageError),
    #[error(transparent)]
    Send(#[from] ConnectionError),
}

pub struct DiscoveryEngine<T: Transport> {
    config: DiscoveryConfig,
    local_peer_id: PeerId,
    peers: Arc<PeerListStore>,
    pool: Arc<ConnectionPool<T>>,
    last_exchange: Mutex<i64>,
}

impl<T: Transport> DiscoveryEngine<T> {
    pub fn new(config: DiscoveryConfig, local_peer_id: PeerId, peers: Arc<PeerListStore>, pool: Arc<ConnectionPool<T>>) -> Self {
        Self {
            config,
            local_peer_id,
            peers,
            pool,
            last_exchange: Mutex::new(0),
        }
    }

    /// Dials every seed, priming the peer list on the first successful
    /// connection (§4.4 "Seeds are dialled first on startup").
    pub async fn bootstrap(&self, seeds: &[Peer], now: i64) {
        for seed in seeds {
            self.peers.add_or_update(seed.clone());
            match self.pool.connect(seed, now).await {
                Ok(()) => {
                    info!(target: LOG_TARGET, peer_id = %seed.peer_id, "seed connected, priming peer list");
                    if let Err(e) = self.exchange_with(&seed.peer_id, now).await {
                        warn!(target: LOG_TARGET, peer_id = %seed.peer_id, error = %e, "seed peer exchange failed");
                    }
                }
                Err(e) => warn!(target: LOG_TARGET, peer_id = %seed.peer_id, error = %e, "seed connect failed"),
            }
        }
    }

    /// Eager exchange on new connection establishment (§4.4).
    pub async fn on_new_connection(&self, peer_id: &PeerId, now: i64) {
        if let Err(e) = self.exchange_with(peer_id, now).await {
            debug!(target: LOG_TARGET, %peer_id, error = %e, "eager peer exchange failed");
        }
    }

    /// Periodic gossip: picks one random healthy peer and exchanges
    /// digests (§4.4).
    pub async fn on_tick(&self, now: i64) {
        {
            let mut last = self.last_exchange.lock();
            if now - *last < self.config.peer_refresh_micros {
                return;
            }
            *last = now;
        }
        if let Some(peer) = self.peers.get_random(1).into_iter().next() {
            if let Err(e) = self.exchange_with(&peer.peer_id, now).await {
                debug!(target: LOG_TARGET, peer_id = %peer.peer_id, error = %e, "periodic peer exchange failed");
            }
        }
    }

    async fn exchange_with(&self, peer_id: &PeerId, now: i64) -> Result<(), DiscoveryError> {
        let payload = Storage::encode(&PeerExchangeRequestPayload {
            known_peers: self.local_digest_snapshot(),
        })?;
        let envelope = MessageEnvelope::new(MessageKind::PeerExchangeRequest, format!("pex-{now}"), payload);
        self.pool.send(peer_id, envelope).await?;
        Ok(())
    }

    /// Handles an inbound `PeerExchangeRequest`: merges the sender's
    /// known peers into the local store and returns the response payload
    /// to send back.
    pub fn handle_request(&self, now: i64, payload: &[u8]) -> Result<PeerExchangeResponsePayload, DiscoveryError> {
        let request: PeerExchangeRequestPayload = Storage::decode(payload)?;
        self.merge_digests(request.known_peers, now);
        Ok(PeerExchangeResponsePayload {
            known_peers: self.local_digest_snapshot(),
        })
    }

    /// Handles an inbound `PeerExchangeResponse`: merges the peers it
    /// names into the local store, subject to capacity (§4.4).
    pub fn handle_response(&self, now: i64, payload: &[u8]) -> Result<(), DiscoveryError> {
        let response: PeerExchangeResponsePayload = Storage::decode(payload)?;
        self.merge_digests(response.known_peers, now);
        Ok(())
    }

    /// Handles an inbound `RegisterAdvertise`: replaces the advertising
    /// peer's known register set.
    pub fn handle_register_advertise(&self, payload: &[u8]) -> Result<(), DiscoveryError> {
        let advertise: RegisterAdvertisePayload = Storage::decode(payload)?;
        if let Some(mut peer) = self.peers.get(&advertise.peer_id) {
            peer.advertised_registers = advertise.registers;
            self.peers.add_or_update(peer);
        }
        Ok(())
    }

    /// Broadcasts the local set of public registers to every currently
    /// healthy peer (§4.4).
    pub async fn broadcast_registers(&self, registers: Vec<AdvertisedRegister>, now: i64) -> Result<(), DiscoveryError> {
        let payload = Storage::encode(&RegisterAdvertisePayload {
            peer_id: self.local_peer_id.clone(),
            registers,
        })?;
        let envelope = MessageEnvelope::new(MessageKind::RegisterAdvertise, format!("adv-{now}"), payload);
        let peer_ids: Vec<PeerId> = self.peers.get_healthy().into_iter().map(|p| p.peer_id).collect();
        self.pool.broadcast(&peer_ids, envelope).await;
        Ok(())
    }

    /// New, previously unknown peers are added subject to the store's
    /// capacity; already-known peers are left untouched so their locally
    /// tracked health is never clobbered by a gossiped digest.
    fn merge_digests(&self, digests: Vec<PeerDigest>, now: i64) {
        for digest in digests {
            if digest.peer_id == self.local_peer_id {
                continue;
            }
            if self.peers.get(&digest.peer_id).is_some() {
                continue;
            }
            let mut peer = Peer::new(digest.peer_id, digest.address, digest.port, false, now);
            peer.transports = digest.transports;
            self.peers.add_or_update(peer);
        }
    }

    fn local_digest_snapshot(&self) -> Vec<PeerDigest> {
        self.peers
            .get_all()
            .into_iter()
            .map(|p| PeerDigest {
                peer_id: p.peer_id,
                address: p.address,
                port: p.port,
                transports: p.transports,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sorcha_connection::{ConnectionPoolConfig, FakeTransport};
    use sorcha_peerstore::PeerStoreConfig;

    fn peer(id: &str) -> Peer {
        Peer::new(PeerId::from(id), "127.0.0.1".into(), 9000, false, 0)
    }

    fn engine() -> (DiscoveryEngine<FakeTransport>, Arc<PeerListStore>, Arc<ConnectionPool<FakeTransport>>) {
        let peers = Arc::new(PeerListStore::new(PeerStoreConfig::default()));
        let transport = Arc::new(FakeTransport::new());
        let pool = Arc::new(ConnectionPool::new(ConnectionPoolConfig::default(), transport));
        let engine = DiscoveryEngine::new(DiscoveryConfig::default(), PeerId::from("local"), peers.clone(), pool.clone());
        (engine, peers, pool)
    }

    #[tokio::test]
    async fn bootstrap_primes_peer_list_and_connects_seed() {
        let (engine, peers, _pool) = engine();
        let seed = peer("seed");
        engine.bootstrap(&[seed.clone()], 0).await;
        assert!(peers.get(&PeerId::from("seed")).is_some());
    }

    #[test]
    fn handle_request_merges_unknown_peers_and_skips_self() {
        let (engine, peers, _pool) = engine();
        let request = PeerExchangeRequestPayload {
            known_peers: vec![
                PeerDigest {
                    peer_id: PeerId::from("new1"),
                    address: "1.2.3.4".into(),
                    port: 9001,
                    transports: vec![],
                },
                PeerDigest {
                    peer_id: PeerId::from("local"),
                    address: "self".into(),
                    port: 0,
                    transports: vec![],
                },
            ],
        };
        let payload = Storage::encode(&request).unwrap();
        let response = engine.handle_request(0, &payload).unwrap();
        assert!(peers.get(&PeerId::from("new1")).is_some());
        assert!(peers.get(&PeerId::from("local")).is_none());
        assert!(response.known_peers.iter().any(|d| d.peer_id == PeerId::from("new1")));
    }

    #[test]
    fn handle_request_never_overwrites_an_already_known_peer() {
        let (engine, peers, _pool) = engine();
        let mut known = peer("p1");
        known.health.failure_count = 3;
        peers.add_or_update(known);

        let request = PeerExchangeRequestPayload {
            known_peers: vec![PeerDigest {
                peer_id: PeerId::from("p1"),
                address: "9.9.9.9".into(),
                port: 1,
                transports: vec![],
            }],
        };
        let payload = Storage::encode(&request).unwrap();
        engine.handle_request(0, &payload).unwrap();
        assert_eq!(peers.get(&PeerId::from("p1")).unwrap().health.failure_count, 3);
    }

    #[test]
    fn handle_register_advertise_updates_known_peers_registers() {
        let (engine, peers, _pool) = engine();
        peers.add_or_update(peer("p1"));
        let register_id = sorcha_primitives::RegisterId::from("r1");
        let advertise = RegisterAdvertisePayload {
            peer_id: PeerId::from("p1"),
            registers: vec![AdvertisedRegister {
                register_id: register_id.clone(),
                sync_state: sorcha_primitives::PeerSyncState::FullyReplicated,
                latest_docket_version: 4,
                latest_transaction_version: 4,
                is_public: true,
            }],
        };
        let payload = Storage::encode(&advertise).unwrap();
        engine.handle_register_advertise(&payload).unwrap();
        let updated = peers.get(&PeerId::from("p1")).unwrap();
        assert!(updated.advertises(&register_id).is_some());
    }
}
