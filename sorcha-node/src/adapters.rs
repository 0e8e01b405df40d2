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

//! Concrete bridges from `sorcha-validator`'s consumed-interface seams
//! (§6.1) to this node's peer store and connection pool, the pieces
//! `ConsensusEngine` is generic over so the validator crate itself never
//! depends on either.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tracing::{debug, warn};

use sorcha_connection::{ConnectionPool, MessageEnvelope, MessageKind, Transport};
use sorcha_peerstore::PeerListStore;
use sorcha_primitives::{ApprovalSignature, Docket, PeerId, RegisterId};
use sorcha_subsystem_util::Storage;
use sorcha_validator::{ApprovalCollector, ValidatorSetProvider};

const LOG_TARGET: &str = "node_adapters";

/// `ValidatorSetProvider` bridging to `sorcha_peerstore::PeerListStore`:
/// the voting set for a register's next docket is exactly its
/// `FullyReplicated` advertisers (§4.1, §4.7).
pub struct PeerStoreValidatorSet {
    peers: Arc<PeerListStore>,
}

impl PeerStoreValidatorSet {
    pub fn new(peers: Arc<PeerListStore>) -> Self {
        Self { peers }
    }
}

#[async_trait]
impl ValidatorSetProvider for PeerStoreValidatorSet {
    async fn fully_replicated_validators(&self, register_id: &RegisterId) -> Vec<PeerId> {
        self.peers
            .full_replica_peers(register_id)
            .into_iter()
            .map(|p| p.peer_id)
            .collect()
    }
}

#[derive(Serialize, Deserialize)]
struct DocketApprovalRequestPayload {
    docket: Docket,
}

#[derive(Serialize, Deserialize)]
struct DocketApprovalResponsePayload {
    correlation_id: String,
    signature: Option<ApprovalSignature>,
}

/// Request/response correlation table for outstanding approval requests,
/// resolved by whatever task drains `MessageKind::DocketApprovalResponse`
/// frames off the connection pool (`subsystems::bridge_approval_responses`).
#[derive(Default)]
pub(crate) struct PendingApprovals {
    waiters: Mutex<HashMap<String, oneshot::Sender<Option<ApprovalSignature>>>>,
}

impl PendingApprovals {
    fn register(&self, correlation_id: String) -> oneshot::Receiver<Option<ApprovalSignature>> {
        let (tx, rx) = oneshot::channel();
        self.waiters.lock().insert(correlation_id, tx);
        rx
    }

    fn resolve(&self, correlation_id: &str, signature: Option<ApprovalSignature>) {
        if let Some(tx) = self.waiters.lock().remove(correlation_id) {
            let _ = tx.send(signature);
        } else {
            debug!(target: LOG_TARGET, correlation_id, "approval response for unknown or already-resolved request");
        }
    }
}

/// `ApprovalCollector` bridging to the wire protocol over a
/// `ConnectionPool`: sends a `DocketApprovalRequest` frame and waits,
/// bounded by `response_timeout`, for the matching
/// `DocketApprovalResponse` to arrive via `resolve`.
pub struct WireApprovalCollector<T: Transport> {
    pool: Arc<ConnectionPool<T>>,
    pending: Arc<PendingApprovals>,
    response_timeout: Duration,
}

impl<T: Transport> WireApprovalCollector<T> {
    pub fn new(pool: Arc<ConnectionPool<T>>, response_timeout: Duration) -> Self {
        Self {
            pool,
            pending: Arc::new(PendingApprovals::default()),
            response_timeout,
        }
    }

    /// A clonable handle the inbound-frame bridge resolves outstanding
    /// requests through; see `subsystems::bridge_approval_responses`.
    pub(crate) fn resolver(&self) -> Arc<PendingApprovals> {
        self.pending.clone()
    }
}

#[async_trait]
impl<T: Transport> ApprovalCollector for WireApprovalCollector<T> {
    async fn request_approval(&self, validator: &PeerId, docket: &Docket) -> Option<ApprovalSignature> {
        let correlation_id = format!("appr-{}-{}", docket.docket_id, validator);
        let payload = match Storage::encode(&DocketApprovalRequestPayload { docket: docket.clone() }) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(target: LOG_TARGET, error = %e, "failed to encode docket approval request");
                return None;
            }
        };
        let envelope = MessageEnvelope::new(MessageKind::DocketApprovalRequest, correlation_id.clone(), payload);
        let receiver = self.pending.register(correlation_id.clone());

        if let Err(e) = self.pool.send(validator, envelope).await {
            warn!(target: LOG_TARGET, %validator, error = %e, "failed to send docket approval request");
            self.pending.resolve(&correlation_id, None);
            return None;
        }

        match tokio::time::timeout(self.response_timeout, receiver).await {
            Ok(Ok(signature)) => signature,
            Ok(Err(_)) => None,
            Err(_) => {
                debug!(target: LOG_TARGET, %validator, %correlation_id, "docket approval request timed out");
                self.pending.resolve(&correlation_id, None);
                None
            }
        }
    }
}

/// Decodes and resolves one inbound `DocketApprovalResponse` frame.
/// Crate-visible so the subsystem wiring can call it from the
/// stream-handler drain loop without reaching into `PendingApprovals`.
pub(crate) fn handle_approval_response(pending: &PendingApprovals, payload: &[u8]) {
    match Storage::decode::<DocketApprovalResponsePayload>(payload) {
        Ok(response) => pending.resolve(&response.correlation_id, response.signature),
        Err(e) => warn!(target: LOG_TARGET, error = %e, "failed to decode docket approval response"),
    }
}

/// Decodes an inbound `DocketApprovalRequest` frame's docket. The wire
/// struct itself stays private to this module; the responder subsystem
/// only ever needs the docket it names.
pub(crate) fn decode_approval_request(payload: &[u8]) -> Result<Docket, sorcha_subsystem_util::StorageError> {
    Storage::decode::<DocketApprovalRequestPayload>(payload).map(|req| req.docket)
}

/// Encodes an outbound `DocketApprovalResponse` frame, carrying the same
/// `correlation_id` the request arrived with.
pub(crate) fn encode_approval_response(
    correlation_id: String,
    signature: Option<ApprovalSignature>,
) -> Result<Vec<u8>, sorcha_subsystem_util::StorageError> {
    Storage::encode(&DocketApprovalResponsePayload { correlation_id, signature })
}
