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

//! The only external interface §6 names: signed transaction submission
//! over JSON-RPC. `sorcha_primitives::Transaction` already carries the
//! exact field set the wire contract fixes, so the RPC method takes and
//! returns the core types directly rather than duplicating them behind a
//! node-local DTO.
//!
//! A verified submission also fans the transaction out over gossip
//! (§4.6 "Gossip notify (live)") to the node's currently healthy peers —
//! the one piece of wiring the validator pipeline itself can't do, since
//! it has no dependency on the replication engine.

use std::sync::Arc;

use jsonrpsee::core::{async_trait, Error as RpcError, RpcResult};
use jsonrpsee::proc_macros::rpc;
use thiserror::Error;
use tracing::{debug, warn};

use sorcha_connection::Transport;
use sorcha_peerstore::PeerListStore;
use sorcha_primitives::{now_micros, PeerId, RegisterId, Transaction};
use sorcha_register::RegisterStore;
use sorcha_replication::GossipEngine;
use sorcha_validator::{ApprovalCollector, SubmissionOutcome, ValidatorPipeline, ValidatorSetProvider};

const LOG_TARGET: &str = "node_rpc";

#[derive(Debug, Error)]
enum ApiError {
    #[error("unknown register {0}")]
    UnknownRegister(RegisterId),
}

#[rpc(server, namespace = "sorcha")]
pub trait SorchaApi {
    /// Signed transaction submission (§6): returns the RPC-shaped
    /// outcome rather than an RPC error for every normal rejection —
    /// only a malformed call itself becomes a JSON-RPC error.
    #[method(name = "submitTransaction")]
    async fn submit_transaction(&self, tx: Transaction, tenant_id: String) -> RpcResult<SubmissionOutcome>;
}

pub struct RpcServer<T: Transport + 'static, V, A> {
    pipeline: Arc<ValidatorPipeline<V, A>>,
    register_store: Arc<RegisterStore>,
    gossip: Arc<GossipEngine<T>>,
    peers: Arc<PeerListStore>,
    local_peer_id: PeerId,
}

impl<T, V, A> RpcServer<T, V, A>
where
    T: Transport + 'static,
    V: ValidatorSetProvider + Send + Sync + 'static,
    A: ApprovalCollector + Send + Sync + 'static,
{
    pub fn new(
        pipeline: Arc<ValidatorPipeline<V, A>>,
        register_store: Arc<RegisterStore>,
        gossip: Arc<GossipEngine<T>>,
        peers: Arc<PeerListStore>,
        local_peer_id: PeerId,
    ) -> Self {
        Self {
            pipeline,
            register_store,
            gossip,
            peers,
            local_peer_id,
        }
    }
}

#[async_trait]
impl<T, V, A> SorchaApiServer for RpcServer<T, V, A>
where
    T: Transport + 'static,
    V: ValidatorSetProvider + Send + Sync + 'static,
    A: ApprovalCollector + Send + Sync + 'static,
{
    async fn submit_transaction(&self, tx: Transaction, tenant_id: String) -> RpcResult<SubmissionOutcome> {
        if self.register_store.get_register(&tx.register_id).ok().flatten().is_none() {
            return Err(RpcError::to_call_error(ApiError::UnknownRegister(tx.register_id)));
        }

        let tx_id = tx.tx_id.clone();
        let payload_hash = tx.payload_hash.clone();
        let outcome = self.pipeline.submit(tx, &tenant_id).await;

        if outcome.accepted && outcome.stage_reached == "verified" {
            let candidates: Vec<PeerId> = self.peers.get_healthy().into_iter().map(|p| p.peer_id).collect();
            self.gossip
                .notify(&tx_id, self.local_peer_id.clone(), payload_hash.as_bytes(), &candidates, now_micros())
                .await;
        } else if !outcome.accepted {
            debug!(target: LOG_TARGET, %tx_id, stage = outcome.stage_reached, "submission rejected");
        }

        Ok(outcome)
    }
}

/// Starts the JSON-RPC server on `addr`. The returned handle keeps the
/// server alive; dropping or stopping it tears the listener down.
pub async fn start<T, V, A>(
    addr: &str,
    rpc_server: RpcServer<T, V, A>,
) -> Result<jsonrpsee::server::ServerHandle, jsonrpsee::core::Error>
where
    T: Transport + 'static,
    V: ValidatorSetProvider + Send + Sync + 'static,
    A: ApprovalCollector + Send + Sync + 'static,
{
    let listener = jsonrpsee::server::ServerBuilder::default().build(addr).await?;
    listener.start(rpc_server.into_rpc()).map_err(|e| {
        warn!(target: LOG_TARGET, error = %e, "failed to start rpc server");
        e
    })
}
