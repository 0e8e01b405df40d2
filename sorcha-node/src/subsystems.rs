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

//! Adapts every collaborator built in `main.rs` into a
//! `Subsystem<NodeMessage>` the overseer can drive, one per background
//! concern (§2.1). Each subsystem owns exactly the state it needs and
//! talks to the wire either through `ConnectionPool::register_stream_handler`
//! (inbound, keyed by `MessageKind`) or `ConnectionPool::send`/`broadcast`
//! (outbound) — never directly through a `Transport`.

use std::collections::HashSet;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use sorcha_connection::{ConnectionPool, MessageEnvelope, MessageKind, TcpTransport, Transport};
use sorcha_discovery::DiscoveryEngine;
use sorcha_peerstore::PeerListStore;
use sorcha_primitives::{now_micros, ApprovalSignature, PeerId, Transaction, TxId};
use sorcha_register::RegisterStore;
use sorcha_replication::{CheckpointStore, GossipEngine, GossipOutcome, NotificationPayload, OutboundQueue};
use sorcha_subscription::{DocketDataPayload, DocketRequestPayload, PulledDocket, SubscriptionManager};
use sorcha_subsystem::{FromOverseer, OverseerSignal, Subsystem, SubsystemContext, SubsystemResult, SpawnedSubsystem};
use sorcha_subsystem_util::Storage;
use sorcha_validator::{ApprovalCollector, ValidatorPipeline, ValidatorSetProvider, WalletSigner};

use crate::adapters;
use crate::messages::NodeMessage;

const LOG_TARGET: &str = "node_subsystems";

/// Inbound frames of a given kind, handed to a subsystem as a bounded
/// channel registered with the pool at construction time.
const STREAM_HANDLER_CAPACITY: usize = 256;

fn encode<T: Serialize>(value: &T) -> Option<Vec<u8>> {
    match Storage::encode(value) {
        Ok(bytes) => Some(bytes),
        Err(e) => {
            warn!(target: LOG_TARGET, error = %e, "failed to encode outbound payload");
            None
        }
    }
}

fn decode<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> Option<T> {
    match Storage::decode(bytes) {
        Ok(value) => Some(value),
        Err(e) => {
            debug!(target: LOG_TARGET, error = %e, "failed to decode inbound payload");
            None
        }
    }
}

/// Drives `ConnectionPool::on_tick` off the overseer's clock (§4.3), and
/// raises `NodeMessage::PeerConnected`/`PeerDisconnected` on each tick's
/// membership diff against the previous one so Discovery's eager
/// peer-exchange (§4.4) has something to react to without the pool
/// itself depending on the bus.
pub struct ConnectionDriverSubsystem<T: Transport + 'static> {
    pool: Arc<ConnectionPool<T>>,
}

impl<T: Transport + 'static> ConnectionDriverSubsystem<T> {
    pub fn new(pool: Arc<ConnectionPool<T>>) -> Self {
        Self { pool }
    }
}

impl<T: Transport + 'static> Subsystem<NodeMessage> for ConnectionDriverSubsystem<T> {
    fn start(self, mut ctx: SubsystemContext<NodeMessage>) -> SpawnedSubsystem {
        let pool = self.pool;
        let fut = async move {
            let mut known: HashSet<PeerId> = HashSet::new();
            loop {
                match ctx.recv().await? {
                    FromOverseer::Signal(OverseerSignal::Tick(now)) => {
                        pool.on_tick(now).await;
                        let current: HashSet<PeerId> = pool.connected_peer_ids().into_iter().collect();
                        for peer_id in current.difference(&known) {
                            ctx.send_message(NodeMessage::PeerConnected(peer_id.clone())).await?;
                        }
                        for peer_id in known.difference(&current) {
                            ctx.send_message(NodeMessage::PeerDisconnected(peer_id.clone())).await?;
                        }
                        known = current;
                    }
                    FromOverseer::Signal(OverseerSignal::Conclude) => return Ok(()),
                    FromOverseer::Communication(_) => {}
                }
            }
        };
        SpawnedSubsystem { name: "connection-driver", future: Box::pin(fut) }
    }
}

/// Drains a `TcpTransport`'s inbound channel into
/// `ConnectionPool::dispatch_incoming` (module docs, `tcp.rs`: a real
/// socket has no way to hand frames back to the pool except through a
/// channel the caller drains).
pub struct InboundBridgeSubsystem<T: Transport + 'static> {
    pool: Arc<ConnectionPool<T>>,
    inbound: mpsc::Receiver<(PeerId, MessageEnvelope)>,
}

impl<T: Transport + 'static> InboundBridgeSubsystem<T> {
    pub fn new(pool: Arc<ConnectionPool<T>>, inbound: mpsc::Receiver<(PeerId, MessageEnvelope)>) -> Self {
        Self { pool, inbound }
    }
}

impl<T: Transport + 'static> Subsystem<NodeMessage> for InboundBridgeSubsystem<T> {
    fn start(self, mut ctx: SubsystemContext<NodeMessage>) -> SpawnedSubsystem {
        let pool = self.pool;
        let mut inbound = self.inbound;
        let fut = async move {
            loop {
                tokio::select! {
                    signal = ctx.recv() => {
                        match signal? {
                            FromOverseer::Signal(OverseerSignal::Conclude) => return Ok(()),
                            _ => {}
                        }
                    }
                    frame = inbound.recv() => {
                        match frame {
                            Some((peer_id, envelope)) => pool.dispatch_incoming(peer_id, envelope).await,
                            None => return Ok(()),
                        }
                    }
                }
            }
        };
        SpawnedSubsystem { name: "inbound-bridge", future: Box::pin(fut) }
    }
}

/// Owns the listening socket and keeps `TcpTransport::accept_loop`
/// running as an auxiliary task for the node's lifetime.
pub struct AcceptLoopSubsystem {
    transport: Arc<TcpTransport>,
    listener: TcpListener,
}

impl AcceptLoopSubsystem {
    pub fn new(transport: Arc<TcpTransport>, listener: TcpListener) -> Self {
        Self { transport, listener }
    }
}

impl Subsystem<NodeMessage> for AcceptLoopSubsystem {
    fn start(self, mut ctx: SubsystemContext<NodeMessage>) -> SpawnedSubsystem {
        let transport = self.transport;
        let listener = self.listener;
        let fut = async move {
            ctx.spawn(transport.accept_loop(listener).map(|_| Ok(())).boxed()).await?;
            loop {
                match ctx.recv().await? {
                    FromOverseer::Signal(OverseerSignal::Conclude) => return Ok(()),
                    _ => {}
                }
            }
        };
        SpawnedSubsystem { name: "accept-loop", future: Box::pin(fut) }
    }
}

/// Peer exchange and register advertisement (§4.4): bootstraps seeds on
/// start, answers inbound exchange/advertise frames, and runs the
/// periodic refresh off `Tick`.
pub struct DiscoverySubsystem<T: Transport + 'static> {
    engine: Arc<DiscoveryEngine<T>>,
    pool: Arc<ConnectionPool<T>>,
    register_store: Arc<RegisterStore>,
    seeds: Vec<sorcha_primitives::Peer>,
}

impl<T: Transport + 'static> DiscoverySubsystem<T> {
    pub fn new(
        engine: Arc<DiscoveryEngine<T>>,
        pool: Arc<ConnectionPool<T>>,
        register_store: Arc<RegisterStore>,
        seeds: Vec<sorcha_primitives::Peer>,
    ) -> Self {
        Self { engine, pool, register_store, seeds }
    }

    fn local_advertisements(register_store: &RegisterStore) -> Vec<sorcha_primitives::AdvertisedRegister> {
        register_store
            .list_registers()
            .unwrap_or_default()
            .into_iter()
            .filter(|r| r.is_public)
            .map(|r| sorcha_primitives::AdvertisedRegister {
                register_id: r.register_id,
                sync_state: sorcha_primitives::PeerSyncState::FullyReplicated,
                latest_docket_version: r.height.saturating_sub(1),
                latest_transaction_version: r.height.saturating_sub(1),
                is_public: r.is_public,
            })
            .collect()
    }
}

impl<T: Transport + 'static> Subsystem<NodeMessage> for DiscoverySubsystem<T> {
    fn start(self, mut ctx: SubsystemContext<NodeMessage>) -> SpawnedSubsystem {
        let (req_tx, mut req_rx) = mpsc::channel(STREAM_HANDLER_CAPACITY);
        let (resp_tx, mut resp_rx) = mpsc::channel(STREAM_HANDLER_CAPACITY);
        let (adv_tx, mut adv_rx) = mpsc::channel(STREAM_HANDLER_CAPACITY);
        self.pool.register_stream_handler(MessageKind::PeerExchangeRequest, req_tx);
        self.pool.register_stream_handler(MessageKind::PeerExchangeResponse, resp_tx);
        self.pool.register_stream_handler(MessageKind::RegisterAdvertise, adv_tx);

        let engine = self.engine;
        let pool = self.pool;
        let register_store = self.register_store;
        let seeds = self.seeds;

        let fut = async move {
            engine.bootstrap(&seeds, now_micros()).await;
            loop {
                tokio::select! {
                    signal = ctx.recv() => {
                        match signal? {
                            FromOverseer::Signal(OverseerSignal::Tick(now)) => {
                                engine.on_tick(now).await;
                                let registers = Self::local_advertisements(&register_store);
                                if !registers.is_empty() {
                                    if let Err(e) = engine.broadcast_registers(registers, now).await {
                                        warn!(target: LOG_TARGET, error = %e, "failed to broadcast local registers");
                                    }
                                }
                            }
                            FromOverseer::Signal(OverseerSignal::Conclude) => return Ok(()),
                            FromOverseer::Communication(NodeMessage::PeerConnected(peer_id)) => {
                                engine.on_new_connection(&peer_id, now_micros()).await;
                            }
                            FromOverseer::Communication(_) => {}
                        }
                    }
                    frame = req_rx.recv() => {
                        let Some((peer_id, envelope)) = frame else { continue };
                        match engine.handle_request(now_micros(), &envelope.payload) {
                            Ok(response) => {
                                if let Some(bytes) = encode(&response) {
                                    let reply = MessageEnvelope::new(MessageKind::PeerExchangeResponse, envelope.correlation_id.clone(), bytes);
                                    if let Err(e) = pool.send(&peer_id, reply).await {
                                        debug!(target: LOG_TARGET, %peer_id, error = %e, "failed to send peer exchange response");
                                    }
                                }
                            }
                            Err(e) => debug!(target: LOG_TARGET, %peer_id, error = %e, "failed to handle peer exchange request"),
                        }
                    }
                    frame = resp_rx.recv() => {
                        let Some((peer_id, envelope)) = frame else { continue };
                        if let Err(e) = engine.handle_response(now_micros(), &envelope.payload) {
                            debug!(target: LOG_TARGET, %peer_id, error = %e, "failed to handle peer exchange response");
                        }
                    }
                    frame = adv_rx.recv() => {
                        let Some((peer_id, envelope)) = frame else { continue };
                        if let Err(e) = engine.handle_register_advertise(&envelope.payload) {
                            debug!(target: LOG_TARGET, %peer_id, error = %e, "failed to handle register advertisement");
                        }
                    }
                }
            }
        };
        SpawnedSubsystem { name: "discovery", future: Box::pin(fut) }
    }
}

/// Wire payload for a by-hash transaction body pull, issued when a
/// gossip notification only carried a hash teaser (§4.6 "streaming
/// threshold"). Not part of any other crate's payload catalog since the
/// pull-by-hash leg sits entirely in this node's wiring.
#[derive(Serialize, Deserialize)]
struct TransactionRequestPayload {
    tx_id: TxId,
}

#[derive(Serialize, Deserialize)]
struct TransactionDataPayload {
    transaction: Transaction,
}

/// Live gossip relay and transaction admission (§4.6): fans inbound
/// notifications out to the dedup/hop-budget engine, pulls bodies by
/// hash when needed, submits arriving bodies to the validator pipeline,
/// and drains the offline durability queue each tick.
pub struct GossipRelaySubsystem<T: Transport + 'static, V, A> {
    gossip: Arc<GossipEngine<T>>,
    pool: Arc<ConnectionPool<T>>,
    outbound_queue: Arc<OutboundQueue>,
    pipeline: Arc<ValidatorPipeline<V, A>>,
    register_store: Arc<RegisterStore>,
    peers: Arc<PeerListStore>,
}

impl<T, V, A> GossipRelaySubsystem<T, V, A>
where
    T: Transport + 'static,
    V: ValidatorSetProvider + Send + Sync + 'static,
    A: ApprovalCollector + Send + Sync + 'static,
{
    pub fn new(
        gossip: Arc<GossipEngine<T>>,
        pool: Arc<ConnectionPool<T>>,
        outbound_queue: Arc<OutboundQueue>,
        pipeline: Arc<ValidatorPipeline<V, A>>,
        register_store: Arc<RegisterStore>,
        peers: Arc<PeerListStore>,
    ) -> Self {
        Self { gossip, pool, outbound_queue, pipeline, register_store, peers }
    }

    async fn submit(pipeline: &ValidatorPipeline<V, A>, register_store: &RegisterStore, tx: Transaction) {
        let tenant_id = match register_store.get_register(&tx.register_id) {
            Ok(Some(register)) => register.tenant_id,
            _ => {
                debug!(target: LOG_TARGET, register_id = %tx.register_id, "gossiped transaction names an unknown register");
                return;
            }
        };
        let outcome = pipeline.submit(tx, tenant_id.as_str()).await;
        if !outcome.accepted {
            debug!(target: LOG_TARGET, stage = outcome.stage_reached, "gossiped transaction rejected");
        }
    }
}

impl<T, V, A> Subsystem<NodeMessage> for GossipRelaySubsystem<T, V, A>
where
    T: Transport + 'static,
    V: ValidatorSetProvider + Send + Sync + 'static,
    A: ApprovalCollector + Send + Sync + 'static,
{
    fn start(self, mut ctx: SubsystemContext<NodeMessage>) -> SpawnedSubsystem {
        let (notify_tx, mut notify_rx) = mpsc::channel(STREAM_HANDLER_CAPACITY);
        let (req_tx, mut req_rx) = mpsc::channel(STREAM_HANDLER_CAPACITY);
        let (data_tx, mut data_rx) = mpsc::channel(STREAM_HANDLER_CAPACITY);
        self.pool.register_stream_handler(MessageKind::TransactionNotify, notify_tx);
        self.pool.register_stream_handler(MessageKind::TransactionRequest, req_tx);
        self.pool.register_stream_handler(MessageKind::TransactionData, data_tx);

        let gossip = self.gossip;
        let pool = self.pool;
        let outbound_queue = self.outbound_queue;
        let pipeline = self.pipeline;
        let register_store = self.register_store;
        let peers = self.peers;

        let fut = async move {
            loop {
                tokio::select! {
                    signal = ctx.recv() => {
                        match signal? {
                            FromOverseer::Signal(OverseerSignal::Tick(_now)) => {
                                match outbound_queue.drain() {
                                    Ok(entries) => {
                                        for (key, queued) in entries {
                                            if pool.send(&queued.peer_id, queued.envelope).await.is_ok() {
                                                if let Err(e) = outbound_queue.remove(&key) {
                                                    warn!(target: LOG_TARGET, error = %e, "failed to remove delivered queue entry");
                                                }
                                            }
                                        }
                                    }
                                    Err(e) => warn!(target: LOG_TARGET, error = %e, "failed to drain outbound queue"),
                                }
                            }
                            FromOverseer::Signal(OverseerSignal::Conclude) => return Ok(()),
                            FromOverseer::Communication(_) => {}
                        }
                    }
                    frame = notify_rx.recv() => {
                        let Some((from_peer, envelope)) = frame else { continue };
                        let Some(notification) = decode::<NotificationPayload>(&envelope.payload) else { continue };
                        let now = now_micros();
                        match gossip.receive(&notification, now) {
                            GossipOutcome::Duplicate | GossipOutcome::Dropped => {}
                            GossipOutcome::Fresh { needs_payload } => {
                                if let Some(bytes) = notification.payload.clone() {
                                    if let Some(tx) = decode::<Transaction>(&bytes) {
                                        Self::submit(&pipeline, &register_store, tx).await;
                                    }
                                } else if needs_payload {
                                    if let Some(bytes) = encode(&TransactionRequestPayload {
                                        tx_id: notification.tx_id.clone(),
                                    }) {
                                        let request = MessageEnvelope::new(MessageKind::TransactionRequest, format!("txreq-{}", notification.tx_id), bytes);
                                        if let Err(e) = pool.send(&from_peer, request).await {
                                            debug!(target: LOG_TARGET, %from_peer, error = %e, "failed to request transaction body");
                                        }
                                    }
                                }
                                let candidates: Vec<PeerId> = peers.get_healthy().into_iter().map(|p| p.peer_id).collect();
                                gossip.relay(notification, &from_peer, &candidates, now).await;
                            }
                        }
                    }
                    frame = req_rx.recv() => {
                        let Some((from_peer, envelope)) = frame else { continue };
                        let Some(request) = decode::<TransactionRequestPayload>(&envelope.payload) else { continue };
                        let found = register_store
                            .list_registers()
                            .unwrap_or_default()
                            .into_iter()
                            .find_map(|r| register_store.get_transaction(&r.register_id, &request.tx_id).ok().flatten());
                        if let Some(transaction) = found {
                            if let Some(bytes) = encode(&TransactionDataPayload { transaction }) {
                                let reply = MessageEnvelope::new(MessageKind::TransactionData, envelope.correlation_id.clone(), bytes);
                                if let Err(e) = pool.send(&from_peer, reply).await {
                                    debug!(target: LOG_TARGET, %from_peer, error = %e, "failed to send transaction data");
                                }
                            }
                        }
                    }
                    frame = data_rx.recv() => {
                        let Some((_from_peer, envelope)) = frame else { continue };
                        if let Some(data) = decode::<TransactionDataPayload>(&envelope.payload) {
                            Self::submit(&pipeline, &register_store, data.transaction).await;
                        }
                    }
                }
            }
        };
        SpawnedSubsystem { name: "gossip-relay", future: Box::pin(fut) }
    }
}

/// Runs the docket builder tick for every known register each `Tick`
/// (§4.7 stage 9 "Docket assembly & quorum approval").
pub struct DocketTickerSubsystem<V, A> {
    pipeline: Arc<ValidatorPipeline<V, A>>,
    register_store: Arc<RegisterStore>,
}

impl<V, A> DocketTickerSubsystem<V, A>
where
    V: ValidatorSetProvider + Send + Sync + 'static,
    A: ApprovalCollector + Send + Sync + 'static,
{
    pub fn new(pipeline: Arc<ValidatorPipeline<V, A>>, register_store: Arc<RegisterStore>) -> Self {
        Self { pipeline, register_store }
    }
}

impl<V, A> Subsystem<NodeMessage> for DocketTickerSubsystem<V, A>
where
    V: ValidatorSetProvider + Send + Sync + 'static,
    A: ApprovalCollector + Send + Sync + 'static,
{
    fn start(self, mut ctx: SubsystemContext<NodeMessage>) -> SpawnedSubsystem {
        let pipeline = self.pipeline;
        let register_store = self.register_store;
        let fut = async move {
            loop {
                match ctx.recv().await? {
                    FromOverseer::Signal(OverseerSignal::Tick(_now)) => {
                        let registers = register_store.list_registers().unwrap_or_default();
                        for register in registers {
                            if let Err(e) = pipeline.run_docket_tick(&register.register_id).await {
                                warn!(target: LOG_TARGET, register_id = %register.register_id, error = %e, "docket tick failed");
                            }
                        }
                    }
                    FromOverseer::Signal(OverseerSignal::Conclude) => return Ok(()),
                    FromOverseer::Communication(_) => {}
                }
            }
        };
        SpawnedSubsystem { name: "docket-ticker", future: Box::pin(fut) }
    }
}

/// Responds to inbound docket approval requests and resolves outstanding
/// outbound ones (§4.7 stage 9). `Docket::canonical_header_bytes` is
/// private to `sorcha-primitives`, so this signs over `docket_id`
/// instead — a documented simplification, see DESIGN.md.
pub struct ApprovalResponderSubsystem<T: Transport + 'static> {
    pool: Arc<ConnectionPool<T>>,
    pending: Arc<adapters::PendingApprovals>,
    signer: Arc<dyn WalletSigner>,
    local_peer_id: PeerId,
}

impl<T: Transport + 'static> ApprovalResponderSubsystem<T> {
    pub fn new(
        pool: Arc<ConnectionPool<T>>,
        pending: Arc<adapters::PendingApprovals>,
        signer: Arc<dyn WalletSigner>,
        local_peer_id: PeerId,
    ) -> Self {
        Self { pool, pending, signer, local_peer_id }
    }
}

impl<T: Transport + 'static> Subsystem<NodeMessage> for ApprovalResponderSubsystem<T> {
    fn start(self, mut ctx: SubsystemContext<NodeMessage>) -> SpawnedSubsystem {
        let (req_tx, mut req_rx) = mpsc::channel(STREAM_HANDLER_CAPACITY);
        let (resp_tx, mut resp_rx) = mpsc::channel(STREAM_HANDLER_CAPACITY);
        self.pool.register_stream_handler(MessageKind::DocketApprovalRequest, req_tx);
        self.pool.register_stream_handler(MessageKind::DocketApprovalResponse, resp_tx);

        let pool = self.pool;
        let pending = self.pending;
        let signer = self.signer;
        let local_peer_id = self.local_peer_id;

        let fut = async move {
            loop {
                tokio::select! {
                    signal = ctx.recv() => {
                        if let FromOverseer::Signal(OverseerSignal::Conclude) = signal? {
                            return Ok(());
                        }
                    }
                    frame = req_rx.recv() => {
                        let Some((from_peer, envelope)) = frame else { continue };
                        let Some(docket) = adapters::decode_approval_request(&envelope.payload).ok() else { continue };
                        let signature = match signer.sign(local_peer_id.as_str(), docket.docket_id.as_str().as_bytes(), false).await {
                            Ok(sig) => Some(ApprovalSignature {
                                validator_id: local_peer_id.as_str().to_string(),
                                signature: sig.bytes,
                            }),
                            Err(e) => {
                                warn!(target: LOG_TARGET, error = %e, "failed to sign docket approval");
                                None
                            }
                        };
                        match adapters::encode_approval_response(envelope.correlation_id.clone(), signature) {
                            Ok(bytes) => {
                                let reply = MessageEnvelope::new(MessageKind::DocketApprovalResponse, envelope.correlation_id.clone(), bytes);
                                if let Err(e) = pool.send(&from_peer, reply).await {
                                    debug!(target: LOG_TARGET, %from_peer, error = %e, "failed to send docket approval response");
                                }
                            }
                            Err(e) => warn!(target: LOG_TARGET, error = %e, "failed to encode docket approval response"),
                        }
                    }
                    frame = resp_rx.recv() => {
                        let Some((_from_peer, envelope)) = frame else { continue };
                        adapters::handle_approval_response(&pending, &envelope.payload);
                    }
                }
            }
        };
        SpawnedSubsystem { name: "approval-responder", future: Box::pin(fut) }
    }
}

/// Checkpoint-driven catch-up sync (§4.6 "Checkpoint sync"): serves
/// inbound docket pull requests from the local register store and pulls
/// from a source peer when a local subscription's checkpoint is due.
pub struct SubscriptionSyncSubsystem<T: Transport + 'static> {
    subscriptions: Arc<SubscriptionManager>,
    register_store: Arc<RegisterStore>,
    pool: Arc<ConnectionPool<T>>,
    checkpoints: Arc<CheckpointStore>,
    sync_interval_micros: i64,
}

impl<T: Transport + 'static> SubscriptionSyncSubsystem<T> {
    pub fn new(
        subscriptions: Arc<SubscriptionManager>,
        register_store: Arc<RegisterStore>,
        pool: Arc<ConnectionPool<T>>,
        checkpoints: Arc<CheckpointStore>,
        sync_interval_micros: i64,
    ) -> Self {
        Self { subscriptions, register_store, pool, checkpoints, sync_interval_micros }
    }
}

impl<T: Transport + 'static> Subsystem<NodeMessage> for SubscriptionSyncSubsystem<T> {
    fn start(self, mut ctx: SubsystemContext<NodeMessage>) -> SpawnedSubsystem {
        let (req_tx, mut req_rx) = mpsc::channel(STREAM_HANDLER_CAPACITY);
        let (data_tx, mut data_rx) = mpsc::channel(STREAM_HANDLER_CAPACITY);
        self.pool.register_stream_handler(MessageKind::DocketRequest, req_tx);
        self.pool.register_stream_handler(MessageKind::DocketData, data_tx);

        let subscriptions = self.subscriptions;
        let register_store = self.register_store;
        let pool = self.pool;
        let checkpoints = self.checkpoints;
        let sync_interval_micros = self.sync_interval_micros;

        let fut = async move {
            loop {
                tokio::select! {
                    signal = ctx.recv() => {
                        match signal? {
                            FromOverseer::Signal(OverseerSignal::Tick(now)) => {
                                for checkpoint in checkpoints.due(now) {
                                    let Some(request) = subscriptions.request_payload(&checkpoint.register_id) else { continue };
                                    if subscriptions.begin_docket_pull(&checkpoint.register_id).is_err() {
                                        continue;
                                    }
                                    if let Some(bytes) = encode(&request) {
                                        let envelope = MessageEnvelope::new(
                                            MessageKind::DocketRequest,
                                            format!("docket-pull-{}-{now}", checkpoint.register_id),
                                            bytes,
                                        );
                                        if let Err(e) = pool.send(&checkpoint.source_peer_id, envelope).await {
                                            debug!(target: LOG_TARGET, register_id = %checkpoint.register_id, error = %e, "failed to send docket pull request");
                                            subscriptions.finish_docket_pull(&checkpoint.register_id);
                                        }
                                    } else {
                                        subscriptions.finish_docket_pull(&checkpoint.register_id);
                                    }
                                }
                            }
                            FromOverseer::Signal(OverseerSignal::Conclude) => return Ok(()),
                            FromOverseer::Communication(_) => {}
                        }
                    }
                    frame = req_rx.recv() => {
                        let Some((from_peer, envelope)) = frame else { continue };
                        let Some(request) = decode::<DocketRequestPayload>(&envelope.payload) else { continue };
                        let register = match register_store.get_register(&request.register_id) {
                            Ok(Some(r)) => r,
                            _ => continue,
                        };
                        let mut dockets = Vec::new();
                        let mut version = request.from_version + 1;
                        while dockets.len() < request.batch_size as usize && version < register.height {
                            if let Ok(Some(docket)) = register_store.get_docket_by_version(&request.register_id, version) {
                                let mut transactions = Vec::new();
                                for tx_id in &docket.tx_ids {
                                    if let Ok(Some(tx)) = register_store.get_transaction(&request.register_id, tx_id) {
                                        transactions.push(tx);
                                    }
                                }
                                dockets.push(PulledDocket { docket, transactions });
                            }
                            version += 1;
                        }
                        let payload = DocketDataPayload {
                            register_id: request.register_id.clone(),
                            dockets,
                            total_dockets_in_chain: register.height,
                        };
                        if let Some(bytes) = encode(&payload) {
                            let reply = MessageEnvelope::new(MessageKind::DocketData, envelope.correlation_id.clone(), bytes);
                            if let Err(e) = pool.send(&from_peer, reply).await {
                                debug!(target: LOG_TARGET, %from_peer, error = %e, "failed to send docket data");
                            }
                        }
                    }
                    frame = data_rx.recv() => {
                        let Some((_from_peer, envelope)) = frame else { continue };
                        let Some(data) = decode::<DocketDataPayload>(&envelope.payload) else { continue };
                        let total = data.total_dockets_in_chain;
                        let latest_version = data.dockets.last().map(|d| d.docket.docket_version);
                        match subscriptions.apply_pulled_dockets(&data.register_id, &register_store, data.dockets, total) {
                            Ok(()) => {
                                if let Some(version) = latest_version {
                                    if let Some(mut checkpoint) = checkpoints.get(&data.register_id) {
                                        checkpoint.advance(version, total, now_micros(), sync_interval_micros);
                                        checkpoints.upsert(checkpoint);
                                    }
                                }
                                info!(target: LOG_TARGET, register_id = %data.register_id, "applied pulled dockets");
                            }
                            Err(e) => warn!(target: LOG_TARGET, register_id = %data.register_id, error = %e, "failed to apply pulled dockets"),
                        }
                        subscriptions.finish_docket_pull(&data.register_id);
                    }
                }
            }
        };
        SpawnedSubsystem { name: "subscription-sync", future: Box::pin(fut) }
    }
}
