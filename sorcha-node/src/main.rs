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

//! Composition root (§2.1): parses configuration, opens each durable
//! component's own column-family database under `data_dir`, wires every
//! collaborator together, and drives them from one
//! `sorcha_subsystem::Overseer<NodeMessage>` until `Tick` stops firing.
//!
//! Identity, wallet custody, and blueprint authoring (§6.1) have no
//! adapter of their own in this repository — a production deployment
//! supplies real ones here. This binary wires the in-memory development
//! defaults instead, logged loudly so nobody mistakes a `cargo run` for
//! a production node.

mod adapters;
mod config;
mod messages;
mod rpc;
mod subsystems;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, Stream};
use structopt::StructOpt;
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};

use sorcha_connection::{ConnectionPool, TcpTransport};
use sorcha_discovery::DiscoveryEngine;
use sorcha_eventsink::{EventSink, InProcessEventSink, LoggingEventSink};
use sorcha_netprobe::NetworkProbe;
use sorcha_peerstore::PeerListStore;
use sorcha_primitives::{now_micros, Peer, PeerId};
use sorcha_register::RegisterStore;
use sorcha_replication::{CheckpointStore, GossipEngine, OutboundQueue};
use sorcha_subscription::SubscriptionManager;
use sorcha_subsystem::Overseer;
use sorcha_subsystem_util::{Storage, StorageResult};
use sorcha_validator::{FakeIdentityClient, FakeWalletSigner, InMemoryBlueprintCache, ValidatorPipeline};

use adapters::{PeerStoreValidatorSet, WireApprovalCollector};
use config::{Cli, NodeConfig};
use messages::NodeMessage;
use subsystems::{
    AcceptLoopSubsystem, ApprovalResponderSubsystem, ConnectionDriverSubsystem, DiscoverySubsystem,
    DocketTickerSubsystem, GossipRelaySubsystem, InboundBridgeSubsystem, SubscriptionSyncSubsystem,
};

const LOG_TARGET: &str = "node_main";

/// Cadence the overseer's clock fires at; components decide for
/// themselves whether their own, coarser interval is due (§4.3 "single
/// wall-clock entry point").
const TICK_INTERVAL: Duration = Duration::from_secs(1);

fn open_storage(config: &NodeConfig, name: &str, num_columns: u32) -> StorageResult<Storage> {
    if config.ephemeral {
        return Ok(Storage::open_memory(num_columns));
    }
    let path: PathBuf = config.data_dir.join(name);
    Storage::open_rocksdb(&path, num_columns)
}

/// Parses a `peer_id@host:port` seed string (§6 configuration table
/// "seed peers"). Malformed entries are logged and dropped rather than
/// aborting startup.
fn parse_seed(raw: &str, now: i64) -> Option<Peer> {
    let (peer_id, host_port) = raw.split_once('@')?;
    let (host, port) = host_port.rsplit_once(':')?;
    let port: u16 = port.parse().ok()?;
    Some(Peer::new(PeerId::from(peer_id), host.to_string(), port, true, now))
}

fn tick_stream(interval: Duration, mut shutdown: oneshot::Receiver<()>) -> impl Stream<Item = i64> + Unpin {
    Box::pin(stream::unfold(shutdown, move |mut shutdown| async move {
        tokio::select! {
            _ = tokio::time::sleep(interval) => Some((now_micros(), shutdown)),
            _ = &mut shutdown => None,
        }
    }))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let cli = Cli::from_args();
    let node_config = NodeConfig::load(cli)?;

    if !node_config.ephemeral {
        std::fs::create_dir_all(&node_config.data_dir)?;
    }

    info!(target: LOG_TARGET, peer_id = %node_config.local_peer_id, ephemeral = node_config.ephemeral, "starting sorcha-node");

    let netprobe = NetworkProbe::new(node_config.file.net_probe.clone());
    let external_address = netprobe.discover().await;
    info!(target: LOG_TARGET, %external_address, "discovered external address");

    let inner_sink: Arc<dyn EventSink> = Arc::new(LoggingEventSink);
    let (event_sink, _event_sink_drain) = InProcessEventSink::spawn(inner_sink, 4096, Default::default());
    let event_sink: Arc<dyn EventSink> = Arc::new(event_sink);

    let register_store = Arc::new(RegisterStore::new(
        node_config.file.register_store,
        open_storage(&node_config, "register", sorcha_register::keys::NUM_COLUMNS)?,
        event_sink.clone(),
    ));

    let peers = if node_config.ephemeral {
        Arc::new(PeerListStore::new(node_config.file.peer_store))
    } else {
        Arc::new(PeerListStore::load(
            node_config.file.peer_store,
            open_storage(&node_config, "peers", sorcha_peerstore::persist::NUM_COLUMNS)?,
        )?)
    };

    let outbound_queue = Arc::new(OutboundQueue::new(
        node_config.file.replication.max_queue_size,
        open_storage(&node_config, "outbound_queue", sorcha_replication::NUM_COLUMNS)?,
    )?);

    let (inbound_tx, inbound_rx) = mpsc::channel(1024);
    let transport = Arc::new(TcpTransport::new(node_config.local_peer_id.clone(), inbound_tx));
    let listener = TcpTransport::listen(&node_config.listen_addr).await?;
    let pool = Arc::new(ConnectionPool::new(node_config.file.connection_pool, transport.clone()));

    let discovery_engine = Arc::new(DiscoveryEngine::new(
        node_config.file.discovery,
        node_config.local_peer_id.clone(),
        peers.clone(),
        pool.clone(),
    ));
    let seeds: Vec<Peer> = node_config
        .seeds
        .iter()
        .filter_map(|raw| {
            let parsed = parse_seed(raw, now_micros());
            if parsed.is_none() {
                warn!(target: LOG_TARGET, seed = raw, "failed to parse seed address, skipping");
            }
            parsed
        })
        .collect();

    let gossip = Arc::new(GossipEngine::new(node_config.file.gossip, pool.clone()));
    let checkpoints = Arc::new(CheckpointStore::new());
    let subscriptions = Arc::new(SubscriptionManager::new(node_config.file.subscription));

    // Development-default consumed-interface adapters (§6.1). A real
    // deployment replaces all three with adapters reaching an actual
    // identity service, wallet custody service, and blueprint registry.
    warn!(target: LOG_TARGET, "using in-memory development defaults for identity/wallet/blueprint adapters");
    let identity = Arc::new(FakeIdentityClient::new());
    let wallet_signer: Arc<dyn sorcha_validator::WalletSigner> = Arc::new(FakeWalletSigner);
    let blueprints = Arc::new(InMemoryBlueprintCache::new());

    let validator_set = PeerStoreValidatorSet::new(peers.clone());
    let approval_collector = WireApprovalCollector::new(pool.clone(), Duration::from_secs(10));
    let approval_resolver = approval_collector.resolver();

    let pipeline = Arc::new(ValidatorPipeline::new(
        node_config.file.validator,
        register_store.clone(),
        blueprints,
        identity,
        event_sink,
        validator_set,
        approval_collector,
    ));

    let (mut overseer, _handle) = Overseer::<NodeMessage>::new();
    overseer.register("connection-driver", ConnectionDriverSubsystem::new(pool.clone()));
    overseer.register("inbound-bridge", InboundBridgeSubsystem::new(pool.clone(), inbound_rx));
    overseer.register("accept-loop", AcceptLoopSubsystem::new(transport.clone(), listener));
    overseer.register(
        "discovery",
        DiscoverySubsystem::new(discovery_engine, pool.clone(), register_store.clone(), seeds),
    );
    overseer.register(
        "gossip-relay",
        GossipRelaySubsystem::new(gossip.clone(), pool.clone(), outbound_queue, pipeline.clone(), register_store.clone(), peers.clone()),
    );
    overseer.register("docket-ticker", DocketTickerSubsystem::new(pipeline.clone(), register_store.clone()));
    overseer.register(
        "approval-responder",
        ApprovalResponderSubsystem::new(pool.clone(), approval_resolver, wallet_signer, node_config.local_peer_id.clone()),
    );
    overseer.register(
        "subscription-sync",
        SubscriptionSyncSubsystem::new(
            subscriptions,
            register_store.clone(),
            pool.clone(),
            checkpoints,
            node_config.file.replication.periodic_sync_interval_micros,
        ),
    );

    let rpc_server = rpc::RpcServer::new(pipeline, register_store, gossip, peers, node_config.local_peer_id.clone());
    let rpc_handle = rpc::start(&node_config.rpc_addr, rpc_server).await?;
    info!(target: LOG_TARGET, rpc_addr = %node_config.rpc_addr, "rpc server listening");

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        info!(target: LOG_TARGET, "shutdown signal received, draining");
        let _ = shutdown_tx.send(());
    });

    overseer.run(tick_stream(TICK_INTERVAL, shutdown_rx)).await?;

    rpc_handle.stop()?;
    info!(target: LOG_TARGET, "sorcha-node stopped");
    Ok(())
}
