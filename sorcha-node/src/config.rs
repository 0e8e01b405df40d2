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

//! Node configuration: a `structopt` CLI surface layered over an
//! optional TOML file, mirroring the teacher's own
//! flags-over-file-over-defaults precedence in `cli/src/cli.rs`. Every
//! component config named in the enumerated configuration table (§6) is
//! collected here so `main` has one place to read before constructing
//! collaborators.

use serde::{Deserialize, Serialize};
use sorcha_connection::ConnectionPoolConfig;
use sorcha_discovery::DiscoveryConfig;
use sorcha_netprobe::NetProbeConfig;
use sorcha_peerstore::PeerStoreConfig;
use sorcha_primitives::PeerId;
use sorcha_register::RegisterStoreConfig;
use sorcha_replication::{GossipConfig, ReplicationConfig};
use sorcha_subscription::SubscriptionConfig;
use sorcha_validator::ValidatorConfig;
use std::path::PathBuf;
use structopt::StructOpt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {0:?}: {1}")]
    Read(PathBuf, std::io::Error),
    #[error("failed to parse config file {0:?}: {1}")]
    Parse(PathBuf, toml::de::Error),
}

/// Recognised CLI flags. A `--config` file, if given, supplies defaults
/// for every component config; unset sections fall back to each
/// crate's own `Default`.
#[derive(Debug, StructOpt)]
#[structopt(name = "sorcha-node", about = "Sorcha register-replication and validator node")]
pub struct Cli {
    /// Directory holding this node's durable state (register store, peer
    /// store, replication outbound queue).
    #[structopt(long, parse(from_os_str), default_value = "./data")]
    pub data_dir: PathBuf,

    /// Optional TOML file overriding component config defaults.
    #[structopt(long, parse(from_os_str))]
    pub config: Option<PathBuf>,

    /// This node's self-chosen, stable peer id.
    #[structopt(long)]
    pub peer_id: String,

    /// Seed peer addresses, `peer_id@host:port`, dialled on startup.
    #[structopt(long)]
    pub seed: Vec<String>,

    /// Use an in-memory store instead of RocksDB; for development only.
    #[structopt(long)]
    pub ephemeral: bool,

    /// Address this node's peer-to-peer `TcpTransport` listener binds to.
    #[structopt(long, default_value = "0.0.0.0:30333")]
    pub listen_addr: String,

    /// Address the JSON-RPC server binds to.
    #[structopt(long, default_value = "127.0.0.1:9933")]
    pub rpc_addr: String,
}

/// Every component's recognised options, gathered in one place so the
/// node process has a single configuration value to build from (§2.1).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub peer_store: PeerStoreConfig,
    pub net_probe: NetProbeConfig,
    pub connection_pool: ConnectionPoolConfig,
    pub discovery: DiscoveryConfig,
    pub subscription: SubscriptionConfig,
    pub gossip: GossipConfig,
    pub replication: ReplicationConfig,
    pub register_store: RegisterStoreConfig,
    pub validator: ValidatorConfig,
}

pub struct NodeConfig {
    pub data_dir: PathBuf,
    pub local_peer_id: PeerId,
    pub seeds: Vec<String>,
    pub ephemeral: bool,
    pub listen_addr: String,
    pub rpc_addr: String,
    pub file: FileConfig,
}

impl NodeConfig {
    pub fn load(cli: Cli) -> Result<Self, ConfigError> {
        let file = match &cli.config {
            Some(path) => {
                let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Read(path.clone(), e))?;
                toml::from_str(&raw).map_err(|e| ConfigError::Parse(path.clone(), e))?
            }
            None => FileConfig::default(),
        };
        Ok(Self {
            data_dir: cli.data_dir,
            local_peer_id: PeerId::from(cli.peer_id),
            seeds: cli.seed,
            ephemeral: cli.ephemeral,
            listen_addr: cli.listen_addr,
            rpc_addr: cli.rpc_addr,
            file,
        })
    }
}
