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

use serde::{Deserialize, Serialize};

/// Recognised gossip options from the node's enumerated configuration
/// table (§6).
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct GossipConfig {
    pub fanout_factor: usize,
    pub gossip_rounds: u32,
    pub tx_cache_ttl_micros: i64,
    pub streaming_threshold_bytes: usize,
}

impl Default for GossipConfig {
    fn default() -> Self {
        Self {
            fanout_factor: 3,
            gossip_rounds: 3,
            tx_cache_ttl_micros: 3600 * 1_000_000,
            streaming_threshold_bytes: 1024 * 1024,
        }
    }
}

/// Recognised checkpoint-sweep and offline-queue options (§6).
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplicationConfig {
    pub periodic_sync_interval_micros: i64,
    pub max_queue_size: usize,
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            periodic_sync_interval_micros: 5 * 60 * 1_000_000,
            max_queue_size: 10_000,
        }
    }
}
