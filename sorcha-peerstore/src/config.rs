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

/// Recognised peer-store options from the node's enumerated configuration
/// table (§6), restricted to the ones this component reads.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PeerStoreConfig {
    pub max_peers: usize,
    /// Window, in microseconds, within which `last_seen` counts as fresh.
    pub freshness_window_micros: i64,
    pub failure_threshold: u32,
}

impl Default for PeerStoreConfig {
    fn default() -> Self {
        Self {
            max_peers: 1000,
            freshness_window_micros: 5 * 60 * 1_000_000,
            failure_threshold: 6,
        }
    }
}
