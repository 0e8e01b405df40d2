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

use crate::circuit::CircuitBreakerConfig;
use serde::{Deserialize, Serialize};

/// Recognised connection-pool options from the node's enumerated
/// configuration table (§6).
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionPoolConfig {
    pub heartbeat_interval_micros: i64,
    pub max_missed_heartbeats: u32,
    pub connect_timeout_micros: i64,
    pub circuit_breaker_threshold: u32,
    pub circuit_breaker_reset_micros: i64,
}

impl Default for ConnectionPoolConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_micros: 30 * 1_000_000,
            max_missed_heartbeats: 2,
            connect_timeout_micros: 30 * 1_000_000,
            circuit_breaker_threshold: 5,
            circuit_breaker_reset_micros: 5 * 60 * 1_000_000,
        }
    }
}

impl ConnectionPoolConfig {
    pub fn circuit_breaker_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            threshold: self.circuit_breaker_threshold,
            reset_micros: self.circuit_breaker_reset_micros,
        }
    }
}
