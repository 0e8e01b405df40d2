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

/// Recognised validator-pipeline options from the node's enumerated
/// configuration table (§6).
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorConfig {
    /// Unverified-queue capacity; a full queue returns `VAL_BUSY` at
    /// admission rather than blocking the caller (§4.7, §7).
    pub unverified_queue_capacity: usize,
    /// Docket builder tick cadence absent a queue non-empty transition
    /// (§4.7 "default every 10s").
    pub docket_tick_interval_micros: i64,
    /// Size cap on transactions per candidate docket.
    pub docket_max_transactions: usize,
    /// Attempts a transaction gets through build/consensus/commit before
    /// it is moved to the poison queue (§4.7 Commit, §7).
    pub max_retries: u32,
    /// §9.1 open question 2: explicit, loudly-logged escape hatch for
    /// bootstrap/development when the `FullyReplicated` validator set is
    /// empty. Defaults to `false`; never flip this in production.
    pub auto_approve_when_no_validators: bool,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            unverified_queue_capacity: 4096,
            docket_tick_interval_micros: 10 * 1_000_000,
            docket_max_transactions: 500,
            max_retries: 5,
            auto_approve_when_no_validators: false,
        }
    }
}
