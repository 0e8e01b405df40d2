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

/// Recognised subscription options from the node's enumerated
/// configuration table (§6).
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SubscriptionConfig {
    pub docket_pull_batch_size: u64,
    pub max_concurrent_docket_pulls: usize,
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            docket_pull_batch_size: 100,
            max_concurrent_docket_pulls: 3,
        }
    }
}
