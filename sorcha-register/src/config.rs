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

/// Recognised register-store options from the node's enumerated
/// configuration table (§6), restricted to the ones this component
/// reads.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RegisterStoreConfig {
    /// Tenancy cap enforced at register creation (§4.8, §6).
    pub max_registers_per_tenant: usize,
}

impl Default for RegisterStoreConfig {
    fn default() -> Self {
        Self {
            max_registers_per_tenant: 25,
        }
    }
}
