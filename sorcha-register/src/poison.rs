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

//! Poison queue (§7): verified transactions that repeatedly fail at
//! commit stage, parked here with full context for operator inspection
//! and never auto-retried.

use sorcha_primitives::{RegisterId, TxId};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PoisonedTransaction {
    pub tx_id: TxId,
    pub register_id: RegisterId,
    pub attempts: u32,
    pub last_error: String,
    pub poisoned_at: i64,
}
