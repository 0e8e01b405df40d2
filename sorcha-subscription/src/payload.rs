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

//! Wire payloads for the `DocketRequest` / `DocketData` message kinds
//! (§4.5 "pull historical dockets ... in batches").

use sorcha_primitives::{Docket, RegisterId, Transaction};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DocketRequestPayload {
    pub register_id: RegisterId,
    /// Exclusive lower bound; the response starts at `from_version`.
    pub from_version: u64,
    pub batch_size: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PulledDocket {
    pub docket: Docket,
    pub transactions: Vec<Transaction>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DocketDataPayload {
    pub register_id: RegisterId,
    pub dockets: Vec<PulledDocket>,
    pub total_dockets_in_chain: u64,
}
