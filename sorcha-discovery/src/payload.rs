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

//! Wire payloads carried inside `MessageEnvelope` for the three discovery
//! message kinds (§4.4): `PeerExchangeRequest`, `PeerExchangeResponse`,
//! `RegisterAdvertise`. A digest omits per-peer health counters; health
//! is local-only state, never gossiped (§3 Peer invariants).

use sorcha_primitives::{AdvertisedRegister, PeerId};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PeerDigest {
    pub peer_id: PeerId,
    pub address: String,
    pub port: u16,
    pub transports: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PeerExchangeRequestPayload {
    pub known_peers: Vec<PeerDigest>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PeerExchangeResponsePayload {
    pub known_peers: Vec<PeerDigest>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RegisterAdvertisePayload {
    pub peer_id: PeerId,
    pub registers: Vec<AdvertisedRegister>,
}
