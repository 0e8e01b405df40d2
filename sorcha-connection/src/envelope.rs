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

//! The peer protocol's message envelope (§4.3, §6): every frame crossing
//! a session carries a `kind`, a `correlation_id` for request/response
//! pairing, and an opaque payload. Wire encoding is handled at the
//! `Transport` boundary (length-prefixed, little-endian, canonical
//! `rmp-serde`, per §6) — this type is the in-process representation
//! every subsystem above the transport programs against.

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum MessageKind {
    Heartbeat,
    PeerExchangeRequest,
    PeerExchangeResponse,
    RegisterAdvertise,
    TransactionNotify,
    TransactionRequest,
    TransactionData,
    DocketRequest,
    DocketData,
    SubscribeRequest,
    SubscribeAck,
    DocketApprovalRequest,
    DocketApprovalResponse,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MessageEnvelope {
    pub kind: MessageKind,
    pub correlation_id: String,
    pub payload: Vec<u8>,
}

impl MessageEnvelope {
    pub fn new(kind: MessageKind, correlation_id: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            kind,
            correlation_id: correlation_id.into(),
            payload,
        }
    }
}

/// Fields a heartbeat frame carries (§4.3): `"Heartbeat carries {sent_at,
/// sequence}"`. Encoded into `MessageEnvelope::payload` via `rmp-serde`.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct HeartbeatPayload {
    pub sent_at: i64,
    pub sequence: u64,
}
