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

//! The one message type carried over this node's overseer bus
//! (`sorcha_subsystem::Overseer<NodeMessage>`). Unlike the teacher's
//! generated overseer, where each subsystem gets its own narrowly-typed
//! inbox, every subsystem here receives every `NodeMessage` and matches
//! out what it cares about (module docs, `sorcha-subsystem`).
//!
//! Wire frames themselves do not travel over this bus: every subsystem
//! that cares about a given `MessageKind` registers its own channel
//! directly with the shared `ConnectionPool` (`register_stream_handler`,
//! §4.3's pub-sub dispatch), mirroring the teacher's own
//! `network/bridge` pattern. The bus instead carries the handful of
//! lifecycle notices one subsystem raises that others react to, plus
//! the overseer's `Tick`/`Conclude` signals. Transaction admission is
//! not a bus message either: it runs as a direct call against a shared
//! `Arc<ValidatorPipeline<..>>` from the RPC server (`rpc.rs`), exactly
//! the "external caller" boundary §2 describes.

use sorcha_primitives::PeerId;

#[derive(Debug, Clone)]
pub enum NodeMessage {
    /// Raised once a session with `peer_id` reaches `Connected`, so
    /// Discovery can run its eager peer-exchange (§4.4 "peer lists are
    /// also eagerly exchanged on new connection establishment").
    PeerConnected(PeerId),
    PeerDisconnected(PeerId),
}
