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

//! Durable backing for the peer list (§3: "All are durable; in-memory
//! caches are authoritative only within a single process and are
//! rebuilt from durable state on restart"). One column, keyed by
//! `peer_id`; the in-memory snapshot in `PeerListStore` is the hot path,
//! this module is only consulted at startup and on mutation.

use sorcha_primitives::{Peer, PeerId};
use sorcha_subsystem_util::{Storage, StorageResult};

pub const COL_PEERS: u32 = 0;
pub const NUM_COLUMNS: u32 = 1;

pub fn load_all(storage: &Storage) -> StorageResult<Vec<Peer>> {
    storage
        .iter_prefix(COL_PEERS, b"")
        .map(|(_, v)| Storage::decode(&v))
        .collect()
}

pub fn persist(storage: &Storage, peer: &Peer) -> StorageResult<()> {
    let mut txn = storage.transaction();
    txn.put(COL_PEERS, peer.peer_id.as_str().as_bytes(), &Storage::encode(peer)?);
    storage.write(txn)
}

pub fn delete(storage: &Storage, peer_id: &PeerId) -> StorageResult<()> {
    let mut txn = storage.transaction();
    txn.delete(COL_PEERS, peer_id.as_str().as_bytes());
    storage.write(txn)
}
