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

//! Column layout and key encodings for the Register Store (§4.8, §6
//! "Persisted state layout"): a small registry namespace (one entry per
//! register) plus, per register, two collections (`transactions`,
//! `dockets`) and the indexes the distilled spec names at minimum
//! (`transactions.tx_id` unique, `transactions.submitted_at`,
//! `dockets.version` unique). Physical per-register isolation is
//! realised as a `register_id`-prefixed key range within a shared
//! column set — each register's keys never overlap another's, and a
//! prefix scan never crosses the boundary.

use sorcha_primitives::{RegisterId, TxId};

pub const COL_REGISTRY: u32 = 0;
pub const COL_TRANSACTIONS: u32 = 1;
pub const COL_TX_BY_TIME: u32 = 2;
pub const COL_DOCKETS: u32 = 3;
pub const COL_DOCKET_BY_ID: u32 = 4;
pub const COL_POISON: u32 = 5;
pub const NUM_COLUMNS: u32 = 6;

pub fn registry_key(register_id: &RegisterId) -> Vec<u8> {
    register_id.as_str().as_bytes().to_vec()
}

pub fn register_prefix(register_id: &RegisterId) -> Vec<u8> {
    let mut key = register_id.as_str().as_bytes().to_vec();
    key.push(b':');
    key
}

pub fn tx_key(register_id: &RegisterId, tx_id: &TxId) -> Vec<u8> {
    let mut key = register_prefix(register_id);
    key.extend_from_slice(tx_id.as_str().as_bytes());
    key
}

/// Zero-padded so the natural byte order of `submitted_at` matches
/// numeric order, letting `iter_prefix` double as a time-ordered scan.
pub fn tx_by_time_key(register_id: &RegisterId, submitted_at: i64, tx_id: &TxId) -> Vec<u8> {
    let mut key = register_prefix(register_id);
    key.extend_from_slice(format!("{submitted_at:020}:", submitted_at = submitted_at as u64).as_bytes());
    key.extend_from_slice(tx_id.as_str().as_bytes());
    key
}

/// Zero-padded so version order matches byte order, the same trick used
/// for the time index above.
pub fn docket_version_key(register_id: &RegisterId, version: u64) -> Vec<u8> {
    let mut key = register_prefix(register_id);
    key.extend_from_slice(format!("{version:020}").as_bytes());
    key
}

pub fn docket_by_id_key(register_id: &RegisterId, docket_id: &str) -> Vec<u8> {
    let mut key = register_prefix(register_id);
    key.extend_from_slice(docket_id.as_bytes());
    key
}

pub fn poison_key(register_id: &RegisterId, tx_id: &TxId) -> Vec<u8> {
    tx_key(register_id, tx_id)
}
