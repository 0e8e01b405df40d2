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

//! Docket record and header hashing (§3 Docket, §8 property 2).

use crate::hashing::{merkle_root, sha256_hex};
use crate::ids::{DocketId, RegisterId, TxId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A validator's signature over a docket, collected by the consensus
/// engine toward quorum (§4.7 Consensus engine).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ApprovalSignature {
    pub validator_id: String,
    pub signature: Vec<u8>,
}

/// An ordered, signed batch of transactions committed to a register
/// under quorum (§3 Docket).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Docket {
    pub docket_id: DocketId,
    pub register_id: RegisterId,
    pub docket_version: u64,
    pub tx_ids: Vec<TxId>,
    pub previous_docket_id: Option<DocketId>,
    pub merkle_root: String,
    pub built_at: i64,
    pub approval_set: Vec<ApprovalSignature>,
    pub committed_at: Option<i64>,
}

#[derive(Debug, Error)]
pub enum DocketBuildError {
    #[error("genesis docket (version 0) must have no previous docket id")]
    GenesisHasPrevious,
    #[error("non-genesis docket (version {0}) must reference a previous docket id")]
    MissingPrevious(u64),
}

impl Docket {
    /// Builds the canonical docket header bytes that `docket_id` hashes
    /// over: version, register, previous id, merkle root, and the
    /// ordered tx id list, joined by a separator byte that cannot appear
    /// in any of the hex-encoded fields.
    fn canonical_header_bytes(
        register_id: &RegisterId,
        docket_version: u64,
        previous_docket_id: &Option<DocketId>,
        merkle_root: &str,
        tx_ids: &[TxId],
    ) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(register_id.as_str().as_bytes());
        buf.push(0u8);
        buf.extend_from_slice(docket_version.to_be_bytes().as_slice());
        buf.push(0u8);
        if let Some(prev) = previous_docket_id {
            buf.extend_from_slice(prev.as_str().as_bytes());
        }
        buf.push(0u8);
        buf.extend_from_slice(merkle_root.as_bytes());
        buf.push(0u8);
        for tx_id in tx_ids {
            buf.extend_from_slice(tx_id.as_str().as_bytes());
            buf.push(0u8);
        }
        buf
    }

    /// Constructs a new docket, computing `merkle_root` over `tx_ids` and
    /// `docket_id` over the canonical header (§3 Docket invariants).
    pub fn build(
        register_id: RegisterId,
        docket_version: u64,
        tx_ids: Vec<TxId>,
        previous_docket_id: Option<DocketId>,
        built_at: i64,
    ) -> Result<Self, DocketBuildError> {
        if docket_version == 0 && previous_docket_id.is_some() {
            return Err(DocketBuildError::GenesisHasPrevious);
        }
        if docket_version > 0 && previous_docket_id.is_none() {
            return Err(DocketBuildError::MissingPrevious(docket_version));
        }

        let root = merkle_root(tx_ids.iter().map(|t| t.as_str().as_bytes().to_vec()));
        let header = Self::canonical_header_bytes(
            &register_id,
            docket_version,
            &previous_docket_id,
            &root,
            &tx_ids,
        );
        let docket_id = DocketId::from(sha256_hex(&header));

        Ok(Self {
            docket_id,
            register_id,
            docket_version,
            tx_ids,
            previous_docket_id,
            merkle_root: root,
            built_at,
            approval_set: Vec::new(),
            committed_at: None,
        })
    }

    /// Re-derives the merkle root over this docket's own `tx_ids` and
    /// compares it to the stored value, the check §8 property 2 demands
    /// of every docket.
    pub fn merkle_root_is_valid(&self) -> bool {
        let recomputed = merkle_root(self.tx_ids.iter().map(|t| t.as_str().as_bytes().to_vec()));
        recomputed == self.merkle_root
    }

    pub fn is_genesis(&self) -> bool {
        self.docket_version == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn genesis_docket_rejects_previous_id() {
        let err = Docket::build(
            RegisterId::from("r1"),
            0,
            vec![],
            Some(DocketId::from("d-1")),
            0,
        )
        .unwrap_err();
        assert!(matches!(err, DocketBuildError::GenesisHasPrevious));
    }

    #[test]
    fn non_genesis_docket_requires_previous_id() {
        let err = Docket::build(RegisterId::from("r1"), 1, vec![], None, 0).unwrap_err();
        assert!(matches!(err, DocketBuildError::MissingPrevious(1)));
    }

    #[test]
    fn docket_chain_links_by_id() {
        let genesis = Docket::build(RegisterId::from("r1"), 0, vec![], None, 0).unwrap();
        let next = Docket::build(
            RegisterId::from("r1"),
            1,
            vec![TxId::from("tx1")],
            Some(genesis.docket_id.clone()),
            1,
        )
        .unwrap();
        assert_eq!(next.previous_docket_id, Some(genesis.docket_id));
        assert!(next.merkle_root_is_valid());
    }

    #[test]
    fn tampered_tx_ids_fail_merkle_check() {
        let mut d = Docket::build(
            RegisterId::from("r1"),
            1,
            vec![TxId::from("tx1"), TxId::from("tx2")],
            Some(DocketId::from("prev")),
            0,
        )
        .unwrap();
        d.tx_ids.push(TxId::from("tx3"));
        assert!(!d.merkle_root_is_valid());
    }
}
