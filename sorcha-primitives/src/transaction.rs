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

//! Transaction and verified-transaction records (§3), and the
//! transaction-lifecycle state machine (§4.7).

use crate::ids::{BlueprintId, RegisterId, TxId, WalletAddress};
use crate::Payloads;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum Algorithm {
    Ed25519,
    Sr25519,
    EcdsaSecp256k1,
}

impl std::fmt::Display for Algorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Algorithm::Ed25519 => "ED25519",
            Algorithm::Sr25519 => "SR25519",
            Algorithm::EcdsaSecp256k1 => "ECDSA_SECP256K1",
        };
        f.write_str(s)
    }
}

/// A signed transaction as submitted by a caller (§3 Transaction).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub tx_id: TxId,
    pub register_id: RegisterId,
    pub blueprint_id: BlueprintId,
    pub previous_transaction_id: Option<TxId>,
    pub payload_hash: String,
    pub payloads: Payloads,
    pub sender_wallet: WalletAddress,
    pub signature: Vec<u8>,
    pub public_key: Vec<u8>,
    pub algorithm: Algorithm,
    pub submitted_at: i64,
}

impl Transaction {
    /// The exact ASCII bytes the signature is computed over (§3, §8
    /// property 3): `"{tx_id}:{payload_hash}"`.
    pub fn sign_bytes(&self) -> Vec<u8> {
        crate::hashing::canonical_sign_bytes(self.tx_id.as_str(), &self.payload_hash)
    }

    pub fn is_genesis(&self) -> bool {
        self.blueprint_id.as_str() == crate::GENESIS_BLUEPRINT_ID
    }

    /// Re-derives the content-addressed `tx_id` this transaction's own
    /// fields commit to (§3.1), for the validator's structural-validation
    /// stage (§4.7 step 2 "tx_id is canonical content hash").
    pub fn expected_tx_id(&self) -> TxId {
        TxId::from(crate::hashing::canonical_tx_id(
            self.register_id.as_str(),
            self.blueprint_id.as_str(),
            self.previous_transaction_id.as_ref().map(|t| t.as_str()),
            &self.payload_hash,
            self.sender_wallet.as_str(),
            self.submitted_at,
        ))
    }
}

/// A transaction that has passed the verification stages of §4.7,
/// annotated with the blueprint snapshot it was checked against.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VerifiedTransaction {
    pub transaction: Transaction,
    pub verified_at: i64,
    pub blueprint_snapshot_id: String,
}

impl VerifiedTransaction {
    pub fn tx_id(&self) -> &TxId {
        &self.transaction.tx_id
    }
}

/// Lifecycle states of a transaction through the pipeline (§4.7).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum TransactionState {
    Submitted,
    Unverified,
    Verified,
    Packed,
    Confirmed,
    Rejected,
    Poison,
}

impl TransactionState {
    /// `Rejected` is reachable from any pre-`Verified` step; `Poison` is
    /// reachable only after `Verified` (§4.7 state machine).
    pub fn can_transition_to(&self, next: TransactionState) -> bool {
        use TransactionState::*;
        match (self, next) {
            (Submitted, Unverified) => true,
            (Unverified, Verified) => true,
            (Unverified, Rejected) => true,
            (Submitted, Rejected) => true,
            (Verified, Packed) => true,
            (Packed, Confirmed) => true,
            (Verified, Poison) => true,
            (Packed, Poison) => true,
            _ => false,
        }
    }
}
