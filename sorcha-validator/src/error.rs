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

use sorcha_register::RegisterStoreError;
use thiserror::Error;

/// The closed set of deterministic validation rejections (§4.7, §6).
/// These are reported to the caller synchronously and never retried
/// (§7 "Validation errors").
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("transaction is missing or has malformed required fields")]
    Structural,
    #[error("payload hash does not match the recomputed SHA-256 of the canonical payload")]
    HashMismatch,
    #[error("signature does not verify over \"{{tx_id}}:{{payload_hash}}\" for the declared algorithm")]
    SignatureMismatch,
    #[error("blueprint {0} is not published")]
    UnknownBlueprint(String),
    #[error("wallet disclosure violates the blueprint action's declared schema")]
    SchemaViolation,
    #[error("action is not permitted from the instance's current state")]
    ActionNotPermitted,
    #[error("sender wallet is not an authorised participant for this action")]
    SenderNotAuthorised,
    #[error("previous_transaction_id does not match the instance's last committed transaction for this participant")]
    PreviousTransactionMismatch,
}

impl ValidationError {
    /// The exact `VAL_*` code from §6, carried across the RPC boundary.
    pub fn code(&self) -> &'static str {
        match self {
            ValidationError::Structural => "VAL_STRUCT_001",
            ValidationError::HashMismatch => "VAL_HASH_001",
            ValidationError::SignatureMismatch => "VAL_SIG_002",
            ValidationError::UnknownBlueprint(_) => "VAL_SCHEMA_001",
            ValidationError::SchemaViolation => "VAL_SCHEMA_004",
            ValidationError::ActionNotPermitted => "VAL_BP_001",
            ValidationError::SenderNotAuthorised => "VAL_BP_002",
            ValidationError::PreviousTransactionMismatch => "VAL_BP_003",
        }
    }
}

/// Transient, retried-with-backoff failures surfaced while a transaction
/// moves through admission and verification, distinct from the
/// deterministic `ValidationError` set above (§7).
#[derive(Debug, Error)]
pub enum AdmissionError {
    #[error("unverified queue is at capacity (VAL_BUSY)")]
    Busy,
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// Failures from the build/consensus/commit stages, after a transaction
/// has already passed verification (§4.7 Commit). These drive the
/// requeue-then-poison retry policy rather than a synchronous rejection.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Register(#[from] RegisterStoreError),
    #[error("consensus could not be reached: {0}")]
    Consensus(String),
}
