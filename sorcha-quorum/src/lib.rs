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

//! Control-Record Quorum (§4.9): the signed-request verification and
//! mutation workflow over the attestation roster that `sorcha-primitives`
//! data model (`ControlRecord`, `quorum_threshold`) only expresses as
//! pure arithmetic.
//!
//! Every roster mutation here requires a strict majority of *current*
//! voting members, computed after excluding the target of a self-revoke
//! or removal (§3, §8 property 6). Owner removal while register
//! transactions remain is rejected outright; an Owner transfer requires a
//! unanimous-minus-target vote rather than a simple majority, since it
//! hands over a voting member's seat rather than just revoking one.

use sorcha_primitives::quorum::MAX_ATTESTATIONS;
use sorcha_primitives::{Attestation, ControlRecord, Role};
use std::collections::HashSet;
use thiserror::Error;
use tracing::{info, warn};

const LOG_TARGET: &str = "quorum";

#[derive(Debug, Error, Eq, PartialEq)]
pub enum QuorumError {
    #[error("mutation requires {required} signatures from current voting members, got {got}")]
    InsufficientSignatures { required: usize, got: usize },
    #[error("register's attestation roster is at its {MAX_ATTESTATIONS}-entry cap")]
    AttestationCapExceeded,
    #[error("owner cannot be removed while register transactions remain")]
    OwnerRemovalBlocked,
    #[error("owner transfer requires a unanimous-minus-target vote, not a simple majority")]
    TransferRequiresUnanimity,
    #[error("subject {0} is not a current attestation holder")]
    UnknownSubject(String),
    #[error("subject {0} is not a voting member and cannot sign a roster mutation")]
    SignerNotVoting(String),
}

/// A roster mutation pending application, named the way §4.9 describes
/// the sensitive control operations it governs.
#[derive(Clone, Debug)]
pub enum MutationKind {
    AddAttestation(Attestation),
    RevokeAttestation { subject: String },
    ChangeRole { subject: String, new_role: Role },
    TransferOwner { from_subject: String, to: Attestation },
}

impl MutationKind {
    /// Subjects excluded from the quorum denominator for this mutation:
    /// the target of a self-revoke, a removal, or an ownership transfer
    /// never counts toward its own quorum (§3 `quorum_threshold(exclude)`).
    fn exclude(&self) -> HashSet<&str> {
        let mut set = HashSet::new();
        match self {
            MutationKind::RevokeAttestation { subject } => {
                set.insert(subject.as_str());
            }
            MutationKind::ChangeRole { subject, .. } => {
                set.insert(subject.as_str());
            }
            MutationKind::TransferOwner { from_subject, .. } => {
                set.insert(from_subject.as_str());
            }
            MutationKind::AddAttestation(_) => {}
        }
        set
    }

    /// `true` if this mutation removes an Owner's voting seat (outright
    /// revocation or a role change away from Owner) and is therefore
    /// subject to the "no owner removal while transactions remain" rule.
    fn removes_an_owner(&self, record: &ControlRecord) -> bool {
        match self {
            MutationKind::RevokeAttestation { subject } => record
                .find(subject)
                .map(|a| matches!(a.role, Role::Owner))
                .unwrap_or(false),
            MutationKind::ChangeRole { subject, new_role } => {
                !matches!(new_role, Role::Owner)
                    && record
                        .find(subject)
                        .map(|a| matches!(a.role, Role::Owner))
                        .unwrap_or(false)
            }
            MutationKind::TransferOwner { .. } | MutationKind::AddAttestation(_) => false,
        }
    }
}

/// Distinct subjects who signed the mutation request, deduplicated
/// before being checked against the roster.
fn distinct_signers<'a>(signatures: &'a [&'a str]) -> HashSet<&'a str> {
    signatures.iter().copied().collect()
}

/// Verifies and applies `mutation` to `record`, given the set of subjects
/// whose signatures accompanied the request and whether `record`'s
/// register still holds any committed transactions (the Owner-removal
/// guard, §4.9). Returns the new attestation count on success.
pub fn apply_mutation(
    record: &mut ControlRecord,
    mutation: MutationKind,
    signer_subjects: &[&str],
    register_has_transactions: bool,
) -> Result<usize, QuorumError> {
    let exclude = mutation.exclude();

    let signers = distinct_signers(signer_subjects);
    for subject in &signers {
        if exclude.contains(subject) {
            continue;
        }
        match record.find(subject) {
            Some(a) if a.role.is_voting() => {}
            Some(_) => return Err(QuorumError::SignerNotVoting((*subject).to_string())),
            None => return Err(QuorumError::UnknownSubject((*subject).to_string())),
        }
    }
    let valid_signer_count = signers.iter().filter(|s| !exclude.contains(*s)).count();

    let required = if let MutationKind::TransferOwner { from_subject, .. } = &mutation {
        // Unanimous-minus-target: every remaining voting member, not a
        // simple majority (§3 Ownership & lifecycle).
        let remaining = record
            .voting_members()
            .into_iter()
            .filter(|a| a.subject != *from_subject)
            .count();
        if valid_signer_count < remaining {
            return Err(QuorumError::TransferRequiresUnanimity);
        }
        remaining
    } else {
        record.quorum_threshold(&exclude)
    };

    if valid_signer_count < required {
        return Err(QuorumError::InsufficientSignatures {
            required,
            got: valid_signer_count,
        });
    }

    if mutation.removes_an_owner(record) && register_has_transactions {
        return Err(QuorumError::OwnerRemovalBlocked);
    }

    if matches!(mutation, MutationKind::AddAttestation(_)) && record.is_at_cap() {
        return Err(QuorumError::AttestationCapExceeded);
    }

    match mutation {
        MutationKind::AddAttestation(attestation) => {
            info!(target: LOG_TARGET, register_id = %record.register_id, subject = %attestation.subject, "adding attestation under quorum");
            record.attestations.push(attestation);
        }
        MutationKind::RevokeAttestation { subject } => {
            info!(target: LOG_TARGET, register_id = %record.register_id, %subject, "revoking attestation under quorum");
            record.attestations.retain(|a| a.subject != subject);
        }
        MutationKind::ChangeRole { subject, new_role } => {
            info!(target: LOG_TARGET, register_id = %record.register_id, %subject, ?new_role, "changing role under quorum");
            if let Some(a) = record.attestations.iter_mut().find(|a| a.subject == subject) {
                a.role = new_role;
            }
        }
        MutationKind::TransferOwner { from_subject, to } => {
            warn!(target: LOG_TARGET, register_id = %record.register_id, from = %from_subject, to = %to.subject, "transferring ownership under unanimous vote");
            if let Some(a) = record
                .attestations
                .iter_mut()
                .find(|a| a.subject == from_subject)
            {
                a.role = Role::Admin;
            }
            record.attestations.retain(|a| a.subject != to.subject);
            record.attestations.push(to);
        }
    }

    Ok(record.attestation_count())
}
