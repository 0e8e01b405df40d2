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

//! Consensus engine (§4.7 "Consensus engine"): collects docket approval
//! signatures from the set of validators that are `FullyReplicated` for
//! a register and commits once a strict majority of that set has signed.
//!
//! The validator set and the approval-collection transport are both
//! consumed-interface seams (§6.1 pattern): which peers currently count
//! as `FullyReplicated` for a register is a Subscription Manager /
//! Peer List Store concern wired in at the composition root
//! (`sorcha-node`), and collecting a signature from another validator
//! process runs over the wire, also out of this crate's scope. Narrow
//! traits here keep the engine's own logic — the threshold arithmetic
//! and the auto-approve escape hatch — testable without either.

use async_trait::async_trait;
use sorcha_primitives::{ApprovalSignature, Docket, PeerId, RegisterId};
use tracing::warn;

use crate::config::ValidatorConfig;
use crate::error::PipelineError;

const LOG_TARGET: &str = "consensus";

#[async_trait]
pub trait ValidatorSetProvider: Send + Sync {
    /// Peers currently `FullyReplicated` for `register_id` — the voting
    /// set for that register's next docket (§4.7).
    async fn fully_replicated_validators(&self, register_id: &RegisterId) -> Vec<PeerId>;
}

#[async_trait]
pub trait ApprovalCollector: Send + Sync {
    /// Requests `validator`'s signature over `docket`. `None` means the
    /// validator did not respond (offline, timed out, refused) rather
    /// than an error worth distinguishing here — a non-responding
    /// validator simply does not count toward quorum.
    async fn request_approval(&self, validator: &PeerId, docket: &Docket) -> Option<ApprovalSignature>;
}

/// `floor(n/2)+1` over the size of the `FullyReplicated` validator set —
/// deliberately distinct from `ControlRecord::quorum_threshold`, which
/// excludes a removal/self-revoke target; consensus has no such target.
fn strict_majority(n: usize) -> usize {
    n / 2 + 1
}

pub struct ConsensusEngine<V, A> {
    validator_set: V,
    collector: A,
    config: ValidatorConfig,
}

impl<V, A> ConsensusEngine<V, A>
where
    V: ValidatorSetProvider,
    A: ApprovalCollector,
{
    pub fn new(validator_set: V, collector: A, config: ValidatorConfig) -> Self {
        Self {
            validator_set,
            collector,
            config,
        }
    }

    /// Drives `docket` (already built, not yet approved) to quorum,
    /// returning it with `approval_set` populated. §9.1 open question 2:
    /// an empty validator set is a hard error unless
    /// `auto_approve_when_no_validators` is set, in which case the
    /// docket is approved with an empty `approval_set` and the event is
    /// logged loudly.
    pub async fn approve(&self, register_id: &RegisterId, mut docket: Docket) -> Result<Docket, PipelineError> {
        let validators = self.validator_set.fully_replicated_validators(register_id).await;

        if validators.is_empty() {
            if self.config.auto_approve_when_no_validators {
                warn!(
                    target: "consensus_auto_approve",
                    register_id = %register_id,
                    docket_id = %docket.docket_id,
                    "auto-approving docket with no FullyReplicated validators; this path must never run in production"
                );
                docket.approval_set = Vec::new();
                return Ok(docket);
            }
            return Err(PipelineError::Consensus("no FullyReplicated validators for register".into()));
        }

        let threshold = strict_majority(validators.len());
        let mut approvals = Vec::with_capacity(validators.len());
        for validator in &validators {
            if let Some(signature) = self.collector.request_approval(validator, &docket).await {
                approvals.push(signature);
            }
        }

        if approvals.len() < threshold {
            warn!(
                target: LOG_TARGET,
                register_id = %register_id,
                docket_id = %docket.docket_id,
                got = approvals.len(),
                needed = threshold,
                "docket failed to reach consensus threshold"
            );
            return Err(PipelineError::Consensus(format!(
                "got {} of {} required approvals",
                approvals.len(),
                threshold
            )));
        }

        docket.approval_set = approvals;
        Ok(docket)
    }
}

/// Always-empty validator set, for single-node/bootstrap wiring.
pub struct EmptyValidatorSet;

#[async_trait]
impl ValidatorSetProvider for EmptyValidatorSet {
    async fn fully_replicated_validators(&self, _register_id: &RegisterId) -> Vec<PeerId> {
        Vec::new()
    }
}

/// Approves unconditionally, signing nothing. Exists for tests; a real
/// deployment always talks to actual validator processes over the wire.
pub struct AutoApproveCollector;

#[async_trait]
impl ApprovalCollector for AutoApproveCollector {
    async fn request_approval(&self, validator: &PeerId, _docket: &Docket) -> Option<ApprovalSignature> {
        Some(ApprovalSignature {
            validator_id: validator.to_string(),
            signature: Vec::new(),
        })
    }
}
