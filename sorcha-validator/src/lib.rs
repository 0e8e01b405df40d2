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

//! The Validator Pipeline (§4.7): the heart of consensus. One
//! `ValidatorPipeline` per validator process, composed at the node's
//! composition root from a `RegisterStore`, the consumed-interface
//! adapters (§6.1), and a `ConsensusEngine` wired to this node's
//! `ValidatorSetProvider`/`ApprovalCollector` implementations.
//!
//! `submit` runs stages 1-8 of §4.7 synchronously inside the caller's
//! own async call (admission through promotion to the verified queue);
//! `run_docket_tick` runs the docket-build/consensus/commit stages for
//! one register, meant to be driven by a per-register ticker subsystem.

pub mod blueprint;
pub mod commit;
pub mod config;
pub mod consensus;
pub mod docket_builder;
pub mod error;
pub mod interfaces;
pub mod pipeline;
pub mod queue;
pub mod signing;

pub use config::ValidatorConfig;
pub use consensus::{ApprovalCollector, AutoApproveCollector, ConsensusEngine, EmptyValidatorSet, ValidatorSetProvider};
pub use error::{AdmissionError, PipelineError, ValidationError};
pub use interfaces::{
    BlueprintCache, FakeIdentityClient, FakeWalletSigner, IdentityClient, InMemoryBlueprintCache, WalletSigner,
};

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use sorcha_eventsink::{DomainEvent, EventSink};
use sorcha_primitives::{now_micros, RegisterId, Transaction, TxId};
use sorcha_register::{PoisonedTransaction, RegisterStore};
use tracing::{info, warn};

use blueprint::InstanceTracker;
use queue::{UnverifiedPool, VerifiedQueue};

const LOG_TARGET: &str = "validator_pipeline";

/// RPC-facing outcome of a signed transaction submission (§6 "Signed
/// transaction submission (RPC)"). `Serialize` is derived here rather
/// than left to the node crate since this struct's shape *is* the wire
/// contract §6 fixes, not an internal detail the RPC layer re-wraps.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubmissionOutcome {
    pub accepted: bool,
    pub stage_reached: &'static str,
    pub error: Option<RpcError>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RpcError {
    pub code: &'static str,
    pub message: String,
}

/// Wires together every stage of §4.7 behind two narrow generic seams:
/// `V` decides which peers count as validators for a register, `A`
/// collects their approval signatures. A real node supplies adapters
/// bridging to `sorcha-subscription`/`sorcha-peerstore` and the wire
/// protocol; tests use `EmptyValidatorSet`/`AutoApproveCollector`.
pub struct ValidatorPipeline<V, A> {
    config: ValidatorConfig,
    register_store: Arc<RegisterStore>,
    blueprints: Arc<dyn BlueprintCache>,
    identity: Arc<dyn IdentityClient>,
    event_sink: Arc<dyn EventSink>,
    instances: Arc<InstanceTracker>,
    pool: UnverifiedPool,
    verified: VerifiedQueue,
    consensus: ConsensusEngine<V, A>,
    seen: Mutex<HashSet<TxId>>,
    attempts: Mutex<HashMap<TxId, u32>>,
}

impl<V, A> ValidatorPipeline<V, A>
where
    V: ValidatorSetProvider,
    A: ApprovalCollector,
{
    pub fn new(
        config: ValidatorConfig,
        register_store: Arc<RegisterStore>,
        blueprints: Arc<dyn BlueprintCache>,
        identity: Arc<dyn IdentityClient>,
        event_sink: Arc<dyn EventSink>,
        validator_set: V,
        collector: A,
    ) -> Self {
        Self {
            pool: UnverifiedPool::new(config.unverified_queue_capacity),
            consensus: ConsensusEngine::new(validator_set, collector, config),
            config,
            register_store,
            blueprints,
            identity,
            event_sink,
            instances: Arc::new(InstanceTracker::new()),
            verified: VerifiedQueue::new(),
            seen: Mutex::new(HashSet::new()),
            attempts: Mutex::new(HashMap::new()),
        }
    }

    fn is_duplicate(&self, tx: &Transaction) -> bool {
        if self.seen.lock().contains(&tx.tx_id) {
            return true;
        }
        matches!(self.register_store.get_transaction(&tx.register_id, &tx.tx_id), Ok(Some(_)))
    }

    /// §4.7 stages 1-8: admit, validate, and promote to the verified
    /// queue. Returns the RPC-shaped outcome rather than a `Result` since
    /// every stage's rejection is a normal, typed response (§6).
    pub async fn submit(&self, tx: Transaction, tenant_id: &str) -> SubmissionOutcome {
        if self.is_duplicate(&tx) {
            return SubmissionOutcome {
                accepted: true,
                stage_reached: "duplicate",
                error: None,
            };
        }

        let permit = match self.pool.try_acquire(&tx.register_id) {
            Ok(permit) => permit,
            Err(AdmissionError::Busy) => {
                return SubmissionOutcome {
                    accepted: false,
                    stage_reached: "admission",
                    error: Some(RpcError {
                        code: "VAL_BUSY",
                        message: "unverified pool is at capacity for this register".into(),
                    }),
                };
            }
            Err(AdmissionError::Validation(_)) => unreachable!("try_acquire never returns Validation"),
        };

        let tx_id = tx.tx_id.clone();
        let register_id = tx.register_id.clone();
        let outcome = pipeline::validate(
            tx,
            &self.register_store,
            self.blueprints.as_ref(),
            self.identity.as_ref(),
            &self.instances,
            tenant_id,
        )
        .await;
        drop(permit);

        match outcome {
            Ok(verified) => {
                self.seen.lock().insert(tx_id.clone());
                self.verified.push(verified);
                let _ = self
                    .event_sink
                    .emit(DomainEvent::TransactionSubmitted { tx_id, register_id })
                    .await;
                SubmissionOutcome {
                    accepted: true,
                    stage_reached: "verified",
                    error: None,
                }
            }
            Err(e) => SubmissionOutcome {
                accepted: false,
                stage_reached: "validation",
                error: Some(RpcError {
                    code: e.code(),
                    message: e.to_string(),
                }),
            },
        }
    }

    /// Runs one docket-build/consensus/commit cycle for `register_id`
    /// (§4.7 "Docket builder", "Consensus engine", "Commit"). Intended to
    /// be called by a per-register ticker (default every 10s, or
    /// immediately on a verified-queue non-empty transition).
    pub async fn run_docket_tick(&self, register_id: &RegisterId) -> Result<(), PipelineError> {
        let Some(candidate) = docket_builder::build_candidate(
            register_id,
            &self.register_store,
            &self.verified,
            self.config.docket_max_transactions,
        )?
        else {
            return Ok(());
        };

        let unapproved = candidate.docket.clone();
        match self.consensus.approve(register_id, unapproved).await {
            Ok(approved) => {
                let transactions = candidate.transactions.clone();
                if let Err(e) = commit::commit(candidate, approved, &self.register_store, self.event_sink.as_ref()).await {
                    self.requeue_or_poison(transactions, &e.to_string());
                    return Err(e);
                }
                Ok(())
            }
            Err(e) => {
                self.requeue_or_poison(candidate.transactions, &e.to_string());
                Err(e)
            }
        }
    }

    /// After a failed build/consensus/commit attempt, each transaction
    /// either goes back on the verified queue for the next tick or, past
    /// `max_retries`, into the poison queue (§4.7 Commit, §7).
    fn requeue_or_poison(&self, transactions: Vec<sorcha_primitives::VerifiedTransaction>, last_error: &str) {
        let mut attempts = self.attempts.lock();
        for verified in transactions {
            let tx_id = verified.tx_id().clone();
            let count = attempts.entry(tx_id.clone()).or_insert(0);
            *count += 1;
            let attempt_count = *count;

            if attempt_count >= self.config.max_retries {
                attempts.remove(&tx_id);
                if let Err(storage_err) = self.register_store.push_poison(PoisonedTransaction {
                    tx_id: tx_id.clone(),
                    register_id: verified.transaction.register_id.clone(),
                    attempts: attempt_count,
                    last_error: last_error.to_string(),
                    poisoned_at: now_micros(),
                }) {
                    warn!(target: LOG_TARGET, %tx_id, error = %storage_err, "failed to record poisoned transaction");
                }
            } else {
                info!(target: LOG_TARGET, %tx_id, attempt = attempt_count, error = last_error, "requeuing transaction after failed docket attempt");
                self.verified.push(verified);
            }
        }
    }

    pub fn poisoned(&self, register_id: &RegisterId) -> Vec<PoisonedTransaction> {
        self.register_store.list_poisoned(register_id).unwrap_or_default()
    }
}
