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

//! The unverified admission slot pool and the per-register verified
//! queue the docket builder drains from (§4.7).
//!
//! Admission is bounded by `unverified_queue_capacity` in-flight slots
//! per register (§4.7 step 1 "soft cap per register") rather than by a
//! literal work queue: a transaction that wins a slot runs the full
//! verification pipeline synchronously inside the caller's own call, and
//! the slot is released when that call returns. A caller that cannot win
//! a slot gets `VAL_BUSY` immediately rather than waiting behind
//! transactions already in flight for that register (§5 "admission and
//! verification may run in parallel across transactions and registers").

use parking_lot::Mutex;
use sorcha_primitives::{RegisterId, VerifiedTransaction};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::AdmissionError;

/// Holds one admission slot for the lifetime of a verification attempt.
/// Dropping it (on any return path, success or rejection) frees the slot
/// for the next caller.
pub struct AdmissionPermit(#[allow(dead_code)] OwnedSemaphorePermit);

/// One semaphore per register, each sized to `unverified_queue_capacity`,
/// created lazily on first submission.
pub struct UnverifiedPool {
    capacity: usize,
    per_register: Mutex<HashMap<RegisterId, Arc<Semaphore>>>,
}

impl UnverifiedPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            per_register: Mutex::new(HashMap::new()),
        }
    }

    fn semaphore_for(&self, register_id: &RegisterId) -> Arc<Semaphore> {
        self.per_register
            .lock()
            .entry(register_id.clone())
            .or_insert_with(|| Arc::new(Semaphore::new(self.capacity)))
            .clone()
    }

    /// Non-blocking: a full pool fails fast with `AdmissionError::Busy`
    /// rather than queuing (§6 `VAL_BUSY`).
    pub fn try_acquire(&self, register_id: &RegisterId) -> Result<AdmissionPermit, AdmissionError> {
        self.semaphore_for(register_id)
            .try_acquire_owned()
            .map(AdmissionPermit)
            .map_err(|_| AdmissionError::Busy)
    }
}

/// Per-register buffer of transactions that passed verification and are
/// waiting for the docket builder's next tick (§4.7 "docket build").
/// Ordering within a register is `(verified_at ASC, tx_id ASC)` (§8
/// property deterministic docket ordering).
pub struct VerifiedQueue {
    by_register: Mutex<HashMap<RegisterId, Vec<VerifiedTransaction>>>,
}

impl VerifiedQueue {
    pub fn new() -> Self {
        Self {
            by_register: Mutex::new(HashMap::new()),
        }
    }

    pub fn push(&self, verified: VerifiedTransaction) {
        let mut guard = self.by_register.lock();
        let bucket = guard.entry(verified.transaction.register_id.clone()).or_default();
        bucket.push(verified);
        bucket.sort_by(|a, b| {
            a.verified_at
                .cmp(&b.verified_at)
                .then_with(|| a.tx_id().as_str().cmp(b.tx_id().as_str()))
        });
    }

    /// Removes and returns up to `max` transactions awaiting a docket
    /// for `register_id`, in build order.
    pub fn drain(&self, register_id: &RegisterId, max: usize) -> Vec<VerifiedTransaction> {
        let mut guard = self.by_register.lock();
        let Some(bucket) = guard.get_mut(register_id) else {
            return Vec::new();
        };
        let take = max.min(bucket.len());
        bucket.drain(..take).collect()
    }

    pub fn pending_count(&self, register_id: &RegisterId) -> usize {
        self.by_register.lock().get(register_id).map(Vec::len).unwrap_or(0)
    }

    /// Registers with at least one transaction waiting for a docket, the
    /// set the docket builder sweeps every tick.
    pub fn registers_with_pending(&self) -> Vec<RegisterId> {
        self.by_register
            .lock()
            .iter()
            .filter(|(_, v)| !v.is_empty())
            .map(|(k, _)| k.clone())
            .collect()
    }
}

impl Default for VerifiedQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sorcha_primitives::{Algorithm, Payloads, Transaction, TxId};

    fn verified(register: &str, tx_id: &str, verified_at: i64) -> VerifiedTransaction {
        VerifiedTransaction {
            transaction: Transaction {
                tx_id: TxId::from(tx_id),
                register_id: RegisterId::from(register),
                blueprint_id: "bp".into(),
                previous_transaction_id: None,
                payload_hash: "h".into(),
                payloads: Payloads::new(),
                sender_wallet: "w".into(),
                signature: vec![],
                public_key: vec![],
                algorithm: Algorithm::Ed25519,
                submitted_at: 0,
            },
            verified_at,
            blueprint_snapshot_id: "bp@1".into(),
        }
    }

    #[test]
    fn pool_rejects_once_capacity_exhausted() {
        let pool = UnverifiedPool::new(1);
        let r1 = RegisterId::from("r1");
        let permit = pool.try_acquire(&r1).unwrap();
        assert!(matches!(pool.try_acquire(&r1).unwrap_err(), AdmissionError::Busy));
        drop(permit);
        assert!(pool.try_acquire(&r1).is_ok());
    }

    #[test]
    fn pool_caps_are_independent_per_register() {
        let pool = UnverifiedPool::new(1);
        let r1 = RegisterId::from("r1");
        let r2 = RegisterId::from("r2");
        let _permit = pool.try_acquire(&r1).unwrap();
        assert!(matches!(pool.try_acquire(&r1).unwrap_err(), AdmissionError::Busy));
        assert!(pool.try_acquire(&r2).is_ok());
    }

    #[test]
    fn verified_queue_drains_in_verified_at_then_tx_id_order() {
        let queue = VerifiedQueue::new();
        let register_id = RegisterId::from("r1");
        queue.push(verified("r1", "tx2", 100));
        queue.push(verified("r1", "tx1", 100));
        queue.push(verified("r1", "tx3", 50));

        let drained = queue.drain(&register_id, 10);
        let ids: Vec<&str> = drained.iter().map(|v| v.tx_id().as_str()).collect();
        assert_eq!(ids, vec!["tx3", "tx1", "tx2"]);
        assert_eq!(queue.pending_count(&register_id), 0);
    }

    #[test]
    fn drain_respects_max_and_leaves_the_rest() {
        let queue = VerifiedQueue::new();
        let register_id = RegisterId::from("r1");
        for i in 0..5 {
            queue.push(verified("r1", &format!("tx{i}"), i as i64));
        }
        let first = queue.drain(&register_id, 3);
        assert_eq!(first.len(), 3);
        assert_eq!(queue.pending_count(&register_id), 2);
    }

    #[test]
    fn registers_with_pending_only_lists_non_empty_buckets() {
        let queue = VerifiedQueue::new();
        queue.push(verified("r1", "tx1", 0));
        assert_eq!(queue.registers_with_pending(), vec![RegisterId::from("r1")]);
        queue.drain(&RegisterId::from("r1"), 10);
        assert!(queue.registers_with_pending().is_empty());
    }
}
