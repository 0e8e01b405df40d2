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

//! Docket builder (§4.7 "Docket builder"): per register, drains the
//! verified queue into a candidate docket on a ticker or immediately on
//! a queue non-empty transition, with a genesis-docket-on-first-tick
//! rule for freshly created registers.

use sorcha_primitives::{Docket, DocketId, RegisterId, VerifiedTransaction};
use sorcha_register::{RegisterStore, RegisterStoreError};

use crate::queue::VerifiedQueue;

/// A docket awaiting consensus, still carrying the `VerifiedTransaction`
/// records it was built from so the commit stage can persist them
/// alongside the docket itself.
pub struct CandidateDocket {
    pub docket: Docket,
    pub transactions: Vec<VerifiedTransaction>,
}

#[derive(Debug, thiserror::Error)]
pub enum DocketBuilderError {
    #[error(transparent)]
    Register(#[from] RegisterStoreError),
    #[error(transparent)]
    Build(#[from] sorcha_primitives::DocketBuildError),
}

/// Builds at most one candidate docket for `register_id`, or `None` in
/// steady state when there is nothing to build and the register already
/// has its genesis docket.
///
/// §4.7: "An empty tick produces no docket in steady state, except when
/// `register.height == 0`: the very first tick after register creation
/// builds an empty genesis docket (version 0) unconditionally."
pub fn build_candidate(
    register_id: &RegisterId,
    register_store: &RegisterStore,
    verified_queue: &VerifiedQueue,
    max_transactions: usize,
) -> Result<Option<CandidateDocket>, DocketBuilderError> {
    let register = register_store
        .get_register(register_id)?
        .ok_or_else(|| RegisterStoreError::NotFound(register_id.clone()))?;

    if register.height == 0 {
        let docket = Docket::build(register_id.clone(), 0, vec![], None, sorcha_primitives::now_micros())?;
        return Ok(Some(CandidateDocket {
            docket,
            transactions: Vec::new(),
        }));
    }

    let pending = verified_queue.drain(register_id, max_transactions);
    if pending.is_empty() {
        return Ok(None);
    }

    let previous_docket_id = register_store
        .get_docket_by_version(register_id, register.height - 1)?
        .map(|d| d.docket_id)
        .unwrap_or_else(|| DocketId::from(""));

    let tx_ids = pending.iter().map(|v| v.tx_id().clone()).collect();
    let docket = Docket::build(
        register_id.clone(),
        register.height,
        tx_ids,
        Some(previous_docket_id),
        sorcha_primitives::now_micros(),
    )?;

    Ok(Some(CandidateDocket {
        docket,
        transactions: pending,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sorcha_eventsink::NullEventSink;
    use sorcha_primitives::{now_micros, Algorithm, Payloads, Register, RegisterId, TenantId, Transaction, TxId, VerifiedTransaction, GENESIS_BLUEPRINT_ID};
    use sorcha_register::RegisterStoreConfig;
    use sorcha_subsystem_util::Storage;
    use std::sync::Arc;

    fn new_store_with_register(id: &str) -> (RegisterStore, RegisterId) {
        let store = RegisterStore::new(
            RegisterStoreConfig::default(),
            Storage::open_memory(sorcha_register::keys::NUM_COLUMNS),
            Arc::new(NullEventSink),
        );
        let register = Register::new(RegisterId::from(id), "n".into(), TenantId::from("t1"), false, now_micros()).unwrap();
        let genesis_tx = Transaction {
            tx_id: TxId::from("genesis-tx"),
            register_id: register.register_id.clone(),
            blueprint_id: GENESIS_BLUEPRINT_ID.into(),
            previous_transaction_id: None,
            payload_hash: "h".into(),
            payloads: Payloads::new(),
            sender_wallet: "owner".into(),
            signature: vec![],
            public_key: vec![],
            algorithm: Algorithm::Ed25519,
            submitted_at: now_micros(),
        };
        let register_id = register.register_id.clone();
        store.create(register, genesis_tx).unwrap();
        (store, register_id)
    }

    fn verified(register_id: &RegisterId, tx_id: &str, verified_at: i64) -> VerifiedTransaction {
        VerifiedTransaction {
            transaction: Transaction {
                tx_id: TxId::from(tx_id),
                register_id: register_id.clone(),
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
    fn first_tick_on_fresh_register_builds_unconditional_genesis_docket() {
        let (store, register_id) = new_store_with_register("00112233445566778899aabbccddeeff");
        let queue = VerifiedQueue::new();

        let candidate = build_candidate(&register_id, &store, &queue, 500).unwrap().unwrap();
        assert_eq!(candidate.docket.docket_version, 0);
        assert!(candidate.docket.tx_ids.is_empty());
        assert!(candidate.transactions.is_empty());
    }

    #[test]
    fn empty_tick_after_genesis_produces_no_docket() {
        let (store, register_id) = new_store_with_register("00112233445566778899aabbccddeeff");
        let queue = VerifiedQueue::new();

        let genesis = build_candidate(&register_id, &store, &queue, 500).unwrap().unwrap();
        store.append_docket(genesis.docket).unwrap();

        assert!(build_candidate(&register_id, &store, &queue, 500).unwrap().is_none());
    }

    #[test]
    fn pending_verified_transactions_are_packed_into_the_next_docket() {
        let (store, register_id) = new_store_with_register("00112233445566778899aabbccddeeff");
        let queue = VerifiedQueue::new();

        let genesis = build_candidate(&register_id, &store, &queue, 500).unwrap().unwrap();
        let genesis_id = genesis.docket.docket_id.clone();
        store.append_docket(genesis.docket).unwrap();

        queue.push(verified(&register_id, "tx2", 10));
        queue.push(verified(&register_id, "tx1", 10));

        let candidate = build_candidate(&register_id, &store, &queue, 500).unwrap().unwrap();
        assert_eq!(candidate.docket.docket_version, 1);
        assert_eq!(candidate.docket.previous_docket_id, Some(genesis_id));
        assert_eq!(
            candidate.docket.tx_ids,
            vec![TxId::from("tx1"), TxId::from("tx2")]
        );
        assert_eq!(candidate.transactions.len(), 2);
    }

    #[test]
    fn size_cap_limits_a_single_docket() {
        let (store, register_id) = new_store_with_register("00112233445566778899aabbccddeeff");
        let queue = VerifiedQueue::new();
        let genesis = build_candidate(&register_id, &store, &queue, 500).unwrap().unwrap();
        store.append_docket(genesis.docket).unwrap();

        for i in 0..5 {
            queue.push(verified(&register_id, &format!("tx{i}"), i as i64));
        }
        let candidate = build_candidate(&register_id, &store, &queue, 2).unwrap().unwrap();
        assert_eq!(candidate.docket.tx_ids.len(), 2);
        assert_eq!(queue.pending_count(&register_id), 3);
    }
}
