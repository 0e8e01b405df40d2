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

//! Commit stage (§4.7 "Commit"): persists an approved docket and its
//! transactions atomically via the Register Store, then emits the
//! `docket.confirmed` / `transaction.confirmed` domain events. Retry and
//! poison-queue bookkeeping after a failed attempt live in
//! `ValidatorPipeline` (`lib.rs`), which owns the per-`tx_id` attempt
//! counters across repeated commit attempts; this module only performs
//! one attempt and reports success or failure.

use sorcha_eventsink::{DomainEvent, EventSink};
use sorcha_primitives::Docket;
use sorcha_register::RegisterStore;

use crate::docket_builder::CandidateDocket;
use crate::error::PipelineError;

/// Stores every transaction the docket carries, appends the docket
/// (atomic with the register's height increment), then emits events.
/// A failure partway through leaves the register store exactly as it
/// was before this call: `append_docket` is the only state-changing
/// step that can fail after transactions are written, and since
/// `store_transaction` is idempotent (same `tx_id`, same bytes) a
/// retried attempt simply rewrites the same rows.
pub async fn commit(
    candidate: CandidateDocket,
    approved_docket: Docket,
    register_store: &RegisterStore,
    event_sink: &dyn EventSink,
) -> Result<(), PipelineError> {
    for verified in &candidate.transactions {
        register_store.store_transaction(&verified.transaction)?;
    }

    register_store.append_docket(approved_docket.clone())?;

    let _ = event_sink
        .emit(DomainEvent::DocketConfirmed {
            docket_id: approved_docket.docket_id.clone(),
            register_id: approved_docket.register_id.clone(),
            docket_version: approved_docket.docket_version,
            tx_ids: approved_docket.tx_ids.clone(),
        })
        .await;

    for tx_id in &approved_docket.tx_ids {
        let _ = event_sink
            .emit(DomainEvent::TransactionConfirmed {
                tx_id: tx_id.clone(),
                register_id: approved_docket.register_id.clone(),
                docket_id: approved_docket.docket_id.clone(),
                docket_version: approved_docket.docket_version,
            })
            .await;
    }

    let _ = event_sink
        .emit(DomainEvent::RegisterHeightUpdated {
            register_id: approved_docket.register_id.clone(),
            height: approved_docket.docket_version + 1,
        })
        .await;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sorcha_eventsink::NullEventSink;
    use sorcha_primitives::{now_micros, Algorithm, Payloads, Register, RegisterId, TenantId, Transaction, TxId, VerifiedTransaction, GENESIS_BLUEPRINT_ID};
    use sorcha_register::RegisterStoreConfig;
    use sorcha_subsystem_util::Storage;
    use std::sync::Arc;

    fn store_with_fresh_register(id: &str) -> (RegisterStore, RegisterId) {
        let store = RegisterStore::new(
            RegisterStoreConfig::default(),
            Storage::open_memory(sorcha_register::keys::NUM_COLUMNS),
            Arc::new(NullEventSink),
        );
        let register = Register::new(RegisterId::from(id), "n".into(), TenantId::from("t1"), false, now_micros()).unwrap();
        let register_id = register.register_id.clone();
        let genesis_tx = Transaction {
            tx_id: TxId::from("genesis-tx"),
            register_id: register_id.clone(),
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
        store.create(register, genesis_tx).unwrap();
        (store, register_id)
    }

    #[tokio::test]
    async fn commits_genesis_docket_and_advances_height() {
        let (store, register_id) = store_with_fresh_register("00112233445566778899aabbccddeeff");
        let docket = Docket::build(register_id.clone(), 0, vec![], None, now_micros()).unwrap();
        let candidate = CandidateDocket { docket: docket.clone(), transactions: vec![] };

        commit(candidate, docket, &store, &NullEventSink).await.unwrap();
        assert_eq!(store.get_register(&register_id).unwrap().unwrap().height, 1);
    }

    #[tokio::test]
    async fn commits_docket_with_transactions_and_stores_each() {
        let (store, register_id) = store_with_fresh_register("00112233445566778899aabbccddeeff");
        let genesis = Docket::build(register_id.clone(), 0, vec![], None, now_micros()).unwrap();
        store.append_docket(genesis.clone()).unwrap();

        let verified_tx = VerifiedTransaction {
            transaction: Transaction {
                tx_id: TxId::from("tx1"),
                register_id: register_id.clone(),
                blueprint_id: "bp".into(),
                previous_transaction_id: None,
                payload_hash: "h".into(),
                payloads: Payloads::new(),
                sender_wallet: "owner".into(),
                signature: vec![],
                public_key: vec![],
                algorithm: Algorithm::Ed25519,
                submitted_at: 0,
            },
            verified_at: 0,
            blueprint_snapshot_id: "bp@1".into(),
        };
        let docket = Docket::build(
            register_id.clone(),
            1,
            vec![TxId::from("tx1")],
            Some(genesis.docket_id.clone()),
            now_micros(),
        )
        .unwrap();
        let candidate = CandidateDocket { docket: docket.clone(), transactions: vec![verified_tx] };

        commit(candidate, docket, &store, &NullEventSink).await.unwrap();
        assert!(store.get_transaction(&register_id, &TxId::from("tx1")).unwrap().is_some());
        assert_eq!(store.get_register(&register_id).unwrap().unwrap().height, 2);
    }
}
