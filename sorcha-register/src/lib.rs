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

//! The Register Store (§4.8): one append-only log of transactions, one
//! append-only log of dockets, an atomic height counter, and mutable
//! metadata, per register. The small registry namespace (§6 "Persisted
//! state layout") holds one metadata entry per register for enumeration;
//! physical per-register isolation is a key-prefix discipline over the
//! same underlying `Storage` (see `keys`).
//!
//! `append_docket` is the one operation requiring the §5 "advisory lock
//! per register protects the height-increment + docket-append as an
//! atomic pair" discipline: a per-register `parking_lot::Mutex` guards
//! the check-then-write, and the write itself lands in a single
//! `kvdb` transaction so a crash mid-commit never leaves the height
//! counter and the docket log disagreeing (§7 "No partial commits are
//! ever visible").

mod config;
pub mod control;
pub mod keys;
pub mod poison;

pub use config::RegisterStoreConfig;
pub use control::{ControlRecordError, ControlRecordResult, ControlRecordStore};
pub use poison::PoisonedTransaction;

use parking_lot::Mutex;
use sorcha_eventsink::{DomainEvent, EventSink};
use sorcha_primitives::{Docket, Register, RegisterId, RegisterStatus, TenantId, Transaction, TxId};
use sorcha_subsystem_util::{Storage, StorageError};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

const LOG_TARGET: &str = "register_store";

#[derive(Debug, Error)]
pub enum RegisterStoreError {
    #[error("register {0} already exists")]
    AlreadyExists(RegisterId),
    #[error("register {0} not found")]
    NotFound(RegisterId),
    #[error("tenant {0} is at its {1}-register cap")]
    TenantCapExceeded(TenantId, usize),
    #[error("status transition out of Deleted is not permitted")]
    InvalidStatusTransition,
    #[error("docket version {got} does not match register height {expected}")]
    HeightMismatch { expected: u64, got: u64 },
    #[error("docket previous_docket_id does not match the id committed at version {0}")]
    PreviousDocketMismatch(u64),
    #[error("docket merkle root does not verify against its own tx_ids")]
    MerkleMismatch,
    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub type RegisterStoreResult<T> = Result<T, RegisterStoreError>;

/// Per-register advisory lock table. Locks are created lazily and kept
/// for the process lifetime; cross-register operations never hold more
/// than one such lock at a time (§5).
struct LockTable {
    locks: Mutex<HashMap<RegisterId, Arc<Mutex<()>>>>,
}

impl LockTable {
    fn new() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }

    fn lock_for(&self, register_id: &RegisterId) -> Arc<Mutex<()>> {
        let mut table = self.locks.lock();
        table
            .entry(register_id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

pub struct RegisterStore {
    config: RegisterStoreConfig,
    storage: Storage,
    locks: LockTable,
    event_sink: Arc<dyn EventSink>,
}

impl RegisterStore {
    /// `event_sink` is where `create` and `set_status` publish
    /// `register.created` / `register.status_changed` (§6) — the two
    /// produced streams §4.8 scopes to this store rather than to the
    /// validator commit stage, which owns the other four.
    pub fn new(config: RegisterStoreConfig, storage: Storage, event_sink: Arc<dyn EventSink>) -> Self {
        Self {
            config,
            storage,
            locks: LockTable::new(),
            event_sink,
        }
    }

    fn get_register_raw(&self, register_id: &RegisterId) -> RegisterStoreResult<Option<Register>> {
        match self.storage.get(keys::COL_REGISTRY, &keys::registry_key(register_id))? {
            Some(bytes) => Ok(Some(Storage::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn get_register(&self, register_id: &RegisterId) -> RegisterStoreResult<Option<Register>> {
        self.get_register_raw(register_id)
    }

    /// Registry-namespace enumeration (§4.8, §6).
    pub fn list_registers(&self) -> RegisterStoreResult<Vec<Register>> {
        self.storage
            .iter_prefix(keys::COL_REGISTRY, b"")
            .map(|(_, v)| Storage::decode(&v).map_err(RegisterStoreError::Storage))
            .collect()
    }

    pub fn count_for_tenant(&self, tenant_id: &TenantId) -> RegisterStoreResult<usize> {
        Ok(self
            .list_registers()?
            .into_iter()
            .filter(|r| &r.tenant_id == tenant_id)
            .count())
    }

    /// Creates a register and writes its genesis control transaction
    /// directly, bypassing the validator pipeline (§9.1 open question 1
    /// resolution). The genesis docket itself (version 0, empty) is
    /// built later by the docket builder's first tick once
    /// `register.height == 0` is observed.
    pub fn create(&self, register: Register, genesis_tx: Transaction) -> RegisterStoreResult<()> {
        if self.get_register_raw(&register.register_id)?.is_some() {
            return Err(RegisterStoreError::AlreadyExists(register.register_id));
        }
        let existing = self.count_for_tenant(&register.tenant_id)?;
        if existing >= self.config.max_registers_per_tenant {
            return Err(RegisterStoreError::TenantCapExceeded(
                register.tenant_id,
                self.config.max_registers_per_tenant,
            ));
        }

        let mut txn = self.storage.transaction();
        txn.put(
            keys::COL_REGISTRY,
            &keys::registry_key(&register.register_id),
            &Storage::encode(&register)?,
        );
        txn.put(
            keys::COL_TRANSACTIONS,
            &keys::tx_key(&register.register_id, &genesis_tx.tx_id),
            &Storage::encode(&genesis_tx)?,
        );
        txn.put(
            keys::COL_TX_BY_TIME,
            &keys::tx_by_time_key(&register.register_id, genesis_tx.submitted_at, &genesis_tx.tx_id),
            genesis_tx.tx_id.as_str().as_bytes(),
        );
        self.storage.write(txn)?;
        info!(target: LOG_TARGET, register_id = %register.register_id, tenant_id = %register.tenant_id, "register created");
        let _ = futures::executor::block_on(self.event_sink.emit(DomainEvent::RegisterCreated {
            register_id: register.register_id,
            tenant_id: register.tenant_id,
            name: register.name,
            created_at: register.created_at,
        }));
        Ok(())
    }

    /// One-way status transitions (`Deleted` is terminal, §3 Register
    /// invariants).
    pub fn set_status(&self, register_id: &RegisterId, new_status: RegisterStatus) -> RegisterStoreResult<()> {
        let guard = self.locks.lock_for(register_id);
        let _held = guard.lock();
        let mut register = self
            .get_register_raw(register_id)?
            .ok_or_else(|| RegisterStoreError::NotFound(register_id.clone()))?;
        if !register.status.can_transition_to(new_status) {
            return Err(RegisterStoreError::InvalidStatusTransition);
        }
        let old_status = register.status;
        register.status = new_status;
        self.storage.write({
            let mut txn = self.storage.transaction();
            txn.put(keys::COL_REGISTRY, &keys::registry_key(register_id), &Storage::encode(&register)?);
            txn
        })?;
        info!(target: LOG_TARGET, %register_id, ?old_status, ?new_status, "register status changed");
        let _ = futures::executor::block_on(self.event_sink.emit(DomainEvent::RegisterStatusChanged {
            register_id: register_id.clone(),
            old_status: format!("{old_status:?}"),
            new_status: format!("{new_status:?}"),
        }));
        Ok(())
    }

    /// `Deleted` status is terminal and the register's logs are retained
    /// forever (§4.8 "never hard-delete").
    pub fn soft_delete(&self, register_id: &RegisterId) -> RegisterStoreResult<()> {
        self.set_status(register_id, RegisterStatus::Deleted)
    }

    /// `true` if the register has ever had a committed docket beyond
    /// genesis or holds any transaction besides its genesis control
    /// record — the guard `sorcha-quorum` consults before an Owner
    /// removal (§4.9).
    pub fn has_transactions(&self, register_id: &RegisterId) -> RegisterStoreResult<bool> {
        let count = self
            .storage
            .iter_prefix(keys::COL_TRANSACTIONS, &keys::register_prefix(register_id))
            .count();
        Ok(count > 1)
    }

    pub fn get_transaction(&self, register_id: &RegisterId, tx_id: &TxId) -> RegisterStoreResult<Option<Transaction>> {
        match self.storage.get(keys::COL_TRANSACTIONS, &keys::tx_key(register_id, tx_id))? {
            Some(bytes) => Ok(Some(Storage::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn get_docket_by_version(&self, register_id: &RegisterId, version: u64) -> RegisterStoreResult<Option<Docket>> {
        match self
            .storage
            .get(keys::COL_DOCKETS, &keys::docket_version_key(register_id, version))?
        {
            Some(bytes) => Ok(Some(Storage::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// All transactions included in dockets committed after `version`,
    /// in docket order then tx order within each docket — the shape a
    /// catch-up pull (§4.6) needs.
    pub fn get_transactions_since(&self, register_id: &RegisterId, version: u64) -> RegisterStoreResult<Vec<Transaction>> {
        let register = self
            .get_register_raw(register_id)?
            .ok_or_else(|| RegisterStoreError::NotFound(register_id.clone()))?;
        let mut out = Vec::new();
        for v in (version + 1)..register.height {
            let Some(docket) = self.get_docket_by_version(register_id, v)? else {
                continue;
            };
            for tx_id in &docket.tx_ids {
                if let Some(tx) = self.get_transaction(register_id, tx_id)? {
                    out.push(tx);
                }
            }
        }
        Ok(out)
    }

    /// Appends `docket` under the register's advisory lock, verifying
    /// `docket.version == current_height` and that `previous_docket_id`
    /// matches the prior version's id before committing (§4.8, §8
    /// property 2). The height increment and the docket append land in
    /// one storage transaction.
    pub fn append_docket(&self, docket: Docket) -> RegisterStoreResult<()> {
        let guard = self.locks.lock_for(&docket.register_id);
        let _held = guard.lock();

        if !docket.merkle_root_is_valid() {
            return Err(RegisterStoreError::MerkleMismatch);
        }

        let mut register = self
            .get_register_raw(&docket.register_id)?
            .ok_or_else(|| RegisterStoreError::NotFound(docket.register_id.clone()))?;

        if docket.docket_version != register.height {
            return Err(RegisterStoreError::HeightMismatch {
                expected: register.height,
                got: docket.docket_version,
            });
        }

        if docket.docket_version > 0 {
            let previous = self.get_docket_by_version(&docket.register_id, docket.docket_version - 1)?;
            let previous_id = previous.map(|d| d.docket_id);
            if previous_id != docket.previous_docket_id {
                return Err(RegisterStoreError::PreviousDocketMismatch(docket.docket_version - 1));
            }
        }

        register.height += 1;

        let mut committed = docket;
        committed.committed_at = Some(sorcha_primitives::now_micros());

        let mut txn = self.storage.transaction();
        txn.put(
            keys::COL_DOCKETS,
            &keys::docket_version_key(&committed.register_id, committed.docket_version),
            &Storage::encode(&committed)?,
        );
        txn.put(
            keys::COL_DOCKET_BY_ID,
            &keys::docket_by_id_key(&committed.register_id, committed.docket_id.as_str()),
            &committed.docket_version.to_be_bytes(),
        );
        txn.put(
            keys::COL_REGISTRY,
            &keys::registry_key(&committed.register_id),
            &Storage::encode(&register)?,
        );
        self.storage.write(txn)?;

        info!(target: LOG_TARGET, register_id = %committed.register_id, version = committed.docket_version, tx_count = committed.tx_ids.len(), "docket committed");
        Ok(())
    }

    /// Persists a transaction record for a committed docket. Called by
    /// the validator's commit stage alongside `append_docket` for every
    /// `tx_id` the docket carries.
    pub fn store_transaction(&self, tx: &Transaction) -> RegisterStoreResult<()> {
        let mut txn = self.storage.transaction();
        txn.put(keys::COL_TRANSACTIONS, &keys::tx_key(&tx.register_id, &tx.tx_id), &Storage::encode(tx)?);
        txn.put(
            keys::COL_TX_BY_TIME,
            &keys::tx_by_time_key(&tx.register_id, tx.submitted_at, &tx.tx_id),
            tx.tx_id.as_str().as_bytes(),
        );
        self.storage.write(txn)?;
        Ok(())
    }

    /// Pushes a transaction that repeatedly failed at commit stage into
    /// the poison queue for operator inspection (§7). Never auto-retried.
    pub fn push_poison(&self, poisoned: PoisonedTransaction) -> RegisterStoreResult<()> {
        warn!(target: LOG_TARGET, tx_id = %poisoned.tx_id, register_id = %poisoned.register_id, attempts = poisoned.attempts, "transaction moved to poison queue");
        let mut txn = self.storage.transaction();
        txn.put(
            keys::COL_POISON,
            &keys::poison_key(&poisoned.register_id, &poisoned.tx_id),
            &Storage::encode(&poisoned)?,
        );
        self.storage.write(txn)?;
        Ok(())
    }

    pub fn list_poisoned(&self, register_id: &RegisterId) -> RegisterStoreResult<Vec<PoisonedTransaction>> {
        self.storage
            .iter_prefix(keys::COL_POISON, &keys::register_prefix(register_id))
            .map(|(_, v)| Storage::decode(&v).map_err(RegisterStoreError::Storage))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sorcha_eventsink::NullEventSink;
    use sorcha_primitives::{now_micros, Algorithm, Payloads, RegisterId, TenantId, TxId, GENESIS_BLUEPRINT_ID};
    use sorcha_primitives::hashing::sha256_hex;

    fn store() -> RegisterStore {
        RegisterStore::new(
            RegisterStoreConfig::default(),
            Storage::open_memory(keys::NUM_COLUMNS),
            Arc::new(NullEventSink),
        )
    }

    fn new_register(id: &str, tenant: &str) -> Register {
        Register::new(RegisterId::from(id), "n".into(), TenantId::from(tenant), false, now_micros()).unwrap()
    }

    fn genesis_tx(register_id: &RegisterId) -> Transaction {
        let payload_hash = sha256_hex(b"genesis");
        let tx_id = TxId::from(sha256_hex(format!("{register_id}:genesis").as_bytes()));
        Transaction {
            tx_id,
            register_id: register_id.clone(),
            blueprint_id: GENESIS_BLUEPRINT_ID.into(),
            previous_transaction_id: None,
            payload_hash,
            payloads: Payloads::new(),
            sender_wallet: "owner".into(),
            signature: vec![],
            public_key: vec![],
            algorithm: Algorithm::Ed25519,
            submitted_at: now_micros(),
        }
    }

    #[test]
    fn create_rejects_duplicate_register() {
        let store = store();
        let register = new_register("00112233445566778899aabbccddeeff", "t1");
        let genesis = genesis_tx(&register.register_id);
        store.create(register.clone(), genesis.clone()).unwrap();
        let err = store.create(register.clone(), genesis).unwrap_err();
        assert!(matches!(err, RegisterStoreError::AlreadyExists(_)));
    }

    #[test]
    fn tenant_cap_is_enforced() {
        let store = RegisterStore::new(
            RegisterStoreConfig { max_registers_per_tenant: 1 },
            Storage::open_memory(keys::NUM_COLUMNS),
            Arc::new(NullEventSink),
        );
        let r1 = new_register("00000000000000000000000000000001", "t1");
        store.create(r1.clone(), genesis_tx(&r1.register_id)).unwrap();
        let r2 = new_register("00000000000000000000000000000002", "t1");
        let err = store.create(r2.clone(), genesis_tx(&r2.register_id)).unwrap_err();
        assert!(matches!(err, RegisterStoreError::TenantCapExceeded(_, 1)));
    }

    #[test]
    fn append_docket_enforces_monotonic_height_and_chain_integrity() {
        let store = store();
        let register = new_register("00112233445566778899aabbccddeeff", "t1");
        store.create(register.clone(), genesis_tx(&register.register_id)).unwrap();

        let genesis_docket = Docket::build(register.register_id.clone(), 0, vec![], None, now_micros()).unwrap();
        store.append_docket(genesis_docket.clone()).unwrap();
        assert_eq!(store.get_register(&register.register_id).unwrap().unwrap().height, 1);

        let next = Docket::build(
            register.register_id.clone(),
            1,
            vec![TxId::from("tx1")],
            Some(genesis_docket.docket_id.clone()),
            now_micros(),
        )
        .unwrap();
        store.append_docket(next).unwrap();
        assert_eq!(store.get_register(&register.register_id).unwrap().unwrap().height, 2);

        // Wrong previous id is rejected.
        let bad = Docket::build(
            register.register_id.clone(),
            2,
            vec![],
            Some(sorcha_primitives::DocketId::from("not-the-right-one")),
            now_micros(),
        )
        .unwrap();
        let err = store.append_docket(bad).unwrap_err();
        assert!(matches!(err, RegisterStoreError::PreviousDocketMismatch(1)));

        // Skipping a version is rejected.
        let skip = Docket::build(
            register.register_id.clone(),
            5,
            vec![],
            Some(sorcha_primitives::DocketId::from("whatever")),
            now_micros(),
        )
        .unwrap();
        let err = store.append_docket(skip).unwrap_err();
        assert!(matches!(err, RegisterStoreError::HeightMismatch { expected: 2, got: 5 }));
    }

    #[test]
    fn status_transitions_out_of_deleted_are_rejected() {
        let store = store();
        let register = new_register("00112233445566778899aabbccddeeff", "t1");
        store.create(register.clone(), genesis_tx(&register.register_id)).unwrap();
        store.set_status(&register.register_id, RegisterStatus::Deleted).unwrap();
        let err = store
            .set_status(&register.register_id, RegisterStatus::Online)
            .unwrap_err();
        assert!(matches!(err, RegisterStoreError::InvalidStatusTransition));
    }

    #[test]
    fn get_transactions_since_collects_across_dockets_in_order() {
        let store = store();
        let register = new_register("00112233445566778899aabbccddeeff", "t1");
        store.create(register.clone(), genesis_tx(&register.register_id)).unwrap();

        let genesis_docket = Docket::build(register.register_id.clone(), 0, vec![], None, now_micros()).unwrap();
        store.append_docket(genesis_docket.clone()).unwrap();

        let tx1 = genesis_tx(&register.register_id);
        let mut tx1 = tx1;
        tx1.tx_id = TxId::from("tx1");
        tx1.blueprint_id = "bp".into();
        store.store_transaction(&tx1).unwrap();
        let docket1 = Docket::build(
            register.register_id.clone(),
            1,
            vec![tx1.tx_id.clone()],
            Some(genesis_docket.docket_id.clone()),
            now_micros(),
        )
        .unwrap();
        store.append_docket(docket1).unwrap();

        let since = store.get_transactions_since(&register.register_id, 0).unwrap();
        assert_eq!(since.len(), 1);
        assert_eq!(since[0].tx_id, TxId::from("tx1"));
    }

    #[test]
    fn poison_queue_records_and_lists_entries() {
        let store = store();
        let register_id = RegisterId::from("00112233445566778899aabbccddeeff");
        store.push_poison(PoisonedTransaction {
            tx_id: TxId::from("tx1"),
            register_id: register_id.clone(),
            attempts: 5,
            last_error: "commit failed".into(),
            poisoned_at: now_micros(),
        })
        .unwrap();
        let all = store.list_poisoned(&register_id).unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].tx_id, TxId::from("tx1"));
    }

    /// Records every event it receives, so `create`/`set_status` can be
    /// asserted to actually publish `register.created` /
    /// `register.status_changed` (§6) rather than just logging.
    struct RecordingSink {
        events: Mutex<Vec<DomainEvent>>,
    }

    #[async_trait::async_trait]
    impl EventSink for RecordingSink {
        async fn emit(&self, event: DomainEvent) -> Result<(), sorcha_eventsink::EventSinkError> {
            self.events.lock().push(event);
            Ok(())
        }
    }

    #[test]
    fn create_emits_register_created() {
        let sink = Arc::new(RecordingSink { events: Mutex::new(Vec::new()) });
        let store = RegisterStore::new(RegisterStoreConfig::default(), Storage::open_memory(keys::NUM_COLUMNS), sink.clone());
        let register = new_register("00112233445566778899aabbccddeeff", "t1");
        store.create(register.clone(), genesis_tx(&register.register_id)).unwrap();

        let events = sink.events.lock();
        assert_eq!(events.len(), 1);
        match &events[0] {
            DomainEvent::RegisterCreated { register_id, tenant_id, .. } => {
                assert_eq!(register_id, &register.register_id);
                assert_eq!(tenant_id, &register.tenant_id);
            }
            other => panic!("expected RegisterCreated, got {other:?}"),
        }
    }

    #[test]
    fn set_status_emits_register_status_changed() {
        let sink = Arc::new(RecordingSink { events: Mutex::new(Vec::new()) });
        let store = RegisterStore::new(RegisterStoreConfig::default(), Storage::open_memory(keys::NUM_COLUMNS), sink.clone());
        let register = new_register("00112233445566778899aabbccddeeff", "t1");
        store.create(register.clone(), genesis_tx(&register.register_id)).unwrap();
        sink.events.lock().clear();

        store.set_status(&register.register_id, RegisterStatus::Suspended).unwrap();

        let events = sink.events.lock();
        assert_eq!(events.len(), 1);
        match &events[0] {
            DomainEvent::RegisterStatusChanged { register_id, old_status, new_status } => {
                assert_eq!(register_id, &register.register_id);
                assert_eq!(old_status, "Created");
                assert_eq!(new_status, "Suspended");
            }
            other => panic!("expected RegisterStatusChanged, got {other:?}"),
        }
    }
}
