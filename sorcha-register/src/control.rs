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

//! Durable home for a register's Control Record (§4.9): the roster of
//! `Attestation`s a quorum mutation reads and rewrites. One record per
//! register, guarded by the same per-register advisory lock discipline
//! `RegisterStore::append_docket` uses, so a concurrent mutation attempt
//! never interleaves with a read-modify-write (§5).

use parking_lot::Mutex;
use sorcha_primitives::quorum::ControlRecord;
use sorcha_primitives::RegisterId;
use sorcha_subsystem_util::{Storage, StorageError};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

const LOG_TARGET: &str = "control_record_store";

pub const COL_CONTROL: u32 = 0;
pub const CONTROL_NUM_COLUMNS: u32 = 1;

#[derive(Debug, Error)]
pub enum ControlRecordError {
    #[error("control record for register {0} not found")]
    NotFound(RegisterId),
    #[error("control record for register {0} already exists")]
    AlreadyExists(RegisterId),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub type ControlRecordResult<T> = Result<T, ControlRecordError>;

fn control_key(register_id: &RegisterId) -> Vec<u8> {
    register_id.as_str().as_bytes().to_vec()
}

/// Per-register advisory locks, mirroring `RegisterStore`'s lock table:
/// a quorum mutation is read, mutated in place by `sorcha_quorum`, and
/// written back while holding the one lock for that register, so two
/// concurrent mutation attempts against the same register serialize
/// rather than race on a stale roster.
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

/// A dedicated `Storage` (its own column family, separate from the
/// transaction/docket logs) holding exactly one `ControlRecord` per
/// register, keyed by `register_id`.
pub struct ControlRecordStore {
    storage: Storage,
    locks: LockTable,
}

impl ControlRecordStore {
    pub fn new(storage: Storage) -> Self {
        Self {
            storage,
            locks: LockTable::new(),
        }
    }

    fn get_raw(&self, register_id: &RegisterId) -> ControlRecordResult<Option<ControlRecord>> {
        match self.storage.get(COL_CONTROL, &control_key(register_id))? {
            Some(bytes) => Ok(Some(Storage::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn get(&self, register_id: &RegisterId) -> ControlRecordResult<Option<ControlRecord>> {
        self.get_raw(register_id)
    }

    /// Writes the genesis control record for a newly created register.
    /// Rejects overwriting an existing record (§4.9: a register's
    /// control record is created once, at register creation, and
    /// thereafter only mutated via `apply_mutation`).
    pub fn create(&self, record: ControlRecord) -> ControlRecordResult<()> {
        let guard = self.locks.lock_for(&record.register_id);
        let _held = guard.lock();
        if self.get_raw(&record.register_id)?.is_some() {
            return Err(ControlRecordError::AlreadyExists(record.register_id));
        }
        let mut txn = self.storage.transaction();
        txn.put(COL_CONTROL, &control_key(&record.register_id), &Storage::encode(&record)?);
        self.storage.write(txn)?;
        info!(target: LOG_TARGET, register_id = %record.register_id, "control record created");
        Ok(())
    }

    /// Runs `apply` against the current record for `register_id` under
    /// that register's lock, persisting the mutated record only if
    /// `apply` succeeds. `apply` is expected to be
    /// `sorcha_quorum::apply_mutation` partially applied over a single
    /// `MutationKind`; the closure indirection keeps this store ignorant
    /// of quorum arithmetic, the same separation `RegisterStore` keeps
    /// from the validator pipeline that calls it.
    pub fn mutate<E>(
        &self,
        register_id: &RegisterId,
        apply: impl FnOnce(&mut ControlRecord) -> Result<(), E>,
    ) -> ControlRecordResult<Result<(), E>> {
        let guard = self.locks.lock_for(register_id);
        let _held = guard.lock();
        let mut record = self
            .get_raw(register_id)?
            .ok_or_else(|| ControlRecordError::NotFound(register_id.clone()))?;

        if let Err(e) = apply(&mut record) {
            return Ok(Err(e));
        }

        let mut txn = self.storage.transaction();
        txn.put(COL_CONTROL, &control_key(register_id), &Storage::encode(&record)?);
        self.storage.write(txn)?;
        info!(target: LOG_TARGET, register_id = %register_id, attestations = record.attestation_count(), "control record mutated");
        Ok(Ok(()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sorcha_primitives::quorum::{Attestation, Role};
    use sorcha_primitives::{now_micros, RegisterId, TenantId};
    use sorcha_quorum::{apply_mutation, MutationKind};

    fn owner_attestation(subject: &str) -> Attestation {
        Attestation {
            role: Role::Owner,
            subject: subject.into(),
            public_key: vec![1, 2, 3],
            signature: vec![],
            algorithm: "ed25519".into(),
            granted_at: now_micros(),
        }
    }

    fn store() -> ControlRecordStore {
        ControlRecordStore::new(Storage::open_memory(CONTROL_NUM_COLUMNS))
    }

    fn record(register_id: &RegisterId) -> ControlRecord {
        ControlRecord {
            register_id: register_id.clone(),
            name: "n".into(),
            tenant_id: TenantId::from("t1"),
            created_at: now_micros(),
            attestations: vec![owner_attestation("owner-1")],
        }
    }

    #[test]
    fn create_then_get_round_trips() {
        let store = store();
        let register_id = RegisterId::from("r1");
        store.create(record(&register_id)).unwrap();
        let fetched = store.get(&register_id).unwrap().unwrap();
        assert_eq!(fetched.attestations.len(), 1);
    }

    #[test]
    fn create_rejects_duplicate() {
        let store = store();
        let register_id = RegisterId::from("r1");
        store.create(record(&register_id)).unwrap();
        let err = store.create(record(&register_id)).unwrap_err();
        assert!(matches!(err, ControlRecordError::AlreadyExists(_)));
    }

    #[test]
    fn mutate_persists_a_successful_apply_and_rolls_back_a_failed_one() {
        let store = store();
        let register_id = RegisterId::from("r1");
        store.create(record(&register_id)).unwrap();

        let outcome = store
            .mutate(&register_id, |rec| {
                apply_mutation(
                    rec,
                    MutationKind::AddAttestation(owner_attestation("admin-1")),
                    &["owner-1"],
                    false,
                )
                .map(|_| ())
            })
            .unwrap();
        assert!(outcome.is_ok());
        assert_eq!(store.get(&register_id).unwrap().unwrap().attestations.len(), 2);

        let outcome = store
            .mutate(&register_id, |rec| {
                apply_mutation(
                    rec,
                    MutationKind::RevokeAttestation { subject: "owner-1".into() },
                    &["owner-1"],
                    true,
                )
                .map(|_| ())
            })
            .unwrap();
        assert!(outcome.is_err());
        // Rejected mutation (Owner removal blocked while transactions exist)
        // leaves the persisted roster untouched.
        assert_eq!(store.get(&register_id).unwrap().unwrap().attestations.len(), 2);
    }

    #[test]
    fn mutate_against_unknown_register_fails() {
        let store = store();
        let err = store
            .mutate(&RegisterId::from("missing"), |_rec| Ok::<(), sorcha_quorum::QuorumError>(()))
            .unwrap_err();
        assert!(matches!(err, ControlRecordError::NotFound(_)));
    }
}
