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

//! The single storage capability every durable component (§9 design note
//! "a single Storage capability, injected, never a module-level global")
//! is built on: a column-oriented key/value database, backed by RocksDB
//! in production and an in-memory implementation in tests, exactly as the
//! register/peer availability stores in the retrieval pack are built on
//! `kvdb` + `kvdb-rocksdb` + `kvdb-memorydb`.

use kvdb::{DBTransaction, KeyValueDB};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("encoding error: {0}")]
    Encoding(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// A thin, column-aware wrapper over `dyn KeyValueDB`. Each owning crate
/// defines its own column indices as `const`s and its own key encodings;
/// this type only owns the database handle and the encode/decode helpers
/// shared by all of them.
#[derive(Clone)]
pub struct Storage {
    db: Arc<dyn KeyValueDB>,
}

impl Storage {
    pub fn new(db: Arc<dyn KeyValueDB>) -> Self {
        Self { db }
    }

    /// Opens (creating if absent) a RocksDB-backed store at `path` with
    /// `num_columns` columns.
    pub fn open_rocksdb(path: &Path, num_columns: u32) -> StorageResult<Self> {
        let config = kvdb_rocksdb::DatabaseConfig::with_columns(num_columns);
        let db = kvdb_rocksdb::Database::open(&config, path)?;
        Ok(Self::new(Arc::new(db)))
    }

    /// An in-memory store for unit and integration tests.
    pub fn open_memory(num_columns: u32) -> Self {
        Self::new(Arc::new(kvdb_memorydb::create(num_columns)))
    }

    pub fn get(&self, col: u32, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        Ok(self.db.get(col, key)?)
    }

    pub fn iter_prefix<'a>(
        &'a self,
        col: u32,
        prefix: &'a [u8],
    ) -> impl Iterator<Item = (Vec<u8>, Vec<u8>)> + 'a {
        self.db
            .iter_with_prefix(col, prefix)
            .map(|(k, v)| (k.into_vec(), v.into_vec()))
    }

    pub fn write(&self, txn: DBTransaction) -> StorageResult<()> {
        Ok(self.db.write(txn)?)
    }

    pub fn transaction(&self) -> DBTransaction {
        self.db.transaction()
    }

    /// MessagePack-encodes `value` (§3.1 canonical encoding) for storage.
    pub fn encode<T: serde::Serialize>(value: &T) -> StorageResult<Vec<u8>> {
        rmp_serde::to_vec(value).map_err(|e| StorageError::Encoding(e.to_string()))
    }

    pub fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> StorageResult<T> {
        rmp_serde::from_slice(bytes).map_err(|e| StorageError::Encoding(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Thing {
        a: u32,
        b: String,
    }

    #[test]
    fn roundtrips_through_memory_backend() {
        let storage = Storage::open_memory(1);
        let thing = Thing { a: 7, b: "hi".into() };
        let mut txn = storage.transaction();
        txn.put(0, b"k", &Storage::encode(&thing).unwrap());
        storage.write(txn).unwrap();

        let raw = storage.get(0, b"k").unwrap().unwrap();
        let decoded: Thing = Storage::decode(&raw).unwrap();
        assert_eq!(decoded, thing);
    }

    #[test]
    fn prefix_iteration_only_yields_matching_keys() {
        let storage = Storage::open_memory(1);
        let mut txn = storage.transaction();
        txn.put(0, b"reg:1:a", b"1");
        txn.put(0, b"reg:1:b", b"2");
        txn.put(0, b"reg:2:a", b"3");
        storage.write(txn).unwrap();

        let got: Vec<_> = storage.iter_prefix(0, b"reg:1:").collect();
        assert_eq!(got.len(), 2);
    }
}
