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

//! Offline durability for outbound notifications (§4.6 "Offline
//! durability"): a bounded, persistent FIFO so gossip notifications
//! survive a restart; once full, the oldest entry is dropped to make room
//! for the newest.

use parking_lot::Mutex;
use sorcha_connection::MessageEnvelope;
use sorcha_primitives::PeerId;
use sorcha_subsystem_util::{Storage, StorageResult};
use serde::{Deserialize, Serialize};

const COL_QUEUE: u32 = 0;
const COL_META: u32 = 1;
pub const NUM_COLUMNS: u32 = 2;
const SEQ_KEY: &[u8] = b"next_seq";

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QueuedNotification {
    pub peer_id: PeerId,
    pub envelope: MessageEnvelope,
    pub enqueued_at: i64,
}

/// A persisted entry together with the storage key it lives at, so the
/// caller can `remove` it once delivered.
pub type QueueEntry = (Vec<u8>, QueuedNotification);

pub struct OutboundQueue {
    max_queue_size: usize,
    storage: Storage,
    next_seq: Mutex<u64>,
}

impl OutboundQueue {
    pub fn new(max_queue_size: usize, storage: Storage) -> StorageResult<Self> {
        let next_seq = match storage.get(COL_META, SEQ_KEY)? {
            Some(bytes) => u64::from_be_bytes(bytes.as_slice().try_into().unwrap_or_default()),
            None => 0,
        };
        Ok(Self {
            max_queue_size,
            storage,
            next_seq: Mutex::new(next_seq),
        })
    }

    /// Appends a notification; if this pushes the queue past
    /// `max_queue_size`, the oldest entries are dropped (§4.6 "Queue
    /// over-capacity drops oldest").
    pub fn enqueue(&self, peer_id: PeerId, envelope: MessageEnvelope, now: i64) -> StorageResult<()> {
        let seq = {
            let mut guard = self.next_seq.lock();
            let seq = *guard;
            *guard += 1;
            seq
        };
        let record = QueuedNotification {
            peer_id,
            envelope,
            enqueued_at: now,
        };
        let mut txn = self.storage.transaction();
        txn.put(COL_QUEUE, &seq.to_be_bytes(), &Storage::encode(&record)?);
        txn.put(COL_META, SEQ_KEY, &(seq + 1).to_be_bytes());
        self.storage.write(txn)?;
        self.enforce_capacity()
    }

    fn enforce_capacity(&self) -> StorageResult<()> {
        let mut keys: Vec<Vec<u8>> = self.storage.iter_prefix(COL_QUEUE, b"").map(|(k, _)| k).collect();
        if keys.len() <= self.max_queue_size {
            return Ok(());
        }
        keys.sort();
        let overflow = keys.len() - self.max_queue_size;
        let mut txn = self.storage.transaction();
        for key in keys.into_iter().take(overflow) {
            txn.delete(COL_QUEUE, &key);
        }
        self.storage.write(txn)
    }

    /// All currently queued entries, oldest first.
    pub fn drain(&self) -> StorageResult<Vec<QueueEntry>> {
        let mut entries: Vec<QueueEntry> = self
            .storage
            .iter_prefix(COL_QUEUE, b"")
            .map(|(k, v)| Storage::decode(&v).map(|record| (k, record)))
            .collect::<StorageResult<Vec<_>>>()?;
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(entries)
    }

    pub fn remove(&self, key: &[u8]) -> StorageResult<()> {
        let mut txn = self.storage.transaction();
        txn.delete(COL_QUEUE, key);
        self.storage.write(txn)
    }

    pub fn len(&self) -> usize {
        self.storage.iter_prefix(COL_QUEUE, b"").count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sorcha_connection::{MessageEnvelope, MessageKind};

    fn envelope(tag: &str) -> MessageEnvelope {
        MessageEnvelope::new(MessageKind::TransactionNotify, tag, vec![1, 2, 3])
    }

    #[test]
    fn enqueue_and_drain_preserves_fifo_order() {
        let queue = OutboundQueue::new(10, Storage::open_memory(NUM_COLUMNS)).unwrap();
        queue.enqueue(PeerId::from("p1"), envelope("a"), 0).unwrap();
        queue.enqueue(PeerId::from("p1"), envelope("b"), 1).unwrap();
        let drained = queue.drain().unwrap();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].1.envelope.correlation_id, "a");
        assert_eq!(drained[1].1.envelope.correlation_id, "b");
    }

    #[test]
    fn over_capacity_drops_oldest_entries() {
        let queue = OutboundQueue::new(2, Storage::open_memory(NUM_COLUMNS)).unwrap();
        queue.enqueue(PeerId::from("p1"), envelope("a"), 0).unwrap();
        queue.enqueue(PeerId::from("p1"), envelope("b"), 1).unwrap();
        queue.enqueue(PeerId::from("p1"), envelope("c"), 2).unwrap();
        let drained = queue.drain().unwrap();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].1.envelope.correlation_id, "b");
        assert_eq!(drained[1].1.envelope.correlation_id, "c");
    }

    #[test]
    fn remove_deletes_a_specific_entry() {
        let queue = OutboundQueue::new(10, Storage::open_memory(NUM_COLUMNS)).unwrap();
        queue.enqueue(PeerId::from("p1"), envelope("a"), 0).unwrap();
        let drained = queue.drain().unwrap();
        queue.remove(&drained[0].0).unwrap();
        assert!(queue.is_empty());
    }
}
