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

//! Checkpoint sync (§4.6 "Checkpoint sync (catch-up)"): a per-subscription
//! durable cursor over a register's docket chain, swept periodically so
//! only checkpoints due for a catch-up pull issue a batched request.

use parking_lot::Mutex;
use sorcha_primitives::{PeerId, RegisterId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Tracks catch-up progress for one local subscription against one
/// source peer (§3/§4.6 `SyncCheckpoint`).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SyncCheckpoint {
    pub peer_id: PeerId,
    pub register_id: RegisterId,
    pub current_version: u64,
    pub last_sync_time: i64,
    pub total_items: u64,
    pub source_peer_id: PeerId,
    pub next_sync_due: i64,
}

impl SyncCheckpoint {
    pub fn new(peer_id: PeerId, register_id: RegisterId, source_peer_id: PeerId, now: i64) -> Self {
        Self {
            peer_id,
            register_id,
            current_version: 0,
            last_sync_time: now,
            total_items: 0,
            source_peer_id,
            next_sync_due: now,
        }
    }

    pub fn is_sync_due(&self, now: i64) -> bool {
        now >= self.next_sync_due
    }

    /// Advances the cursor after a successful pull and schedules the next
    /// sweep (§4.6 "On success, checkpoint advances and the next sweep is
    /// scheduled").
    pub fn advance(&mut self, current_version: u64, total_items: u64, now: i64, interval_micros: i64) {
        self.current_version = current_version;
        self.total_items = total_items;
        self.last_sync_time = now;
        self.next_sync_due = now + interval_micros;
    }

    /// Retargets the checkpoint at a different source peer without losing
    /// cursor position, e.g. after the original source stops serving full
    /// replicas.
    pub fn retarget(&mut self, source_peer_id: PeerId) {
        self.source_peer_id = source_peer_id;
    }
}

/// Holds one checkpoint per register, swept by `due` on the
/// `periodic_sync_interval_micros` cadence (§4.6).
pub struct CheckpointStore {
    checkpoints: Mutex<HashMap<RegisterId, SyncCheckpoint>>,
}

impl CheckpointStore {
    pub fn new() -> Self {
        Self {
            checkpoints: Mutex::new(HashMap::new()),
        }
    }

    pub fn upsert(&self, checkpoint: SyncCheckpoint) {
        self.checkpoints.lock().insert(checkpoint.register_id.clone(), checkpoint);
    }

    pub fn get(&self, register_id: &RegisterId) -> Option<SyncCheckpoint> {
        self.checkpoints.lock().get(register_id).cloned()
    }

    /// Checkpoints due for a catch-up pull at `now` (§4.6 "Periodic sweep
    /// picks checkpoints where `IsSyncDue()`").
    pub fn due(&self, now: i64) -> Vec<SyncCheckpoint> {
        self.checkpoints
            .lock()
            .values()
            .filter(|c| c.is_sync_due(now))
            .cloned()
            .collect()
    }
}

impl Default for CheckpointStore {
    fn default() -> Self {
        Self::new()
    }
}
