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

//! Replication Engine (§4.6): propagates verified transactions to peers
//! via live gossip, keeps per-register subscriptions caught up through
//! periodic checkpoint sync, and backs outbound notifications with a
//! durable queue so a restart does not lose them.

mod checkpoint;
mod config;
mod gossip;
mod queue;

pub use checkpoint::{CheckpointStore, SyncCheckpoint};
pub use config::{GossipConfig, ReplicationConfig};
pub use gossip::{GossipEngine, GossipOutcome, NotificationPayload};
pub use queue::{OutboundQueue, QueueEntry, QueuedNotification, NUM_COLUMNS};
