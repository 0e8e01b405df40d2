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

//! Subscription record and state machine (§3 Subscription, §4.5).

use crate::ids::{PeerId, RegisterId};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum SubscriptionMode {
    ForwardOnly,
    FullReplica,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum SubscriptionState {
    Subscribing,
    Syncing,
    FullyReplicated,
    Active,
    Error,
}

/// A local node's intent to follow a remote register (§3 Subscription).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: String,
    pub register_id: RegisterId,
    pub mode: SubscriptionMode,
    pub state: SubscriptionState,
    pub last_synced_docket_version: u64,
    pub last_synced_transaction_version: u64,
    pub total_dockets_in_chain: u64,
    pub source_peer_ids: Vec<PeerId>,
    pub consecutive_failures: u32,
    pub error_message: Option<String>,
}

impl Subscription {
    pub fn new(id: String, register_id: RegisterId, mode: SubscriptionMode) -> Self {
        Self {
            id,
            register_id,
            mode,
            state: SubscriptionState::Subscribing,
            last_synced_docket_version: 0,
            last_synced_transaction_version: 0,
            total_dockets_in_chain: 0,
            source_peer_ids: Vec::new(),
            consecutive_failures: 0,
            error_message: None,
        }
    }

    /// `FullyReplicated` subscriptions participate in validation quorum
    /// (§3 derived booleans).
    pub fn can_participate_in_validation(&self) -> bool {
        matches!(self.state, SubscriptionState::FullyReplicated)
    }

    /// `Active` and `FullyReplicated` subscriptions receive live
    /// notifications (§3 derived booleans).
    pub fn is_receiving(&self) -> bool {
        matches!(
            self.state,
            SubscriptionState::Active | SubscriptionState::FullyReplicated
        )
    }

    /// Progress percentage per §4.5: `ForwardOnly` is binary (0 or 100),
    /// `FullReplica` is the ratio of synced dockets to the chain total,
    /// clamped so it never exceeds 100.
    pub fn progress_percent(&self) -> u8 {
        match self.mode {
            SubscriptionMode::ForwardOnly => {
                if matches!(self.state, SubscriptionState::Active) {
                    100
                } else {
                    0
                }
            }
            SubscriptionMode::FullReplica => {
                if self.total_dockets_in_chain == 0 {
                    if matches!(self.state, SubscriptionState::FullyReplicated) {
                        100
                    } else {
                        0
                    }
                } else {
                    let pct = (100 * self.last_synced_docket_version)
                        / self.total_dockets_in_chain.max(1);
                    pct.min(100) as u8
                }
            }
        }
    }

    /// Advances the state machine on a successful sync step. `Subscribing`
    /// goes straight to `Active` for `ForwardOnly`, or to `Syncing` for
    /// `FullReplica`; `Syncing` advances to `FullyReplicated` only once
    /// the caller tells us we are caught up (§4.5 state diagram).
    pub fn on_sync_success(&mut self, now_synced_docket_version: u64, caught_up: bool) {
        self.consecutive_failures = 0;
        self.error_message = None;
        self.last_synced_docket_version = now_synced_docket_version;

        self.state = match (self.mode, self.state) {
            (SubscriptionMode::ForwardOnly, SubscriptionState::Subscribing) => {
                SubscriptionState::Active
            }
            (SubscriptionMode::FullReplica, SubscriptionState::Subscribing) => {
                SubscriptionState::Syncing
            }
            (SubscriptionMode::FullReplica, SubscriptionState::Syncing) if caught_up => {
                SubscriptionState::FullyReplicated
            }
            (_, other) => other,
        };
    }

    /// Records a failed sync attempt. Ten consecutive failures latch the
    /// subscription into `Error`, which requires operator intervention to
    /// clear (§4.5, §8 property 8).
    pub fn on_sync_failure(&mut self, error_message: impl Into<String>) {
        self.consecutive_failures += 1;
        self.error_message = Some(error_message.into());
        if self.consecutive_failures >= 10 {
            self.state = SubscriptionState::Error;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sub(mode: SubscriptionMode) -> Subscription {
        Subscription::new("s1".into(), RegisterId::from("r1"), mode)
    }

    #[test]
    fn forward_only_goes_subscribing_to_active_directly() {
        let mut s = sub(SubscriptionMode::ForwardOnly);
        s.on_sync_success(0, true);
        assert_eq!(s.state, SubscriptionState::Active);
        assert_eq!(s.progress_percent(), 100);
    }

    #[test]
    fn full_replica_goes_through_syncing() {
        let mut s = sub(SubscriptionMode::FullReplica);
        s.total_dockets_in_chain = 10;
        s.on_sync_success(0, false);
        assert_eq!(s.state, SubscriptionState::Syncing);
        s.on_sync_success(5, false);
        assert_eq!(s.state, SubscriptionState::Syncing);
        assert_eq!(s.progress_percent(), 50);
        s.on_sync_success(10, true);
        assert_eq!(s.state, SubscriptionState::FullyReplicated);
        assert_eq!(s.progress_percent(), 100);
    }

    #[test]
    fn ten_consecutive_failures_latch_error() {
        let mut s = sub(SubscriptionMode::FullReplica);
        for i in 0..9 {
            s.on_sync_failure(format!("attempt {i}"));
            assert_ne!(s.state, SubscriptionState::Error);
        }
        s.on_sync_failure("attempt 9");
        assert_eq!(s.state, SubscriptionState::Error);
        assert_eq!(s.consecutive_failures, 10);
    }

    #[test]
    fn progress_never_exceeds_100() {
        let mut s = sub(SubscriptionMode::FullReplica);
        s.total_dockets_in_chain = 4;
        s.last_synced_docket_version = 9000;
        assert_eq!(s.progress_percent(), 100);
    }
}
