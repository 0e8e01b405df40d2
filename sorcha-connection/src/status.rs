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

//! Per-peer and node-wide connection status (§4.3 "Status reporting").

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum PeerConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
    HeartbeatTimeout,
    Isolated,
}

/// Node-wide status: `Isolated` means no connected peers for the past
/// heartbeat window (§4.3).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum NodeConnectionStatus {
    Connected,
    Connecting,
    HeartbeatTimeout,
    Isolated,
}

impl NodeConnectionStatus {
    /// Derives the node-wide status from the set of per-peer statuses,
    /// favoring the most connected state observed across any peer except
    /// when none are connected at all, in which case the node is
    /// isolated (§4.3, §8 S6 "Node-wide status on A transitions Connected
    /// → HeartbeatTimeout → Connecting → Connected").
    pub fn derive(peer_statuses: &[PeerConnectionStatus]) -> Self {
        if peer_statuses.iter().any(|s| matches!(s, PeerConnectionStatus::Connected)) {
            return NodeConnectionStatus::Connected;
        }
        if peer_statuses.is_empty() {
            return NodeConnectionStatus::Isolated;
        }
        if peer_statuses.iter().any(|s| matches!(s, PeerConnectionStatus::HeartbeatTimeout)) {
            return NodeConnectionStatus::HeartbeatTimeout;
        }
        if peer_statuses.iter().any(|s| matches!(s, PeerConnectionStatus::Connecting)) {
            return NodeConnectionStatus::Connecting;
        }
        NodeConnectionStatus::Isolated
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_isolated_with_no_peers() {
        assert_eq!(NodeConnectionStatus::derive(&[]), NodeConnectionStatus::Isolated);
    }

    #[test]
    fn derives_connected_if_any_peer_connected() {
        let statuses = [PeerConnectionStatus::HeartbeatTimeout, PeerConnectionStatus::Connected];
        assert_eq!(NodeConnectionStatus::derive(&statuses), NodeConnectionStatus::Connected);
    }

    #[test]
    fn derives_heartbeat_timeout_when_no_peer_connected_but_one_timed_out() {
        let statuses = [PeerConnectionStatus::Disconnected, PeerConnectionStatus::HeartbeatTimeout];
        assert_eq!(NodeConnectionStatus::derive(&statuses), NodeConnectionStatus::HeartbeatTimeout);
    }
}
