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

//! Base types shared by every Sorcha subsystem: identifiers, timestamps,
//! the register data model (§3), and the hashing/merkle helpers the
//! validator pipeline and register store both depend on.

pub mod docket;
pub mod hashing;
pub mod ids;
pub mod peer;
pub mod quorum;
pub mod register;
pub mod subscription;
pub mod time;
pub mod transaction;

pub use docket::{ApprovalSignature, Docket, DocketBuildError};
pub use hashing::{canonical_payload_hash, canonical_sign_bytes, canonical_tx_id, merkle_root, sha256_hex};
pub use ids::{BlueprintId, DocketId, PeerId, RegisterId, TenantId, TxId, WalletAddress};
pub use peer::{ActivePeerInfo, AdvertisedRegister, Peer, PeerHealth, SyncState as PeerSyncState};
pub use quorum::{Attestation, ControlRecord, Role};
pub use register::{Register, RegisterStatus};
pub use subscription::{Subscription, SubscriptionMode, SubscriptionState};
pub use time::now_micros;
pub use transaction::{Algorithm, Transaction, TransactionState, VerifiedTransaction};

/// Sentinel `blueprint_id` used by control (genesis) transactions; these
/// skip blueprint-bound validator stages but otherwise run the full
/// pipeline (§4.7 step 5).
pub const GENESIS_BLUEPRINT_ID: &str = "genesis";

/// A recipient-keyed, opaque ciphertext container. The register never
/// inspects the bytes; only the blueprint layer, outside this crate's
/// scope, ever decrypts them.
pub type Payloads = std::collections::BTreeMap<WalletAddress, Vec<u8>>;
