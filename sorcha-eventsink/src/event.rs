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

//! Domain event kinds and minimum fields, exactly as enumerated in §6.
//! Consumers are external processes over the change-data backplane and
//! MUST be idempotent on `(event_kind, primary_id)`; `primary_id` is
//! provided here so an adapter never has to reconstruct it.

use sorcha_primitives::{DocketId, RegisterId, TenantId, TxId};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_kind", rename_all = "snake_case")]
pub enum DomainEvent {
    #[serde(rename = "register.created")]
    RegisterCreated {
        register_id: RegisterId,
        tenant_id: TenantId,
        name: String,
        created_at: i64,
    },
    #[serde(rename = "register.status_changed")]
    RegisterStatusChanged {
        register_id: RegisterId,
        old_status: String,
        new_status: String,
    },
    #[serde(rename = "register.height_updated")]
    RegisterHeightUpdated { register_id: RegisterId, height: u64 },
    #[serde(rename = "transaction.submitted")]
    TransactionSubmitted {
        tx_id: TxId,
        register_id: RegisterId,
    },
    #[serde(rename = "transaction.confirmed")]
    TransactionConfirmed {
        tx_id: TxId,
        register_id: RegisterId,
        docket_id: DocketId,
        docket_version: u64,
    },
    #[serde(rename = "docket.confirmed")]
    DocketConfirmed {
        docket_id: DocketId,
        register_id: RegisterId,
        docket_version: u64,
        tx_ids: Vec<TxId>,
    },
}

impl DomainEvent {
    /// The `(event_kind, primary_id)` pair consumers dedupe on (§6).
    pub fn idempotency_key(&self) -> (&'static str, String) {
        match self {
            DomainEvent::RegisterCreated { register_id, .. } => {
                ("register.created", register_id.to_string())
            }
            DomainEvent::RegisterStatusChanged { register_id, new_status, .. } => {
                ("register.status_changed", format!("{register_id}:{new_status}"))
            }
            DomainEvent::RegisterHeightUpdated { register_id, height } => {
                ("register.height_updated", format!("{register_id}:{height}"))
            }
            DomainEvent::TransactionSubmitted { tx_id, .. } => {
                ("transaction.submitted", tx_id.to_string())
            }
            DomainEvent::TransactionConfirmed { tx_id, .. } => {
                ("transaction.confirmed", tx_id.to_string())
            }
            DomainEvent::DocketConfirmed { docket_id, .. } => {
                ("docket.confirmed", docket_id.to_string())
            }
        }
    }
}
