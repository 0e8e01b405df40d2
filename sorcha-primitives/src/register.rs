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

//! Register metadata (§3 Register).

use crate::ids::{RegisterId, TenantId};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum RegisterStatus {
    Created,
    Online,
    Suspended,
    Deleted,
}

impl RegisterStatus {
    /// `Deleted` is terminal: no status transitions out of it (§3
    /// Register invariants).
    pub fn can_transition_to(&self, _next: RegisterStatus) -> bool {
        !matches!(self, RegisterStatus::Deleted)
    }
}

/// A register's metadata, independent of its transaction/docket logs,
/// which live in the per-register storage namespace (§4.8).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Register {
    pub register_id: RegisterId,
    pub name: String,
    pub tenant_id: TenantId,
    pub status: RegisterStatus,
    pub height: u64,
    pub is_public: bool,
    pub created_at: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum RegisterValidationError {
    #[error("register id must be 32 hex characters")]
    MalformedId,
    #[error("register name must be at most 38 characters")]
    NameTooLong,
}

impl Register {
    pub fn new(
        register_id: RegisterId,
        name: String,
        tenant_id: TenantId,
        is_public: bool,
        created_at: i64,
    ) -> Result<Self, RegisterValidationError> {
        if !register_id.is_well_formed() {
            return Err(RegisterValidationError::MalformedId);
        }
        if name.chars().count() > 38 {
            return Err(RegisterValidationError::NameTooLong);
        }
        Ok(Self {
            register_id,
            name,
            tenant_id,
            status: RegisterStatus::Created,
            height: 0,
            is_public,
            created_at,
        })
    }
}
