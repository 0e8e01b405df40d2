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

//! Control-record roster and quorum arithmetic (§3 ControlRecord, §4.9).
//!
//! This module only holds the data and the pure threshold function; the
//! signed-request verification and mutation workflow lives in the
//! `sorcha-quorum` crate, which depends on this one.

use crate::ids::{RegisterId, TenantId};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Maximum number of attestations a register's control record may ever
/// hold (§3, §4.9, hard cap).
pub const MAX_ATTESTATIONS: usize = 25;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum Role {
    Owner,
    Admin,
    Designer,
    Auditor,
}

impl Role {
    /// Owner and Admin are voting members; Designer and Auditor are not
    /// (§3 derived `voting_members`).
    pub fn is_voting(&self) -> bool {
        matches!(self, Role::Owner | Role::Admin)
    }
}

/// A signed grant of a role over a register to a subject (§3 Attestation).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Attestation {
    pub role: Role,
    pub subject: String,
    pub public_key: Vec<u8>,
    pub signature: Vec<u8>,
    pub algorithm: String,
    pub granted_at: i64,
}

/// The membership roster governing a register (§3 ControlRecord).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ControlRecord {
    pub register_id: RegisterId,
    pub name: String,
    pub tenant_id: TenantId,
    pub created_at: i64,
    pub attestations: Vec<Attestation>,
}

impl ControlRecord {
    pub fn new(register_id: RegisterId, name: String, tenant_id: TenantId, created_at: i64) -> Self {
        Self {
            register_id,
            name,
            tenant_id,
            created_at,
            attestations: Vec::new(),
        }
    }

    pub fn voting_members(&self) -> Vec<&Attestation> {
        self.attestations.iter().filter(|a| a.role.is_voting()).collect()
    }

    /// `floor((|voting_members \ exclude|) / 2) + 1` (§3, §8 property 6).
    /// `exclude` names subjects removed from the count first — used for
    /// self-revoke and removal votes, which must not count the target
    /// toward their own quorum.
    pub fn quorum_threshold(&self, exclude: &HashSet<&str>) -> usize {
        let m = self
            .voting_members()
            .into_iter()
            .filter(|a| !exclude.contains(a.subject.as_str()))
            .count();
        m / 2 + 1
    }

    pub fn attestation_count(&self) -> usize {
        self.attestations.len()
    }

    pub fn is_at_cap(&self) -> bool {
        self.attestations.len() >= MAX_ATTESTATIONS
    }

    pub fn find(&self, subject: &str) -> Option<&Attestation> {
        self.attestations.iter().find(|a| a.subject == subject)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attestation(subject: &str, role: Role) -> Attestation {
        Attestation {
            role,
            subject: subject.to_string(),
            public_key: vec![],
            signature: vec![],
            algorithm: "ED25519".into(),
            granted_at: 0,
        }
    }

    fn record_with(n_owners_admins: usize, n_non_voting: usize) -> ControlRecord {
        let mut cr = ControlRecord::new(
            RegisterId::from("r1"),
            "n".into(),
            TenantId::from("t1"),
            0,
        );
        for i in 0..n_owners_admins {
            let role = if i == 0 { Role::Owner } else { Role::Admin };
            cr.attestations.push(attestation(&format!("voter{i}"), role));
        }
        for i in 0..n_non_voting {
            cr.attestations
                .push(attestation(&format!("aud{i}"), Role::Auditor));
        }
        cr
    }

    #[test]
    fn quorum_threshold_matches_formula_for_various_rosters() {
        for m in 1..=10usize {
            let cr = record_with(m, 2);
            let empty = HashSet::new();
            assert_eq!(cr.quorum_threshold(&empty), m / 2 + 1);
        }
    }

    #[test]
    fn quorum_threshold_excludes_target_of_self_revoke() {
        let cr = record_with(4, 0);
        let mut exclude = HashSet::new();
        exclude.insert("voter0");
        // 3 remaining voters -> floor(3/2)+1 = 2
        assert_eq!(cr.quorum_threshold(&exclude), 2);
    }

    #[test]
    fn attestation_cap_is_25() {
        let mut cr = record_with(0, 0);
        for i in 0..25 {
            cr.attestations
                .push(attestation(&format!("a{i}"), Role::Auditor));
        }
        assert!(cr.is_at_cap());
        assert_eq!(cr.attestation_count(), 25);
    }
}
