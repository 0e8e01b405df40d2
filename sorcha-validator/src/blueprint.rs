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

//! Published blueprint actions and the per-register instance state the
//! blueprint-conformance check (§4.7 step 7) verifies against.
//!
//! Blueprint authoring lives outside this repository's scope (§2); a
//! `blueprint_id` here addresses one published, schema-bound *action*
//! contract rather than an entire multi-action workflow document, so
//! that each transaction's `blueprint_id` field (§3 Transaction) is
//! enough on its own to look up the single action it claims to perform.

use parking_lot::Mutex;
use sorcha_primitives::{RegisterId, TxId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::ValidationError;

/// A required top-level field of a wallet disclosure and the JSON type
/// it must have (§4.7 step 6 "Schema validation").
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SchemaField {
    pub name: String,
    pub json_type: JsonFieldType,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum JsonFieldType {
    String,
    Number,
    Bool,
    Object,
    Array,
}

impl JsonFieldType {
    fn matches(self, value: &serde_json::Value) -> bool {
        match self {
            JsonFieldType::String => value.is_string(),
            JsonFieldType::Number => value.is_number(),
            JsonFieldType::Bool => value.is_boolean(),
            JsonFieldType::Object => value.is_object(),
            JsonFieldType::Array => value.is_array(),
        }
    }
}

/// The declared data schema for one blueprint action: presence and type
/// checks over the wallet disclosure's top-level fields. A full JSON
/// Schema engine is out of scope (§2); this covers what §4.7 actually
/// asks for.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DataSchema {
    pub required_fields: Vec<SchemaField>,
}

impl DataSchema {
    pub fn validate(&self, disclosure: &[u8]) -> Result<(), ValidationError> {
        let value: serde_json::Value = serde_json::from_slice(disclosure).map_err(|_| ValidationError::SchemaViolation)?;
        let object = value.as_object().ok_or(ValidationError::SchemaViolation)?;
        for field in &self.required_fields {
            let present = object.get(&field.name).ok_or(ValidationError::SchemaViolation)?;
            if !field.json_type.matches(present) {
                return Err(ValidationError::SchemaViolation);
            }
        }
        Ok(())
    }
}

/// One published, schema-bound action of a blueprint (§4.7 steps 5-7).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PublishedBlueprint {
    pub blueprint_id: String,
    pub schema: DataSchema,
    /// Participant ids (as resolved by `IdentityClient`) authorised to
    /// perform this action.
    pub authorised_participants: Vec<String>,
    /// `blueprint_id`s of actions that may immediately precede this one
    /// in the instance's history. Empty means this action is a valid
    /// starting action (§4.7 step 7a).
    pub valid_previous_actions: Vec<String>,
}

/// Per-register-instance progress: the last action performed overall,
/// and the last transaction committed by each participant, both tracked
/// optimistically as transactions pass verification (§4.7's concurrency
/// model keeps verification ahead of docket building and commit).
#[derive(Default)]
struct InstanceState {
    last_action_id: Option<String>,
    last_tx_by_participant: HashMap<String, TxId>,
}

pub struct InstanceTracker {
    instances: Mutex<HashMap<RegisterId, InstanceState>>,
}

impl InstanceTracker {
    pub fn new() -> Self {
        Self {
            instances: Mutex::new(HashMap::new()),
        }
    }

    /// §4.7 step 7a: is `blueprint_id` permitted given the instance's
    /// current action history?
    pub fn action_is_permitted(&self, register_id: &RegisterId, blueprint: &PublishedBlueprint) -> bool {
        let instances = self.instances.lock();
        let last_action = instances.get(register_id).and_then(|s| s.last_action_id.clone());
        match last_action {
            None => blueprint.valid_previous_actions.is_empty(),
            Some(last) => blueprint.valid_previous_actions.iter().any(|a| a == &last),
        }
    }

    /// §4.7 step 7c: does `previous_transaction_id` match this
    /// participant's last committed transaction, or is it validly null
    /// because this is their first action in the instance?
    pub fn previous_transaction_matches(
        &self,
        register_id: &RegisterId,
        participant: &str,
        previous_transaction_id: &Option<TxId>,
    ) -> bool {
        let instances = self.instances.lock();
        let last_tx = instances.get(register_id).and_then(|s| s.last_tx_by_participant.get(participant).cloned());
        match (last_tx, previous_transaction_id) {
            (None, None) => true,
            (Some(last), Some(claimed)) => &last == claimed,
            _ => false,
        }
    }

    /// Advances instance state once a transaction has passed
    /// verification, so the next transaction against this instance sees
    /// it as history.
    pub fn record(&self, register_id: &RegisterId, participant: &str, tx_id: &TxId, blueprint_id: &str) {
        let mut instances = self.instances.lock();
        let entry = instances.entry(register_id.clone()).or_default();
        entry.last_action_id = Some(blueprint_id.to_string());
        entry.last_tx_by_participant.insert(participant.to_string(), tx_id.clone());
    }
}

impl Default for InstanceTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_action_requires_empty_valid_previous_actions() {
        let tracker = InstanceTracker::new();
        let register_id = RegisterId::from("r1");
        let starting = PublishedBlueprint {
            blueprint_id: "ping".into(),
            schema: DataSchema { required_fields: vec![] },
            authorised_participants: vec!["p1".into()],
            valid_previous_actions: vec![],
        };
        let not_starting = PublishedBlueprint {
            valid_previous_actions: vec!["pong".into()],
            ..starting.clone()
        };
        assert!(tracker.action_is_permitted(&register_id, &starting));
        assert!(!tracker.action_is_permitted(&register_id, &not_starting));
    }

    #[test]
    fn recorded_action_permits_its_declared_successor() {
        let tracker = InstanceTracker::new();
        let register_id = RegisterId::from("r1");
        tracker.record(&register_id, "p1", &TxId::from("tx1"), "ping");
        let pong = PublishedBlueprint {
            blueprint_id: "pong".into(),
            schema: DataSchema { required_fields: vec![] },
            authorised_participants: vec!["p2".into()],
            valid_previous_actions: vec!["ping".into()],
        };
        assert!(tracker.action_is_permitted(&register_id, &pong));
    }

    #[test]
    fn previous_transaction_check_distinguishes_first_and_subsequent() {
        let tracker = InstanceTracker::new();
        let register_id = RegisterId::from("r1");
        assert!(tracker.previous_transaction_matches(&register_id, "p1", &None));
        assert!(!tracker.previous_transaction_matches(&register_id, "p1", &Some(TxId::from("tx1"))));

        tracker.record(&register_id, "p1", &TxId::from("tx1"), "ping");
        assert!(tracker.previous_transaction_matches(&register_id, "p1", &Some(TxId::from("tx1"))));
        assert!(!tracker.previous_transaction_matches(&register_id, "p1", &Some(TxId::from("tx2"))));
    }
}
