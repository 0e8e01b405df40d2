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

//! Admission pipeline stages 2-7 of §4.7: structural validation through
//! blueprint conformance. Stage 1 (pool admission, dedup) and stage 8
//! (promotion to the verified queue) are the caller's responsibility
//! (`ValidatorPipeline::submit` in `lib.rs`); this module is the pure,
//! synchronous-shaped core so each stage can be tested in isolation.

use sorcha_primitives::{canonical_payload_hash, now_micros, Transaction, VerifiedTransaction};
use sorcha_register::RegisterStore;

use crate::blueprint::InstanceTracker;
use crate::error::ValidationError;
use crate::interfaces::{BlueprintCache, IdentityClient};
use crate::signing;

/// §4.7 step 6: the disclosure checked against the blueprint's schema is
/// the entry keyed by the sender's own wallet; if the sender did not
/// address a disclosure to themselves, fall back to the first entry in
/// the map's canonical (wallet-address) ordering. Payloads keyed for
/// other recipients are opaque ciphertext this validator never opens.
fn sender_disclosure<'a>(tx: &'a Transaction) -> Option<&'a Vec<u8>> {
    tx.payloads
        .get(&tx.sender_wallet)
        .or_else(|| tx.payloads.values().next())
}

/// Runs stages 2 through 7 against `tx` and, on success, stamps it into a
/// `VerifiedTransaction` (stage 8 is the caller's job — promotion is not
/// a validation concern).
pub async fn validate(
    tx: Transaction,
    register_store: &RegisterStore,
    blueprints: &dyn BlueprintCache,
    identity: &dyn IdentityClient,
    instances: &InstanceTracker,
    tenant_id: &str,
) -> Result<VerifiedTransaction, ValidationError> {
    structural_validation(&tx)?;

    register_store
        .get_register(&tx.register_id)
        .map_err(|_| ValidationError::Structural)?
        .ok_or(ValidationError::Structural)?;

    let recomputed_hash = canonical_payload_hash(&tx.payloads);
    if recomputed_hash != tx.payload_hash {
        return Err(ValidationError::HashMismatch);
    }

    signing::verify(tx.algorithm, &tx.public_key, &tx.sign_bytes(), &tx.signature)?;

    let blueprint_snapshot_id = if tx.is_genesis() {
        sorcha_primitives::GENESIS_BLUEPRINT_ID.to_string()
    } else {
        let blueprint = blueprints
            .get_published(tx.blueprint_id.as_str())
            .await
            .map_err(|_| ValidationError::UnknownBlueprint(tx.blueprint_id.to_string()))?
            .ok_or_else(|| ValidationError::UnknownBlueprint(tx.blueprint_id.to_string()))?;

        let disclosure = sender_disclosure(&tx).ok_or(ValidationError::SchemaViolation)?;
        blueprints.validate_action(&blueprint, disclosure)?;

        if !instances.action_is_permitted(&tx.register_id, &blueprint) {
            return Err(ValidationError::ActionNotPermitted);
        }

        let participant = identity
            .participant_for_wallet(tx.sender_wallet.as_str(), tenant_id)
            .await
            .map_err(|_| ValidationError::SenderNotAuthorised)?
            .ok_or(ValidationError::SenderNotAuthorised)?;
        if !blueprint.authorised_participants.iter().any(|p| p == &participant) {
            return Err(ValidationError::SenderNotAuthorised);
        }

        if !instances.previous_transaction_matches(&tx.register_id, &participant, &tx.previous_transaction_id) {
            return Err(ValidationError::PreviousTransactionMismatch);
        }

        instances.record(&tx.register_id, &participant, &tx.tx_id, tx.blueprint_id.as_str());
        format!("{}@verified", blueprint.blueprint_id)
    };

    Ok(VerifiedTransaction {
        transaction: tx,
        verified_at: now_micros(),
        blueprint_snapshot_id,
    })
}

/// §4.7 step 2: required fields present, `tx_id` is the canonical
/// content hash of the other fields, `register_id` is well-formed.
fn structural_validation(tx: &Transaction) -> Result<(), ValidationError> {
    if tx.tx_id.as_str().is_empty()
        || tx.payload_hash.is_empty()
        || tx.sender_wallet.as_str().is_empty()
        || tx.signature.is_empty()
        || tx.public_key.is_empty()
    {
        return Err(ValidationError::Structural);
    }
    if !tx.register_id.is_well_formed() {
        return Err(ValidationError::Structural);
    }
    if tx.expected_tx_id() != tx.tx_id {
        return Err(ValidationError::Structural);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blueprint::{DataSchema, PublishedBlueprint};
    use crate::interfaces::{FakeIdentityClient, InMemoryBlueprintCache};
    use sorcha_eventsink::NullEventSink;
    use sorcha_primitives::hashing::canonical_tx_id;
    use sorcha_primitives::{Algorithm, Payloads, Register, RegisterId, TenantId, TxId, GENESIS_BLUEPRINT_ID};
    use sorcha_register::RegisterStoreConfig;
    use sorcha_subsystem_util::Storage;
    use std::sync::Arc;

    fn store_with_register(register_id: &str) -> RegisterStore {
        let store = RegisterStore::new(
            RegisterStoreConfig::default(),
            Storage::open_memory(sorcha_register::keys::NUM_COLUMNS),
            Arc::new(NullEventSink),
        );
        let register = Register::new(
            RegisterId::from(register_id),
            "n".into(),
            TenantId::from("t1"),
            false,
            now_micros(),
        )
        .unwrap();
        let payload_hash = canonical_payload_hash(&Payloads::new());
        let tx_id = canonical_tx_id(register_id, GENESIS_BLUEPRINT_ID, None, &payload_hash, "owner", 0);
        let genesis = Transaction {
            tx_id: TxId::from(tx_id),
            register_id: register.register_id.clone(),
            blueprint_id: GENESIS_BLUEPRINT_ID.into(),
            previous_transaction_id: None,
            payload_hash,
            payloads: Payloads::new(),
            sender_wallet: "owner".into(),
            signature: vec![],
            public_key: vec![],
            algorithm: Algorithm::Ed25519,
            submitted_at: 0,
        };
        store.create(register, genesis).unwrap();
        store
    }

    fn signed_genesis_tx(register_id: &str, submitted_at: i64) -> Transaction {
        use ed25519_dalek::Signer;
        let mut csprng = rand::rngs::OsRng;
        let signing_key = ed25519_dalek::SigningKey::generate(&mut csprng);
        let payload_hash = canonical_payload_hash(&Payloads::new());
        let tx_id = TxId::from(canonical_tx_id(register_id, GENESIS_BLUEPRINT_ID, None, &payload_hash, "owner", submitted_at));
        let sign_bytes = sorcha_primitives::canonical_sign_bytes(tx_id.as_str(), &payload_hash);
        let signature = signing_key.sign(&sign_bytes);
        Transaction {
            tx_id,
            register_id: RegisterId::from(register_id),
            blueprint_id: GENESIS_BLUEPRINT_ID.into(),
            previous_transaction_id: None,
            payload_hash,
            payloads: Payloads::new(),
            sender_wallet: "owner".into(),
            signature: signature.to_bytes().to_vec(),
            public_key: signing_key.verifying_key().as_bytes().to_vec(),
            algorithm: Algorithm::Ed25519,
            submitted_at,
        }
    }

    #[tokio::test]
    async fn genesis_sentinel_skips_blueprint_stages_but_still_checks_signature() {
        let register_id = "00112233445566778899aabbccddeeff";
        let store = store_with_register(register_id);
        let blueprints = InMemoryBlueprintCache::new();
        let identity = FakeIdentityClient::new();
        let instances = InstanceTracker::new();

        let tx = signed_genesis_tx(register_id, 1);
        let verified = validate(tx, &store, &blueprints, &identity, &instances, "t1").await.unwrap();
        assert_eq!(verified.blueprint_snapshot_id, GENESIS_BLUEPRINT_ID);
    }

    #[tokio::test]
    async fn tampered_tx_id_is_rejected_structurally() {
        let register_id = "00112233445566778899aabbccddeeff";
        let store = store_with_register(register_id);
        let blueprints = InMemoryBlueprintCache::new();
        let identity = FakeIdentityClient::new();
        let instances = InstanceTracker::new();

        let mut tx = signed_genesis_tx(register_id, 1);
        tx.tx_id = TxId::from("not-the-content-hash");
        let err = validate(tx, &store, &blueprints, &identity, &instances, "t1").await.unwrap_err();
        assert_eq!(err, ValidationError::Structural);
    }

    #[tokio::test]
    async fn payload_hash_mismatch_is_rejected() {
        let register_id = "00112233445566778899aabbccddeeff";
        let store = store_with_register(register_id);
        let blueprints = InMemoryBlueprintCache::new();
        let identity = FakeIdentityClient::new();
        let instances = InstanceTracker::new();

        let mut tx = signed_genesis_tx(register_id, 1);
        tx.payload_hash = "deadbeef".into();
        let err = validate(tx, &store, &blueprints, &identity, &instances, "t1").await.unwrap_err();
        assert_eq!(err, ValidationError::HashMismatch);
    }

    #[tokio::test]
    async fn unknown_blueprint_is_rejected() {
        let register_id = "00112233445566778899aabbccddeeff";
        let store = store_with_register(register_id);
        let blueprints = InMemoryBlueprintCache::new();
        let identity = FakeIdentityClient::new();
        let instances = InstanceTracker::new();

        use ed25519_dalek::Signer;
        let mut csprng = rand::rngs::OsRng;
        let signing_key = ed25519_dalek::SigningKey::generate(&mut csprng);
        let payload_hash = canonical_payload_hash(&Payloads::new());
        let tx_id = TxId::from(canonical_tx_id(register_id, "no-such-blueprint", None, &payload_hash, "owner", 1));
        let sign_bytes = sorcha_primitives::canonical_sign_bytes(tx_id.as_str(), &payload_hash);
        let signature = signing_key.sign(&sign_bytes);
        let tx = Transaction {
            tx_id,
            register_id: RegisterId::from(register_id),
            blueprint_id: "no-such-blueprint".into(),
            previous_transaction_id: None,
            payload_hash,
            payloads: Payloads::new(),
            sender_wallet: "owner".into(),
            signature: signature.to_bytes().to_vec(),
            public_key: signing_key.verifying_key().as_bytes().to_vec(),
            algorithm: Algorithm::Ed25519,
            submitted_at: 1,
        };

        let err = validate(tx, &store, &blueprints, &identity, &instances, "t1").await.unwrap_err();
        assert!(matches!(err, ValidationError::UnknownBlueprint(id) if id == "no-such-blueprint"));
    }

    #[tokio::test]
    async fn schema_violation_is_rejected_for_published_blueprint() {
        let register_id = "00112233445566778899aabbccddeeff";
        let store = store_with_register(register_id);
        let blueprints = InMemoryBlueprintCache::new();
        blueprints.publish(PublishedBlueprint {
            blueprint_id: "ping".into(),
            schema: DataSchema {
                required_fields: vec![crate::blueprint::SchemaField {
                    name: "amount".into(),
                    json_type: crate::blueprint::JsonFieldType::Number,
                }],
            },
            authorised_participants: vec!["participant1".into()],
            valid_previous_actions: vec![],
        });
        let identity = FakeIdentityClient::new();
        identity.register("owner", "participant1");
        let instances = InstanceTracker::new();

        use ed25519_dalek::Signer;
        let mut csprng = rand::rngs::OsRng;
        let signing_key = ed25519_dalek::SigningKey::generate(&mut csprng);
        let mut payloads = Payloads::new();
        payloads.insert("owner".into(), br#"{"amount": "not-a-number"}"#.to_vec());
        let payload_hash = canonical_payload_hash(&payloads);
        let tx_id = TxId::from(canonical_tx_id(register_id, "ping", None, &payload_hash, "owner", 2));
        let sign_bytes = sorcha_primitives::canonical_sign_bytes(tx_id.as_str(), &payload_hash);
        let signature = signing_key.sign(&sign_bytes);
        let tx = Transaction {
            tx_id,
            register_id: RegisterId::from(register_id),
            blueprint_id: "ping".into(),
            previous_transaction_id: None,
            payload_hash,
            payloads,
            sender_wallet: "owner".into(),
            signature: signature.to_bytes().to_vec(),
            public_key: signing_key.verifying_key().as_bytes().to_vec(),
            algorithm: Algorithm::Ed25519,
            submitted_at: 2,
        };

        let err = validate(tx, &store, &blueprints, &identity, &instances, "t1").await.unwrap_err();
        assert_eq!(err, ValidationError::SchemaViolation);
    }
}
