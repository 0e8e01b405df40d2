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

//! Consumed-interface adapters (§6.1): identity, wallet custody, and
//! blueprint authoring are out of this repository's scope, so each is
//! modeled here as a narrow trait with exactly the operations §6 names.
//! A production node supplies real adapters at the composition root
//! (`sorcha-node`); tests use the in-memory fakes below, mirroring the
//! teacher's own `Network`-trait-behind-`sc_network` pattern.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

use crate::blueprint::PublishedBlueprint;

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("identity service unavailable")]
    Unavailable,
}

#[derive(Debug, Error)]
pub enum WalletError {
    #[error("wallet {0} is unknown to this signer")]
    UnknownWallet(String),
}

#[derive(Debug, Error)]
pub enum BlueprintError {
    #[error("blueprint cache unavailable")]
    Unavailable,
}

#[derive(Clone, Debug)]
pub struct Introspection {
    pub subject: String,
    pub tenant_id: String,
}

#[derive(Clone, Debug)]
pub struct Signature {
    pub bytes: Vec<u8>,
    pub public_key: Vec<u8>,
}

#[async_trait]
pub trait IdentityClient: Send + Sync {
    async fn validate_token(&self, jwt: &str) -> Result<Introspection, IdentityError>;
    async fn participant_for_wallet(&self, wallet: &str, tenant_id: &str) -> Result<Option<String>, IdentityError>;
}

#[async_trait]
pub trait WalletSigner: Send + Sync {
    async fn sign(&self, wallet: &str, bytes: &[u8], is_pre_hashed: bool) -> Result<Signature, WalletError>;
}

#[async_trait]
pub trait BlueprintCache: Send + Sync {
    async fn get_published(&self, blueprint_id: &str) -> Result<Option<Arc<PublishedBlueprint>>, BlueprintError>;
    fn validate_action(&self, blueprint: &PublishedBlueprint, disclosure: &[u8]) -> Result<(), crate::error::ValidationError>;
}

/// Maps every wallet to the same participant id, under a configurable
/// tenant. Good enough for pipeline tests; a real node talks to an
/// identity service over gRPC/REST (out of scope here, §2).
pub struct FakeIdentityClient {
    participants: Mutex<HashMap<String, String>>,
}

impl FakeIdentityClient {
    pub fn new() -> Self {
        Self {
            participants: Mutex::new(HashMap::new()),
        }
    }

    pub fn register(&self, wallet: impl Into<String>, participant: impl Into<String>) {
        self.participants.lock().insert(wallet.into(), participant.into());
    }
}

impl Default for FakeIdentityClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IdentityClient for FakeIdentityClient {
    async fn validate_token(&self, jwt: &str) -> Result<Introspection, IdentityError> {
        Ok(Introspection {
            subject: jwt.to_string(),
            tenant_id: "default".into(),
        })
    }

    async fn participant_for_wallet(&self, wallet: &str, _tenant_id: &str) -> Result<Option<String>, IdentityError> {
        Ok(self.participants.lock().get(wallet).cloned())
    }
}

/// Signs by returning the input bytes verbatim as the "signature",
/// paired with a fixed public key. Exists only so `ConsensusEngine`
/// tests have a `WalletSigner` to call; never used to verify anything.
pub struct FakeWalletSigner;

#[async_trait]
impl WalletSigner for FakeWalletSigner {
    async fn sign(&self, _wallet: &str, bytes: &[u8], _is_pre_hashed: bool) -> Result<Signature, WalletError> {
        Ok(Signature {
            bytes: bytes.to_vec(),
            public_key: vec![0u8; 32],
        })
    }
}

/// An in-memory published-blueprint registry with the lightweight,
/// presence/type schema checker used in place of a full JSON Schema
/// engine (out of scope, §2).
pub struct InMemoryBlueprintCache {
    blueprints: Mutex<HashMap<String, Arc<PublishedBlueprint>>>,
}

impl InMemoryBlueprintCache {
    pub fn new() -> Self {
        Self {
            blueprints: Mutex::new(HashMap::new()),
        }
    }

    pub fn publish(&self, blueprint: PublishedBlueprint) {
        self.blueprints.lock().insert(blueprint.blueprint_id.clone(), Arc::new(blueprint));
    }
}

impl Default for InMemoryBlueprintCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BlueprintCache for InMemoryBlueprintCache {
    async fn get_published(&self, blueprint_id: &str) -> Result<Option<Arc<PublishedBlueprint>>, BlueprintError> {
        Ok(self.blueprints.lock().get(blueprint_id).cloned())
    }

    fn validate_action(&self, blueprint: &PublishedBlueprint, disclosure: &[u8]) -> Result<(), crate::error::ValidationError> {
        blueprint.schema.validate(disclosure)
    }
}
