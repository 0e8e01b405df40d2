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

//! Signature verification for the three algorithms a `Transaction` may
//! declare (§3 Algorithm, §4.7 step 4 "Signature verification"). Every
//! path here verifies over `canonical_sign_bytes` and collapses to the
//! single `ValidationError::SignatureMismatch` the caller sees; the
//! specific reason a signature failed to parse or verify is not part of
//! the closed `VAL_*` taxonomy (§6) and is only ever logged.

use ed25519_dalek::Verifier as _;
use k256::ecdsa::signature::Verifier as _;
use sorcha_primitives::Algorithm;

use crate::error::ValidationError;

/// Domain-separation context for sr25519 signatures, mirroring the
/// fixed context string substrate-family signers bind their transcript
/// to rather than signing raw bytes.
const SR25519_CONTEXT: &[u8] = b"sorcha-transaction";

pub fn verify(algorithm: Algorithm, public_key: &[u8], message: &[u8], signature: &[u8]) -> Result<(), ValidationError> {
    let ok = match algorithm {
        Algorithm::Ed25519 => verify_ed25519(public_key, message, signature),
        Algorithm::Sr25519 => verify_sr25519(public_key, message, signature),
        Algorithm::EcdsaSecp256k1 => verify_ecdsa_secp256k1(public_key, message, signature),
    };
    if ok {
        Ok(())
    } else {
        Err(ValidationError::SignatureMismatch)
    }
}

fn verify_ed25519(public_key: &[u8], message: &[u8], signature: &[u8]) -> bool {
    let Ok(pk_bytes) = <[u8; 32]>::try_from(public_key) else {
        return false;
    };
    let Ok(sig_bytes) = <[u8; 64]>::try_from(signature) else {
        return false;
    };
    let Ok(verifying_key) = ed25519_dalek::VerifyingKey::from_bytes(&pk_bytes) else {
        return false;
    };
    let signature = ed25519_dalek::Signature::from_bytes(&sig_bytes);
    verifying_key.verify(message, &signature).is_ok()
}

fn verify_sr25519(public_key: &[u8], message: &[u8], signature: &[u8]) -> bool {
    let Ok(public) = schnorrkel::PublicKey::from_bytes(public_key) else {
        return false;
    };
    let Ok(signature) = schnorrkel::Signature::from_bytes(signature) else {
        return false;
    };
    public.verify_simple(SR25519_CONTEXT, message, &signature).is_ok()
}

fn verify_ecdsa_secp256k1(public_key: &[u8], message: &[u8], signature: &[u8]) -> bool {
    let Ok(verifying_key) = k256::ecdsa::VerifyingKey::from_sec1_bytes(public_key) else {
        return false;
    };
    let Ok(signature) = k256::ecdsa::Signature::from_slice(signature) else {
        return false;
    };
    verifying_key.verify(message, &signature).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ed25519_round_trip_verifies() {
        use ed25519_dalek::Signer;
        let mut csprng = rand::rngs::OsRng;
        let signing_key = ed25519_dalek::SigningKey::generate(&mut csprng);
        let message = b"tx123:hash456";
        let signature = signing_key.sign(message);
        let verifying_key = signing_key.verifying_key();
        assert!(verify(
            Algorithm::Ed25519,
            verifying_key.as_bytes(),
            message,
            &signature.to_bytes(),
        )
        .is_ok());
    }

    #[test]
    fn ed25519_tampered_message_fails() {
        use ed25519_dalek::Signer;
        let mut csprng = rand::rngs::OsRng;
        let signing_key = ed25519_dalek::SigningKey::generate(&mut csprng);
        let signature = signing_key.sign(b"tx123:hash456");
        let verifying_key = signing_key.verifying_key();
        assert!(verify(
            Algorithm::Ed25519,
            verifying_key.as_bytes(),
            b"tx123:hash999",
            &signature.to_bytes(),
        )
        .is_err());
    }

    #[test]
    fn sr25519_round_trip_verifies() {
        let keypair = schnorrkel::Keypair::generate();
        let message = b"tx123:hash456";
        let signature = keypair.sign_simple(SR25519_CONTEXT, message);
        assert!(verify(
            Algorithm::Sr25519,
            &keypair.public.to_bytes(),
            message,
            &signature.to_bytes(),
        )
        .is_ok());
    }

    #[test]
    fn ecdsa_secp256k1_round_trip_verifies() {
        use k256::ecdsa::signature::Signer;
        let signing_key = k256::ecdsa::SigningKey::random(&mut rand::rngs::OsRng);
        let message = b"tx123:hash456";
        let signature: k256::ecdsa::Signature = signing_key.sign(message);
        let verifying_key = k256::ecdsa::VerifyingKey::from(&signing_key);
        assert!(verify(
            Algorithm::EcdsaSecp256k1,
            verifying_key.to_sec1_bytes().as_ref(),
            message,
            &signature.to_bytes(),
        )
        .is_ok());
    }

    #[test]
    fn malformed_public_key_is_rejected_not_panicking() {
        assert!(verify(Algorithm::Ed25519, &[1, 2, 3], b"msg", &[0u8; 64]).is_err());
        assert!(verify(Algorithm::Sr25519, &[1, 2, 3], b"msg", &[0u8; 64]).is_err());
        assert!(verify(Algorithm::EcdsaSecp256k1, &[1, 2, 3], b"msg", &[0u8; 64]).is_err());
    }
}
