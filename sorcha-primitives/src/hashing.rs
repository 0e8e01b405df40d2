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

//! SHA-256 and merkle helpers. These are the two primitives the
//! signature contract (§3 Transaction) and the docket chain integrity
//! invariant (§8 property 2) both depend on; keeping them in one place
//! means the validator, the docket builder, and every test agree on the
//! exact same bytes.

use sha2::{Digest, Sha256};

/// Lower-case hex SHA-256 digest of `bytes`.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// The exact, immutable bytes a signature must cover for a transaction:
/// ASCII `"{tx_id}:{payload_hash}"` (§3, §8 property 3). Both signing and
/// verification MUST call this helper rather than recomputing the format
/// inline, since the contract is frozen by the spec.
pub fn canonical_sign_bytes(tx_id: &str, payload_hash: &str) -> Vec<u8> {
    format!("{tx_id}:{payload_hash}").into_bytes()
}

/// Content-addressed `tx_id` (§3.1 of SPEC_FULL): the hex SHA-256 of the
/// colon-joined canonical fields, with a missing `previous_transaction_id`
/// represented as the empty string. The validator's structural-validation
/// stage (§4.7 step 2) re-derives this and rejects any transaction whose
/// submitted `tx_id` does not match.
pub fn canonical_tx_id(
    register_id: &str,
    blueprint_id: &str,
    previous_transaction_id: Option<&str>,
    payload_hash: &str,
    sender_wallet: &str,
    submitted_at_micros: i64,
) -> String {
    let previous = previous_transaction_id.unwrap_or("");
    let joined = format!(
        "{register_id}:{blueprint_id}:{previous}:{payload_hash}:{sender_wallet}:{submitted_at_micros}"
    );
    sha256_hex(joined.as_bytes())
}

/// SHA-256 over the canonical payload bytes of a transaction's wallet
/// disclosures (§3.1 of SPEC_FULL: "canonical payload bytes for hashing
/// purposes are the exact bytes supplied by the caller, never
/// re-serialized"). `Payloads` is a `BTreeMap`, so its iteration order is
/// already the canonical per-wallet ordering; entries are joined by a
/// zero byte that cannot appear in a hex wallet address, same convention
/// as the docket header hash.
pub fn canonical_payload_hash(payloads: &crate::Payloads) -> String {
    let mut buf = Vec::new();
    for (wallet, bytes) in payloads {
        buf.extend_from_slice(wallet.as_str().as_bytes());
        buf.push(0u8);
        buf.extend_from_slice(bytes);
        buf.push(0u8);
    }
    sha256_hex(&buf)
}

/// Standard binary merkle root over an ordered list of leaves, each
/// leaf itself SHA-256 hashed before pairing. An odd node at any level is
/// promoted by duplicating it, the common convention used by the
/// majority of append-only-log systems in this retrieval pack.
///
/// Returns the all-zero digest for an empty leaf set (the genesis
/// docket's merkle root, §3 Docket invariants).
pub fn merkle_root<I, S>(leaves: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<[u8]>,
{
    let mut level: Vec<[u8; 32]> = leaves
        .into_iter()
        .map(|leaf| {
            let mut hasher = Sha256::new();
            hasher.update(leaf.as_ref());
            let mut out = [0u8; 32];
            out.copy_from_slice(&hasher.finalize());
            out
        })
        .collect();

    if level.is_empty() {
        return hex::encode([0u8; 32]);
    }

    while level.len() > 1 {
        if level.len() % 2 == 1 {
            level.push(*level.last().unwrap());
        }
        let mut next = Vec::with_capacity(level.len() / 2);
        for pair in level.chunks_exact(2) {
            let mut hasher = Sha256::new();
            hasher.update(pair[0]);
            hasher.update(pair[1]);
            let mut out = [0u8; 32];
            out.copy_from_slice(&hasher.finalize());
            next.push(out);
        }
        level = next;
    }

    hex::encode(level[0])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_merkle_root_is_zero() {
        let leaves: Vec<&[u8]> = vec![];
        assert_eq!(merkle_root(leaves), hex::encode([0u8; 32]));
    }

    #[test]
    fn merkle_root_is_order_sensitive() {
        let a = merkle_root(vec!["tx1", "tx2", "tx3"]);
        let b = merkle_root(vec!["tx3", "tx2", "tx1"]);
        assert_ne!(a, b);
    }

    #[test]
    fn merkle_root_is_deterministic() {
        let a = merkle_root(vec!["tx1", "tx2"]);
        let b = merkle_root(vec!["tx1", "tx2"]);
        assert_eq!(a, b);
    }

    #[test]
    fn canonical_sign_bytes_matches_contract() {
        let bytes = canonical_sign_bytes("abc", "def");
        assert_eq!(bytes, b"abc:def".to_vec());
    }

    #[test]
    fn canonical_tx_id_is_deterministic_and_sensitive_to_each_field() {
        let base = canonical_tx_id("r1", "bp1", Some("prev"), "hash1", "wallet1", 100);
        assert_eq!(base, canonical_tx_id("r1", "bp1", Some("prev"), "hash1", "wallet1", 100));
        assert_ne!(base, canonical_tx_id("r2", "bp1", Some("prev"), "hash1", "wallet1", 100));
        assert_ne!(base, canonical_tx_id("r1", "bp1", None, "hash1", "wallet1", 100));
    }

    #[test]
    fn canonical_tx_id_treats_missing_previous_as_empty_string() {
        let via_none = canonical_tx_id("r1", "bp1", None, "hash1", "wallet1", 100);
        let via_empty = canonical_tx_id("r1", "bp1", Some(""), "hash1", "wallet1", 100);
        assert_eq!(via_none, via_empty);
    }

    #[test]
    fn canonical_payload_hash_is_order_independent_over_btreemap_and_content_sensitive() {
        let mut a = crate::Payloads::new();
        a.insert("wallet_b".into(), b"two".to_vec());
        a.insert("wallet_a".into(), b"one".to_vec());

        let mut b = crate::Payloads::new();
        b.insert("wallet_a".into(), b"one".to_vec());
        b.insert("wallet_b".into(), b"two".to_vec());

        assert_eq!(canonical_payload_hash(&a), canonical_payload_hash(&b));

        let mut c = a.clone();
        c.insert("wallet_a".into(), b"different".to_vec());
        assert_ne!(canonical_payload_hash(&a), canonical_payload_hash(&c));
    }
}
