//! Deterministic idempotency keys and wallet comparison.
//!
//! The claim idempotency key is a pure function of `(match_id, wallet)` with
//! the wallet lowercased first, so a retry from the same winner — whatever
//! the checksum-casing of the address in that request — always derives the
//! same key and collides with the earlier claim row instead of creating a
//! second one.

use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Derive the stable idempotency key for a claim.
///
/// hex(sha256("<match_id>:<lowercase wallet>")). This is the **canonical**
/// derivation point: every call-site, first attempt or retry, must use this
/// function.
pub fn claim_idempotency_key(match_id: Uuid, wallet: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(match_id.to_string().as_bytes());
    hasher.update(b":");
    hasher.update(wallet.to_ascii_lowercase().as_bytes());
    hex::encode(hasher.finalize())
}

/// Case-insensitive wallet address equality.
///
/// On-chain addresses are case-insensitive hex (EIP-55 checksumming only
/// changes letter case), so the winner check must never fail on casing.
pub fn wallets_match(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_is_deterministic_and_case_insensitive() {
        let id = Uuid::parse_str("3f1a8a2e-0c2b-4e5d-9a7f-1b2c3d4e5f60").unwrap();
        let k1 = claim_idempotency_key(id, "0xAbCdEf0123456789abcdef0123456789ABCDEF01");
        let k2 = claim_idempotency_key(id, "0xabcdef0123456789abcdef0123456789abcdef01");
        assert_eq!(k1, k2);
        assert_eq!(k1.len(), 64);
    }

    #[test]
    fn key_varies_by_match_and_wallet() {
        let id1 = Uuid::new_v4();
        let id2 = Uuid::new_v4();
        let w = "0xabcdef0123456789abcdef0123456789abcdef01";
        assert_ne!(claim_idempotency_key(id1, w), claim_idempotency_key(id2, w));
        assert_ne!(
            claim_idempotency_key(id1, w),
            claim_idempotency_key(id1, "0x1111111111111111111111111111111111111111")
        );
    }

    #[test]
    fn wallet_comparison_ignores_case_only() {
        assert!(wallets_match("0xABC", "0xabc"));
        assert!(!wallets_match("0xabc", "0xabd"));
        assert!(!wallets_match("0xabc", "0xabc0"));
    }
}
