//! did:key Identifier Derivation
//!
//! A self-describing identifier for an Ed25519 public key: the multicodec
//! prefix for ed25519-pub followed by the raw key bytes, base58btc-encoded
//! with the multibase `z` prefix. The identifier doubles as a commitment to
//! the key, since anyone can re-derive it and compare.

use ed25519_dalek::VerifyingKey;

use crate::error::{ArmatureError, Result};

/// Multicodec prefix for ed25519-pub (0xed01).
pub const ED25519_PUB_MULTICODEC_PREFIX: [u8; 2] = [0xed, 0x01];

/// Multibase prefix for base58btc.
pub const BASE58BTC_MULTIBASE_PREFIX: char = 'z';

/// Length of a raw Ed25519 public key.
pub const ED25519_RAW_PUBKEY_LENGTH: usize = 32;

/// DID method prefix used in JWT claims.
pub const DID_KEY_PREFIX: &str = "did:key:";

/// Derive the identifier for an Ed25519 public key.
pub fn derive_identifier(public_key: &VerifyingKey) -> String {
    let mut prefixed = Vec::with_capacity(
        ED25519_PUB_MULTICODEC_PREFIX.len() + ED25519_RAW_PUBKEY_LENGTH,
    );
    prefixed.extend_from_slice(&ED25519_PUB_MULTICODEC_PREFIX);
    prefixed.extend_from_slice(public_key.as_bytes());

    format!(
        "{}{}",
        BASE58BTC_MULTIBASE_PREFIX,
        bs58::encode(prefixed).into_string()
    )
}

/// Recover the public key committed to by an identifier.
///
/// Rejects identifiers without the multibase prefix, with a decoded length
/// other than prefix + key, with a non-ed25519 multicodec prefix, or whose
/// key bytes are not a valid curve point.
pub fn public_key_from_identifier(identifier: &str) -> Result<VerifyingKey> {
    let encoded = identifier
        .strip_prefix(BASE58BTC_MULTIBASE_PREFIX)
        .ok_or_else(|| {
            ArmatureError::auth(format!(
                "identifier does not carry the '{}' multibase prefix",
                BASE58BTC_MULTIBASE_PREFIX
            ))
        })?;

    let decoded = bs58::decode(encoded)
        .into_vec()
        .map_err(|e| ArmatureError::auth(format!("identifier is not base58btc: {}", e)))?;

    if decoded.len() != ED25519_PUB_MULTICODEC_PREFIX.len() + ED25519_RAW_PUBKEY_LENGTH {
        return Err(ArmatureError::auth(
            "identifier length does not match an Ed25519 multicodec key",
        ));
    }

    if decoded[..ED25519_PUB_MULTICODEC_PREFIX.len()] != ED25519_PUB_MULTICODEC_PREFIX {
        return Err(ArmatureError::auth(
            "identifier multicodec prefix is not ed25519-pub",
        ));
    }

    let key_bytes: [u8; ED25519_RAW_PUBKEY_LENGTH] = decoded
        [ED25519_PUB_MULTICODEC_PREFIX.len()..]
        .try_into()
        .map_err(|_| ArmatureError::auth("identifier key bytes are malformed"))?;

    VerifyingKey::from_bytes(&key_bytes)
        .map_err(|e| ArmatureError::auth(format!("identifier does not encode a valid key: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::SigningKey;

    fn random_key() -> VerifyingKey {
        let mut rng = rand::rngs::OsRng;
        SigningKey::generate(&mut rng).verifying_key()
    }

    #[test]
    fn test_derivation_is_pure() {
        let key = random_key();
        assert_eq!(derive_identifier(&key), derive_identifier(&key));
    }

    #[test]
    fn test_distinct_keys_give_distinct_identifiers() {
        assert_ne!(derive_identifier(&random_key()), derive_identifier(&random_key()));
    }

    #[test]
    fn test_identifier_roundtrip() {
        let key = random_key();
        let identifier = derive_identifier(&key);
        assert!(identifier.starts_with('z'));
        let recovered = public_key_from_identifier(&identifier).unwrap();
        assert_eq!(recovered, key);
    }

    #[test]
    fn test_rejects_bad_prefix_and_garbage() {
        assert!(public_key_from_identifier("madeup").is_err());
        assert!(public_key_from_identifier("z!!!not-base58!!!").is_err());
        assert!(public_key_from_identifier("z3mJr").is_err());
    }
}
