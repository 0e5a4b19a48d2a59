//! Per-Call Auth Proofs
//!
//! Issues and verifies the signed proof attached to gated tool calls. The
//! nonce is a millisecond timestamp; proofs older than the replay window
//! are rejected regardless of signature validity.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::Utc;
use ed25519_dalek::{Signature, Signer, SigningKey};
use serde_json::{Map, Value};

use crate::auth::did;
use crate::auth::payload::canonical_signing_payload;
use crate::error::{ArmatureError, Result};
use crate::types::ToolAuthProof;

/// Maximum age of a proof's nonce before it is rejected.
pub const REPLAY_WINDOW_MS: i64 = 3 * 60 * 1000;

/// Sign call arguments at the current timestamp.
pub fn sign_arguments(
    signing_key: &SigningKey,
    identifier: &str,
    args: &Map<String, Value>,
) -> Result<ToolAuthProof> {
    sign_arguments_with_nonce(signing_key, identifier, args, Utc::now().timestamp_millis())
}

/// Sign call arguments with an explicit nonce. The nonce binds the
/// signature to a point in time so it cannot be replayed later.
pub fn sign_arguments_with_nonce(
    signing_key: &SigningKey,
    identifier: &str,
    args: &Map<String, Value>,
    nonce: i64,
) -> Result<ToolAuthProof> {
    let payload = canonical_signing_payload(args, nonce)?;
    let signature = signing_key.sign(&payload);

    Ok(ToolAuthProof {
        signature_base64_url: URL_SAFE_NO_PAD.encode(signature.to_bytes()),
        public_key_identifier: identifier.to_string(),
        nonce,
    })
}

/// Verify a proof against the validated call arguments.
///
/// The arguments must be the post-schema-check map, stripped of the proof
/// itself, so signer and verifier canonicalize the same bytes.
pub fn verify_proof(proof: &ToolAuthProof, args: &Map<String, Value>) -> Result<()> {
    let elapsed = Utc::now().timestamp_millis() - proof.nonce;
    if elapsed > REPLAY_WINDOW_MS {
        return Err(ArmatureError::auth(format!(
            "proof nonce is {}ms old, outside the {}ms replay window",
            elapsed, REPLAY_WINDOW_MS
        )));
    }

    let public_key = did::public_key_from_identifier(&proof.public_key_identifier)?;

    let payload = canonical_signing_payload(args, proof.nonce)?;

    let signature_bytes = URL_SAFE_NO_PAD
        .decode(&proof.signature_base64_url)
        .map_err(|e| ArmatureError::auth(format!("signature is not valid base64url: {}", e)))?;
    let signature_bytes: [u8; 64] = signature_bytes
        .try_into()
        .map_err(|_| ArmatureError::auth("signature must be exactly 64 bytes"))?;
    let signature = Signature::from_bytes(&signature_bytes);

    public_key
        .verify_strict(&payload, &signature)
        .map_err(|_| ArmatureError::auth("signature does not match the signed payload"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AgentSigner;
    use serde_json::json;

    fn hello_args() -> Map<String, Value> {
        let mut args = Map::new();
        args.insert("message".to_string(), json!("hello"));
        args
    }

    #[test]
    fn test_proof_roundtrip() {
        let signer = AgentSigner::generate();
        let args = hello_args();
        let proof = signer.sign_args(&args).unwrap();
        assert!(verify_proof(&proof, &args).is_ok());
    }

    #[test]
    fn test_altered_argument_fails() {
        let signer = AgentSigner::generate();
        let proof = signer.sign_args(&hello_args()).unwrap();

        let mut tampered = Map::new();
        tampered.insert("message".to_string(), json!("hellp"));
        assert!(verify_proof(&proof, &tampered).is_err());
    }

    #[test]
    fn test_altered_nonce_fails() {
        let signer = AgentSigner::generate();
        let args = hello_args();
        let mut proof = signer.sign_args(&args).unwrap();
        proof.nonce += 1;
        assert!(verify_proof(&proof, &args).is_err());
    }

    #[test]
    fn test_substituted_key_fails() {
        let signer = AgentSigner::generate();
        let impostor = AgentSigner::generate();
        let args = hello_args();

        // Impostor's signature under the real signer's identifier.
        let mut proof = impostor.sign_args(&args).unwrap();
        proof.public_key_identifier = signer.identifier().to_string();
        assert!(verify_proof(&proof, &args).is_err());
    }

    #[test]
    fn test_replay_window() {
        let signer = AgentSigner::generate();
        let args = hello_args();

        let fresh_enough = sign_with_offset(&signer, &args, -2 * 60 * 1000);
        assert!(verify_proof(&fresh_enough, &args).is_ok());

        let too_old = sign_with_offset(&signer, &args, -4 * 60 * 1000);
        let err = verify_proof(&too_old, &args).unwrap_err();
        assert!(err.to_string().contains("replay window"));
    }

    fn sign_with_offset(
        signer: &AgentSigner,
        args: &Map<String, Value>,
        offset_ms: i64,
    ) -> ToolAuthProof {
        let nonce = Utc::now().timestamp_millis() + offset_ms;
        signer.sign_args_with_nonce(args, nonce).unwrap()
    }
}
