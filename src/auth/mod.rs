//! Signed-Payload Authentication
//!
//! Everything a caller needs to prove control of an Ed25519 key to a tool
//! server, and everything a server needs to check that proof, without
//! shared session state: key storage, did:key identifiers, deterministic
//! signing payloads, per-call proofs, and short-lived bearer tokens.

pub mod did;
pub mod jwt;
pub mod keys;
pub mod payload;
pub mod proof;

use ed25519_dalek::{SigningKey, VerifyingKey};
use serde_json::{Map, Value};

use crate::error::Result;
use crate::types::ToolAuthProof;

/// An agent's signing identity: the Ed25519 key plus its derived
/// identifier, cached so every call does not re-encode the key.
pub struct AgentSigner {
    signing_key: SigningKey,
    identifier: String,
}

impl AgentSigner {
    pub fn new(signing_key: SigningKey) -> Self {
        let identifier = did::derive_identifier(&signing_key.verifying_key());
        Self {
            signing_key,
            identifier,
        }
    }

    /// Generate a fresh random identity (not persisted).
    pub fn generate() -> Self {
        let mut rng = rand::rngs::OsRng;
        Self::new(SigningKey::generate(&mut rng))
    }

    /// Load the identity from the keystore, creating one on first run.
    pub fn load_or_create() -> anyhow::Result<Self> {
        let (signing_key, created) = keys::get_keypair()?;
        if created {
            tracing::info!("generated new agent keypair at {:?}", keys::get_keypair_path());
        }
        Ok(Self::new(signing_key))
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn signing_key(&self) -> &SigningKey {
        &self.signing_key
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    /// Sign tool-call arguments at the current timestamp.
    pub fn sign_args(&self, args: &Map<String, Value>) -> Result<ToolAuthProof> {
        proof::sign_arguments(&self.signing_key, &self.identifier, args)
    }

    /// Sign tool-call arguments with an explicit nonce.
    pub fn sign_args_with_nonce(
        &self,
        args: &Map<String, Value>,
        nonce: i64,
    ) -> Result<ToolAuthProof> {
        proof::sign_arguments_with_nonce(&self.signing_key, &self.identifier, args, nonce)
    }

    /// Issue a short-lived bearer token for a service boundary.
    pub fn bearer_jwt(&self, audience: &str) -> Result<String> {
        jwt::issue_jwt(&self.signing_key, &self.identifier, audience, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signer_identifier_matches_key() {
        let signer = AgentSigner::generate();
        let rederived = did::derive_identifier(&signer.verifying_key());
        assert_eq!(signer.identifier(), rederived);
    }
}
