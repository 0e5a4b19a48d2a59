//! Agent Keystore
//!
//! Creates and persists the Ed25519 keypair that is the agent's identity.
//! The seed lives in `~/.armature/keypair.json` with owner-only permissions.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Utc;
use ed25519_dalek::SigningKey;
use serde::{Deserialize, Serialize};

/// Directory name under the user's home for all armature data.
const ARMATURE_DIR_NAME: &str = ".armature";

/// Keypair file name within the armature directory.
const KEYPAIR_FILENAME: &str = "keypair.json";

/// On-disk keypair representation.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeypairData {
    /// Hex-encoded 32-byte Ed25519 seed.
    pub secret_key: String,
    /// ISO-8601 timestamp of when this keypair was created.
    pub created_at: String,
}

/// Returns the armature base directory: `~/.armature`.
pub fn get_armature_dir() -> PathBuf {
    let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("/root"));
    home.join(ARMATURE_DIR_NAME)
}

/// Returns the full path to the keypair file: `~/.armature/keypair.json`.
pub fn get_keypair_path() -> PathBuf {
    get_armature_dir().join(KEYPAIR_FILENAME)
}

/// Get or create the agent's keypair.
///
/// If a keypair file already exists, loads the seed from it. Otherwise,
/// generates a new random Ed25519 seed and persists it.
///
/// Returns the signing key and a boolean indicating whether a new keypair
/// was created.
pub fn get_keypair() -> Result<(SigningKey, bool)> {
    let dir = get_armature_dir();
    if !dir.exists() {
        fs::create_dir_all(&dir).context("Failed to create armature directory")?;
        fs::set_permissions(&dir, fs::Permissions::from_mode(0o700))
            .context("Failed to set directory permissions")?;
    }

    let keypair_path = get_keypair_path();

    if keypair_path.exists() {
        let contents =
            fs::read_to_string(&keypair_path).context("Failed to read keypair file")?;
        let data: KeypairData =
            serde_json::from_str(&contents).context("Failed to parse keypair JSON")?;

        let seed = hex::decode(data.secret_key.trim_start_matches("0x"))
            .context("Failed to decode keypair seed")?;
        let seed: [u8; 32] = seed
            .try_into()
            .map_err(|_| anyhow::anyhow!("Keypair seed must be exactly 32 bytes"))?;

        Ok((SigningKey::from_bytes(&seed), false))
    } else {
        let mut rng = rand::rngs::OsRng;
        let signing_key = SigningKey::generate(&mut rng);

        let data = KeypairData {
            secret_key: hex::encode(signing_key.to_bytes()),
            created_at: Utc::now().to_rfc3339(),
        };

        let json =
            serde_json::to_string_pretty(&data).context("Failed to serialize keypair")?;

        fs::write(&keypair_path, &json).context("Failed to write keypair file")?;
        fs::set_permissions(&keypair_path, fs::Permissions::from_mode(0o600))
            .context("Failed to set keypair file permissions")?;

        Ok((signing_key, true))
    }
}

/// Check whether a keypair file exists on disk.
pub fn keypair_exists() -> bool {
    get_keypair_path().exists()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_armature_dir_is_under_home() {
        let dir = get_armature_dir();
        assert!(dir.ends_with(".armature"));
    }

    #[test]
    fn test_get_keypair_path_is_under_armature_dir() {
        let path = get_keypair_path();
        assert!(path.ends_with("keypair.json"));
        assert!(path.starts_with(get_armature_dir()));
    }

    #[test]
    fn test_seed_roundtrip() {
        let mut rng = rand::rngs::OsRng;
        let key = SigningKey::generate(&mut rng);
        let encoded = hex::encode(key.to_bytes());
        let decoded: [u8; 32] = hex::decode(&encoded).unwrap().try_into().unwrap();
        let restored = SigningKey::from_bytes(&decoded);
        assert_eq!(key.verifying_key(), restored.verifying_key());
    }
}
