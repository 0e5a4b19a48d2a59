//! did:key Bearer Tokens
//!
//! Short-lived EdDSA JWTs for authenticating a caller to a service
//! boundary. The issuer and subject claims are both the caller's did:key
//! identifier, so the verifier re-derives the public key from the token
//! itself instead of consulting a key registry.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::Utc;
use ed25519_dalek::{Signature, Signer, SigningKey};
use serde::{Deserialize, Serialize};

use crate::auth::did::{self, DID_KEY_PREFIX};
use crate::error::{ArmatureError, Result};

/// Default token lifetime.
pub const DEFAULT_TTL_SECONDS: i64 = 60;

#[derive(Debug, Serialize, Deserialize)]
struct JwtHeader {
    alg: String,
    typ: String,
    kid: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JwtClaims {
    pub iss: String,
    pub sub: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
}

/// Issue a signed bearer token for the given audience.
///
/// The key id header is `issuer#identifier`, which verification checks
/// byte-for-byte to block key-substitution tokens.
pub fn issue_jwt(
    signing_key: &SigningKey,
    identifier: &str,
    audience: &str,
    ttl_seconds: Option<i64>,
) -> Result<String> {
    let issuer = format!("{}{}", DID_KEY_PREFIX, identifier);
    let iat = Utc::now().timestamp();
    let exp = iat + ttl_seconds.unwrap_or(DEFAULT_TTL_SECONDS);

    let header = JwtHeader {
        alg: "EdDSA".to_string(),
        typ: "JWT".to_string(),
        kid: format!("{}#{}", issuer, identifier),
    };
    let claims = JwtClaims {
        iss: issuer.clone(),
        sub: issuer,
        aud: audience.to_string(),
        iat,
        exp,
    };

    let signing_input = format!(
        "{}.{}",
        URL_SAFE_NO_PAD.encode(serde_json::to_vec(&header)?),
        URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims)?)
    );
    let signature = signing_key.sign(signing_input.as_bytes());

    Ok(format!(
        "{}.{}",
        signing_input,
        URL_SAFE_NO_PAD.encode(signature.to_bytes())
    ))
}

/// Verify a bearer token and return its claims.
///
/// Checks, in order: structural shape, did:key issuer, subject equals
/// issuer, signature under the key re-derived from the issuer, expiry,
/// audience (when expected), and exact `kid` equality.
pub fn verify_jwt(token: &str, expected_audience: Option<&str>) -> Result<JwtClaims> {
    let mut parts = token.split('.');
    let (header_b64, claims_b64, signature_b64) = match (
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
    ) {
        (Some(h), Some(c), Some(s), None) => (h, c, s),
        _ => return Err(ArmatureError::auth("token is not a three-part JWT")),
    };

    let claims: JwtClaims = decode_json_segment(claims_b64, "claims")?;

    if !claims.iss.starts_with(DID_KEY_PREFIX) {
        return Err(ArmatureError::auth(
            "issuer claim is not a did:key identifier",
        ));
    }
    if claims.sub != claims.iss {
        return Err(ArmatureError::auth("subject claim must equal issuer claim"));
    }

    let identifier = &claims.iss[DID_KEY_PREFIX.len()..];
    let public_key = did::public_key_from_identifier(identifier)?;

    let signature_bytes = URL_SAFE_NO_PAD
        .decode(signature_b64)
        .map_err(|e| ArmatureError::auth(format!("signature is not valid base64url: {}", e)))?;
    let signature_bytes: [u8; 64] = signature_bytes
        .try_into()
        .map_err(|_| ArmatureError::auth("signature must be exactly 64 bytes"))?;
    let signature = Signature::from_bytes(&signature_bytes);

    let signing_input = format!("{}.{}", header_b64, claims_b64);
    public_key
        .verify_strict(signing_input.as_bytes(), &signature)
        .map_err(|_| ArmatureError::auth("token signature does not verify"))?;

    if claims.exp <= Utc::now().timestamp() {
        return Err(ArmatureError::auth("token is expired"));
    }

    if let Some(audience) = expected_audience {
        if claims.aud != audience {
            return Err(ArmatureError::auth(format!(
                "token audience '{}' does not match '{}'",
                claims.aud, audience
            )));
        }
    }

    let header: JwtHeader = decode_json_segment(header_b64, "header")?;
    if header.alg != "EdDSA" {
        return Err(ArmatureError::auth(format!(
            "unsupported token algorithm '{}'",
            header.alg
        )));
    }
    let expected_kid = format!("{}#{}", claims.iss, identifier);
    if header.kid != expected_kid {
        return Err(ArmatureError::auth(format!(
            "key id header '{}' does not match '{}'",
            header.kid, expected_kid
        )));
    }

    Ok(claims)
}

fn decode_json_segment<T: serde::de::DeserializeOwned>(
    segment: &str,
    label: &str,
) -> Result<T> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|e| ArmatureError::auth(format!("token {} is not valid base64url: {}", label, e)))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| ArmatureError::auth(format!("token {} is not valid JSON: {}", label, e)))
}
