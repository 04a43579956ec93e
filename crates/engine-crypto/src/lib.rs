// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = "Canonical JSON, SHA-256 hashing, and HMAC event signing."]
#![deny(unsafe_code)]

//! The cryptographic floor the rest of the supervision layer stands on:
//! deterministic canonical JSON, content hashing, and HMAC signing/
//! verification of trace events against a supervisor secret.

use base64::Engine as _;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use std::env;

type HmacSha256 = Hmac<Sha256>;

/// Canonical JSON recursion is capped at this depth; values nested deeper
/// are rejected rather than silently truncated.
const MAX_CANONICAL_DEPTH: usize = 64;

/// Environment variable carrying a base64-encoded 32-byte supervisor secret.
pub const SUPERVISOR_SECRET_ENV: &str = "SUPERVISOR_SECRET";

/// Minimum accepted secret length in bytes.
pub const MIN_SECRET_LEN: usize = 32;

/// Errors produced by canonicalization, hashing, or signing.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// A value nested deeper than [`MAX_CANONICAL_DEPTH`].
    #[error("value nesting exceeds canonicalization depth limit")]
    TooDeep,
    /// The configured or provided secret was shorter than [`MIN_SECRET_LEN`] bytes.
    #[error("supervisor secret must be at least {MIN_SECRET_LEN} bytes, got {0}")]
    SecretTooShort(usize),
    /// `SUPERVISOR_SECRET` was set but not valid base64.
    #[error("SUPERVISOR_SECRET is not valid base64: {0}")]
    InvalidSecretEncoding(#[source] base64::DecodeError),
    /// HMAC could not be constructed from the given key material.
    #[error("failed to initialize HMAC with the supplied secret")]
    InvalidKeyLength,
}

/// Recursively produce a canonical JSON string: object keys in sorted
/// order, arrays preserved in order, numbers/strings serialized by serde_json.
///
/// `serde_json::Map` is backed by a `BTreeMap` (the `preserve_order` feature
/// is not enabled anywhere in this workspace), so keys are already sorted at
/// every level; this function exists to enforce the depth cap and to give
/// call sites a single place to strip `supervisor_sig` before signing.
pub fn canonicalize(value: &serde_json::Value) -> Result<String, CryptoError> {
    check_depth(value, 0)?;
    serde_json::to_string(value).map_err(|_| CryptoError::TooDeep)
}

fn check_depth(value: &serde_json::Value, depth: usize) -> Result<(), CryptoError> {
    if depth > MAX_CANONICAL_DEPTH {
        return Err(CryptoError::TooDeep);
    }
    match value {
        serde_json::Value::Array(items) => {
            for item in items {
                check_depth(item, depth + 1)?;
            }
        }
        serde_json::Value::Object(map) => {
            for v in map.values() {
                check_depth(v, depth + 1)?;
            }
        }
        _ => {}
    }
    Ok(())
}

/// Hex-encoded SHA-256 digest of arbitrary bytes.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Hex-encoded SHA-256 digest of a canonicalized JSON value.
pub fn hash_value(value: &serde_json::Value) -> Result<String, CryptoError> {
    Ok(sha256_hex(canonicalize(value)?.as_bytes()))
}

/// A process-local, wall-clock-seeded byte stream, hex-encoded. Used for
/// non-cryptographic identifiers (trace nonces, ephemeral secrets) where
/// uniqueness-in-practice is what matters, not unpredictability against an
/// adversary; this avoids adding a dependency on `rand` for that weaker need.
pub fn pseudo_random_hex(n_bytes: usize) -> String {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let mut seed = nanos ^ ((std::process::id() as u128) << 64) ^ 0x2545_F491_4F6C_DD1D;
    let mut out = String::with_capacity(n_bytes * 2);
    for _ in 0..n_bytes {
        seed ^= seed >> 33;
        seed = seed.wrapping_mul(0xFF51_AFD7_ED55_8CCD);
        seed ^= seed >> 33;
        out.push_str(&format!("{:02x}", (seed & 0xFF) as u8));
    }
    out
}

/// A 32-byte supervisor secret used to sign and verify trace events.
#[derive(Clone)]
pub struct Secret(Vec<u8>);

impl Secret {
    /// Wrap raw secret bytes, enforcing the minimum length.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, CryptoError> {
        if bytes.len() < MIN_SECRET_LEN {
            return Err(CryptoError::SecretTooShort(bytes.len()));
        }
        Ok(Self(bytes))
    }

    /// Load the secret from `SUPERVISOR_SECRET` (base64, decoding to at
    /// least [`MIN_SECRET_LEN`] bytes). If the variable is unset, generate
    /// an ephemeral random secret and log a warning; the returned bool is
    /// `true` when the secret is ephemeral.
    pub fn load() -> Result<(Self, bool), CryptoError> {
        match env::var(SUPERVISOR_SECRET_ENV) {
            Ok(encoded) => {
                let bytes = base64::engine::general_purpose::STANDARD
                    .decode(encoded.trim())
                    .map_err(CryptoError::InvalidSecretEncoding)?;
                let secret = Self::from_bytes(bytes)?;
                Ok((secret, false))
            }
            Err(_) => {
                tracing::warn!(
                    target: "engine.crypto",
                    "SUPERVISOR_SECRET not set; generating an ephemeral secret for this process only"
                );
                Ok((Self::ephemeral(), true))
            }
        }
    }

    fn ephemeral() -> Self {
        let mut bytes = vec![0u8; MIN_SECRET_LEN];
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        let pid = std::process::id() as u128;
        let mut seed = nanos ^ (pid << 64) ^ 0x9E37_79B9_7F4A_7C15;
        for byte in bytes.iter_mut() {
            // splitmix64-style mixing; adequate for a best-effort ephemeral
            // per-process secret, not a cryptographic key derivation scheme.
            seed ^= seed >> 33;
            seed = seed.wrapping_mul(0xFF51_AFD7_ED55_8CCD);
            seed ^= seed >> 33;
            *byte = (seed & 0xFF) as u8;
        }
        Self(bytes)
    }

    #[cfg(test)]
    fn test_secret() -> Self {
        Self(vec![7u8; MIN_SECRET_LEN])
    }
}

/// Sign a JSON payload with the supervisor secret, returning the hex HMAC-SHA256.
///
/// The caller is expected to have already removed or nulled any
/// `supervisor_sig` field from `payload`, since the signature covers the
/// payload as given.
pub fn sign_event(secret: &Secret, payload: &serde_json::Value) -> Result<String, CryptoError> {
    let canonical = canonicalize(payload)?;
    let mut mac =
        HmacSha256::new_from_slice(&secret.0).map_err(|_| CryptoError::InvalidKeyLength)?;
    mac.update(canonical.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Verify a hex HMAC-SHA256 signature over a payload, in constant time.
pub fn verify_event_sig(secret: &Secret, payload: &serde_json::Value, signature_hex: &str) -> bool {
    let Ok(canonical) = canonicalize(payload) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(&secret.0) else {
        return false;
    };
    let Ok(expected) = hex::decode(signature_hex) else {
        return false;
    };
    mac.update(canonical.as_bytes());
    mac.verify_slice(&expected).is_ok()
}
