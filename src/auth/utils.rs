//! Small helpers for identifier normalization and token/code generation.

use anyhow::{Context, Result};
use base64::Engine;
use rand::{Rng, RngCore, rngs::OsRng};
use sha2::{Digest, Sha256};

const ONE_TIME_CODE_DIGITS: u32 = 6;

/// Normalize an identifier for lookup (trim + lowercase).
pub(crate) fn normalize_identifier(identifier: &str) -> String {
    identifier.trim().to_lowercase()
}

/// Create a new opaque session token.
/// The raw value is only handed to the caller; the store keeps a hash.
pub(crate) fn generate_token() -> Result<String> {
    let mut bytes = [0u8; 32];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate session token")?;
    Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes))
}

/// Hash a session token so raw values never touch the store.
pub(crate) fn hash_token(token: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.finalize().to_vec()
}

/// Create a numeric one-time code for email challenges, zero-padded.
pub(crate) fn generate_numeric_code() -> String {
    let ceiling = 10u32.pow(ONE_TIME_CODE_DIGITS);
    let code = OsRng.gen_range(0..ceiling);
    format!("{code:06}")
}

/// Hash a one-time code; only the hash is persisted with the challenge.
pub(crate) fn hash_code(code: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(code.as_bytes());
    hasher.finalize().to_vec()
}
