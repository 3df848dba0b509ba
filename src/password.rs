//! Password verification seam.
//!
//! Hash computation and strength policy belong to the account system that
//! stores credentials; this crate only needs an opaque one-way comparison.

use argon2::{Argon2, PasswordHash, PasswordVerifier as _};
use secrecy::{ExposeSecret, SecretString};
use tracing::warn;

pub trait PasswordVerifier: Send + Sync {
    /// Compare a plaintext candidate against a stored hash. Any parse or
    /// verification failure is a mismatch; never an error the caller could
    /// distinguish.
    fn verify(&self, plaintext: &SecretString, stored_hash: &str) -> bool;
}

/// Verifier for PHC-format Argon2 hashes.
#[derive(Clone, Copy, Debug, Default)]
pub struct Argon2Verifier;

impl PasswordVerifier for Argon2Verifier {
    fn verify(&self, plaintext: &SecretString, stored_hash: &str) -> bool {
        let parsed = match PasswordHash::new(stored_hash) {
            Ok(parsed) => parsed,
            Err(err) => {
                // A malformed stored hash is a provisioning bug, not an
                // attacker signal; log it and fail the comparison.
                warn!("stored password hash failed to parse: {err}");
                return false;
            }
        };
        Argon2::default()
            .verify_password(plaintext.expose_secret().as_bytes(), &parsed)
            .is_ok()
    }
}

/// Straight string comparison. Test wiring only.
#[derive(Clone, Copy, Debug, Default)]
pub struct PlaintextVerifier;

impl PasswordVerifier for PlaintextVerifier {
    fn verify(&self, plaintext: &SecretString, stored_hash: &str) -> bool {
        plaintext.expose_secret() == stored_hash
    }
}
