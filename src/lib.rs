//! # Portiro (authentication core)
//!
//! `portiro` authenticates users against a credential store and protects the
//! login path from brute force. It is the auth core a transport layer embeds:
//! HTTP routing, catalog CRUD, password-change flows, and email transport all
//! live outside and talk to this crate through its seams.
//!
//! ## Login protocol
//!
//! A caller submits `(identifier, password, client_ip)` and gets back one of:
//! an issued token, "second factor required" (TOTP), "third factor required"
//! (emailed one-time code, with a challenge handle), or a typed failure.
//! Rate-limited failures carry the remaining block time when it is known.
//!
//! ## Progressive lockout
//!
//! Five failures from one IP apply a block; block durations escalate
//! (15 s, 1 min, 15 min, permanent) and the escalation level survives block
//! expiry. A single successful login forgives the IP entirely.
//!
//! ## Security boundaries
//!
//! - Responses and logs never distinguish an unknown identifier from a
//!   wrong password.
//! - Raw tokens and one-time codes are never persisted; stores hold hashes.
//! - Security outcomes are plain values; only infrastructure failures
//!   surface as the distinct unavailable category.
//!
//! Logging goes through the `tracing` facade; the embedding application
//! installs the subscriber. Time flows through [`clock::Clock`], so every
//! expiry is testable without sleeping.

pub mod auth;
pub mod clock;
pub mod config;
pub mod delivery;
pub mod password;
pub mod store;

pub use auth::{
    AuthError, AuthenticationService, IpAttemptTracker, LoginOutcome, MfaChallengeService,
    SessionToken, TokenManager, TotpEnrollment,
};
pub use config::AuthConfig;
