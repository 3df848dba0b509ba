//! The authentication core.
//!
//! Three parts carry the interesting invariants:
//!
//! - [`lockout::IpAttemptTracker`]: the progressive per-IP lockout state
//!   machine (escalating block windows with lazy expiry).
//! - [`token::TokenManager`]: opaque session tokens with a fixed TTL.
//! - [`mfa::MfaChallengeService`]: TOTP second factor and emailed
//!   one-time-code third factor.
//!
//! [`service::AuthenticationService`] orchestrates them per login attempt.

pub mod error;
pub mod lockout;
pub mod mfa;
pub mod service;
pub mod token;
pub mod types;
mod utils;

pub use error::AuthError;
pub use lockout::IpAttemptTracker;
pub use mfa::MfaChallengeService;
pub use service::AuthenticationService;
pub use token::TokenManager;
pub use types::{BlockStatus, LoginOutcome, SessionToken, TotpEnrollment};
