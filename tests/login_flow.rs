//! End-to-end login flows over the in-memory store and a manual clock.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Duration, TimeZone, Utc};
use secrecy::SecretString;
use uuid::Uuid;

use portiro::auth::{AuthError, IpAttemptTracker, LoginOutcome, MfaChallengeService, TokenManager};
use portiro::clock::{Clock, ManualClock};
use portiro::config::AuthConfig;
use portiro::delivery::MemoryCodeSender;
use portiro::password::PlaintextVerifier;
use portiro::store::memory::MemoryStore;
use portiro::store::{AccountRole, AttemptStore, CredentialRecord};
use portiro::AuthenticationService;

const IP: &str = "198.51.100.7";
const IDENTIFIER: &str = "user@example.com";
const PASSWORD: &str = "correct horse battery staple";

struct Harness {
    service: AuthenticationService,
    store: Arc<MemoryStore>,
    clock: Arc<ManualClock>,
    sender: Arc<MemoryCodeSender>,
}

fn harness() -> Harness {
    let start = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
    let clock = Arc::new(ManualClock::new(start));
    let store = Arc::new(MemoryStore::new());
    let sender = Arc::new(MemoryCodeSender::new());
    let config = AuthConfig::new();

    let tracker = IpAttemptTracker::new(store.clone(), clock.clone());
    let tokens = TokenManager::new(store.clone(), clock.clone(), &config);
    let mfa = MfaChallengeService::new(
        store.clone(),
        store.clone(),
        sender.clone(),
        clock.clone(),
        &config,
    );
    let service = AuthenticationService::new(
        store.clone(),
        Arc::new(PlaintextVerifier),
        tracker,
        tokens,
        mfa,
        clock.clone(),
    );
    Harness {
        service,
        store,
        clock,
        sender,
    }
}

impl Harness {
    async fn seed_account(&self, email_code_enabled: bool) -> Uuid {
        let account_id = Uuid::new_v4();
        self.store
            .upsert_credential(CredentialRecord {
                account_id,
                identifier: IDENTIFIER.to_string(),
                // PlaintextVerifier compares directly.
                password_hash: PASSWORD.to_string(),
                expires_at: None,
                previous_hashes: Vec::new(),
                role: AccountRole::Listener,
                email_code_enabled,
            })
            .await;
        account_id
    }

    async fn login(&self, password: &str) -> Result<LoginOutcome, AuthError> {
        self.service
            .login(IDENTIFIER, &SecretString::from(password.to_string()), IP)
            .await
    }
}

#[tokio::test]
async fn password_only_login_issues_a_valid_token() {
    let harness = harness();
    let account_id = harness.seed_account(false).await;

    let outcome = harness.login(PASSWORD).await.unwrap();
    let LoginOutcome::Granted { token } = outcome else {
        panic!("expected Granted, got {outcome:?}");
    };
    assert_eq!(token.account_id, account_id);

    let resolved = harness.service.validate_token(&token.token).await.unwrap();
    assert_eq!(resolved, account_id);
}

#[tokio::test]
async fn five_failures_block_even_the_correct_password() {
    let harness = harness();
    harness.seed_account(false).await;

    for _ in 0..5 {
        let err = harness.login("wrong password").await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));
    }

    // The 6th attempt carries the right password and is still rejected,
    // with the remaining block time reported.
    let err = harness.login(PASSWORD).await.unwrap_err();
    let AuthError::RateLimited { retry_after } = err else {
        panic!("expected RateLimited, got {err:?}");
    };
    assert_eq!(retry_after, Some(StdDuration::from_secs(15)));

    // Past the window the correct password works and forgives everything.
    harness.clock.advance(Duration::seconds(16));
    let outcome = harness.login(PASSWORD).await.unwrap();
    assert!(matches!(outcome, LoginOutcome::Granted { .. }));

    let record = AttemptStore::load(harness.store.as_ref(), IP)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.block_count, 0);
    assert_eq!(record.failed_attempts, 0);
    assert!(!record.blocked);
}

#[tokio::test]
async fn unknown_identifier_is_indistinguishable_and_counts_failures() {
    let harness = harness();
    // No account seeded at all.
    for _ in 0..5 {
        let err = harness.login(PASSWORD).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));
    }
    let err = harness.login(PASSWORD).await.unwrap_err();
    assert!(matches!(err, AuthError::RateLimited { .. }));
}

#[tokio::test]
async fn escalation_reaches_a_permanent_block() {
    let harness = harness();
    harness.seed_account(false).await;

    // Three full cycles: fail to a block, wait it out, fail again.
    for wait_seconds in [16, 61, 901] {
        for _ in 0..5 {
            let err = harness.login("wrong password").await.unwrap_err();
            assert!(matches!(err, AuthError::InvalidCredentials));
        }
        assert!(matches!(
            harness.login(PASSWORD).await.unwrap_err(),
            AuthError::RateLimited {
                retry_after: Some(_)
            }
        ));
        harness.clock.advance(Duration::seconds(wait_seconds));
    }

    // Fourth cycle escalates to permanent.
    for _ in 0..5 {
        harness.login("wrong password").await.unwrap_err();
    }
    let err = harness.login(PASSWORD).await.unwrap_err();
    assert!(matches!(
        err,
        AuthError::RateLimited { retry_after: None }
    ));

    // Waiting does not help a permanent block.
    harness.clock.advance(Duration::days(365));
    let err = harness.login(PASSWORD).await.unwrap_err();
    assert!(matches!(
        err,
        AuthError::RateLimited { retry_after: None }
    ));
}

#[tokio::test]
async fn totp_second_factor_gates_the_login() {
    let harness = harness();
    let account_id = harness.seed_account(false).await;

    // Enroll and confirm possession with the current code.
    let enrollment = harness
        .service
        .enroll_second_factor(account_id)
        .await
        .unwrap();
    let secret = totp_rs::Secret::Encoded(enrollment.secret_base32.clone())
        .to_bytes()
        .unwrap();
    let totp = totp_rs::TOTP::new(
        totp_rs::Algorithm::SHA1,
        6,
        1,
        30,
        secret,
        Some("portiro".to_string()),
        "account".to_string(),
    )
    .unwrap();
    let now_ts = || u64::try_from(harness.clock.now().timestamp()).unwrap();

    harness
        .service
        .verify_second_factor(account_id, &totp.generate(now_ts()))
        .await
        .unwrap();

    // With TOTP enabled, a correct password no longer grants directly.
    let outcome = harness.login(PASSWORD).await.unwrap();
    assert_eq!(outcome, LoginOutcome::SecondFactorRequired { account_id });

    // A code from outside the skew window is a mismatch.
    let stale = totp.generate(now_ts() - 120);
    let err = harness
        .service
        .verify_second_factor(account_id, &stale)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::ChallengeMismatch));

    // The current code completes the login with a working token.
    let token = harness
        .service
        .verify_second_factor(account_id, &totp.generate(now_ts()))
        .await
        .unwrap();
    let resolved = harness.service.validate_token(&token.token).await.unwrap();
    assert_eq!(resolved, account_id);
}

#[tokio::test]
async fn email_third_factor_round_trip() {
    let harness = harness();
    let account_id = harness.seed_account(true).await;

    let outcome = harness.login(PASSWORD).await.unwrap();
    let LoginOutcome::ThirdFactorRequired { challenge_id } = outcome else {
        panic!("expected ThirdFactorRequired, got {outcome:?}");
    };

    let code = harness.sender.last_code_for(IDENTIFIER).await.unwrap();
    let token = harness
        .service
        .verify_third_factor(challenge_id, &code)
        .await
        .unwrap();
    assert_eq!(token.account_id, account_id);

    // The challenge was consumed; replaying it is a not-found.
    let err = harness
        .service
        .verify_third_factor(challenge_id, &code)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::ChallengeNotFound));
}

#[tokio::test]
async fn email_challenge_expires_after_fifteen_minutes() {
    let harness = harness();
    harness.seed_account(true).await;

    let outcome = harness.login(PASSWORD).await.unwrap();
    let LoginOutcome::ThirdFactorRequired { challenge_id } = outcome else {
        panic!("expected ThirdFactorRequired, got {outcome:?}");
    };
    let code = harness.sender.last_code_for(IDENTIFIER).await.unwrap();

    harness.clock.advance(Duration::minutes(16));
    let err = harness
        .service
        .verify_third_factor(challenge_id, &code)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::ChallengeExpired));
}

#[tokio::test]
async fn expired_password_is_accepted_but_flagged() {
    let harness = harness();
    let account_id = Uuid::new_v4();
    harness
        .store
        .upsert_credential(CredentialRecord {
            account_id,
            identifier: IDENTIFIER.to_string(),
            password_hash: PASSWORD.to_string(),
            expires_at: Some(harness.clock.now() - Duration::days(1)),
            previous_hashes: vec!["old-hash".to_string()],
            role: AccountRole::Listener,
            email_code_enabled: false,
        })
        .await;

    let outcome = harness.login(PASSWORD).await.unwrap();
    assert_eq!(outcome, LoginOutcome::PasswordExpired { account_id });
}

#[tokio::test]
async fn session_expires_at_the_ttl_and_logout_is_idempotent() {
    let harness = harness();
    harness.seed_account(false).await;

    let LoginOutcome::Granted { token } = harness.login(PASSWORD).await.unwrap() else {
        panic!("expected Granted");
    };

    harness.clock.advance(Duration::hours(25));
    let err = harness
        .service
        .validate_token(&token.token)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::TokenExpired));

    harness.service.logout(&token.token).await.unwrap();
    harness.service.logout(&token.token).await.unwrap();
}
