//! Account lockout state machine.
//!
//! The transition logic is a pure function over [`AccountSecurity`];
//! persistence and signal publication are explicit side effects applied by
//! [`Authenticator`], which serializes concurrent attempts against the same
//! account through the store's optimistic version check.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use crate::auth::passwords::PasswordService;
use crate::auth::store::{CredentialRecord, CredentialStore};
use crate::auth::{AuthConfig, AuthError, AuthResult};

/// Bounded retries for the read-attempt-save loop on version conflicts.
const MAX_SAVE_RETRIES: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountStatus {
    Active,
    /// Temporarily locked by failed attempts; expires lazily.
    Locked,
    /// Administrative override; a correct password cannot clear it.
    Suspended,
    /// Created but not yet verified; cannot log in.
    PendingVerification,
}

impl AccountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::Active => "ACTIVE",
            AccountStatus::Locked => "LOCKED",
            AccountStatus::Suspended => "SUSPENDED",
            AccountStatus::PendingVerification => "PENDING_VERIFICATION",
        }
    }

    pub fn from_str(status: &str) -> Self {
        match status {
            "LOCKED" => AccountStatus::Locked,
            "SUSPENDED" => AccountStatus::Suspended,
            "PENDING_VERIFICATION" => AccountStatus::PendingVerification,
            _ => AccountStatus::Active,
        }
    }
}

/// The mutable slice of the account aggregate this subsystem owns.
///
/// `version` is the optimistic-concurrency counter; the store rejects a
/// save whose version no longer matches the persisted row.
#[derive(Debug, Clone, PartialEq)]
pub struct AccountSecurity {
    pub status: AccountStatus,
    pub failed_attempts: i32,
    pub locked_until: Option<DateTime<Utc>>,
    pub version: i64,
}

impl AccountSecurity {
    pub fn new() -> Self {
        Self {
            status: AccountStatus::Active,
            failed_attempts: 0,
            locked_until: None,
            version: 0,
        }
    }

    /// A lock is only effective while `locked_until` lies in the future.
    pub fn is_locked(&self, now: DateTime<Utc>) -> bool {
        self.status == AccountStatus::Locked
            && self.locked_until.map_or(false, |until| now < until)
    }

    /// Administrative suspension; ignores and preserves the attempt counter.
    pub fn suspend(&mut self) {
        self.status = AccountStatus::Suspended;
    }

    /// Administrative reactivation; clears counters and any lock.
    pub fn reactivate(&mut self) {
        self.status = AccountStatus::Active;
        self.failed_attempts = 0;
        self.locked_until = None;
    }
}

impl Default for AccountSecurity {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct LockoutPolicy {
    pub max_failed_attempts: i32,
    pub lock_duration: Duration,
}

impl LockoutPolicy {
    pub fn from_config(config: &AuthConfig) -> Self {
        Self {
            max_failed_attempts: config.max_failed_attempts,
            lock_duration: Duration::seconds(config.lock_duration_secs),
        }
    }
}

impl Default for LockoutPolicy {
    fn default() -> Self {
        Self {
            max_failed_attempts: 5,
            lock_duration: Duration::minutes(30),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AttemptOutcome {
    Success,
    InvalidPassword,
    LockedOut { until: DateTime<Utc> },
    Suspended,
    PendingVerification,
}

/// Signals emitted by an authentication attempt, returned to the caller
/// for publication rather than fired from inside the state machine.
#[derive(Debug, Clone, PartialEq)]
pub enum AccountEvent {
    LoginSucceeded,
    LoginFailed { attempts: i32 },
    AccountLocked { until: DateTime<Utc> },
}

#[derive(Debug)]
pub struct AttemptResult {
    pub security: AccountSecurity,
    pub outcome: AttemptOutcome,
    pub events: Vec<AccountEvent>,
}

/// Evaluate one authentication attempt against the current security state.
///
/// `password_matches` is only invoked when the attempt is permitted: a
/// suspended, effectively-locked, or unverified account never reaches the
/// password comparison, so the result cannot leak whether the candidate
/// was correct.
pub fn attempt(
    mut security: AccountSecurity,
    password_matches: impl FnOnce() -> bool,
    now: DateTime<Utc>,
    policy: &LockoutPolicy,
) -> AttemptResult {
    if security.status == AccountStatus::Suspended {
        return AttemptResult {
            security,
            outcome: AttemptOutcome::Suspended,
            events: Vec::new(),
        };
    }

    if security.status == AccountStatus::PendingVerification {
        return AttemptResult {
            security,
            outcome: AttemptOutcome::PendingVerification,
            events: Vec::new(),
        };
    }

    if security.status == AccountStatus::Locked {
        match security.locked_until {
            Some(until) if now < until => {
                return AttemptResult {
                    security,
                    outcome: AttemptOutcome::LockedOut { until },
                    events: Vec::new(),
                };
            }
            _ => {
                // Lazy unlock: the lock expired, so this same attempt
                // proceeds against a clean counter.
                security.status = AccountStatus::Active;
                security.failed_attempts = 0;
                security.locked_until = None;
            }
        }
    }

    if password_matches() {
        security.failed_attempts = 0;
        security.locked_until = None;
        return AttemptResult {
            security,
            outcome: AttemptOutcome::Success,
            events: vec![AccountEvent::LoginSucceeded],
        };
    }

    security.failed_attempts += 1;
    let mut events = vec![AccountEvent::LoginFailed {
        attempts: security.failed_attempts,
    }];

    if security.failed_attempts >= policy.max_failed_attempts {
        let until = now + policy.lock_duration;
        security.status = AccountStatus::Locked;
        security.locked_until = Some(until);
        events.push(AccountEvent::AccountLocked { until });
        return AttemptResult {
            security,
            outcome: AttemptOutcome::LockedOut { until },
            events,
        };
    }

    AttemptResult {
        security,
        outcome: AttemptOutcome::InvalidPassword,
        events,
    }
}

/// Single entry point for every mutation of account security state.
///
/// Drives the full lockout-check / password-compare / persist sequence,
/// re-reading and re-running the whole attempt when the versioned save
/// reports a conflict. The Argon2 comparison runs with no locks held; the
/// version check is the only serialization point.
pub struct Authenticator {
    store: Arc<dyn CredentialStore>,
    passwords: Arc<PasswordService>,
    policy: LockoutPolicy,
}

impl Authenticator {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        passwords: Arc<PasswordService>,
        policy: LockoutPolicy,
    ) -> Self {
        Self {
            store,
            passwords,
            policy,
        }
    }

    /// Authenticate an email/password pair, returning the account record on
    /// success. Unknown accounts, wrong passwords, suspension, and pending
    /// verification all surface as the uniform invalid-credentials error;
    /// only an effective lockout is reported distinctly.
    pub async fn authenticate(&self, email: &str, password: &str) -> AuthResult<CredentialRecord> {
        for retry in 0..MAX_SAVE_RETRIES {
            let record = self
                .store
                .find_by_email(email)
                .await?
                .ok_or(AuthError::InvalidCredentials)?;

            let now = Utc::now();
            let result = attempt(
                record.security.clone(),
                || self.passwords.verify_password(password, &record.password_hash),
                now,
                &self.policy,
            );

            // The mutation must be durable before the outcome is reported.
            let saved = if result.security != record.security {
                let mut updated = record;
                updated.security = result.security;
                match self.store.save(&updated).await {
                    Ok(saved) => saved,
                    Err(AuthError::Conflict) => {
                        log::debug!(
                            "security state conflict for {email}, retrying attempt ({} of {MAX_SAVE_RETRIES})",
                            retry + 1
                        );
                        continue;
                    }
                    Err(err) => return Err(err),
                }
            } else {
                record
            };

            publish_events(&saved, &result.events);

            return match result.outcome {
                AttemptOutcome::Success => Ok(saved),
                AttemptOutcome::LockedOut { until } => Err(AuthError::AccountLocked { until }),
                AttemptOutcome::InvalidPassword
                | AttemptOutcome::Suspended
                | AttemptOutcome::PendingVerification => Err(AuthError::InvalidCredentials),
            };
        }

        log::error!("authentication retries exhausted for {email}");
        Err(AuthError::Conflict)
    }

    /// Administrative suspension of an account.
    pub async fn suspend(&self, id: uuid::Uuid) -> AuthResult<CredentialRecord> {
        self.mutate(id, |security| security.suspend()).await
    }

    /// Administrative reactivation of a suspended account.
    pub async fn reactivate(&self, id: uuid::Uuid) -> AuthResult<CredentialRecord> {
        self.mutate(id, |security| security.reactivate()).await
    }

    async fn mutate(
        &self,
        id: uuid::Uuid,
        apply: impl Fn(&mut AccountSecurity),
    ) -> AuthResult<CredentialRecord> {
        for _ in 0..MAX_SAVE_RETRIES {
            let mut record = self
                .store
                .find_by_id(id)
                .await?
                .ok_or(AuthError::AccountNotFound)?;

            apply(&mut record.security);

            match self.store.save(&record).await {
                Ok(saved) => return Ok(saved),
                Err(AuthError::Conflict) => continue,
                Err(err) => return Err(err),
            }
        }

        Err(AuthError::Conflict)
    }
}

fn publish_events(record: &CredentialRecord, events: &[AccountEvent]) {
    for event in events {
        match event {
            AccountEvent::LoginSucceeded => {
                log::info!("login succeeded for account {}", record.id);
            }
            AccountEvent::LoginFailed { attempts } => {
                log::warn!(
                    "login failed for account {} (attempt {attempts})",
                    record.id
                );
            }
            AccountEvent::AccountLocked { until } => {
                log::warn!("account {} locked until {until}", record.id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn policy() -> LockoutPolicy {
        LockoutPolicy::default()
    }

    fn active(failed_attempts: i32) -> AccountSecurity {
        AccountSecurity {
            status: AccountStatus::Active,
            failed_attempts,
            locked_until: None,
            version: 7,
        }
    }

    #[test]
    fn fifth_consecutive_failure_locks_the_account() {
        let now = Utc::now();
        let mut security = active(0);

        for expected in 1..=4 {
            let result = attempt(security, || false, now, &policy());
            assert_eq!(result.outcome, AttemptOutcome::InvalidPassword);
            assert_eq!(
                result.events,
                vec![AccountEvent::LoginFailed { attempts: expected }]
            );
            security = result.security;
        }

        let result = attempt(security, || false, now, &policy());
        let until = now + Duration::minutes(30);
        assert_eq!(result.outcome, AttemptOutcome::LockedOut { until });
        assert_eq!(result.security.status, AccountStatus::Locked);
        assert_eq!(result.security.failed_attempts, 5);
        assert_eq!(result.security.locked_until, Some(until));
        assert_eq!(
            result.events,
            vec![
                AccountEvent::LoginFailed { attempts: 5 },
                AccountEvent::AccountLocked { until },
            ]
        );
    }

    #[test]
    fn locked_account_rejects_without_comparing_the_password() {
        let now = Utc::now();
        let until = now + Duration::minutes(10);
        let security = AccountSecurity {
            status: AccountStatus::Locked,
            failed_attempts: 5,
            locked_until: Some(until),
            version: 1,
        };

        let compared = Cell::new(false);
        let result = attempt(
            security,
            || {
                compared.set(true);
                true
            },
            now,
            &policy(),
        );

        assert_eq!(result.outcome, AttemptOutcome::LockedOut { until });
        assert!(!compared.get(), "password must not be compared while locked");
        assert_eq!(result.security.failed_attempts, 5);
    }

    #[test]
    fn expired_lock_unlocks_lazily_on_the_same_attempt() {
        let now = Utc::now();
        let security = AccountSecurity {
            status: AccountStatus::Locked,
            failed_attempts: 5,
            locked_until: Some(now - Duration::seconds(1)),
            version: 1,
        };

        let result = attempt(security, || true, now, &policy());
        assert_eq!(result.outcome, AttemptOutcome::Success);
        assert_eq!(result.security.status, AccountStatus::Active);
        assert_eq!(result.security.failed_attempts, 0);
        assert_eq!(result.security.locked_until, None);
    }

    #[test]
    fn expired_lock_with_wrong_password_restarts_the_counter() {
        let now = Utc::now();
        let security = AccountSecurity {
            status: AccountStatus::Locked,
            failed_attempts: 5,
            locked_until: Some(now - Duration::seconds(1)),
            version: 1,
        };

        let result = attempt(security, || false, now, &policy());
        assert_eq!(result.outcome, AttemptOutcome::InvalidPassword);
        assert_eq!(result.security.status, AccountStatus::Active);
        assert_eq!(result.security.failed_attempts, 1);
    }

    #[test]
    fn success_resets_counters_and_clears_the_lock_timestamp() {
        let now = Utc::now();
        let result = attempt(active(3), || true, now, &policy());
        assert_eq!(result.outcome, AttemptOutcome::Success);
        assert_eq!(result.security.failed_attempts, 0);
        assert_eq!(result.security.locked_until, None);
        assert_eq!(result.events, vec![AccountEvent::LoginSucceeded]);
    }

    #[test]
    fn suspension_overrides_a_correct_password() {
        let now = Utc::now();
        let security = AccountSecurity {
            status: AccountStatus::Suspended,
            failed_attempts: 2,
            locked_until: None,
            version: 1,
        };

        let compared = Cell::new(false);
        let result = attempt(
            security.clone(),
            || {
                compared.set(true);
                true
            },
            now,
            &policy(),
        );

        assert_eq!(result.outcome, AttemptOutcome::Suspended);
        assert!(!compared.get());
        assert_eq!(result.security, security);
        assert!(result.events.is_empty());
    }

    #[test]
    fn unverified_account_cannot_log_in() {
        let now = Utc::now();
        let security = AccountSecurity {
            status: AccountStatus::PendingVerification,
            failed_attempts: 0,
            locked_until: None,
            version: 1,
        };

        let result = attempt(security.clone(), || true, now, &policy());
        assert_eq!(result.outcome, AttemptOutcome::PendingVerification);
        assert_eq!(result.security, security);
    }

    #[test]
    fn reactivate_clears_counters() {
        let mut security = AccountSecurity {
            status: AccountStatus::Suspended,
            failed_attempts: 4,
            locked_until: Some(Utc::now()),
            version: 3,
        };
        security.reactivate();
        assert_eq!(security.status, AccountStatus::Active);
        assert_eq!(security.failed_attempts, 0);
        assert_eq!(security.locked_until, None);
    }

    #[test]
    fn status_strings_round_trip() {
        for status in [
            AccountStatus::Active,
            AccountStatus::Locked,
            AccountStatus::Suspended,
            AccountStatus::PendingVerification,
        ] {
            assert_eq!(AccountStatus::from_str(status.as_str()), status);
        }
    }
}
