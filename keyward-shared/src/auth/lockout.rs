/// Account lockout policy
///
/// Counts consecutive failed logins per account and locks the account for a
/// fixed window once a threshold is reached.
///
/// # Rules
///
/// - Each failure increments the counter, which never grows past the threshold.
/// - Reaching the threshold sets `locked_until = now + lock_duration`.
/// - While locked, further failures change nothing: the lock does not slide.
/// - Once a lock has elapsed, counting starts again from zero.
/// - A success clears both the counter and the lock.
///
/// The functions here are the reference rules applied to an in-memory
/// [`Account`]. Stores apply the same rules atomically per account (see
/// [`Account::record_failure`] for the PostgreSQL form), so concurrent failed
/// attempts are not undercounted.
///
/// # Example
///
/// ```
/// use keyward_shared::auth::lockout::LockoutPolicy;
/// use keyward_shared::models::account::{Account, CreateAccount};
/// use chrono::{Duration, Utc};
/// use uuid::Uuid;
///
/// let policy = LockoutPolicy::new(3, Duration::minutes(15));
/// let now = Utc::now();
/// let mut account = Account::new(CreateAccount {
///     tenant_id: Uuid::new_v4(),
///     username: "u1".to_string(),
///     email: "u1@example.com".to_string(),
///     password_hash: String::new(),
/// }, now);
///
/// policy.record_failure(&mut account, now);
/// policy.record_failure(&mut account, now);
/// let outcome = policy.record_failure(&mut account, now);
///
/// assert!(outcome.locked);
/// assert!(policy.is_locked(&account, now));
/// ```

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::models::account::Account;

/// Result of recording a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockoutOutcome {
    /// Whether the account is locked after this failure
    pub locked: bool,

    /// End of the lock window, if locked
    pub lock_until: Option<DateTime<Utc>>,

    /// Counter value after this failure
    pub failed_attempts: i32,
}

/// Threshold and window for locking accounts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockoutPolicy {
    threshold: u32,
    lock_duration: Duration,
}

impl LockoutPolicy {
    /// Creates a policy
    ///
    /// A threshold of zero is treated as one.
    pub fn new(threshold: u32, lock_duration: Duration) -> Self {
        Self {
            threshold: threshold.max(1),
            lock_duration,
        }
    }

    /// End of a lock starting at `now`, saturating at the latest representable instant
    pub fn lock_until(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now.checked_add_signed(self.lock_duration)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Threshold as stored in the `failed_login_attempts` column
    pub fn threshold_i32(&self) -> i32 {
        i32::try_from(self.threshold).unwrap_or(i32::MAX)
    }

    /// Whether login is currently refused, regardless of the counter
    pub fn is_locked(&self, account: &Account, now: DateTime<Utc>) -> bool {
        account.locked_until.is_some_and(|until| until > now)
    }

    /// Applies one failed attempt to `account`
    pub fn record_failure(&self, account: &mut Account, now: DateTime<Utc>) -> LockoutOutcome {
        if self.is_locked(account, now) {
            return LockoutOutcome {
                locked: true,
                lock_until: account.locked_until,
                failed_attempts: account.failed_login_attempts,
            };
        }

        // An elapsed lock leaves the counter parked at the threshold
        let base = if account.locked_until.is_some() {
            0
        } else {
            account.failed_login_attempts
        };
        let threshold = self.threshold_i32();
        let next = base.saturating_add(1).min(threshold);

        account.failed_login_attempts = next;
        account.updated_at = now;

        if next >= threshold {
            let until = self.lock_until(now);
            account.locked_until = Some(until);
            LockoutOutcome {
                locked: true,
                lock_until: Some(until),
                failed_attempts: next,
            }
        } else {
            account.locked_until = None;
            LockoutOutcome {
                locked: false,
                lock_until: None,
                failed_attempts: next,
            }
        }
    }
}

/// Clears the counter and any lock after a successful authentication
pub fn record_success(account: &mut Account) {
    account.failed_login_attempts = 0;
    account.locked_until = None;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::account::CreateAccount;
    use uuid::Uuid;

    fn account(now: DateTime<Utc>) -> Account {
        Account::new(
            CreateAccount {
                tenant_id: Uuid::new_v4(),
                username: "u1".to_string(),
                email: "u1@example.com".to_string(),
                password_hash: String::new(),
            },
            now,
        )
    }

    #[test]
    fn test_counts_up_to_threshold_then_locks() {
        let policy = LockoutPolicy::new(5, Duration::minutes(15));
        let now = Utc::now();
        let mut acct = account(now);

        for attempt in 1..5 {
            let outcome = policy.record_failure(&mut acct, now);
            assert!(!outcome.locked, "attempt {} should not lock", attempt);
            assert_eq!(outcome.failed_attempts, attempt);
        }

        let outcome = policy.record_failure(&mut acct, now);
        assert!(outcome.locked);
        assert_eq!(outcome.lock_until, Some(now + Duration::minutes(15)));
        assert_eq!(acct.failed_login_attempts, 5);
        assert!(policy.is_locked(&acct, now));
    }

    #[test]
    fn test_lock_does_not_slide_or_grow() {
        let policy = LockoutPolicy::new(2, Duration::minutes(10));
        let start = Utc::now();
        let mut acct = account(start);

        policy.record_failure(&mut acct, start);
        let locked = policy.record_failure(&mut acct, start);
        let until = locked.lock_until.unwrap();

        let later = start + Duration::minutes(5);
        let again = policy.record_failure(&mut acct, later);

        assert!(again.locked);
        assert_eq!(again.lock_until, Some(until));
        assert_eq!(acct.failed_login_attempts, 2);
    }

    #[test]
    fn test_lock_expires_and_counting_restarts() {
        let policy = LockoutPolicy::new(3, Duration::minutes(1));
        let start = Utc::now();
        let mut acct = account(start);

        for _ in 0..3 {
            policy.record_failure(&mut acct, start);
        }
        assert!(policy.is_locked(&acct, start));

        let after = start + Duration::minutes(2);
        assert!(!policy.is_locked(&acct, after));

        let outcome = policy.record_failure(&mut acct, after);
        assert!(!outcome.locked);
        assert_eq!(outcome.failed_attempts, 1);
        assert!(acct.locked_until.is_none());
    }

    #[test]
    fn test_lock_boundary_is_exclusive() {
        let policy = LockoutPolicy::new(1, Duration::minutes(1));
        let start = Utc::now();
        let mut acct = account(start);

        let outcome = policy.record_failure(&mut acct, start);
        let until = outcome.lock_until.unwrap();

        assert!(policy.is_locked(&acct, until - Duration::milliseconds(1)));
        assert!(!policy.is_locked(&acct, until));
    }

    #[test]
    fn test_success_clears_counter_and_lock() {
        let policy = LockoutPolicy::new(2, Duration::minutes(1));
        let now = Utc::now();
        let mut acct = account(now);

        policy.record_failure(&mut acct, now);
        policy.record_failure(&mut acct, now);
        record_success(&mut acct);

        assert_eq!(acct.failed_login_attempts, 0);
        assert!(acct.locked_until.is_none());
        assert!(!policy.is_locked(&acct, now));
    }

    #[test]
    fn test_huge_lock_duration_saturates() {
        let policy = LockoutPolicy::new(1, Duration::MAX);
        let now = Utc::now();
        let mut acct = account(now);

        let outcome = policy.record_failure(&mut acct, now);
        assert!(outcome.locked);
        assert_eq!(outcome.lock_until, Some(DateTime::<Utc>::MAX_UTC));
        assert!(policy.is_locked(&acct, now));
    }

    #[test]
    fn test_zero_threshold_treated_as_one() {
        let policy = LockoutPolicy::new(0, Duration::minutes(1));
        assert_eq!(policy.threshold_i32(), 1);
    }
}
