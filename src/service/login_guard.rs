//! Failed-login throttling.
//!
//! Failures are counted per `(email, ip)` key over a sliding window. When
//! the count reaches the policy's limit the key is locked out for a fixed
//! period; a successful login clears the key. State lives behind an
//! [`AttemptCache`] so several instances can share it.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::domain::Clock;
use crate::error::LedgerError;
use crate::persistence::{AttemptCache, AttemptRecord};

/// Limits applied by a [`LoginGuard`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoginPolicy {
    /// Failures allowed inside `window` before locking.
    pub max_attempts: u32,
    /// Sliding window failures are counted over.
    pub window: Duration,
    /// Lockout length once the limit is hit.
    pub lockout: Duration,
}

impl Default for LoginPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            window: Duration::minutes(15),
            lockout: Duration::minutes(15),
        }
    }
}

/// Current throttling state of one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LoginStatus {
    /// Failures still allowed before a lockout.
    pub remaining_attempts: u32,
    /// End of the current lockout, if any.
    pub locked_until: Option<DateTime<Utc>>,
}

/// Sliding-window login throttle over a shared [`AttemptCache`].
#[derive(Debug, Clone)]
pub struct LoginGuard {
    cache: Arc<dyn AttemptCache>,
    clock: Arc<dyn Clock>,
    policy: LoginPolicy,
}

impl LoginGuard {
    /// Creates a new `LoginGuard`.
    #[must_use]
    pub fn new(cache: Arc<dyn AttemptCache>, clock: Arc<dyn Clock>, policy: LoginPolicy) -> Self {
        Self {
            cache,
            clock,
            policy,
        }
    }

    /// Fails if the key is currently locked out.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::RateLimited`] while a lockout is active.
    /// - [`LedgerError::Internal`] if the cache cannot be read.
    pub async fn check(&self, email: &str, ip: &str) -> Result<(), LedgerError> {
        let key = attempt_key(email, ip);
        let now = self.clock.now();
        let record = self.cache.load(&key).await?.unwrap_or_default();
        match record.locked_until {
            Some(until) if until > now => Err(LedgerError::RateLimited {
                retry_after_secs: retry_after(until, now),
            }),
            _ => Ok(()),
        }
    }

    /// Reports the key's state without changing it.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Internal`] if the cache cannot be read.
    pub async fn status(&self, email: &str, ip: &str) -> Result<LoginStatus, LedgerError> {
        let key = attempt_key(email, ip);
        let now = self.clock.now();
        let record = self.cache.load(&key).await?.unwrap_or_default();
        Ok(self.summarize(&prune(record, self.policy, now), now))
    }

    /// Records a failed login and locks the key once the limit is hit.
    ///
    /// A failure while already locked does not extend the lockout.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Internal`] if the cache cannot be written.
    pub async fn record_failure(&self, email: &str, ip: &str) -> Result<LoginStatus, LedgerError> {
        let key = attempt_key(email, ip);
        let now = self.clock.now();
        let policy = self.policy;
        let mut locked_now = false;
        let locked_flag = &mut locked_now;
        let record = self
            .cache
            .update(
                &key,
                Box::new(move |record| {
                    let record = prune(record, policy, now);
                    let was_locked = record.locked_until.is_some();
                    let record = add_failure(record, policy, now);
                    *locked_flag = !was_locked && record.locked_until.is_some();
                    record
                }),
            )
            .await?;
        if locked_now {
            tracing::warn!(%key, until = %now + policy.lockout, "login locked out");
        }
        Ok(self.summarize(&record, now))
    }

    /// Clears the key after a successful login.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Internal`] if the cache cannot be written.
    pub async fn record_success(&self, email: &str, ip: &str) -> Result<(), LedgerError> {
        self.cache.clear(&attempt_key(email, ip)).await
    }

    fn summarize(&self, record: &AttemptRecord, now: DateTime<Utc>) -> LoginStatus {
        let locked_until = record.locked_until.filter(|until| *until > now);
        let used = u32::try_from(record.failures.len()).unwrap_or(u32::MAX);
        let remaining_attempts = if locked_until.is_some() {
            0
        } else {
            self.policy.max_attempts.saturating_sub(used)
        };
        LoginStatus {
            remaining_attempts,
            locked_until,
        }
    }
}

/// Drops failures older than the window and lockouts that ended.
fn prune(mut record: AttemptRecord, policy: LoginPolicy, now: DateTime<Utc>) -> AttemptRecord {
    let horizon = now - policy.window;
    record.failures.retain(|t| *t > horizon);
    if record.locked_until.is_some_and(|until| until <= now) {
        record.locked_until = None;
    }
    record
}

/// Counts one failure; reaching the limit swaps the failures for a
/// lockout. A failure while already locked does not extend the lockout.
fn add_failure(
    mut record: AttemptRecord,
    policy: LoginPolicy,
    now: DateTime<Utc>,
) -> AttemptRecord {
    if record.locked_until.is_some() {
        return record;
    }
    record.failures.push(now);
    let limit = usize::try_from(policy.max_attempts).unwrap_or(usize::MAX);
    if record.failures.len() >= limit {
        record.locked_until = Some(now + policy.lockout);
        record.failures.clear();
    }
    record
}

fn attempt_key(email: &str, ip: &str) -> String {
    format!("{}|{ip}", email.trim().to_lowercase())
}

fn retry_after(until: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
    let millis = (until - now).num_milliseconds().max(0);
    u64::try_from(millis).map_or(0, |ms| ms.div_ceil(1000))
}
