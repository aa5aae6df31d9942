//! Failed attempt lockout for PIN unlock

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default maximum failed attempts before a timed lockout
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Default lockout duration in seconds
pub const DEFAULT_LOCKOUT_SECONDS: u64 = 60;

/// Default failures before returning to the start screen
pub const DEFAULT_RETURN_TO_START_ATTEMPTS: u32 = 2;

/// Generic failure text; never reveals why the PIN was rejected
pub const PIN_NOT_RECOGNIZED: &str = "PIN not recognized in this device";

/// What happens when the unlock attempts run out
///
/// Chosen once per deployment through configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum LockoutPolicy {
    /// Reject all attempts for `duration_secs` after `max_attempts` failures
    TimedLockout { max_attempts: u32, duration_secs: u64 },
    /// Send the user back to the selection screen after `max_attempts` failures
    ReturnToStartAfter { max_attempts: u32 },
}

impl Default for LockoutPolicy {
    fn default() -> Self {
        LockoutPolicy::TimedLockout {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            duration_secs: DEFAULT_LOCKOUT_SECONDS,
        }
    }
}

impl LockoutPolicy {
    pub fn return_to_start() -> Self {
        LockoutPolicy::ReturnToStartAfter {
            max_attempts: DEFAULT_RETURN_TO_START_ATTEMPTS,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        match self {
            LockoutPolicy::TimedLockout { max_attempts, .. } => *max_attempts,
            LockoutPolicy::ReturnToStartAfter { max_attempts } => *max_attempts,
        }
    }

    pub fn lockout_duration(&self) -> Option<Duration> {
        match self {
            LockoutPolicy::TimedLockout { duration_secs, .. } => {
                Some(Duration::from_secs(*duration_secs))
            }
            LockoutPolicy::ReturnToStartAfter { .. } => None,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.max_attempts() == 0 {
            return Err("max_attempts must be at least 1".to_string());
        }
        if let LockoutPolicy::TimedLockout { duration_secs: 0, .. } = self {
            return Err("duration_secs must be at least 1".to_string());
        }
        Ok(())
    }
}

/// Outcome of a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptVerdict {
    /// Try again; `remaining` attempts left before the policy triggers
    Retry { remaining: u32 },
    /// Input is locked for `seconds`
    LockedOut { seconds: u64 },
    /// Leave the unlock screen
    ReturnToStart,
}

/// Progress of a lockout countdown after one tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockoutTick {
    /// No lockout is running
    Idle,
    /// Still locked
    Counting { remaining_secs: u64 },
    /// The lockout just ended; attempts were cleared
    Released,
}

/// Counts failed unlock attempts and drives the lockout countdown
///
/// Time advances only through [`AttemptTracker::tick`], one call per second.
#[derive(Debug, Clone)]
pub struct AttemptTracker {
    policy: LockoutPolicy,
    failed_attempts: u32,
    lockout_remaining: Option<u64>,
}

impl AttemptTracker {
    pub fn new(policy: LockoutPolicy) -> Self {
        Self {
            policy,
            failed_attempts: 0,
            lockout_remaining: None,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(LockoutPolicy::default())
    }

    pub fn policy(&self) -> LockoutPolicy {
        self.policy
    }

    pub fn failed_attempts(&self) -> u32 {
        self.failed_attempts
    }

    pub fn is_locked_out(&self) -> bool {
        self.lockout_remaining.is_some()
    }

    pub fn remaining_lockout_seconds(&self) -> Option<u64> {
        self.lockout_remaining
    }

    /// Record a rejected PIN
    pub fn record_failure(&mut self) -> AttemptVerdict {
        if let Some(seconds) = self.lockout_remaining {
            return AttemptVerdict::LockedOut { seconds };
        }

        self.failed_attempts = self.failed_attempts.saturating_add(1);
        let max_attempts = self.policy.max_attempts();

        if self.failed_attempts < max_attempts {
            return AttemptVerdict::Retry {
                remaining: max_attempts - self.failed_attempts,
            };
        }

        match self.policy {
            LockoutPolicy::TimedLockout { duration_secs, .. } => {
                self.lockout_remaining = Some(duration_secs);
                AttemptVerdict::LockedOut {
                    seconds: duration_secs,
                }
            }
            LockoutPolicy::ReturnToStartAfter { .. } => {
                self.failed_attempts = 0;
                AttemptVerdict::ReturnToStart
            }
        }
    }

    /// Record a verified unlock
    pub fn record_success(&mut self) {
        self.failed_attempts = 0;
        self.lockout_remaining = None;
    }

    /// Advance the lockout countdown by one second
    pub fn tick(&mut self) -> LockoutTick {
        match self.lockout_remaining {
            None => LockoutTick::Idle,
            Some(remaining) if remaining <= 1 => {
                self.lockout_remaining = None;
                self.failed_attempts = 0;
                LockoutTick::Released
            }
            Some(remaining) => {
                self.lockout_remaining = Some(remaining - 1);
                LockoutTick::Counting {
                    remaining_secs: remaining - 1,
                }
            }
        }
    }

    /// Drop all state, as when a fresh unlock screen is shown
    pub fn reset(&mut self) {
        self.failed_attempts = 0;
        self.lockout_remaining = None;
    }
}

fn plural(n: u64) -> &'static str {
    if n == 1 {
        ""
    } else {
        "s"
    }
}

pub fn lockout_message(seconds: u64) -> String {
    format!(
        "Too many failed attempts. Please wait {} second{} before trying again.",
        seconds,
        plural(seconds)
    )
}

pub fn attempts_remaining_message(remaining: u32) -> String {
    format!(
        "{} attempt{} remaining",
        remaining,
        plural(u64::from(remaining))
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lockout_policy_default() {
        let policy = LockoutPolicy::default();
        assert_eq!(policy.max_attempts(), 5);
        assert_eq!(policy.lockout_duration(), Some(Duration::from_secs(60)));
        assert!(policy.validate().is_ok());
    }

    #[test]
    fn test_policy_validation() {
        assert!(LockoutPolicy::ReturnToStartAfter { max_attempts: 0 }
            .validate()
            .is_err());
        assert!(LockoutPolicy::TimedLockout {
            max_attempts: 3,
            duration_secs: 0
        }
        .validate()
        .is_err());
    }

    #[test]
    fn test_policy_from_toml() {
        let policy: LockoutPolicy =
            toml::from_str("policy = \"return_to_start_after\"\nmax_attempts = 2\n").unwrap();
        assert_eq!(policy, LockoutPolicy::return_to_start());
    }

    #[test]
    fn test_five_failures_lock_out() {
        let mut tracker = AttemptTracker::with_defaults();

        for expected in (1..=4).rev() {
            assert_eq!(
                tracker.record_failure(),
                AttemptVerdict::Retry { remaining: expected }
            );
        }
        assert!(!tracker.is_locked_out());

        assert_eq!(
            tracker.record_failure(),
            AttemptVerdict::LockedOut { seconds: 60 }
        );
        assert!(tracker.is_locked_out());
        assert_eq!(tracker.failed_attempts(), 5);
    }

    #[test]
    fn test_success_resets_counter() {
        let mut tracker = AttemptTracker::with_defaults();
        for _ in 0..3 {
            tracker.record_failure();
        }
        tracker.record_success();
        assert_eq!(tracker.failed_attempts(), 0);

        // A full budget is available again
        assert_eq!(
            tracker.record_failure(),
            AttemptVerdict::Retry { remaining: 4 }
        );
    }

    #[test]
    fn test_failure_while_locked_is_rejected() {
        let mut tracker = AttemptTracker::new(LockoutPolicy::TimedLockout {
            max_attempts: 1,
            duration_secs: 10,
        });
        tracker.record_failure();
        tracker.tick();
        assert_eq!(
            tracker.record_failure(),
            AttemptVerdict::LockedOut { seconds: 9 }
        );
        assert_eq!(tracker.failed_attempts(), 1);
    }

    #[test]
    fn test_countdown_releases_after_full_duration() {
        let mut tracker = AttemptTracker::with_defaults();
        for _ in 0..5 {
            tracker.record_failure();
        }

        for elapsed in 1..60 {
            assert_eq!(
                tracker.tick(),
                LockoutTick::Counting {
                    remaining_secs: 60 - elapsed
                }
            );
        }
        assert!(tracker.is_locked_out());

        assert_eq!(tracker.tick(), LockoutTick::Released);
        assert!(!tracker.is_locked_out());
        assert_eq!(tracker.failed_attempts(), 0);
        assert_eq!(tracker.tick(), LockoutTick::Idle);
    }

    #[test]
    fn test_return_to_start_policy() {
        let mut tracker = AttemptTracker::new(LockoutPolicy::return_to_start());
        assert_eq!(
            tracker.record_failure(),
            AttemptVerdict::Retry { remaining: 1 }
        );
        assert_eq!(tracker.record_failure(), AttemptVerdict::ReturnToStart);
        assert!(!tracker.is_locked_out());
        assert_eq!(tracker.failed_attempts(), 0);
    }

    #[test]
    fn test_messages() {
        assert_eq!(
            lockout_message(60),
            "Too many failed attempts. Please wait 60 seconds before trying again."
        );
        assert_eq!(
            lockout_message(1),
            "Too many failed attempts. Please wait 1 second before trying again."
        );
        assert_eq!(attempts_remaining_message(1), "1 attempt remaining");
        assert_eq!(attempts_remaining_message(3), "3 attempts remaining");
    }
}
