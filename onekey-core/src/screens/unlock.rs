//! PIN unlock screen with attempt counting and lockout countdown

use super::UnlockHandler;
use crate::lockout::{
    attempts_remaining_message, lockout_message, AttemptTracker, AttemptVerdict, LockoutPolicy,
    LockoutTick, PIN_NOT_RECOGNIZED,
};
use crate::pin::{Pin, PinInput, PIN_LENGTH};
use crate::OneKeyError;
use std::time::Duration;
use tracing::{debug, info, warn};

const INVALID_PIN_MESSAGE: &str = "Please enter a 6-digit PIN";

/// Result of submitting a PIN
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnlockOutcome {
    /// Locked out; the PIN was not checked
    Ignored,
    /// Not a complete PIN
    Invalid,
    Unlocked { address: String },
    Retry { remaining: u32 },
    LockedOut { seconds: u64 },
    ReturnToStart,
}

#[derive(Debug)]
pub struct UnlockScreen {
    input: PinInput,
    tracker: AttemptTracker,
    error: Option<String>,
    attempts_info: Option<String>,
    lockout_message: Option<String>,
}

impl UnlockScreen {
    pub fn new(policy: LockoutPolicy) -> Self {
        let mut input = PinInput::new(PIN_LENGTH);
        input.render();
        Self {
            input,
            tracker: AttemptTracker::new(policy),
            error: None,
            attempts_info: None,
            lockout_message: None,
        }
    }

    pub fn input(&self) -> &PinInput {
        &self.input
    }

    /// Key events go here; a `Some` return is ready for [`Self::submit`]
    pub fn input_mut(&mut self) -> &mut PinInput {
        &mut self.input
    }

    pub fn tracker(&self) -> &AttemptTracker {
        &self.tracker
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn attempts_info(&self) -> Option<&str> {
        self.attempts_info.as_deref()
    }

    pub fn lockout_message(&self) -> Option<&str> {
        self.lockout_message.as_deref()
    }

    pub fn is_locked_out(&self) -> bool {
        self.tracker.is_locked_out()
    }

    /// Check `value` with `handler`
    pub async fn submit(&mut self, value: &str, handler: &dyn UnlockHandler) -> UnlockOutcome {
        if self.tracker.is_locked_out() {
            debug!("Unlock attempt rejected during lockout");
            return UnlockOutcome::Ignored;
        }

        let pin = match Pin::parse_with_length(value, self.input.length()) {
            Ok(pin) => pin,
            Err(_) => {
                self.show_error(INVALID_PIN_MESSAGE);
                self.input.shake();
                return UnlockOutcome::Invalid;
            }
        };

        self.input.disable();
        let result = handler.unlock(&pin).await;
        self.input.enable();

        match result {
            Ok(address) => {
                info!("Wallet unlocked");
                self.tracker.record_success();
                self.hide_error();
                self.attempts_info = None;
                UnlockOutcome::Unlocked { address }
            }
            Err(e) => {
                match &e {
                    OneKeyError::IncorrectPin => debug!("PIN rejected"),
                    other => warn!("Unlock failed: {}", other),
                }
                self.handle_failure()
            }
        }
    }

    fn handle_failure(&mut self) -> UnlockOutcome {
        match self.tracker.record_failure() {
            AttemptVerdict::Retry { remaining } => {
                self.show_error(PIN_NOT_RECOGNIZED);
                self.attempts_info = Some(attempts_remaining_message(remaining));
                self.input.shake();
                self.input.clear();
                UnlockOutcome::Retry { remaining }
            }
            AttemptVerdict::LockedOut { seconds } => {
                warn!("Too many failed unlock attempts, locking for {}s", seconds);
                self.hide_error();
                self.attempts_info = None;
                self.lockout_message = Some(lockout_message(seconds));
                self.input.clear();
                self.input.disable();
                UnlockOutcome::LockedOut { seconds }
            }
            AttemptVerdict::ReturnToStart => {
                info!("Unlock attempts exhausted, returning to start");
                self.hide_error();
                self.attempts_info = None;
                self.input.clear();
                UnlockOutcome::ReturnToStart
            }
        }
    }

    /// One second of lockout countdown
    pub fn tick(&mut self) -> LockoutTick {
        let tick = self.tracker.tick();
        match tick {
            LockoutTick::Idle => {}
            LockoutTick::Counting { remaining_secs } => {
                self.lockout_message = Some(lockout_message(remaining_secs));
            }
            LockoutTick::Released => {
                info!("Lockout expired");
                self.lockout_message = None;
                self.input.enable();
                self.input.clear();
            }
        }
        tick
    }

    /// Drive the countdown in real time until the lockout ends
    pub async fn run_lockout<F>(&mut self, mut on_tick: F)
    where
        F: FnMut(&UnlockScreen, LockoutTick),
    {
        let mut interval = tokio::time::interval(Duration::from_secs(1));
        // The first tick completes immediately
        interval.tick().await;

        while self.is_locked_out() {
            interval.tick().await;
            let tick = self.tick();
            on_tick(self, tick);
        }
    }

    /// Fresh screen state
    pub fn reset(&mut self) {
        self.tracker.reset();
        self.input.enable();
        self.input.render();
        self.error = None;
        self.attempts_info = None;
        self.lockout_message = None;
    }

    fn show_error(&mut self, message: &str) {
        self.error = Some(message.to_string());
        self.input.show_error(message);
    }

    fn hide_error(&mut self) {
        self.error = None;
        self.input.hide_error();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedPin {
        pin: &'static str,
        calls: AtomicUsize,
    }

    impl FixedPin {
        fn new(pin: &'static str) -> Self {
            Self {
                pin,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl UnlockHandler for FixedPin {
        async fn unlock(&self, pin: &Pin) -> crate::Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if pin.as_str() == self.pin {
                Ok("0xabc".to_string())
            } else {
                Err(OneKeyError::IncorrectPin)
            }
        }
    }

    #[tokio::test]
    async fn test_unlock_success() {
        let handler = FixedPin::new("123456");
        let mut screen = UnlockScreen::new(LockoutPolicy::default());

        let outcome = screen.submit("123456", &handler).await;
        assert_eq!(
            outcome,
            UnlockOutcome::Unlocked {
                address: "0xabc".to_string()
            }
        );
        assert!(!screen.input().is_disabled());
        assert!(screen.error().is_none());
    }

    #[tokio::test]
    async fn test_incomplete_pin_is_invalid() {
        let handler = FixedPin::new("123456");
        let mut screen = UnlockScreen::new(LockoutPolicy::default());

        assert_eq!(screen.submit("123", &handler).await, UnlockOutcome::Invalid);
        assert_eq!(screen.error(), Some("Please enter a 6-digit PIN"));
        assert_eq!(handler.calls.load(Ordering::SeqCst), 0);
        assert_eq!(screen.tracker().failed_attempts(), 0);
    }

    #[tokio::test]
    async fn test_failure_shows_remaining_attempts() {
        let handler = FixedPin::new("123456");
        let mut screen = UnlockScreen::new(LockoutPolicy::default());
        screen.input_mut().set_value("000000");

        let outcome = screen.submit("000000", &handler).await;
        assert_eq!(outcome, UnlockOutcome::Retry { remaining: 4 });
        assert_eq!(screen.error(), Some(PIN_NOT_RECOGNIZED));
        assert_eq!(screen.attempts_info(), Some("4 attempts remaining"));
        assert_eq!(screen.input().value(), "");
        assert_eq!(screen.input().focus(), 0);
        assert!(!screen.input().is_disabled());
        assert!(screen.input().is_shaking());
    }

    #[tokio::test]
    async fn test_success_on_fourth_attempt_resets() {
        let handler = FixedPin::new("123456");
        let mut screen = UnlockScreen::new(LockoutPolicy::default());

        for _ in 0..3 {
            screen.submit("000000", &handler).await;
        }
        assert_eq!(screen.tracker().failed_attempts(), 3);

        screen.submit("123456", &handler).await;
        assert_eq!(screen.tracker().failed_attempts(), 0);
        assert!(screen.attempts_info().is_none());
    }

    #[tokio::test]
    async fn test_lockout_rejects_correct_pin() {
        let handler = FixedPin::new("123456");
        let mut screen = UnlockScreen::new(LockoutPolicy::default());

        for _ in 0..4 {
            screen.submit("000000", &handler).await;
        }
        let outcome = screen.submit("000000", &handler).await;
        assert_eq!(outcome, UnlockOutcome::LockedOut { seconds: 60 });
        assert!(screen.input().is_disabled());
        assert_eq!(
            screen.lockout_message(),
            Some("Too many failed attempts. Please wait 60 seconds before trying again.")
        );

        let calls = handler.calls.load(Ordering::SeqCst);
        assert_eq!(screen.submit("123456", &handler).await, UnlockOutcome::Ignored);
        assert_eq!(handler.calls.load(Ordering::SeqCst), calls);
    }

    #[tokio::test]
    async fn test_countdown_restores_input() {
        let handler = FixedPin::new("123456");
        let mut screen = UnlockScreen::new(LockoutPolicy::default());
        for _ in 0..5 {
            screen.submit("000000", &handler).await;
        }

        for _ in 0..59 {
            screen.tick();
        }
        assert!(screen.is_locked_out());
        assert_eq!(
            screen.lockout_message(),
            Some("Too many failed attempts. Please wait 1 second before trying again.")
        );

        assert_eq!(screen.tick(), LockoutTick::Released);
        assert!(!screen.is_locked_out());
        assert!(!screen.input().is_disabled());
        assert_eq!(screen.input().focus(), 0);
        assert_eq!(screen.tracker().failed_attempts(), 0);
        assert!(screen.lockout_message().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_lockout_waits_full_duration() {
        let handler = FixedPin::new("123456");
        let mut screen = UnlockScreen::new(LockoutPolicy::TimedLockout {
            max_attempts: 1,
            duration_secs: 3,
        });
        screen.submit("000000", &handler).await;

        let started = tokio::time::Instant::now();
        let mut ticks = Vec::new();
        screen.run_lockout(|_, tick| ticks.push(tick)).await;

        assert_eq!(started.elapsed(), Duration::from_secs(3));
        assert_eq!(
            ticks,
            vec![
                LockoutTick::Counting { remaining_secs: 2 },
                LockoutTick::Counting { remaining_secs: 1 },
                LockoutTick::Released,
            ]
        );
        assert_eq!(
            screen.submit("123456", &handler).await,
            UnlockOutcome::Unlocked {
                address: "0xabc".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_return_to_start_policy() {
        let handler = FixedPin::new("123456");
        let mut screen = UnlockScreen::new(LockoutPolicy::return_to_start());

        assert_eq!(
            screen.submit("000000", &handler).await,
            UnlockOutcome::Retry { remaining: 1 }
        );
        assert_eq!(
            screen.submit("000000", &handler).await,
            UnlockOutcome::ReturnToStart
        );
        assert!(!screen.is_locked_out());
    }
}
