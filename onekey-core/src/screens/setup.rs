//! New wallet PIN setup: enter, then confirm.

use crate::pin::{Pin, PinInput, PIN_LENGTH};
use tracing::debug;

const MISMATCH_MESSAGE: &str = "PINs do not match. Please try again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupStep {
    Enter,
    Confirm,
    /// A confirmed PIN was handed out; nothing more is accepted until reset
    Submitted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetupEvent {
    /// Wrong step, or already submitted
    Ignored,
    /// Not a complete PIN
    Rejected,
    /// First PIN accepted, confirm input is ready
    ConfirmRequested,
    Mismatch,
    /// Both entries agree. Emitted once per session.
    Confirmed(Pin),
}

#[derive(Debug)]
pub struct SetupScreen {
    step: SetupStep,
    entered: Option<Pin>,
    pin_input: PinInput,
    confirm_input: Option<PinInput>,
    error: Option<String>,
    submitted: bool,
}

impl Default for SetupScreen {
    fn default() -> Self {
        Self::new()
    }
}

impl SetupScreen {
    pub fn new() -> Self {
        let mut pin_input = PinInput::new(PIN_LENGTH);
        pin_input.render();
        Self {
            step: SetupStep::Enter,
            entered: None,
            pin_input,
            confirm_input: None,
            error: None,
            submitted: false,
        }
    }

    pub fn step(&self) -> SetupStep {
        self.step
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_submitted(&self) -> bool {
        self.submitted
    }

    pub fn pin_input(&self) -> &PinInput {
        &self.pin_input
    }

    pub fn pin_input_mut(&mut self) -> &mut PinInput {
        &mut self.pin_input
    }

    pub fn confirm_input(&self) -> Option<&PinInput> {
        self.confirm_input.as_ref()
    }

    pub fn confirm_input_mut(&mut self) -> Option<&mut PinInput> {
        self.confirm_input.as_mut()
    }

    /// The input that currently takes key events
    pub fn active_input_mut(&mut self) -> &mut PinInput {
        match (self.step, self.confirm_input.as_mut()) {
            (SetupStep::Enter, _) | (_, None) => &mut self.pin_input,
            (_, Some(confirm)) => confirm,
        }
    }

    /// First PIN completed
    pub fn handle_pin_entered(&mut self, value: &str) -> SetupEvent {
        if self.step != SetupStep::Enter || self.submitted {
            return SetupEvent::Ignored;
        }

        let pin = match Pin::parse_with_length(value, self.pin_input.length()) {
            Ok(pin) => pin,
            Err(e) => {
                self.show_error(&e.to_string());
                self.pin_input.shake();
                return SetupEvent::Rejected;
            }
        };

        self.entered = Some(pin);
        self.step = SetupStep::Confirm;

        let mut confirm = PinInput::new(self.pin_input.length());
        confirm.render();
        self.confirm_input = Some(confirm);
        self.hide_error();
        SetupEvent::ConfirmRequested
    }

    /// Confirmation PIN completed
    pub fn handle_pin_confirmed(&mut self, value: &str) -> SetupEvent {
        if self.submitted || self.step != SetupStep::Confirm {
            return SetupEvent::Ignored;
        }
        let Some(entered) = self.entered.clone() else {
            return SetupEvent::Ignored;
        };

        let confirmed = match Pin::parse_with_length(value, self.pin_input.length()) {
            Ok(pin) => pin,
            Err(e) => {
                self.show_error(&e.to_string());
                if let Some(confirm) = self.confirm_input.as_mut() {
                    confirm.shake();
                }
                return SetupEvent::Rejected;
            }
        };

        if !confirmed.matches(&entered) {
            debug!("Confirmation PIN did not match");
            self.show_error(MISMATCH_MESSAGE);
            if let Some(confirm) = self.confirm_input.as_mut() {
                confirm.shake();
                confirm.clear();
            }
            return SetupEvent::Mismatch;
        }

        self.submitted = true;
        self.step = SetupStep::Submitted;
        self.hide_error();
        self.pin_input.disable();
        if let Some(confirm) = self.confirm_input.as_mut() {
            confirm.disable();
        }
        SetupEvent::Confirmed(entered)
    }

    /// Go back from confirm to the first entry
    pub fn back(&mut self) {
        if self.step == SetupStep::Confirm {
            self.step = SetupStep::Enter;
            self.entered = None;
            self.confirm_input = None;
            self.pin_input.render();
            self.hide_error();
        }
    }

    /// Start a new session
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Creation behind a confirmed PIN failed; start over showing `message`
    pub fn creation_failed(&mut self, message: &str) {
        self.reset();
        self.show_error(message);
    }

    fn show_error(&mut self, message: &str) {
        self.error = Some(message.to_string());
        match (self.step, self.confirm_input.as_mut()) {
            (SetupStep::Confirm, Some(confirm)) => confirm.show_error(message),
            _ => self.pin_input.show_error(message),
        }
    }

    fn hide_error(&mut self) {
        self.error = None;
        self.pin_input.hide_error();
        if let Some(confirm) = self.confirm_input.as_mut() {
            confirm.hide_error();
        }
    }
}
