//! Segmented PIN entry: one single-digit cell per PIN position.
//!
//! The widget is a plain state machine. A front-end forwards key events
//! (`on_input`, `on_backspace`, `on_paste`, arrow keys) and renders
//! `cells()`, `focus()`, `error()` and `is_shaking_at()`. Completion is
//! reported through the return value of the event that filled the last
//! empty cell, at most once per fill.

use super::{Pin, PIN_LENGTH};
use std::time::{Duration, Instant};

/// How long the shake feedback stays visible
pub const SHAKE_DURATION: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
pub struct PinInput {
    cells: Vec<Option<char>>,
    focus: usize,
    disabled: bool,
    error: Option<String>,
    shake_until: Option<Instant>,
    // Set once the current fill has been reported complete
    completion_fired: bool,
}

impl Default for PinInput {
    fn default() -> Self {
        Self::new(PIN_LENGTH)
    }
}

impl PinInput {
    pub fn new(length: usize) -> Self {
        let length = length.max(1);
        Self {
            cells: vec![None; length],
            focus: 0,
            disabled: false,
            error: None,
            shake_until: None,
            completion_fired: false,
        }
    }

    /// Materialize empty cells and focus the first one
    pub fn render(&mut self) {
        self.cells.iter_mut().for_each(|c| *c = None);
        self.completion_fired = false;
        self.error = None;
        self.shake_until = None;
        self.focus = 0;
    }

    pub fn length(&self) -> usize {
        self.cells.len()
    }

    pub fn cells(&self) -> &[Option<char>] {
        &self.cells
    }

    pub fn focus(&self) -> usize {
        self.focus
    }

    pub fn focus_cell(&mut self, index: usize) {
        if index < self.cells.len() {
            self.focus = index;
        }
    }

    /// Arrow left
    pub fn focus_previous(&mut self) {
        if self.focus > 0 {
            self.focus -= 1;
        }
    }

    /// Arrow right
    pub fn focus_next(&mut self) {
        if self.focus + 1 < self.cells.len() {
            self.focus += 1;
        }
    }

    /// A character typed into `index`
    ///
    /// Non-digits leave the cell empty. Returns the PIN when this input
    /// completes the fill.
    pub fn on_input(&mut self, index: usize, ch: char) -> Option<Pin> {
        if self.disabled || index >= self.cells.len() {
            return None;
        }

        if !ch.is_ascii_digit() {
            self.cells[index] = None;
            return self.check_completion();
        }

        self.cells[index] = Some(ch);
        if index + 1 < self.cells.len() {
            self.focus = index + 1;
        } else {
            self.focus = index;
        }
        self.check_completion()
    }

    /// Backspace pressed in `index`
    ///
    /// Clears the cell, or when it is already empty, moves back one cell
    /// and clears that one.
    pub fn on_backspace(&mut self, index: usize) {
        if self.disabled || index >= self.cells.len() {
            return;
        }

        if self.cells[index].is_some() {
            self.cells[index] = None;
            self.focus = index;
        } else if index > 0 {
            self.focus = index - 1;
            self.cells[index - 1] = None;
        }
        self.check_completion();
    }

    /// Text pasted while `index` has focus
    ///
    /// Digits are distributed one per cell starting at `index`; anything
    /// past the last cell is dropped.
    pub fn on_paste(&mut self, index: usize, text: &str) -> Option<Pin> {
        if self.disabled || index >= self.cells.len() {
            return None;
        }

        let capacity = self.cells.len() - index;
        for (offset, digit) in text
            .chars()
            .filter(|c| c.is_ascii_digit())
            .take(capacity)
            .enumerate()
        {
            self.cells[index + offset] = Some(digit);
        }

        self.focus = self.first_empty().unwrap_or(self.cells.len() - 1);
        self.check_completion()
    }

    pub fn value(&self) -> String {
        self.cells.iter().flatten().collect()
    }

    pub fn is_complete(&self) -> bool {
        self.cells.iter().all(Option::is_some)
    }

    /// Replace the cell contents with the digits of `pin`
    pub fn set_value(&mut self, pin: &str) -> Option<Pin> {
        let mut digits = pin.chars().filter(|c| c.is_ascii_digit());
        for cell in self.cells.iter_mut() {
            *cell = digits.next();
        }
        self.focus = self.first_empty().unwrap_or(self.cells.len() - 1);
        self.check_completion()
    }

    /// Empty every cell and focus the first one
    pub fn clear(&mut self) {
        self.cells.iter_mut().for_each(|c| *c = None);
        self.completion_fired = false;
        self.focus = 0;
    }

    pub fn disable(&mut self) {
        self.disabled = true;
    }

    pub fn enable(&mut self) {
        self.disabled = false;
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    pub fn show_error(&mut self, message: impl Into<String>) {
        self.error = Some(message.into());
    }

    pub fn hide_error(&mut self) {
        self.error = None;
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Start the shake feedback; it clears itself after [`SHAKE_DURATION`]
    pub fn shake(&mut self) {
        self.shake_at(Instant::now());
    }

    pub fn shake_at(&mut self, now: Instant) {
        self.shake_until = Some(now + SHAKE_DURATION);
    }

    pub fn is_shaking_at(&self, now: Instant) -> bool {
        self.shake_until.is_some_and(|until| now < until)
    }

    pub fn is_shaking(&self) -> bool {
        self.is_shaking_at(Instant::now())
    }

    fn first_empty(&self) -> Option<usize> {
        self.cells.iter().position(Option::is_none)
    }

    fn check_completion(&mut self) -> Option<Pin> {
        if !self.is_complete() {
            self.completion_fired = false;
            return None;
        }
        if self.completion_fired {
            return None;
        }
        self.completion_fired = true;
        Pin::parse_with_length(&self.value(), self.cells.len()).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn type_digits(input: &mut PinInput, digits: &str) -> Vec<Pin> {
        let mut completed = Vec::new();
        for ch in digits.chars() {
            let index = input.focus();
            if let Some(pin) = input.on_input(index, ch) {
                completed.push(pin);
            }
        }
        completed
    }

    #[test]
    fn test_render_focuses_first_cell() {
        let mut input = PinInput::default();
        input.focus_cell(3);
        input.render();
        assert_eq!(input.length(), 6);
        assert_eq!(input.focus(), 0);
        assert!(input.cells().iter().all(Option::is_none));
    }

    #[test]
    fn test_typing_advances_and_completes_once() {
        let mut input = PinInput::default();
        input.render();

        let completed = type_digits(&mut input, "12345");
        assert!(completed.is_empty());
        assert_eq!(input.focus(), 5);

        let pin = input.on_input(5, '6').unwrap();
        assert_eq!(pin.as_str(), "123456");
        assert_eq!(input.focus(), 5);

        // Overwriting a digit while still full does not report again
        assert!(input.on_input(5, '7').is_none());
        assert_eq!(input.value(), "123457");
    }

    #[test]
    fn test_non_digit_rejected() {
        let mut input = PinInput::default();
        input.render();
        assert!(input.on_input(0, 'a').is_none());
        assert_eq!(input.cells()[0], None);
        assert_eq!(input.focus(), 0);
    }

    #[test]
    fn test_out_of_order_fill_completes_once() {
        let mut input = PinInput::default();
        input.render();

        assert!(input.on_paste(3, "456").is_none());
        assert_eq!(input.focus(), 0);
        assert!(input.on_input(0, '1').is_none());
        assert!(input.on_input(1, '2').is_none());
        let pin = input.on_input(2, '3').unwrap();
        assert_eq!(pin.as_str(), "123456");
    }

    #[test]
    fn test_refill_after_backspace_completes_again() {
        let mut input = PinInput::default();
        input.render();
        assert_eq!(type_digits(&mut input, "123456").len(), 1);

        input.on_backspace(5);
        assert!(!input.is_complete());
        let pin = input.on_input(5, '9').unwrap();
        assert_eq!(pin.as_str(), "123459");
    }

    #[test]
    fn test_backspace_clears_current_cell() {
        let mut input = PinInput::default();
        input.set_value("12");
        input.on_backspace(1);
        assert_eq!(input.value(), "1");
        assert_eq!(input.focus(), 1);
    }

    #[test]
    fn test_backspace_on_empty_moves_back() {
        let mut input = PinInput::default();
        input.render();
        type_digits(&mut input, "123");
        assert_eq!(input.focus(), 3);

        input.on_backspace(3);
        assert_eq!(input.focus(), 2);
        assert_eq!(input.value(), "12");

        // First cell has nowhere to go
        input.clear();
        input.on_backspace(0);
        assert_eq!(input.focus(), 0);
    }

    #[test]
    fn test_paste_strips_non_digits() {
        let mut input = PinInput::default();
        input.render();
        let pin = input.on_paste(0, "12-34 5a6").unwrap();
        assert_eq!(pin.as_str(), "123456");
        assert_eq!(input.focus(), 5);
    }

    #[test]
    fn test_paste_truncates_silently() {
        let mut input = PinInput::default();
        input.render();
        input.on_input(0, '9');
        let pin = input.on_paste(1, "1234567890").unwrap();
        assert_eq!(pin.as_str(), "912345");
    }

    #[test]
    fn test_short_paste_does_not_complete() {
        let mut input = PinInput::default();
        input.render();
        assert!(input.on_paste(0, "123").is_none());
        assert_eq!(input.value(), "123");
        assert_eq!(input.focus(), 3);
    }

    #[test]
    fn test_arrow_navigation() {
        let mut input = PinInput::default();
        input.render();
        input.focus_previous();
        assert_eq!(input.focus(), 0);
        input.focus_next();
        input.focus_next();
        assert_eq!(input.focus(), 2);
        input.focus_cell(5);
        input.focus_next();
        assert_eq!(input.focus(), 5);
        input.focus_cell(42);
        assert_eq!(input.focus(), 5);
    }

    #[test]
    fn test_disabled_ignores_events() {
        let mut input = PinInput::default();
        input.render();
        input.disable();
        assert!(input.on_input(0, '1').is_none());
        assert!(input.on_paste(0, "123456").is_none());
        assert_eq!(input.value(), "");

        input.enable();
        assert!(input.on_paste(0, "123456").is_some());
    }

    #[test]
    fn test_set_value_and_clear() {
        let mut input = PinInput::default();
        assert!(input.set_value("654321").is_some());
        assert!(input.is_complete());

        input.clear();
        assert_eq!(input.value(), "");
        assert_eq!(input.focus(), 0);
        assert!(input.set_value("654321").is_some());
    }

    #[test]
    fn test_error_display() {
        let mut input = PinInput::default();
        input.show_error("PIN must be 6 digits");
        assert_eq!(input.error(), Some("PIN must be 6 digits"));
        input.hide_error();
        assert!(input.error().is_none());
    }

    #[test]
    fn test_shake_expires() {
        let mut input = PinInput::default();
        let start = Instant::now();
        input.shake_at(start);
        assert!(input.is_shaking_at(start + Duration::from_millis(499)));
        assert!(!input.is_shaking_at(start + SHAKE_DURATION));
    }

    #[test]
    fn test_custom_length() {
        let mut input = PinInput::new(4);
        let pin = input.on_paste(0, "4321").unwrap();
        assert_eq!(pin.len(), 4);
    }
}
