use crate::config::BUTTON_DEBOUNCE_MS;
use crate::ui::Button;

/// Debounced view of one active-low button.
///
/// The raw level has to stay unchanged for [`BUTTON_DEBOUNCE_MS`] before it
/// becomes the stable state.
#[derive(Clone, Copy, Debug)]
pub struct Debouncer {
    stable: bool,
    raw: bool,
    since: u64,
}

impl Debouncer {
    pub const fn new() -> Self {
        Self {
            stable: false,
            raw: false,
            since: 0,
        }
    }

    /// Feed the current raw level (`true` = pressed). Returns `true` on the
    /// update where the stable state goes from released to pressed.
    pub fn update(&mut self, pressed: bool, now: u64) -> bool {
        if pressed != self.raw {
            self.raw = pressed;
            self.since = now;
            return false;
        }
        if self.raw != self.stable && now.saturating_sub(self.since) >= BUTTON_DEBOUNCE_MS {
            self.stable = self.raw;
            return self.stable;
        }
        false
    }

    pub fn is_pressed(&self) -> bool {
        self.stable
    }
}

impl Default for Debouncer {
    fn default() -> Self {
        Self::new()
    }
}

/// A press only counts while the other button is not held.
pub fn resolve_press(fell: bool, other_held: bool) -> bool {
    fell && !other_held
}

/// Debounced pair of menu buttons.
#[derive(Clone, Copy, Debug, Default)]
pub struct ButtonPair {
    advance: Debouncer,
    accept: Debouncer,
}

impl ButtonPair {
    pub const fn new() -> Self {
        Self {
            advance: Debouncer::new(),
            accept: Debouncer::new(),
        }
    }

    /// Feed both raw levels. At most one press is reported per update; a
    /// press made while the other button is held is dropped.
    pub fn update(&mut self, advance_low: bool, accept_low: bool, now: u64) -> Option<Button> {
        let advance_fell = self.advance.update(advance_low, now);
        let accept_fell = self.accept.update(accept_low, now);

        if resolve_press(advance_fell, self.accept.is_pressed()) {
            Some(Button::Advance)
        } else if resolve_press(accept_fell, self.advance.is_pressed()) {
            Some(Button::Accept)
        } else {
            None
        }
    }
}
