//! Two-button menu state machine.
//!
//! Black (advance) walks through the registers, red (accept) opens the
//! menu, enters a register, and applies it.
//!
//! ```text
//! register  1      2      3..=7
//!           brightness    one-shot actions
//!                  interval
//! ```
//!
//! Registers 1 and 2 are nested value pickers: once entered, advance
//! cycles the value and accept confirms it. Registers 3 and up are
//! enter-then-apply actions: the first accept selects the register, the
//! second one applies it. Advance on a selected action register leaves it
//! again.
//!
//! Every operation returns the single event it raised (if any) instead of
//! calling back, so the caller dispatches it synchronously before the next
//! input is processed.

use crate::config::{MENU_IDLE_TIMEOUT_MS, MENU_SUBMENU_TIMEOUT_MS};

/// Events raised by the menu. At most one per operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MenuEvent {
    /// The current register changed (or a selected action was left).
    NextStep,
    /// The menu closed.
    Exit,
    /// Register 1 (brightness) was entered.
    FirstEnter,
    /// The brightness value changed.
    FirstChange,
    /// Register 2 (interval) was entered.
    SecondEnter,
    /// The interval value changed.
    SecondChange,
    /// An action register was selected and waits for apply.
    Select,
    /// The current register was applied.
    Apply,
    /// An entered register timed out; browsing continues at the same step.
    SelectionExpired,
}

/// Menu navigation state.
#[derive(Debug)]
pub struct MenuEngine {
    registers: u8,
    step: u8,
    selected_step: u8,
    brightness: u8,
    interval: u8,
    active: bool,
    last_activity: u64,
}

impl MenuEngine {
    /// Create an inactive menu with `registers` top-level registers.
    ///
    /// Brightness and interval range over `1..registers`.
    pub fn new(registers: u8) -> Self {
        Self {
            registers: registers.max(2),
            step: 0,
            selected_step: 0,
            brightness: 1,
            interval: 1,
            active: false,
            last_activity: 0,
        }
    }

    /// Advance to the next register (black button).
    ///
    /// Does nothing while the menu is closed. Inside register 1 or 2 the
    /// press changes the value instead.
    pub fn next_step(&mut self, now: u64) -> Option<MenuEvent> {
        if !self.active {
            return None;
        }
        self.keep_alive(now);

        match self.selected_step {
            1 => return self.next_brightness(now),
            2 => return self.next_interval(now),
            _ => {}
        }

        if self.step > 0 && self.selected_step == self.step {
            self.selected_step = 0;
        } else {
            self.step = if self.step >= self.registers { 1 } else { self.step + 1 };
        }
        debug!("menu: step {}", self.step);
        Some(MenuEvent::NextStep)
    }

    /// Open, enter, select or apply (red button).
    pub fn accept(&mut self, now: u64) -> Option<MenuEvent> {
        if !self.active {
            self.active = true;
            debug!("menu: opened");
            return self.next_step(now);
        }
        self.keep_alive(now);

        let step = self.step;
        let event = if self.selected_step != 0 && self.selected_step == step {
            self.selected_step = 0;
            MenuEvent::Apply
        } else {
            self.selected_step = step;
            match step {
                1 => MenuEvent::FirstEnter,
                2 => MenuEvent::SecondEnter,
                _ => MenuEvent::Select,
            }
        };
        debug!("menu: accept on step {} -> {}", step, self.selected_step);
        Some(event)
    }

    /// Cycle the brightness value within `1..registers`.
    pub fn next_brightness(&mut self, now: u64) -> Option<MenuEvent> {
        self.keep_alive(now);
        self.brightness = self.wrap_value(self.brightness);
        Some(MenuEvent::FirstChange)
    }

    /// Cycle the interval value within `1..registers`.
    pub fn next_interval(&mut self, now: u64) -> Option<MenuEvent> {
        self.keep_alive(now);
        self.interval = self.wrap_value(self.interval);
        Some(MenuEvent::SecondChange)
    }

    /// Seed the brightness counter (e.g. from stored settings).
    pub fn set_brightness(&mut self, value: u8) {
        self.brightness = self.clamp_value(value);
    }

    /// Seed the interval counter (e.g. from stored settings).
    pub fn set_interval(&mut self, value: u8) {
        self.interval = self.clamp_value(value);
    }

    /// Leave the entered register without raising an event.
    pub fn exit_sub_menu(&mut self, now: u64) {
        self.keep_alive(now);
        self.selected_step = 0;
    }

    /// Close the menu.
    pub fn exit(&mut self) -> Option<MenuEvent> {
        self.step = 0;
        self.selected_step = 0;
        self.active = false;
        debug!("menu: closed");
        Some(MenuEvent::Exit)
    }

    /// Restart the inactivity timer.
    pub fn keep_alive(&mut self, now: u64) {
        self.last_activity = now;
    }

    /// Apply the inactivity timeouts.
    pub fn tick(&mut self, now: u64) -> Option<MenuEvent> {
        if !self.active {
            return None;
        }

        let idle = now.saturating_sub(self.last_activity);
        if self.selected_step == 0 {
            if idle >= MENU_IDLE_TIMEOUT_MS {
                return self.exit();
            }
        } else if idle >= MENU_SUBMENU_TIMEOUT_MS {
            self.keep_alive(now);
            self.selected_step = 0;
            debug!("menu: selection on step {} expired", self.step);
            return Some(MenuEvent::SelectionExpired);
        }
        None
    }

    pub fn current_step(&self) -> u8 {
        self.step
    }

    pub fn current_brightness(&self) -> u8 {
        self.brightness
    }

    pub fn current_interval(&self) -> u8 {
        self.interval
    }

    /// Register 1 is entered.
    pub fn is_first_menu_active(&self) -> bool {
        self.selected_step == 1
    }

    /// Register 2 is entered.
    pub fn is_second_menu_active(&self) -> bool {
        self.selected_step == 2
    }

    pub fn is_menu_active(&self) -> bool {
        self.active
    }

    /// Register currently entered or selected, `0` while browsing.
    pub fn selected_step(&self) -> u8 {
        self.selected_step
    }

    fn wrap_value(&self, value: u8) -> u8 {
        if value + 1 > self.registers - 1 {
            1
        } else {
            value + 1
        }
    }

    fn clamp_value(&self, value: u8) -> u8 {
        value.clamp(1, self.registers - 1)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Unit Tests
// ═══════════════════════════════════════════════════════════════════════════
