//! User input - two physical buttons.
//!
//! ## Components
//!
//! - **Black button**: advance to the next register / value
//! - **Red button**: open the menu, enter a register, apply
//!
//! Debouncing and simultaneous-press suppression live in
//! [`input_logic`] so they can be tested on the host; the embedded
//! polling task is in `buttons.rs`.

pub mod input_logic;

/// Physical button events (after debouncing).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Button {
    /// Black button.
    Advance,
    /// Red button.
    Accept,
}
