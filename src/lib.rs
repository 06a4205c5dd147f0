//! Host-testable core of the loopgauge firmware.
//!
//! Everything that does not touch a peripheral lives here: the menu and
//! animation state machines, the device coordinator, settings, sensor
//! scaling and button logic. Every operation takes the current time in
//! milliseconds, so the whole crate runs under `cargo test` on the host.
//!
//! Usage: `cargo test`
//!
//! Note: The embedded binary (`src/main.rs`, feature `embedded`) adds the
//! nRF52840 drivers and the Embassy executor on top of this library.

#![cfg_attr(not(test), no_std)]

#[macro_use]
mod fmt;

pub mod animation;
pub mod config;
pub mod device;
pub mod error;
pub mod led;
pub mod menu;
pub mod portal;
pub mod sensor;
pub mod settings;
pub mod ui;

pub use device::{Continuation, Device, Mode, Parts, Platform};
pub use error::{Error, Result};
