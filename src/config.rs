//! Application-wide constants and compile-time configuration.
//!
//! All hardware pin assignments, timing parameters, and sensor
//! constants live here so they can be tuned in one place.
//!
//! Every duration is in milliseconds of the monotonic clock handed to
//! `tick()`.

// LED strip

/// Number of pixels on the WS2812 strip.
pub const NUM_LEDS: usize = 8;

/// Strip brightness used until the stored setting has been applied.
pub const LED_BOOT_BRIGHTNESS: u8 = 50;

// Menu

/// Number of top-level menu registers.
/// 8 pixels: pixel 0 is the menu marker, the rest show the register.
pub const MENU_REGISTERS: u8 = 7;

/// Choices offered by the brightness and interval registers (`1..=N`).
pub const VALUE_CHOICES: u8 = MENU_REGISTERS - 1;

/// Menu closes after this long without input while browsing registers.
pub const MENU_IDLE_TIMEOUT_MS: u64 = 8_000;

/// An entered register falls back to browsing after this long without input.
pub const MENU_SUBMENU_TIMEOUT_MS: u64 = 20_000;

// Animation timing

/// Time between two pixels of a fade sequence.
pub const FADE_STEP_MS: u64 = 100;

/// Sensor-fault blink on pixel 0: lit for this long...
pub const FAULT_BLINK_ON_MS: u64 = 1_000;

/// ...then dark for this long.
pub const FAULT_BLINK_OFF_MS: u64 = 3_000;

/// Blink period of the register pixels while a register is entered.
pub const MENU_BLINK_MS: u64 = 500;

/// Blink period of the error sequence.
pub const ERROR_BLINK_MS: u64 = 100;

/// Total duration of the error sequence.
pub const ERROR_BLINK_TOTAL_MS: u64 = 2_500;

// Sensor (4-20 mA current loop)

/// Shunt resistor in ohms.
pub const SENSOR_SHUNT_OHMS: u16 = 150;

/// ADC reference voltage in volts × 10.
pub const SENSOR_VREF_DECIVOLTS: u16 = 48;

/// Level reported at 20 mA.
pub const SENSOR_MAX_LEVEL: u16 = 8;

/// ADC conversions averaged into one reading.
pub const SENSOR_SAMPLES: usize = 10;

/// Full-scale ADC code (10-bit).
pub const SENSOR_ADC_MAX: i32 = 1023;

/// Calibrated ADC code at 4 mA until a stored or measured value replaces it.
pub const SENSOR_DEFAULT_MIN_ADC: i32 = 192;

/// Calibrated ADC code at 20 mA until a stored or measured value replaces it.
pub const SENSOR_DEFAULT_MAX_ADC: i32 = 960;

/// The step-up converter needs this long before a reading is valid.
pub const SENSOR_STEP_UP_SETTLE_MS: u64 = 1_000;

/// Step-up is held on this long during a calibration before sampling.
pub const CALIBRATION_HOLD_MS: u64 = 1_000;

// Settings defaults

/// Menu brightness level (1..=6) used when nothing is stored.
pub const DEFAULT_BRIGHTNESS: u8 = 5;

/// Measurement interval index (1..=6) used when nothing is stored.
pub const DEFAULT_INTERVAL: u8 = 6;

/// Strip is mounted mirrored unless the stored setting says otherwise.
pub const DEFAULT_ORIENTATION: bool = true;

// GPIO pin assignments (nRF52840-DK defaults)
//
// These are logical names; actual `embassy_nrf::peripherals::*` types are
// selected in `main.rs`.  Adjust for your custom PCB.
//
//   Button BLACK (advance) → P0.11
//   Button RED   (accept)  → P0.12
//   WS2812 data  (PWM0)    → P1.05
//   Sensor input (SAADC)   → P0.03 / AIN1
//   Step-up enable         → P0.28

/// Button debounce time (ms).
pub const BUTTON_DEBOUNCE_MS: u64 = 50;

/// Control loop period (ms).
pub const CONTROL_LOOP_PERIOD_MS: u64 = 10;

// Settings storage

/// Flash page index where settings storage starts (4 KB per page on nRF52840).
pub const STORAGE_FLASH_PAGE_START: u32 = 252;

/// Number of flash pages reserved for settings storage.
pub const STORAGE_FLASH_PAGE_COUNT: u32 = 4;

/// Wait before writing settings again after a failed flash write.
pub const STORAGE_RETRY_MS: u64 = 5_000;
