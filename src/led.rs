//! Pixel surface abstraction and in-RAM frame buffer.
//!
//! The animation engine only ever draws through [`PixelSurface`]. On the
//! device a [`FrameBuffer`] collects the frame and the control loop pushes
//! it to the WS2812 driver whenever it is dirty, so drawing never waits on
//! the strip.

use smart_leds::RGB8;

/// Colour with all channels off.
pub const OFF: RGB8 = RGB8 { r: 0, g: 0, b: 0 };

/// Colour palette shared by every draw path.
pub mod colors {
    use smart_leds::RGB8;

    /// Apply acknowledgement and boot animation.
    pub const APPLY: RGB8 = RGB8 { r: 185, g: 50, b: 255 };
    /// Successful operation.
    pub const SUCCESS: RGB8 = RGB8 { r: 0, g: 255, b: 0 };
    /// Pixel 0 while the menu is open.
    pub const MENU_INDICATOR: RGB8 = RGB8 { r: 255, g: 255, b: 0 };
    /// Register / value pixels while the menu is open.
    pub const MENU_STEP: RGB8 = RGB8 { r: 0, g: 140, b: 255 };
    /// Faults, errors and the factory-reset sequence.
    pub const RED: RGB8 = RGB8 { r: 255, g: 0, b: 0 };

    /// Level 0: no valid reading.
    pub const LEVEL_INVALID: RGB8 = RGB8 { r: 255, g: 0, b: 255 };
    /// Level 1.
    pub const LEVEL_LOW: RGB8 = RGB8 { r: 255, g: 0, b: 0 };
    /// Levels 2 and 3.
    pub const LEVEL_MID: RGB8 = RGB8 { r: 255, g: 165, b: 0 };
    /// Levels 4 and up.
    pub const LEVEL_HIGH: RGB8 = RGB8 { r: 0, g: 255, b: 0 };
}

/// Something that can hold and display a row of pixels.
pub trait PixelSurface {
    /// Number of physical pixels.
    fn pixel_count(&self) -> usize;

    /// Set one pixel by physical index. Out-of-range indices are ignored.
    fn set_pixel(&mut self, index: usize, color: RGB8);

    /// Flush buffered changes to the strip.
    fn show(&mut self);

    /// Global strip brightness, 0..=255.
    fn set_brightness(&mut self, brightness: u8);
}

/// Map a menu brightness level (1..=6) onto a perceptually even strip
/// brightness.
pub fn log_brightness(level: u8) -> u8 {
    match level {
        1 => 1,
        2 => 5,
        3 => 30,
        4 => 50,
        5 => 150,
        6 => 255,
        _ => 1,
    }
}

/// Colour of the level bar for a sensor level.
pub fn level_color(level: u16) -> RGB8 {
    match level {
        0 => colors::LEVEL_INVALID,
        1 => colors::LEVEL_LOW,
        2..=3 => colors::LEVEL_MID,
        _ => colors::LEVEL_HIGH,
    }
}

/// Fixed-size pixel buffer with a dirty flag.
#[derive(Clone, Debug)]
pub struct FrameBuffer<const N: usize> {
    pixels: [RGB8; N],
    brightness: u8,
    dirty: bool,
}

impl<const N: usize> FrameBuffer<N> {
    /// Create a dark buffer.
    pub const fn new(brightness: u8) -> Self {
        Self {
            pixels: [OFF; N],
            brightness,
            dirty: false,
        }
    }

    /// Raw (unscaled) pixel colours.
    pub fn pixels(&self) -> &[RGB8; N] {
        &self.pixels
    }

    pub fn brightness(&self) -> u8 {
        self.brightness
    }

    /// Brightness-scaled pixels, ready for a `SmartLedsWrite` driver.
    pub fn frame(&self) -> impl Iterator<Item = RGB8> + '_ {
        smart_leds::brightness(self.pixels.iter().copied(), self.brightness)
    }

    /// Returns `true` once per `show()` since the last call.
    pub fn take_dirty(&mut self) -> bool {
        core::mem::replace(&mut self.dirty, false)
    }
}

impl<const N: usize> PixelSurface for FrameBuffer<N> {
    fn pixel_count(&self) -> usize {
        N
    }

    fn set_pixel(&mut self, index: usize, color: RGB8) {
        if let Some(px) = self.pixels.get_mut(index) {
            *px = color;
        }
    }

    fn show(&mut self) {
        self.dirty = true;
    }

    fn set_brightness(&mut self, brightness: u8) {
        if self.brightness != brightness {
            self.brightness = brightness;
            self.dirty = true;
        }
    }
}
