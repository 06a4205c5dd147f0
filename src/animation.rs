//! Non-blocking LED animation engine.
//!
//! One sequence runs at a time. `tick()` advances it from the control
//! loop; nothing here ever waits.
//!
//! ```text
//!            start_sequence
//!   Idle ─────────────────────► FadeUp ──(last pixel)──► FadeDown
//!    ▲                                                      │
//!    └──────────────(below pixel 0, fires continuation)─────┘
//!
//!   Idle ──fault_blink──► BlinkFirst     (until pre-empted)
//!   Idle ──menu_active──► MenuActive     (until pre-empted)
//!   Idle ──timed_blink──► TimedBlink ──(budget spent, fires continuation)──► Idle
//! ```
//!
//! A sequence may carry one continuation `C`. It is handed back exactly
//! once: from `tick()` when the sequence completes, or from whatever call
//! pre-empts it (a new sequence or a static render). `stop()` discards it.
//! Looping sequences restart `FadeUp` instead of completing.
//!
//! Every draw goes through [`AnimationEngine::map_index`], so mirrored
//! strips render identically on all paths.

use core::ops::RangeInclusive;

use smart_leds::RGB8;

use crate::config::{FADE_STEP_MS, FAULT_BLINK_OFF_MS, FAULT_BLINK_ON_MS, MENU_BLINK_MS};
use crate::led::{colors, level_color, log_brightness, PixelSurface, OFF};

/// Animation phases.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Phase {
    Idle,
    FadeUp,
    FadeDown,
    BlinkFirst,
    MenuActive,
    TimedBlink,
}

/// A fade request: light the strip pixel by pixel, then clear it again.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Sequence<C> {
    color: RGB8,
    on_complete: Option<C>,
    looping: bool,
    prefill: bool,
}

impl<C> Sequence<C> {
    pub fn fade(color: RGB8) -> Self {
        Self {
            color,
            on_complete: None,
            looping: false,
            prefill: false,
        }
    }

    /// Continuation handed back when the sequence ends or is pre-empted.
    pub fn then(mut self, continuation: C) -> Self {
        self.on_complete = Some(continuation);
        self
    }

    /// Restart instead of completing.
    pub fn looping(mut self) -> Self {
        self.looping = true;
        self
    }

    /// Light the whole strip before the first step.
    pub fn prefilled(mut self) -> Self {
        self.prefill = true;
        self
    }
}

/// Pixel range and timing for the blinking phases.
#[derive(Clone, Copy, Debug)]
struct Blink {
    first: usize,
    last: usize,
    period: u64,
    budget: u64,
    lit: bool,
}

impl Blink {
    const NONE: Self = Self {
        first: 0,
        last: 0,
        period: 0,
        budget: 0,
        lit: false,
    };
}

/// Owns the strip and the running sequence.
pub struct AnimationEngine<S, C> {
    surface: S,
    phase: Phase,
    cursor: usize,
    color: RGB8,
    last_tick: u64,
    sequence_start: u64,
    pending: Option<C>,
    looping: bool,
    blink: Blink,
    orientation: bool,
}

impl<S: PixelSurface, C> AnimationEngine<S, C> {
    /// `orientation = true` mirrors the strip (pixel 0 at the far end).
    pub fn new(surface: S, orientation: bool) -> Self {
        Self {
            surface,
            phase: Phase::Idle,
            cursor: 0,
            color: OFF,
            last_tick: 0,
            sequence_start: 0,
            pending: None,
            looping: false,
            blink: Blink::NONE,
            orientation,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_active(&self) -> bool {
        self.phase != Phase::Idle
    }

    pub fn orientation(&self) -> bool {
        self.orientation
    }

    pub fn set_orientation(&mut self, orientation: bool) {
        self.orientation = orientation;
    }

    /// Apply a menu brightness level (1..=6) to the strip.
    pub fn set_brightness(&mut self, level: u8) {
        self.surface.set_brightness(log_brightness(level));
        self.surface.show();
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    /// Logical to physical pixel index.
    pub fn map_index(&self, logical: usize) -> usize {
        let count = self.surface.pixel_count();
        if self.orientation && logical < count {
            count - 1 - logical
        } else {
            logical
        }
    }

    /// End the running sequence and hand back its continuation.
    pub fn preempt(&mut self) -> Option<C> {
        if self.phase != Phase::Idle {
            self.halt();
        }
        self.pending.take()
    }

    /// Force `Idle` and blank the strip. The continuation is dropped.
    pub fn stop(&mut self) {
        self.pending = None;
        self.halt();
    }

    /// Start a fade sequence, pre-empting the running one.
    ///
    /// The pre-empted continuation is returned; nothing of the new
    /// sequence is drawn before the next `tick()` unless it is prefilled.
    pub fn start_sequence(&mut self, now: u64, sequence: Sequence<C>) -> Option<C> {
        let preempted = self.preempt();

        self.color = sequence.color;
        self.pending = sequence.on_complete;
        self.looping = sequence.looping;
        self.cursor = 0;
        self.last_tick = now;
        self.sequence_start = now;
        self.phase = Phase::FadeUp;

        if sequence.prefill {
            for i in 0..self.surface.pixel_count() {
                self.set_pixel(i, self.color);
            }
            self.surface.show();
        }
        preempted
    }

    /// Slow blink of pixel 0 signalling a sensor fault. Runs until pre-empted.
    pub fn fault_blink(&mut self, now: u64) -> Option<C> {
        let preempted = self.preempt();
        self.color = colors::RED;
        self.blink = Blink {
            lit: true,
            ..Blink::NONE
        };
        self.last_tick = now;
        self.sequence_start = now;
        self.phase = Phase::BlinkFirst;
        self.blank();
        self.set_pixel(0, self.color);
        self.surface.show();
        preempted
    }

    /// Menu marker on pixel 0 with pixels `1..=register` blinking.
    pub fn menu_active(&mut self, now: u64, register: u8) -> Option<C> {
        let preempted = self.preempt();
        self.color = colors::MENU_STEP;
        self.blink = Blink {
            first: 1,
            last: register as usize,
            period: MENU_BLINK_MS,
            budget: 0,
            lit: false,
        };
        self.last_tick = now;
        self.sequence_start = now;
        self.phase = Phase::MenuActive;
        self.blank();
        self.set_pixel(0, colors::MENU_INDICATOR);
        self.surface.show();
        preempted
    }

    /// Blink `pixels` with `period` on/off until `budget` ms
    /// have passed, then complete with `on_complete`.
    pub fn timed_blink(
        &mut self,
        now: u64,
        pixels: RangeInclusive<usize>,
        color: RGB8,
        period: u64,
        budget: u64,
        on_complete: Option<C>,
    ) -> Option<C> {
        let preempted = self.preempt();
        self.color = color;
        self.pending = on_complete;
        self.blink = Blink {
            first: *pixels.start(),
            last: *pixels.end(),
            period,
            budget,
            lit: false,
        };
        self.last_tick = now;
        self.sequence_start = now;
        self.phase = Phase::TimedBlink;
        self.blank();
        self.surface.show();
        preempted
    }

    /// Static: menu marker plus `step` register pixels.
    pub fn menu_indicator(&mut self, step: u8) -> Option<C> {
        let preempted = self.preempt();
        self.blank();
        self.set_pixel(0, colors::MENU_INDICATOR);
        for i in 1..=step as usize {
            self.set_pixel(i, colors::MENU_STEP);
        }
        self.surface.show();
        preempted
    }

    /// Static: two marker pixels plus `value` value pixels.
    pub fn value_indicator(&mut self, value: u8) -> Option<C> {
        let preempted = self.preempt();
        self.blank();
        self.set_pixel(0, colors::MENU_INDICATOR);
        self.set_pixel(1, colors::MENU_INDICATOR);
        for i in 1..=value as usize {
            self.set_pixel(1 + i, colors::MENU_STEP);
        }
        self.surface.show();
        preempted
    }

    /// Static: level bar `0..=level`, coloured by band.
    pub fn level(&mut self, level: u16) -> Option<C> {
        let preempted = self.preempt();
        self.blank();
        let color = level_color(level);
        for i in 0..=level as usize {
            self.set_pixel(i, color);
        }
        self.surface.show();
        preempted
    }

    /// Advance the running sequence. Returns the continuation of a
    /// sequence that completed on this tick.
    pub fn tick(&mut self, now: u64) -> Option<C> {
        let elapsed = now.saturating_sub(self.last_tick);
        match self.phase {
            Phase::Idle => None,
            Phase::FadeUp => {
                if elapsed >= FADE_STEP_MS {
                    self.set_pixel(self.cursor, self.color);
                    self.surface.show();
                    self.cursor += 1;
                    self.last_tick = now;
                    let count = self.surface.pixel_count();
                    if self.cursor >= count {
                        self.cursor = count.saturating_sub(1);
                        self.phase = Phase::FadeDown;
                    }
                }
                None
            }
            Phase::FadeDown => {
                if elapsed < FADE_STEP_MS {
                    return None;
                }
                self.set_pixel(self.cursor, OFF);
                self.surface.show();
                self.last_tick = now;
                if self.cursor > 0 {
                    self.cursor -= 1;
                    return None;
                }
                if self.looping {
                    self.phase = Phase::FadeUp;
                    self.sequence_start = now;
                    return None;
                }
                self.finish()
            }
            Phase::BlinkFirst => {
                if self.blink.lit && elapsed >= FAULT_BLINK_ON_MS {
                    self.set_pixel(0, OFF);
                    self.blink.lit = false;
                    self.last_tick = now;
                    self.surface.show();
                } else if !self.blink.lit && elapsed >= FAULT_BLINK_OFF_MS {
                    self.set_pixel(0, self.color);
                    self.blink.lit = true;
                    self.last_tick = now;
                    self.surface.show();
                }
                None
            }
            Phase::MenuActive => {
                self.blink_step(now, elapsed);
                None
            }
            Phase::TimedBlink => {
                self.blink_step(now, elapsed);
                if now.saturating_sub(self.sequence_start) >= self.blink.budget {
                    return self.finish();
                }
                None
            }
        }
    }

    fn blink_step(&mut self, now: u64, elapsed: u64) {
        if elapsed < self.blink.period {
            return;
        }
        self.blink.lit = !self.blink.lit;
        let color = if self.blink.lit { self.color } else { OFF };
        for i in self.blink.first..=self.blink.last {
            self.set_pixel(i, color);
        }
        self.surface.show();
        self.last_tick = now;
    }

    fn finish(&mut self) -> Option<C> {
        self.halt();
        self.pending.take()
    }

    fn halt(&mut self) {
        self.phase = Phase::Idle;
        self.looping = false;
        self.blank();
        self.surface.show();
    }

    fn blank(&mut self) {
        for i in 0..self.surface.pixel_count() {
            self.surface.set_pixel(i, OFF);
        }
    }

    fn set_pixel(&mut self, logical: usize, color: RGB8) {
        let physical = self.map_index(logical);
        self.surface.set_pixel(physical, color);
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Unit Tests
// ═══════════════════════════════════════════════════════════════════════════
