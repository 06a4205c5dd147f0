//! 4-20 mA current-loop sensor.
//!
//! The loop current develops a voltage over a shunt resistor which the ADC
//! reads. [`LoopSensor`] averages several raw readings and scales them to a
//! display level between the calibrated 4 mA and 20 mA ADC codes. The
//! [`Sampler`] decides when a reading is due and when the step-up converter
//! feeding the loop has to be powered.

use crate::config::{
    SENSOR_ADC_MAX, SENSOR_DEFAULT_MAX_ADC, SENSOR_DEFAULT_MIN_ADC, SENSOR_MAX_LEVEL,
    SENSOR_SAMPLES, SENSOR_SHUNT_OHMS, SENSOR_STEP_UP_SETTLE_MS, SENSOR_VREF_DECIVOLTS,
    VALUE_CHOICES,
};
use crate::error::{Error, Result};

/// Period of the always-on interval.
pub const ALWAYS_ON_PERIOD_MS: u64 = 1_000;

/// Sensor as seen by the coordinator.
pub trait Sensor {
    /// Take a fresh reading and return its display level.
    fn sample(&mut self) -> u16;

    /// Averaged raw ADC code of the last [`sample`](Self::sample).
    fn last_raw_adc(&self) -> i32;

    fn set_lower_bound(&mut self, adc: i32);

    fn set_upper_bound(&mut self, adc: i32);

    fn lower_bound(&self) -> i32;

    fn upper_bound(&self) -> i32;
}

/// Source of raw ADC codes.
pub trait AdcSource {
    fn read(&mut self) -> u16;
}

/// Electrical parameters of the loop input.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ScaleParams {
    pub shunt_ohms: u16,
    /// Reference voltage in tenths of a volt.
    pub vref_decivolts: u16,
    pub adc_max: i32,
}

impl Default for ScaleParams {
    fn default() -> Self {
        Self {
            shunt_ohms: SENSOR_SHUNT_OHMS,
            vref_decivolts: SENSOR_VREF_DECIVOLTS,
            adc_max: SENSOR_ADC_MAX,
        }
    }
}

impl ScaleParams {
    /// ADC code expected for a loop current given in µA.
    fn code_for(&self, micro_amps: u32) -> i32 {
        let resolution = self.adc_max as u64 + 1;
        let num = micro_amps as u64 * self.shunt_ohms as u64 * resolution;
        // µA * Ω = µV; vref is in 100 mV units.
        let den = self.vref_decivolts as u64 * 100_000;
        if den == 0 {
            return i32::MAX;
        }
        (num / den) as i32
    }

    /// Theoretical ADC codes for 4 mA and 20 mA.
    pub fn theoretical_bounds(&self) -> (i32, i32) {
        (self.code_for(4_000), self.code_for(20_000))
    }

    /// Check that the shunt and reference voltage put the whole loop range
    /// inside the ADC range.
    pub fn check(&self) -> Result<()> {
        let (min, max) = self.theoretical_bounds();
        if min < 0 {
            warn!("sensor: shunt too small for vref (4 mA = {})", min);
            return Err(Error::SensorRange);
        }
        if max > self.adc_max {
            warn!("sensor: shunt too large for vref (20 mA = {})", max);
            return Err(Error::SensorRange);
        }
        debug!("sensor: parameters ok ({}..{})", min, max);
        Ok(())
    }
}

/// Linear mapping of ADC codes onto `0..=max_level`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LoopScale {
    pub min_adc: i32,
    pub max_adc: i32,
    pub max_level: u16,
}

impl Default for LoopScale {
    fn default() -> Self {
        Self {
            min_adc: SENSOR_DEFAULT_MIN_ADC,
            max_adc: SENSOR_DEFAULT_MAX_ADC,
            max_level: SENSOR_MAX_LEVEL,
        }
    }
}

impl LoopScale {
    /// Level for an averaged ADC code, clamped to `0..=max_level`.
    /// A non-positive span reads as level 0.
    pub fn level(&self, adc: i32) -> u16 {
        let span = self.max_adc as i64 - self.min_adc as i64;
        if span <= 0 {
            return 0;
        }
        let value = (adc as i64 - self.min_adc as i64) * self.max_level as i64 / span;
        value.clamp(0, self.max_level as i64) as u16
    }
}

/// Reject a calibration whose lower bound is not below its upper bound.
pub fn validate_bounds(min_adc: i32, max_adc: i32) -> Result<()> {
    if min_adc >= max_adc {
        return Err(Error::InvalidCalibration);
    }
    Ok(())
}

/// Measurement period for an interval index.
///
/// | index | period |
/// |-------|--------|
/// | 1 | 4 h |
/// | 2 | 1 h |
/// | 3 | 30 min |
/// | 4 | 5 min |
/// | 5 | 30 s |
/// | other | 1 s (always on) |
pub fn interval_period_ms(interval: u32) -> u64 {
    match interval {
        1 => 14_400_000,
        2 => 3_600_000,
        3 => 1_800_000,
        4 => 300_000,
        5 => 30_000,
        _ => ALWAYS_ON_PERIOD_MS,
    }
}

/// Interval indices the menu can select.
pub fn is_valid_interval(interval: u32) -> bool {
    (1..=VALUE_CHOICES as u32).contains(&interval)
}

/// Averaging current-loop sensor over any [`AdcSource`].
pub struct LoopSensor<A> {
    adc: A,
    scale: LoopScale,
    last_raw: i32,
}

impl<A: AdcSource> LoopSensor<A> {
    pub fn new(adc: A) -> Self {
        Self {
            adc,
            scale: LoopScale::default(),
            last_raw: 0,
        }
    }

    pub fn scale(&self) -> &LoopScale {
        &self.scale
    }

    pub fn adc_mut(&mut self) -> &mut A {
        &mut self.adc
    }
}

impl<A: AdcSource> Sensor for LoopSensor<A> {
    fn sample(&mut self) -> u16 {
        let mut sum: u32 = 0;
        for _ in 0..SENSOR_SAMPLES {
            sum += self.adc.read() as u32;
        }
        self.last_raw = (sum / SENSOR_SAMPLES as u32) as i32;
        let level = self.scale.level(self.last_raw);
        trace!("sensor: adc={} level={}", self.last_raw, level);
        level
    }

    fn last_raw_adc(&self) -> i32 {
        self.last_raw
    }

    fn set_lower_bound(&mut self, adc: i32) {
        self.scale.min_adc = adc;
    }

    fn set_upper_bound(&mut self, adc: i32) {
        self.scale.max_adc = adc;
    }

    fn lower_bound(&self) -> i32 {
        self.scale.min_adc
    }

    fn upper_bound(&self) -> i32 {
        self.scale.max_adc
    }
}

/// What the control loop should do with the sensor right now.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SamplerStep {
    Wait,
    /// Switch the step-up converter on and keep waiting for it to settle.
    PowerUp,
    /// Take a reading now, then switch the converter off if `release_power`.
    Sample { release_power: bool },
}

/// Reading scheduler.
///
/// A reading is due one period after the previous one. Except in always-on
/// mode the step-up converter is switched on first and given a settle delay
/// before the reading is taken.
#[derive(Clone, Copy, Debug)]
pub struct Sampler {
    period_ms: u64,
    last: u64,
    powered: bool,
}

impl Sampler {
    pub const fn new(period_ms: u64) -> Self {
        Self {
            period_ms,
            last: 0,
            powered: false,
        }
    }

    pub fn period_ms(&self) -> u64 {
        self.period_ms
    }

    pub fn set_period(&mut self, period_ms: u64) {
        self.period_ms = period_ms;
        self.powered = false;
    }

    /// The converter was switched off outside the schedule.
    pub fn release_power(&mut self) {
        self.powered = false;
    }

    fn always_on(&self) -> bool {
        self.period_ms == ALWAYS_ON_PERIOD_MS
    }

    /// Advance the schedule. `suspended` holds readings back (calibration
    /// owns the sensor).
    pub fn poll(&mut self, now: u64, suspended: bool) -> SamplerStep {
        if suspended {
            return SamplerStep::Wait;
        }
        let elapsed = now.saturating_sub(self.last);
        if elapsed < self.period_ms {
            return SamplerStep::Wait;
        }
        if self.always_on() || elapsed >= self.period_ms + SENSOR_STEP_UP_SETTLE_MS {
            self.last = now;
            self.powered = self.always_on();
            return SamplerStep::Sample {
                release_power: !self.always_on(),
            };
        }
        if self.powered {
            SamplerStep::Wait
        } else {
            self.powered = true;
            SamplerStep::PowerUp
        }
    }
}
