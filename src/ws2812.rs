//! WS2812 strip driver on the nRF52840 PWM sequencer.
//!
//! Each colour bit becomes one PWM period of 1.25 µs (16 MHz / 20) whose
//! duty cycle encodes the bit. The frame is GRB, MSB first, followed by a
//! reset word and an end delay that latches the strip.

use defmt::warn;
use embassy_nrf::peripherals;
use embassy_nrf::pwm::{
    Config, Prescaler, SequenceConfig, SequenceLoad, SequencePwm, SingleSequenceMode,
    SingleSequencer,
};
use embassy_time::{Duration, Timer};
use loopgauge::config::NUM_LEDS;
use loopgauge::Error;
use smart_leds::RGB8;

/// High time of a `1` bit (0.8 µs), polarity bit set.
const T1H: u16 = 0x8000 | 13;
/// High time of a `0` bit (0.4 µs).
const T0H: u16 = 0x8000 | 7;
/// Line held low.
const RES: u16 = 0x8000;

const WORDS: usize = NUM_LEDS * 24 + 1;

/// Time the sequencer needs for one frame plus the latch delay.
const FRAME_TIME: Duration = Duration::from_micros(WORDS as u64 * 5 / 4 + 1_050);

pub struct Ws2812<'d> {
    pwm: SequencePwm<'d, peripherals::PWM0>,
    words: [u16; WORDS],
}

impl<'d> Ws2812<'d> {
    pub fn new(pwm: peripherals::PWM0, data: peripherals::P1_05) -> Result<Self, Error> {
        let mut config = Config::default();
        config.sequence_load = SequenceLoad::Common;
        config.prescaler = Prescaler::Div1;
        config.max_duty = 20;
        let pwm = SequencePwm::new_1ch(pwm, data, config).map_err(|_| Error::Led)?;
        Ok(Self {
            pwm,
            words: [RES; WORDS],
        })
    }

    /// Send one frame of already brightness-scaled pixels.
    pub async fn write(&mut self, pixels: impl Iterator<Item = RGB8>) -> Result<(), Error> {
        let mut i = 0;
        for px in pixels.take(NUM_LEDS) {
            for byte in [px.g, px.r, px.b] {
                for bit in (0..8).rev() {
                    self.words[i] = if byte & (1 << bit) != 0 { T1H } else { T0H };
                    i += 1;
                }
            }
        }
        for word in &mut self.words[i..] {
            *word = RES;
        }

        let mut seq_config = SequenceConfig::default();
        // Latch delay in PWM periods; the trailing RES word is the first one.
        seq_config.end_delay = 799;

        let sequencer = SingleSequencer::new(&mut self.pwm, &self.words, seq_config);
        if let Err(e) = sequencer.start(SingleSequenceMode::Times(1)) {
            warn!("WS2812: sequence start failed: {:?}", e);
            return Err(Error::Led);
        }
        Timer::after(FRAME_TIME).await;
        Ok(())
    }
}
