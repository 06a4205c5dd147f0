//! loopgauge firmware for the nRF52840.
//!
//! Tasks:
//!   - `buttons_task`: polls and debounces the two menu buttons
//!   - `main`: control loop - feeds presses and time into the [`Device`],
//!     flushes the strip and persists settings
//!
//! All interaction logic lives in the `loopgauge` library; this file only
//! binds it to peripherals.

#![no_std]
#![no_main]

#[path = "ui/buttons.rs"]
mod buttons;
mod storage;
mod ws2812;

use defmt::{info, unwrap, warn};
use embassy_embedded_hal::adapter::BlockingAsync;
use embassy_executor::Spawner;
use embassy_nrf::gpio::{AnyPin, Level, Output, OutputDrive, Pin};
use embassy_nrf::nvmc::Nvmc;
use embassy_nrf::saadc::{self, ChannelConfig, Resolution, Saadc};
use embassy_nrf::bind_interrupts;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_time::{Duration, Instant, Ticker};
use loopgauge::config::{
    CONTROL_LOOP_PERIOD_MS, LED_BOOT_BRIGHTNESS, NUM_LEDS, SENSOR_ADC_MAX, STORAGE_RETRY_MS,
};
use loopgauge::led::FrameBuffer;
use loopgauge::portal::NoPortal;
use loopgauge::sensor::{AdcSource, LoopSensor};
use loopgauge::settings::SaveBackoff;
use loopgauge::ui::Button;
use loopgauge::{Device, Parts, Platform};
use {defmt_rtt as _, panic_probe as _};

bind_interrupts!(struct Irqs {
    SAADC => saadc::InterruptHandler;
});

/// Debounced presses from the button task to the control loop.
static BUTTONS: Channel<CriticalSectionRawMutex, Button, 4> = Channel::new();

/// Loop current input on AIN1.
struct LoopInput<'d> {
    saadc: Saadc<'d, 1>,
}

impl AdcSource for LoopInput<'_> {
    fn read(&mut self) -> u16 {
        let mut buf = [0i16; 1];
        self.saadc.blocking_sample(&mut buf);
        buf[0].clamp(0, SENSOR_ADC_MAX as i16) as u16
    }
}

/// Step-up switch and reset handling.
struct Board<'d> {
    step_up: Output<'d>,
    restart_requested: bool,
}

impl Platform for Board<'_> {
    fn set_sensor_power(&mut self, on: bool) {
        if on {
            self.step_up.set_high();
        } else {
            self.step_up.set_low();
        }
    }

    fn restart(&mut self) {
        // The control loop resets once pending settings are flushed.
        self.restart_requested = true;
    }

    fn erase_network_config(&mut self) {
        info!("No network configuration on this board");
    }
}

fn now_ms() -> u64 {
    Instant::now().as_millis()
}

#[embassy_executor::task]
async fn buttons_task(black: AnyPin, red: AnyPin) {
    buttons::button_task(black, red, BUTTONS.sender()).await
}

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    let p = embassy_nrf::init(Default::default());
    info!("loopgauge starting");

    // Settings
    let mut flash = BlockingAsync::new(Nvmc::new(p.NVMC));
    let settings = storage::load(&mut flash).await;

    // Strip
    let mut strip = unwrap!(ws2812::Ws2812::new(p.PWM0, p.P1_05));

    // Sensor
    let mut config = saadc::Config::default();
    config.resolution = Resolution::_10BIT;
    let saadc = Saadc::new(p.SAADC, Irqs, config, [ChannelConfig::single_ended(p.P0_03)]);
    saadc.calibrate().await;

    let board = Board {
        step_up: Output::new(p.P0_28, Level::Low, OutputDrive::Standard),
        restart_requested: false,
    };

    unwrap!(spawner.spawn(buttons_task(p.P0_11.degrade(), p.P0_12.degrade())));

    let mut device = Device::new(
        now_ms(),
        Parts {
            surface: FrameBuffer::<NUM_LEDS>::new(LED_BOOT_BRIGHTNESS),
            sensor: LoopSensor::new(LoopInput { saadc }),
            store: settings,
            portal: NoPortal,
            platform: board,
        },
    );

    let mut backoff = SaveBackoff::new();
    let mut ticker = Ticker::every(Duration::from_millis(CONTROL_LOOP_PERIOD_MS));
    loop {
        while let Ok(button) = BUTTONS.try_receive() {
            device.on_button(now_ms(), button);
        }
        device.tick(now_ms());

        let surface = device.surface_mut();
        if surface.take_dirty() {
            if let Err(e) = strip.write(surface.frame()).await {
                warn!("Strip write failed: {}", e);
            }
        }

        if device.store().is_dirty() && backoff.is_due(now_ms()) {
            match storage::save(device.store_mut(), &mut flash).await {
                Ok(()) => backoff.succeeded(),
                Err(e) => {
                    warn!("Settings not saved, retrying in {} ms: {}", STORAGE_RETRY_MS, e);
                    backoff.failed(now_ms());
                }
            }
        }

        if device.platform().restart_requested {
            info!("Restarting");
            cortex_m::peripheral::SCB::sys_reset();
        }

        ticker.next().await;
    }
}
