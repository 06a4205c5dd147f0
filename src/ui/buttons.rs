//! GPIO button input with debouncing.
//!
//! Two physical buttons (active-low with internal pull-up):
//!   - BLACK - advance
//!   - RED   - accept
//!
//! Both pins are polled by one task so a press made while the other
//! button is held can be suppressed. Presses are sent to the control loop
//! over a channel.

use defmt::info;
use embassy_nrf::gpio::{AnyPin, Input, Pull};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Sender;
use embassy_time::{Duration, Instant, Timer};
use loopgauge::ui::input_logic::ButtonPair;
use loopgauge::ui::Button;

/// Pin sampling period.
const POLL_MS: u64 = 5;

/// Run the button polling loop.
pub async fn button_task(
    black: AnyPin,
    red: AnyPin,
    tx: Sender<'static, CriticalSectionRawMutex, Button, 4>,
) -> ! {
    let black = Input::new(black, Pull::Up);
    let red = Input::new(red, Pull::Up);
    let mut pair = ButtonPair::new();

    loop {
        let now = Instant::now().as_millis();
        if let Some(button) = pair.update(black.is_low(), red.is_low(), now) {
            info!("Button: {}", button);
            tx.send(button).await;
        }
        Timer::after(Duration::from_millis(POLL_MS)).await;
    }
}
