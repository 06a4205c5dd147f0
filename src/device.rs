//! Device context: wires the menu, the animation engine and the
//! collaborators together.
//!
//! [`Device`] is built once at start-up and driven from the control loop
//! through two entry points: [`Device::on_button`] for debounced presses
//! and [`Device::tick`] for time. Both run to completion; nothing waits.
//!
//! Menu events are dispatched right after the menu operation that raised
//! them. Animation continuations ([`Continuation`]) are dispatched when the
//! engine hands them back, either on completion or when a new draw
//! pre-empts the sequence that owned them.

use crate::animation::{AnimationEngine, Phase, Sequence};
use crate::config::{
    CALIBRATION_HOLD_MS, DEFAULT_INTERVAL, ERROR_BLINK_MS, ERROR_BLINK_TOTAL_MS, MENU_REGISTERS,
};
use crate::led::{colors, PixelSurface};
use crate::menu::{MenuEngine, MenuEvent};
use crate::portal::{AdcBound, ConfigPortal, PortalEvent, PortalStatus};
use crate::sensor::{
    interval_period_ms, is_valid_interval, validate_bounds, Sampler, SamplerStep, ScaleParams, Sensor,
};
use crate::settings::{SettingKey, Settings, SettingsStore, Value};
use crate::ui::Button;

/// Board services outside the LED strip and the sensor.
pub trait Platform {
    /// Switch the step-up converter feeding the current loop.
    fn set_sensor_power(&mut self, on: bool);

    /// Reboot the device.
    fn restart(&mut self);

    /// Forget network credentials.
    fn erase_network_config(&mut self);
}

/// Work left for the device once an animation sequence ends.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Continuation {
    /// Redraw the register indicator if the menu is still open.
    ShowMenuStep,
    Restart,
    /// Wipe settings and network config, then restart.
    FactoryReset,
}

/// Top-level operating mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Mode {
    Running,
    /// The step-up converter is on and settling before a calibration
    /// reading for `bound` is taken.
    Calibrating { bound: AdcBound, since: u64 },
}

/// Collaborators handed to [`Device::new`].
pub struct Parts<S, N, K, P, H> {
    pub surface: S,
    pub sensor: N,
    pub store: K,
    pub portal: P,
    pub platform: H,
}

pub struct Device<S, N, K, P, H> {
    menu: MenuEngine,
    leds: AnimationEngine<S, Continuation>,
    sensor: N,
    store: K,
    portal: P,
    platform: H,
    sampler: Sampler,
    mode: Mode,
    interval: u32,
    level: u16,
    adc: i32,
    timestamp: u64,
}

impl<S, N, K, P, H> Device<S, N, K, P, H>
where
    S: PixelSurface,
    N: Sensor,
    K: SettingsStore,
    P: ConfigPortal,
    H: Platform,
{
    /// Load the settings, apply them and start the boot animation.
    pub fn new(now: u64, parts: Parts<S, N, K, P, H>) -> Self {
        let Parts {
            surface,
            mut sensor,
            store,
            portal,
            platform,
        } = parts;

        let settings = Settings::load(&store);
        info!("device: settings {}", settings);

        let mut leds = AnimationEngine::new(surface, settings.orientation);
        leds.set_brightness(settings.brightness);

        if settings.min_adc != 0 {
            sensor.set_lower_bound(settings.min_adc);
        }
        if settings.max_adc != 0 {
            sensor.set_upper_bound(settings.max_adc);
        }

        let interval = if is_valid_interval(settings.interval as u32) {
            settings.interval as u32
        } else {
            warn!("device: stored interval {} out of range", settings.interval);
            DEFAULT_INTERVAL as u32
        };
        let mut menu = MenuEngine::new(MENU_REGISTERS);
        menu.set_brightness(settings.brightness);
        menu.set_interval(interval as u8);

        let mut device = Self {
            menu,
            leds,
            sensor,
            store,
            portal,
            platform,
            sampler: Sampler::new(interval_period_ms(interval)),
            mode: Mode::Running,
            interval,
            level: 0,
            adc: 0,
            timestamp: 0,
        };

        let boot = match ScaleParams::default().check() {
            Ok(()) => Sequence::fade(colors::APPLY).looping(),
            Err(e) => {
                error!("device: sensor parameters out of range: {}", e);
                Sequence::fade(colors::RED).looping()
            }
        };
        device.play(now, boot);
        let status = device.status();
        device.portal.publish(&status);
        device
    }

    /// Handle one debounced press.
    pub fn on_button(&mut self, now: u64, button: Button) {
        if let Mode::Calibrating { .. } = self.mode {
            debug!("device: {} ignored while calibrating", button);
            return;
        }
        let event = match button {
            Button::Advance => self.menu.next_step(now),
            Button::Accept => self.menu.accept(now),
        };
        if let Some(event) = event {
            self.dispatch(now, event);
        }
    }

    /// One control-loop iteration.
    pub fn tick(&mut self, now: u64) {
        while let Some(event) = self.portal.poll_event() {
            self.handle_portal_event(now, event);
        }

        if let Some(event) = self.menu.tick(now) {
            self.dispatch(now, event);
        }

        if let Mode::Calibrating { bound, since } = self.mode {
            if now.saturating_sub(since) >= CALIBRATION_HOLD_MS {
                self.finish_calibration(now, bound);
            }
        }

        let calibrating = matches!(self.mode, Mode::Calibrating { .. });
        match self.sampler.poll(now, calibrating) {
            SamplerStep::Wait => {}
            SamplerStep::PowerUp => self.platform.set_sensor_power(true),
            SamplerStep::Sample { release_power } => self.take_reading(now, release_power),
        }

        if let Some(continuation) = self.leds.tick(now) {
            self.resume(now, continuation);
        }

        let status = self.status();
        self.portal.publish(&status);
    }

    /// Apply a change coming from the configuration service.
    pub fn handle_portal_event(&mut self, now: u64, event: PortalEvent) {
        info!("device: portal {}", event);
        match event {
            PortalEvent::IntervalChanged(interval) => {
                self.change_interval(now, interval);
            }
            PortalEvent::AdcBoundChanged { bound, value } => {
                if self.persist(now, bound_key(bound), value.into()) {
                    match bound {
                        AdcBound::Min => self.sensor.set_lower_bound(value),
                        AdcBound::Max => self.sensor.set_upper_bound(value),
                    }
                }
            }
            PortalEvent::OrientationChanged(orientation) => {
                self.leds.set_orientation(orientation);
                if self.persist(now, SettingKey::Orientation, orientation.into()) {
                    self.play(now, Sequence::fade(colors::APPLY));
                }
            }
        }
    }

    /// Snapshot published to the configuration service.
    pub fn status(&self) -> PortalStatus {
        PortalStatus {
            level: self.level,
            adc: self.adc,
            min_adc: self.sensor.lower_bound(),
            max_adc: self.sensor.upper_bound(),
            interval: self.interval,
            timestamp: self.timestamp,
            orientation: self.leds.orientation(),
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn menu(&self) -> &MenuEngine {
        &self.menu
    }

    pub fn leds(&self) -> &AnimationEngine<S, Continuation> {
        &self.leds
    }

    pub fn surface_mut(&mut self) -> &mut S {
        self.leds.surface_mut()
    }

    pub fn sensor(&self) -> &N {
        &self.sensor
    }

    pub fn sensor_mut(&mut self) -> &mut N {
        &mut self.sensor
    }

    pub fn store(&self) -> &K {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut K {
        &mut self.store
    }

    pub fn portal(&self) -> &P {
        &self.portal
    }

    pub fn portal_mut(&mut self) -> &mut P {
        &mut self.portal
    }

    pub fn platform(&self) -> &H {
        &self.platform
    }

    pub fn platform_mut(&mut self) -> &mut H {
        &mut self.platform
    }

    /// Measurement interval index in effect.
    pub fn interval(&self) -> u32 {
        self.interval
    }

    // ── Menu events ─────────────────────────────────────────────────────

    fn dispatch(&mut self, now: u64, event: MenuEvent) {
        let step = self.menu.current_step();
        match event {
            MenuEvent::NextStep | MenuEvent::SelectionExpired => {
                self.render(now, |leds| leds.menu_indicator(step));
            }
            MenuEvent::Exit => {
                self.leds.stop();
            }
            MenuEvent::FirstEnter => {
                let value = self.menu.current_brightness();
                self.render(now, |leds| leds.value_indicator(value));
            }
            MenuEvent::SecondEnter | MenuEvent::SecondChange => {
                let value = self.menu.current_interval();
                self.render(now, |leds| leds.value_indicator(value));
            }
            MenuEvent::FirstChange => {
                let value = self.menu.current_brightness();
                self.leds.set_brightness(value);
                self.render(now, |leds| leds.value_indicator(value));
            }
            MenuEvent::Select => {
                self.render(now, |leds| leds.menu_active(now, step));
            }
            MenuEvent::Apply => self.apply(now, step),
        }
    }

    fn apply(&mut self, now: u64, step: u8) {
        info!("device: apply register {}", step);
        match step {
            1 => {
                let brightness = self.menu.current_brightness();
                if self.persist(now, SettingKey::Brightness, (brightness as i32).into()) {
                    self.acknowledge(now);
                }
            }
            2 => {
                let interval = self.menu.current_interval() as u32;
                if self.change_interval(now, interval) {
                    self.acknowledge(now);
                }
            }
            3 => self.start_calibration(now, AdcBound::Min),
            4 => self.start_calibration(now, AdcBound::Max),
            5 => {
                let orientation = !self.leds.orientation();
                self.leds.set_orientation(orientation);
                if self.persist(now, SettingKey::Orientation, orientation.into()) {
                    self.acknowledge(now);
                }
            }
            6 => {
                warn!("device: factory reset");
                self.play(
                    now,
                    Sequence::fade(colors::RED)
                        .prefilled()
                        .then(Continuation::FactoryReset),
                );
            }
            7 => {
                self.play(now, Sequence::fade(colors::APPLY).then(Continuation::Restart));
            }
            _ => self.acknowledge(now),
        }
    }

    // ── Continuations ───────────────────────────────────────────────────

    fn resume(&mut self, now: u64, continuation: Continuation) {
        debug!("device: continuation {}", continuation);
        match continuation {
            Continuation::ShowMenuStep => {
                if self.menu.is_menu_active() {
                    let step = self.menu.current_step();
                    self.render(now, |leds| leds.menu_indicator(step));
                    self.menu.keep_alive(now);
                }
            }
            Continuation::Restart => self.platform.restart(),
            Continuation::FactoryReset => {
                if let Err(e) = self.store.format() {
                    error!("device: settings format failed: {}", e);
                }
                self.platform.erase_network_config();
                self.portal.reset();
                self.platform.restart();
            }
        }
    }

    // ── Drawing ─────────────────────────────────────────────────────────

    /// Hand back the running sequence's continuation, then draw.
    fn render(
        &mut self,
        now: u64,
        draw: impl FnOnce(&mut AnimationEngine<S, Continuation>) -> Option<Continuation>,
    ) {
        if let Some(continuation) = self.leds.preempt() {
            self.resume(now, continuation);
        }
        if let Some(continuation) = draw(&mut self.leds) {
            self.resume(now, continuation);
        }
    }

    fn play(&mut self, now: u64, sequence: Sequence<Continuation>) {
        self.render(now, |leds| leds.start_sequence(now, sequence));
    }

    /// Apply acknowledgement followed by the register indicator.
    fn acknowledge(&mut self, now: u64) {
        self.play(
            now,
            Sequence::fade(colors::APPLY).then(Continuation::ShowMenuStep),
        );
    }

    fn signal_error(&mut self, now: u64) {
        let last = self.leds.surface().pixel_count().saturating_sub(1);
        self.render(now, |leds| {
            leds.timed_blink(
                now,
                0..=last,
                colors::RED,
                ERROR_BLINK_MS,
                ERROR_BLINK_TOTAL_MS,
                Some(Continuation::ShowMenuStep),
            )
        });
    }

    fn show_level(&mut self, now: u64, level: u16) {
        if level == 0 {
            if self.leds.phase() != Phase::BlinkFirst {
                warn!("device: no valid sensor reading");
                self.render(now, |leds| leds.fault_blink(now));
            }
        } else {
            self.render(now, |leds| leds.level(level));
        }
    }

    // ── Sensor ──────────────────────────────────────────────────────────

    fn take_reading(&mut self, now: u64, release_power: bool) {
        self.platform.set_sensor_power(true);
        self.level = self.sensor.sample();
        self.adc = self.sensor.last_raw_adc();
        self.timestamp = now;
        if release_power {
            self.platform.set_sensor_power(false);
        }
        trace!("device: level {} adc {}", self.level, self.adc);

        if !self.menu.is_menu_active() {
            self.show_level(now, self.level);
        }
    }

    fn start_calibration(&mut self, now: u64, bound: AdcBound) {
        info!("device: calibrating {} bound", bound);
        self.platform.set_sensor_power(true);
        self.mode = Mode::Calibrating { bound, since: now };
        self.play(now, Sequence::fade(colors::APPLY));
    }

    fn finish_calibration(&mut self, now: u64, bound: AdcBound) {
        self.sensor.sample();
        let adc = self.sensor.last_raw_adc();
        self.adc = adc;
        self.platform.set_sensor_power(false);
        self.sampler.release_power();
        self.mode = Mode::Running;

        let (min, max) = match bound {
            AdcBound::Min => (adc, self.sensor.upper_bound()),
            AdcBound::Max => (self.sensor.lower_bound(), adc),
        };
        if let Err(e) = validate_bounds(min, max) {
            warn!("device: calibration rejected ({}..{}): {}", min, max, e);
            self.signal_error(now);
            return;
        }
        if !self.persist(now, bound_key(bound), adc.into()) {
            return;
        }
        match bound {
            AdcBound::Min => self.sensor.set_lower_bound(adc),
            AdcBound::Max => self.sensor.set_upper_bound(adc),
        }
        info!("device: {} bound set to {}", bound, adc);
        self.play(
            now,
            Sequence::fade(colors::SUCCESS).then(Continuation::ShowMenuStep),
        );
    }

    /// Switch the measurement interval. Returns `false` if it is out of
    /// range or could not be stored.
    ///
    /// A running calibration keeps the step-up powered until its reading.
    fn change_interval(&mut self, now: u64, interval: u32) -> bool {
        if !is_valid_interval(interval) {
            warn!("device: interval {} out of range", interval);
            return false;
        }
        if self.mode == Mode::Running {
            self.platform.set_sensor_power(false);
        }
        self.interval = interval;
        self.menu.set_interval(interval as u8);
        self.sampler.set_period(interval_period_ms(interval));
        info!("device: interval {}", interval);
        self.persist(now, SettingKey::Interval, (interval as i32).into())
    }

    // ── Persistence ─────────────────────────────────────────────────────

    /// Store a setting. A failure is logged and shown on the strip.
    fn persist(&mut self, now: u64, key: SettingKey, value: Value) -> bool {
        match self.store.save(key, value) {
            Ok(()) => true,
            Err(e) => {
                warn!("device: saving {} failed: {}", key.name(), e);
                self.signal_error(now);
                false
            }
        }
    }
}

fn bound_key(bound: AdcBound) -> SettingKey {
    match bound {
        AdcBound::Min => SettingKey::MinAdc,
        AdcBound::Max => SettingKey::MaxAdc,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, Result};
    use crate::led::{FrameBuffer, OFF};
    use crate::sensor::{AdcSource, LoopSensor};
    use crate::settings::SettingsCache;
    use heapless::Deque;

    struct Adc(u16);

    impl AdcSource for Adc {
        fn read(&mut self) -> u16 {
            self.0
        }
    }

    #[derive(Default)]
    struct Board {
        power: bool,
        restarts: u32,
        erased: bool,
    }

    impl Platform for Board {
        fn set_sensor_power(&mut self, on: bool) {
            self.power = on;
        }

        fn restart(&mut self) {
            self.restarts += 1;
        }

        fn erase_network_config(&mut self) {
            self.erased = true;
        }
    }

    #[derive(Default)]
    struct Portal {
        inbound: Deque<PortalEvent, 4>,
        last: Option<PortalStatus>,
        resets: u32,
    }

    impl ConfigPortal for Portal {
        fn publish(&mut self, status: &PortalStatus) {
            self.last = Some(*status);
        }

        fn poll_event(&mut self) -> Option<PortalEvent> {
            self.inbound.pop_front()
        }

        fn reset(&mut self) {
            self.resets += 1;
        }
    }

    /// Flash that refuses every write.
    struct FailingStore;

    impl SettingsStore for FailingStore {
        fn save(&mut self, _key: SettingKey, _value: Value) -> Result<()> {
            Err(Error::Storage)
        }

        fn read(&self, _key: SettingKey) -> Option<Value> {
            None
        }

        fn clear(&mut self, _key: SettingKey) {}

        fn format(&mut self) -> Result<()> {
            Err(Error::Storage)
        }
    }

    type TestDevice<K> = Device<FrameBuffer<8>, LoopSensor<Adc>, K, Portal, Board>;

    fn build<K: SettingsStore>(store: K, adc: u16) -> TestDevice<K> {
        Device::new(
            0,
            Parts {
                surface: FrameBuffer::new(50),
                sensor: LoopSensor::new(Adc(adc)),
                store,
                portal: Portal::default(),
                platform: Board::default(),
            },
        )
    }

    fn store_with(entries: &[(SettingKey, i32)]) -> SettingsCache {
        let mut store = SettingsCache::new();
        for (key, value) in entries {
            store.save(*key, (*value).into()).unwrap();
        }
        store
    }

    /// Open the menu, walk to `register`, enter it and apply it.
    /// Uses one press every 10 ms starting at `start`; returns the time of
    /// the apply press.
    fn apply_register<K: SettingsStore>(d: &mut TestDevice<K>, start: u64, register: u8) -> u64 {
        let mut t = start;
        d.on_button(t, Button::Accept);
        for _ in 1..register {
            t += 10;
            d.on_button(t, Button::Advance);
        }
        t += 10;
        d.on_button(t, Button::Accept);
        t += 10;
        d.on_button(t, Button::Accept);
        t
    }

    fn run<K: SettingsStore>(d: &mut TestDevice<K>, from: u64, to: u64) {
        let mut t = from;
        while t <= to {
            d.tick(t);
            t += 100;
        }
    }

    fn pixels<K: SettingsStore>(d: &mut TestDevice<K>) -> [smart_leds::RGB8; 8] {
        *d.surface_mut().pixels()
    }

    #[test]
    fn boots_with_defaults() {
        let mut d = build(SettingsCache::new(), 576);
        assert_eq!(d.leds().phase(), Phase::FadeUp);
        assert!(d.leds().orientation());
        assert_eq!(d.surface_mut().brightness(), 150);
        assert_eq!(d.interval(), 6);
        assert_eq!(d.menu().current_brightness(), 5);
        assert_eq!(d.portal().last.map(|s| s.max_adc), Some(960));
    }

    #[test]
    fn boots_with_stored_settings() {
        let store = store_with(&[
            (SettingKey::Brightness, 2),
            (SettingKey::Interval, 3),
            (SettingKey::Orientation, 0),
            (SettingKey::MinAdc, 200),
            (SettingKey::MaxAdc, 900),
        ]);
        let mut d = build(store, 576);
        assert_eq!(d.surface_mut().brightness(), 5);
        assert!(!d.leds().orientation());
        assert_eq!(d.menu().current_interval(), 3);
        assert_eq!(d.sensor().lower_bound(), 200);
        assert_eq!(d.sensor().upper_bound(), 900);
    }

    #[test]
    fn opening_menu_draws_mirrored_indicator() {
        let mut d = build(SettingsCache::new(), 576);
        d.on_button(10, Button::Accept);
        assert_eq!(d.menu().current_step(), 1);
        assert_eq!(d.leds().phase(), Phase::Idle);
        let px = pixels(&mut d);
        assert_eq!(px[7], colors::MENU_INDICATOR);
        assert_eq!(px[6], colors::MENU_STEP);
        assert!(px[..6].iter().all(|p| *p == OFF));
    }

    #[test]
    fn brightness_change_is_applied_and_stored() {
        let mut d = build(SettingsCache::new(), 576);
        d.on_button(10, Button::Accept);
        d.on_button(20, Button::Accept);
        assert!(d.menu().is_first_menu_active());
        d.on_button(30, Button::Advance);
        assert_eq!(d.surface_mut().brightness(), 255);
        d.on_button(40, Button::Accept);
        assert_eq!(d.store().read_int(SettingKey::Brightness, 0), 6);
        assert_eq!(d.leds().phase(), Phase::FadeUp);

        run(&mut d, 100, 2_000);
        assert_eq!(d.leds().phase(), Phase::Idle);
        let px = pixels(&mut d);
        assert_eq!(px[7], colors::MENU_INDICATOR);
        assert_eq!(px[6], colors::MENU_STEP);
    }

    #[test]
    fn level_bar_when_menu_closed() {
        let mut d = build(SettingsCache::new(), 576);
        d.tick(1_000);
        let px = pixels(&mut d);
        assert!(px[3..].iter().all(|p| *p == colors::LEVEL_HIGH));
        assert!(px[..3].iter().all(|p| *p == OFF));
        assert_eq!(
            d.portal().last,
            Some(PortalStatus {
                level: 4,
                adc: 576,
                min_adc: 192,
                max_adc: 960,
                interval: 6,
                timestamp: 1_000,
                orientation: true,
            })
        );
    }

    #[test]
    fn zero_level_blinks_without_restarting() {
        let mut d = build(SettingsCache::new(), 100);
        d.tick(1_000);
        assert_eq!(d.leds().phase(), Phase::BlinkFirst);
        assert_eq!(pixels(&mut d)[7], colors::RED);
        d.tick(2_000);
        assert_eq!(d.leds().phase(), Phase::BlinkFirst);
        assert_eq!(pixels(&mut d)[7], OFF);
    }

    #[test]
    fn readings_leave_open_menu_alone() {
        let mut d = build(SettingsCache::new(), 576);
        d.on_button(10, Button::Accept);
        d.tick(1_000);
        assert_eq!(d.status().level, 4);
        assert_eq!(pixels(&mut d)[7], colors::MENU_INDICATOR);
    }

    #[test]
    fn idle_menu_closes_and_blanks() {
        let mut d = build(store_with(&[(SettingKey::Interval, 5)]), 576);
        d.on_button(10, Button::Accept);
        d.tick(8_010);
        assert!(!d.menu().is_menu_active());
        assert_eq!(d.leds().phase(), Phase::Idle);
        assert!(pixels(&mut d).iter().all(|p| *p == OFF));
    }

    #[test]
    fn calibration_holds_power_then_stores_bound() {
        let mut d = build(store_with(&[(SettingKey::Interval, 5)]), 300);
        let at = apply_register(&mut d, 10, 3);
        assert_eq!(d.mode(), Mode::Calibrating { bound: AdcBound::Min, since: at });
        assert!(d.platform().power);

        d.tick(at + 999);
        assert!(matches!(d.mode(), Mode::Calibrating { .. }));

        d.tick(at + 1_000);
        assert_eq!(d.mode(), Mode::Running);
        assert!(!d.platform().power);
        assert_eq!(d.store().read_int(SettingKey::MinAdc, 0), 300);
        assert_eq!(d.sensor().lower_bound(), 300);
        assert_eq!(d.leds().phase(), Phase::FadeUp);
    }

    #[test]
    fn invalid_calibration_is_rejected() {
        let mut d = build(store_with(&[(SettingKey::Interval, 5)]), 1_000);
        let at = apply_register(&mut d, 10, 3);
        d.tick(at + 1_000);
        assert_eq!(d.mode(), Mode::Running);
        assert_eq!(d.leds().phase(), Phase::TimedBlink);
        assert_eq!(d.store().read(SettingKey::MinAdc), None);
        assert_eq!(d.sensor().lower_bound(), 192);
    }

    #[test]
    fn buttons_ignored_while_calibrating() {
        let mut d = build(store_with(&[(SettingKey::Interval, 5)]), 300);
        let at = apply_register(&mut d, 10, 4);
        d.on_button(at + 10, Button::Advance);
        assert_eq!(d.menu().current_step(), 4);
    }

    #[test]
    fn orientation_toggle_is_stored() {
        let mut d = build(SettingsCache::new(), 576);
        apply_register(&mut d, 10, 5);
        assert!(!d.leds().orientation());
        assert_eq!(d.store().read_int(SettingKey::Orientation, 1), 0);
    }

    #[test]
    fn factory_reset_after_shutdown_sequence() {
        let mut d = build(store_with(&[(SettingKey::Brightness, 2)]), 576);
        let at = apply_register(&mut d, 10, 6);
        assert!(pixels(&mut d).iter().all(|p| *p == colors::RED));
        assert_eq!(d.platform().restarts, 0);

        run(&mut d, at + 100, at + 2_000);
        assert!(d.store().is_empty());
        assert!(d.platform().erased);
        assert_eq!(d.portal().resets, 1);
        assert_eq!(d.platform().restarts, 1);
    }

    #[test]
    fn restart_fires_once_when_preempted() {
        let mut d = build(SettingsCache::new(), 576);
        let at = apply_register(&mut d, 10, 7);
        d.on_button(at + 10, Button::Advance);
        assert_eq!(d.platform().restarts, 1);
        run(&mut d, at + 100, at + 3_000);
        assert_eq!(d.platform().restarts, 1);
    }

    #[test]
    fn portal_changes_are_applied() {
        let mut d = build(SettingsCache::new(), 576);
        d.portal_mut().inbound.push_back(PortalEvent::IntervalChanged(3)).unwrap();
        d.portal_mut()
            .inbound
            .push_back(PortalEvent::AdcBoundChanged {
                bound: AdcBound::Max,
                value: 900,
            })
            .unwrap();
        d.portal_mut().inbound.push_back(PortalEvent::OrientationChanged(false)).unwrap();
        d.tick(10);

        assert_eq!(d.interval(), 3);
        assert_eq!(d.menu().current_interval(), 3);
        assert_eq!(d.store().read_int(SettingKey::Interval, 0), 3);
        assert_eq!(d.sensor().upper_bound(), 900);
        assert_eq!(d.store().read_int(SettingKey::MaxAdc, 0), 900);
        assert!(!d.leds().orientation());
        assert_eq!(d.leds().phase(), Phase::FadeUp);
        assert!(!d.platform().power);
    }

    #[test]
    fn interval_change_during_calibration_keeps_power() {
        let mut d = build(store_with(&[(SettingKey::Interval, 5)]), 800);
        let at = apply_register(&mut d, 10, 4);
        d.portal_mut().inbound.push_back(PortalEvent::IntervalChanged(6)).unwrap();
        d.tick(at + 500);
        assert!(d.platform().power);
        assert_eq!(d.interval(), 6);
        assert_eq!(d.store().read_int(SettingKey::Interval, 0), 6);

        d.tick(at + 1_000);
        assert_eq!(d.mode(), Mode::Running);
        assert_eq!(d.sensor().upper_bound(), 800);
        assert_eq!(d.store().read_int(SettingKey::MaxAdc, 0), 800);
    }

    #[test]
    fn out_of_range_interval_is_ignored() {
        let mut d = build(SettingsCache::new(), 576);
        for interval in [0, 7, u32::MAX] {
            d.portal_mut().inbound.push_back(PortalEvent::IntervalChanged(interval)).unwrap();
        }
        d.tick(10);
        assert_eq!(d.interval(), 6);
        assert_eq!(d.status().interval, 6);
        assert_eq!(d.menu().current_interval(), 6);
        assert_eq!(d.store().read(SettingKey::Interval), None);
    }

    #[test]
    fn stored_interval_out_of_range_falls_back_to_default() {
        let d = build(store_with(&[(SettingKey::Interval, 0)]), 576);
        assert_eq!(d.interval(), 6);
        assert_eq!(d.menu().current_interval(), 6);
    }

    #[test]
    fn failed_save_signals_error_and_keeps_bound() {
        let mut d = build(FailingStore, 576);
        d.handle_portal_event(
            10,
            PortalEvent::AdcBoundChanged {
                bound: AdcBound::Max,
                value: 900,
            },
        );
        assert_eq!(d.sensor().upper_bound(), 960);
        assert_eq!(d.leds().phase(), Phase::TimedBlink);
    }
}
