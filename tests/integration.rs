//! Integration tests for loopgauge host-testable logic.
//!
//! Drive a complete [`Device`] with in-memory collaborators, the way the
//! firmware's control loop does.

use heapless::Deque;
use loopgauge::animation::Phase;
use loopgauge::led::{colors, FrameBuffer, OFF};
use loopgauge::portal::{AdcBound, ConfigPortal, PortalEvent, PortalStatus};
use loopgauge::sensor::{AdcSource, LoopSensor, Sensor};
use loopgauge::settings::{SettingKey, SettingsCache, SettingsStore, MAX_RECORD_SIZE};
use loopgauge::ui::Button;
use loopgauge::{Device, Mode, Parts, Platform};
use smart_leds::RGB8;

struct Adc(u16);

impl AdcSource for Adc {
    fn read(&mut self) -> u16 {
        self.0
    }
}

#[derive(Default)]
struct Board {
    power: bool,
}

impl Platform for Board {
    fn set_sensor_power(&mut self, on: bool) {
        self.power = on;
    }

    fn restart(&mut self) {}

    fn erase_network_config(&mut self) {}
}

#[derive(Default)]
struct Portal {
    inbound: Deque<PortalEvent, 4>,
    published: u32,
    last: Option<PortalStatus>,
}

impl ConfigPortal for Portal {
    fn publish(&mut self, status: &PortalStatus) {
        self.published += 1;
        self.last = Some(*status);
    }

    fn poll_event(&mut self) -> Option<PortalEvent> {
        self.inbound.pop_front()
    }

    fn reset(&mut self) {}
}

type Gauge = Device<FrameBuffer<8>, LoopSensor<Adc>, SettingsCache, Portal, Board>;

fn gauge(store: SettingsCache, adc: u16) -> Gauge {
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

fn unmirrored() -> SettingsCache {
    let mut store = SettingsCache::new();
    store.save(SettingKey::Orientation, false.into()).unwrap();
    store
}

fn pixels(g: &mut Gauge) -> [RGB8; 8] {
    *g.surface_mut().pixels()
}

fn lit(g: &mut Gauge) -> usize {
    pixels(g).iter().filter(|p| **p != OFF).count()
}

fn run(g: &mut Gauge, from: u64, to: u64) {
    let mut t = from;
    while t <= to {
        g.tick(t);
        t += 100;
    }
}

#[test]
fn advancing_cycles_all_registers() {
    let mut g = gauge(unmirrored(), 576);
    g.on_button(10, Button::Accept);
    for expected in [2, 3, 4, 5, 6, 7, 1, 2] {
        g.on_button(20, Button::Advance);
        assert_eq!(g.menu().current_step(), expected);
        // Marker plus one pixel per register.
        assert_eq!(lit(&mut g), 1 + expected as usize);
    }
}

#[test]
fn unmirrored_strip_draws_from_pixel_zero() {
    let mut g = gauge(unmirrored(), 576);
    g.on_button(10, Button::Accept);
    let px = pixels(&mut g);
    assert_eq!(px[0], colors::MENU_INDICATOR);
    assert_eq!(px[1], colors::MENU_STEP);
    assert_eq!(px[7], OFF);
}

#[test]
fn interval_menu_changes_sampling() {
    let mut g = gauge(unmirrored(), 576);
    g.on_button(10, Button::Accept);
    g.on_button(20, Button::Advance);
    g.on_button(30, Button::Accept);
    assert!(g.menu().is_second_menu_active());
    // Value indicator: two markers plus the interval.
    assert_eq!(lit(&mut g), 2 + 6);

    g.on_button(40, Button::Advance);
    assert_eq!(g.menu().current_interval(), 1);
    g.on_button(50, Button::Accept);
    assert!(!g.menu().is_second_menu_active());
    assert_eq!(g.interval(), 1);
    assert_eq!(g.store().read_int(SettingKey::Interval, 0), 1);

    // Four-hour period: no reading for a while.
    run(&mut g, 100, 5_000);
    assert_eq!(g.status().timestamp, 0);
    assert!(!g.platform().power);
}

#[test]
fn entered_register_falls_back_after_timeout() {
    let mut g = gauge(unmirrored(), 576);
    g.on_button(10, Button::Accept);
    g.on_button(20, Button::Advance);
    g.on_button(30, Button::Advance);
    g.on_button(40, Button::Accept);
    assert_eq!(g.leds().phase(), Phase::MenuActive);
    assert_eq!(g.menu().selected_step(), 3);

    g.tick(20_039);
    assert_eq!(g.menu().selected_step(), 3);
    g.tick(20_040);
    assert_eq!(g.menu().selected_step(), 0);
    assert!(g.menu().is_menu_active());
    assert_eq!(g.menu().current_step(), 3);
    assert_eq!(g.leds().phase(), Phase::Idle);
    assert_eq!(lit(&mut g), 4);
}

#[test]
fn max_calibration_rescales_readings() {
    let mut g = gauge(unmirrored(), 800);
    g.on_button(10, Button::Accept);
    for t in [20, 30, 40] {
        g.on_button(t, Button::Advance);
    }
    assert_eq!(g.menu().current_step(), 4);
    g.on_button(50, Button::Accept);
    g.on_button(60, Button::Accept);
    assert_eq!(
        g.mode(),
        Mode::Calibrating {
            bound: AdcBound::Max,
            since: 60
        }
    );

    run(&mut g, 100, 1_100);
    assert_eq!(g.mode(), Mode::Running);
    assert_eq!(g.sensor().upper_bound(), 800);
    assert_eq!(g.store().read_int(SettingKey::MaxAdc, 0), 800);

    // The success fade ends at 2_700 and redraws the menu, which then
    // closes 8 s later; the next reading fills the strip.
    run(&mut g, 1_200, 11_700);
    assert!(!g.menu().is_menu_active());
    assert_eq!(g.status().level, 8);
    assert!(pixels(&mut g).iter().all(|p| *p == colors::LEVEL_HIGH));
}

#[test]
fn level_bands_follow_the_reading() {
    let mut g = gauge(unmirrored(), 0);
    let cases: [(u16, u16, RGB8); 4] = [
        (192, 0, colors::RED),
        (300, 1, colors::LEVEL_LOW),
        (400, 2, colors::LEVEL_MID),
        (600, 4, colors::LEVEL_HIGH),
    ];
    let mut t = 1_000;
    for (adc, level, color) in cases {
        g.sensor_mut().adc_mut().0 = adc;
        g.tick(t);
        assert_eq!(g.status().level, level);
        assert_eq!(pixels(&mut g)[0], color);
        t += 1_000;
    }
}

#[test]
fn settings_survive_a_reboot() {
    let mut g = gauge(SettingsCache::new(), 576);
    g.on_button(10, Button::Accept);
    g.on_button(20, Button::Accept);
    g.on_button(30, Button::Advance);
    g.on_button(40, Button::Accept);
    g.portal_mut()
        .inbound
        .push_back(PortalEvent::AdcBoundChanged {
            bound: AdcBound::Min,
            value: 210,
        })
        .unwrap();
    g.tick(50);
    assert!(g.store().is_dirty());

    let mut record = [0u8; MAX_RECORD_SIZE];
    let len = g.store().serialize(&mut record).unwrap();
    let restored = SettingsCache::deserialize(&record[..len]).unwrap();

    let mut rebooted = gauge(restored, 576);
    assert_eq!(rebooted.menu().current_brightness(), 6);
    assert_eq!(rebooted.surface_mut().brightness(), 255);
    assert_eq!(rebooted.sensor().lower_bound(), 210);
}

#[test]
fn status_is_published_every_tick() {
    let mut g = gauge(SettingsCache::new(), 576);
    let before = g.portal().published;
    run(&mut g, 100, 1_000);
    assert_eq!(g.portal().published, before + 10);
    let status = g.portal().last.unwrap();
    assert_eq!(status.level, 4);
    assert_eq!(status.timestamp, 1_000);
    assert!(status.orientation);
}
