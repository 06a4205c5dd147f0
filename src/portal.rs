//! Configuration service boundary.
//!
//! A configuration page (captive portal, BLE service, serial console...)
//! can change the interval, the ADC calibration and the strip orientation,
//! and shows the latest reading. The device only sees it through
//! [`ConfigPortal`]: a status snapshot is published every tick and
//! inbound changes are polled as [`PortalEvent`]s.

/// Which calibration bound an inbound change targets.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AdcBound {
    /// 4 mA code.
    Min,
    /// 20 mA code.
    Max,
}

impl AdcBound {
    /// Parse the wire tag (`"min"` / `"max"`).
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "min" => Some(AdcBound::Min),
            "max" => Some(AdcBound::Max),
            _ => None,
        }
    }

    pub fn tag(self) -> &'static str {
        match self {
            AdcBound::Min => "min",
            AdcBound::Max => "max",
        }
    }
}

/// Changes requested by the configuration service.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PortalEvent {
    IntervalChanged(u32),
    AdcBoundChanged { bound: AdcBound, value: i32 },
    OrientationChanged(bool),
}

/// Snapshot shown by the configuration service.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PortalStatus {
    pub level: u16,
    pub adc: i32,
    pub min_adc: i32,
    pub max_adc: i32,
    pub interval: u32,
    /// Time of the last reading, ms since boot.
    pub timestamp: u64,
    pub orientation: bool,
}

pub trait ConfigPortal {
    /// Push the current status.
    fn publish(&mut self, status: &PortalStatus);

    /// Next pending inbound change, if any.
    fn poll_event(&mut self) -> Option<PortalEvent>;

    /// Drop stored credentials and return to first-boot state.
    fn reset(&mut self);
}

/// Portal for boards without a configuration service.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoPortal;

impl ConfigPortal for NoPortal {
    fn publish(&mut self, _status: &PortalStatus) {}

    fn poll_event(&mut self) -> Option<PortalEvent> {
        None
    }

    fn reset(&mut self) {}
}
