//! Persistent device settings.
//!
//! The coordinator talks to a [`SettingsStore`]; the state machines never
//! see it. [`SettingsCache`] is the in-RAM store used on the device: it
//! tracks a dirty flag and packs itself into one flash record, which the
//! embedded `storage` module writes with `sequential-storage`.
//!
//! Record layout:
//! ```text
//! [count]
//! repeated: [key id][tag] tag 0: [i32 LE ×4]   tag 1: [len][utf-8 bytes...]
//! ```

use heapless::{LinearMap, String};

use crate::config::{DEFAULT_BRIGHTNESS, DEFAULT_INTERVAL, DEFAULT_ORIENTATION, STORAGE_RETRY_MS};
use crate::error::{Error, Result};

/// Longest text value that can be stored.
pub const MAX_TEXT_LEN: usize = 32;

/// Largest serialized record: every key holding a full-length text.
pub const MAX_RECORD_SIZE: usize = 1 + SettingKey::ALL.len() * (2 + 1 + MAX_TEXT_LEN);

/// Keys of the persisted settings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SettingKey {
    Brightness,
    Interval,
    Orientation,
    MinAdc,
    MaxAdc,
}

impl SettingKey {
    pub const ALL: [SettingKey; 5] = [
        SettingKey::Brightness,
        SettingKey::Interval,
        SettingKey::Orientation,
        SettingKey::MinAdc,
        SettingKey::MaxAdc,
    ];

    /// Name shown to the configuration service.
    pub fn name(self) -> &'static str {
        match self {
            SettingKey::Brightness => "brightness",
            SettingKey::Interval => "interval",
            SettingKey::Orientation => "upsideDown",
            SettingKey::MinAdc => "minAdcValue",
            SettingKey::MaxAdc => "maxAdcValue",
        }
    }

    fn id(self) -> u8 {
        match self {
            SettingKey::Brightness => 1,
            SettingKey::Interval => 2,
            SettingKey::Orientation => 3,
            SettingKey::MinAdc => 4,
            SettingKey::MaxAdc => 5,
        }
    }

    fn from_id(id: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.id() == id)
    }
}

/// A stored value.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Value {
    Int(i32),
    Text(String<MAX_TEXT_LEN>),
}

impl Value {
    pub fn text(s: &str) -> Result<Self> {
        let mut text = String::new();
        text.push_str(s).map_err(|_| Error::BufferOverflow)?;
        Ok(Value::Text(text))
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Int(v as i32)
    }
}

/// Key-value persistence used by the coordinator.
pub trait SettingsStore {
    fn save(&mut self, key: SettingKey, value: Value) -> Result<()>;

    fn read(&self, key: SettingKey) -> Option<Value>;

    /// Forget one key.
    fn clear(&mut self, key: SettingKey);

    /// Forget everything.
    fn format(&mut self) -> Result<()>;

    /// Integer value of `key`; text values are parsed. Falls back to
    /// `default` when missing or unparsable.
    fn read_int(&self, key: SettingKey, default: i32) -> i32 {
        match self.read(key) {
            Some(Value::Int(v)) => v,
            Some(Value::Text(t)) => t.trim().parse().unwrap_or(default),
            None => default,
        }
    }

    /// Text value of `key`; integers are rendered in decimal.
    fn read_text(&self, key: SettingKey, default: &str) -> String<MAX_TEXT_LEN> {
        use core::fmt::Write;

        let mut out = String::new();
        match self.read(key) {
            Some(Value::Text(t)) => out = t,
            Some(Value::Int(v)) => {
                let _ = write!(out, "{}", v);
            }
            None => {
                for c in default.chars() {
                    if out.push(c).is_err() {
                        break;
                    }
                }
            }
        }
        out
    }
}

/// In-RAM settings store with a dirty flag and a flash codec.
#[derive(Clone, Debug, Default)]
pub struct SettingsCache {
    values: LinearMap<SettingKey, Value, 5>,
    dirty: bool,
}

impl SettingsCache {
    pub const fn new() -> Self {
        Self {
            values: LinearMap::new(),
            dirty: false,
        }
    }

    /// True when the cache differs from what was last persisted.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_clean(&mut self) {
        self.dirty = false;
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Pack all values into `buf`, returning the number of bytes used.
    pub fn serialize(&self, buf: &mut [u8]) -> Result<usize> {
        let mut w = Writer { buf, pos: 0 };
        w.put(&[self.values.len() as u8])?;
        for (key, value) in self.values.iter() {
            match value {
                Value::Int(v) => {
                    w.put(&[key.id(), 0])?;
                    w.put(&v.to_le_bytes())?;
                }
                Value::Text(t) => {
                    w.put(&[key.id(), 1, t.len() as u8])?;
                    w.put(t.as_bytes())?;
                }
            }
        }
        Ok(w.pos)
    }

    /// Rebuild a cache from a record written by [`serialize`](Self::serialize).
    /// Unknown key ids are skipped so newer firmware can add keys.
    pub fn deserialize(data: &[u8]) -> Result<Self> {
        let mut cache = Self::new();
        let Some((&count, mut rest)) = data.split_first() else {
            return Ok(cache);
        };

        for _ in 0..count {
            let [id, tag, tail @ ..] = rest else {
                return Err(Error::Corrupt);
            };
            let value = match tag {
                0 => {
                    let (bytes, tail) = split(tail, 4)?;
                    rest = tail;
                    let mut raw = [0u8; 4];
                    raw.copy_from_slice(bytes);
                    Value::Int(i32::from_le_bytes(raw))
                }
                1 => {
                    let (&len, tail) = tail.split_first().ok_or(Error::Corrupt)?;
                    let (bytes, tail) = split(tail, len as usize)?;
                    rest = tail;
                    let s = core::str::from_utf8(bytes).map_err(|_| Error::Corrupt)?;
                    Value::text(s).map_err(|_| Error::Corrupt)?
                }
                _ => return Err(Error::Corrupt),
            };
            if let Some(key) = SettingKey::from_id(*id) {
                cache.values.insert(key, value).map_err(|_| Error::StorageFull)?;
            }
        }
        Ok(cache)
    }
}

impl SettingsStore for SettingsCache {
    fn save(&mut self, key: SettingKey, value: Value) -> Result<()> {
        if self.values.get(&key) == Some(&value) {
            return Ok(());
        }
        self.values.insert(key, value).map_err(|_| Error::StorageFull)?;
        self.dirty = true;
        debug!("settings: {} updated", key.name());
        Ok(())
    }

    fn read(&self, key: SettingKey) -> Option<Value> {
        self.values.get(&key).cloned()
    }

    fn clear(&mut self, key: SettingKey) {
        if self.values.remove(&key).is_some() {
            self.dirty = true;
        } else {
            debug!("settings: {} not stored", key.name());
        }
    }

    fn format(&mut self) -> Result<()> {
        self.values.clear();
        self.dirty = true;
        Ok(())
    }
}

struct Writer<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl Writer<'_> {
    fn put(&mut self, bytes: &[u8]) -> Result<()> {
        let end = self.pos + bytes.len();
        let dst = self.buf.get_mut(self.pos..end).ok_or(Error::BufferOverflow)?;
        dst.copy_from_slice(bytes);
        self.pos = end;
        Ok(())
    }
}

fn split(data: &[u8], n: usize) -> Result<(&[u8], &[u8])> {
    if data.len() < n {
        return Err(Error::Corrupt);
    }
    Ok(data.split_at(n))
}

/// Paces flash writes of a dirty cache: after a failed write the next
/// attempt waits [`STORAGE_RETRY_MS`].
#[derive(Clone, Copy, Debug, Default)]
pub struct SaveBackoff {
    retry_at: u64,
}

impl SaveBackoff {
    pub const fn new() -> Self {
        Self { retry_at: 0 }
    }

    /// A write may be attempted at `now`.
    pub fn is_due(&self, now: u64) -> bool {
        now >= self.retry_at
    }

    pub fn failed(&mut self, now: u64) {
        self.retry_at = now.saturating_add(STORAGE_RETRY_MS);
    }

    pub fn succeeded(&mut self) {
        self.retry_at = 0;
    }
}

/// Settings applied at start-up.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Settings {
    /// Menu brightness level, 1..=6.
    pub brightness: u8,
    /// Measurement interval index, 1..=6.
    pub interval: u8,
    /// Strip mirrored.
    pub orientation: bool,
    /// Calibrated 4 mA ADC code, `0` when never calibrated.
    pub min_adc: i32,
    /// Calibrated 20 mA ADC code, `0` when never calibrated.
    pub max_adc: i32,
}

impl Settings {
    pub fn load(store: &impl SettingsStore) -> Self {
        Self {
            brightness: read_u8(store, SettingKey::Brightness, DEFAULT_BRIGHTNESS),
            interval: read_u8(store, SettingKey::Interval, DEFAULT_INTERVAL),
            orientation: store.read_int(SettingKey::Orientation, DEFAULT_ORIENTATION as i32) != 0,
            min_adc: store.read_int(SettingKey::MinAdc, 0),
            max_adc: store.read_int(SettingKey::MaxAdc, 0),
        }
    }
}

fn read_u8(store: &impl SettingsStore, key: SettingKey, default: u8) -> u8 {
    u8::try_from(store.read_int(key, default as i32)).unwrap_or(default)
}
