//! Persistent storage for the settings record.
//!
//! Uses the nRF52840's internal flash via `sequential-storage` crate.
//! The whole [`SettingsCache`] is packed into one map item; the flash
//! pages are managed by `sequential-storage` which handles wear levelling
//! and GC.

use defmt::{debug, error, info};
use embedded_storage_async::nor_flash::NorFlash;
use loopgauge::config::{STORAGE_FLASH_PAGE_COUNT, STORAGE_FLASH_PAGE_START};
use loopgauge::settings::{SettingsCache, MAX_RECORD_SIZE};
use loopgauge::Error;

/// Flash page size for nRF52840 (4 KB).
const FLASH_PAGE_SIZE: u32 = 4096;

/// Start address of our storage region.
const STORAGE_START: u32 = STORAGE_FLASH_PAGE_START * FLASH_PAGE_SIZE;

/// End address (exclusive) of our storage region.
const STORAGE_END: u32 = (STORAGE_FLASH_PAGE_START + STORAGE_FLASH_PAGE_COUNT) * FLASH_PAGE_SIZE;

/// Key of the settings record in the map storage.
const KEY_SETTINGS: u8 = 0x01;

/// Scratch buffer: record plus `sequential-storage` item header.
const BUF_SIZE: usize = MAX_RECORD_SIZE + 32;

/// Load the settings record. A missing or unreadable record yields an
/// empty cache, so defaults apply.
pub async fn load(flash: &mut impl NorFlash) -> SettingsCache {
    let mut buf = [0u8; BUF_SIZE];

    match sequential_storage::map::fetch_item::<u8, &[u8], _>(
        flash,
        STORAGE_START..STORAGE_END,
        &mut sequential_storage::cache::NoCache::new(),
        &mut buf,
        &KEY_SETTINGS,
    )
    .await
    {
        Ok(Some(data)) => match SettingsCache::deserialize(data) {
            Ok(cache) => {
                info!("Loaded {} settings from flash", cache.len());
                cache
            }
            Err(e) => {
                error!("Settings record unreadable: {}", e);
                SettingsCache::new()
            }
        },
        Ok(None) => {
            info!("No settings in flash");
            SettingsCache::new()
        }
        Err(e) => {
            error!("Flash read error: {:?}", defmt::Debug2Format(&e));
            SettingsCache::new()
        }
    }
}

/// Persist the cache if it changed since the last save.
pub async fn save(cache: &mut SettingsCache, flash: &mut impl NorFlash) -> Result<(), Error> {
    if !cache.is_dirty() {
        debug!("Settings: no changes to save");
        return Ok(());
    }

    let mut buf = [0u8; BUF_SIZE];
    let mut data_buf = [0u8; MAX_RECORD_SIZE];

    let len = cache.serialize(&mut data_buf)?;
    let item = &data_buf[..len];

    match sequential_storage::map::store_item::<u8, &[u8], _>(
        flash,
        STORAGE_START..STORAGE_END,
        &mut sequential_storage::cache::NoCache::new(),
        &mut buf,
        &KEY_SETTINGS,
        &item,
    )
    .await
    {
        Ok(_) => {
            info!("Saved {} settings to flash", cache.len());
            cache.mark_clean();
            Ok(())
        }
        Err(e) => {
            error!("Flash write error: {:?}", defmt::Debug2Format(&e));
            Err(Error::Storage)
        }
    }
}
