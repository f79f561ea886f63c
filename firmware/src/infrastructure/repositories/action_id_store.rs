//! Persistent record of the last installed action id.
//!
//! A single 4-byte little-endian record at a fixed offset in the `storage`
//! partition. Erased NOR flash reads back as `0xFFFF_FFFF`, which is exactly
//! the "none" sentinel, so an empty record needs no marker.

use embedded_storage::nor_flash::{NorFlash, ReadNorFlash};
use esp_storage::FlashStorage;
use fleetlink_client::ports::{ActionIdStore, PlatformError};
use fleetlink_ddi::{ACTION_ID_NONE, ActionId};

const BLOCK_SIZE: u32 = 4096;
const RECORD_SIZE: usize = core::mem::size_of::<ActionId>();

pub struct FlashActionIdStore {
    flash: *mut FlashStorage<'static>,
    offset: u32,
}

// Safety: the update agent task is the sole owner of these flash accesses.
// The raw pointer is never used concurrently from multiple tasks.
unsafe impl Send for FlashActionIdStore {}

impl FlashActionIdStore {
    pub fn new(flash: *mut FlashStorage<'static>, offset: u32) -> Self {
        Self { flash, offset }
    }

    fn read(&self) -> Result<ActionId, PlatformError> {
        let mut record = [0u8; RECORD_SIZE];
        // Safety: single-owner assumption, see above.
        unsafe { &mut *self.flash }
            .read(self.offset, &mut record)
            .map_err(|_| PlatformError::Storage)?;
        Ok(ActionId::from_le_bytes(record))
    }
}

impl ActionIdStore for FlashActionIdStore {
    fn load_action_id(&mut self) -> ActionId {
        self.read().unwrap_or(ACTION_ID_NONE)
    }

    fn store_action_id(&mut self, id: ActionId) -> Result<(), PlatformError> {
        // Safety: single-owner assumption, see above.
        let flash = unsafe { &mut *self.flash };
        flash
            .erase(self.offset, self.offset + BLOCK_SIZE)
            .map_err(|_| PlatformError::Storage)?;
        flash
            .write(self.offset, &id.to_le_bytes())
            .map_err(|_| PlatformError::Storage)
    }
}
