//! The device platform handed to the update client: bootloader control,
//! image staging, persistent action id, and identity.

use core::fmt::Write as _;

use esp_storage::FlashStorage;
use fleetlink_client::ports::{
    ActionIdStore,
    BootControl,
    DeviceIdentity,
    DevicePlatform,
    ImageSink,
    PlatformError,
};
use fleetlink_ddi::ActionId;
use heapless::String;

use crate::config;
use crate::infrastructure::repositories::{BootManager, FlashActionIdStore};
use crate::infrastructure::services::FlashImageWriter;

pub struct EspPlatform {
    boot: BootManager,
    writer: FlashImageWriter,
    store: FlashActionIdStore,
}

impl EspPlatform {
    pub fn new(flash: *mut FlashStorage<'static>) -> Self {
        Self {
            boot: BootManager::new(flash),
            writer: FlashImageWriter::new(flash),
            store: FlashActionIdStore::new(flash, config::STORAGE.action_id_offset),
        }
    }
}

impl BootControl for EspPlatform {
    fn is_image_confirmed(&mut self) -> bool {
        self.boot.is_image_confirmed()
    }

    fn confirm_image(&mut self) -> Result<(), PlatformError> {
        self.boot.confirm_image()
    }

    fn erase_alternate_slot(&mut self) -> Result<(), PlatformError> {
        self.boot.erase_alternate_slot()
    }

    fn alternate_slot_size(&mut self) -> usize {
        self.boot.alternate_slot_size()
    }

    fn request_upgrade(&mut self) -> Result<(), PlatformError> {
        self.boot.request_upgrade()
    }
}

impl ImageSink for EspPlatform {
    fn begin_image(&mut self) -> Result<(), PlatformError> {
        self.writer.begin_image()
    }

    fn append_image(&mut self, chunk: &[u8], last: bool) -> Result<(), PlatformError> {
        self.writer.append_image(chunk, last)
    }

    fn image_bytes_written(&self) -> usize {
        self.writer.image_bytes_written()
    }
}

impl ActionIdStore for EspPlatform {
    fn load_action_id(&mut self) -> ActionId {
        self.store.load_action_id()
    }

    fn store_action_id(&mut self, id: ActionId) -> Result<(), PlatformError> {
        self.store.store_action_id(id)
    }
}

impl DeviceIdentity for EspPlatform {
    fn device_id(&self) -> Option<String<32>> {
        let mut id = String::new();
        write!(id, "{:08x}", config::hardware_id()).ok()?;
        Some(id)
    }

    fn firmware_version(&self) -> Option<String<32>> {
        String::try_from(config::FIRMWARE.version).ok()
    }
}

impl DevicePlatform for EspPlatform {}
