//! Bootloader control over the esp-idf OTA data partition.

use esp_bootloader_esp_idf::{
    ota::{Ota, OtaImageState},
    ota_updater::OtaUpdater,
    partitions::{
        DataPartitionSubType,
        PARTITION_TABLE_MAX_LEN,
        PartitionType,
        read_partition_table,
    },
};
use esp_storage::FlashStorage;
use fleetlink_client::ports::{BootControl, PlatformError};

pub struct BootManager {
    flash: *mut FlashStorage<'static>,
}

// Safety: the update agent task is the sole owner of these flash accesses.
unsafe impl Send for BootManager {}

impl BootManager {
    pub fn new(flash: *mut FlashStorage<'static>) -> Self {
        Self { flash }
    }

    fn with_ota<R>(&self, f: impl FnOnce(Ota<'_, FlashStorage<'static>>) -> R) -> R {
        let flash_ref = unsafe { &mut *self.flash };
        let mut part_buffer = [0u8; PARTITION_TABLE_MAX_LEN];
        let pt = read_partition_table(flash_ref, &mut part_buffer).unwrap();
        let ota_part = pt
            .find_partition(PartitionType::Data(DataPartitionSubType::Ota))
            .unwrap()
            .unwrap();
        let mut ota_part = ota_part.as_embedded_storage(flash_ref);
        let ota = Ota::new(&mut ota_part, 2).unwrap();
        f(ota)
    }

    fn with_updater<R>(
        &self,
        f: impl FnOnce(&mut OtaUpdater<'_, FlashStorage<'static>>) -> R,
    ) -> R {
        let flash_ref = unsafe { &mut *self.flash };
        let mut part_buffer = [0u8; PARTITION_TABLE_MAX_LEN];
        let mut updater = OtaUpdater::new(flash_ref, &mut part_buffer).unwrap();
        f(&mut updater)
    }
}

impl BootControl for BootManager {
    fn is_image_confirmed(&mut self) -> bool {
        // A factory image never went through the test-boot cycle and counts
        // as confirmed.
        self.with_ota(|mut ota| {
            matches!(
                ota.current_ota_state(),
                Ok(OtaImageState::Valid) | Ok(OtaImageState::Undefined)
            )
        })
    }

    fn confirm_image(&mut self) -> Result<(), PlatformError> {
        self.with_ota(|mut ota| {
            ota.set_current_ota_state(OtaImageState::Valid)
                .map_err(|_| PlatformError::Boot)
        })
    }

    fn erase_alternate_slot(&mut self) -> Result<(), PlatformError> {
        self.with_updater(|updater| {
            let (mut partition, _part_type) = updater
                .next_partition()
                .map_err(|_| PlatformError::Boot)?;
            let capacity = partition.capacity() as u32;
            partition
                .erase(0, capacity)
                .map_err(|_| PlatformError::Flash)
        })
    }

    fn alternate_slot_size(&mut self) -> usize {
        self.with_updater(|updater| {
            updater
                .next_partition()
                .map(|(partition, _)| partition.capacity() as usize)
                .unwrap_or(0)
        })
    }

    fn request_upgrade(&mut self) -> Result<(), PlatformError> {
        self.with_updater(|updater| {
            updater
                .activate_next_partition()
                .and_then(|()| updater.set_current_ota_state(OtaImageState::New))
                .map_err(|_| PlatformError::Boot)
        })
    }
}
