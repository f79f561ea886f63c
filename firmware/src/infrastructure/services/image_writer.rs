//! Streaming image writer for the inactive app partition.
//!
//! Flash writes must be word aligned, so a 4-byte tail buffers the remainder
//! of every chunk; sectors are erased lazily ahead of the write cursor since
//! the image size is only known once the response headers arrive.

use embedded_storage::nor_flash::NorFlash;
use esp_bootloader_esp_idf::{
    ota::Ota,
    partitions::{
        AppPartitionSubType,
        DataPartitionSubType,
        PARTITION_TABLE_MAX_LEN,
        PartitionType,
        read_partition_table,
    },
};
use esp_storage::FlashStorage;
use fleetlink_client::ports::{ImageSink, PlatformError};

const ALIGN: usize = 4;
const ERASE_SECTOR: u32 = 4096;

pub struct FlashImageWriter {
    flash: *mut FlashStorage<'static>,
    slot_offset: u32,
    slot_size: u32,
    received: usize,
    written: u32,
    erased: u32,
    tail: [u8; ALIGN],
    tail_len: usize,
}

// Safety: the update agent task is the sole owner of these flash accesses.
unsafe impl Send for FlashImageWriter {}

impl FlashImageWriter {
    pub fn new(flash: *mut FlashStorage<'static>) -> Self {
        Self {
            flash,
            slot_offset: 0,
            slot_size: 0,
            received: 0,
            written: 0,
            erased: 0,
            tail: [0xFF; ALIGN],
            tail_len: 0,
        }
    }

    /// Locate the app partition the bootloader would pick for the next
    /// image.
    fn locate_slot(&self) -> Result<(u32, u32), PlatformError> {
        let flash_ref = unsafe { &mut *self.flash };
        let mut part_buffer = [0u8; PARTITION_TABLE_MAX_LEN];
        let pt = read_partition_table(flash_ref, &mut part_buffer)
            .map_err(|_| PlatformError::Boot)?;

        let ota_part = pt
            .find_partition(PartitionType::Data(DataPartitionSubType::Ota))
            .map_err(|_| PlatformError::Boot)?
            .ok_or(PlatformError::Boot)?;
        let mut ota_region = ota_part.as_embedded_storage(flash_ref);
        let mut ota = Ota::new(&mut ota_region, 2).map_err(|_| PlatformError::Boot)?;
        let current = ota
            .current_app_partition()
            .map_err(|_| PlatformError::Boot)?;
        let next = match current {
            AppPartitionSubType::Ota0 => AppPartitionSubType::Ota1,
            _ => AppPartitionSubType::Ota0,
        };

        let entry = pt
            .find_partition(PartitionType::App(next))
            .map_err(|_| PlatformError::Boot)?
            .ok_or(PlatformError::Boot)?;
        Ok((entry.offset(), entry.size()))
    }
}

impl ImageSink for FlashImageWriter {
    fn begin_image(&mut self) -> Result<(), PlatformError> {
        let (offset, size) = self.locate_slot()?;
        self.slot_offset = offset;
        self.slot_size = size;
        self.received = 0;
        self.written = 0;
        self.erased = 0;
        self.tail = [0xFF; ALIGN];
        self.tail_len = 0;
        Ok(())
    }

    fn append_image(&mut self, chunk: &[u8], last: bool) -> Result<(), PlatformError> {
        if chunk.is_empty() && !last {
            return Ok(());
        }

        let mut required = self.written as usize + self.tail_len + chunk.len();
        if last {
            // The final flush pads the tail to a full word.
            required = (required + ALIGN - 1) & !(ALIGN - 1);
        }
        if required > self.slot_size as usize {
            return Err(PlatformError::Flash);
        }

        // Safety: single-owner assumption, see above.
        let flash = unsafe { &mut *self.flash };

        // Erase sectors ahead of the write cursor.
        while (self.erased as usize) < required {
            let start = self.slot_offset + self.erased;
            flash
                .erase(start, start + ERASE_SECTOR)
                .map_err(|_| PlatformError::Flash)?;
            self.erased += ERASE_SECTOR;
        }

        write_aligned_data(
            flash,
            self.slot_offset,
            chunk,
            &mut self.written,
            &mut self.tail,
            &mut self.tail_len,
        )?;
        self.received += chunk.len();

        if last && self.tail_len > 0 {
            flash
                .write(self.slot_offset + self.written, &self.tail)
                .map_err(|_| PlatformError::Flash)?;
            self.written += ALIGN as u32;
            self.tail_len = 0;
        }

        Ok(())
    }

    fn image_bytes_written(&self) -> usize {
        self.received
    }
}

#[allow(clippy::cast_possible_truncation)]
fn write_aligned_data(
    flash: &mut FlashStorage<'static>,
    base: u32,
    data: &[u8],
    written: &mut u32,
    tail: &mut [u8; ALIGN],
    tail_len: &mut usize,
) -> Result<(), PlatformError> {
    let mut idx = 0;

    // Complete partial word
    if *tail_len > 0 {
        let need = ALIGN - *tail_len;
        let take = need.min(data.len());
        tail[*tail_len..*tail_len + take].copy_from_slice(&data[..take]);
        *tail_len += take;
        idx += take;

        if *tail_len == ALIGN {
            flash
                .write(base + *written, tail)
                .map_err(|_| PlatformError::Flash)?;
            *written += ALIGN as u32;
            *tail_len = 0;
            tail.fill(0xFF);
        }
    }

    // Write aligned bulk
    let rem = &data[idx..];
    let aligned_len = rem.len() & !(ALIGN - 1);
    if aligned_len > 0 {
        flash
            .write(base + *written, &rem[..aligned_len])
            .map_err(|_| PlatformError::Flash)?;
        *written += aligned_len as u32;
    }

    // Keep trailing bytes
    let tail_bytes = &rem[aligned_len..];
    if !tail_bytes.is_empty() {
        tail[..tail_bytes.len()].copy_from_slice(tail_bytes);
        *tail_len = tail_bytes.len();
    }

    Ok(())
}
