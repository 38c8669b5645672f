use embedded_sdmmc::{Error, Mode, SdCard, SdCardError, TimeSource, VolumeIdx, VolumeManager};
use log::{debug, error, info};

use super::{LogStorage, StorageError};

/// FAT-formatted SD card holding the log in the root directory of volume 0.
///
/// The card is blocking (`embedded-sdmmc` has no async API), so each call
/// holds the executor for the duration of the SPI transfer. At one short row
/// every ten seconds that is acceptable.
pub struct SdCardStorage<S, D, T>
where
    S: embedded_hal::spi::SpiDevice<u8>,
    D: embedded_hal::delay::DelayNs,
    T: TimeSource,
{
    volume_mgr: VolumeManager<SdCard<S, D>, T, 4, 4, 1>,
}

impl<S, D, T> SdCardStorage<S, D, T>
where
    S: embedded_hal::spi::SpiDevice<u8>,
    D: embedded_hal::delay::DelayNs,
    T: TimeSource,
{
    pub fn new(sd_card: SdCard<S, D>, ts: T) -> Self {
        let volume_mgr = VolumeManager::new(sd_card, ts);

        Self { volume_mgr }
    }
}

impl<S, D, T> LogStorage for SdCardStorage<S, D, T>
where
    S: embedded_hal::spi::SpiDevice<u8>,
    D: embedded_hal::delay::DelayNs,
    T: TimeSource,
{
    fn mount(&mut self) -> Result<(), StorageError> {
        let volume0 = self
            .volume_mgr
            .open_volume(VolumeIdx(0))
            .map_err(|e| mount_failed(&e))?;
        let root_dir = volume0.open_root_dir().map_err(|e| mount_failed(&e))?;

        root_dir.close().map_err(|e| StorageError::close(&e))?;
        volume0.close().map_err(|e| StorageError::close(&e))?;

        info!("SD card mounted");
        Ok(())
    }

    fn is_empty(&mut self, file_name: &str) -> Result<bool, StorageError> {
        let volume0 = self
            .volume_mgr
            .open_volume(VolumeIdx(0))
            .map_err(|e| StorageError::open(&e))?;
        let root_dir = volume0.open_root_dir().map_err(|e| StorageError::open(&e))?;

        let empty = match root_dir.find_directory_entry(file_name) {
            Ok(entry) => {
                debug!("{} is {} bytes", file_name, entry.size);
                entry.size == 0
            }
            Err(Error::NotFound) => true,
            Err(e) => return Err(StorageError::open(&e)),
        };

        root_dir.close().map_err(|e| StorageError::close(&e))?;
        volume0.close().map_err(|e| StorageError::close(&e))?;

        Ok(empty)
    }

    fn append(
        &mut self,
        file_name: &str,
        data: &[u8],
        on_open: impl FnOnce(),
    ) -> Result<(), StorageError> {
        let volume0 = self
            .volume_mgr
            .open_volume(VolumeIdx(0))
            .map_err(|e| StorageError::open(&e))?;
        let root_dir = volume0.open_root_dir().map_err(|e| StorageError::open(&e))?;
        let file = root_dir
            .open_file_in_dir(file_name, Mode::ReadWriteCreateOrAppend)
            .map_err(|e| StorageError::open(&e))?;

        on_open();
        file.write(data).map_err(|e| {
            error!("Failed to append {} bytes to {}: {:?}", data.len(), file_name, e);
            StorageError::write(&e)
        })?;

        // Handles are also closed on drop, but only an explicit close
        // reports a failed directory entry update.
        file.close().map_err(|e| StorageError::close(&e))?;
        root_dir.close().map_err(|e| StorageError::close(&e))?;
        volume0.close().map_err(|e| StorageError::close(&e))?;

        Ok(())
    }
}

fn mount_failed(e: &Error<SdCardError>) -> StorageError {
    error!("SD card mount failed: {:?}", e);
    StorageError::mount(e)
}
