//! # Boot Medium
//!
//! Finds the medium the loader was started from among the Block I/O
//! handles and reads it in ISO 9660 blocks.

use boot_iso9660::{BLOCK_SIZE, BlockDevice, DeviceError, Iso9660};
use boot_pipeline::BootError;
use log::{debug, info, warn};
use uefi::boot::{self, OpenProtocolAttributes, OpenProtocolParams, ScopedProtocol, SearchType};
use uefi::proto::media::block::BlockIO;
use uefi::{Handle, Identify};

/// Signature the loader's own MBR carries at byte offset 2.
const MBR_SIGNATURE: [u8; 2] = *b"MP";

/// Largest media block size we can probe block 0 of.
const MAX_MEDIA_BLOCK: usize = 4096;

/// A Block I/O medium read in [`BLOCK_SIZE`] units.
pub struct UefiBlockDevice {
    io: ScopedProtocol<BlockIO>,
    media_id: u32,
    block_size: usize,
    /// Media blocks per ISO 9660 block.
    ratio: u64,
}

impl UefiBlockDevice {
    /// Open `handle` if it has media whose block size divides [`BLOCK_SIZE`].
    fn open(handle: Handle) -> Option<Self> {
        // SAFETY: the protocol is only used through this value, which is
        // dropped before boot services are exited.
        let io = unsafe {
            boot::open_protocol::<BlockIO>(
                OpenProtocolParams {
                    handle,
                    agent: boot::image_handle(),
                    controller: None,
                },
                OpenProtocolAttributes::GetProtocol,
            )
        }
        .ok()?;

        let media = io.media();
        let block_size = usize::try_from(media.block_size()).ok()?;
        if !media.is_media_present()
            || block_size == 0
            || block_size > BLOCK_SIZE
            || BLOCK_SIZE % block_size != 0
        {
            return None;
        }

        let media_id = media.media_id();
        let ratio = u64::try_from(BLOCK_SIZE / block_size).ok()?;
        Some(Self {
            io,
            media_id,
            block_size,
            ratio,
        })
    }

    fn has_loader_mbr(&self) -> bool {
        let mut block = [0u8; MAX_MEDIA_BLOCK];
        let block = &mut block[..self.block_size];
        match self.io.read_blocks(self.media_id, 0, block) {
            Ok(()) => block[2..4] == MBR_SIGNATURE,
            Err(e) => {
                debug!("Unable to read block 0: {:?}", e.status());
                false
            }
        }
    }
}

impl BlockDevice for UefiBlockDevice {
    fn read_blocks(&mut self, start_block: u32, buf: &mut [u8]) -> Result<(), DeviceError> {
        if buf.len() % BLOCK_SIZE != 0 {
            return Err(DeviceError::UnalignedBuffer(buf.len()));
        }

        let lba = u64::from(start_block) * self.ratio;
        self.io
            .read_blocks(self.media_id, lba, buf)
            .map_err(|e| {
                warn!("ReadBlocks at LBA {lba} failed: {:?}", e.status());
                DeviceError::Io { block: start_block }
            })
    }
}

/// The Block I/O medium carrying the loader's MBR, or else the first one
/// that mounts as ISO 9660.
///
/// # Errors
/// [`BootError::ReadError`] if no medium qualifies.
pub fn find_boot_device() -> Result<UefiBlockDevice, BootError> {
    let handles = boot::locate_handle_buffer(SearchType::ByProtocol(&BlockIO::GUID))
        .map_err(|e| {
            warn!("No Block I/O handles: {:?}", e.status());
            BootError::ReadError
        })?;

    let mut fallback = None;
    for &handle in handles.iter() {
        let Some(device) = UefiBlockDevice::open(handle) else {
            continue;
        };

        if device.has_loader_mbr() {
            info!("Boot medium: loader MBR found ({} byte blocks)", device.block_size);
            return Ok(device);
        }

        if fallback.is_none() {
            match Iso9660::mount(device) {
                Ok(fs) => fallback = Some(fs.into_device()),
                Err(e) => debug!("Not an ISO 9660 medium: {e}"),
            }
        }
    }

    let device = fallback.ok_or(BootError::ReadError)?;
    info!("Boot medium: first ISO 9660 volume ({} byte blocks)", device.block_size);
    Ok(device)
}
