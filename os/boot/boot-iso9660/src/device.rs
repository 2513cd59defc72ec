//! # Block Devices

/// Logical block size of the filesystem. Firmware shims translate to their
/// native sector size.
pub const BLOCK_SIZE: usize = 2048;

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum DeviceError {
    #[error("The firmware failed to read block {block}")]
    Io { block: u32 },
    #[error("Block {block} is beyond the end of the device")]
    OutOfRange { block: u32 },
    #[error("A buffer of {0} bytes is not a whole number of blocks")]
    UnalignedBuffer(usize),
}

/// Read access to the boot medium in [`BLOCK_SIZE`] units.
pub trait BlockDevice {
    /// Fill `buf` with `buf.len() / BLOCK_SIZE` consecutive blocks starting
    /// at `start_block`.
    ///
    /// # Errors
    /// Any firmware failure; the buffer content is unspecified afterwards.
    fn read_blocks(&mut self, start_block: u32, buf: &mut [u8]) -> Result<(), DeviceError>;
}

impl<D: BlockDevice + ?Sized> BlockDevice for &mut D {
    fn read_blocks(&mut self, start_block: u32, buf: &mut [u8]) -> Result<(), DeviceError> {
        (**self).read_blocks(start_block, buf)
    }
}

/// A disc image that is already in memory, such as a RAM disk.
#[derive(Debug, Copy, Clone)]
pub struct MemoryDevice<'a> {
    image: &'a [u8],
    reads: usize,
}

impl<'a> MemoryDevice<'a> {
    #[must_use]
    pub const fn new(image: &'a [u8]) -> Self {
        Self { image, reads: 0 }
    }

    /// Number of `read_blocks` calls served so far.
    #[must_use]
    pub const fn reads(&self) -> usize {
        self.reads
    }
}

impl BlockDevice for MemoryDevice<'_> {
    fn read_blocks(&mut self, start_block: u32, buf: &mut [u8]) -> Result<(), DeviceError> {
        if buf.len() % BLOCK_SIZE != 0 {
            return Err(DeviceError::UnalignedBuffer(buf.len()));
        }

        let start = start_block as usize * BLOCK_SIZE;
        let end = start + buf.len();
        let Some(src) = self.image.get(start..end) else {
            return Err(DeviceError::OutOfRange { block: start_block });
        };

        buf.copy_from_slice(src);
        self.reads += 1;
        Ok(())
    }
}
