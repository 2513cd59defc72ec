//! # Primary Volume Descriptor

use crate::record::{DirectoryEntry, DirectoryRecord};
use crate::{BLOCK_SIZE, Iso9660Error};

/// Fixed location of the primary volume descriptor.
pub const PRIMARY_VOLUME_DESCRIPTOR_LBA: u32 = 16;

const TYPE_PRIMARY: u8 = 1;
const STANDARD_IDENTIFIER: &[u8; 5] = b"CD001";
const VOLUME_ID: core::ops::Range<usize> = 40..72;
const VOLUME_SPACE_SIZE: usize = 80;
const LOGICAL_BLOCK_SIZE: usize = 128;
const ROOT_RECORD: core::ops::Range<usize> = 156..190;

/// Root metadata of a mounted volume. Immutable after mount.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct VolumeDescriptor {
    /// Root directory extent and size.
    pub root: DirectoryEntry,
    /// Total number of logical blocks on the volume.
    pub volume_blocks: u32,
    volume_id: [u8; 32],
}

impl VolumeDescriptor {
    /// Decode the descriptor block read from
    /// [`PRIMARY_VOLUME_DESCRIPTOR_LBA`].
    ///
    /// # Errors
    /// [`Iso9660Error::CorruptedVolume`] if the block is not a primary volume
    /// descriptor with 2048-byte logical blocks and a directory as its root.
    pub fn parse(block: &[u8; BLOCK_SIZE]) -> Result<Self, Iso9660Error> {
        if block[0] != TYPE_PRIMARY || &block[1..6] != STANDARD_IDENTIFIER {
            return Err(Iso9660Error::CorruptedVolume(
                "missing primary volume descriptor signature",
            ));
        }

        let block_size =
            u16::from_le_bytes([block[LOGICAL_BLOCK_SIZE], block[LOGICAL_BLOCK_SIZE + 1]]);
        if usize::from(block_size) != BLOCK_SIZE {
            return Err(Iso9660Error::CorruptedVolume("unsupported logical block size"));
        }

        let root = DirectoryRecord::parse(&block[ROOT_RECORD])?.entry();
        if !root.is_directory() {
            return Err(Iso9660Error::CorruptedVolume("root record is not a directory"));
        }

        let mut volume_id = [0u8; 32];
        volume_id.copy_from_slice(&block[VOLUME_ID]);

        Ok(Self {
            root,
            volume_blocks: u32::from_le_bytes([
                block[VOLUME_SPACE_SIZE],
                block[VOLUME_SPACE_SIZE + 1],
                block[VOLUME_SPACE_SIZE + 2],
                block[VOLUME_SPACE_SIZE + 3],
            ]),
            volume_id,
        })
    }

    /// Volume identifier without its space padding.
    #[must_use]
    pub fn volume_id(&self) -> &str {
        core::str::from_utf8(&self.volume_id)
            .unwrap_or_default()
            .trim_end_matches([' ', '\0'])
    }
}
