//! # INT 13h Extended Disk Reads
//!
//! The boot drive read through the EDD services (AH=41h/48h/42h). Every
//! read goes through the low-memory bounce buffer and is then copied to
//! the caller's buffer, which may lie anywhere.

use crate::layout::{self, BOUNCE_BUFFER, BOUNCE_BUFFER_LEN, DISK_ADDRESS_PACKET, DRIVE_PARAMETERS};
use crate::realmode::RealModeRegs;
use boot_iso9660::{BLOCK_SIZE, BlockDevice, DeviceError};
use boot_pipeline::BootError;
use log::{debug, info, warn};

/// Disk address packet for INT 13h AH=42h.
#[repr(C, packed)]
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct DiskAddressPacket {
    pub size: u8,
    pub reserved: u8,
    pub sectors: u16,
    pub offset: u16,
    pub segment: u16,
    pub lba_lo: u32,
    pub lba_hi: u32,
}

impl DiskAddressPacket {
    /// Read `sectors` native sectors starting at `lba` into `buffer`
    /// (a linear address below 1 MiB).
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn new(lba: u64, sectors: u16, buffer: u32) -> Self {
        Self {
            size: 0x10,
            reserved: 0,
            sectors,
            offset: layout::offset(buffer),
            segment: layout::segment(buffer),
            lba_lo: lba as u32,
            lba_hi: (lba >> 32) as u32,
        }
    }
}

const _: () = assert!(size_of::<DiskAddressPacket>() == 0x10);

/// Native sectors per 2048-byte ISO block for a drive reporting
/// `bytes_per_sector`.
///
/// # Errors
/// [`BootError::UnsupportedFeature`] for sector sizes that do not divide
/// the block size.
pub fn sectors_per_block(bytes_per_sector: u16) -> Result<u16, BootError> {
    match bytes_per_sector {
        2048 => Ok(1),
        512 => Ok(4),
        _ => Err(BootError::UnsupportedFeature("disk sector size")),
    }
}

/// The boot drive, read in [`BLOCK_SIZE`] units.
pub struct BiosDisk {
    drive: u8,
    sectors_per_block: u16,
}

impl BiosDisk {
    /// Whole ISO blocks that fit in the bounce buffer per request.
    const BLOCKS_PER_READ: usize = BOUNCE_BUFFER_LEN / BLOCK_SIZE;

    /// Check for EDD support and query the sector size of `drive`.
    ///
    /// # Errors
    /// [`BootError::UnsupportedFeature`] if the BIOS lacks the extended
    /// read service or the sector size is unusable.
    #[cfg(target_arch = "x86")]
    pub fn open(drive: u8) -> Result<Self, BootError> {
        let mut regs = RealModeRegs {
            eax: 0x4100,
            ebx: 0x55AA,
            edx: u32::from(drive),
            ..RealModeRegs::default()
        };
        // SAFETY: AH=41h only returns registers.
        unsafe { crate::realmode::bios_call(0x13, &mut regs) };
        if regs.carry() || regs.ebx & 0xFFFF != 0xAA55 {
            warn!("Drive {drive:#04x} has no INT 13h extensions");
            return Err(BootError::UnsupportedFeature("INT 13h extensions"));
        }

        let bytes_per_sector = Self::query_sector_size(drive);
        let sectors_per_block = sectors_per_block(bytes_per_sector)?;
        info!("Boot drive {drive:#04x}: {bytes_per_sector} byte sectors");
        Ok(Self {
            drive,
            sectors_per_block,
        })
    }

    /// AH=48h bytes per sector; El Torito no-emulation media report 2048,
    /// and drives that refuse the query are assumed to be optical.
    #[cfg(target_arch = "x86")]
    fn query_sector_size(drive: u8) -> u16 {
        const RESULT_SIZE: u16 = 0x1E;
        const BYTES_PER_SECTOR: usize = 0x18;

        let params = DRIVE_PARAMETERS as usize as *mut u8;
        // SAFETY: the drive parameter buffer is reserved low memory.
        unsafe {
            core::ptr::write_bytes(params, 0, usize::from(RESULT_SIZE));
            params.cast::<u16>().write_unaligned(RESULT_SIZE);
        }

        let mut regs = RealModeRegs {
            eax: 0x4800,
            edx: u32::from(drive),
            esi: u32::from(layout::offset(DRIVE_PARAMETERS)),
            ds: layout::segment(DRIVE_PARAMETERS),
            ..RealModeRegs::default()
        };
        // SAFETY: the BIOS writes at most `RESULT_SIZE` bytes to the buffer.
        unsafe { crate::realmode::bios_call(0x13, &mut regs) };
        if regs.carry() {
            debug!("AH=48h failed with {:#04x}; assuming 2048 byte sectors", regs.ah());
            return 2048;
        }

        // SAFETY: as above.
        unsafe { params.add(BYTES_PER_SECTOR).cast::<u16>().read_unaligned() }
    }

    /// Read up to [`Self::BLOCKS_PER_READ`] blocks into the bounce buffer.
    #[cfg(target_arch = "x86")]
    fn read_into_bounce(&mut self, block: u32, blocks: usize) -> Result<(), DeviceError> {
        let lba = u64::from(block) * u64::from(self.sectors_per_block);
        let sectors = u16::try_from(blocks)
            .map_err(|_| DeviceError::OutOfRange { block })?
            * self.sectors_per_block;
        let packet = DiskAddressPacket::new(lba, sectors, BOUNCE_BUFFER);

        // SAFETY: the packet slot is reserved low memory.
        unsafe {
            (DISK_ADDRESS_PACKET as usize as *mut DiskAddressPacket).write_unaligned(packet);
        }

        let mut regs = RealModeRegs {
            eax: 0x4200,
            edx: u32::from(self.drive),
            esi: u32::from(layout::offset(DISK_ADDRESS_PACKET)),
            ds: layout::segment(DISK_ADDRESS_PACKET),
            ..RealModeRegs::default()
        };
        // SAFETY: the BIOS writes `sectors` sectors into the bounce buffer,
        // which holds `BLOCKS_PER_READ` blocks.
        unsafe { crate::realmode::bios_call(0x13, &mut regs) };
        if regs.carry() {
            warn!(
                "INT 13h AH=42h drive {:#04x} LBA {lba} failed with {:#04x}",
                self.drive,
                regs.ah()
            );
            return Err(DeviceError::Io { block });
        }
        Ok(())
    }
}

#[cfg(target_arch = "x86")]
impl BlockDevice for BiosDisk {
    fn read_blocks(&mut self, start_block: u32, buf: &mut [u8]) -> Result<(), DeviceError> {
        if buf.len() % BLOCK_SIZE != 0 {
            return Err(DeviceError::UnalignedBuffer(buf.len()));
        }

        let mut block = start_block;
        for chunk in buf.chunks_mut(Self::BLOCKS_PER_READ * BLOCK_SIZE) {
            let blocks = chunk.len() / BLOCK_SIZE;
            self.read_into_bounce(block, blocks)?;

            // SAFETY: the bounce buffer holds `chunk.len()` freshly read bytes.
            let bounce = unsafe {
                core::slice::from_raw_parts(BOUNCE_BUFFER as usize as *const u8, chunk.len())
            };
            chunk.copy_from_slice(bounce);

            block = u32::try_from(blocks)
                .ok()
                .and_then(|n| block.checked_add(n))
                .ok_or(DeviceError::OutOfRange { block })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packet_addresses_the_bounce_buffer() {
        let packet = DiskAddressPacket::new(0x1_0000_0010, 64, BOUNCE_BUFFER);
        assert_eq!({ packet.size }, 0x10);
        assert_eq!({ packet.sectors }, 64);
        assert_eq!({ packet.segment }, 0x7000);
        assert_eq!({ packet.offset }, 0);
        assert_eq!({ packet.lba_lo }, 0x10);
        assert_eq!({ packet.lba_hi }, 1);
    }

    #[test]
    fn hard_disks_read_four_sectors_per_block() {
        assert_eq!(sectors_per_block(2048).ok(), Some(1));
        assert_eq!(sectors_per_block(512).ok(), Some(4));
        assert!(matches!(
            sectors_per_block(4096),
            Err(BootError::UnsupportedFeature(_))
        ));
    }

    #[test]
    fn a_full_bounce_buffer_stays_below_the_sector_limit() {
        // Some BIOSes reject more than 127 sectors per request.
        assert!(BiosDisk::BLOCKS_PER_READ * 4 <= 127);
    }
}
