//! # Firmware Services
//!
//! What the pipeline needs from the machine it runs on. The BIOS loader
//! implements this with real-mode interrupt calls, the UEFI loader with boot
//! services.

use crate::{BootError, VideoMode};
use boot_elf::PhysicalMemory;
use boot_info::boot::{FirmwareKind, FramebufferInfo};
use boot_iso9660::BlockDevice;

pub trait Firmware {
    /// Tag written into the boot info.
    const KIND: FirmwareKind;

    /// The medium the loader was started from.
    type Device: BlockDevice;

    /// Page allocation at fixed physical addresses, for kernel segments.
    type Memory: PhysicalMemory;

    /// Open the boot medium.
    ///
    /// # Errors
    /// [`BootError::ReadError`] if no usable medium is found.
    fn boot_device(&mut self) -> Result<Self::Device, BootError>;

    fn physical_memory(&mut self) -> &mut Self::Memory;

    /// Usable linear-framebuffer modes, in firmware order.
    ///
    /// # Errors
    /// [`BootError::UnsupportedFeature`] if the firmware has no graphics
    /// support.
    fn video_modes(&mut self) -> Result<impl Iterator<Item = VideoMode> + '_, BootError>;

    /// Switch to `mode` and describe the resulting framebuffer.
    ///
    /// # Errors
    /// [`BootError::UnsupportedFeature`] if the firmware refuses the mode.
    fn set_video_mode(&mut self, mode: &VideoMode) -> Result<FramebufferInfo, BootError>;
}
