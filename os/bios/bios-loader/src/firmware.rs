//! # BIOS Services as [`Firmware`]

use crate::disk::BiosDisk;
use crate::e820::BiosMemory;
use crate::vbe::Vbe;
use boot_info::boot::{FirmwareKind, FramebufferInfo};
use boot_pipeline::{BootError, Firmware, VideoMode};

pub struct BiosFirmware {
    drive: u8,
    memory: BiosMemory,
    vbe: Option<Vbe>,
}

impl BiosFirmware {
    #[must_use]
    pub const fn new(drive: u8, memory: BiosMemory) -> Self {
        Self {
            drive,
            memory,
            vbe: None,
        }
    }

    fn vbe(&mut self) -> Result<&Vbe, BootError> {
        if self.vbe.is_none() {
            self.vbe = Some(Vbe::probe()?);
        }
        self.vbe
            .as_ref()
            .ok_or(BootError::UnsupportedFeature("VBE 2.0"))
    }
}

impl Firmware for BiosFirmware {
    const KIND: FirmwareKind = FirmwareKind::Legacy;
    type Device = BiosDisk;
    type Memory = BiosMemory;

    fn boot_device(&mut self) -> Result<Self::Device, BootError> {
        BiosDisk::open(self.drive)
    }

    fn physical_memory(&mut self) -> &mut Self::Memory {
        &mut self.memory
    }

    fn video_modes(&mut self) -> Result<impl Iterator<Item = VideoMode> + '_, BootError> {
        Ok(self.vbe()?.modes())
    }

    fn set_video_mode(&mut self, mode: &VideoMode) -> Result<FramebufferInfo, BootError> {
        self.vbe()?.set_mode(mode)
    }
}
