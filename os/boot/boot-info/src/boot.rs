//! # Boot Information

use core::fmt;
use core::mem::{offset_of, size_of};

/// Entry point of the loaded image.
///
/// # ABI
/// The ABI is `sysv64` on both firmware paths: the BIOS path jumps from a
/// 64-bit trampoline it controls, and the UEFI path would otherwise default
/// to `win64`. Pinning one convention keeps the pointer in `rdi` everywhere.
pub type BootEntryFn = extern "sysv64" fn(*const BootInfo) -> !;

/// Firmware substrate the pipeline ran on.
#[repr(u32)]
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum FirmwareKind {
    /// Legacy PC BIOS, entered through real mode.
    Legacy = 0,
    /// UEFI, entered in a flat, paged environment.
    Uefi = 1,
}

impl fmt::Display for FirmwareKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Legacy => f.write_str("BIOS"),
            Self::Uefi => f.write_str("UEFI"),
        }
    }
}

/// Firmware-agnostic machine description handed to the loaded image.
///
/// Constructed exactly once, after the video mode is set and before the
/// control transfer.
#[repr(C)]
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct BootInfo {
    /// Which firmware path produced this value.
    pub firmware: FirmwareKind,

    /// Linear framebuffer of the mode selected during boot.
    pub framebuffer: FramebufferInfo,
}

impl BootInfo {
    #[must_use]
    pub const fn new(firmware: FirmwareKind, framebuffer: FramebufferInfo) -> Self {
        Self {
            firmware,
            framebuffer,
        }
    }
}

#[repr(C)]
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct FramebufferInfo {
    /// Linear framebuffer base address (CPU physical address).
    pub base: u64,

    /// Total framebuffer size in **bytes** (`pitch * height`).
    pub size: u64,

    /// Visible width in **pixels**.
    pub width: u32,

    /// Visible height in **pixels**.
    pub height: u32,

    /// Bytes per scanline. May be larger than `width * bytes_per_pixel`.
    pub pitch: u32,

    /// Color depth in bits per pixel.
    pub bits_per_pixel: u32,
}

impl FramebufferInfo {
    /// Describe a framebuffer from its geometry; the byte size is derived
    /// from pitch and height.
    #[must_use]
    pub const fn new(base: u64, width: u32, height: u32, pitch: u32, bits_per_pixel: u32) -> Self {
        Self {
            base,
            size: pitch as u64 * height as u64,
            width,
            height,
            pitch,
            bits_per_pixel,
        }
    }

    /// Bytes occupied by a single pixel, rounded up.
    #[must_use]
    pub const fn bytes_per_pixel(&self) -> u32 {
        self.bits_per_pixel.div_ceil(8)
    }
}

const _: () = {
    assert!(size_of::<FirmwareKind>() == 4);
    assert!(size_of::<FramebufferInfo>() == 32);
    assert!(offset_of!(FramebufferInfo, width) == 16);
    assert!(offset_of!(BootInfo, framebuffer) == 8);
    assert!(size_of::<BootInfo>() == 40);
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_follows_pitch_and_height() {
        let fb = FramebufferInfo::new(0xFD00_0000, 1920, 1080, 1920 * 4, 32);
        assert_eq!(fb.size, 1920 * 4 * 1080);
        assert_eq!(fb.bytes_per_pixel(), 4);
    }

    #[test]
    fn bytes_per_pixel_rounds_up() {
        let fb = FramebufferInfo::new(0, 640, 480, 640 * 2, 15);
        assert_eq!(fb.bytes_per_pixel(), 2);
    }

    #[test]
    fn firmware_tag_values_are_stable() {
        assert_eq!(FirmwareKind::Legacy as u32, 0);
        assert_eq!(FirmwareKind::Uefi as u32, 1);
    }
}
