//! # VESA BIOS Extensions
//!
//! Mode enumeration (4F00h), mode queries (4F01h) and mode setting
//! (4F02h) with a linear framebuffer.

use boot_pipeline::VideoMode;

/// `AX` after a successful VBE call.
pub const VBE_SUCCESS: u16 = 0x004F;

/// 4F02h: use the linear framebuffer.
pub const LINEAR_FRAMEBUFFER: u16 = 0x4000;

/// Mode attributes a usable mode must have: graphics (bit 4) and a linear
/// framebuffer (bit 7).
pub const REQUIRED_ATTRIBUTES: u16 = 0x90;

/// Terminates the controller's mode list.
pub const END_OF_MODE_LIST: u16 = 0xFFFF;

/// The fields of the 512-byte VBE controller information block we read.
#[repr(C, packed)]
#[derive(Debug, Copy, Clone)]
pub struct ControllerInfo {
    pub signature: [u8; 4],
    pub version: u16,
    pub oem_string: u32,
    pub capabilities: u32,
    pub mode_list_offset: u16,
    pub mode_list_segment: u16,
    pub total_memory_64k: u16,
}

impl ControllerInfo {
    /// VBE 2.0 or later, which is where linear framebuffers start.
    #[must_use]
    pub fn is_supported(&self) -> bool {
        self.signature == *b"VESA" && { self.version } >= 0x0200
    }
}

/// The fields of the 256-byte VBE mode information block we read.
#[repr(C, packed)]
#[derive(Debug, Copy, Clone)]
pub struct ModeInfo {
    pub attributes: u16,
    pub window_a: u8,
    pub window_b: u8,
    pub granularity: u16,
    pub window_size: u16,
    pub segment_a: u16,
    pub segment_b: u16,
    pub window_function: u32,
    pub bytes_per_scanline: u16,
    pub width: u16,
    pub height: u16,
    pub char_width: u8,
    pub char_height: u8,
    pub planes: u8,
    pub bits_per_pixel: u8,
    pub banks: u8,
    pub memory_model: u8,
    pub bank_size: u8,
    pub image_pages: u8,
    pub reserved0: u8,
    pub red_mask: u8,
    pub red_position: u8,
    pub green_mask: u8,
    pub green_position: u8,
    pub blue_mask: u8,
    pub blue_position: u8,
    pub reserved_mask: u8,
    pub reserved_position: u8,
    pub direct_color_attributes: u8,
    pub framebuffer: u32,
    pub off_screen_memory: u32,
    pub off_screen_size_1k: u16,
    pub linear_bytes_per_scanline: u16,
}

const _: () = {
    assert!(size_of::<ControllerInfo>() == 20);
    assert!(core::mem::offset_of!(ModeInfo, bytes_per_scanline) == 16);
    assert!(core::mem::offset_of!(ModeInfo, bits_per_pixel) == 25);
    assert!(core::mem::offset_of!(ModeInfo, framebuffer) == 40);
    assert!(core::mem::offset_of!(ModeInfo, linear_bytes_per_scanline) == 50);
};

impl ModeInfo {
    #[must_use]
    pub const fn is_usable(&self) -> bool {
        self.attributes & REQUIRED_ATTRIBUTES == REQUIRED_ATTRIBUTES
    }

    /// The mode as the pipeline sees it, if it is usable.
    #[must_use]
    pub fn video_mode(&self, id: u16) -> Option<VideoMode> {
        self.is_usable().then(|| VideoMode {
            id: u32::from(id),
            width: u32::from(self.width),
            height: u32::from(self.height),
            bits_per_pixel: u32::from(self.bits_per_pixel),
        })
    }

    /// Bytes per scanline in linear framebuffer mode. VBE 3.0 reports it
    /// separately from the banked value.
    #[must_use]
    pub fn pitch(&self, vbe_version: u16) -> u32 {
        let linear = self.linear_bytes_per_scanline;
        if vbe_version >= 0x0300 && linear != 0 {
            u32::from(linear)
        } else {
            u32::from(self.bytes_per_scanline)
        }
    }
}

#[cfg(target_arch = "x86")]
pub use bios::{Vbe, VbeModes};

#[cfg(target_arch = "x86")]
mod bios {
    use super::{
        ControllerInfo, END_OF_MODE_LIST, LINEAR_FRAMEBUFFER, ModeInfo, VBE_SUCCESS,
    };
    use crate::layout::{self, VBE_CONTROLLER_INFO, VBE_MODE_INFO};
    use crate::realmode::{RealModeRegs, bios_call};
    use boot_info::boot::FramebufferInfo;
    use boot_pipeline::{BootError, VideoMode};
    use log::{debug, info, warn};

    /// The VBE controller, probed once.
    pub struct Vbe {
        version: u16,
        mode_list: u32,
    }

    impl Vbe {
        /// 4F00h: probe the controller.
        ///
        /// # Errors
        /// [`BootError::UnsupportedFeature`] without VBE 2.0.
        pub fn probe() -> Result<Self, BootError> {
            let buffer = VBE_CONTROLLER_INFO as usize as *mut u8;
            // SAFETY: the controller block is reserved low memory; "VBE2"
            // asks for the 2.0 layout.
            unsafe {
                core::ptr::write_bytes(buffer, 0, 512);
                buffer.cast::<[u8; 4]>().write(*b"VBE2");
            }

            let regs = call(0x4F00, 0, VBE_CONTROLLER_INFO)?;
            // SAFETY: the BIOS filled the block.
            let info = unsafe { buffer.cast::<ControllerInfo>().read_unaligned() };
            if !info.is_supported() {
                warn!("VBE 2.0 not supported (AX={:#06x})", regs.ax());
                return Err(BootError::UnsupportedFeature("VBE 2.0"));
            }

            let version = info.version;
            info!("VBE {}.{} controller", version >> 8, version & 0xFF);
            Ok(Self {
                version,
                mode_list: layout::linear(info.mode_list_segment, info.mode_list_offset),
            })
        }

        /// 4F01h: query `id`.
        ///
        /// # Errors
        /// [`BootError::UnsupportedFeature`] if the BIOS rejects the mode.
        pub fn mode_info(&self, id: u16) -> Result<ModeInfo, BootError> {
            call(0x4F01, u32::from(id), VBE_MODE_INFO)?;
            // SAFETY: the BIOS filled the 256-byte mode block.
            Ok(unsafe { (VBE_MODE_INFO as usize as *const ModeInfo).read_unaligned() })
        }

        /// Usable modes from the controller's list.
        #[must_use]
        pub const fn modes(&self) -> VbeModes<'_> {
            VbeModes {
                vbe: self,
                next: self.mode_list,
            }
        }

        /// 4F02h: switch to `mode` with its linear framebuffer.
        ///
        /// # Errors
        /// [`BootError::UnsupportedFeature`] if the mode is unknown, not
        /// usable, or rejected.
        pub fn set_mode(&self, mode: &VideoMode) -> Result<FramebufferInfo, BootError> {
            let id = u16::try_from(mode.id)
                .map_err(|_| BootError::UnsupportedFeature("unknown video mode"))?;
            let info = self.mode_info(id)?;
            if !info.is_usable() {
                return Err(BootError::UnsupportedFeature("no linear framebuffer"));
            }

            call(0x4F02, u32::from(id | LINEAR_FRAMEBUFFER), 0).inspect_err(|_| {
                warn!("VBE rejected mode {id:#x}");
            })?;

            let base = info.framebuffer;
            info!("VBE mode {mode} set, framebuffer at {base:#x}");
            Ok(FramebufferInfo::new(
                u64::from(base),
                u32::from(info.width),
                u32::from(info.height),
                info.pitch(self.version),
                u32::from(info.bits_per_pixel),
            ))
        }
    }

    /// Walks the far-pointed mode list, skipping modes that fail the
    /// attribute check.
    pub struct VbeModes<'a> {
        vbe: &'a Vbe,
        next: u32,
    }

    impl Iterator for VbeModes<'_> {
        type Item = VideoMode;

        fn next(&mut self) -> Option<VideoMode> {
            loop {
                // SAFETY: the controller's mode list lives below 1 MiB and
                // ends with 0xFFFF.
                let id = unsafe { (self.next as usize as *const u16).read_unaligned() };
                if id == END_OF_MODE_LIST {
                    return None;
                }
                self.next += 2;

                match self.vbe.mode_info(id) {
                    Ok(info) => {
                        if let Some(mode) = info.video_mode(id) {
                            return Some(mode);
                        }
                        debug!("VBE mode {id:#x} lacks a linear framebuffer");
                    }
                    Err(e) => debug!("VBE mode {id:#x}: {e}"),
                }
            }
        }
    }

    /// Run VBE function `ax` with `cx` and `es:di` pointing at `buffer`.
    fn call(ax: u32, cx: u32, buffer: u32) -> Result<RealModeRegs, BootError> {
        let mut regs = RealModeRegs {
            eax: ax,
            ebx: cx,
            ecx: cx,
            edi: u32::from(layout::offset(buffer)),
            es: layout::segment(buffer),
            ..RealModeRegs::default()
        };
        // SAFETY: VBE writes at most 512 bytes to `buffer`, which is one of
        // the reserved low-memory blocks.
        unsafe { bios_call(0x10, &mut regs) };
        if regs.ax() == VBE_SUCCESS {
            Ok(regs)
        } else {
            Err(BootError::UnsupportedFeature("VBE call failed"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mode_info(attributes: u16, width: u16, height: u16, bpp: u8) -> ModeInfo {
        ModeInfo {
            attributes,
            window_a: 0,
            window_b: 0,
            granularity: 0,
            window_size: 0,
            segment_a: 0,
            segment_b: 0,
            window_function: 0,
            bytes_per_scanline: width * 2,
            width,
            height,
            char_width: 8,
            char_height: 16,
            planes: 1,
            bits_per_pixel: bpp,
            banks: 1,
            memory_model: 6,
            bank_size: 0,
            image_pages: 0,
            reserved0: 1,
            red_mask: 8,
            red_position: 16,
            green_mask: 8,
            green_position: 8,
            blue_mask: 8,
            blue_position: 0,
            reserved_mask: 8,
            reserved_position: 24,
            direct_color_attributes: 0,
            framebuffer: 0xFD00_0000,
            off_screen_memory: 0,
            off_screen_size_1k: 0,
            linear_bytes_per_scanline: width * 4,
        }
    }

    #[test]
    fn modes_need_graphics_and_a_linear_framebuffer() {
        let usable = mode_info(0x9B, 1920, 1080, 32);
        assert_eq!(
            usable.video_mode(0x180),
            Some(VideoMode {
                id: 0x180,
                width: 1920,
                height: 1080,
                bits_per_pixel: 32
            })
        );

        assert!(mode_info(0x1B, 1920, 1080, 32).video_mode(0x180).is_none());
        assert!(mode_info(0x8B, 1920, 1080, 32).video_mode(0x180).is_none());
    }

    #[test]
    fn pitch_prefers_the_linear_value_on_vbe3() {
        let info = mode_info(0x9B, 1024, 768, 32);
        assert_eq!(info.pitch(0x0300), 4096);
        assert_eq!(info.pitch(0x0200), 2048);
    }

    #[test]
    fn controller_signature_and_version() {
        let mut info = ControllerInfo {
            signature: *b"VESA",
            version: 0x0300,
            oem_string: 0,
            capabilities: 0,
            mode_list_offset: 0x1222,
            mode_list_segment: 0,
            total_memory_64k: 256,
        };
        assert!(info.is_supported());
        info.version = 0x0102;
        assert!(!info.is_supported());
        info.version = 0x0200;
        info.signature = *b"VBE2";
        assert!(!info.is_supported());
    }
}
