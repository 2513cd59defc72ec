//! # Boot Services as [`Firmware`]

use crate::block_io::{UefiBlockDevice, find_boot_device};
use crate::memory::UefiPages;
use boot_info::boot::{FirmwareKind, FramebufferInfo};
use boot_pipeline::{BootError, Firmware, VideoMode};
use log::{info, warn};
use uefi::boot::{self, OpenProtocolAttributes, OpenProtocolParams, ScopedProtocol};
use uefi::proto::console::gop::{GraphicsOutput, ModeInfo, PixelFormat};

pub struct UefiFirmware {
    gop: Option<ScopedProtocol<GraphicsOutput>>,
    pages: UefiPages,
}

impl UefiFirmware {
    /// Open the graphics output protocol, if there is one.
    ///
    /// The protocol is opened shared so the text console keeps working.
    #[must_use]
    pub fn new() -> Self {
        let gop = boot::get_handle_for_protocol::<GraphicsOutput>()
            .and_then(|handle| {
                // SAFETY: dropped together with `self`, before boot services
                // are exited.
                unsafe {
                    boot::open_protocol::<GraphicsOutput>(
                        OpenProtocolParams {
                            handle,
                            agent: boot::image_handle(),
                            controller: None,
                        },
                        OpenProtocolAttributes::GetProtocol,
                    )
                }
            })
            .inspect_err(|e| warn!("No graphics output protocol: {:?}", e.status()))
            .ok();

        Self {
            gop,
            pages: UefiPages,
        }
    }
}

impl Default for UefiFirmware {
    fn default() -> Self {
        Self::new()
    }
}

impl Firmware for UefiFirmware {
    const KIND: FirmwareKind = FirmwareKind::Uefi;
    type Device = UefiBlockDevice;
    type Memory = UefiPages;

    fn boot_device(&mut self) -> Result<Self::Device, BootError> {
        find_boot_device()
    }

    fn physical_memory(&mut self) -> &mut Self::Memory {
        &mut self.pages
    }

    fn video_modes(&mut self) -> Result<impl Iterator<Item = VideoMode> + '_, BootError> {
        let gop = self
            .gop
            .as_ref()
            .ok_or(BootError::UnsupportedFeature("graphics output"))?;
        Ok(gop
            .modes()
            .filter_map(|mode| video_mode(mode.index(), mode.info())))
    }

    fn set_video_mode(&mut self, mode: &VideoMode) -> Result<FramebufferInfo, BootError> {
        let gop = self
            .gop
            .as_mut()
            .ok_or(BootError::UnsupportedFeature("graphics output"))?;

        let gop_mode = gop
            .modes()
            .find(|m| m.index() == mode.id)
            .ok_or(BootError::UnsupportedFeature("unknown video mode"))?;
        gop.set_mode(&gop_mode).map_err(|e| {
            warn!("SetMode({}) failed: {:?}", mode.id, e.status());
            BootError::UnsupportedFeature("video mode rejected")
        })?;

        let info = gop.current_mode_info();
        let current = video_mode(mode.id, &info)
            .ok_or(BootError::UnsupportedFeature("no linear framebuffer"))?;
        let bytes_per_pixel = current.bits_per_pixel.div_ceil(8);
        let pitch = u32::try_from(info.stride())
            .map_err(|_| BootError::UnsupportedFeature("framebuffer stride"))?
            * bytes_per_pixel;
        let base = gop.frame_buffer().as_mut_ptr() as u64;

        info!("GOP mode {current} set, framebuffer at {base:#x}");
        Ok(FramebufferInfo::new(
            base,
            current.width,
            current.height,
            pitch,
            current.bits_per_pixel,
        ))
    }
}

/// Describe a GOP mode; `None` for modes without a linear framebuffer.
fn video_mode(id: u32, info: &ModeInfo) -> Option<VideoMode> {
    let bits_per_pixel = match info.pixel_format() {
        PixelFormat::Rgb | PixelFormat::Bgr => 32,
        PixelFormat::Bitmask => {
            let mask = info.pixel_bitmask()?;
            let used = mask.red | mask.green | mask.blue | mask.reserved;
            (u32::BITS - used.leading_zeros()).div_ceil(8) * 8
        }
        PixelFormat::BltOnly => return None,
    };

    let (width, height) = info.resolution();
    Some(VideoMode {
        id,
        width: u32::try_from(width).ok()?,
        height: u32::try_from(height).ok()?,
        bits_per_pixel,
    })
}
