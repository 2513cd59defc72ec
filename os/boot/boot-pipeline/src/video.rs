//! # Video Mode Selection

use boot_config::VideoRequest;
use core::fmt;
use log::{debug, warn};

/// A linear-framebuffer mode the firmware offers.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct VideoMode {
    /// Firmware mode number: VBE mode or GOP mode index.
    pub id: u32,
    pub width: u32,
    pub height: u32,
    pub bits_per_pixel: u32,
}

impl VideoMode {
    /// `|Δwidth| + |Δheight| + |Δbpp|`; zero for an exact match. Summed in
    /// 64 bits so that no pair of `u32` triples can overflow.
    #[must_use]
    pub fn distance(&self, request: &VideoRequest) -> u64 {
        u64::from(self.width.abs_diff(request.width))
            + u64::from(self.height.abs_diff(request.height))
            + u64::from(self.bits_per_pixel.abs_diff(request.bits_per_pixel))
    }
}

impl fmt::Display for VideoMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}x{}x{} (mode {:#x})",
            self.width, self.height, self.bits_per_pixel, self.id
        )
    }
}

/// The first exact match, or else the first mode with the smallest
/// distance. `None` only if `modes` is empty.
pub fn select_mode<I>(modes: I, request: &VideoRequest) -> Option<VideoMode>
where
    I: IntoIterator<Item = VideoMode>,
{
    let mut best: Option<(u64, VideoMode)> = None;
    for mode in modes {
        let distance = mode.distance(request);
        if distance == 0 {
            debug!("Video mode {mode} matches {request}");
            return Some(mode);
        }
        if best.is_none_or(|(d, _)| distance < d) {
            best = Some((distance, mode));
        }
    }

    let (_, mode) = best?;
    warn!("No video mode matches {request}; using {mode}");
    Some(mode)
}
