use crate::{BootError, Firmware, VideoMode, select_mode};
use boot_arena::Arena;
use boot_config::{BootConfig, BootOptions, CONFIG_PATH};
use boot_elf::{ElfImage, LoadOptions};
use boot_info::boot::BootInfo;
use boot_iso9660::{BlockDevice, Iso9660, Iso9660Error};
use log::{debug, info, warn};

/// Everything left to do once the firmware-independent work is done.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Handoff {
    /// Entry point of the loaded kernel.
    pub entry: u64,
    /// Physical address of the [`BootInfo`] in the arena.
    pub boot_info_phys: u64,
    /// Copy of the value stored at [`boot_info_phys`](Self::boot_info_phys).
    pub boot_info: BootInfo,
    /// The mode the framebuffer was set to.
    pub video_mode: VideoMode,
    /// `[Boot] LargePages` from the configuration.
    pub large_pages: bool,
}

/// Run the boot pipeline up to, but excluding, the control transfer:
/// mount the boot volume, read the configuration, read, validate and place
/// the kernel, set the video mode and write the boot info into `arena`.
///
/// Scratch buffers, including the kernel file, are released again; only the
/// boot info stays allocated.
///
/// # Errors
/// The first failing stage's error. Nothing is retried.
pub fn prepare<F: Firmware>(firmware: &mut F, arena: &mut Arena<'_>) -> Result<Handoff, BootError> {
    info!("Booting on {}", F::KIND);

    let device = firmware.boot_device()?;
    let mut fs = Iso9660::mount(device)?;
    let options = read_options(&mut fs, arena)?;
    info!(
        "Kernel {}, video {}, large pages {}",
        options.kernel,
        options.video,
        if options.large_pages { "on" } else { "off" }
    );

    let mark = arena.mark();
    let kernel = fs.read_file(arena, options.kernel.as_str())?;
    let loaded = {
        let image = ElfImage::parse(kernel.bytes(arena))?;
        image.load_segments(firmware.physical_memory(), LoadOptions::default())?
    };
    arena.release(mark);
    if let Some((start, end)) = loaded.phys_span() {
        info!(
            "Kernel placed at {start:#x}..{end:#x}, entry {:#x}",
            loaded.entry()
        );
    }

    let video_mode = select_mode(firmware.video_modes()?, &options.video)
        .ok_or(BootError::UnsupportedFeature("no usable video mode"))?;
    let framebuffer = firmware.set_video_mode(&video_mode)?;

    let boot_info = BootInfo::new(F::KIND, framebuffer);
    let slot = arena.alloc_value(&boot_info)?;
    let boot_info_phys = arena.phys_addr(slot);
    trace_boot_info(&boot_info, boot_info_phys);

    Ok(Handoff {
        entry: loaded.entry(),
        boot_info_phys,
        boot_info,
        video_mode,
        large_pages: options.large_pages,
    })
}

/// The configuration file's options, or the defaults if there is none.
fn read_options<D: BlockDevice>(
    fs: &mut Iso9660<D>,
    arena: &mut Arena<'_>,
) -> Result<BootOptions, BootError> {
    let mark = arena.mark();
    let options = match fs.read_file(arena, CONFIG_PATH) {
        Ok(file) => match BootConfig::from_bytes(file.bytes(arena)) {
            Ok(config) => config.options(),
            Err(e) => {
                warn!("{CONFIG_PATH}: {e}; using defaults");
                BootOptions::default()
            }
        },
        Err(Iso9660Error::FileNotFound) => {
            info!("No {CONFIG_PATH}; using defaults");
            BootOptions::default()
        }
        Err(e) => return Err(e.into()),
    };
    arena.release(mark);
    Ok(options)
}

fn trace_boot_info(boot_info: &BootInfo, phys: u64) {
    let fb = &boot_info.framebuffer;
    debug!("Boot info at {phys:#x}: firmware {}", boot_info.firmware);
    debug!(
        "Framebuffer {:#x} ({} bytes): {}x{}, pitch {}, {} bpp",
        fb.base, fb.size, fb.width, fb.height, fb.pitch, fb.bits_per_pixel
    );
}
