//! # Leaving Boot Services
//!
//! [`BootServices`] is a token for "boot services are still running". Only
//! one can ever be taken, and [`BootServices::exit`] consumes it together
//! with the firmware wrapper, so `ExitBootServices` runs exactly once and
//! nothing that still holds a protocol survives it.

use crate::firmware::UefiFirmware;
use crate::logger::LOGGER;
use core::sync::atomic::{AtomicBool, Ordering};
use log::info;
use uefi::boot;
use uefi::mem::memory_map::MemoryMap;

static TAKEN: AtomicBool = AtomicBool::new(false);

pub struct BootServices(());

/// Proof that boot services are gone. Required for the kernel jump.
pub struct BootServicesExited(());

impl BootServices {
    /// The token, the first time this is called.
    pub fn take() -> Option<Self> {
        (!TAKEN.swap(true, Ordering::AcqRel)).then_some(Self(()))
    }

    /// Drop every protocol held by `firmware`, silence the firmware console
    /// and call `ExitBootServices`. No firmware call may follow.
    pub fn exit(self, firmware: UefiFirmware) -> BootServicesExited {
        drop(firmware);
        info!("Exiting boot services ...");
        LOGGER.console().exit_boot_services();

        // SAFETY: all protocols are closed, and the token guarantees this
        // is the only call.
        let map = unsafe { boot::exit_boot_services(None) };
        let entries = map.len();
        // The map's buffer belongs to the firmware allocator, which is gone.
        core::mem::forget(map);

        info!("Boot services exited ({entries} memory map entries)");
        BootServicesExited(())
    }
}
