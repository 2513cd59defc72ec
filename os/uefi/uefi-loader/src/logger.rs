use boot_qemu::{Console, QemuLogger};
use core::fmt;
use core::sync::atomic::{AtomicBool, Ordering};
use log::LevelFilter;

/// The firmware text console, for as long as boot services exist.
pub struct UefiConsole {
    boot_services_available: AtomicBool,
}

impl UefiConsole {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            boot_services_available: AtomicBool::new(true),
        }
    }

    /// Stop touching `ConOut`. Records keep going to the debug port.
    pub fn exit_boot_services(&self) {
        self.boot_services_available.store(false, Ordering::Release);
    }
}

impl Console for UefiConsole {
    fn write_line(&self, args: fmt::Arguments<'_>) {
        if self.boot_services_available.load(Ordering::Acquire) {
            uefi::println!("{args}");
        }
    }
}

/// Debug port for the whole run, `ConOut` until boot services end.
pub type UefiLogger = QemuLogger<UefiConsole>;

pub static LOGGER: UefiLogger = QemuLogger::new(LevelFilter::Debug, UefiConsole::new());
