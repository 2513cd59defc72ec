//! # QEMU Debug Console Support
//!
//! Allocation-free trace output for the boot loaders through QEMU's debug
//! port (`0x402`), usable from the first instruction of either loader and
//! after the firmware has been abandoned.
//!
//! ## Output Mechanism
//! ```text
//! log::info!(..) ──► QemuLogger ──┬──► QemuSink ──► port 0x402 ──► -debugcon
//!                                 └──► Console   (VGA text / UEFI ConOut)
//! qemu_trace!(..) ───────────────────► QemuSink
//! ```
//!
//! ## Host-Side Configuration
//! ```bash
//! qemu-system-x86_64 -cdrom boot.iso -debugcon stdio
//! ```
//!
//! ## Feature System
//! With the `enabled` feature (default) writes reach the port; without it
//! every trace compiles to nothing.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

mod logger;

pub use logger::{Console, QemuLogger};

#[cfg(all(feature = "enabled", not(test), any(target_arch = "x86", target_arch = "x86_64")))]
#[doc(hidden)]
pub mod qemu_fmt {
    use core::fmt::{self, Write};

    /// The port number for QEMU's debug port.
    const QEMU_DEBUG_PORT: u16 = 0x402;

    /// Write a single byte to QEMU's debug port.
    #[allow(clippy::inline_always)]
    #[inline(always)]
    pub fn dbg_putc(c: u8) {
        unsafe {
            core::arch::asm!(
                "out dx, al",
                in("dx") QEMU_DEBUG_PORT,
                in("al") c,
                options(nomem, nostack, preserves_flags)
            );
        }
    }

    pub struct QemuSink;

    impl Write for QemuSink {
        #[inline]
        fn write_str(&mut self, s: &str) -> fmt::Result {
            for b in s.bytes() {
                dbg_putc(b);
            }
            Ok(())
        }
    }

    #[doc(hidden)]
    #[inline(always)]
    #[allow(clippy::inline_always)]
    pub fn qemu_write(args: fmt::Arguments) {
        // Best-effort output; the port cannot fail.
        let _ = fmt::write(&mut QemuSink, args);
    }
}

#[cfg(not(all(feature = "enabled", not(test), any(target_arch = "x86", target_arch = "x86_64"))))]
#[doc(hidden)]
pub mod qemu_fmt {
    use core::fmt;

    #[doc(hidden)]
    #[inline(always)]
    #[allow(clippy::inline_always)]
    pub fn qemu_write(_: fmt::Arguments) {}
}

/// Write `format!`-style arguments straight to the debug port.
#[macro_export]
macro_rules! qemu_trace {
    ($($arg:tt)*) => {{
        $crate::qemu_fmt::qemu_write(core::format_args!($($arg)*));
    }};
}
