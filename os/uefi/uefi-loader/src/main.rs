//! # UEFI Loader
//!
//! UEFI application that boots the kernel from the ISO 9660 boot medium.
//!
//! ## Overview
//!
//! UEFI already runs the CPU in 64-bit mode with an identity map, so there
//! is no mode switch here. What this path must get right instead is giving
//! up the firmware: `ExitBootServices` is called exactly once, after which
//! no firmware call of any kind is made.
//!
//! ```text
//! UEFI Firmware Boot
//!         ↓
//! ┌─────────────────────────────────────────────┐
//! │              UEFI Loader                    │
//! ├─────────────────────────────────────────────┤
//! │  1. Environment Setup                       │
//! │     • Logging to ConOut and the debug port  │
//! │     • Check the firmware left us in long    │
//! │       mode with paging on                   │
//! │     • Allocate the arena (AnyPages)         │
//! │  2. Boot Pipeline (boot-pipeline)           │
//! │     • Find the boot medium via Block I/O    │
//! │     • Read /boot/boot.cfg                   │
//! │     • Read and validate the kernel ELF      │
//! │     • Place segments (AllocateAddress)      │
//! │     • Set the GOP mode, build BootInfo      │
//! │  3. Environment Transition                  │
//! │     • Close all protocols                   │
//! │     • Exit UEFI boot services               │
//! │  4. Kernel Handoff                          │
//! │     • rdi = &BootInfo, jump to the entry    │
//! └─────────────────────────────────────────────┘
//!         ↓
//! Kernel Execution
//! ```
//!
//! ## Boot Medium
//!
//! Every Block I/O handle with media is probed. The one whose block 0 is
//! the loader's own MBR (signature `MP` at offset 2) wins; otherwise the
//! first medium holding an ISO 9660 volume is used. 2048-byte filesystem
//! blocks are converted to the media block size on every read.
//!
//! ## Error Handling
//!
//! Every stage returns a [`BootError`]; the first one is logged and turned
//! into the [`Status`] returned to the firmware. There are no retries.
//!
//! ## Development and Debugging
//!
//! Log records go to QEMU's debug port (`-debugcon stdio`) for the whole
//! run and to the firmware console until boot services are exited.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![no_main]
#![allow(unsafe_code)]

mod block_io;
mod exit;
mod firmware;
mod logger;
mod memory;
mod tracing;

use crate::exit::{BootServices, BootServicesExited};
use crate::firmware::UefiFirmware;
use crate::logger::LOGGER;
use crate::tracing::trace_handoff;
use boot_pipeline::{BootError, Handoff, prepare};
use boot_registers::LoadRegisterUnsafe;
use boot_registers::cr0::Cr0;
use boot_registers::efer::Efer;
use core::convert::Infallible;
use log::{debug, error, info};
use uefi::prelude::*;

#[entry]
fn efi_main() -> Status {
    if uefi::helpers::init().is_err() {
        return Status::UNSUPPORTED;
    }
    if LOGGER.init().is_err() {
        return Status::ABORTED;
    }

    info!("AmberOS UEFI loader reporting to QEMU");
    let Some(boot_services) = BootServices::take() else {
        return Status::ABORTED;
    };

    let Err(e) = boot(boot_services);
    error!("Boot failed: {e}");
    e.into()
}

/// Run the pipeline and jump. Only returns on error, with boot services
/// still available.
fn boot(boot_services: BootServices) -> Result<Infallible, BootError> {
    check_cpu_state()?;

    let mut arena = memory::allocate_arena()?;
    let mut firmware = UefiFirmware::new();
    let handoff = prepare(&mut firmware, &mut arena)?;

    let exited = boot_services.exit(firmware);
    enter_kernel(&exited, &handoff)
}

/// The firmware must hand over in long mode with paging enabled.
fn check_cpu_state() -> Result<(), BootError> {
    // SAFETY: UEFI applications run in ring 0.
    let (cr0, efer) = unsafe { (Cr0::load_unsafe(), Efer::load_unsafe()) };
    debug!(
        "CR0.PG={} EFER.LMA={} EFER.NXE={}",
        cr0.pg_paging(),
        efer.lma(),
        efer.nxe()
    );

    if cr0.pg_paging() && efer.lma() {
        Ok(())
    } else {
        Err(BootError::Fatal("the firmware did not start in long mode"))
    }
}

/// Call the kernel entry point as `extern "sysv64" fn(*const BootInfo) -> !`.
fn enter_kernel(_: &BootServicesExited, handoff: &Handoff) -> ! {
    trace_handoff(handoff);
    // SAFETY: the entry point lies in segments the pipeline placed, and the
    // boot info lives in LOADER_DATA pages that are never freed.
    unsafe { jump_to_kernel(handoff.entry, handoff.boot_info_phys) }
}

#[inline(never)]
unsafe fn jump_to_kernel(entry: u64, boot_info: u64) -> ! {
    unsafe {
        core::arch::asm!(
            "cli",
            // Align RSP down to 16-byte boundary
            "and    rsp, -16",
            // Emulate a CALL by pushing a dummy return address (kernel entry never returns)
            "push   0",
            "jmp    {entry}",
            entry = in(reg) entry,
            in("rdi") boot_info,
            options(noreturn)
        )
    }
}
