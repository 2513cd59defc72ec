//! # BIOS Loader
//!
//! Second-stage loader for legacy BIOS boots from the ISO 9660 boot
//! medium.
//!
//! ## Overview
//!
//! Stage 1 loads this image to `0x8000` and calls `_start` in 32-bit
//! protected mode with the BIOS boot drive number as its only argument.
//! From there the loader uses the BIOS through a real-mode call gate for
//! disk, memory map and video, runs the shared boot pipeline, builds an
//! identity map and switches the CPU into long mode for the kernel.
//!
//! ```text
//! Stage 1 (external)
//!         ↓
//! ┌─────────────────────────────────────────────┐
//! │              BIOS Loader                    │
//! ├─────────────────────────────────────────────┤
//! │  1. Environment Setup                       │
//! │     • Stack, .bss, VGA console + debug port │
//! │     • Load the boot GDT                     │
//! │     • CPUID: long mode available?           │
//! │     • E820: arena at the top of the largest │
//! │       usable region above 1 MiB             │
//! │  2. Boot Pipeline (boot-pipeline)           │
//! │     • INT 13h extended reads                │
//! │     • Read /boot/boot.cfg                   │
//! │     • Read, validate and place the kernel   │
//! │     • VBE mode with linear framebuffer      │
//! │  3. Environment Transition (boot-x86)       │
//! │     • Identity map (2 MiB or 1 GiB pages)   │
//! │     • PAE, EFER.LME, CR3, CR0.PG            │
//! │  4. Kernel Handoff                          │
//! │     • ljmp to 64-bit code                   │
//! │     • rdi = &BootInfo, jump to the entry    │
//! └─────────────────────────────────────────────┘
//!         ↓
//! Kernel Execution
//! ```
//!
//! ## Error Handling
//!
//! Every stage returns a [`BootError`]. The first one is logged and the
//! CPU halts; there is nothing to return to.
//!
//! ## Development and Debugging
//!
//! Log records go to the VGA text screen and to QEMU's debug port
//! (`-debugcon stdio`).

#![cfg_attr(not(any(test, doctest)), no_std)]
#![cfg_attr(not(test), no_main)]
#![allow(unsafe_code)]

mod disk;
mod e820;
mod layout;
mod realmode;
mod screen;
mod vbe;

#[cfg(target_arch = "x86")]
mod cpu;
#[cfg(target_arch = "x86")]
mod firmware;

#[cfg(target_arch = "x86")]
mod entry {
    use crate::cpu::{BiosCpu, extended_features};
    use crate::e820::{BiosMemory, read_memory_map};
    use crate::firmware::BiosFirmware;
    use crate::screen::LOGGER;
    use boot_arena::Arena;
    use boot_pipeline::{BootError, Handoff, prepare};
    use boot_qemu::qemu_trace;
    use boot_x86::{
        BOOT_GDT, PagingEnabled, ProtectedMode, RealMode, build_identity_map,
        require_long_mode, select_page_size,
    };
    use core::convert::Infallible;
    use log::{error, info};

    core::arch::global_asm!(
        r#"
        .section .start, "ax"
        .code32
        .global _start
    _start:
        cli
        mov edx, dword ptr [esp + 4]
        mov esp, {stack_top}
        mov edi, offset __bss_start
        mov ecx, offset __bss_end
        sub ecx, edi
        xor eax, eax
        cld
        rep stosb
        push edx
        call loader_main
    start_halt:
        cli
        hlt
        jmp start_halt
        "#,
        stack_top = const crate::layout::PROTECTED_MODE_STACK_TOP,
    );

    /// Called from `_start` with the BIOS boot drive in the low byte.
    #[unsafe(no_mangle)]
    pub extern "C" fn loader_main(boot_drive: u32) -> ! {
        LOGGER.console().clear();
        if LOGGER.init().is_err() {
            halt();
        }
        info!("AmberOS BIOS loader, boot drive {boot_drive:#04x}");

        // SAFETY: `BOOT_GDT` is a static; stage 1 left us in flat 32-bit
        // protected mode with interrupts masked.
        let cpu = unsafe { RealMode::new(BiosCpu).enter_protected_mode(&BOOT_GDT.pointer()) };

        let Err(e) = boot(boot_drive, cpu);
        error!("Boot failed: {e}");
        halt()
    }

    /// Run the pipeline and jump. Only returns on error.
    fn boot(boot_drive: u32, cpu: ProtectedMode<BiosCpu>) -> Result<Infallible, BootError> {
        let drive = boot_drive.to_le_bytes()[0];

        let features = extended_features();
        require_long_mode(features)?;

        let memory_map = read_memory_map()?;
        let region = memory_map.arena_region()?;
        let len = usize::try_from(region.len()).map_err(|_| BootError::OutOfMemory)?;
        info!("Arena at {:#x} ({len} bytes)", region.start);
        // SAFETY: usable RAM above the loader, claimed in `BiosMemory` so no
        // kernel segment lands on it; paging is still off.
        let mut arena = unsafe { Arena::from_identity_mapped(region.start, len) };

        let mut firmware = BiosFirmware::new(drive, BiosMemory::new(memory_map, region));
        let handoff = prepare(&mut firmware, &mut arena)?;

        let page_size = select_page_size(features, handoff.large_pages);
        let identity_map = build_identity_map(&mut arena, page_size)?;

        // SAFETY: the map covers the low 4 GiB, which holds this loader,
        // its stack, the GDT, the arena and every placed segment.
        let paging = unsafe { cpu.enable_paging(&identity_map, features) }
            .map_err(|(_, e)| BootError::from(e))?;
        enter_kernel(paging, &handoff)
    }

    fn enter_kernel(paging: PagingEnabled<BiosCpu>, handoff: &Handoff) -> ! {
        trace_handoff(handoff);
        // SAFETY: the pipeline placed the entry point and wrote the boot
        // info; both are inside the identity map.
        unsafe { paging.enter_long_mode(handoff.entry, handoff.boot_info_phys) }
    }

    /// Last words before the jump, straight to the debug port.
    fn trace_handoff(handoff: &Handoff) {
        let fb = &handoff.boot_info.framebuffer;
        qemu_trace!("Handoff in BIOS Loader:\n");
        qemu_trace!("   entry = {:018x}", handoff.entry);
        qemu_trace!(", BI ptr = {:018x}", handoff.boot_info_phys);
        qemu_trace!(", firmware = {}\n", handoff.boot_info.firmware);
        qemu_trace!("   FB ptr = {:018x}", fb.base);
        qemu_trace!(", FB size = {}", fb.size);
        qemu_trace!(", FB width = {}", fb.width);
        qemu_trace!(", FB height = {}", fb.height);
        qemu_trace!(", FB pitch = {}", fb.pitch);
        qemu_trace!(", FB bpp = {}\n", fb.bits_per_pixel);
    }

    fn halt() -> ! {
        loop {
            // SAFETY: stopping the CPU is always allowed in ring 0.
            unsafe { core::arch::asm!("cli", "hlt", options(nomem, nostack)) };
        }
    }

    #[cfg(not(test))]
    #[panic_handler]
    fn panic(info: &core::panic::PanicInfo) -> ! {
        error!("{info}");
        halt()
    }
}
