//! # Mode Switching on the Boot CPU
//!
//! [`BiosCpu`] executes the privileged instructions behind the
//! [`ModeSwitch`] typestates, plus CPUID feature detection. The 64-bit
//! side of the final far transfer is a small trampoline that loads the
//! long-mode data segments and calls the kernel with `rdi = &BootInfo`.

use boot_registers::cpuid::{CpuidRanges, ExtendedFeatures, Leaf80000001h};
use boot_registers::cr0::Cr0;
use boot_registers::cr3::Cr3;
use boot_registers::cr4::Cr4;
use boot_registers::efer::Efer;
use boot_registers::{LoadRegisterUnsafe, StoreRegisterUnsafe};
use boot_x86::{GdtPointer, ModeSwitch, Selector};
use core::arch::{asm, global_asm};
use log::debug;

/// The boot processor, in ring 0.
pub struct BiosCpu;

/// Extended features, or none if the CPU lacks leaf 0x8000_0001.
#[must_use]
pub fn extended_features() -> ExtendedFeatures {
    // SAFETY: every CPU that can reach this loader has CPUID.
    let leaf = unsafe {
        let ranges = CpuidRanges::read();
        debug!(
            "CPUID max basic {:#x}, max extended {:#x}",
            ranges.max_basic, ranges.max_extended
        );
        Leaf80000001h::read(&ranges)
    };
    leaf.map_or_else(|| ExtendedFeatures::from_bits(0), |l| l.edx)
}

/// What the long-mode trampoline reads through `eax`.
#[repr(C)]
struct LongModeArgs {
    entry: u64,
    arg: u64,
    data: u64,
}

unsafe extern "C" {
    fn long_mode_trampoline();
}

// SAFETY (for all methods): the typestates call these in order, once.
unsafe impl ModeSwitch for BiosCpu {
    unsafe fn disable_interrupts(&mut self) {
        unsafe { asm!("cli", options(nomem, nostack)) };
    }

    unsafe fn load_descriptor_table(&mut self, gdt: &GdtPointer) {
        unsafe {
            asm!(
                "lgdt [{}]",
                in(reg) core::ptr::from_ref(gdt),
                options(readonly, nostack, preserves_flags)
            );
        }
    }

    unsafe fn reload_segments(&mut self, code: Selector, data: Selector) {
        unsafe {
            asm!(
                "push {code}",
                "lea {tmp}, [2f]",
                "push {tmp}",
                "retf",
                "2:",
                "mov ds, {data:x}",
                "mov es, {data:x}",
                "mov fs, {data:x}",
                "mov gs, {data:x}",
                "mov ss, {data:x}",
                code = in(reg) u32::from(code.encode()),
                data = in(reg) u32::from(data.encode()),
                tmp = out(reg) _,
                options(preserves_flags)
            );
        }
    }

    unsafe fn enable_paging(&mut self, pml4_phys: u64) {
        unsafe {
            Cr4::load_unsafe().with_pae(true).store_unsafe();
            Efer::load_unsafe().with_lme(true).store_unsafe();
            Cr3::from_pml4_phys(pml4_phys).store_unsafe();
            Cr0::load_unsafe()
                .with_pe_protection_enable(true)
                .with_pg_paging(true)
                .store_unsafe();
        }
    }

    unsafe fn far_transfer(&mut self, code: Selector, data: Selector, entry: u64, arg: u64) -> ! {
        let args = LongModeArgs {
            entry,
            arg,
            data: u64::from(data.encode()),
        };
        unsafe {
            asm!(
                "push {code}",
                "push {target}",
                "retf",
                code = in(reg) u32::from(code.encode()),
                target = in(reg) long_mode_trampoline as usize,
                in("eax") &raw const args,
                options(noreturn)
            )
        }
    }
}

global_asm!(
    r#"
    .section .text.long_mode, "ax"
    .code64
    .global long_mode_trampoline
long_mode_trampoline:
    mov eax, eax
    mov rdx, qword ptr [rax + 16]
    mov ds, dx
    mov es, dx
    mov fs, dx
    mov gs, dx
    mov ss, dx
    mov rcx, qword ptr [rax]
    mov rdi, qword ptr [rax + 8]
    mov esp, esp
    and rsp, -16
    push 0
    jmp rcx
    .code32
    "#
);
