//! # Real-Mode Call Gate
//!
//! BIOS services only run in real mode. [`bios_call`] drops from 32-bit
//! protected mode through the 16-bit descriptors of the boot GDT into
//! real mode, issues the software interrupt with the caller's registers,
//! captures the registers and flags the BIOS returns, and comes back.
//!
//! ```text
//! 32-bit PM ──ljmp 0x08──► 16-bit PM ──CR0.PE=0, ljmp 0:x──► real mode
//!                                                              │ int n
//! 32-bit PM ◄──ljmp 0x18────────────────── CR0.PE=1 ◄──────────┘
//! ```
//!
//! Interrupts are enabled only around the `int` instruction itself. Any
//! buffer the BIOS touches must live below 1 MiB; see [`crate::layout`].

/// Register image passed to and returned from a BIOS interrupt.
#[repr(C, packed)]
#[derive(Debug, Default, Copy, Clone)]
pub struct RealModeRegs {
    pub edi: u32,
    pub esi: u32,
    pub ebx: u32,
    pub edx: u32,
    pub ecx: u32,
    pub eax: u32,
    pub gs: u16,
    pub fs: u16,
    pub es: u16,
    pub ds: u16,
    /// Flags after the interrupt returned. Ignored on input.
    pub eflags: u32,
}

impl RealModeRegs {
    const CARRY: u32 = 1 << 0;

    /// Most services report failure through CF.
    #[must_use]
    pub const fn carry(&self) -> bool {
        self.eflags & Self::CARRY != 0
    }

    /// `AH` of the returned register image.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn ah(&self) -> u8 {
        (self.eax >> 8) as u8
    }

    /// `AX` of the returned register image.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn ax(&self) -> u16 {
        self.eax as u16
    }
}

const _: () = {
    assert!(size_of::<RealModeRegs>() == 36);
    assert!(core::mem::offset_of!(RealModeRegs, eax) == 20);
    assert!(core::mem::offset_of!(RealModeRegs, gs) == 24);
    assert!(core::mem::offset_of!(RealModeRegs, ds) == 30);
    assert!(core::mem::offset_of!(RealModeRegs, eflags) == 32);
};

/// Issue BIOS interrupt `int` with `regs`, which receives the result.
///
/// # Safety
/// The boot GDT must be loaded, interrupts must be masked, and every
/// buffer the service writes must lie in low memory the loader does not
/// otherwise use.
#[cfg(target_arch = "x86")]
pub unsafe fn bios_call(int: u8, regs: &mut RealModeRegs) {
    unsafe { bios_call_gate(u32::from(int), regs) }
}

#[cfg(target_arch = "x86")]
unsafe extern "C" {
    fn bios_call_gate(int: u32, regs: *mut RealModeRegs);
}

// Selectors: 0x08/0x10 16-bit code/data, 0x18/0x20 32-bit code/data.
// Offsets into rm_regs follow `RealModeRegs`.
#[cfg(target_arch = "x86")]
core::arch::global_asm!(
    r#"
    .section .realmode, "awx"
    .code32
    .global bios_call_gate
bios_call_gate:
    pushad
    pushfd
    mov eax, dword ptr [esp + 40]
    mov byte ptr [rm_int_vector], al
    mov esi, dword ptr [esp + 44]
    mov edi, offset rm_regs
    mov ecx, 36
    cld
    rep movsb
    mov dword ptr [rm_saved_esp], esp
    .byte 0xEA
    .long rm_protected16
    .word 0x08

    .code16
rm_protected16:
    mov ax, 0x10
    mov ds, ax
    mov es, ax
    mov fs, ax
    mov gs, ax
    mov ss, ax
    mov eax, cr0
    and eax, 0xFFFFFFFE
    mov cr0, eax
    .byte 0xEA
    .word rm_real
    .word 0x0000

rm_real:
    xor ax, ax
    mov ds, ax
    mov ss, ax
    xor esp, esp
    mov sp, {stack_top}
    lidt [rm_ivt]
    mov ax, word ptr [rm_regs + 24]
    mov gs, ax
    mov ax, word ptr [rm_regs + 26]
    mov fs, ax
    mov ax, word ptr [rm_regs + 28]
    mov es, ax
    mov edi, dword ptr [rm_regs + 0]
    mov esi, dword ptr [rm_regs + 4]
    mov ebx, dword ptr [rm_regs + 8]
    mov edx, dword ptr [rm_regs + 12]
    mov ecx, dword ptr [rm_regs + 16]
    mov eax, dword ptr [rm_regs + 20]
    push word ptr [rm_regs + 30]
    pop ds
    sti
    .byte 0xCD
rm_int_vector:
    .byte 0x00
    cli
    pushfd
    push ds
    push eax
    xor ax, ax
    mov ds, ax
    pop eax
    mov dword ptr [rm_regs + 20], eax
    pop ax
    mov word ptr [rm_regs + 30], ax
    pop eax
    mov dword ptr [rm_regs + 32], eax
    mov dword ptr [rm_regs + 0], edi
    mov dword ptr [rm_regs + 4], esi
    mov dword ptr [rm_regs + 8], ebx
    mov dword ptr [rm_regs + 12], edx
    mov dword ptr [rm_regs + 16], ecx
    mov ax, es
    mov word ptr [rm_regs + 28], ax
    mov ax, fs
    mov word ptr [rm_regs + 26], ax
    mov ax, gs
    mov word ptr [rm_regs + 24], ax
    mov eax, cr0
    or eax, 1
    mov cr0, eax
    .byte 0x66, 0xEA
    .long rm_protected32
    .word 0x18

    .code32
rm_protected32:
    mov ax, 0x20
    mov ds, ax
    mov es, ax
    mov fs, ax
    mov gs, ax
    mov ss, ax
    mov esp, dword ptr [rm_saved_esp]
    mov esi, offset rm_regs
    mov edi, dword ptr [esp + 44]
    mov ecx, 36
    cld
    rep movsb
    popfd
    popad
    ret

    .balign 4
rm_regs:
    .skip 36
rm_saved_esp:
    .long 0
rm_ivt:
    .word 0x3FF
    .long 0
    "#,
    stack_top = const crate::layout::REAL_MODE_STACK_TOP,
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn carry_and_accumulator_views() {
        let regs = RealModeRegs {
            eax: 0x0000_864F,
            eflags: 0x0000_0203,
            ..RealModeRegs::default()
        };
        assert!(regs.carry());
        assert_eq!(regs.ah(), 0x86);
        assert_eq!(regs.ax(), 0x864F);

        let ok = RealModeRegs {
            eflags: 0x0000_0202,
            ..RealModeRegs::default()
        };
        assert!(!ok.carry());
    }
}
