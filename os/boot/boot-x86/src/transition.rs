//! # Mode Transitions
//!
//! The bootstrap is a strictly ordered state machine:
//!
//! ```text
//! RealMode ──load GDT, far jump──▶ ProtectedMode ──PAE, EFER.LME, CR3, CR0──▶
//! PagingEnabled ──far jump to 64-bit code, call entry──▶ LongMode
//! ```
//!
//! Each state is a distinct type and every transition consumes the previous
//! one, so no step can be skipped, repeated or reordered. The instructions
//! themselves sit behind [`ModeSwitch`]; the firmware shim implements it
//! with inline assembly, tests implement it with a recorder.
//!
//! [`LongMode`](Mode::LongMode) has no type of its own: reaching it and
//! calling the kernel is one indivisible step, because the 32-bit caller
//! cannot execute once the code segment is 64-bit.

use crate::gdt::{GdtPointer, Selector};
use crate::paging::{IdentityMap, PageSize};
use boot_registers::cpuid::ExtendedFeatures;
use log::{info, warn};

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum TransitionError {
    #[error("The CPU does not support {0}")]
    UnsupportedFeature(&'static str),
}

/// The four bootstrap states, for diagnostics.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd)]
pub enum Mode {
    RealMode,
    ProtectedMode,
    PagingEnabled,
    LongMode,
}

/// The privileged operations the bootstrap needs.
///
/// # Safety
/// Implementations execute the named instructions with no further checks;
/// the typestates in this module guarantee the call order.
pub unsafe trait ModeSwitch {
    /// Mask maskable interrupts (`cli`).
    ///
    /// # Safety
    /// Ring 0 only.
    unsafe fn disable_interrupts(&mut self);

    /// `lgdt` the given table.
    ///
    /// # Safety
    /// The table must stay resident and unchanged for the rest of the boot.
    unsafe fn load_descriptor_table(&mut self, gdt: &GdtPointer);

    /// Far transfer to reload `CS` with `code`, then load `DS`, `ES`, `FS`,
    /// `GS` and `SS` with `data`, continuing at the next instruction.
    ///
    /// # Safety
    /// Both selectors must name present descriptors of the current operand
    /// size in the loaded table.
    unsafe fn reload_segments(&mut self, code: Selector, data: Selector);

    /// Set CR4.PAE, EFER.LME, load CR3 with `pml4_phys`, then set CR0.PG
    /// and CR0.PE together.
    ///
    /// # Safety
    /// `pml4_phys` must be an identity map covering the running code, its
    /// stack and the descriptor table.
    unsafe fn enable_paging(&mut self, pml4_phys: u64);

    /// Far transfer through `code` into 64-bit mode, load the data segment
    /// registers with `data`, and call `entry` with `arg` in the first
    /// integer argument register (`rdi`).
    ///
    /// # Safety
    /// Paging and EFER.LME must be enabled; `entry` must be a 64-bit
    /// function that never returns.
    unsafe fn far_transfer(&mut self, code: Selector, data: Selector, entry: u64, arg: u64) -> !;
}

/// Fail unless the CPU can run 64-bit code.
///
/// # Errors
/// [`TransitionError::UnsupportedFeature`] without CPUID.80000001H:EDX.LM.
pub fn require_long_mode(features: ExtendedFeatures) -> Result<(), TransitionError> {
    if features.long_mode() {
        Ok(())
    } else {
        Err(TransitionError::UnsupportedFeature("64-bit long mode"))
    }
}

/// 1 GiB leaves when requested and supported, else 2 MiB.
#[must_use]
pub fn select_page_size(features: ExtendedFeatures, large_pages_requested: bool) -> PageSize {
    match (large_pages_requested, features.page_1gb()) {
        (true, true) => PageSize::Size1G,
        (true, false) => {
            warn!("1 GiB pages requested but not supported; using 2 MiB pages");
            PageSize::Size2M
        }
        (false, _) => PageSize::Size2M,
    }
}

/// Initial state: the loader's own segments, unknown descriptor table.
pub struct RealMode<C> {
    cpu: C,
}

/// Boot GDT loaded, 32-bit flat segments active.
pub struct ProtectedMode<C> {
    cpu: C,
}

/// Identity map and long mode enabled, still executing 32-bit code.
pub struct PagingEnabled<C> {
    cpu: C,
}

impl<C: ModeSwitch> RealMode<C> {
    pub const MODE: Mode = Mode::RealMode;

    pub const fn new(cpu: C) -> Self {
        Self { cpu }
    }

    /// Mask interrupts, load `gdt` and switch to its 32-bit pair.
    ///
    /// # Safety
    /// `gdt` must describe the boot table (see [`crate::BOOT_GDT`]) and stay
    /// resident.
    pub unsafe fn enter_protected_mode(mut self, gdt: &GdtPointer) -> ProtectedMode<C> {
        unsafe {
            self.cpu.disable_interrupts();
            self.cpu.load_descriptor_table(gdt);
            self.cpu
                .reload_segments(Selector::PROTECTED_CODE, Selector::PROTECTED_DATA);
        }
        info!("Entered protected mode");
        ProtectedMode { cpu: self.cpu }
    }
}

impl<C: ModeSwitch> ProtectedMode<C> {
    pub const MODE: Mode = Mode::ProtectedMode;

    /// Access the CPU for work that must happen before paging, such as
    /// real-mode firmware calls.
    pub const fn cpu(&mut self) -> &mut C {
        &mut self.cpu
    }

    /// Turn on PAE paging with `map` and arm long mode.
    ///
    /// On error nothing has been changed.
    ///
    /// # Errors
    /// [`TransitionError::UnsupportedFeature`] if the CPU lacks long mode, or
    /// `map` uses 1 GiB pages the CPU cannot walk.
    ///
    /// # Safety
    /// `map` must be an identity map that stays resident.
    pub unsafe fn enable_paging(
        mut self,
        map: &IdentityMap,
        features: ExtendedFeatures,
    ) -> Result<PagingEnabled<C>, (Self, TransitionError)> {
        if let Err(e) = require_long_mode(features) {
            return Err((self, e));
        }
        if map.page_size() == PageSize::Size1G && !features.page_1gb() {
            return Err((self, TransitionError::UnsupportedFeature("1 GiB pages")));
        }

        unsafe {
            self.cpu.enable_paging(map.pml4_phys());
        }
        info!("Paging enabled, PML4 at {:#x}", map.pml4_phys());
        Ok(PagingEnabled { cpu: self.cpu })
    }
}

impl<C: ModeSwitch> PagingEnabled<C> {
    pub const MODE: Mode = Mode::PagingEnabled;

    /// Jump to 64-bit code and call `entry(boot_info)`.
    ///
    /// # Safety
    /// `entry` must be a loaded `extern "sysv64" fn(*const BootInfo) -> !`
    /// inside the identity map, and `boot_info` must point at the boot info.
    pub unsafe fn enter_long_mode(mut self, entry: u64, boot_info: u64) -> ! {
        info!("Entering long mode: entry {entry:#x}, boot info at {boot_info:#x}");
        unsafe {
            self.cpu
                .far_transfer(Selector::LONG_CODE, Selector::LONG_DATA, entry, boot_info)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BOOT_GDT;
    use crate::paging::build_identity_map;
    use boot_arena::Arena;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Op {
        Cli,
        Lgdt(u16, u64),
        Reload(u16, u16),
        Paging(u64),
        Far(u16, u16, u64, u64),
    }

    #[derive(Clone, Default)]
    struct Recorder(Arc<Mutex<Vec<Op>>>);

    impl Recorder {
        fn ops(&self) -> Vec<Op> {
            self.0.lock().unwrap().clone()
        }
        fn push(&self, op: Op) {
            self.0.lock().unwrap().push(op);
        }
    }

    unsafe impl ModeSwitch for Recorder {
        unsafe fn disable_interrupts(&mut self) {
            self.push(Op::Cli);
        }
        unsafe fn load_descriptor_table(&mut self, gdt: &GdtPointer) {
            let (limit, base) = (gdt.limit, gdt.base);
            self.push(Op::Lgdt(limit, base));
        }
        unsafe fn reload_segments(&mut self, code: Selector, data: Selector) {
            self.push(Op::Reload(code.encode(), data.encode()));
        }
        unsafe fn enable_paging(&mut self, pml4_phys: u64) {
            self.push(Op::Paging(pml4_phys));
        }
        unsafe fn far_transfer(&mut self, code: Selector, data: Selector, entry: u64, arg: u64) -> ! {
            self.push(Op::Far(code.encode(), data.encode(), entry, arg));
            panic!("transferred");
        }
    }

    fn long_mode_cpu() -> ExtendedFeatures {
        ExtendedFeatures::new().with_long_mode(true)
    }

    #[test]
    fn transitions_run_in_order() {
        let mut backing = vec![0u8; 0x8000];
        let mut arena = Arena::new(&mut backing, 0x20_0000);
        let map = build_identity_map(&mut arena, PageSize::Size2M).unwrap();
        let gdt = BOOT_GDT.pointer();
        let recorder = Recorder::default();

        let cpu = recorder.clone();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || unsafe {
            let protected = RealMode::new(cpu).enter_protected_mode(&gdt);
            let paging = protected.enable_paging(&map, long_mode_cpu()).ok().unwrap();
            paging.enter_long_mode(0x10_0040, 0x30_0000);
        }));
        assert!(result.is_err());

        let (limit, base) = (gdt.limit, gdt.base);
        assert_eq!(
            recorder.ops(),
            [
                Op::Cli,
                Op::Lgdt(limit, base),
                Op::Reload(0x18, 0x20),
                Op::Paging(map.pml4_phys()),
                Op::Far(0x28, 0x30, 0x10_0040, 0x30_0000),
            ]
        );
    }

    #[test]
    fn missing_long_mode_stops_before_paging() {
        let mut backing = vec![0u8; 0x8000];
        let mut arena = Arena::new(&mut backing, 0);
        let map = build_identity_map(&mut arena, PageSize::Size2M).unwrap();
        let recorder = Recorder::default();

        let protected = unsafe { RealMode::new(recorder.clone()).enter_protected_mode(&BOOT_GDT.pointer()) };
        let Err((_, e)) = (unsafe { protected.enable_paging(&map, ExtendedFeatures::new()) }) else {
            panic!("paging enabled without long mode");
        };
        assert_eq!(e, TransitionError::UnsupportedFeature("64-bit long mode"));
        assert!(!recorder.ops().iter().any(|op| matches!(op, Op::Paging(_))));
    }

    #[test]
    fn giant_pages_need_cpu_support() {
        let mut backing = vec![0u8; 0x4000];
        let mut arena = Arena::new(&mut backing, 0);
        let map = build_identity_map(&mut arena, PageSize::Size1G).unwrap();
        let recorder = Recorder::default();

        let protected = unsafe { RealMode::new(recorder.clone()).enter_protected_mode(&BOOT_GDT.pointer()) };
        let result = unsafe { protected.enable_paging(&map, long_mode_cpu()) };
        assert!(matches!(
            result,
            Err((_, TransitionError::UnsupportedFeature("1 GiB pages")))
        ));
    }

    #[test]
    fn page_size_selection() {
        let plain = long_mode_cpu();
        let giant = plain.with_page_1gb(true);
        assert_eq!(select_page_size(giant, true), PageSize::Size1G);
        assert_eq!(select_page_size(giant, false), PageSize::Size2M);
        assert_eq!(select_page_size(plain, true), PageSize::Size2M);
        assert_eq!(select_page_size(plain, false), PageSize::Size2M);
    }

    #[test]
    fn modes_are_ordered() {
        assert!(RealMode::<Recorder>::MODE < ProtectedMode::<Recorder>::MODE);
        assert!(ProtectedMode::<Recorder>::MODE < PagingEnabled::<Recorder>::MODE);
        assert!(PagingEnabled::<Recorder>::MODE < Mode::LongMode);
    }
}
