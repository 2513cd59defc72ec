//! # Low Memory Layout
//!
//! Fixed physical addresses the loader uses below 1 MiB. Everything the
//! BIOS reads or writes lives here, since real-mode code only reaches the
//! first megabyte.
//!
//! ```text
//! 0x0000_0000 ┌──────────────────────────┐
//!             │ IVT + BDA                │
//! 0x0000_0500 ├──────────────────────────┤
//!             │ real-mode stack          │ ↓ from 0x1000
//! 0x0000_1000 ├──────────────────────────┤
//!             │ DAP, drive parameters,   │
//!             │ E820 entry, VBE blocks   │
//! 0x0000_8000 ├──────────────────────────┤
//!             │ loader image             │
//! 0x0006_0000 ├──────────────────────────┤
//!             │ protected-mode stack     │ ↓ from 0x7_0000
//! 0x0007_0000 ├──────────────────────────┤
//!             │ disk bounce buffer       │
//! 0x0007_8000 └──────────────────────────┘
//! ```

/// Top of the stack the call gate switches to in real mode.
pub const REAL_MODE_STACK_TOP: u32 = 0x1000;

/// INT 13h disk address packet.
pub const DISK_ADDRESS_PACKET: u32 = 0x1000;

/// INT 13h AH=48h result buffer.
pub const DRIVE_PARAMETERS: u32 = 0x1040;

/// One INT 15h E820 descriptor.
pub const E820_ENTRY: u32 = 0x1100;

/// VBE controller information block (512 bytes).
pub const VBE_CONTROLLER_INFO: u32 = 0x1200;

/// VBE mode information block (256 bytes).
pub const VBE_MODE_INFO: u32 = 0x1400;

/// Top of the protected-mode stack `_start` sets up.
pub const PROTECTED_MODE_STACK_TOP: u32 = 0x7_0000;

/// Disk reads land here before being copied to their destination.
pub const BOUNCE_BUFFER: u32 = 0x7_0000;

/// 16 ISO blocks, or 64 sectors of 512 bytes.
pub const BOUNCE_BUFFER_LEN: usize = 0x8000;

/// Real-mode segment of a linear address below 1 MiB.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub const fn segment(linear: u32) -> u16 {
    ((linear - (linear & 0xFFFF)) >> 4) as u16
}

/// Real-mode offset of a linear address below 1 MiB.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub const fn offset(linear: u32) -> u16 {
    (linear & 0xFFFF) as u16
}

/// Linear address of a `segment:offset` far pointer.
#[must_use]
pub fn linear(segment: u16, offset: u16) -> u32 {
    (u32::from(segment) << 4) + u32::from(offset)
}

const _: () = {
    assert!(REAL_MODE_STACK_TOP <= DISK_ADDRESS_PACKET);
    assert!(REAL_MODE_STACK_TOP <= 0xFFFF);
    assert!(VBE_MODE_INFO + 256 <= 0x8000);
    assert!(BOUNCE_BUFFER as usize + BOUNCE_BUFFER_LEN <= 0x8_0000);
    assert!(BOUNCE_BUFFER_LEN % 2048 == 0);
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn real_mode_stack_is_reachable_from_segment_zero() {
        // The gate loads SS=0 and clears ESP before setting SP.
        let sp = u16::try_from(REAL_MODE_STACK_TOP).unwrap();
        assert_eq!(linear(0, sp), REAL_MODE_STACK_TOP);
        assert_eq!(segment(REAL_MODE_STACK_TOP), 0);
    }

    #[test]
    fn far_pointers_reach_the_same_byte() {
        for addr in [0x1000, 0x7_0000, 0x7_1234, 0x9_FFFF] {
            assert_eq!(linear(segment(addr), offset(addr)), addr);
        }
        assert_eq!(segment(0x7_0000), 0x7000);
        assert_eq!(offset(0x7_0000), 0);
        assert_eq!(segment(0x1400), 0);
        assert_eq!(offset(0x1400), 0x1400);
    }

    #[test]
    fn vbe_style_far_pointer() {
        assert_eq!(linear(0xC000, 0x0010), 0xC_0010);
    }
}
