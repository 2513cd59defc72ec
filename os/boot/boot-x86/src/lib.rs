//! # x86 Privilege and Paging Bootstrap
//!
//! Everything the BIOS path needs to get from 32-bit protected mode to a
//! 64-bit kernel entry point:
//!
//! - [`gdt`]: the boot descriptor table with 16-, 32- and 64-bit code/data
//!   pairs, and a pure descriptor encoder/decoder.
//! - [`paging`]: identity page tables built in the boot arena.
//! - [`transition`]: the mode state machine
//!   `RealMode → ProtectedMode → PagingEnabled → LongMode`, driven through
//!   the [`ModeSwitch`] trait so the ordering logic runs on the host.
//!
//! Nothing in this crate executes privileged instructions itself; the BIOS
//! loader supplies a [`ModeSwitch`] implementation that does.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

pub mod gdt;
pub mod paging;
pub mod transition;

pub use gdt::{BOOT_GDT, BootGdt, GdtPointer, SegmentDescriptor, Selector};
pub use paging::{IdentityMap, PageSize, PagingError, build_identity_map};
pub use transition::{
    Mode, ModeSwitch, PagingEnabled, ProtectedMode, RealMode, TransitionError,
    require_long_mode, select_page_size,
};
