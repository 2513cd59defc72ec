//! # Identity Page Tables
//!
//! Long mode cannot be entered without paging, so the BIOS path builds a
//! 4-level hierarchy in which every virtual address equals its physical
//! address. Only large leaves are used:
//!
//! ```text
//! 2 MiB pages (first 4 GiB)             1 GiB pages (first 512 GiB)
//!
//! PML4[0] ─▶ PDPT[0..4] ─▶ PD 0..3       PML4[0] ─▶ PDPT[0..512] (leaves)
//!                         512 × 2 MiB
//! ```
//!
//! All tables are carved from the boot arena, 4 KiB aligned and zeroed.

use bitfield_struct::bitfield;
use boot_arena::{Arena, ArenaError, ArenaSlot};
use log::debug;

const TABLE_BYTES: usize = 4096;
const ENTRIES: usize = 512;

/// Leaf size of an identity map.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum PageSize {
    Size2M,
    Size1G,
}

impl PageSize {
    #[must_use]
    pub const fn bytes(self) -> u64 {
        match self {
            Self::Size2M => 1 << 21,
            Self::Size1G => 1 << 30,
        }
    }

    /// Bytes of physical address space the map covers.
    #[must_use]
    pub const fn coverage(self) -> u64 {
        match self {
            Self::Size2M => 4 << 30,
            Self::Size1G => 512 << 30,
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum PagingError {
    #[error("Out of memory for page tables")]
    OutOfMemory(#[from] ArenaError),
}

/// L4 **PML4E**: points to a PDPT.
#[bitfield(u64)]
pub struct Pml4e {
    pub present: bool,
    pub writable: bool,
    pub user: bool,
    pub write_through: bool,
    pub cache_disable: bool,
    pub accessed: bool,
    #[bits(1)]
    __ignored6: u8,
    /// Must be 0.
    #[bits(1)]
    __ps: u8,
    #[bits(4)]
    __ignored8_11: u8,
    /// Next-level table physical address (bits 12..51).
    #[bits(40)]
    phys_addr_51_12: u64,
    #[bits(11)]
    __ignored52_62: u16,
    pub no_execute: bool,
}

impl Pml4e {
    #[must_use]
    pub const fn table(phys: u64) -> Self {
        Self::new()
            .with_present(true)
            .with_writable(true)
            .with_phys_addr_51_12(phys >> 12)
    }

    #[must_use]
    pub const fn physical_address(self) -> u64 {
        self.phys_addr_51_12() << 12
    }
}

/// L3 **PDPTE** pointing to a page directory (`PS = 0`).
#[bitfield(u64)]
pub struct Pdpte {
    pub present: bool,
    pub writable: bool,
    pub user: bool,
    pub write_through: bool,
    pub cache_disable: bool,
    pub accessed: bool,
    #[bits(1)]
    __ignored6: u8,
    /// Page Size (bit 7): must be 0 here.
    pub page_size: bool,
    #[bits(4)]
    __ignored8_11: u8,
    #[bits(40)]
    phys_addr_51_12: u64,
    #[bits(11)]
    __ignored52_62: u16,
    pub no_execute: bool,
}

impl Pdpte {
    #[must_use]
    pub const fn table(phys: u64) -> Self {
        Self::new()
            .with_present(true)
            .with_writable(true)
            .with_phys_addr_51_12(phys >> 12)
    }

    #[must_use]
    pub const fn physical_address(self) -> u64 {
        self.phys_addr_51_12() << 12
    }
}

/// L3 **PDPTE (1 GiB leaf)** (`PS = 1`).
#[bitfield(u64)]
pub struct Pdpte1G {
    pub present: bool,
    pub writable: bool,
    pub user: bool,
    pub write_through: bool,
    pub cache_disable: bool,
    pub accessed: bool,
    pub dirty: bool,
    /// **Page Size** (bit 7): **must be 1** for a 1 GiB leaf.
    #[bits(default = true)]
    pub page_size: bool,
    pub global: bool,
    #[bits(3)]
    __os_low: u8,
    pub pat_large: bool,
    /// Reserved (bits 13..29): must be 0.
    #[bits(17)]
    __res13_29: u32,
    /// Physical address bits **51:30**.
    #[bits(22)]
    phys_addr_51_30: u32,
    #[bits(11)]
    __ignored52_62: u16,
    pub no_execute: bool,
}

impl Pdpte1G {
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn leaf(phys: u64) -> Self {
        Self::new()
            .with_present(true)
            .with_writable(true)
            .with_phys_addr_51_30((phys >> 30) as u32)
    }

    #[must_use]
    pub const fn physical_address(self) -> u64 {
        (self.phys_addr_51_30() as u64) << 30
    }
}

/// L2 **PDE (2 MiB leaf)** (`PS = 1`).
#[bitfield(u64)]
pub struct Pde2M {
    pub present: bool,
    pub writable: bool,
    pub user: bool,
    pub write_through: bool,
    pub cache_disable: bool,
    pub accessed: bool,
    pub dirty: bool,
    /// **Page Size** (bit 7): **must be 1** for a 2 MiB leaf.
    #[bits(default = true)]
    pub page_size: bool,
    pub global: bool,
    #[bits(3)]
    __os_low: u8,
    pub pat_large: bool,
    /// Reserved (bits 13..20): must be 0.
    #[bits(8)]
    __res13_20: u8,
    /// Physical address bits **51:21**.
    #[bits(31)]
    phys_addr_51_21: u32,
    #[bits(11)]
    __ignored52_62: u16,
    pub no_execute: bool,
}

impl Pde2M {
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn leaf(phys: u64) -> Self {
        Self::new()
            .with_present(true)
            .with_writable(true)
            .with_phys_addr_51_21((phys >> 21) as u32)
    }

    #[must_use]
    pub const fn physical_address(self) -> u64 {
        (self.phys_addr_51_21() as u64) << 21
    }
}

/// A built identity map; the tables live in the arena.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct IdentityMap {
    page_size: PageSize,
    pml4: ArenaSlot,
    pdpt: ArenaSlot,
    /// Four consecutive page directories (2 MiB maps only).
    directories: Option<ArenaSlot>,
    pml4_phys: u64,
}

impl IdentityMap {
    /// Value for CR3.
    #[must_use]
    pub const fn pml4_phys(&self) -> u64 {
        self.pml4_phys
    }

    #[must_use]
    pub const fn page_size(&self) -> PageSize {
        self.page_size
    }

    /// Raw entries of the PML4.
    #[must_use]
    pub fn pml4<'a>(&self, arena: &'a Arena<'_>) -> TableView<'a> {
        TableView(arena.bytes(self.pml4))
    }

    #[must_use]
    pub fn pdpt<'a>(&self, arena: &'a Arena<'_>) -> TableView<'a> {
        TableView(arena.bytes(self.pdpt))
    }

    /// Page directory `n` (0..4) of a 2 MiB map.
    #[must_use]
    pub fn directory<'a>(&self, arena: &'a Arena<'_>, n: usize) -> Option<TableView<'a>> {
        let all = arena.bytes(self.directories?);
        all.get(n * TABLE_BYTES..(n + 1) * TABLE_BYTES).map(TableView)
    }

    /// Walk the tables for `virt`; `None` if it is not mapped.
    #[must_use]
    pub fn translate(&self, arena: &Arena<'_>, virt: u64) -> Option<u64> {
        let l4 = usize::try_from((virt >> 39) & 0x1FF).ok()?;
        let l3 = usize::try_from((virt >> 30) & 0x1FF).ok()?;
        let l2 = usize::try_from((virt >> 21) & 0x1FF).ok()?;

        let pml4e = Pml4e::from_bits(self.pml4(arena).entry(l4));
        if !pml4e.present() || pml4e.physical_address() != arena.phys_addr(self.pdpt) {
            return None;
        }

        let raw = self.pdpt(arena).entry(l3);
        match self.page_size {
            PageSize::Size1G => {
                let leaf = Pdpte1G::from_bits(raw);
                (leaf.present() && leaf.page_size())
                    .then(|| leaf.physical_address() | (virt & (PageSize::Size1G.bytes() - 1)))
            }
            PageSize::Size2M => {
                let table = Pdpte::from_bits(raw);
                if !table.present() || table.page_size() {
                    return None;
                }
                let dirs = self.directories?;
                let offset = table
                    .physical_address()
                    .checked_sub(arena.phys_addr(dirs))
                    .and_then(|o| usize::try_from(o).ok())?;
                let dir = TableView(arena.bytes(dirs).get(offset..offset + TABLE_BYTES)?);
                let leaf = Pde2M::from_bits(dir.entry(l2));
                (leaf.present() && leaf.page_size())
                    .then(|| leaf.physical_address() | (virt & (PageSize::Size2M.bytes() - 1)))
            }
        }
    }
}

/// Read-only view of one 512-entry table.
#[derive(Debug, Copy, Clone)]
pub struct TableView<'a>(&'a [u8]);

impl TableView<'_> {
    /// # Panics
    /// If `index >= 512`.
    #[must_use]
    pub fn entry(&self, index: usize) -> u64 {
        let raw = &self.0[index * 8..index * 8 + 8];
        u64::from_le_bytes([raw[0], raw[1], raw[2], raw[3], raw[4], raw[5], raw[6], raw[7]])
    }

    pub fn entries(&self) -> impl Iterator<Item = u64> + '_ {
        (0..ENTRIES).map(|i| self.entry(i))
    }
}

fn write_entry(arena: &mut Arena<'_>, table: ArenaSlot, index: usize, value: u64) {
    arena.bytes_mut(table)[index * 8..index * 8 + 8].copy_from_slice(&value.to_le_bytes());
}

/// Build an identity map with `page_size` leaves in `arena`.
///
/// # Errors
/// [`PagingError::OutOfMemory`] if the arena cannot hold the tables; the
/// arena is left as it was.
pub fn build_identity_map(
    arena: &mut Arena<'_>,
    page_size: PageSize,
) -> Result<IdentityMap, PagingError> {
    let mark = arena.mark();
    let result = build(arena, page_size);
    if result.is_err() {
        arena.release(mark);
    }
    result
}

fn build(arena: &mut Arena<'_>, page_size: PageSize) -> Result<IdentityMap, PagingError> {
    let directories = match page_size {
        PageSize::Size2M => Some(arena.alloc_zeroed(4 * TABLE_BYTES, TABLE_BYTES)?),
        PageSize::Size1G => None,
    };
    let pdpt = arena.alloc_zeroed(TABLE_BYTES, TABLE_BYTES)?;
    let pml4 = arena.alloc_zeroed(TABLE_BYTES, TABLE_BYTES)?;

    let step = page_size.bytes();
    match directories {
        Some(dirs) => {
            let dirs_phys = arena.phys_addr(dirs);
            for i in 0..4 * ENTRIES {
                write_entry(arena, dirs, i, Pde2M::leaf(i as u64 * step).into_bits());
            }
            for n in 0..4 {
                let table = dirs_phys + (n * TABLE_BYTES) as u64;
                write_entry(arena, pdpt, n, Pdpte::table(table).into_bits());
            }
        }
        None => {
            for i in 0..ENTRIES {
                write_entry(arena, pdpt, i, Pdpte1G::leaf(i as u64 * step).into_bits());
            }
        }
    }
    write_entry(arena, pml4, 0, Pml4e::table(arena.phys_addr(pdpt)).into_bits());

    let map = IdentityMap {
        page_size,
        pml4,
        pdpt,
        directories,
        pml4_phys: arena.phys_addr(pml4),
    };
    debug!(
        "Identity map: {:?} pages over {} GiB, PML4 at {:#x}",
        page_size,
        page_size.coverage() >> 30,
        map.pml4_phys
    );
    Ok(map)
}
