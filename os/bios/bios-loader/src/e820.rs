//! # Physical Memory on the BIOS Path
//!
//! The INT 15h E820 map decides two things: where the arena goes, and
//! which physical ranges kernel segments may be placed at. Both are
//! restricted to usable RAM between 1 MiB and 4 GiB; below 1 MiB belongs
//! to the loader and the BIOS, and above 4 GiB is out of reach of 32-bit
//! pointers.

use boot_elf::{AllocationError, PhysicalMemory};
use boot_pipeline::BootError;
use log::{debug, info, warn};

/// E820 type of RAM free for use.
pub const USABLE: u32 = 1;

/// Most descriptors kept from the BIOS map.
pub const MAX_REGIONS: usize = 64;

/// Most ranges [`BiosMemory`] hands out.
const MAX_CLAIMS: usize = 32;

/// Arena size taken from the top of the largest region.
pub const ARENA_SIZE: u64 = 16 * 1024 * 1024;

const ONE_MIB: u64 = 0x10_0000;
const FOUR_GIB: u64 = 0x1_0000_0000;
const PAGE_SIZE: u64 = 4096;

/// One E820 descriptor as the BIOS writes it.
#[repr(C, packed)]
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
pub struct E820Entry {
    pub base: u64,
    pub length: u64,
    pub kind: u32,
}

const _: () = assert!(size_of::<E820Entry>() == 20);

/// A half-open physical range `[start, end)`.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Region {
    pub start: u64,
    pub end: u64,
}

impl Region {
    #[must_use]
    pub const fn len(&self) -> u64 {
        self.end - self.start
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    #[must_use]
    pub const fn contains(&self, other: &Self) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    #[must_use]
    pub const fn overlaps(&self, other: &Self) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// Usable RAM reported by the BIOS, clipped to `[1 MiB, 4 GiB)`.
#[derive(Debug, Clone)]
pub struct MemoryMap {
    regions: [Region; MAX_REGIONS],
    len: usize,
}

impl MemoryMap {
    /// Keep the usable entries, clipped and page aligned inwards.
    #[must_use]
    pub fn from_entries<I: IntoIterator<Item = E820Entry>>(entries: I) -> Self {
        let mut map = Self {
            regions: [Region { start: 0, end: 0 }; MAX_REGIONS],
            len: 0,
        };

        for entry in entries {
            let (base, length, kind) = (entry.base, entry.length, entry.kind);
            debug!("E820 {base:#012x}..{:#012x} type {kind}", base.saturating_add(length));
            if kind != USABLE {
                continue;
            }

            let start = base.max(ONE_MIB).next_multiple_of(PAGE_SIZE);
            let end = base.saturating_add(length).min(FOUR_GIB) & !(PAGE_SIZE - 1);
            let region = Region { start, end };
            if region.is_empty() {
                continue;
            }
            if map.len == MAX_REGIONS {
                warn!("E820 map has more than {MAX_REGIONS} usable regions; ignoring the rest");
                break;
            }
            map.regions[map.len] = region;
            map.len += 1;
        }
        map
    }

    #[must_use]
    pub fn regions(&self) -> &[Region] {
        &self.regions[..self.len]
    }

    /// The largest usable region.
    #[must_use]
    pub fn largest(&self) -> Option<Region> {
        self.regions()
            .iter()
            .copied()
            .reduce(|best, r| if r.len() > best.len() { r } else { best })
    }

    /// The top [`ARENA_SIZE`] bytes of the largest region, or all of it if
    /// it is smaller.
    ///
    /// # Errors
    /// [`BootError::OutOfMemory`] without usable memory above 1 MiB.
    pub fn arena_region(&self) -> Result<Region, BootError> {
        let largest = self.largest().ok_or(BootError::OutOfMemory)?;
        let start = largest.end.saturating_sub(ARENA_SIZE).max(largest.start);
        Ok(Region {
            start,
            end: largest.end,
        })
    }

    /// Whether `range` lies entirely inside one usable region.
    #[must_use]
    pub fn is_usable(&self, range: &Region) -> bool {
        self.regions().iter().any(|r| r.contains(range))
    }
}

/// Read the E820 map with INT 15h EAX=E820h.
///
/// # Errors
/// [`BootError::UnsupportedFeature`] if the BIOS does not implement the
/// service.
#[cfg(target_arch = "x86")]
pub fn read_memory_map() -> Result<MemoryMap, BootError> {
    use crate::layout::{self, E820_ENTRY};
    use crate::realmode::{RealModeRegs, bios_call};

    const SMAP: u32 = u32::from_be_bytes(*b"SMAP");

    let mut entries = [E820Entry::default(); MAX_REGIONS];
    let mut count = 0;
    let mut continuation = 0;
    loop {
        let mut regs = RealModeRegs {
            eax: 0xE820,
            ebx: continuation,
            ecx: 24,
            edx: SMAP,
            edi: u32::from(layout::offset(E820_ENTRY)),
            es: layout::segment(E820_ENTRY),
            ..RealModeRegs::default()
        };
        // SAFETY: the BIOS writes one descriptor of at most 24 bytes to the
        // reserved E820 slot.
        unsafe { bios_call(0x15, &mut regs) };

        if regs.carry() || regs.eax != SMAP {
            if count == 0 {
                return Err(BootError::UnsupportedFeature("INT 15h E820"));
            }
            break;
        }

        // SAFETY: as above.
        entries[count] =
            unsafe { (E820_ENTRY as usize as *const E820Entry).read_unaligned() };
        count += 1;

        continuation = regs.ebx;
        if continuation == 0 || count == MAX_REGIONS {
            break;
        }
    }

    info!("E820 reported {count} entries");
    Ok(MemoryMap::from_entries(entries.into_iter().take(count)))
}

/// Kernel segment placement within usable RAM, away from the arena and
/// from each other.
pub struct BiosMemory {
    map: MemoryMap,
    claims: [Region; MAX_CLAIMS],
    claimed: usize,
}

impl BiosMemory {
    /// Placement over `map`, with `arena` already taken.
    #[must_use]
    pub fn new(map: MemoryMap, arena: Region) -> Self {
        let mut claims = [Region { start: 0, end: 0 }; MAX_CLAIMS];
        claims[0] = arena;
        Self {
            map,
            claims,
            claimed: 1,
        }
    }

    /// Reserve `[phys, phys + pages * 4 KiB)`.
    ///
    /// # Errors
    /// The range is not usable RAM, overlaps an earlier claim, or the
    /// claim table is full.
    pub fn claim(&mut self, phys: u64, pages: usize) -> Result<Region, AllocationError> {
        let error = AllocationError { phys, pages };
        let len = u64::try_from(pages)
            .ok()
            .and_then(|p| p.checked_mul(PAGE_SIZE))
            .ok_or(error)?;
        let range = Region {
            start: phys,
            end: phys.checked_add(len).ok_or(error)?,
        };

        if !self.map.is_usable(&range) {
            warn!("{:#x}..{:#x} is not usable RAM", range.start, range.end);
            return Err(error);
        }
        if let Some(taken) = self.claims[..self.claimed].iter().find(|c| c.overlaps(&range)) {
            warn!(
                "{:#x}..{:#x} overlaps {:#x}..{:#x}",
                range.start, range.end, taken.start, taken.end
            );
            return Err(error);
        }
        if self.claimed == MAX_CLAIMS {
            return Err(error);
        }

        self.claims[self.claimed] = range;
        self.claimed += 1;
        Ok(range)
    }
}

impl PhysicalMemory for BiosMemory {
    fn allocate_at(&mut self, phys: u64, pages: usize) -> Result<&mut [u8], AllocationError> {
        let range = self.claim(phys, pages)?;
        let len = usize::try_from(range.len()).map_err(|_| AllocationError { phys, pages })?;
        let ptr = usize::try_from(range.start).map_err(|_| AllocationError { phys, pages })? as *mut u8;

        // SAFETY: the range is usable RAM below 4 GiB, claimed exactly once,
        // and physical addresses equal linear ones before paging.
        Ok(unsafe { core::slice::from_raw_parts_mut(ptr, len) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const fn entry(base: u64, length: u64, kind: u32) -> E820Entry {
        E820Entry { base, length, kind }
    }

    fn qemu_map() -> MemoryMap {
        MemoryMap::from_entries([
            entry(0, 0x9_FC00, USABLE),
            entry(0x9_FC00, 0x400, 2),
            entry(0xF_0000, 0x1_0000, 2),
            entry(0x10_0000, 0x7FE_0000, USABLE),
            entry(0x7FE_0000, 0x2_0000, 2),
            entry(0xFFFC_0000, 0x4_0000, 2),
            entry(0x1_0000_0000, 0x4000_0000, USABLE),
        ])
    }

    #[test]
    fn low_memory_and_high_memory_are_clipped() {
        let map = qemu_map();
        assert_eq!(
            map.regions(),
            &[Region {
                start: 0x10_0000,
                end: 0x7FE_0000
            }]
        );
    }

    #[test]
    fn arena_takes_the_top_of_the_largest_region() {
        let map = MemoryMap::from_entries([
            entry(0x10_0000, 0x10_0000, USABLE),
            entry(0x200_0000, 0x4000_0000, USABLE),
        ]);
        let arena = map.arena_region().unwrap();
        assert_eq!(arena.end, 0x4200_0000);
        assert_eq!(arena.len(), ARENA_SIZE);
    }

    #[test]
    fn small_regions_are_used_whole() {
        let map = MemoryMap::from_entries([entry(0x10_0000, 0x40_0000, USABLE)]);
        let arena = map.arena_region().unwrap();
        assert_eq!(arena.start, 0x10_0000);
        assert_eq!(arena.end, 0x50_0000);
    }

    #[test]
    fn no_memory_above_one_mib() {
        let map = MemoryMap::from_entries([entry(0, 0x9_FC00, USABLE)]);
        assert!(matches!(map.arena_region(), Err(BootError::OutOfMemory)));
    }

    #[test]
    fn unaligned_entries_shrink_to_whole_pages() {
        let map = MemoryMap::from_entries([entry(0x10_0800, 0x1_0000, USABLE)]);
        assert_eq!(
            map.regions(),
            &[Region {
                start: 0x10_1000,
                end: 0x11_0000
            }]
        );
    }

    #[test]
    fn claims_must_be_usable_and_disjoint() {
        let map = qemu_map();
        let arena = map.arena_region().unwrap();
        let mut memory = BiosMemory::new(map, arena);

        assert!(memory.claim(0x10_0000, 4).is_ok());
        assert!(memory.claim(0x10_3000, 1).is_err(), "overlaps the first claim");
        assert!(memory.claim(0x10_4000, 1).is_ok());
        assert!(memory.claim(0x9_F000, 1).is_err(), "below 1 MiB");
        assert!(memory.claim(arena.start, 1).is_err(), "inside the arena");
        assert!(memory.claim(0x7FD_F000, 2).is_err(), "runs past usable RAM");
    }
}
