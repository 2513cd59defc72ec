use boot_arena::Arena;
use boot_elf::{AllocationError, PhysicalMemory};
use boot_pipeline::BootError;
use log::{debug, warn};
use uefi::boot::{self, AllocateType, MemoryType, PAGE_SIZE};

/// Pages backing the loader's arena: kernel file, configuration, scratch
/// directories and the boot info.
pub const ARENA_PAGES: usize = 4096;

/// `AllocatePages(AllocateAddress)` for kernel segments. UEFI runs identity
/// mapped, so the returned pages are directly writable.
pub struct UefiPages;

impl PhysicalMemory for UefiPages {
    fn allocate_at(&mut self, phys: u64, pages: usize) -> Result<&mut [u8], AllocationError> {
        let error = AllocationError { phys, pages };
        let ptr = boot::allocate_pages(AllocateType::Address(phys), MemoryType::LOADER_DATA, pages)
            .map_err(|e| {
                warn!("AllocatePages({phys:#x}, {pages}) failed: {:?}", e.status());
                error
            })?;

        // SAFETY: the firmware just handed us `pages` pages at `ptr`, and
        // they stay allocated for the rest of the boot.
        Ok(unsafe { core::slice::from_raw_parts_mut(ptr.as_ptr(), pages * PAGE_SIZE) })
    }
}

/// Allocate [`ARENA_PAGES`] pages anywhere and manage them as the arena.
///
/// # Errors
/// [`BootError::OutOfMemory`] if the firmware has no room.
pub fn allocate_arena() -> Result<Arena<'static>, BootError> {
    let ptr = boot::allocate_pages(AllocateType::AnyPages, MemoryType::LOADER_DATA, ARENA_PAGES)
        .map_err(|e| {
            warn!("Unable to allocate the arena: {:?}", e.status());
            BootError::OutOfMemory
        })?;

    let base = ptr.as_ptr() as u64;
    let len = ARENA_PAGES * PAGE_SIZE;
    debug!("Arena at {base:#x} ({len} bytes)");

    // SAFETY: freshly allocated LOADER_DATA pages, identity mapped, never
    // freed.
    Ok(unsafe { Arena::from_identity_mapped(base, len) })
}
