use boot_elf::builder::{ElfBuilder, RamWindow};
use boot_elf::{AllocationError, ElfError, ElfImage, LoadOptions, PFlags, PhysicalMemory};

const BASE: u64 = 0x10_0000;

fn kernel() -> Vec<u8> {
    let text: Vec<u8> = (0..=255).collect();
    ElfBuilder::new(BASE + 0x40)
        .segment(BASE, PFlags::new().with_read(true).with_execute(true), &text, 0)
        .note(b"AmberOS")
        .segment(
            BASE + 0x1000,
            PFlags::new().with_read(true).with_write(true),
            b"rodata and data",
            0x800,
        )
        .build()
}

#[test]
fn only_loadable_segments_reach_memory() {
    let bytes = kernel();
    let image = ElfImage::parse(&bytes).unwrap();
    let mut ram = RamWindow::filled(BASE, 0x4000, 0xCC);

    let loaded = image.load_segments(&mut ram, LoadOptions::default()).unwrap();
    assert_eq!(loaded.entry(), BASE + 0x40);
    assert_eq!(loaded.segments().len(), 2);

    let text: Vec<u8> = (0..=255).collect();
    assert_eq!(ram.read(BASE, 256), text.as_slice());
    assert_eq!(ram.read(BASE + 0x1000, 15), b"rodata and data");

    // Untouched: the gap between the segments and everything past the bss.
    assert!(ram.read(BASE + 256, 0x1000 - 256).iter().all(|&b| b == 0xCC));
    assert!(ram.read(BASE + 0x2000, 0x2000).iter().all(|&b| b == 0xCC));
}

#[test]
fn rejected_images_never_touch_memory() {
    let good = kernel();
    // magic, class, data, type, machine
    for (offset, value) in [(1, b'X'), (4, 1), (5, 2), (16, 1), (18, 40)] {
        let mut bad = good.clone();
        bad[offset] = value;

        let mut ram = RamWindow::filled(BASE, 0x4000, 0xCC);
        let result = ElfImage::parse(&bad)
            .and_then(|image| image.load_segments(&mut ram, LoadOptions::default()));
        assert!(
            matches!(result, Err(ElfError::UnsupportedFormat(_))),
            "byte {offset}"
        );
        assert!(ram.allocations().is_empty());
        assert!(ram.read(BASE, 0x4000).iter().all(|&b| b == 0xCC));
    }
}

#[test]
fn huge_memory_size_is_refused_without_writing() {
    let paddr = BASE + 0x10;
    let bytes = ElfBuilder::new(paddr)
        .segment(paddr, PFlags::new().with_read(true), b"tiny", 0)
        .memsz_override(0, u64::MAX - paddr)
        .build();
    let image = ElfImage::parse(&bytes).unwrap();
    let mut ram = RamWindow::filled(BASE, 0x4000, 0xCC);

    let result = image.load_segments(&mut ram, LoadOptions::default());
    assert!(matches!(result, Err(ElfError::Allocation(_))));
    assert!(ram.allocations().is_empty());
    assert!(ram.read(BASE, 0x4000).iter().all(|&b| b == 0xCC));
}

/// Hands back fewer bytes than were asked for.
struct ShortWindow([u8; 0x100]);

impl PhysicalMemory for ShortWindow {
    fn allocate_at(&mut self, _phys: u64, _pages: usize) -> Result<&mut [u8], AllocationError> {
        Ok(&mut self.0)
    }
}

#[test]
fn short_allocation_is_an_error() {
    let bytes = kernel();
    let image = ElfImage::parse(&bytes).unwrap();
    let mut memory = ShortWindow([0; 0x100]);

    let result = image.load_segments(&mut memory, LoadOptions::default());
    assert_eq!(
        result.unwrap_err(),
        ElfError::UnsupportedFormat("segment outside its allocation")
    );
}
