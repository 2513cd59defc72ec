use std::{env, path::PathBuf};

/// Physical address stage 1 loads this image to. Must match `bios-loader.ld`
/// and lie below 64 KiB so the real-mode call gate is addressable with
/// segment 0.
const LOAD_ADDRESS: u32 = 0x8000;

fn main() {
    let manifest_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap());
    let ld = manifest_dir.join("bios-loader.ld");

    assert_eq!(
        LOAD_ADDRESS & 0xfff,
        0,
        "LOAD_ADDRESS must be 4 KiB aligned (got {LOAD_ADDRESS:#x})"
    );
    assert!(LOAD_ADDRESS < 0x1_0000, "the call gate must sit below 64 KiB");

    println!("cargo:rerun-if-changed={}", ld.display());
    println!("cargo:rustc-link-arg-bins=-T{}", ld.display());
    println!("cargo:rustc-link-arg-bins=--defsym=LOAD_ADDRESS={LOAD_ADDRESS:#x}");
}
