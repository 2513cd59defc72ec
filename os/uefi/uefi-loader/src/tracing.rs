//! # Trace output

use boot_pipeline::Handoff;
use boot_qemu::qemu_trace;

/// Last words before the jump, straight to the debug port.
pub fn trace_handoff(handoff: &Handoff) {
    let fb = &handoff.boot_info.framebuffer;
    qemu_trace!("Handoff in UEFI Loader:\n");
    qemu_trace!("   entry = {:018x}", handoff.entry);
    qemu_trace!(", BI ptr = {:018x}", handoff.boot_info_phys);
    qemu_trace!(", firmware = {}\n", handoff.boot_info.firmware);
    qemu_trace!("   FB ptr = {:018x}", fb.base);
    qemu_trace!(", FB size = {}", fb.size);
    qemu_trace!(", FB width = {}", fb.width);
    qemu_trace!(", FB height = {}", fb.height);
    qemu_trace!(", FB pitch = {}", fb.pitch);
    qemu_trace!(", FB bpp = {}\n", fb.bits_per_pixel);
}
