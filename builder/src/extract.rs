// Licensed under the Apache-2.0 license

//! Image Extractor: fold a [`LinkedBinary`] into the flat byte image the
//! storage slot will hold.
//!
//! The flat image starts at the profile's payload origin (the address the
//! preamble's jump word lands on) and contains the execute-in-place sections
//! followed by the `.data` copy-template. `.bss` contributes no bytes; the
//! program zeroes it at boot, so only its address and length ride along as
//! metadata. Every section sits at `load_addr - base` — the startup code
//! computes addresses from the linker symbols, so a shifted byte here means
//! a device that silently fails to boot.

use bao1x_config::BoardProfile;

use crate::elf::{LayoutSymbols, LinkedBinary};
use crate::error::{BuildError, Result};

/// The flat storage image plus the layout facts downstream stages and
/// humans want to see.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlatImage {
    bytes: Vec<u8>,
    /// Storage address of byte 0 (the profile's payload origin).
    pub base: u32,
    /// Bytes of execute-in-place code and data, before the template.
    pub ro_len: usize,
    /// Bytes of `.data` template at the tail of the image.
    pub template_len: usize,
    pub layout: LayoutSymbols,
    pub entry: u32,
}

impl FlatImage {
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

/// Build a [`FlatImage`] from a linked binary. Pure transform: all checks
/// happen before anything is produced, and equal inputs give byte-identical
/// output.
pub fn extract(binary: &LinkedBinary, profile: &BoardProfile) -> Result<FlatImage> {
    let base = profile.payload_origin();

    let xip: Vec<_> = binary.sections.iter().filter(|s| s.is_xip()).collect();
    let template: Vec<_> = binary.sections.iter().filter(|s| !s.is_xip()).collect();

    let Some(first) = xip.first() else {
        return Err(BuildError::Layout {
            reason: "no read-only bytes at the payload origin",
            expected: base,
            actual: 0,
        });
    };
    if first.load_addr != base {
        return Err(BuildError::Layout {
            reason: "read-only region must start at the boot-loader jump target",
            expected: base,
            actual: first.load_addr,
        });
    }

    let mut bytes = Vec::new();
    for section in &xip {
        fold(&mut bytes, base, section.load_addr, &section.data)?;
    }
    let ro_len = bytes.len();
    let ro_end = base + ro_len as u32;

    let layout = binary.layout;
    let expected_template = align_up(ro_end, profile.template_align);
    let template_len;
    if let Some(first_template) = template.first() {
        let template_lma = first_template.load_addr;
        if template_lma != expected_template {
            return Err(BuildError::Alignment {
                expected: expected_template,
                actual: template_lma,
                align: profile.template_align,
            });
        }
        for section in &template {
            fold(&mut bytes, base, section.load_addr, &section.data)?;
        }
        template_len = bytes.len() - (template_lma - base) as usize;

        // The startup copy loop runs off the linker symbols, not off this
        // image; both views must describe the same bytes.
        if layout.data_lma != template_lma {
            return Err(BuildError::Layout {
                reason: "_data_lma disagrees with the linked template address",
                expected: template_lma,
                actual: layout.data_lma,
            });
        }
        if layout.data_size as usize != template_len {
            return Err(BuildError::Layout {
                reason: "_data_size disagrees with the template length",
                expected: template_len as u32,
                actual: layout.data_size,
            });
        }
        let template_vma = first_template.virt_addr;
        if layout.data_vma != template_vma {
            return Err(BuildError::Layout {
                reason: "_data_vma disagrees with the template run address",
                expected: template_vma,
                actual: layout.data_vma,
            });
        }
    } else {
        template_len = 0;
        if layout.data_size != 0 {
            return Err(BuildError::Layout {
                reason: "_data_size is nonzero but the binary has no writable template",
                expected: 0,
                actual: layout.data_size,
            });
        }
    }

    let sram = profile.sram();
    if layout.data_size != 0 && !range_within(layout.data_vma, layout.data_size, &sram) {
        return Err(BuildError::Layout {
            reason: ".data run address falls outside SRAM",
            expected: sram.start,
            actual: layout.data_vma,
        });
    }
    if layout.bss_size != 0 && !range_within(layout.bss_vma, layout.bss_size, &sram) {
        return Err(BuildError::Layout {
            reason: ".bss falls outside SRAM",
            expected: sram.start,
            actual: layout.bss_vma,
        });
    }

    log::info!(
        "flat image: {} bytes at 0x{:08x} ({} read-only, {} template, .bss {} bytes at 0x{:08x})",
        bytes.len(),
        base,
        ro_len,
        template_len,
        layout.bss_size,
        layout.bss_vma,
    );

    Ok(FlatImage {
        bytes,
        base,
        ro_len,
        template_len,
        layout,
        entry: binary.entry,
    })
}

/// Place `data` at `load_addr - base`, growing the image and zero-filling
/// any gap. Alignment holes inside the read-only region and the ≤15-byte
/// pad before the template both come out as deterministic zeros.
fn fold(image: &mut Vec<u8>, base: u32, load_addr: u32, data: &[u8]) -> Result<()> {
    if load_addr < base {
        return Err(BuildError::Layout {
            reason: "section loads below the image base",
            expected: base,
            actual: load_addr,
        });
    }
    let offset = (load_addr - base) as usize;
    if image.len() < offset + data.len() {
        image.resize(offset + data.len(), 0);
    }
    image[offset..offset + data.len()].copy_from_slice(data);
    Ok(())
}

fn align_up(value: u32, align: u32) -> u32 {
    value.div_ceil(align) * align
}

fn range_within(start: u32, len: u32, window: &core::ops::Range<u32>) -> bool {
    let Some(end) = start.checked_add(len) else {
        return false;
    };
    start >= window.start && end <= window.end
}
