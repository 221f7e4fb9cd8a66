// Licensed under the Apache-2.0 license

use bao1x_image::ImageError;
use thiserror::Error;

/// Pipeline failures. Every variant is raised before any output file is
/// written, and carries the expected-vs-actual detail needed to debug a
/// linker script or board profile — the boot loader itself reports nothing
/// beyond a terse failure code.
#[derive(Debug, Error)]
pub enum BuildError {
    /// Section addresses or linker symbols disagree with the boot-loader
    /// conventions the profile describes.
    #[error("layout: {reason}: expected 0x{expected:08x}, found 0x{actual:08x}")]
    Layout {
        reason: &'static str,
        expected: u32,
        actual: u32,
    },

    /// The `.data` template does not follow the read-only region at the
    /// profile's template alignment. The startup copy loop assumes no other
    /// gap, so padding here would desynchronize it.
    #[error(
        "alignment: .data template must start at 0x{expected:08x} \
         (read-only end rounded up to {align} bytes), found 0x{actual:08x}"
    )]
    Alignment {
        expected: u32,
        actual: u32,
        align: u32,
    },

    /// Malformed or wrong-size signing key material.
    #[error("key: {0}")]
    Key(String),

    /// Empty input, or output that exceeds a storage budget.
    #[error("size: {reason}: {actual} bytes, budget {budget} bytes")]
    Size {
        reason: &'static str,
        actual: usize,
        budget: usize,
    },

    /// Container blocks would target the reserved boot-loader region.
    #[error(
        "range: blocks cover 0x{start:08x}..0x{end:08x}, overlapping reserved \
         boot-loader storage 0x{reserved_start:08x}..0x{reserved_end:08x}"
    )]
    Range {
        start: u32,
        end: u32,
        reserved_start: u32,
        reserved_end: u32,
    },

    /// The linked binary could not be ingested.
    #[error("elf: {0}")]
    Elf(String),

    /// A UF2 stream is structurally unsound.
    #[error("container: {0}")]
    Container(String),

    /// An existing signed image failed to parse or verify.
    #[error("image: {0}")]
    Image(#[from] ImageError),
}

pub type Result<T> = core::result::Result<T, BuildError>;
