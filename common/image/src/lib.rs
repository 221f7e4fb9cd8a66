// Licensed under the Apache-2.0 license

//! Wire-format definitions for Bao1x signed firmware images and the UF2
//! transport container.
//!
//! Everything in this crate is byte-exact: the structs here describe what the
//! boot loader's verifier parses out of ReRAM and what the mass-storage
//! flashing layer parses out of a UF2 file. Build-side logic lives in
//! `bao1x-builder`; this crate only defines the formats and knows how to
//! parse and verify them.

#![cfg_attr(target_arch = "riscv32", no_std)]

mod preamble;
mod semver;
pub mod uf2;

pub use preamble::{
    has_preamble, BlobHeader, ImageError, PubkeySlot, SealedHeader, SignedImageRef, BLOB_HEADER_LEN,
    FLAG_JUMP_HEADER, FORMAT_VERSION, PREAMBLE_LEN, PUBKEY_SLOT_COUNT, SEALED_HEADER_LEN,
    SEALED_MAGIC, SEALED_PAD_LEN, SIGNATURE_LEN,
};
pub use semver::{SemVer, SEMVER_LEN};

/// Function codes understood by the boot loader's verifier. The code selects
/// which storage slot and privilege rules apply to the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum FunctionCode {
    Boot0 = 0,
    Boot1 = 1,
    Loader = 2,
    Kernel = 3,
    App = 4,
    Swap = 5,
    Baremetal = 6,
}

impl FunctionCode {
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(Self::Boot0),
            1 => Some(Self::Boot1),
            2 => Some(Self::Loader),
            3 => Some(Self::Kernel),
            4 => Some(Self::App),
            5 => Some(Self::Swap),
            6 => Some(Self::Baremetal),
            _ => None,
        }
    }
}

impl core::str::FromStr for FunctionCode {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "boot0" => Ok(Self::Boot0),
            "boot1" => Ok(Self::Boot1),
            "loader" => Ok(Self::Loader),
            "kernel" => Ok(Self::Kernel),
            "app" => Ok(Self::App),
            "swap" => Ok(Self::Swap),
            "baremetal" => Ok(Self::Baremetal),
            _ => Err("expected one of: boot0, boot1, loader, kernel, app, swap, baremetal"),
        }
    }
}

/// Encode `jal x0, offset` (RISC-V J-type, rd = x0). The boot loader lands on
/// the first word of the image, so that word must jump over the preamble to
/// the payload; the immediate tracks the preamble length instead of being a
/// hard-coded instruction.
pub fn jal_x0(offset: u32) -> u32 {
    debug_assert!(offset % 2 == 0 && offset < (1 << 20));
    let imm20 = (offset >> 20) & 0x1;
    let imm10_1 = (offset >> 1) & 0x3ff;
    let imm11 = (offset >> 11) & 0x1;
    let imm19_12 = (offset >> 12) & 0xff;
    (imm20 << 31) | (imm10_1 << 21) | (imm11 << 20) | (imm19_12 << 12) | 0x6f
}
