// Licensed under the Apache-2.0 license

//! Board and boot-loader profile constants for the Bao1x image pipeline.
//!
//! Everything the pipeline would otherwise hard-code lives here: the storage
//! map the boot loader assumes, the container geometry the flashing layer
//! expects, and the well-known verifying-key slots. The defaults describe
//! the dabao board; other profiles can be built by overriding fields.

#![cfg_attr(target_arch = "riscv32", no_std)]

pub mod keys;

use core::ops::Range;

use bao1x_image::uf2::{BAO1X_FAMILY_ID, UF2_PAYLOAD_LEN};
use bao1x_image::{FunctionCode, PubkeySlot, SemVer, PREAMBLE_LEN, PUBKEY_SLOT_COUNT};

/// Configures the storage and RAM map for a Bao1x board.
/// These are the defaults that can be overridden and provided to the
/// extractor and packer.
pub struct Bao1xMemoryMap {
    /// Non-volatile ReRAM, memory mapped and executable in place.
    pub reram_offset: u32,
    pub reram_size: u32,
    /// Main SRAM; the `.data` template is copied here at boot.
    pub sram_offset: u32,
    pub sram_size: u32,
    /// Where the boot loader expects the signed bare-metal image to start.
    pub baremetal_offset: u32,
}

impl Default for Bao1xMemoryMap {
    fn default() -> Self {
        Bao1xMemoryMap {
            reram_offset: 0x6000_0000,
            reram_size: 4 * 1024 * 1024,
            sram_offset: 0x6100_0000,
            sram_size: 2 * 1024 * 1024,
            baremetal_offset: 0x6006_0000,
        }
    }
}

/// One coherent set of pipeline inputs for a board / boot-loader pairing.
pub struct BoardProfile {
    pub name: &'static str,
    pub memory_map: Bao1xMemoryMap,
    /// Emit the jump word at preamble offset 0 (the boot loader jumps to the
    /// start of the image, not past the preamble).
    pub jump_header: bool,
    /// Required alignment of the `.data` template after the read-only
    /// region; the startup copy loop assumes no other gap.
    pub template_align: u32,
    /// UF2 family id the flashing layer filters on.
    pub family_id: u32,
    /// Payload bytes per container block.
    pub block_payload_len: usize,
    /// Verifying-key slots embedded in every signed image.
    pub pubkeys: [PubkeySlot; PUBKEY_SLOT_COUNT],
    /// Oldest boot loader this image tolerates.
    pub min_loader_semver: SemVer,
    pub default_function_code: FunctionCode,
}

impl Default for BoardProfile {
    fn default() -> Self {
        BoardProfile {
            name: "dabao",
            memory_map: Bao1xMemoryMap::default(),
            jump_header: true,
            template_align: 16,
            family_id: BAO1X_FAMILY_ID,
            block_payload_len: UF2_PAYLOAD_LEN,
            pubkeys: keys::WELL_KNOWN_PUBKEYS,
            min_loader_semver: SemVer {
                major: 0,
                minor: 9,
                rev: 8,
                extra: 0x0317,
                commit: None,
            },
            default_function_code: FunctionCode::Baremetal,
        }
    }
}

impl BoardProfile {
    /// Storage address the signed image (preamble first) is written to.
    pub fn storage_origin(&self) -> u32 {
        self.memory_map.baremetal_offset
    }

    /// Storage address the flat payload is linked to run at; the preamble's
    /// jump word lands here.
    pub fn payload_origin(&self) -> u32 {
        self.storage_origin() + PREAMBLE_LEN as u32
    }

    /// Storage owned by the boot loader itself; container blocks must never
    /// target it.
    pub fn reserved_storage(&self) -> Range<u32> {
        self.memory_map.reram_offset..self.memory_map.baremetal_offset
    }

    /// Bytes available for the signed image in the bare-metal slot.
    pub fn slot_budget(&self) -> u32 {
        self.memory_map.reram_offset + self.memory_map.reram_size - self.storage_origin()
    }

    /// RAM window `.data` and `.bss` must land in.
    pub fn sram(&self) -> Range<u32> {
        self.memory_map.sram_offset..self.memory_map.sram_offset + self.memory_map.sram_size
    }
}
