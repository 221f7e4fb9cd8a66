// Licensed under the Apache-2.0 license

//! UF2 container format, as consumed by the Bao1x mass-storage flashing
//! interface. 512-byte blocks: 32-byte header, 256 payload bytes, zero fill,
//! trailing magic.

use zerocopy::byteorder::{LittleEndian, U32};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

pub const UF2_MAGIC_START0: u32 = 0x0A32_4655; // "UF2\n"
pub const UF2_MAGIC_START1: u32 = 0x9E5D_5157;
pub const UF2_MAGIC_END: u32 = 0x0AB1_6F30;

pub const UF2_FLAG_NOT_MAIN_FLASH: u32 = 0x0000_0001;
pub const UF2_FLAG_FAMILY_ID_PRESENT: u32 = 0x0000_2000;

/// UF2 family id assigned to the Bao1x.
pub const BAO1X_FAMILY_ID: u32 = 0xA7D7_6373;

/// Physical block size on the emulated mass-storage device.
pub const UF2_BLOCK_LEN: usize = 512;

/// Payload bytes carried per block. The flashing layer advances the target
/// address by this much per block, not by the physical block size.
pub const UF2_PAYLOAD_LEN: usize = 256;

/// Size of the data area between header and footer; payload bytes beyond
/// `payload_size` are zero.
pub const UF2_DATA_AREA_LEN: usize = UF2_BLOCK_LEN - 32 - 4;

#[derive(Debug, Clone, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
#[repr(C)]
pub struct Uf2BlockHeader {
    pub magic_start0: U32<LittleEndian>,
    pub magic_start1: U32<LittleEndian>,
    pub flags: U32<LittleEndian>,
    pub target_addr: U32<LittleEndian>,
    pub payload_size: U32<LittleEndian>,
    pub block_no: U32<LittleEndian>,
    pub num_blocks: U32<LittleEndian>,
    pub family_id: U32<LittleEndian>,
}

#[derive(Debug, Clone, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
#[repr(C)]
pub struct Uf2BlockFooter {
    pub magic_end: U32<LittleEndian>,
}

impl Uf2BlockHeader {
    pub fn magics_ok(&self) -> bool {
        self.magic_start0.get() == UF2_MAGIC_START0 && self.magic_start1.get() == UF2_MAGIC_START1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::mem::size_of;

    #[test]
    fn block_geometry_is_pinned() {
        assert_eq!(size_of::<Uf2BlockHeader>(), 32);
        assert_eq!(size_of::<Uf2BlockFooter>(), 4);
        assert_eq!(
            size_of::<Uf2BlockHeader>() + UF2_DATA_AREA_LEN + size_of::<Uf2BlockFooter>(),
            UF2_BLOCK_LEN
        );
    }
}
