// Licensed under the Apache-2.0 license

//! Container Packer: split a signed image into addressed UF2 blocks.
//!
//! The flashing layer writes each block's payload to the block's declared
//! target address and does no other reassembly, so the address arithmetic
//! here must be exact: block `i` targets `base + i * payload_len`, where the
//! payload length (256) is smaller than the physical 512-byte block. Index
//! and total-count fields are repeated in every block because the transport
//! may deliver blocks out of order.

use bao1x_config::BoardProfile;
use bao1x_image::uf2::{
    Uf2BlockFooter, Uf2BlockHeader, UF2_BLOCK_LEN, UF2_DATA_AREA_LEN, UF2_FLAG_FAMILY_ID_PRESENT,
    UF2_MAGIC_END, UF2_MAGIC_START0, UF2_MAGIC_START1,
};
use bao1x_image::{SealedHeader, SEALED_MAGIC, BLOB_HEADER_LEN, PREAMBLE_LEN};
use zerocopy::{FromBytes, IntoBytes};

use crate::error::{BuildError, Result};

/// Pack `image` into UF2 blocks targeting `base_addr`. All checks run before
/// any block is emitted.
pub fn pack(image: &[u8], base_addr: u32, profile: &BoardProfile) -> Result<Vec<u8>> {
    if image.is_empty() {
        return Err(BuildError::Size {
            reason: "nothing to pack",
            actual: 0,
            budget: profile.block_payload_len,
        });
    }

    let payload_len = profile.block_payload_len;
    let num_blocks = image.len().div_ceil(payload_len);
    let span = (num_blocks * payload_len) as u64;
    let start = base_addr as u64;
    let end = start + span;
    if end > u32::MAX as u64 {
        return Err(BuildError::Container(format!(
            "blocks would run past the end of the address space (0x{start:08x} + 0x{span:x})"
        )));
    }

    let reserved = profile.reserved_storage();
    if start < reserved.end as u64 && (reserved.start as u64) < end {
        return Err(BuildError::Range {
            start: base_addr,
            end: end as u32,
            reserved_start: reserved.start,
            reserved_end: reserved.end,
        });
    }

    let flags = if profile.family_id != 0 {
        UF2_FLAG_FAMILY_ID_PRESENT
    } else {
        0
    };

    let mut out = Vec::with_capacity(num_blocks * UF2_BLOCK_LEN);
    for (index, chunk) in image.chunks(payload_len).enumerate() {
        let header = Uf2BlockHeader {
            magic_start0: UF2_MAGIC_START0.into(),
            magic_start1: UF2_MAGIC_START1.into(),
            flags: flags.into(),
            target_addr: (base_addr + (index * payload_len) as u32).into(),
            payload_size: (payload_len as u32).into(),
            block_no: (index as u32).into(),
            num_blocks: (num_blocks as u32).into(),
            family_id: profile.family_id.into(),
        };
        out.extend_from_slice(header.as_bytes());
        out.extend_from_slice(chunk);
        // Zero-pad a short final chunk and the unused tail of the data area.
        out.resize(out.len() + (UF2_DATA_AREA_LEN - chunk.len()), 0);
        let footer = Uf2BlockFooter {
            magic_end: UF2_MAGIC_END.into(),
        };
        out.extend_from_slice(footer.as_bytes());
    }

    log::info!(
        "container: {} blocks covering 0x{:08x}..0x{:08x}",
        num_blocks,
        base_addr,
        end as u32,
    );

    Ok(out)
}

/// Reassemble the payload of a UF2 stream, checking structure as the
/// flashing layer would. Returns the base target address and the
/// concatenated payload (still carrying the final block's zero padding; see
/// [`trim_container_padding`]).
pub fn unpack(uf2: &[u8], profile: &BoardProfile) -> Result<(u32, Vec<u8>)> {
    if uf2.is_empty() || uf2.len() % UF2_BLOCK_LEN != 0 {
        return Err(BuildError::Container(format!(
            "file length {} is not a positive multiple of {UF2_BLOCK_LEN}",
            uf2.len()
        )));
    }
    let num_blocks = uf2.len() / UF2_BLOCK_LEN;
    let payload_len = profile.block_payload_len;

    let mut base = 0u32;
    let mut data = Vec::with_capacity(num_blocks * payload_len);
    for (index, block) in uf2.chunks_exact(UF2_BLOCK_LEN).enumerate() {
        let header = Uf2BlockHeader::read_from_bytes(&block[..32])
            .map_err(|_| BuildError::Container("short block header".to_string()))?;
        if !header.magics_ok() {
            return Err(BuildError::Container(format!(
                "block {index}: bad start magic"
            )));
        }
        let footer = Uf2BlockFooter::read_from_bytes(&block[UF2_BLOCK_LEN - 4..])
            .map_err(|_| BuildError::Container("short block footer".to_string()))?;
        if footer.magic_end.get() != UF2_MAGIC_END {
            return Err(BuildError::Container(format!(
                "block {index}: bad end magic"
            )));
        }
        if header.family_id.get() != profile.family_id {
            return Err(BuildError::Container(format!(
                "block {index}: family 0x{:08x}, expected 0x{:08x}",
                header.family_id.get(),
                profile.family_id
            )));
        }
        if header.payload_size.get() as usize != payload_len {
            return Err(BuildError::Container(format!(
                "block {index}: payload size {}, expected {payload_len}",
                header.payload_size.get()
            )));
        }
        if header.block_no.get() as usize != index
            || header.num_blocks.get() as usize != num_blocks
        {
            return Err(BuildError::Container(format!(
                "block {index}: numbered {}/{}, expected {index}/{num_blocks}",
                header.block_no.get(),
                header.num_blocks.get()
            )));
        }
        if index == 0 {
            base = header.target_addr.get();
        }
        let expected_addr = base + (index * payload_len) as u32;
        if header.target_addr.get() != expected_addr {
            return Err(BuildError::Container(format!(
                "block {index}: target 0x{:08x}, expected 0x{expected_addr:08x}",
                header.target_addr.get()
            )));
        }
        data.extend_from_slice(&block[32..32 + payload_len]);
    }
    Ok((base, data))
}

/// Drop the final-block zero padding from a reassembled signed image, using
/// the sealed header's declared length.
pub fn trim_container_padding(bytes: &[u8]) -> Result<&[u8]> {
    if bytes.len() < PREAMBLE_LEN {
        return Err(BuildError::Container(format!(
            "reassembled payload is {} bytes, shorter than the preamble",
            bytes.len()
        )));
    }
    let sealed = SealedHeader::read_from_bytes(&bytes[BLOB_HEADER_LEN..PREAMBLE_LEN])
        .map_err(|_| BuildError::Container("short sealed header".to_string()))?;
    if sealed.magic != SEALED_MAGIC {
        return Err(BuildError::Container(
            "reassembled payload is not a signed image".to_string(),
        ));
    }
    let total = BLOB_HEADER_LEN + sealed.signed_len.get() as usize;
    if total > bytes.len() {
        return Err(BuildError::Container(format!(
            "declared image length {total} exceeds the reassembled {} bytes",
            bytes.len()
        )));
    }
    Ok(&bytes[..total])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sign::{load_signing_key, sign, SignRequest};
    use bao1x_image::SemVer;

    fn dev_signed(payload_len: usize) -> Vec<u8> {
        let key = load_signing_key(bao1x_config::keys::DEV_KEY_PEM.as_bytes()).unwrap();
        let req = SignRequest::from_profile(&BoardProfile::default(), SemVer::new(0, 1, 0));
        sign(&vec![0x77; payload_len], &key, &req)
            .unwrap()
            .into_bytes()
    }

    #[test]
    fn block_count_and_addresses() {
        let profile = BoardProfile::default();
        let signed = dev_signed(656); // 1424 bytes signed
        let uf2 = pack(&signed, profile.storage_origin(), &profile).unwrap();
        assert_eq!(uf2.len(), 6 * UF2_BLOCK_LEN);

        for (index, block) in uf2.chunks_exact(UF2_BLOCK_LEN).enumerate() {
            let header = Uf2BlockHeader::read_from_bytes(&block[..32]).unwrap();
            assert_eq!(header.block_no.get() as usize, index);
            assert_eq!(header.num_blocks.get(), 6);
            assert_eq!(
                header.target_addr.get(),
                0x6006_0000 + (index as u32) * 256
            );
            assert_eq!(header.flags.get(), UF2_FLAG_FAMILY_ID_PRESENT);
            assert_eq!(header.family_id.get(), profile.family_id);
        }
    }

    #[test]
    fn exact_multiple_needs_no_padded_block() {
        let profile = BoardProfile::default();
        // 768 preamble + 256 payload = 1024, an exact multiple of 256.
        let signed = dev_signed(256);
        let uf2 = pack(&signed, profile.storage_origin(), &profile).unwrap();
        assert_eq!(uf2.len(), 4 * UF2_BLOCK_LEN);
    }

    #[test]
    fn pack_unpack_round_trip() {
        let profile = BoardProfile::default();
        let signed = dev_signed(656);
        let uf2 = pack(&signed, profile.storage_origin(), &profile).unwrap();

        let (base, padded) = unpack(&uf2, &profile).unwrap();
        assert_eq!(base, profile.storage_origin());
        assert_eq!(padded.len(), 6 * 256);
        assert_eq!(trim_container_padding(&padded).unwrap(), &signed[..]);
    }

    #[test]
    fn reserved_storage_is_off_limits() {
        let profile = BoardProfile::default();
        let signed = dev_signed(656);
        let err = pack(&signed, 0x6005_0000, &profile).unwrap_err();
        assert!(matches!(
            err,
            BuildError::Range {
                start: 0x6005_0000,
                reserved_end: 0x6006_0000,
                ..
            }
        ));
    }

    #[test]
    fn corrupt_block_numbering_is_detected() {
        let profile = BoardProfile::default();
        let signed = dev_signed(300);
        let mut uf2 = pack(&signed, profile.storage_origin(), &profile).unwrap();
        // Swap the block_no fields of blocks 0 and 1.
        uf2[20] = 1;
        uf2[UF2_BLOCK_LEN + 20] = 0;
        assert!(matches!(
            unpack(&uf2, &profile),
            Err(BuildError::Container(_))
        ));
    }
}
