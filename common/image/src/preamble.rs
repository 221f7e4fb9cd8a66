// Licensed under the Apache-2.0 license

//! The signed-image preamble.
//!
//! A signed image is a 768-byte preamble followed by the flat payload. The
//! first 132 bytes (the blob header) are outside the signed range: the jump
//! word the CPU executes, the signature, and a reserved block. Everything
//! from the sealed header to the end of the payload is covered by the
//! signature, including every length field the verifier reads.

use core::fmt;

use ed25519_dalek::{Signature, VerifyingKey};
use sha2::{Digest, Sha512};
use zerocopy::byteorder::{LittleEndian, U32};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

/// Total preamble length. The payload is linked to run at
/// `storage_origin + PREAMBLE_LEN`, so this value is part of the boot-loader
/// contract and cannot change within a format version.
pub const PREAMBLE_LEN: usize = 768;

/// Length of the unsigned blob header at the start of the preamble.
pub const BLOB_HEADER_LEN: usize = 132;

/// Length of the sealed header (the signed part of the preamble).
pub const SEALED_HEADER_LEN: usize = PREAMBLE_LEN - BLOB_HEADER_LEN;

/// Zero padding that stretches the sealed header fields to `SEALED_HEADER_LEN`.
pub const SEALED_PAD_LEN: usize = 432;

/// Ed25519 signature length, also the value of the `sig_len` field.
pub const SIGNATURE_LEN: usize = 64;

/// Number of embedded verifying-key slots.
pub const PUBKEY_SLOT_COUNT: usize = 4;

/// Sealed-header magic as it appears in storage at offset 0x88.
pub const SEALED_MAGIC: [u8; 8] = *b"ymuy3oaB";

/// Preamble format version.
pub const FORMAT_VERSION: u32 = 0x0100;

/// Flags bit: the image starts with a jump word that skips the preamble.
pub const FLAG_JUMP_HEADER: u32 = 1 << 0;

/// One verifying-key slot: raw Ed25519 public key plus a 4-byte tag the boot
/// loader uses to name the slot in its revocation records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
#[repr(C)]
pub struct PubkeySlot {
    pub key: [u8; 32],
    pub tag: [u8; 4],
}

impl PubkeySlot {
    pub const EMPTY: PubkeySlot = PubkeySlot {
        key: [0; 32],
        tag: [0; 4],
    };

    /// An all-zero slot is unpopulated and never used for verification.
    pub fn is_empty(&self) -> bool {
        self.key == [0u8; 32]
    }
}

/// Unsigned head of the preamble. The CPU executes `jump`; the verifier reads
/// `signature`; nothing reads `reserved`.
#[derive(Debug, Clone, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
#[repr(C)]
pub struct BlobHeader {
    pub jump: U32<LittleEndian>,
    pub signature: [u8; 64],
    pub reserved: [u8; 64],
}

/// Signed head of the preamble. Field order and widths are the wire contract
/// for `FORMAT_VERSION` and must never change within it.
#[derive(Debug, Clone, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
#[repr(C)]
pub struct SealedHeader {
    pub version: U32<LittleEndian>,
    pub magic: [u8; 8],
    /// Length of the signed range: `SEALED_HEADER_LEN` + payload length.
    pub signed_len: U32<LittleEndian>,
    pub function_code: U32<LittleEndian>,
    pub flags: U32<LittleEndian>,
    pub sig_len: U32<LittleEndian>,
    pub min_semver: [u8; 16],
    pub semver: [u8; 16],
    pub pubkeys: [PubkeySlot; PUBKEY_SLOT_COUNT],
    pub pad: [u8; SEALED_PAD_LEN],
}

/// Why a byte sequence is not an acceptable signed image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageError {
    TooShort { actual: usize },
    BadMagic,
    UnsupportedVersion { actual: u32 },
    SignedLenMismatch { expected: u32, actual: u32 },
    SigLenMismatch { expected: u32, actual: u32 },
    Signature,
}

impl core::error::Error for ImageError {}

impl fmt::Display for ImageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageError::TooShort { actual } => write!(
                f,
                "image is {actual} bytes, shorter than the {PREAMBLE_LEN}-byte preamble"
            ),
            ImageError::BadMagic => write!(f, "sealed-header magic mismatch at offset 0x88"),
            ImageError::UnsupportedVersion { actual } => {
                write!(f, "unsupported preamble version 0x{actual:04x}")
            }
            ImageError::SignedLenMismatch { expected, actual } => write!(
                f,
                "signed_len field is {actual} but the sealed range is {expected} bytes"
            ),
            ImageError::SigLenMismatch { expected, actual } => {
                write!(f, "sig_len field is {actual}, expected {expected}")
            }
            ImageError::Signature => write!(f, "signature does not verify under any key slot"),
        }
    }
}

/// Quick structural probe: does `bytes` already start with a version-0x0100
/// preamble? Used by the signer to strip an old preamble before re-signing.
pub fn has_preamble(bytes: &[u8]) -> bool {
    if bytes.len() < PREAMBLE_LEN {
        return false;
    }
    let jump = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    jump == crate::jal_x0(PREAMBLE_LEN as u32) && bytes[0x88..0x90] == SEALED_MAGIC
}

/// A parsed view of a signed image. Parsing checks structure only; call
/// [`SignedImageRef::verify`] for the cryptographic check.
pub struct SignedImageRef<'a> {
    pub blob: BlobHeader,
    pub sealed: SealedHeader,
    bytes: &'a [u8],
}

impl<'a> SignedImageRef<'a> {
    pub fn parse(bytes: &'a [u8]) -> Result<Self, ImageError> {
        if bytes.len() < PREAMBLE_LEN {
            return Err(ImageError::TooShort {
                actual: bytes.len(),
            });
        }
        let blob = BlobHeader::read_from_bytes(&bytes[..BLOB_HEADER_LEN])
            .expect("blob header length is fixed");
        let sealed = SealedHeader::read_from_bytes(&bytes[BLOB_HEADER_LEN..PREAMBLE_LEN])
            .expect("sealed header length is fixed");

        if sealed.magic != SEALED_MAGIC {
            return Err(ImageError::BadMagic);
        }
        if sealed.version.get() != FORMAT_VERSION {
            return Err(ImageError::UnsupportedVersion {
                actual: sealed.version.get(),
            });
        }
        let sealed_range_len = (bytes.len() - BLOB_HEADER_LEN) as u32;
        if sealed.signed_len.get() != sealed_range_len {
            return Err(ImageError::SignedLenMismatch {
                expected: sealed_range_len,
                actual: sealed.signed_len.get(),
            });
        }
        if sealed.sig_len.get() != SIGNATURE_LEN as u32 {
            return Err(ImageError::SigLenMismatch {
                expected: SIGNATURE_LEN as u32,
                actual: sealed.sig_len.get(),
            });
        }
        Ok(SignedImageRef {
            blob,
            sealed,
            bytes,
        })
    }

    /// The flat payload that follows the preamble.
    pub fn payload(&self) -> &'a [u8] {
        &self.bytes[PREAMBLE_LEN..]
    }

    /// The byte range the signature covers: sealed header plus payload.
    pub fn sealed_range(&self) -> &'a [u8] {
        &self.bytes[BLOB_HEADER_LEN..]
    }

    /// Verify the Ed25519ph signature against the embedded key slots.
    /// Returns the index of the slot that verified. Revocation is the boot
    /// loader's decision; any structurally valid slot is acceptable here.
    pub fn verify(&self) -> Result<usize, ImageError> {
        let signature = Signature::from_bytes(&self.blob.signature);
        for (index, slot) in self.sealed.pubkeys.iter().enumerate() {
            if slot.is_empty() {
                continue;
            }
            let Ok(key) = VerifyingKey::from_bytes(&slot.key) else {
                continue;
            };
            let mut prehash = Sha512::new();
            prehash.update(self.sealed_range());
            if key.verify_prehashed(prehash, None, &signature).is_ok() {
                return Ok(index);
            }
        }
        Err(ImageError::Signature)
    }
}
