// Licensed under the Apache-2.0 license

//! Build-side pipeline for Bao1x firmware images.
//!
//! Three pure transforms, consumed in order: [`extract`] folds a linked
//! binary into the flat storage image, [`sign`] wraps it in the signed
//! preamble the boot loader verifies, and [`pack`] splits the result into
//! addressed UF2 blocks for the mass-storage flashing interface. Each stage
//! validates its input completely before producing anything, so a failing
//! run never leaves a partial artifact behind.

mod elf;
mod error;
mod extract;
mod sign;
mod uf2;

pub use ed25519_dalek::SigningKey;

pub use self::elf::{LayoutSymbols, LinkedBinary, Section};
pub use error::{BuildError, Result};
pub use extract::{extract, FlatImage};
pub use sign::{load_signing_key, sign, strip_preamble, SignRequest, SignedImage};
pub use uf2::{pack, trim_container_padding, unpack};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elf::tests::tiny_elf;
    use bao1x_config::{keys::DEV_KEY_PEM, BoardProfile};
    use bao1x_image::{SemVer, SignedImageRef, PREAMBLE_LEN};

    #[test]
    fn elf_to_uf2_end_to_end() {
        let profile = BoardProfile::default();
        let elf_bytes = tiny_elf(640, 16);
        let binary = LinkedBinary::from_elf(&elf_bytes).unwrap();

        let flat = extract(&binary, &profile).unwrap();
        assert_eq!(flat.len(), 656);

        let key = load_signing_key(DEV_KEY_PEM.as_bytes()).unwrap();
        let req = SignRequest::from_profile(&profile, SemVer::new(0, 1, 0));
        let signed = sign(flat.as_bytes(), &key, &req).unwrap();
        assert_eq!(signed.len(), 656 + PREAMBLE_LEN);

        let uf2 = pack(signed.as_bytes(), profile.storage_origin(), &profile).unwrap();
        let (base, padded) = unpack(&uf2, &profile).unwrap();
        assert_eq!(base, profile.storage_origin());
        assert_eq!(trim_container_padding(&padded).unwrap(), signed.as_bytes());

        SignedImageRef::parse(signed.as_bytes())
            .unwrap()
            .verify()
            .unwrap();
    }
}
