// Licensed under the Apache-2.0 license

//! Image pipeline subcommands: extract, sign, pack, build, verify.
//!
//! Every subcommand runs the full pipeline stage (and all of its
//! validation) in memory first and only then writes output files, so a
//! failing run never leaves a partial artifact on disk.

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::Path;

use bao1x_builder as builder;
use bao1x_builder::{SignRequest, SigningKey};
use bao1x_config::{keys::DEV_KEY_PEM, BoardProfile};
use bao1x_image::uf2::{UF2_BLOCK_LEN, UF2_MAGIC_START0};
use bao1x_image::{FunctionCode, SemVer, SignedImageRef};

pub(crate) struct SignOpts<'a> {
    pub key: Option<&'a Path>,
    pub dev_key: bool,
    pub semver: &'a semver::Version,
    pub commit: Option<u32>,
    pub function_code: FunctionCode,
}

pub(crate) fn parse_function_code(s: &str) -> Result<FunctionCode, String> {
    s.parse().map_err(|e: &str| e.to_string())
}

pub(crate) fn extract(elf: &Path, output: &Path) -> Result<()> {
    let flat = extract_flat(elf, &BoardProfile::default())?;
    fs::write(output, flat.as_bytes())
        .with_context(|| format!("cannot write {}", output.display()))?;
    Ok(())
}

pub(crate) fn sign(input: &Path, output: &Path, opts: &SignOpts) -> Result<()> {
    let profile = BoardProfile::default();
    let bytes = read_file(input)?;
    let payload = builder::strip_preamble(&bytes);
    let signed = sign_payload(payload, &profile, opts)?;
    fs::write(output, signed.as_bytes())
        .with_context(|| format!("cannot write {}", output.display()))?;
    Ok(())
}

pub(crate) fn pack(input: &Path, output: &Path, base_addr: Option<u32>) -> Result<()> {
    let profile = BoardProfile::default();
    let signed = read_file(input)?;
    // Catch a stale or truncated input before it reaches the device.
    SignedImageRef::parse(&signed)?;
    let base = base_addr.unwrap_or_else(|| profile.storage_origin());
    let uf2 = builder::pack(&signed, base, &profile)?;
    fs::write(output, uf2).with_context(|| format!("cannot write {}", output.display()))?;
    Ok(())
}

pub(crate) fn build(
    elf: &Path,
    output: &Path,
    flat_output: Option<&Path>,
    signed_output: Option<&Path>,
    opts: &SignOpts,
) -> Result<()> {
    let profile = BoardProfile::default();
    let flat = extract_flat(elf, &profile)?;
    let signed = sign_payload(flat.as_bytes(), &profile, opts)?;
    let uf2 = builder::pack(signed.as_bytes(), profile.storage_origin(), &profile)?;

    if let Some(path) = flat_output {
        fs::write(path, flat.as_bytes())
            .with_context(|| format!("cannot write {}", path.display()))?;
    }
    if let Some(path) = signed_output {
        fs::write(path, signed.as_bytes())
            .with_context(|| format!("cannot write {}", path.display()))?;
    }
    fs::write(output, uf2).with_context(|| format!("cannot write {}", output.display()))?;
    Ok(())
}

pub(crate) fn verify(file: &Path) -> Result<()> {
    let profile = BoardProfile::default();
    let bytes = read_file(file)?;

    let signed = if is_uf2(&bytes) {
        let (base, padded) = builder::unpack(&bytes, &profile)?;
        log::info!(
            "container: {} blocks based at 0x{base:08x}",
            bytes.len() / UF2_BLOCK_LEN
        );
        builder::trim_container_padding(&padded)?.to_vec()
    } else {
        bytes
    };

    let parsed = SignedImageRef::parse(&signed)?;
    let slot = parsed.verify()?;
    let sealed = &parsed.sealed;
    log::info!(
        "version {} (min loader {}), function code {}, {} payload bytes, key slot {} ({})",
        SemVer::from_bytes(&sealed.semver),
        SemVer::from_bytes(&sealed.min_semver),
        sealed.function_code.get(),
        parsed.payload().len(),
        slot,
        String::from_utf8_lossy(&sealed.pubkeys[slot].tag),
    );
    println!("Image is valid!");
    Ok(())
}

fn is_uf2(bytes: &[u8]) -> bool {
    bytes.len() >= 4
        && bytes.len() % UF2_BLOCK_LEN == 0
        && bytes[..4] == UF2_MAGIC_START0.to_le_bytes()
}

fn extract_flat(elf: &Path, profile: &BoardProfile) -> Result<builder::FlatImage> {
    let bytes = read_file(elf)?;
    let binary = builder::LinkedBinary::from_elf(&bytes)?;
    Ok(builder::extract(&binary, profile)?)
}

fn sign_payload(
    payload: &[u8],
    profile: &BoardProfile,
    opts: &SignOpts,
) -> Result<builder::SignedImage> {
    let key = load_key(opts.key, opts.dev_key)?;
    let mut request = SignRequest::from_profile(profile, wire_semver(opts.semver, opts.commit)?);
    request.function_code = opts.function_code;
    Ok(builder::sign(payload, &key, &request)?)
}

fn load_key(key: Option<&Path>, dev_key: bool) -> Result<SigningKey> {
    let material = match key {
        Some(path) => {
            fs::read(path).with_context(|| format!("cannot read signing key {}", path.display()))?
        }
        None if dev_key => DEV_KEY_PEM.as_bytes().to_vec(),
        None => bail!("either --key or --dev-key is required"),
    };
    Ok(builder::load_signing_key(&material)?)
}

/// Narrow a semver version to the 16-bit wire fields of the preamble.
fn wire_semver(version: &semver::Version, commit: Option<u32>) -> Result<SemVer> {
    let part = |value: u64, what: &str| {
        u16::try_from(value)
            .with_context(|| format!("{what} component {value} does not fit the 16-bit wire field"))
    };
    Ok(SemVer {
        major: part(version.major, "major")?,
        minor: part(version.minor, "minor")?,
        rev: part(version.patch, "patch")?,
        extra: 0,
        commit,
    })
}

fn read_file(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).with_context(|| format!("cannot read {}", path.display()))
}
