// Licensed under the Apache-2.0 license

use clap::{Parser, Subcommand};
use clap_num::maybe_hex;
use std::path::PathBuf;

use bao1x_image::FunctionCode;

mod image;

use image::SignOpts;

#[derive(Parser)]
#[command(version, about = "Bao1x firmware image tooling", long_about = None)]
struct Xtask {
    /// Log at debug level
    #[arg(short, long, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    xtask: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract the flat storage image from a linked ELF
    Extract {
        /// Path to the linked ELF executable
        #[arg(value_name = "ELF")]
        elf: PathBuf,

        /// Path for the flat payload binary
        #[arg(short, long, value_name = "OUTPUT", required = true)]
        output: PathBuf,
    },
    /// Sign a flat image for the boot loader
    Sign {
        /// Path to the flat image; an already-signed image is stripped and
        /// re-signed
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        /// Path for the signed image
        #[arg(short, long, value_name = "OUTPUT", required = true)]
        output: PathBuf,

        /// Signing key file: PKCS#8 PEM or a raw 32-byte Ed25519 seed
        #[arg(long, value_name = "KEY", required_unless_present = "dev_key")]
        key: Option<PathBuf>,

        /// Sign with the publicly disclosed development key
        #[arg(long, default_value_t = false, conflicts_with = "key")]
        dev_key: bool,

        /// Image version (e.g. "0.9.16")
        #[arg(long, value_parser = semver::Version::parse, default_value = "0.1.0")]
        semver: semver::Version,

        /// Commit id to record next to the version
        #[arg(long, value_parser = maybe_hex::<u32>)]
        commit: Option<u32>,

        /// Role the boot loader enforces for this image
        #[arg(long, default_value = "baremetal", value_parser = image::parse_function_code)]
        function_code: FunctionCode,
    },
    /// Pack a signed image into a UF2 container
    Pack {
        /// Path to the signed image
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        /// Path for the UF2 file
        #[arg(short, long, value_name = "OUTPUT", required = true)]
        output: PathBuf,

        /// Storage address of the first block; defaults to the profile's
        /// bare-metal slot
        #[arg(long, value_parser = maybe_hex::<u32>)]
        base_addr: Option<u32>,
    },
    /// ELF to UF2 in one pass
    Build {
        /// Path to the linked ELF executable
        #[arg(value_name = "ELF")]
        elf: PathBuf,

        /// Path for the UF2 file
        #[arg(short, long, value_name = "OUTPUT", required = true)]
        output: PathBuf,

        /// Also write the flat payload (debugging aid)
        #[arg(long, value_name = "FILE")]
        flat_output: Option<PathBuf>,

        /// Also write the signed image
        #[arg(long, value_name = "FILE")]
        signed_output: Option<PathBuf>,

        /// Signing key file: PKCS#8 PEM or a raw 32-byte Ed25519 seed
        #[arg(long, value_name = "KEY", required_unless_present = "dev_key")]
        key: Option<PathBuf>,

        /// Sign with the publicly disclosed development key
        #[arg(long, default_value_t = false, conflicts_with = "key")]
        dev_key: bool,

        /// Image version (e.g. "0.9.16")
        #[arg(long, value_parser = semver::Version::parse, default_value = "0.1.0")]
        semver: semver::Version,

        /// Commit id to record next to the version
        #[arg(long, value_parser = maybe_hex::<u32>)]
        commit: Option<u32>,

        /// Role the boot loader enforces for this image
        #[arg(long, default_value = "baremetal", value_parser = image::parse_function_code)]
        function_code: FunctionCode,
    },
    /// Check the structure and signature of a signed image or UF2 file
    Verify {
        /// Path to a signed image or UF2 container
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Xtask::parse();
    let level = if cli.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    let _ = simple_logger::SimpleLogger::new().with_level(level).init();

    match &cli.xtask {
        Commands::Extract { elf, output } => image::extract(elf, output),
        Commands::Sign {
            input,
            output,
            key,
            dev_key,
            semver,
            commit,
            function_code,
        } => image::sign(
            input,
            output,
            &SignOpts {
                key: key.as_deref(),
                dev_key: *dev_key,
                semver,
                commit: *commit,
                function_code: *function_code,
            },
        ),
        Commands::Pack {
            input,
            output,
            base_addr,
        } => image::pack(input, output, *base_addr),
        Commands::Build {
            elf,
            output,
            flat_output,
            signed_output,
            key,
            dev_key,
            semver,
            commit,
            function_code,
        } => image::build(
            elf,
            output,
            flat_output.as_deref(),
            signed_output.as_deref(),
            &SignOpts {
                key: key.as_deref(),
                dev_key: *dev_key,
                semver,
                commit: *commit,
                function_code: *function_code,
            },
        ),
        Commands::Verify { file } => image::verify(file),
    }
}
