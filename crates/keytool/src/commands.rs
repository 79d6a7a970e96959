//! Subcommand implementations.
//!
//! Every command reports to `out`; diagnostics go through `tracing`.

use std::{fs, io::Write, path::Path};

use anyhow::{bail, Context, Result};
use envelope::{
    lifecycle::{self, GenerateOptions},
    PrivateKeyMaterial,
};
use tracing::info;

use crate::cli::{Command, ConvertArgs, GenerateArgs, SelfTestArgs};

const PRIVATE_FILE: &str = "private.pem";
const PUBLIC_FILE: &str = "public.pem";

/// Execute one subcommand.
pub fn run(command: Command, out: &mut impl Write) -> Result<()> {
    match command {
        Command::Generate(args) => generate(args, out),
        Command::Convert(args) => convert(args, out),
        Command::SelfTest(args) => self_test(args, out),
    }
}

fn generate(args: GenerateArgs, out: &mut impl Write) -> Result<()> {
    let private_path = args.out_dir.join(PRIVATE_FILE);
    let public_path = args.out_dir.join(PUBLIC_FILE);
    if !args.force {
        refuse_existing(&private_path)?;
        refuse_existing(&public_path)?;
    }

    let options = GenerateOptions {
        bits: args.bits,
        pbkdf2_iterations: args.pbkdf2_iterations,
    };
    let pair = lifecycle::generate(&args.passphrase, &options)?;

    // Never hand out a keypair that fails its own round trip.
    let material = PrivateKeyMaterial::detect(pair.private_pem.clone(), Some(args.passphrase))?;
    lifecycle::self_test(&material, Some(&pair.public_pem))?;

    fs::create_dir_all(&args.out_dir)
        .with_context(|| format!("failed to create {}", args.out_dir.display()))?;
    write_file(&private_path, &pair.private_pem, args.force, true)?;
    write_file(&public_path, &pair.public_pem, args.force, false)?;
    info!(bits = args.bits, dir = %args.out_dir.display(), "keypair written");

    writeln!(out, "Wrote {}", private_path.display())?;
    writeln!(out, "Wrote {}", public_path.display())?;
    writeln!(out)?;
    writeln!(out, "Upload this public key to the Flows business settings:")?;
    write!(out, "{}", pair.public_pem)?;
    Ok(())
}

fn convert(args: ConvertArgs, out: &mut impl Write) -> Result<()> {
    if !args.force {
        refuse_existing(&args.out)?;
    }
    let encrypted = read(&args.private_key)?;
    let pair = lifecycle::convert(&encrypted, &args.passphrase)?;

    write_file(&args.out, &pair.private_pem, args.force, true)?;
    info!(source = %args.private_key.display(), "private key converted");

    writeln!(out, "Wrote {} (unencrypted, keep it secret)", args.out.display())?;
    write!(out, "{}", pair.public_pem)?;
    Ok(())
}

fn self_test(args: SelfTestArgs, out: &mut impl Write) -> Result<()> {
    let pem = read(&args.private_key)?;
    let passphrase = args.passphrase.filter(|p| !p.is_empty());
    let material = match args.format {
        Some(format) => PrivateKeyMaterial::new(pem, passphrase, format),
        None => PrivateKeyMaterial::detect(pem, passphrase)?,
    };
    let public_pem = args.public_key.as_deref().map(read).transpose()?;

    let report = lifecycle::self_test(&material, public_pem.as_deref())?;

    writeln!(out, "Private key loaded ({} bits)", report.modulus_bits)?;
    if report.public_key_checked {
        writeln!(out, "Public key matches private key")?;
    }
    writeln!(out, "OAEP round trip ok")?;
    writeln!(out, "Exchange round trip ok")?;
    Ok(())
}

fn read(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

fn refuse_existing(path: &Path) -> Result<()> {
    if path.exists() {
        bail!("{} already exists; pass --force to overwrite", path.display());
    }
    Ok(())
}

/// Write `contents` to `path`, refusing to clobber unless `force`.
/// Private keys are created readable by the owner only.
fn write_file(path: &Path, contents: &str, force: bool, owner_only: bool) -> Result<()> {
    let mut opts = fs::OpenOptions::new();
    opts.write(true);
    if force {
        opts.create(true).truncate(true);
    } else {
        opts.create_new(true);
    }
    #[cfg(unix)]
    if owner_only {
        use std::os::unix::fs::OpenOptionsExt;
        opts.mode(0o600);
    }
    #[cfg(not(unix))]
    let _ = owner_only;

    let mut file = opts
        .open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    file.write_all(contents.as_bytes())
        .with_context(|| format!("failed to write {}", path.display()))
}
