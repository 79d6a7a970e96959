//! Command-line surface of the keytool binary.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use envelope::{
    lifecycle::{DEFAULT_KEY_BITS, DEFAULT_PBKDF2_ITERATIONS},
    KeyFormat,
};

/// Key lifecycle tooling for the flow endpoint.
#[derive(Parser, Debug)]
#[command(name = "keytool", version, about, long_about = None)]
pub struct Cli {
    /// Log level for diagnostics written to stderr.
    #[arg(long, global = true, env = "LOG_LEVEL", default_value = "warn")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Generate a keypair with a passphrase-encrypted private key
    Generate(GenerateArgs),

    /// Decrypt an encrypted private key to plain PKCS#1
    Convert(ConvertArgs),

    /// Check that a private key decrypts and round-trips an exchange
    SelfTest(SelfTestArgs),
}

#[derive(Args, Debug)]
pub struct GenerateArgs {
    /// Passphrase protecting the private key.
    #[arg(long, env = "KEYTOOL_PASSPHRASE", hide_env_values = true)]
    pub passphrase: String,

    /// RSA modulus size in bits.
    #[arg(long, default_value_t = DEFAULT_KEY_BITS)]
    pub bits: usize,

    /// PBKDF2 iteration count for the private key encryption.
    #[arg(long, default_value_t = DEFAULT_PBKDF2_ITERATIONS)]
    pub pbkdf2_iterations: u32,

    /// Directory receiving `private.pem` and `public.pem`.
    #[arg(long, default_value = ".")]
    pub out_dir: PathBuf,

    /// Overwrite existing files.
    #[arg(long)]
    pub force: bool,
}

#[derive(Args, Debug)]
pub struct ConvertArgs {
    /// Encrypted PKCS#8 private key to convert.
    #[arg(long, default_value = "private.pem")]
    pub private_key: PathBuf,

    /// Passphrase of the encrypted private key.
    #[arg(long, env = "KEYTOOL_PASSPHRASE", hide_env_values = true)]
    pub passphrase: String,

    /// Destination of the plain PKCS#1 private key.
    #[arg(long, default_value = "private_unencrypted.pem")]
    pub out: PathBuf,

    /// Overwrite an existing output file.
    #[arg(long)]
    pub force: bool,
}

#[derive(Args, Debug)]
pub struct SelfTestArgs {
    /// Private key to test.
    #[arg(long, default_value = "private.pem")]
    pub private_key: PathBuf,

    /// Passphrase of an encrypted private key.
    #[arg(long, env = "KEYTOOL_PASSPHRASE", hide_env_values = true)]
    pub passphrase: Option<String>,

    /// Public key expected to match the private key.
    #[arg(long)]
    pub public_key: Option<PathBuf>,

    /// Private key format; detected from the PEM label when omitted.
    #[arg(long, value_parser = parse_format)]
    pub format: Option<KeyFormat>,
}

fn parse_format(s: &str) -> Result<KeyFormat, String> {
    s.parse().map_err(|e: envelope::FlowError| e.to_string())
}
