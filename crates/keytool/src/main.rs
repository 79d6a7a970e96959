//! `keytool` - offline key lifecycle tooling for the flow endpoint.
//!
//! Subcommands:
//! - `generate`: new RSA keypair, private key encrypted under a passphrase.
//! - `convert`: decrypt an encrypted private key to plain PKCS#1.
//! - `self-test`: verify a private key works end to end.

mod cli;
mod commands;
mod telemetry;

use anyhow::Result;
use clap::Parser;

fn main() -> Result<()> {
    let cli = cli::Cli::parse();
    telemetry::init(&cli.log_level)?;

    let stdout = std::io::stdout();
    commands::run(cli.command, &mut stdout.lock())
}
