//! Generates an RSA key pair and writes the private key as PKCS#1 PEM.
//!
//! The token service loads this file at startup and derives the public key
//! from it; there is no separate public-key file to generate or ship.

use std::fs;
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;

use clap::Parser;
use rsa::pkcs1::EncodeRsaPrivateKey;
use rsa::RsaPrivateKey;

#[derive(Parser)]
#[command(name = "keepr-certgen")]
struct Args {
    /// Output path for the PEM-encoded PKCS#1 private key.
    #[arg(long, default_value = "private.pem")]
    out: PathBuf,

    /// Key size in bits.
    #[arg(long, default_value_t = 2048)]
    bits: usize,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let mut rng = rand::thread_rng();
    let key = RsaPrivateKey::new(&mut rng, args.bits)?;
    let pem = key.to_pkcs1_pem(rsa::pkcs1::LineEnding::LF)?;

    fs::write(&args.out, pem.as_str())?;

    #[cfg(unix)]
    fs::set_permissions(&args.out, fs::Permissions::from_mode(0o600))?;

    tracing::info!(path = %args.out.display(), bits = args.bits, "generated RSA key pair");
    Ok(())
}
