use clap::Parser;
use wgate_crypto::gen_keypair;

#[derive(Debug, Parser, Clone)]
#[clap(name = "wgate genkey", about = "Generate a WireGuard key pair", version)]
pub struct Args {
    /// Print keys the way the `wg` tool does.
    #[clap(long, help = "Print base64 instead of hex.")]
    pub base64: bool,
}

pub fn exec(args: Args) -> anyhow::Result<()> {
    let pair = gen_keypair();
    let (private, public) = if args.base64 {
        (pair.privkey().as_key().to_base64(), pair.pubkey().to_base64())
    } else {
        (pair.privkey().as_key().to_hex(), pair.pubkey().to_hex())
    };
    println!("private_key: {private}");
    println!("public_key: {public}");
    Ok(())
}
