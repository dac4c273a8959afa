use crate::command::{open_server, parse_key, CommonArgs};
use clap::Parser;
use wgate_crypto::Key;

#[derive(Debug, Parser, Clone)]
#[clap(name = "wgate remove", about = "Remove a user's client", version)]
pub struct Args {
    #[clap(flatten)]
    pub common: CommonArgs,

    #[clap(short, long, help = "User owning the client.")]
    pub user: String,

    #[clap(long, value_parser = parse_key, help = "Client public key, hex or base64.")]
    pub public_key: Key,

    #[clap(long, help = "Do not touch the kernel.")]
    pub dry_run: bool,
}

pub async fn exec(args: Args) -> anyhow::Result<()> {
    args.common.init_logging()?;
    let startup = args.common.startup()?;
    let server = open_server(&startup, args.dry_run).await?;

    let removed = server.delete_client(&args.user, &args.public_key).await?;
    tracing::info!("Removed client {} ({})", removed.public_key, removed.ip);
    println!("{}", serde_json::to_string_pretty(&removed)?);
    Ok(())
}
