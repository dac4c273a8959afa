use crate::command::{open_readonly, parse_key, CommonArgs};
use clap::Parser;
use wgate_crypto::Key;
use wgate_server::render_profile;

#[derive(Debug, Parser, Clone)]
#[clap(name = "wgate profile", about = "Print a client's wg-quick profile", version)]
pub struct Args {
    #[clap(flatten)]
    pub common: CommonArgs,

    #[clap(short, long, help = "User owning the client.")]
    pub user: String,

    #[clap(long, value_parser = parse_key, help = "Client public key, hex or base64.")]
    pub public_key: Key,

    /// Written into the profile instead of the stored sealed material.
    #[clap(long, help = "Client private key to embed.")]
    pub private_key: Option<String>,
}

pub async fn exec(args: Args) -> anyhow::Result<()> {
    args.common.init_logging()?;
    let startup = args.common.startup()?;
    let server = open_readonly(&startup).await?;

    let profile = match args.private_key {
        Some(private_key) => {
            let mut client = server.get_client(&args.user, &args.public_key).await?;
            client.private_key = Some(private_key);
            render_profile(&client, &server.snapshot().await)
        }
        None => server.profile(&args.user, &args.public_key).await?,
    };
    print!("{profile}");
    Ok(())
}
