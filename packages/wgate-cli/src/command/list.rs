use crate::command::{open_readonly, CommonArgs};
use clap::Parser;

#[derive(Debug, Parser, Clone)]
#[clap(name = "wgate list", about = "List a user's clients", version)]
pub struct Args {
    #[clap(flatten)]
    pub common: CommonArgs,

    #[clap(short, long, help = "User owning the clients.")]
    pub user: String,
}

pub async fn exec(args: Args) -> anyhow::Result<()> {
    args.common.init_logging()?;
    let startup = args.common.startup()?;
    let server = open_readonly(&startup).await?;

    let clients = server.list_clients(&args.user).await;
    println!("{}", serde_json::to_string_pretty(&clients)?);
    Ok(())
}
