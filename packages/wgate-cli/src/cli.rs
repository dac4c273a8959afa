pub(crate) use crate::command::{add, genkey, list, profile, remove, serve};
use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[clap(name = "wgate", about = "WireGuard multi-tenant gateway", version)]
pub struct Opt {
    /// The command to run
    #[clap(subcommand)]
    pub command: WgateCli,
}

#[derive(Subcommand, Debug)]
pub enum WgateCli {
    #[clap(name = "serve", about = "Bring up the gateway and keep it configured.")]
    Serve(serve::Args),
    #[clap(name = "genkey", about = "Generate a WireGuard key pair.")]
    Genkey(genkey::Args),
    #[clap(name = "list", about = "List a user's clients.")]
    List(list::Args),
    #[clap(name = "add", about = "Register a client for a user.")]
    Add(add::Args),
    #[clap(name = "remove", about = "Remove a user's client.")]
    Remove(remove::Args),
    #[clap(name = "profile", about = "Print a client's wg-quick profile.")]
    Profile(profile::Args),
}

pub async fn run_cli() -> Result<(), anyhow::Error> {
    let opt = Opt::parse();

    match opt.command {
        WgateCli::Serve(command) => serve::exec(command).await,
        WgateCli::Genkey(command) => genkey::exec(command),
        WgateCli::List(command) => list::exec(command).await,
        WgateCli::Add(command) => add::exec(command).await,
        WgateCli::Remove(command) => remove::exec(command).await,
        WgateCli::Profile(command) => profile::exec(command).await,
    }
}
