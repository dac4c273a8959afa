use crate::command::{open_server, CommonArgs};
use clap::Parser;
use tokio::task::JoinSet;
use wgate_lib::util::shutdown_signal_handler;
use wgate_server::ServerResult;

#[derive(Debug, Parser, Clone)]
#[clap(name = "wgate server", about = "wgate server", version)]
pub struct Args {
    #[clap(flatten)]
    pub common: CommonArgs,

    /// Keep the device in memory instead of programming the kernel.
    #[clap(long, help = "Do not touch the kernel.")]
    pub dry_run: bool,
}

pub async fn exec(args: Args) -> anyhow::Result<()> {
    args.common.init_logging()?;

    let mut subsystems: JoinSet<()> = JoinSet::new();
    subsystems.spawn(shutdown_signal_handler()?);

    let startup = args.common.startup()?;
    tracing::info!("Configuration: {startup:?}");

    let server = open_server(&startup, args.dry_run).await?;
    check_start(server.start().await)?;
    tracing::info!(
        "Gateway {} up with {} clients",
        startup.link.name,
        server.snapshot().await.list_all_clients().count()
    );

    if subsystems.join_next().await.is_some() {
        subsystems.shutdown().await;
    }

    Ok(())
}

/// Only storage and device failures stop the gateway.
fn check_start(result: ServerResult<()>) -> anyhow::Result<()> {
    match result {
        Err(e) if e.is_fatal() => {
            tracing::error!("Failed to start gateway: {e}");
            Err(e.into())
        }
        Err(e) => {
            tracing::warn!("Gateway started with errors: {e}");
            Ok(())
        }
        Ok(()) => Ok(()),
    }
}
