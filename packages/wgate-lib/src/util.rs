use anyhow::Context;
use std::{env, fs, path::Path, str::FromStr};
use tracing_subscriber::filter::EnvFilter;

const RUST_LOG: &str = "RUST_LOG";
const HUMAN_LOGGING: &str = "HUMAN_LOGGING";

/// Install the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over `default_level`. Setting
/// `HUMAN_LOGGING=false` switches the output to JSON lines.
pub fn init_logging(default_level: &str) -> anyhow::Result<()> {
    let filter = match env::var_os(RUST_LOG) {
        Some(_) => EnvFilter::try_from_default_env()
            .context("Invalid `RUST_LOG` provided")?,
        None => EnvFilter::try_new(default_level)
            .with_context(|| format!("Invalid log level `{default_level}`"))?,
    };

    let human_logging = match env::var(HUMAN_LOGGING) {
        Ok(s) => bool::from_str(&s).context(
            "Expected `true` or `false` to be provided for `HUMAN_LOGGING`",
        )?,
        Err(_) => true,
    };

    let sub = tracing_subscriber::fmt::Subscriber::builder()
        .with_writer(std::io::stderr)
        .with_env_filter(filter);

    let res = if human_logging {
        sub.with_ansi(true)
            .with_level(true)
            .with_line_number(true)
            .try_init()
    } else {
        sub.with_ansi(false)
            .with_level(true)
            .with_line_number(true)
            .json()
            .try_init()
    };

    res.map_err(|e| anyhow::anyhow!("Failed to install tracing subscriber: {e}"))
}

/// Resolves once the process receives SIGHUP, SIGTERM or SIGINT.
pub fn shutdown_signal_handler() -> std::io::Result<impl futures::Future<Output = ()>> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sighup = signal(SignalKind::hangup())?;
        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        Ok(async move {
            tokio::select! {
                _ = sighup.recv() => {
                    tracing::info!("Received SIGHUP. Stopping services.");
                }
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM. Stopping services.");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT. Stopping services.");
                }
            }
        })
    }

    #[cfg(not(unix))]
    {
        Ok(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for CTRL+C: {e}");
            }
            tracing::info!("Received CTRL+C. Stopping services.");
        })
    }
}

/// Create `dir` (mode 0700 on unix) unless it already exists.
///
/// Fails when `dir` exists but is not a directory.
pub fn ensure_dir(dir: &Path) -> std::io::Result<()> {
    match fs::metadata(dir) {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(std::io::Error::new(
            std::io::ErrorKind::AlreadyExists,
            format!("path {} is not a directory", dir.display()),
        )),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            let mut builder = fs::DirBuilder::new();
            builder.recursive(true);
            #[cfg(unix)]
            {
                use std::os::unix::fs::DirBuilderExt;
                builder.mode(0o700);
            }
            builder.create(dir)
        }
        Err(e) => Err(e),
    }
}
