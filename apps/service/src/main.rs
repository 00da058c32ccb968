#![warn(clippy::all)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info};

mod config;
mod monitoring;
mod notify;
mod status;
mod validation;

use config::Config;
use monitoring::{EngineExit, HttpProbe, PendingSet, PollingEngine};
use notify::EmailNotifier;
use status::WatcherStatus;

/// Watch sites that are down and email when they come back up.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// TOML config file; environment variables override its values
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Validate and print the effective configuration, then exit
    #[arg(long)]
    check: bool,
}

#[actix_web::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    logger::init_tracing();

    let cli = Cli::parse();

    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "invalid configuration");
            return Err(e).context("failed to load configuration");
        }
    };

    if cli.check {
        print!("{config}");
        return Ok(());
    }

    run(config).await
}

async fn run(config: Config) -> Result<()> {
    let probe = HttpProbe::new(config.probe_timeout()).context("failed to build HTTP client")?;
    let notifier = EmailNotifier::from_config(&config.email).context("failed to configure email")?;

    let pending = PendingSet::new(config.targets());
    let engine = PollingEngine::new(
        Arc::new(probe),
        Arc::new(notifier),
        pending.clone(),
        config.engine_settings(),
    );

    let status = Arc::new(WatcherStatus::new(pending, engine.subscribe()));
    let addr = comeback_server::bind_address(&config.liveness.bind, config.liveness.port)?;
    let server = comeback_server::bind_server(addr, status)?;
    let server_handle = server.handle();
    actix_web::rt::spawn(async move {
        if let Err(e) = server.await {
            error!(error = %e, "liveness endpoint stopped");
        }
    });

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut engine_task = tokio::spawn(engine.run(shutdown_rx));

    let exit = tokio::select! {
        joined = &mut engine_task => Some(joined.context("polling engine panicked")?),
        _ = tokio::signal::ctrl_c() => None,
    };

    match exit {
        Some(EngineExit::Done { rounds }) if config.monitor.exit_when_done => {
            info!(rounds, "all targets are UP, exiting");
        }
        Some(exit) => {
            info!(?exit, "polling finished; liveness endpoint stays up until interrupted");
            tokio::signal::ctrl_c().await.context("failed to listen for ctrl-c")?;
        }
        None => {
            info!("interrupt received, finishing current round");
            let _ = shutdown_tx.send(true);
            let exit = engine_task.await.context("polling engine panicked")?;
            info!(?exit, "polling stopped");
        }
    }

    server_handle.stop(true).await;
    Ok(())
}
