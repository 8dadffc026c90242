//! SignalCoord - four-phase right-of-way coordinator
//!
//! CLI entry point for the coordinator, the signal unit client and the demo.

use std::path::PathBuf;

use clap::Parser;
use eyre::{Context, Result};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use signalcoord::cli::{Cli, Command};
use signalcoord::config::Config;
use signalcoord::demo::Demo;
use signalcoord::server::Server;
use signalcoord::unit::SignalUnit;

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    // Priority: CLI --log-level > config file > default (INFO)
    let level = match cli_log_level.or(config_log_level) {
        Some(s) => match s.to_uppercase().as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
                tracing::Level::INFO
            }
        },
        None => tracing::Level::INFO,
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .try_init()
        .map_err(|e| eyre::eyre!("Failed to install tracing subscriber: {}", e))?;

    debug!(?level, "Logging initialized");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load log level from config file early (before full config load)
    let config_log_level = Config::load_log_level(cli.config.as_ref());
    setup_logging(cli.log_level.as_deref(), config_log_level.as_deref()).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Command::Serve { bind } => cmd_serve(config, bind).await,
        Command::Unit { id, server } => cmd_unit(&config, &id, server).await,
        Command::Demo { duration_secs } => cmd_demo(config, cli.config, cli.log_level, duration_secs).await,
    }
}

/// Run the coordinator until SIGINT/SIGTERM
async fn cmd_serve(mut config: Config, bind: Option<String>) -> Result<()> {
    if let Some(bind) = bind {
        config.coordinator.bind = bind;
    }

    let server = Server::bind(&config.coordinator).await?;
    let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
    let server_task = tokio::spawn(server.run(shutdown_rx));

    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;

        tokio::select! {
            _ = sigint.recv() => warn!("SIGINT received"),
            _ = sigterm.recv() => warn!("SIGTERM received"),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        warn!("Ctrl+C received");
    }

    info!("Coordinator shutting down...");
    let _ = shutdown_tx.send(()).await;
    server_task.await.context("Coordinator server task panicked")?
}

/// Run one signal unit until the coordinator closes the connection
async fn cmd_unit(config: &Config, id: &str, server: Option<String>) -> Result<()> {
    let mut unit_config = config.unit.clone();
    if let Some(server) = server {
        unit_config.server = server;
    }

    match SignalUnit::from_config(id, &unit_config).run().await {
        Ok(summary) => {
            info!(
                unit = %id,
                commands = summary.commands_handled,
                last_signal = ?summary.last_signal,
                "Signal unit finished"
            );
            Ok(())
        }
        Err(e) => {
            error!(unit = %id, error = %e, "Signal unit failed");
            Err(e.into())
        }
    }
}

/// Run the coordinator and units as child processes
async fn cmd_demo(
    mut config: Config,
    config_path: Option<PathBuf>,
    log_level: Option<String>,
    duration_secs: Option<u64>,
) -> Result<()> {
    if let Some(secs) = duration_secs {
        config.demo.duration_secs = secs;
    }

    Demo::new(&config, config_path, log_level).run().await
}
