// Syncdock - HTTP host with a supervised document relay
// Main entry point

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

use syncdock::config::{load_config, Config};
use syncdock::errors::web_dir_missing_error;
use syncdock::server::HostApplication;
use syncdock::signals::cancel_on_signal;
use tracing_subscriber::prelude::*;

#[derive(Parser, Debug)]
#[command(name = "syncdock")]
#[command(about = "HTTP host with a supervised document relay", version)]
struct Args {
    /// Run mode
    #[command(subcommand)]
    command: Option<Command>,

    /// Config file (default: ~/.syncdock/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Bind address, overrides config and SYNCDOCK_BIND
    #[arg(long, global = true)]
    bind: Option<String>,

    /// Directory holding index.html and assets/
    #[arg(long = "static-dir", global = true)]
    static_dir: Option<PathBuf>,

    /// Seconds to wait for the relay on shutdown before aborting it
    #[arg(long = "shutdown-grace-secs", global = true)]
    shutdown_grace_secs: Option<f64>,
}

#[derive(Parser, Debug)]
enum Command {
    /// Serve HTTP traffic (default)
    Serve,
    /// Print the effective configuration as TOML
    Config,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = load_config(args.config.as_deref())?;
    apply_cli_overrides(&mut config, &args);
    config.validate()?;

    match args.command {
        Some(Command::Config) => {
            let rendered = toml::to_string_pretty(&config).context("Failed to render config")?;
            println!("{}", rendered);
            Ok(())
        }
        Some(Command::Serve) | None => run_serve(config).await,
    }
}

fn apply_cli_overrides(config: &mut Config, args: &Args) {
    if let Some(bind) = &args.bind {
        config.server.bind_address = bind.clone();
    }
    if let Some(dir) = &args.static_dir {
        config.assets.static_dir = Some(dir.clone());
    }
    if let Some(grace) = args.shutdown_grace_secs {
        config.supervisor.shutdown_grace_secs = grace;
    }
}

/// Run the HTTP host until a termination signal arrives
async fn run_serve(config: Config) -> Result<()> {
    if config.features.debug_logging && std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "debug");
    }
    init_tracing();

    let host = HostApplication::new(config)?;
    if !host.web_dir().is_dir() {
        tracing::warn!("{}", web_dir_missing_error(&host.web_dir().display().to_string()));
    }

    tracing::info!(
        bind = %host.config().server.bind_address,
        web_dir = %host.web_dir().display(),
        shutdown_grace_secs = host.config().supervisor.shutdown_grace_secs,
        "Starting syncdock"
    );

    let shutdown = CancellationToken::new();
    let signal_task = cancel_on_signal(shutdown.clone());

    let result = host.serve(shutdown).await;
    signal_task.abort();

    match &result {
        Ok(()) => tracing::info!("Main: server shut down"),
        Err(e) => tracing::error!(error = %e, "Main: server exited with error"),
    }
    result
}

fn init_tracing() {
    // Default: INFO level, can be overridden with RUST_LOG env var
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Bridge log crate → tracing (for dependencies using log crate)
    tracing_log::LogTracer::init().ok();
}
