//! CLI entrypoint for the pushgate control-plane service.

mod config;
mod daemon;
#[cfg(test)]
mod test_support;

use clap::{Parser, Subcommand};
use config::Config;

#[cfg(not(test))]
use gateway::{ConnectionRegistry, RpcServer};
#[cfg(not(test))]
use std::sync::Arc;
#[cfg(not(test))]
use tracing::{info, warn};
#[cfg(not(test))]
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Top-level command-line arguments for the pushgate service.
#[derive(Parser)]
#[command(name = "pushgate")]
#[command(about = "Push gateway control-plane RPC service", version)]
struct Cli {
    /// Path to config file
    #[arg(short, long)]
    config: Option<std::path::PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Also write debug-level logs to daily files in this directory
    #[arg(long)]
    log_dir: Option<std::path::PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// CLI subcommands available in the application.
#[derive(Subcommand, Debug, PartialEq, Eq)]
enum Commands {
    /// Start the RPC listener (default when no subcommand is given)
    Start,
    /// Load and validate configuration, print the effective values and exit
    CheckConfig,
}

#[cfg(not(test))]
#[tokio::main]
/// Program entrypoint.
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Commands::Start);

    let console_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    // WorkerGuard must outlive main() so buffered file writes are flushed on exit.
    let _file_guard: Option<tracing_appender::non_blocking::WorkerGuard>;
    let file_writer = if let Some(log_dir) = &cli.log_dir {
        std::fs::create_dir_all(log_dir).ok();
        let appender = tracing_appender::rolling::daily(log_dir, "pushgate.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);
        _file_guard = Some(guard);
        Some(writer)
    } else {
        _file_guard = None;
        None
    };

    match file_writer {
        Some(writer) => {
            let console = fmt::layer().with_target(false).with_filter(console_filter);
            let file = fmt::layer()
                .with_writer(writer)
                .with_target(true)
                .with_ansi(false)
                .with_filter(EnvFilter::new("debug"));
            tracing_subscriber::registry()
                .with(console)
                .with(file)
                .init();
        }
        None => {
            fmt()
                .with_env_filter(console_filter)
                .with_target(false)
                .init();
        }
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        log_level = %cli.log_level,
        "pushgate starting"
    );

    let config = Config::load(cli.config.as_deref())?;

    match command {
        Commands::Start => cmd_start(config).await,
        Commands::CheckConfig => cmd_check_config(config),
    }
}

#[cfg(not(test))]
/// Binds the RPC listener and serves until SIGINT/SIGTERM.
async fn cmd_start(config: Config) -> anyhow::Result<()> {
    config.validate()?;

    let identity = Arc::new(config.gateway.identity());
    if identity.auth_token().is_empty() {
        warn!("gateway.api_token is empty; calls presenting an empty token will be accepted");
    }

    let registry = Arc::new(ConnectionRegistry::new());
    let server = RpcServer::bind(&config.gateway.listen_addr(), identity.clone(), registry)
        .await?
        .with_call_timeout(config.gateway.call_timeout());

    info!(
        node_id = %identity.node_id(),
        listen = %server.local_addr()?,
        advertise = %config.gateway.api_address,
        "Gateway api server start running"
    );

    let pid_file = config.gateway.pid_file.clone().map(daemon::PidFile::new);
    if let Some(pid_file) = &pid_file {
        pid_file.write().await?;
    }

    let result = server.run_until(daemon::wait_for_shutdown()).await;

    if let Some(pid_file) = &pid_file {
        pid_file.remove().await;
    }
    result?;
    info!("pushgate stopped");
    Ok(())
}

#[cfg(not(test))]
/// Validates configuration and prints the effective values.
fn cmd_check_config(config: Config) -> anyhow::Result<()> {
    config.validate()?;
    println!("{}", describe_config(&config));
    Ok(())
}

/// Human-readable summary of the effective configuration. Never prints the token.
fn describe_config(config: &Config) -> String {
    let gateway = &config.gateway;
    let node_id = if gateway.node_id.trim().is_empty() {
        "<generated at startup>"
    } else {
        gateway.node_id.trim()
    };
    let token = if gateway.api_token.is_empty() {
        "not set"
    } else {
        "set"
    };
    let timeout = match gateway.call_timeout() {
        Some(limit) => format!("{}s", limit.as_secs()),
        None => "unbounded".to_string(),
    };
    format!(
        "node_id:      {node_id}\n\
         listen:       {}\n\
         advertise:    {}\n\
         api_token:    {token}\n\
         call_timeout: {timeout}",
        gateway.listen_addr(),
        gateway.api_address,
    )
}
