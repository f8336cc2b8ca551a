//! FileDrive Daemon
//!
//! Per-user file storage served over TCP.

use std::fs::{self, OpenOptions};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use daemon::config::{default_config_path, Config};
use daemon::{CredentialStore, FileServer};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

/// FileDrive Daemon - per-user file storage served over TCP.
#[derive(Parser, Debug)]
#[command(name = "filedrive-daemon")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for the daemon.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Start serving files
    Serve {
        /// Address to listen on (overrides server.bind)
        #[arg(long, short, value_name = "ADDR")]
        bind: Option<SocketAddr>,

        /// Storage root directory (overrides storage.root)
        #[arg(long, short, value_name = "DIR")]
        root: Option<PathBuf>,
    },

    /// Validate the configuration and credentials, then exit
    CheckConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::load_default()?,
    };
    let config_path = cli.config.clone().unwrap_or_else(default_config_path);

    // Apply environment variable overrides, then command line overrides
    config.apply_env_overrides();
    if let Commands::Serve { bind, root } = &cli.command {
        if let Some(bind) = bind {
            config.server.bind = bind.to_string();
        }
        if let Some(root) = root {
            config.storage.root = root.clone();
        }
    }

    // Validate configuration
    config.validate()?;

    // Initialize tracing; the guard flushes the log file on exit
    let filter = build_filter(cli.verbose, &config.daemon.log_level);
    let _log_guard = init_tracing(filter, config.daemon.log_file.as_deref())?;

    tracing::debug!("Using config file: {:?}", config_path);

    match cli.command {
        Commands::Serve { .. } => serve(config).await,
        Commands::CheckConfig => check_config(&config_path, &config),
    }
}

/// Pick the log filter: `--verbose`, then `RUST_LOG`, then the config value.
fn build_filter(verbose: bool, log_level: &str) -> EnvFilter {
    if verbose {
        return EnvFilter::new("debug");
    }
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level.to_lowercase()))
}

/// Install the global subscriber, writing to `log_file` when given.
fn init_tracing(filter: EnvFilter, log_file: Option<&Path>) -> anyhow::Result<Option<WorkerGuard>> {
    let Some(path) = log_file else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
        return Ok(None);
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create log directory: {}", parent.display()))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open log file: {}", path.display()))?;

    let (writer, guard) = tracing_appender::non_blocking(file);
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .init();
    Ok(Some(guard))
}

/// Run the server until SIGTERM or SIGINT.
async fn serve(config: Config) -> anyhow::Result<()> {
    tracing::info!(
        bind = %config.server.bind,
        root = %config.storage.root.display(),
        "FileDrive daemon starting..."
    );

    let server = FileServer::from_config(&config).await?;
    let shutdown = server.shutdown_token();

    tokio::spawn(async move {
        match wait_for_shutdown_signal().await {
            Ok(()) => {
                tracing::info!("Received shutdown signal");
                shutdown.cancel();
            }
            Err(e) => tracing::error!("Signal handling unavailable: {:#}", e),
        }
    });

    server.run().await?;
    tracing::info!("FileDrive daemon stopped");
    Ok(())
}

/// Report on a validated configuration.
fn check_config(path: &Path, config: &Config) -> anyhow::Result<()> {
    let store = CredentialStore::from_config(&config.auth)?;

    if path.exists() {
        println!("Configuration file: {}", path.display());
    } else {
        println!("Configuration file: {} (not found, using defaults)", path.display());
    }
    println!("  bind:            {}", config.server.bind);
    println!("  storage root:    {}", config.storage.root.display());
    println!("  max file size:   {} bytes", config.storage.max_size);
    match config.server.max_connections {
        0 => println!("  max connections: unlimited"),
        n => println!("  max connections: {}", n),
    }
    println!("  users:           {}", store.len());
    if store.is_empty() {
        println!("Warning: no users configured; every login will fail");
    }
    println!("Configuration OK");
    Ok(())
}

/// Wait for a shutdown signal (SIGTERM or SIGINT).
#[cfg(unix)]
async fn wait_for_shutdown_signal() -> anyhow::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm =
        signal(SignalKind::terminate()).context("Failed to register SIGTERM handler")?;
    let mut sigint = signal(SignalKind::interrupt()).context("Failed to register SIGINT handler")?;

    tokio::select! {
        _ = sigterm.recv() => {
            tracing::info!("Received SIGTERM");
        }
        _ = sigint.recv() => {
            tracing::info!("Received SIGINT");
        }
    }
    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C).
#[cfg(not(unix))]
async fn wait_for_shutdown_signal() -> anyhow::Result<()> {
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use serial_test::serial;

    #[test]
    fn test_cli_debug_assert() {
        // Verify the CLI structure is valid
        Cli::command().debug_assert();
    }

    #[test]
    fn test_serve_command() {
        let cli = Cli::try_parse_from(["filedrive-daemon", "serve"]).unwrap();
        match cli.command {
            Commands::Serve { bind, root } => {
                assert!(bind.is_none());
                assert!(root.is_none());
            }
            _ => panic!("Expected Serve command"),
        }
    }

    #[test]
    fn test_serve_with_bind_and_root() {
        let cli = Cli::try_parse_from([
            "filedrive-daemon",
            "serve",
            "--bind",
            "127.0.0.1:4000",
            "--root",
            "/srv/files",
        ])
        .unwrap();
        match cli.command {
            Commands::Serve { bind, root } => {
                assert_eq!(bind, Some("127.0.0.1:4000".parse().unwrap()));
                assert_eq!(root, Some(PathBuf::from("/srv/files")));
            }
            _ => panic!("Expected Serve command"),
        }
    }

    #[test]
    fn test_serve_short_flags() {
        let cli =
            Cli::try_parse_from(["filedrive-daemon", "serve", "-b", "0.0.0.0:1", "-r", "x"])
                .unwrap();
        assert!(matches!(
            cli.command,
            Commands::Serve {
                bind: Some(_),
                root: Some(_)
            }
        ));
    }

    #[test]
    fn test_serve_invalid_bind_fails() {
        let result = Cli::try_parse_from(["filedrive-daemon", "serve", "--bind", "nowhere"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_check_config_command() {
        let cli = Cli::try_parse_from(["filedrive-daemon", "check-config"]).unwrap();
        assert!(matches!(cli.command, Commands::CheckConfig));
    }

    #[test]
    fn test_global_verbose_flag() {
        let cli = Cli::try_parse_from(["filedrive-daemon", "--verbose", "serve"]).unwrap();
        assert!(cli.verbose);
    }

    #[test]
    fn test_global_short_verbose_flag() {
        let cli = Cli::try_parse_from(["filedrive-daemon", "-v", "serve"]).unwrap();
        assert!(cli.verbose);
    }

    #[test]
    fn test_global_config_flag() {
        let cli = Cli::try_parse_from([
            "filedrive-daemon",
            "--config",
            "/etc/filedrive.toml",
            "serve",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/etc/filedrive.toml")));
    }

    #[test]
    fn test_config_after_command() {
        let cli =
            Cli::try_parse_from(["filedrive-daemon", "check-config", "-c", "./local.toml"])
                .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("./local.toml")));
    }

    #[test]
    fn test_invalid_command_fails() {
        let result = Cli::try_parse_from(["filedrive-daemon", "invalid"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_subcommand_fails() {
        let result = Cli::try_parse_from(["filedrive-daemon"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_help_available() {
        let result = Cli::try_parse_from(["filedrive-daemon", "--help"]);
        // --help causes an early exit, which is treated as an error by try_parse
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);
    }

    #[test]
    #[serial]
    fn test_build_filter_verbose_wins() {
        std::env::set_var("RUST_LOG", "error");
        let filter = build_filter(true, "info");
        assert_eq!(filter.to_string(), "debug");
        std::env::remove_var("RUST_LOG");
    }

    #[test]
    #[serial]
    fn test_build_filter_env_then_config() {
        std::env::set_var("RUST_LOG", "warn");
        assert_eq!(build_filter(false, "info").to_string(), "warn");

        std::env::remove_var("RUST_LOG");
        assert_eq!(build_filter(false, "TRACE").to_string(), "trace");
    }

    #[test]
    fn test_check_config_defaults() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("missing.toml");
        check_config(&path, &Config::default()).unwrap();
    }
}
