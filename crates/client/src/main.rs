//! FileDrive command line client.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use client::DriveClient;
use protocol::FileCategory;
use tracing_subscriber::EnvFilter;

/// FileDrive client - upload, list and download files on a FileDrive server.
#[derive(Parser, Debug)]
#[command(name = "filedrive")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Server address
    #[arg(short, long, env = "FILEDRIVE_SERVER", default_value = "127.0.0.1:12345")]
    pub server: String,

    /// Username
    #[arg(short, long, env = "FILEDRIVE_USER")]
    pub user: String,

    /// Password
    #[arg(short, long, env = "FILEDRIVE_PASSWORD", hide_env_values = true)]
    pub password: String,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available client commands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// List your files by category
    List {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Upload a local file
    Upload {
        /// Category: pdf, jpg or txt
        category: FileCategory,

        /// File to upload; stored under its file name
        path: PathBuf,
    },

    /// Download a file as downloaded_<name>
    Download {
        /// Category: pdf, jpg or txt
        category: FileCategory,

        /// File name on the server
        name: String,

        /// Directory to save into
        #[arg(long, short, default_value = ".")]
        dir: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing; stdout is reserved for command output
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let mut drive = DriveClient::connect(cli.server.as_str())
        .await
        .with_context(|| format!("Failed to connect to {}", cli.server))?;
    drive
        .login(&cli.user, &cli.password)
        .await
        .context("Login failed")?;

    match cli.command {
        Commands::List { json } => {
            if json {
                let listing = drive.list_parsed().await?;
                println!("{}", serde_json::to_string_pretty(&listing)?);
            } else {
                print!("{}", drive.list().await?);
            }
        }
        Commands::Upload { category, path } => {
            let size = drive
                .upload_file(category, &path)
                .await
                .with_context(|| format!("Failed to upload {}", path.display()))?;
            println!("Uploaded {} ({} bytes) to {}", path.display(), size, category);
        }
        Commands::Download {
            category,
            name,
            dir,
        } => match drive.download(category, &name, &dir).await? {
            Some(saved) => println!("Saved {}", saved.display()),
            None => {
                drive.exit().await?;
                anyhow::bail!("File not found on server: {}/{}", category, name);
            }
        },
    }

    drive.exit().await?;
    Ok(())
}
